// Copyright (c) The water-vm Authors
// SPDX-License-Identifier: Apache-2.0

//! The object registry backing `Value::Ref` handles: arrays (family
//! `0x1800`) and concurrency primitives (family `0x1600`) both need a
//! process-wide, thread-safe store of heap-like objects that outlive any
//! single frame. This registry is new relative to the distilled spec's
//! named registries — see SPEC_FULL.md §3 for why.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::{Condvar, Mutex, RwLock};

use crate::value::{RefHandle, Value};

/// Concurrency primitives use `parking_lot` rather than `std::sync` because
/// `LOCK`/`UNLOCK` (and the `RWLOCK` equivalents) are separate syscalls that
/// may run on different threads' call stacks than where they're issued from
/// here; `parking_lot`'s `force_unlock`/`make_guard_unchecked` let a guard
/// be "handed off" across that boundary, which `std::sync`'s guards (tied to
/// a lexical scope) cannot do.
pub enum VmObject {
    Array(Mutex<Vec<Value>>),
    RawMutex(Mutex<()>),
    Cond(Condvar),
    Semaphore(Mutex<i64>, Condvar),
    RwLockObj(RwLock<()>),
}

#[derive(Default)]
pub struct ObjectRegistry {
    objects: RwLock<HashMap<RefHandle, Arc<VmObject>>>,
    next_handle: AtomicU64,
}

impl ObjectRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, object: VmObject) -> RefHandle {
        let handle = self.next_handle.fetch_add(1, Ordering::SeqCst) + 1;
        self.objects.write().insert(handle, Arc::new(object));
        handle
    }

    pub fn get(&self, handle: RefHandle) -> Option<Arc<VmObject>> {
        self.objects.read().get(&handle).cloned()
    }

    pub fn remove(&self, handle: RefHandle) -> Option<Arc<VmObject>> {
        self.objects.write().remove(&handle)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_then_get_round_trips() {
        let registry = ObjectRegistry::new();
        let handle = registry.insert(VmObject::Array(Mutex::new(vec![Value::I32(1)])));
        assert!(registry.get(handle).is_some());
    }

    #[test]
    fn handles_are_unique() {
        let registry = ObjectRegistry::new();
        let a = registry.insert(VmObject::Array(Mutex::new(vec![])));
        let b = registry.insert(VmObject::Array(Mutex::new(vec![])));
        assert_ne!(a, b);
    }

    #[test]
    fn remove_drops_the_object() {
        let registry = ObjectRegistry::new();
        let handle = registry.insert(VmObject::Array(Mutex::new(vec![])));
        assert!(registry.remove(handle).is_some());
        assert!(registry.get(handle).is_none());
    }
}

// Copyright (c) The water-vm Authors
// SPDX-License-Identifier: Apache-2.0

//! Growable index-addressed local variable storage. The root frame's
//! store is owned by the engine and shared by reference; child frames get
//! a fresh, privately-owned store (see the root-frame trick in the design
//! notes).

use crate::value::Value;

#[derive(Debug, Default)]
pub struct LocalVariableStore {
    slots: Vec<Value>,
}

impl LocalVariableStore {
    pub fn new() -> Self {
        Self { slots: Vec::new() }
    }

    /// Reading an unset index yields `Null` rather than growing or erroring.
    pub fn load(&self, index: usize) -> Value {
        self.slots.get(index).cloned().unwrap_or(Value::Null)
    }

    /// Writing to an index beyond the current length grows the store,
    /// filling intermediate slots with `Null`.
    pub fn store(&mut self, index: usize, value: Value) {
        if index >= self.slots.len() {
            self.slots.resize_with(index + 1, || Value::Null);
        }
        self.slots[index] = value;
    }

    /// `MOV src, dst`: copies within locals, carrying the dynamic type of
    /// the source slot.
    pub fn mov(&mut self, src: usize, dst: usize) {
        let value = self.load(src);
        self.store(dst, value);
    }

    /// Drops all slots; used by `RET` to release the departing frame's
    /// locals.
    pub fn clear(&mut self) {
        self.slots.clear();
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Trims trailing `Null` slots for display only; never re-indexes live
    /// slots (the distilled spec is explicit that this must not happen).
    pub fn compact(&mut self) {
        while matches!(self.slots.last(), Some(Value::Null)) {
            self.slots.pop();
        }
    }

    pub fn snapshot(&self) -> &[Value] {
        &self.slots
    }
}

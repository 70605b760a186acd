// Copyright (c) The water-vm Authors
// SPDX-License-Identifier: Apache-2.0

//! Array syscalls, family `0x1800`. Not detailed in the distilled spec's
//! §4.5 text (it only reserves the range) — grounded on `Value::Ref` as the
//! generic object-registry handle described in §3, following the same
//! create/use/destroy shape as the concurrency primitives in that family.

use parking_lot::Mutex;

use super::objects::VmObject;
use super::{SyscallCtx, SyscallDispatcher};
use crate::error::VmResult;
use crate::opcode::syscalls as sc;
use crate::value::Value;

pub fn install(d: &mut SyscallDispatcher) {
    d.register(sc::ARRAY_NEW, array_new);
    d.register(sc::ARRAY_GET, array_get);
    d.register(sc::ARRAY_SET, array_set);
    d.register(sc::ARRAY_LEN, array_len);
    d.register(sc::ARRAY_FREE, array_free);
}

fn array_new(ctx: &mut SyscallCtx) -> VmResult<()> {
    let len = ctx.pop_int()?;
    if len < 0 {
        return Err(ctx.precondition(format!("negative array length {len}")));
    }
    let handle = ctx
        .runtime
        .objects
        .insert(VmObject::Array(Mutex::new(vec![Value::Null; len as usize])));
    ctx.push(Value::Ref(handle));
    Ok(())
}

fn array_get(ctx: &mut SyscallCtx) -> VmResult<()> {
    let index = ctx.pop_int()?;
    let handle = ctx.pop_ref()?;
    let obj = ctx
        .runtime
        .objects
        .get(handle)
        .ok_or_else(|| ctx.precondition(format!("invalid object handle {handle}")))?;
    match &*obj {
        VmObject::Array(slots) => {
            let slots = slots.lock();
            let value = slots
                .get(index as usize)
                .cloned()
                .ok_or_else(|| ctx.precondition(format!("array index {index} out of bounds")))?;
            ctx.push(value);
            Ok(())
        }
        _ => Err(ctx.precondition(format!("object {handle} is not an array"))),
    }
}

fn array_set(ctx: &mut SyscallCtx) -> VmResult<()> {
    let value = ctx.pop()?;
    let index = ctx.pop_int()?;
    let handle = ctx.pop_ref()?;
    let obj = ctx
        .runtime
        .objects
        .get(handle)
        .ok_or_else(|| ctx.precondition(format!("invalid object handle {handle}")))?;
    match &*obj {
        VmObject::Array(slots) => {
            let mut slots = slots.lock();
            let slot = slots
                .get_mut(index as usize)
                .ok_or_else(|| ctx.precondition(format!("array index {index} out of bounds")))?;
            *slot = value;
            ctx.push_i64(0);
            Ok(())
        }
        _ => Err(ctx.precondition(format!("object {handle} is not an array"))),
    }
}

fn array_len(ctx: &mut SyscallCtx) -> VmResult<()> {
    let handle = ctx.pop_ref()?;
    let obj = ctx
        .runtime
        .objects
        .get(handle)
        .ok_or_else(|| ctx.precondition(format!("invalid object handle {handle}")))?;
    match &*obj {
        VmObject::Array(slots) => {
            ctx.push_i64(slots.lock().len() as i64);
            Ok(())
        }
        _ => Err(ctx.precondition(format!("object {handle} is not an array"))),
    }
}

fn array_free(ctx: &mut SyscallCtx) -> VmResult<()> {
    let handle = ctx.pop_ref()?;
    ctx.runtime.objects.remove(handle);
    ctx.push_i64(0);
    Ok(())
}

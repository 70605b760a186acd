// Copyright (c) The water-vm Authors
// SPDX-License-Identifier: Apache-2.0

//! Concurrency primitive syscalls, family `0x1600` (distilled spec §4.5),
//! backed by the object registry's `VmObject` variants (§3 supplement).

use super::objects::VmObject;
use super::{SyscallCtx, SyscallDispatcher};
use crate::error::VmResult;
use crate::value::Value;
use crate::opcode::syscalls as sc;

pub fn install(d: &mut SyscallDispatcher) {
    d.register(sc::MUTEX_CREATE, mutex_create);
    d.register(sc::MUTEX_LOCK, mutex_lock);
    d.register(sc::MUTEX_UNLOCK, mutex_unlock);
    d.register(sc::MUTEX_DESTROY, mutex_destroy);
    d.register(sc::COND_CREATE, cond_create);
    d.register(sc::COND_WAIT, cond_wait);
    d.register(sc::COND_SIGNAL, cond_signal);
    d.register(sc::COND_BROADCAST, cond_broadcast);
    d.register(sc::COND_DESTROY, cond_destroy);
    d.register(sc::SEM_CREATE, sem_create);
    d.register(sc::SEM_WAIT, sem_wait);
    d.register(sc::SEM_POST, sem_post);
    d.register(sc::SEM_DESTROY, sem_destroy);
    d.register(sc::RWLOCK_CREATE, rwlock_create);
    d.register(sc::RWLOCK_READ_LOCK, rwlock_read_lock);
    d.register(sc::RWLOCK_WRITE_LOCK, rwlock_write_lock);
    d.register(sc::RWLOCK_UNLOCK, rwlock_unlock);
    d.register(sc::RWLOCK_DESTROY, rwlock_destroy);
}

fn mutex_create(ctx: &mut SyscallCtx) -> VmResult<()> {
    let handle = ctx.runtime.objects.insert(VmObject::RawMutex(parking_lot::Mutex::new(())));
    ctx.push(Value::Ref(handle));
    Ok(())
}

fn mutex_lock(ctx: &mut SyscallCtx) -> VmResult<()> {
    let handle = ctx.pop_ref()?;
    match ctx.runtime.objects.get(handle) {
        Some(obj) => match &*obj {
            VmObject::RawMutex(m) => {
                std::mem::forget(m.lock());
                ctx.push_i64(0);
                Ok(())
            }
            _ => Err(ctx.precondition(format!("object {handle} is not a mutex"))),
        },
        None => Err(ctx.precondition(format!("invalid object handle {handle}"))),
    }
}

fn mutex_unlock(ctx: &mut SyscallCtx) -> VmResult<()> {
    let handle = ctx.pop_ref()?;
    match ctx.runtime.objects.get(handle) {
        Some(obj) => match &*obj {
            VmObject::RawMutex(m) => {
                unsafe { m.force_unlock() };
                ctx.push_i64(0);
                Ok(())
            }
            _ => Err(ctx.precondition(format!("object {handle} is not a mutex"))),
        },
        None => Err(ctx.precondition(format!("invalid object handle {handle}"))),
    }
}

fn mutex_destroy(ctx: &mut SyscallCtx) -> VmResult<()> {
    let handle = ctx.pop_ref()?;
    ctx.runtime.objects.remove(handle);
    ctx.push_i64(0);
    Ok(())
}

fn cond_create(ctx: &mut SyscallCtx) -> VmResult<()> {
    let handle = ctx.runtime.objects.insert(VmObject::Cond(parking_lot::Condvar::new()));
    ctx.push(Value::Ref(handle));
    Ok(())
}

/// Waits on the condvar paired with a held mutex; both are required
/// arguments since `parking_lot::Condvar::wait` needs a live guard.
fn cond_wait(ctx: &mut SyscallCtx) -> VmResult<()> {
    let mutex_handle = ctx.pop_ref()?;
    let cond_handle = ctx.pop_ref()?;
    let mutex_obj = ctx
        .runtime
        .objects
        .get(mutex_handle)
        .ok_or_else(|| ctx.precondition(format!("invalid object handle {mutex_handle}")))?;
    let cond_obj = ctx
        .runtime
        .objects
        .get(cond_handle)
        .ok_or_else(|| ctx.precondition(format!("invalid object handle {cond_handle}")))?;
    match (&*mutex_obj, &*cond_obj) {
        (VmObject::RawMutex(m), VmObject::Cond(c)) => {
            let mut guard = unsafe { m.make_guard_unchecked() };
            c.wait(&mut guard);
            std::mem::forget(guard);
            ctx.push_i64(0);
            Ok(())
        }
        _ => Err(ctx.precondition("COND_WAIT arguments must be (cond, mutex)")),
    }
}

fn cond_signal(ctx: &mut SyscallCtx) -> VmResult<()> {
    let handle = ctx.pop_ref()?;
    match ctx.runtime.objects.get(handle) {
        Some(obj) => match &*obj {
            VmObject::Cond(c) => {
                c.notify_one();
                ctx.push_i64(0);
                Ok(())
            }
            _ => Err(ctx.precondition(format!("object {handle} is not a condvar"))),
        },
        None => Err(ctx.precondition(format!("invalid object handle {handle}"))),
    }
}

fn cond_broadcast(ctx: &mut SyscallCtx) -> VmResult<()> {
    let handle = ctx.pop_ref()?;
    match ctx.runtime.objects.get(handle) {
        Some(obj) => match &*obj {
            VmObject::Cond(c) => {
                c.notify_all();
                ctx.push_i64(0);
                Ok(())
            }
            _ => Err(ctx.precondition(format!("object {handle} is not a condvar"))),
        },
        None => Err(ctx.precondition(format!("invalid object handle {handle}"))),
    }
}

fn cond_destroy(ctx: &mut SyscallCtx) -> VmResult<()> {
    let handle = ctx.pop_ref()?;
    ctx.runtime.objects.remove(handle);
    ctx.push_i64(0);
    Ok(())
}

fn sem_create(ctx: &mut SyscallCtx) -> VmResult<()> {
    let initial = ctx.pop_int()?;
    let handle = ctx
        .runtime
        .objects
        .insert(VmObject::Semaphore(parking_lot::Mutex::new(initial), parking_lot::Condvar::new()));
    ctx.push(Value::Ref(handle));
    Ok(())
}

fn sem_wait(ctx: &mut SyscallCtx) -> VmResult<()> {
    let handle = ctx.pop_ref()?;
    match ctx.runtime.objects.get(handle) {
        Some(obj) => match &*obj {
            VmObject::Semaphore(count, cond) => {
                let mut count = count.lock();
                while *count <= 0 {
                    cond.wait(&mut count);
                }
                *count -= 1;
                ctx.push_i64(0);
                Ok(())
            }
            _ => Err(ctx.precondition(format!("object {handle} is not a semaphore"))),
        },
        None => Err(ctx.precondition(format!("invalid object handle {handle}"))),
    }
}

fn sem_post(ctx: &mut SyscallCtx) -> VmResult<()> {
    let handle = ctx.pop_ref()?;
    match ctx.runtime.objects.get(handle) {
        Some(obj) => match &*obj {
            VmObject::Semaphore(count, cond) => {
                *count.lock() += 1;
                cond.notify_one();
                ctx.push_i64(0);
                Ok(())
            }
            _ => Err(ctx.precondition(format!("object {handle} is not a semaphore"))),
        },
        None => Err(ctx.precondition(format!("invalid object handle {handle}"))),
    }
}

fn sem_destroy(ctx: &mut SyscallCtx) -> VmResult<()> {
    let handle = ctx.pop_ref()?;
    ctx.runtime.objects.remove(handle);
    ctx.push_i64(0);
    Ok(())
}

fn rwlock_create(ctx: &mut SyscallCtx) -> VmResult<()> {
    let handle = ctx.runtime.objects.insert(VmObject::RwLockObj(parking_lot::RwLock::new(())));
    ctx.push(Value::Ref(handle));
    Ok(())
}

fn rwlock_read_lock(ctx: &mut SyscallCtx) -> VmResult<()> {
    let handle = ctx.pop_ref()?;
    match ctx.runtime.objects.get(handle) {
        Some(obj) => match &*obj {
            VmObject::RwLockObj(l) => {
                std::mem::forget(l.read());
                ctx.push_i64(0);
                Ok(())
            }
            _ => Err(ctx.precondition(format!("object {handle} is not a rwlock"))),
        },
        None => Err(ctx.precondition(format!("invalid object handle {handle}"))),
    }
}

fn rwlock_write_lock(ctx: &mut SyscallCtx) -> VmResult<()> {
    let handle = ctx.pop_ref()?;
    match ctx.runtime.objects.get(handle) {
        Some(obj) => match &*obj {
            VmObject::RwLockObj(l) => {
                std::mem::forget(l.write());
                ctx.push_i64(0);
                Ok(())
            }
            _ => Err(ctx.precondition(format!("object {handle} is not a rwlock"))),
        },
        None => Err(ctx.precondition(format!("invalid object handle {handle}"))),
    }
}

/// `RwLock` read/write guards are both forgotten on acquire (see above), so
/// unlock releases unconditionally; this matches the documented-form
/// handler contract rather than tracking guard kind (distilled spec's
/// "documented-form handlers are authoritative").
fn rwlock_unlock(ctx: &mut SyscallCtx) -> VmResult<()> {
    let handle = ctx.pop_ref()?;
    match ctx.runtime.objects.get(handle) {
        Some(obj) => match &*obj {
            VmObject::RwLockObj(l) => {
                unsafe {
                    l.force_unlock_write();
                }
                ctx.push_i64(0);
                Ok(())
            }
            _ => Err(ctx.precondition(format!("object {handle} is not a rwlock"))),
        },
        None => Err(ctx.precondition(format!("invalid object handle {handle}"))),
    }
}

fn rwlock_destroy(ctx: &mut SyscallCtx) -> VmResult<()> {
    let handle = ctx.pop_ref()?;
    ctx.runtime.objects.remove(handle);
    ctx.push_i64(0);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::Runtime;
    use crate::stack::OperandStack;

    fn ctx<'a>(stack: &'a mut OperandStack, runtime: &'a Runtime) -> SyscallCtx<'a> {
        SyscallCtx { stack, runtime, pc: 0 }
    }

    #[test]
    fn mutex_create_lock_unlock_destroy() {
        let runtime = Runtime::new();
        let mut stack = OperandStack::new();

        mutex_create(&mut ctx(&mut stack, &runtime)).unwrap();
        let handle = match stack.pop(0).unwrap() {
            Value::Ref(h) => h,
            _ => panic!(),
        };

        stack.push(Value::Ref(handle));
        mutex_lock(&mut ctx(&mut stack, &runtime)).unwrap();
        assert_eq!(stack.pop(0).unwrap(), Value::I64(0));

        stack.push(Value::Ref(handle));
        mutex_unlock(&mut ctx(&mut stack, &runtime)).unwrap();
        assert_eq!(stack.pop(0).unwrap(), Value::I64(0));

        stack.push(Value::Ref(handle));
        mutex_destroy(&mut ctx(&mut stack, &runtime)).unwrap();
        assert_eq!(stack.pop(0).unwrap(), Value::I64(0));
    }

    #[test]
    fn semaphore_wait_blocks_until_post() {
        let runtime = Runtime::new();
        let mut stack = OperandStack::new();
        stack.push(Value::I64(0));
        sem_create(&mut ctx(&mut stack, &runtime)).unwrap();
        let handle = match stack.pop(0).unwrap() {
            Value::Ref(h) => h,
            _ => panic!(),
        };

        stack.push(Value::Ref(handle));
        sem_post(&mut ctx(&mut stack, &runtime)).unwrap();
        assert_eq!(stack.pop(0).unwrap(), Value::I64(0));

        stack.push(Value::Ref(handle));
        sem_wait(&mut ctx(&mut stack, &runtime)).unwrap();
        assert_eq!(stack.pop(0).unwrap(), Value::I64(0));
    }

    #[test]
    fn lock_on_wrong_object_kind_is_precondition_violation() {
        let runtime = Runtime::new();
        let mut stack = OperandStack::new();
        cond_create(&mut ctx(&mut stack, &runtime)).unwrap();
        let handle = match stack.pop(0).unwrap() {
            Value::Ref(h) => h,
            _ => panic!(),
        };
        stack.push(Value::Ref(handle));
        let err = mutex_lock(&mut ctx(&mut stack, &runtime)).unwrap_err();
        assert!(matches!(err, crate::error::VmError::SyscallPrecondition { .. }));
    }
}

// Copyright (c) The water-vm Authors
// SPDX-License-Identifier: Apache-2.0

//! Environment & system-info syscalls, family `0x1900` (distilled spec
//! §4.5). `RANDOM_BYTES` draws from `rand`'s OS-backed default generator
//! and is bounded at 10,000,000 bytes per call per the distilled spec's
//! stated limit.

use std::collections::HashMap;

use parking_lot::RwLock;
use rand::RngCore;

use super::{SyscallCtx, SyscallDispatcher};
use crate::error::VmResult;
use crate::opcode::syscalls as sc;
use crate::value::Value;

pub const MAX_RANDOM_BYTES: i64 = 10_000_000;

/// Process-local environment variable overrides set via `SETENV`, checked
/// before falling back to the real OS environment on `GETENV` (distilled
/// spec §3: "environment registry"). An override entry of `None` is a
/// tombstone recording that `SETENV` deleted the key (distilled spec §4.5:
/// "null value deletes"), so a real OS environment variable of the same
/// name is shadowed rather than showing back through.
#[derive(Default)]
pub struct EnvRegistry {
    overrides: RwLock<HashMap<String, Option<String>>>,
}

impl EnvRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<String> {
        if let Some(entry) = self.overrides.read().get(key) {
            return entry.clone();
        }
        std::env::var(key).ok()
    }

    /// `SETENV(key, value?, overwrite)`: a `None` value deletes the key
    /// (tombstones it so it no longer shows through from the real OS
    /// environment either); `overwrite == false` is a no-clobber set that
    /// leaves an already-set key (override or real OS variable)
    /// untouched (distilled spec §4.5).
    pub fn set(&self, key: String, value: Option<String>, overwrite: bool) {
        let mut overrides = self.overrides.write();
        if !overwrite && value.is_some() {
            let already_set = match overrides.get(&key) {
                Some(entry) => entry.is_some(),
                None => std::env::var(&key).is_ok(),
            };
            if already_set {
                return;
            }
        }
        overrides.insert(key, value);
    }

    pub fn snapshot(&self) -> HashMap<String, String> {
        let mut map: HashMap<String, String> = std::env::vars().collect();
        for (key, value) in self.overrides.read().iter() {
            match value {
                Some(v) => {
                    map.insert(key.clone(), v.clone());
                }
                None => {
                    map.remove(key);
                }
            }
        }
        map
    }
}

pub fn install(d: &mut SyscallDispatcher) {
    d.register(sc::GETENV, getenv);
    d.register(sc::SETENV, setenv);
    d.register(sc::NCPU, ncpu);
    d.register(sc::RANDOM_BYTES, random_bytes);
    d.register(sc::ERRNO, errno);
    d.register(sc::ERRSTR, errstr);
    d.register(sc::MEMINFO, meminfo);
}

fn getenv(ctx: &mut SyscallCtx) -> VmResult<()> {
    let key = ctx.pop_text()?;
    match ctx.runtime.env.get(&key) {
        Some(value) => ctx.push(Value::Text(value)),
        None => ctx.push(Value::Null),
    }
    Ok(())
}

/// `SETENV(key, value?, overwrite)` (distilled spec §4.5): arguments are
/// popped in reverse of their documented order since the operand stack is
/// LIFO, so `overwrite` comes off first, then the optional `value`, then
/// `key`.
fn setenv(ctx: &mut SyscallCtx) -> VmResult<()> {
    let overwrite = ctx.pop_int()? != 0;
    let value = ctx.pop_optional_text()?;
    let key = ctx.pop_text()?;
    ctx.runtime.env.set(key, value, overwrite);
    ctx.push_i64(0);
    Ok(())
}

fn ncpu(ctx: &mut SyscallCtx) -> VmResult<()> {
    ctx.push_i64(num_cpus::get() as i64);
    Ok(())
}

fn random_bytes(ctx: &mut SyscallCtx) -> VmResult<()> {
    let len = ctx.pop_int()?;
    if !(0..=MAX_RANDOM_BYTES).contains(&len) {
        return Err(ctx.precondition(format!(
            "RANDOM_BYTES length {len} exceeds the {MAX_RANDOM_BYTES} byte limit"
        )));
    }
    let mut buf = vec![0u8; len as usize];
    rand::thread_rng().fill_bytes(&mut buf);
    ctx.push(Value::Bytes(buf));
    Ok(())
}

fn errno(ctx: &mut SyscallCtx) -> VmResult<()> {
    ctx.push_i64(crate::error::last_errno().0 as i64);
    Ok(())
}

fn errstr(ctx: &mut SyscallCtx) -> VmResult<()> {
    ctx.push(Value::Text(crate::error::last_errno().message()));
    Ok(())
}

/// Best-effort process memory info; `/proc/self/statm` on Linux, a
/// zeroed-out reading elsewhere rather than a hard failure, since this is
/// advisory (distilled spec lists it under system info, not under a
/// guaranteed-accurate contract).
fn meminfo(ctx: &mut SyscallCtx) -> VmResult<()> {
    let rss_bytes = read_rss_bytes().unwrap_or(0);
    let result = serde_json::json!({ "rss_bytes": rss_bytes });
    ctx.push(Value::Text(result.to_string()));
    Ok(())
}

#[cfg(target_os = "linux")]
fn read_rss_bytes() -> Option<i64> {
    let statm = std::fs::read_to_string("/proc/self/statm").ok()?;
    let pages: i64 = statm.split_whitespace().nth(1)?.parse().ok()?;
    Some(pages * 4096)
}

#[cfg(not(target_os = "linux"))]
fn read_rss_bytes() -> Option<i64> {
    None
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
    fn setenv_then_getenv_round_trips() {
        let runtime = Runtime::new();
        let mut stack = OperandStack::new();
        stack.push(Value::Text("WATER_TEST_VAR".into()));
        stack.push(Value::Text("42".into()));
        stack.push(Value::I64(1));
        setenv(&mut ctx(&mut stack, &runtime)).unwrap();
        assert_eq!(stack.pop(0).unwrap(), Value::I64(0));

        stack.push(Value::Text("WATER_TEST_VAR".into()));
        getenv(&mut ctx(&mut stack, &runtime)).unwrap();
        assert_eq!(stack.pop(0).unwrap(), Value::Text("42".into()));
    }

    /// `SETENV(key, null, overwrite)` deletes the key (distilled spec
    /// §4.5: "null value deletes"), shadowing it even if a real OS
    /// environment variable of the same name exists.
    #[test]
    fn setenv_with_null_value_deletes_the_key() {
        let runtime = Runtime::new();
        let mut stack = OperandStack::new();
        stack.push(Value::Text("WATER_DELETE_VAR".into()));
        stack.push(Value::Text("1".into()));
        stack.push(Value::I64(1));
        setenv(&mut ctx(&mut stack, &runtime)).unwrap();
        stack.pop(0).unwrap();

        stack.push(Value::Text("WATER_DELETE_VAR".into()));
        stack.push(Value::Null);
        stack.push(Value::I64(1));
        setenv(&mut ctx(&mut stack, &runtime)).unwrap();
        stack.pop(0).unwrap();

        stack.push(Value::Text("WATER_DELETE_VAR".into()));
        getenv(&mut ctx(&mut stack, &runtime)).unwrap();
        assert_eq!(stack.pop(0).unwrap(), Value::Null);
    }

    /// `overwrite == 0` on an already-set key is a no-clobber set: the
    /// existing value is left untouched (distilled spec §4.5).
    #[test]
    fn setenv_without_overwrite_does_not_clobber_an_existing_value() {
        let runtime = Runtime::new();
        let mut stack = OperandStack::new();
        stack.push(Value::Text("WATER_NO_CLOBBER_VAR".into()));
        stack.push(Value::Text("first".into()));
        stack.push(Value::I64(1));
        setenv(&mut ctx(&mut stack, &runtime)).unwrap();
        stack.pop(0).unwrap();

        stack.push(Value::Text("WATER_NO_CLOBBER_VAR".into()));
        stack.push(Value::Text("second".into()));
        stack.push(Value::I64(0));
        setenv(&mut ctx(&mut stack, &runtime)).unwrap();
        stack.pop(0).unwrap();

        stack.push(Value::Text("WATER_NO_CLOBBER_VAR".into()));
        getenv(&mut ctx(&mut stack, &runtime)).unwrap();
        assert_eq!(stack.pop(0).unwrap(), Value::Text("first".into()));
    }

    #[test]
    fn getenv_on_missing_key_pushes_null() {
        let runtime = Runtime::new();
        let mut stack = OperandStack::new();
        stack.push(Value::Text("WATER_DEFINITELY_UNSET_VAR".into()));
        getenv(&mut ctx(&mut stack, &runtime)).unwrap();
        assert_eq!(stack.pop(0).unwrap(), Value::Null);
    }

    #[test]
    fn random_bytes_over_limit_is_precondition_violation() {
        let runtime = Runtime::new();
        let mut stack = OperandStack::new();
        stack.push(Value::I64(MAX_RANDOM_BYTES + 1));
        let err = random_bytes(&mut ctx(&mut stack, &runtime)).unwrap_err();
        assert!(matches!(err, crate::error::VmError::SyscallPrecondition { .. }));
    }

    #[test]
    fn random_bytes_returns_requested_length() {
        let runtime = Runtime::new();
        let mut stack = OperandStack::new();
        stack.push(Value::I64(16));
        random_bytes(&mut ctx(&mut stack, &runtime)).unwrap();
        match stack.pop(0).unwrap() {
            Value::Bytes(b) => assert_eq!(b.len(), 16),
            _ => panic!(),
        }
    }
}

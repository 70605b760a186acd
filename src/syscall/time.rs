// Copyright (c) The water-vm Authors
// SPDX-License-Identifier: Apache-2.0

//! Time syscalls, family `0x1700` (distilled spec §4.5). `TICK_MS` is a
//! monotonic millisecond counter from an arbitrary epoch, distinct from
//! `TIMEOFDAY`'s wall-clock reading (distilled spec: "must not be affected
//! by clock adjustments").

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use super::{SyscallCtx, SyscallDispatcher};
use crate::error::VmResult;

pub fn install(d: &mut SyscallDispatcher) {
    d.register(sc::CLOCK_GETTIME, clock_gettime);
    d.register(sc::NANOSLEEP, nanosleep);
    d.register(sc::TIMEOFDAY, timeofday);
    d.register(sc::TICK_MS, tick_ms);
}

use crate::opcode::syscalls as sc;

/// Process-start epoch shared by every monotonic reading (`CLOCK_GETTIME`'s
/// monotonic clock and `TICK_MS`), so both advance instead of measuring
/// elapsed time against an `Instant` created on the same line.
fn monotonic_start() -> std::time::Instant {
    static START: std::sync::OnceLock<std::time::Instant> = std::sync::OnceLock::new();
    *START.get_or_init(std::time::Instant::now)
}

fn clock_gettime(ctx: &mut SyscallCtx) -> VmResult<()> {
    let clock_id = ctx.pop_optional_int()?.unwrap_or(0);
    let base = if clock_id == 1 {
        monotonic_start().elapsed()
    } else {
        SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or(Duration::ZERO)
    };
    ctx.push_i64(base.as_nanos() as i64);
    Ok(())
}

fn nanosleep(ctx: &mut SyscallCtx) -> VmResult<()> {
    let nanos = ctx.pop_int()?.max(0) as u64;
    std::thread::sleep(Duration::from_nanos(nanos));
    ctx.push_i64(0);
    Ok(())
}

/// `TIMEOFDAY() -> (sec, usec)` (distilled spec §4.5): pushes `sec` then
/// `usec`, matching `PIPE`'s read-then-write convention so the
/// first-named result sits deeper on the stack and the last-named is on
/// top.
fn timeofday(ctx: &mut SyscallCtx) -> VmResult<()> {
    let now = SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or(Duration::ZERO);
    ctx.push_i64(now.as_secs() as i64);
    ctx.push_i64(now.subsec_micros() as i64);
    Ok(())
}

/// Monotonic milliseconds since process start (distinct epoch from
/// `CLOCK_GETTIME`'s monotonic clock, but the same underlying `Instant`).
fn tick_ms(ctx: &mut SyscallCtx) -> VmResult<()> {
    ctx.push_i64(monotonic_start().elapsed().as_millis() as i64);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::Runtime;
    use crate::stack::OperandStack;
    use crate::value::Value;

    fn ctx<'a>(stack: &'a mut OperandStack, runtime: &'a Runtime) -> SyscallCtx<'a> {
        SyscallCtx { stack, runtime, pc: 0 }
    }

    #[test]
    fn tick_ms_is_monotonic() {
        let runtime = Runtime::new();
        let mut stack = OperandStack::new();
        tick_ms(&mut ctx(&mut stack, &runtime)).unwrap();
        let first = match stack.pop(0).unwrap() {
            Value::I64(v) => v,
            _ => panic!(),
        };
        std::thread::sleep(Duration::from_millis(5));
        tick_ms(&mut ctx(&mut stack, &runtime)).unwrap();
        let second = match stack.pop(0).unwrap() {
            Value::I64(v) => v,
            _ => panic!(),
        };
        assert!(second >= first);
    }

    #[test]
    fn timeofday_pushes_sec_then_usec_with_usec_on_top() {
        let runtime = Runtime::new();
        let mut stack = OperandStack::new();
        timeofday(&mut ctx(&mut stack, &runtime)).unwrap();
        let usec = match stack.pop(0).unwrap() {
            Value::I64(v) => v,
            _ => panic!(),
        };
        let sec = match stack.pop(0).unwrap() {
            Value::I64(v) => v,
            _ => panic!(),
        };
        assert!(sec > 1_700_000_000);
        assert!((0..1_000_000).contains(&usec));
    }
}

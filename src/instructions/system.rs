// Copyright (c) The water-vm Authors
// SPDX-License-Identifier: Apache-2.0

//! `HALT`, `SYSCALL`, `DEBUG_TRAP` — system ops, family `0x0400` (distilled
//! spec §4.3/§4.4). `SYSCALL` is the only instruction that reaches outside
//! the pure (stack, locals, call stack) triple: it borrows the process-wide
//! `Runtime`'s syscall dispatch table (C7) to marshal arguments off the
//! operand stack and push a result.

use super::ExecContext;
use crate::error::VmResult;
use crate::opcode;
use crate::syscall::SyscallCtx;
use crate::HALT_SENTINEL;

/// `HALT`: terminates the interpreter loop cleanly (distilled spec §4.4,
/// §7 "HALT opcode" is a fatal-but-clean condition).
pub fn halt(ctx: &mut ExecContext) -> VmResult<()> {
    ctx.next_pc = HALT_SENTINEL;
    Ok(())
}

/// `SYSCALL <opcode_int> [args...]`: the embedded opcode selects the
/// handler in the runtime's syscall dispatch table; handler arguments and
/// results flow through the operand stack, never through this
/// instruction's own textual operands (distilled spec §4.4/§4.5).
pub fn syscall(ctx: &mut ExecContext) -> VmResult<()> {
    let token = ctx.operand(0)?;
    let syscall_opcode = opcode::parse_int_literal(token)
        .and_then(|v| u32::try_from(v).ok())
        .ok_or_else(|| crate::error::VmError::MalformedInstruction {
            pc: ctx.pc,
            reason: format!("syscall operand {token:?} is not a valid opcode"),
        })?;
    let mut syscall_ctx = SyscallCtx {
        stack: ctx.stack,
        runtime: ctx.runtime,
        pc: ctx.pc,
    };
    ctx.runtime.syscalls.dispatch(syscall_opcode, &mut syscall_ctx)
}

/// `DEBUG_TRAP`: a no-op breakpoint hook for interactive debugging —
/// emits the current pc/stack/call-stack depth at `info` level and falls
/// through. Distilled spec only reserves the opcode; DEBUG mode's actual
/// state dump happens in the launcher after the loop exits (§6), so this
/// trap is for mid-run visibility rather than the final summary.
pub fn debug_trap(ctx: &mut ExecContext) -> VmResult<()> {
    tracing::info!(
        pc = ctx.pc,
        stack_depth = ctx.stack.len(),
        call_depth = ctx.call_stack.depth(),
        "DEBUG_TRAP"
    );
    Ok(())
}

/// Registers `HALT, SYSCALL, DEBUG_TRAP` (distilled spec §6, family `0x0400`).
pub fn install(d: &mut crate::dispatch::Dispatcher) {
    d.register(crate::opcode::HALT, halt);
    d.register(crate::opcode::SYSCALL, syscall);
    d.register(crate::opcode::DEBUG_TRAP, debug_trap);
}

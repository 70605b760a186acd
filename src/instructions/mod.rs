// Copyright (c) The water-vm Authors
// SPDX-License-Identifier: Apache-2.0

//! The instruction set (distilled spec §4.3/§4.4/C6): one function per
//! opcode, grouped by family into sibling modules. Every instruction
//! function has the same shape, `fn(&mut ExecContext) -> VmResult<()>`,
//! matching the syscall subsystem's `SyscallFn` shape in spirit (distilled
//! spec's "prefer a flat function table over an inheritance hierarchy").

pub mod arithmetic;
pub mod bitwise;
pub mod compare;
pub mod control;
pub mod convert;
pub mod memory;
pub mod stack_ops;
pub mod system;

use std::cell::RefCell;
use std::rc::Rc;

use crate::error::{Pc, VmResult};
use crate::frame::CallStack;
use crate::locals::LocalVariableStore;
use crate::runtime::Runtime;
use crate::stack::OperandStack;

/// Bundles what every instruction needs: the operand stack, the call
/// stack (for the current frame's locals and for `CALL`/`RET`), the
/// process-wide runtime (for `SYSCALL`), the PC the instruction is
/// executing at, and the PC to advance to afterwards (`pc + 1` by
/// default; control-flow instructions overwrite it).
pub struct ExecContext<'a> {
    pub stack: &'a mut OperandStack,
    pub call_stack: &'a mut CallStack,
    pub runtime: &'a Runtime,
    pub pc: Pc,
    pub next_pc: i32,
    /// Whitespace-split tokens following the opcode on this line, e.g. the
    /// literal for `PUSH` or the local index for `LOAD`/`STORE`.
    pub operands: Vec<String>,
}

impl<'a> ExecContext<'a> {
    pub fn current_locals(&self) -> VmResult<Rc<RefCell<LocalVariableStore>>> {
        Ok(self.call_stack.peek(self.pc)?.locals.clone())
    }

    /// The `n`th operand token, or a malformed-instruction error if absent.
    pub fn operand(&self, n: usize) -> VmResult<&str> {
        self.operands
            .get(n)
            .map(String::as_str)
            .ok_or_else(|| crate::error::VmError::MalformedInstruction {
                pc: self.pc,
                reason: format!("expected at least {} operand(s)", n + 1),
            })
    }

    /// Every operand token from `n` onward, rejoined with single spaces.
    /// Used by the quoted `Text`/`Bytes` `PUSH` literals: the loader's
    /// fetch-time split on whitespace breaks a literal containing a space
    /// (e.g. `PUSH "Hello World"`) into several tokens, and rejoining
    /// recovers it since the `.water` grammar never requires more than one
    /// space between tokens.
    pub fn operand_rest(&self, n: usize) -> VmResult<String> {
        if n >= self.operands.len() {
            return Err(crate::error::VmError::MalformedInstruction {
                pc: self.pc,
                reason: format!("expected at least {} operand(s)", n + 1),
            });
        }
        Ok(self.operands[n..].join(" "))
    }

    pub fn operand_i32(&self, n: usize) -> VmResult<i32> {
        let token = self.operand(n)?;
        crate::opcode::parse_int_literal(token)
            .and_then(|v| i32::try_from(v).ok())
            .ok_or_else(|| crate::error::VmError::MalformedInstruction {
                pc: self.pc,
                reason: format!("operand {n} ({token:?}) is not a valid integer"),
            })
    }

    pub fn operand_usize(&self, n: usize) -> VmResult<usize> {
        let token = self.operand(n)?;
        crate::opcode::parse_int_literal(token)
            .and_then(|v| usize::try_from(v).ok())
            .ok_or_else(|| crate::error::VmError::MalformedInstruction {
                pc: self.pc,
                reason: format!("operand {n} ({token:?}) is not a valid index"),
            })
    }
}

pub type InstrFn = fn(&mut ExecContext) -> VmResult<()>;

// Copyright (c) The water-vm Authors
// SPDX-License-Identifier: Apache-2.0

//! The syscall subsystem (distilled spec §4.5/C7): a dispatch table keyed
//! by syscall opcode, argument/result marshalling through the operand
//! stack, and the concrete handlers grouped by the families fixed in §6.
//!
//! Error model (§4.5.1): handlers either return `Ok(())` after pushing a
//! result (possibly a sentinel on OS failure, with errno/errstr recorded),
//! or `Err(VmError::SyscallPrecondition { .. })` for type mismatches and
//! other precondition violations, which aborts the VM.

pub mod arrays;
pub mod channel;
pub mod concurrency;
pub mod console;
pub mod directory;
pub mod fd_table;
pub mod files;
pub mod multiplex;
pub mod objects;
pub mod process_thread;
pub mod sockets;
pub mod sysinfo;
pub mod time;

use std::collections::HashMap;

use crate::error::{Errno, Pc, VmError, VmResult};
use crate::runtime::Runtime;
use crate::stack::OperandStack;
use crate::value::{self, Value};

/// Bundles what every syscall handler needs: the operand stack to pop
/// arguments from and push results onto, the process-wide runtime
/// registries, and the PC of the `SYSCALL` instruction (for precondition
/// error messages).
pub struct SyscallCtx<'a> {
    pub stack: &'a mut OperandStack,
    pub runtime: &'a Runtime,
    pub pc: Pc,
}

impl<'a> SyscallCtx<'a> {
    pub fn pop(&mut self) -> VmResult<Value> {
        self.stack.pop(self.pc)
    }

    pub fn pop_int(&mut self) -> VmResult<i64> {
        let v = self.pop()?;
        value::expect_int(v, self.pc)
    }

    pub fn pop_text(&mut self) -> VmResult<String> {
        let v = self.pop()?;
        value::expect_text(v, self.pc)
    }

    /// Pops a value accepted as bytes by the "bytes, text, or null"
    /// syscalls (STDOUT_WRITE and friends).
    pub fn pop_bytes_like(&mut self) -> VmResult<Vec<u8>> {
        let v = self.pop()?;
        Ok(v.to_bytes())
    }

    pub fn pop_ref(&mut self) -> VmResult<u64> {
        let v = self.pop()?;
        value::expect_ref(v, self.pc)
    }

    /// A text argument that may legitimately be `Null` (e.g. `SETENV`'s
    /// value, or an optional `pid` to `WAIT`).
    pub fn pop_optional_text(&mut self) -> VmResult<Option<String>> {
        match self.pop()? {
            Value::Null => Ok(None),
            other => Ok(Some(value::expect_text(other, self.pc)?)),
        }
    }

    pub fn pop_optional_int(&mut self) -> VmResult<Option<i64>> {
        match self.pop()? {
            Value::Null => Ok(None),
            other => Ok(Some(value::expect_int(other, self.pc)?)),
        }
    }

    pub fn push(&mut self, value: Value) {
        self.stack.push(value);
    }

    pub fn push_i64(&mut self, value: i64) {
        self.push(Value::I64(value));
    }

    /// Pushes the integer sentinel for a failed OS-level call and records
    /// errno/errstr, per §4.5.1: "legitimate OS errors set errno and
    /// return the sentinel".
    pub fn fail_io(&mut self, err: &std::io::Error) {
        let errno = Errno::from_io(err);
        crate::error::set_errno(errno);
        tracing::error!(pc = self.pc, errno = errno.0, "syscall OS error: {err}");
        self.push_i64(-1);
    }

    pub fn precondition(&self, reason: impl Into<String>) -> VmError {
        VmError::SyscallPrecondition {
            pc: self.pc,
            reason: reason.into(),
        }
    }
}

pub type SyscallFn = fn(&mut SyscallCtx) -> VmResult<()>;

pub struct SyscallDispatcher {
    handlers: HashMap<u32, SyscallFn>,
}

impl SyscallDispatcher {
    pub fn new() -> Self {
        let mut dispatcher = Self {
            handlers: HashMap::new(),
        };
        dispatcher.install_defaults();
        dispatcher
    }

    /// The subsystem's "growable handler registry": additional syscalls
    /// can be registered at runtime the same way the opcode dispatcher's
    /// instruction table is grown (distilled spec §2, C5/C7).
    pub fn register(&mut self, opcode: u32, handler: SyscallFn) {
        self.handlers.insert(opcode, handler);
    }

    pub fn dispatch(&self, opcode: u32, ctx: &mut SyscallCtx) -> VmResult<()> {
        tracing::debug!(pc = ctx.pc, syscall = format!("{opcode:#06x}"), "syscall dispatch");
        match self.handlers.get(&opcode) {
            Some(handler) => handler(ctx),
            None => Err(VmError::UnknownOpcode { pc: ctx.pc, opcode }),
        }
    }

    fn install_defaults(&mut self) {
        files::install(self);
        directory::install(self);
        console::install(self);
        multiplex::install(self);
        sockets::install(self);
        process_thread::install(self);
        concurrency::install(self);
        time::install(self);
        arrays::install(self);
        sysinfo::install(self);
    }
}

impl Default for SyscallDispatcher {
    fn default() -> Self {
        Self::new()
    }
}

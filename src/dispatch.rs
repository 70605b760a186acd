// Copyright (c) The water-vm Authors
// SPDX-License-Identifier: Apache-2.0

//! Opcode dispatch (distilled spec §4.2/C5): a flat table from numeric
//! opcode to instruction function, built once at boot and consulted on
//! every fetch-decode cycle. Mirrors the syscall subsystem's
//! `SyscallDispatcher` in shape (distilled spec's "prefer a flat function
//! table over an inheritance hierarchy").

use std::collections::HashMap;

use crate::error::VmError;
use crate::instructions::{arithmetic, bitwise, compare, control, convert, memory, stack_ops, system, ExecContext, InstrFn};
use crate::opcode::{self, TypeFamily};

pub struct Dispatcher {
    handlers: HashMap<u32, InstrFn>,
}

impl Dispatcher {
    pub fn new() -> Self {
        let mut dispatcher = Self {
            handlers: HashMap::new(),
        };
        dispatcher.install_defaults();
        dispatcher
    }

    pub fn register(&mut self, opcode: u32, handler: InstrFn) {
        self.handlers.insert(opcode, handler);
    }

    /// Looks up and runs the handler for `opcode`, returning the PC to
    /// resume at (`ctx.next_pc` after the handler ran). `UnknownOpcode`
    /// aborts the VM, per distilled spec §4.2 step 4.
    pub fn handle(&self, opcode: u32, ctx: &mut ExecContext) -> crate::error::VmResult<i32> {
        match self.handlers.get(&opcode) {
            Some(handler) => {
                handler(ctx)?;
                Ok(ctx.next_pc)
            }
            None => Err(VmError::UnknownOpcode { pc: ctx.pc, opcode }),
        }
    }

    fn install_defaults(&mut self) {
        arithmetic::install(self);
        bitwise::install(self);
        compare::install(self);
        convert::install(self);
        stack_ops::install(self);
        control::install(self);
        memory::install(self);
        system::install(self);
    }
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self::new()
    }
}

/// Per-family (Byte8/Short16/Int32/Long64/Float32/Double64) function
/// lookup, shared by every instruction submodule's `install`.
pub(crate) fn for_each_family(mut register: impl FnMut(TypeFamily)) {
    for family in TypeFamily::ALL {
        register(family);
    }
}

// Copyright (c) The water-vm Authors
// SPDX-License-Identifier: Apache-2.0

//! `LOAD`, `STORE` (one opcode per scalar type family, family blocks
//! `0x0000-0x00BF`) and `MOV` (untyped, family `0x0300`). Distilled spec
//! §4.4: "value type carried through is the dynamic type of the slot" —
//! `LOAD`/`STORE` never check the popped/pushed value against the opcode's
//! nominal type family, they just move whatever `Value` lives in the slot.
//! The per-type opcode slots exist for the upstream compiler's benefit
//! (it emits the family matching the static type it inferred), not because
//! the runtime enforces anything: one implementation covers all of them.

use super::ExecContext;
use crate::error::VmResult;

/// `LOAD index`: pushes the value at local `index` (or `Null` if unset).
pub fn load(ctx: &mut ExecContext) -> VmResult<()> {
    let index = ctx.operand_usize(0)?;
    let locals = ctx.current_locals()?;
    let value = locals.borrow().load(index);
    ctx.stack.push(value);
    Ok(())
}

/// `STORE index`: pops and writes to local `index`, growing the store with
/// `Null` fill if needed.
pub fn store(ctx: &mut ExecContext) -> VmResult<()> {
    let index = ctx.operand_usize(0)?;
    let value = ctx.stack.pop(ctx.pc)?;
    let locals = ctx.current_locals()?;
    locals.borrow_mut().store(index, value);
    Ok(())
}

/// `MOV src, dst`: copies within locals, carrying the dynamic type of the
/// source slot. No stack interaction.
pub fn mov(ctx: &mut ExecContext) -> VmResult<()> {
    let src = ctx.operand_usize(0)?;
    let dst = ctx.operand_usize(1)?;
    let locals = ctx.current_locals()?;
    locals.borrow_mut().mov(src, dst);
    Ok(())
}

/// Registers `LOAD, STORE` for every scalar type family (the same
/// implementation for each, per this module's doc comment) and the single
/// untyped `MOV`.
pub fn install(d: &mut crate::dispatch::Dispatcher) {
    use crate::opcode::{load_opcode, store_opcode, TypeFamily};

    for family in TypeFamily::ALL {
        d.register(load_opcode(family), load);
        d.register(store_opcode(family), store);
    }
    d.register(crate::opcode::MOV, mov);
}

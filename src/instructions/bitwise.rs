// Copyright (c) The water-vm Authors
// SPDX-License-Identifier: Apache-2.0

//! `AND, OR, XOR`, integer type families only (distilled spec §4.3); there
//! is no bitwise family for `Float32`/`Double64`.

use super::ExecContext;
use crate::error::VmResult;
use crate::value::{self, Value};

macro_rules! bitwise_int {
    ($and:ident, $or:ident, $xor:ident, $expect:ident, $variant:ident) => {
        pub fn $and(ctx: &mut ExecContext) -> VmResult<()> {
            let b = value::$expect(ctx.stack.pop(ctx.pc)?, ctx.pc)?;
            let a = value::$expect(ctx.stack.pop(ctx.pc)?, ctx.pc)?;
            ctx.stack.push(Value::$variant(a & b));
            Ok(())
        }
        pub fn $or(ctx: &mut ExecContext) -> VmResult<()> {
            let b = value::$expect(ctx.stack.pop(ctx.pc)?, ctx.pc)?;
            let a = value::$expect(ctx.stack.pop(ctx.pc)?, ctx.pc)?;
            ctx.stack.push(Value::$variant(a | b));
            Ok(())
        }
        pub fn $xor(ctx: &mut ExecContext) -> VmResult<()> {
            let b = value::$expect(ctx.stack.pop(ctx.pc)?, ctx.pc)?;
            let a = value::$expect(ctx.stack.pop(ctx.pc)?, ctx.pc)?;
            ctx.stack.push(Value::$variant(a ^ b));
            Ok(())
        }
    };
}

bitwise_int!(and_i8, or_i8, xor_i8, expect_i8, I8);
bitwise_int!(and_i16, or_i16, xor_i16, expect_i16, I16);
bitwise_int!(and_i32, or_i32, xor_i32, expect_i32, I32);
bitwise_int!(and_i64, or_i64, xor_i64, expect_i64, I64);

/// Registers `AND, OR, XOR` for the four integer type families into the
/// opcode dispatch table. Float families have no bitwise opcodes.
pub fn install(d: &mut crate::dispatch::Dispatcher) {
    use crate::opcode::{and_opcode, or_opcode, xor_opcode, TypeFamily};

    d.register(and_opcode(TypeFamily::Byte8), and_i8);
    d.register(or_opcode(TypeFamily::Byte8), or_i8);
    d.register(xor_opcode(TypeFamily::Byte8), xor_i8);

    d.register(and_opcode(TypeFamily::Short16), and_i16);
    d.register(or_opcode(TypeFamily::Short16), or_i16);
    d.register(xor_opcode(TypeFamily::Short16), xor_i16);

    d.register(and_opcode(TypeFamily::Int32), and_i32);
    d.register(or_opcode(TypeFamily::Int32), or_i32);
    d.register(xor_opcode(TypeFamily::Int32), xor_i32);

    d.register(and_opcode(TypeFamily::Long64), and_i64);
    d.register(or_opcode(TypeFamily::Long64), or_i64);
    d.register(xor_opcode(TypeFamily::Long64), xor_i64);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::{CallStack, StackFrame};
    use crate::locals::LocalVariableStore;
    use crate::runtime::Runtime;
    use crate::stack::OperandStack;
    use std::cell::RefCell;
    use std::rc::Rc;

    #[test]
    fn i32_xor_of_equal_operands_is_zero() {
        let runtime = Runtime::new();
        let mut stack = OperandStack::new();
        let mut call_stack = CallStack::new();
        call_stack.push(StackFrame::root(Rc::new(RefCell::new(LocalVariableStore::new()))));
        stack.push(Value::I32(7));
        stack.push(Value::I32(7));
        let mut ctx = ExecContext {
            stack: &mut stack,
            call_stack: &mut call_stack,
            runtime: &runtime,
            pc: 0,
            next_pc: 1,
            operands: Vec::new(),
        };
        xor_i32(&mut ctx).unwrap();
        assert_eq!(stack.pop(0).unwrap(), Value::I32(0));
    }
}

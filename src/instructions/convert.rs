// Copyright (c) The water-vm Authors
// SPDX-License-Identifier: Apache-2.0

//! The thirty `X2Y` conversions between `{B, S, I, L, F, D}` (distilled
//! spec §4.3/§6). Every conversion is a plain Rust `as` cast: integer
//! narrowing truncates to the low bits, integer widening sign-extends,
//! and any cast through a float saturates at the destination's
//! representable range (Rust's `as` has used saturating float-to-int
//! casts since 1.45, which is exactly this contract).

use super::ExecContext;
use crate::error::VmResult;
use crate::opcode::TypeFamily;
use crate::value::{self, Value};

macro_rules! convert_fn {
    ($name:ident, $expect:ident, $dst_variant:ident, $dst_ty:ty) => {
        pub fn $name(ctx: &mut ExecContext) -> VmResult<()> {
            let src = value::$expect(ctx.stack.pop(ctx.pc)?, ctx.pc)?;
            ctx.stack.push(Value::$dst_variant(src as $dst_ty));
            Ok(())
        }
    };
}

convert_fn!(b2s, expect_i8, I16, i16);
convert_fn!(b2i, expect_i8, I32, i32);
convert_fn!(b2l, expect_i8, I64, i64);
convert_fn!(b2f, expect_i8, F32, f32);
convert_fn!(b2d, expect_i8, F64, f64);

convert_fn!(s2b, expect_i16, I8, i8);
convert_fn!(s2i, expect_i16, I32, i32);
convert_fn!(s2l, expect_i16, I64, i64);
convert_fn!(s2f, expect_i16, F32, f32);
convert_fn!(s2d, expect_i16, F64, f64);

convert_fn!(i2b, expect_i32, I8, i8);
convert_fn!(i2s, expect_i32, I16, i16);
convert_fn!(i2l, expect_i32, I64, i64);
convert_fn!(i2f, expect_i32, F32, f32);
convert_fn!(i2d, expect_i32, F64, f64);

convert_fn!(l2b, expect_i64, I8, i8);
convert_fn!(l2s, expect_i64, I16, i16);
convert_fn!(l2i, expect_i64, I32, i32);
convert_fn!(l2f, expect_i64, F32, f32);
convert_fn!(l2d, expect_i64, F64, f64);

convert_fn!(f2b, expect_f32, I8, i8);
convert_fn!(f2s, expect_f32, I16, i16);
convert_fn!(f2i, expect_f32, I32, i32);
convert_fn!(f2l, expect_f32, I64, i64);
convert_fn!(f2d, expect_f32, F64, f64);

convert_fn!(d2b, expect_f64, I8, i8);
convert_fn!(d2s, expect_f64, I16, i16);
convert_fn!(d2i, expect_f64, I32, i32);
convert_fn!(d2l, expect_f64, I64, i64);
convert_fn!(d2f, expect_f64, F32, f32);

/// Looks up the conversion function for a `(src, dst)` pair, used by the
/// dispatcher's registration loop over `opcode::conversion_pairs()`.
pub fn conversion_fn(src: TypeFamily, dst: TypeFamily) -> super::InstrFn {
    use TypeFamily::*;
    match (src, dst) {
        (Byte8, Short16) => b2s,
        (Byte8, Int32) => b2i,
        (Byte8, Long64) => b2l,
        (Byte8, Float32) => b2f,
        (Byte8, Double64) => b2d,

        (Short16, Byte8) => s2b,
        (Short16, Int32) => s2i,
        (Short16, Long64) => s2l,
        (Short16, Float32) => s2f,
        (Short16, Double64) => s2d,

        (Int32, Byte8) => i2b,
        (Int32, Short16) => i2s,
        (Int32, Long64) => i2l,
        (Int32, Float32) => i2f,
        (Int32, Double64) => i2d,

        (Long64, Byte8) => l2b,
        (Long64, Short16) => l2s,
        (Long64, Int32) => l2i,
        (Long64, Float32) => l2f,
        (Long64, Double64) => l2d,

        (Float32, Byte8) => f2b,
        (Float32, Short16) => f2s,
        (Float32, Int32) => f2i,
        (Float32, Long64) => f2l,
        (Float32, Double64) => f2d,

        (Double64, Byte8) => d2b,
        (Double64, Short16) => d2s,
        (Double64, Int32) => d2i,
        (Double64, Long64) => d2l,
        (Double64, Float32) => d2f,

        (a, b) if a == b => unreachable!("no self-conversion opcode is ever allocated"),
        _ => unreachable!("all 30 ordered pairs are covered above"),
    }
}

/// Registers all thirty `X2Y` conversion opcodes into the dispatch table.
pub fn install(d: &mut crate::dispatch::Dispatcher) {
    for (src, dst) in crate::opcode::conversion_pairs() {
        d.register(crate::opcode::conversion_opcode(src, dst), conversion_fn(src, dst));
    }
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

    fn exec(f: impl FnOnce(&mut ExecContext)) -> OperandStack {
        let runtime = Runtime::new();
        let mut stack = OperandStack::new();
        let mut call_stack = CallStack::new();
        call_stack.push(StackFrame::root(Rc::new(RefCell::new(LocalVariableStore::new()))));
        let mut ctx = ExecContext {
            stack: &mut stack,
            call_stack: &mut call_stack,
            runtime: &runtime,
            pc: 0,
            next_pc: 1,
            operands: Vec::new(),
        };
        f(&mut ctx);
        stack
    }

    #[test]
    fn long_to_byte_truncates() {
        let mut stack = exec(|ctx| {
            ctx.stack.push(Value::I64(0x1FF));
            l2b(ctx).unwrap();
        });
        assert_eq!(stack.pop(0).unwrap(), Value::I8(-1));
    }

    #[test]
    fn byte_to_long_sign_extends() {
        let mut stack = exec(|ctx| {
            ctx.stack.push(Value::I8(-1));
            b2l(ctx).unwrap();
        });
        assert_eq!(stack.pop(0).unwrap(), Value::I64(-1));
    }

    #[test]
    fn double_to_byte_saturates_above_range() {
        let mut stack = exec(|ctx| {
            ctx.stack.push(Value::F64(1.0e30));
            d2b(ctx).unwrap();
        });
        assert_eq!(stack.pop(0).unwrap(), Value::I8(i8::MAX));
    }

    #[test]
    fn conversion_fn_matches_opcode_pairs() {
        for (src, dst) in crate::opcode::conversion_pairs() {
            let _ = conversion_fn(src, dst);
        }
    }
}

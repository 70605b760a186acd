// Copyright (c) The water-vm Authors
// SPDX-License-Identifier: Apache-2.0

//! `ADD, SUB, MUL, DIV, MOD, NEG, INC`, one function per scalar type
//! (distilled spec §4.3). Integer arithmetic wraps on overflow (two's
//! complement); float arithmetic is plain IEEE-754 and division by zero
//! yields `inf`/`NaN` rather than aborting, unlike the integer case.
//! `INC index, delta` is the one family member that never touches the
//! operand stack: it reads, bumps, and writes back a local slot in place.

use super::ExecContext;
use crate::error::{VmError, VmResult};
use crate::value::{self, Value};

macro_rules! int_binop {
    ($add:ident, $sub:ident, $mul:ident, $div:ident, $rem:ident, $neg:ident, $expect:ident, $variant:ident, $ty:ty) => {
        pub fn $add(ctx: &mut ExecContext) -> VmResult<()> {
            let b = value::$expect(ctx.stack.pop(ctx.pc)?, ctx.pc)?;
            let a = value::$expect(ctx.stack.pop(ctx.pc)?, ctx.pc)?;
            ctx.stack.push(Value::$variant(a.wrapping_add(b)));
            Ok(())
        }
        pub fn $sub(ctx: &mut ExecContext) -> VmResult<()> {
            let b = value::$expect(ctx.stack.pop(ctx.pc)?, ctx.pc)?;
            let a = value::$expect(ctx.stack.pop(ctx.pc)?, ctx.pc)?;
            ctx.stack.push(Value::$variant(a.wrapping_sub(b)));
            Ok(())
        }
        pub fn $mul(ctx: &mut ExecContext) -> VmResult<()> {
            let b = value::$expect(ctx.stack.pop(ctx.pc)?, ctx.pc)?;
            let a = value::$expect(ctx.stack.pop(ctx.pc)?, ctx.pc)?;
            ctx.stack.push(Value::$variant(a.wrapping_mul(b)));
            Ok(())
        }
        pub fn $div(ctx: &mut ExecContext) -> VmResult<()> {
            let b = value::$expect(ctx.stack.pop(ctx.pc)?, ctx.pc)?;
            let a = value::$expect(ctx.stack.pop(ctx.pc)?, ctx.pc)?;
            if b == 0 {
                return Err(VmError::DivideByZero { pc: ctx.pc });
            }
            ctx.stack.push(Value::$variant(a.wrapping_div(b)));
            Ok(())
        }
        pub fn $rem(ctx: &mut ExecContext) -> VmResult<()> {
            let b = value::$expect(ctx.stack.pop(ctx.pc)?, ctx.pc)?;
            let a = value::$expect(ctx.stack.pop(ctx.pc)?, ctx.pc)?;
            if b == 0 {
                return Err(VmError::DivideByZero { pc: ctx.pc });
            }
            ctx.stack.push(Value::$variant(a.wrapping_rem(b)));
            Ok(())
        }
        pub fn $neg(ctx: &mut ExecContext) -> VmResult<()> {
            let a = value::$expect(ctx.stack.pop(ctx.pc)?, ctx.pc)?;
            ctx.stack.push(Value::$variant(a.wrapping_neg()));
            Ok(())
        }
    };
}

macro_rules! float_binop {
    ($add:ident, $sub:ident, $mul:ident, $div:ident, $rem:ident, $neg:ident, $expect:ident, $variant:ident, $ty:ty) => {
        pub fn $add(ctx: &mut ExecContext) -> VmResult<()> {
            let b = value::$expect(ctx.stack.pop(ctx.pc)?, ctx.pc)?;
            let a = value::$expect(ctx.stack.pop(ctx.pc)?, ctx.pc)?;
            ctx.stack.push(Value::$variant(a + b));
            Ok(())
        }
        pub fn $sub(ctx: &mut ExecContext) -> VmResult<()> {
            let b = value::$expect(ctx.stack.pop(ctx.pc)?, ctx.pc)?;
            let a = value::$expect(ctx.stack.pop(ctx.pc)?, ctx.pc)?;
            ctx.stack.push(Value::$variant(a - b));
            Ok(())
        }
        pub fn $mul(ctx: &mut ExecContext) -> VmResult<()> {
            let b = value::$expect(ctx.stack.pop(ctx.pc)?, ctx.pc)?;
            let a = value::$expect(ctx.stack.pop(ctx.pc)?, ctx.pc)?;
            ctx.stack.push(Value::$variant(a * b));
            Ok(())
        }
        pub fn $div(ctx: &mut ExecContext) -> VmResult<()> {
            let b = value::$expect(ctx.stack.pop(ctx.pc)?, ctx.pc)?;
            let a = value::$expect(ctx.stack.pop(ctx.pc)?, ctx.pc)?;
            ctx.stack.push(Value::$variant(a / b));
            Ok(())
        }
        pub fn $rem(ctx: &mut ExecContext) -> VmResult<()> {
            let b = value::$expect(ctx.stack.pop(ctx.pc)?, ctx.pc)?;
            let a = value::$expect(ctx.stack.pop(ctx.pc)?, ctx.pc)?;
            ctx.stack.push(Value::$variant(a % b));
            Ok(())
        }
        pub fn $neg(ctx: &mut ExecContext) -> VmResult<()> {
            let a = value::$expect(ctx.stack.pop(ctx.pc)?, ctx.pc)?;
            ctx.stack.push(Value::$variant(-a));
            Ok(())
        }
    };
}

/// `INC index, delta`: reads local `index`, wraps `delta` into it, writes
/// it back. No stack interaction (distilled spec §4.4).
macro_rules! int_inc {
    ($name:ident, $expect:ident, $variant:ident, $ty:ty) => {
        pub fn $name(ctx: &mut ExecContext) -> VmResult<()> {
            let index = ctx.operand_usize(0)?;
            let delta: $ty = ctx.operand(1)?.parse().map_err(|_| VmError::MalformedInstruction {
                pc: ctx.pc,
                reason: format!("operand 1 is not a valid {} delta", stringify!($ty)),
            })?;
            let locals = ctx.current_locals()?;
            let mut locals = locals.borrow_mut();
            let current = value::$expect(locals.load(index), ctx.pc)?;
            locals.store(index, Value::$variant(current.wrapping_add(delta)));
            Ok(())
        }
    };
}

macro_rules! float_inc {
    ($name:ident, $expect:ident, $variant:ident, $ty:ty) => {
        pub fn $name(ctx: &mut ExecContext) -> VmResult<()> {
            let index = ctx.operand_usize(0)?;
            let delta: $ty = ctx.operand(1)?.parse().map_err(|_| VmError::MalformedInstruction {
                pc: ctx.pc,
                reason: format!("operand 1 is not a valid {} delta", stringify!($ty)),
            })?;
            let locals = ctx.current_locals()?;
            let mut locals = locals.borrow_mut();
            let current = value::$expect(locals.load(index), ctx.pc)?;
            locals.store(index, Value::$variant(current + delta));
            Ok(())
        }
    };
}

int_binop!(add_i8, sub_i8, mul_i8, div_i8, mod_i8, neg_i8, expect_i8, I8, i8);
int_binop!(add_i16, sub_i16, mul_i16, div_i16, mod_i16, neg_i16, expect_i16, I16, i16);
int_binop!(add_i32, sub_i32, mul_i32, div_i32, mod_i32, neg_i32, expect_i32, I32, i32);
int_binop!(add_i64, sub_i64, mul_i64, div_i64, mod_i64, neg_i64, expect_i64, I64, i64);
float_binop!(add_f32, sub_f32, mul_f32, div_f32, mod_f32, neg_f32, expect_f32, F32, f32);
float_binop!(add_f64, sub_f64, mul_f64, div_f64, mod_f64, neg_f64, expect_f64, F64, f64);

int_inc!(inc_i8, expect_i8, I8, i8);
int_inc!(inc_i16, expect_i16, I16, i16);
int_inc!(inc_i32, expect_i32, I32, i32);
int_inc!(inc_i64, expect_i64, I64, i64);
float_inc!(inc_f32, expect_f32, F32, f32);
float_inc!(inc_f64, expect_f64, F64, f64);

/// Registers `ADD, SUB, MUL, DIV, MOD, NEG, INC` for every scalar type
/// family into the opcode dispatch table.
pub fn install(d: &mut crate::dispatch::Dispatcher) {
    use crate::opcode::{add_opcode, div_opcode, inc_opcode, mod_opcode, mul_opcode, neg_opcode, sub_opcode, TypeFamily};

    macro_rules! install_family {
        ($family:expr, $add:expr, $sub:expr, $mul:expr, $div:expr, $rem:expr, $neg:expr, $inc:expr) => {
            d.register(add_opcode($family), $add);
            d.register(sub_opcode($family), $sub);
            d.register(mul_opcode($family), $mul);
            d.register(div_opcode($family), $div);
            d.register(mod_opcode($family), $rem);
            d.register(neg_opcode($family), $neg);
            d.register(inc_opcode($family), $inc);
        };
    }

    install_family!(TypeFamily::Byte8, add_i8, sub_i8, mul_i8, div_i8, mod_i8, neg_i8, inc_i8);
    install_family!(TypeFamily::Short16, add_i16, sub_i16, mul_i16, div_i16, mod_i16, neg_i16, inc_i16);
    install_family!(TypeFamily::Int32, add_i32, sub_i32, mul_i32, div_i32, mod_i32, neg_i32, inc_i32);
    install_family!(TypeFamily::Long64, add_i64, sub_i64, mul_i64, div_i64, mod_i64, neg_i64, inc_i64);
    install_family!(TypeFamily::Float32, add_f32, sub_f32, mul_f32, div_f32, mod_f32, neg_f32, inc_f32);
    install_family!(TypeFamily::Double64, add_f64, sub_f64, mul_f64, div_f64, mod_f64, neg_f64, inc_f64);
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
    fn i32_add_wraps_on_overflow() {
        let mut stack = exec(|ctx| {
            ctx.stack.push(Value::I32(i32::MAX));
            ctx.stack.push(Value::I32(i32::MAX));
            add_i32(ctx).unwrap();
        });
        assert_eq!(stack.pop(0).unwrap(), Value::I32(-2));
    }

    #[test]
    fn i32_div_by_zero_aborts() {
        let runtime = Runtime::new();
        let mut stack = OperandStack::new();
        let mut call_stack = CallStack::new();
        call_stack.push(StackFrame::root(Rc::new(RefCell::new(LocalVariableStore::new()))));
        stack.push(Value::I32(10));
        stack.push(Value::I32(0));
        let mut ctx = ExecContext {
            stack: &mut stack,
            call_stack: &mut call_stack,
            runtime: &runtime,
            pc: 3,
            next_pc: 4,
            operands: Vec::new(),
        };
        let err = div_i32(&mut ctx).unwrap_err();
        assert!(matches!(err, VmError::DivideByZero { pc: 3 }));
    }

    #[test]
    fn f64_div_by_zero_is_infinity_not_an_error() {
        let mut stack = exec(|ctx| {
            ctx.stack.push(Value::F64(1.0));
            ctx.stack.push(Value::F64(0.0));
            div_f64(ctx).unwrap();
        });
        match stack.pop(0).unwrap() {
            Value::F64(v) => assert!(v.is_infinite()),
            _ => panic!(),
        }
    }

    #[test]
    fn i64_neg_wraps_at_min() {
        let mut stack = exec(|ctx| {
            ctx.stack.push(Value::I64(i64::MIN));
            neg_i64(ctx).unwrap();
        });
        assert_eq!(stack.pop(0).unwrap(), Value::I64(i64::MIN));
    }

    #[test]
    fn inc_i32_touches_locals_not_the_stack() {
        let runtime = Runtime::new();
        let mut stack = OperandStack::new();
        let mut call_stack = CallStack::new();
        let locals = Rc::new(RefCell::new(LocalVariableStore::new()));
        locals.borrow_mut().store(2, Value::I32(10));
        call_stack.push(StackFrame::root(locals.clone()));
        let mut ctx = ExecContext {
            stack: &mut stack,
            call_stack: &mut call_stack,
            runtime: &runtime,
            pc: 0,
            next_pc: 1,
            operands: vec!["2".to_string(), "5".to_string()],
        };
        inc_i32(&mut ctx).unwrap();
        assert!(ctx.stack.is_empty());
        assert_eq!(locals.borrow().load(2), Value::I32(15));
    }

    #[test]
    fn inc_i8_wraps_on_overflow() {
        let runtime = Runtime::new();
        let mut stack = OperandStack::new();
        let mut call_stack = CallStack::new();
        let locals = Rc::new(RefCell::new(LocalVariableStore::new()));
        locals.borrow_mut().store(0, Value::I8(i8::MAX));
        call_stack.push(StackFrame::root(locals.clone()));
        let mut ctx = ExecContext {
            stack: &mut stack,
            call_stack: &mut call_stack,
            runtime: &runtime,
            pc: 0,
            next_pc: 1,
            operands: vec!["0".to_string(), "1".to_string()],
        };
        inc_i8(&mut ctx).unwrap();
        assert_eq!(locals.borrow().load(0), Value::I8(i8::MIN));
    }
}

// Copyright (c) The water-vm Authors
// SPDX-License-Identifier: Apache-2.0

//! `JUMP`, `CALL`, `RET` (distilled spec §4.4, family `0x0200`). `CALL` and
//! `RET` are the only instructions that mutate the call stack; everything
//! else only ever reads the current frame's locals through it.

use super::ExecContext;
use crate::error::VmResult;
use crate::frame::StackFrame;

/// `JUMP target`: fails if `target < 0` (distilled spec §4.4).
pub fn jump(ctx: &mut ExecContext) -> VmResult<()> {
    let target = ctx.operand_i32(0)?;
    if target < 0 {
        return Err(crate::error::VmError::InvalidBranchTarget { pc: ctx.pc, target });
    }
    ctx.next_pc = target;
    Ok(())
}

/// `CALL target`: validates the target, pushes a fresh child frame whose
/// `return_pc` is `pc + 1`, and transfers control to `target`.
pub fn call(ctx: &mut ExecContext) -> VmResult<()> {
    let target = ctx.operand_i32(0)?;
    if target < 0 {
        return Err(crate::error::VmError::InvalidBranchTarget { pc: ctx.pc, target });
    }
    let caller_ctx = ctx.call_stack.peek(ctx.pc)?.ctx.clone();
    let frame = StackFrame::child(ctx.pc + 1, caller_ctx, target);
    ctx.call_stack.push(frame);
    ctx.next_pc = target;
    Ok(())
}

/// `RET`: fails if the call stack is empty; otherwise drops the departing
/// frame's locals, pops it, and transfers control to its `return_pc`. A
/// `RET` from the root frame yields `PROGRAM_END`, which is what lets the
/// main loop terminate uniformly (the root-frame trick, distilled spec
/// design notes).
pub fn ret(ctx: &mut ExecContext) -> VmResult<()> {
    ctx.call_stack.peek_mut(ctx.pc)?.locals.borrow_mut().clear();
    let frame = ctx.call_stack.pop(ctx.pc)?;
    ctx.next_pc = frame.return_pc;
    Ok(())
}

/// Registers `JUMP, CALL, RET` (distilled spec §6, family `0x0200`).
pub fn install(d: &mut crate::dispatch::Dispatcher) {
    d.register(crate::opcode::JUMP, jump);
    d.register(crate::opcode::CALL, call);
    d.register(crate::opcode::RET, ret);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::CallStack;
    use crate::locals::LocalVariableStore;
    use crate::runtime::Runtime;
    use crate::stack::OperandStack;
    use crate::value::Value;
    use crate::PROGRAM_END;
    use std::cell::RefCell;
    use std::rc::Rc;

    fn root_ctx<'a>(
        stack: &'a mut OperandStack,
        call_stack: &'a mut CallStack,
        runtime: &'a Runtime,
        pc: i32,
        operands: Vec<&str>,
    ) -> ExecContext<'a> {
        if call_stack.is_empty() {
            call_stack.push(StackFrame::root(Rc::new(RefCell::new(LocalVariableStore::new()))));
        }
        ExecContext {
            stack,
            call_stack,
            runtime,
            pc,
            next_pc: pc + 1,
            operands: operands.into_iter().map(|s| s.to_string()).collect(),
        }
    }

    #[test]
    fn jump_sets_next_pc_to_target() {
        let runtime = Runtime::new();
        let mut stack = OperandStack::new();
        let mut call_stack = CallStack::new();
        let mut ctx = root_ctx(&mut stack, &mut call_stack, &runtime, 5, vec!["40"]);
        jump(&mut ctx).unwrap();
        assert_eq!(ctx.next_pc, 40);
    }

    #[test]
    fn jump_negative_target_is_invalid() {
        let runtime = Runtime::new();
        let mut stack = OperandStack::new();
        let mut call_stack = CallStack::new();
        let mut ctx = root_ctx(&mut stack, &mut call_stack, &runtime, 5, vec!["-1"]);
        let err = jump(&mut ctx).unwrap_err();
        assert!(matches!(err, crate::error::VmError::InvalidBranchTarget { pc: 5, target: -1 }));
    }

    #[test]
    fn call_pushes_frame_and_jumps() {
        let runtime = Runtime::new();
        let mut stack = OperandStack::new();
        let mut call_stack = CallStack::new();
        let mut ctx = root_ctx(&mut stack, &mut call_stack, &runtime, 10, vec!["100"]);
        call(&mut ctx).unwrap();
        assert_eq!(ctx.next_pc, 100);
        assert_eq!(ctx.call_stack.depth(), 2);
        assert_eq!(ctx.call_stack.peek(10).unwrap().return_pc, 11);
    }

    #[test]
    fn call_then_ret_returns_to_the_instruction_after_call() {
        let runtime = Runtime::new();
        let mut stack = OperandStack::new();
        let mut call_stack = CallStack::new();
        {
            let mut ctx = root_ctx(&mut stack, &mut call_stack, &runtime, 10, vec!["100"]);
            call(&mut ctx).unwrap();
        }
        {
            let mut ctx = root_ctx(&mut stack, &mut call_stack, &runtime, 100, vec![]);
            ret(&mut ctx).unwrap();
            assert_eq!(ctx.next_pc, 11);
        }
        assert_eq!(call_stack.depth(), 1);
    }

    #[test]
    fn ret_from_root_yields_program_end() {
        let runtime = Runtime::new();
        let mut stack = OperandStack::new();
        let mut call_stack = CallStack::new();
        let mut ctx = root_ctx(&mut stack, &mut call_stack, &runtime, 0, vec![]);
        ret(&mut ctx).unwrap();
        assert_eq!(ctx.next_pc, PROGRAM_END);
        assert!(ctx.call_stack.is_empty());
    }

    #[test]
    fn ret_on_empty_call_stack_is_an_error() {
        let runtime = Runtime::new();
        let mut stack = OperandStack::new();
        let mut call_stack = CallStack::new();
        call_stack.push(StackFrame::root(Rc::new(RefCell::new(LocalVariableStore::new()))));
        ret(&mut ExecContext {
            stack: &mut stack,
            call_stack: &mut call_stack,
            runtime: &runtime,
            pc: 0,
            next_pc: 1,
            operands: Vec::new(),
        })
        .unwrap();
        let err = ret(&mut ExecContext {
            stack: &mut stack,
            call_stack: &mut call_stack,
            runtime: &runtime,
            pc: 0,
            next_pc: 1,
            operands: Vec::new(),
        })
        .unwrap_err();
        assert!(matches!(err, crate::error::VmError::EmptyCallStack { .. }));
    }

    #[test]
    fn call_does_not_disturb_the_operand_stack_or_caller_locals() {
        let runtime = Runtime::new();
        let mut stack = OperandStack::new();
        let mut call_stack = CallStack::new();
        call_stack.push(StackFrame::root(Rc::new(RefCell::new(LocalVariableStore::new()))));
        call_stack.peek(0).unwrap().locals.borrow_mut().store(0, Value::I32(7));
        stack.push(Value::I32(1));
        {
            let mut ctx = ExecContext {
                stack: &mut stack,
                call_stack: &mut call_stack,
                runtime: &runtime,
                pc: 0,
                next_pc: 1,
                operands: vec!["50".to_string()],
            };
            call(&mut ctx).unwrap();
        }
        {
            let mut ctx = ExecContext {
                stack: &mut stack,
                call_stack: &mut call_stack,
                runtime: &runtime,
                pc: 50,
                next_pc: 51,
                operands: Vec::new(),
            };
            ret(&mut ctx).unwrap();
        }
        assert_eq!(stack.len(), 1);
        assert_eq!(call_stack.peek(0).unwrap().locals.borrow().load(0), Value::I32(7));
    }
}

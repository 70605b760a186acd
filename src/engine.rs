// Copyright (c) The water-vm Authors
// SPDX-License-Identifier: Apache-2.0

//! The interpreter engine (distilled spec §4.2/C9): orchestrates the
//! fetch-decode-dispatch loop, boots the root frame, and runs locals
//! compaction on exit. This is the one piece every other component feeds
//! into — loader, dispatcher, instruction set, and syscall subsystem all
//! meet here.

use std::cell::RefCell;
use std::rc::Rc;
use std::sync::Arc;

use crate::dispatch::Dispatcher;
use crate::error::{VmError, VmResult};
use crate::frame::{CallStack, StackFrame};
use crate::instructions::ExecContext;
use crate::loader::Program;
use crate::locals::LocalVariableStore;
use crate::runtime::Runtime;
use crate::stack::OperandStack;
use crate::value::Value;
use crate::{HALT_SENTINEL, PROGRAM_END};

/// Everything a finished run leaves behind: the final operand stack and
/// call stack, for DEBUG mode's post-loop dump (distilled spec §6), plus
/// whatever value happened to be on top of the stack when the loop ended
/// (used by `THREAD_CREATE`/`THREAD_JOIN` as the thread's "return value").
pub struct RunOutcome {
    pub stack: OperandStack,
    pub call_stack: CallStack,
}

impl RunOutcome {
    /// The value a spawned thread hands back to `THREAD_JOIN`: whatever is
    /// on top of the operand stack at halt, or `Null` if the stack is
    /// empty (distilled spec §4.5 THREAD_JOIN: "returns its stored result").
    pub fn top_value(&self) -> Value {
        self.stack.snapshot().last().cloned().unwrap_or(Value::Null)
    }
}

/// Runs `program` to completion starting at `pc = 0` with a fresh root
/// frame, operand stack, and call stack, against `runtime`'s registries.
/// This is what the launcher drives directly.
pub fn execute(program: &Program, runtime: Arc<Runtime>) -> VmResult<RunOutcome> {
    run(program, runtime, 0, true, None)
}

/// Runs `program` starting at `target_pc` on a fresh call stack whose
/// bottom frame is still root-shaped (`return_pc = PROGRAM_END`) so a
/// top-level `RET` inside the spawned body terminates that thread's loop
/// uniformly, exactly like the main thread's root frame (distilled spec
/// design notes, "root-frame trick"). Used by `THREAD_CREATE` to re-enter
/// the engine on a new OS thread; the spawned run does not compact its
/// locals on exit, since nothing reads that frame's locals afterwards.
/// `arg` is `THREAD_CREATE`'s second argument: seeded into the spawned
/// frame's local slot 0 so the thread body can `LOAD 0` to read it
/// (distilled spec §4.5 `THREAD_CREATE(entry, arg)`).
pub fn run_from(program: &Program, runtime: Arc<Runtime>, target_pc: i32, arg: Value) -> VmResult<Value> {
    let outcome = run(program, runtime, target_pc, false, Some(arg))?;
    Ok(outcome.top_value())
}

fn run(
    program: &Program,
    runtime: Arc<Runtime>,
    start_pc: i32,
    compact_on_exit: bool,
    initial_local0: Option<Value>,
) -> VmResult<RunOutcome> {
    let span = tracing::info_span!("execute", start_pc);
    let _enter = span.enter();

    let root_locals = Rc::new(RefCell::new(LocalVariableStore::new()));
    if let Some(arg) = initial_local0 {
        root_locals.borrow_mut().store(0, arg);
    }
    let mut call_stack = CallStack::new();
    call_stack.push(StackFrame::root(root_locals.clone()));

    let mut stack = OperandStack::new();
    let dispatcher = Dispatcher::new();
    let mut pc: i32 = start_pc;

    loop {
        if pc == PROGRAM_END {
            break;
        }
        let Some(line) = program.get(pc) else {
            return Err(VmError::Precondition {
                pc,
                reason: "program counter out of bounds".to_string(),
            });
        };
        let line = line.trim();
        tracing::trace!(pc, instruction = line, "fetch");

        if line.is_empty() || line.starts_with('#') {
            pc += 1;
            continue;
        }

        let parts: Vec<&str> = line.split_whitespace().collect();
        let Some(opcode_token) = parts.first() else {
            return Err(VmError::MalformedInstruction {
                pc,
                reason: "blank opcode field".to_string(),
            });
        };
        let opcode = crate::opcode::parse_int_literal(opcode_token)
            .and_then(|v| u32::try_from(v).ok())
            .ok_or_else(|| VmError::MalformedInstruction {
                pc,
                reason: format!("{opcode_token:?} is not a valid opcode integer"),
            })?;

        let mut ctx = ExecContext {
            stack: &mut stack,
            call_stack: &mut call_stack,
            runtime: &runtime,
            pc,
            next_pc: pc,
            operands: parts[1..].iter().map(|s| s.to_string()).collect(),
        };
        let next_pc = dispatcher.handle(opcode, &mut ctx)?;

        pc = if next_pc == HALT_SENTINEL || next_pc == PROGRAM_END {
            PROGRAM_END
        } else if next_pc == pc {
            pc + 1
        } else {
            next_pc
        };
    }

    if compact_on_exit {
        root_locals.borrow_mut().compact();
    }

    Ok(RunOutcome { stack, call_stack })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run_source(source: &str) -> VmResult<RunOutcome> {
        let program = Program::from_source(source)?;
        let runtime = Runtime::with_program(Program::from_source(source)?);
        execute(&program, runtime)
    }

    #[test]
    fn hello_world_halts_cleanly_and_writes_stdout() {
        let outcome = run_source(
            "0x0103 \"Hello World\"\n\
             0x0401 0x1203\n\
             0x0400\n",
        );
        let outcome = outcome.unwrap();
        assert_eq!(outcome.stack.snapshot(), &[Value::I64(11)]);
    }

    #[test]
    fn integer_overflow_wraps_to_negative_two() {
        let outcome = run_source(
            "0x004A 2147483647\n\
             0x004A 2147483647\n\
             0x0040\n\
             0x0400\n",
        )
        .unwrap();
        assert_eq!(outcome.stack.snapshot(), &[Value::I32(-2)]);
    }

    #[test]
    fn division_by_zero_aborts_with_pc() {
        let err = run_source(
            "0x004A 10\n\
             0x004A 0\n\
             0x0043\n\
             0x0400\n",
        )
        .unwrap_err();
        assert!(matches!(err, VmError::DivideByZero { pc: 2 }));
    }

    #[test]
    fn ret_from_root_terminates_the_loop() {
        let outcome = run_source("0x0202\n").unwrap();
        assert!(outcome.call_stack.is_empty());
    }

    #[test]
    fn hash_comment_lines_are_skipped_at_fetch_time() {
        let outcome = run_source("# a note\n0x0400\n").unwrap();
        assert!(outcome.stack.is_empty());
    }

    #[test]
    fn unknown_opcode_aborts_the_loop() {
        let err = run_source("0xBEEF\n0x0400\n").unwrap_err();
        assert!(matches!(err, VmError::UnknownOpcode { pc: 0, opcode: 0xBEEF }));
    }

    #[test]
    fn push_pop_pair_leaves_stack_bit_identical() {
        let outcome = run_source(
            "0x004A 5\n\
             0x0100\n\
             0x0400\n",
        )
        .unwrap();
        assert!(outcome.stack.is_empty());
    }

    #[test]
    fn call_then_ret_returns_to_caller_and_root_frame_survives() {
        let outcome = run_source(
            "0x0201 2\n\
             0x0400\n\
             0x0202\n",
        )
        .unwrap();
        assert_eq!(outcome.call_stack.depth(), 1);
    }

    /// Recursive factorial(5), one stack frame per pending multiplication,
    /// the way the upstream compiler would emit it: the argument travels
    /// on the operand stack (locals are private per frame), the result
    /// comes back the same way.
    const FACTORIAL_PROGRAM: &str = "\
        0x004A 5\n\
        0x0201 3\n\
        0x0400\n\
        0x004C 0\n\
        0x004B 0\n\
        0x004A 1\n\
        0x0052 14\n\
        0x004B 0\n\
        0x004A 1\n\
        0x0041\n\
        0x0201 3\n\
        0x004B 0\n\
        0x0042\n\
        0x0202\n\
        0x004A 1\n\
        0x0202\n";

    #[test]
    fn factorial_recursion_returns_120() {
        let outcome = run_source(FACTORIAL_PROGRAM).unwrap();
        assert_eq!(outcome.stack.snapshot(), &[Value::I32(120)]);
        assert_eq!(outcome.call_stack.depth(), 1);
    }
}

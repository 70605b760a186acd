// Copyright (c) The water-vm Authors
// SPDX-License-Identifier: Apache-2.0

//! Whole-program integration tests driving `.water` sources through
//! `water_vm::engine::execute`, mirroring the concrete scenarios in the
//! distilled spec's testable-properties section.

use std::sync::Arc;

use water_vm::engine;
use water_vm::loader::Program;
use water_vm::runtime::Runtime;
use water_vm::value::Value;

fn run(source: &str) -> water_vm::error::VmResult<engine::RunOutcome> {
    let program = Program::from_source(source).unwrap();
    let runtime: Arc<Runtime> = Runtime::with_program(program.clone());
    engine::execute(&program, runtime)
}

/// Distilled spec §8 scenario 1, literally: `PUSH "Hello World"` with the
/// embedded space the engine's whitespace-tokenizing fetch loop must
/// rejoin rather than truncate at the first token.
#[test]
fn hello_world_writes_to_stdout_and_halts_cleanly() {
    let outcome = run(
        "0x0103 \"Hello World\"\n\
         0x0401 0x1203\n\
         0x0400\n",
    )
    .expect("hello world should halt cleanly");
    assert_eq!(outcome.stack.snapshot(), &[Value::I64(11)]);
}

#[test]
fn signed_32bit_overflow_wraps_to_negative_two() {
    let outcome = run(
        "0x004A 2147483647\n\
         0x004A 2147483647\n\
         0x0040\n\
         0x0400\n",
    )
    .unwrap();
    assert_eq!(outcome.stack.snapshot(), &[Value::I32(-2)]);
}

#[test]
fn integer_division_by_zero_aborts_the_program() {
    let err = run(
        "0x004A 10\n\
         0x004A 0\n\
         0x0043\n\
         0x0400\n",
    )
    .unwrap_err();
    assert!(matches!(err, water_vm::error::VmError::DivideByZero { pc: 2 }));
}

#[test]
fn float_division_by_zero_yields_infinity_never_aborts() {
    let outcome = run(
        "0x008A 10.0\n\
         0x008A 0.0\n\
         0x0083\n\
         0x0400\n",
    )
    .unwrap();
    match outcome.stack.snapshot() {
        [Value::F32(v)] => assert!(v.is_infinite() && v.is_sign_positive()),
        other => panic!("unexpected stack {other:?}"),
    }
}

#[test]
fn recursive_factorial_of_five_is_120_and_call_depth_unwinds() {
    // Argument travels on the shared operand stack; each recursive call
    // gets its own private locals, so the caller's `n` survives the
    // recursive call underneath it.
    let source = "\
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
    let outcome = run(source).unwrap();
    assert_eq!(outcome.stack.snapshot(), &[Value::I32(120)]);
    assert_eq!(outcome.call_stack.depth(), 1);
}

#[test]
fn unknown_opcode_is_a_fatal_engine_abort() {
    let err = run("0xBEEF\n0x0400\n").unwrap_err();
    assert!(matches!(
        err,
        water_vm::error::VmError::UnknownOpcode { pc: 0, opcode: 0xBEEF }
    ));
}

#[test]
fn dup_on_empty_stack_aborts() {
    let err = run("0x0101\n0x0400\n").unwrap_err();
    assert!(matches!(err, water_vm::error::VmError::StackUnderflow { pc: 0 }));
}

#[test]
fn swap_with_fewer_than_two_elements_aborts() {
    let err = run("0x004A 1\n0x0102\n0x0400\n").unwrap_err();
    assert!(matches!(err, water_vm::error::VmError::StackUnderflow { pc: 1 }));
}

#[test]
fn float_to_int_narrowing_saturates_instead_of_wrapping() {
    // 1e30 has no representation in an i32; the conversion must saturate
    // to i32::MAX rather than produce undefined/wrapped behavior.
    let outcome = run(
        "0x00AA 1e30\n\
         0x00DB\n\
         0x0400\n",
    )
    .unwrap();
    assert_eq!(outcome.stack.snapshot(), &[Value::I32(i32::MAX)]);
}

#[test]
fn nan_comparisons_never_take_the_ordered_branch() {
    // CE (branch-if-equal) must not branch when either operand is NaN.
    let outcome = run(
        "0x00AA NaN\n\
         0x00AA NaN\n\
         0x00AD 5\n\
         0x004A 7\n\
         0x0400\n",
    )
    .unwrap();
    assert_eq!(outcome.stack.snapshot(), &[Value::I32(7)]);
}

/// `THREAD_CREATE(entry, arg)` seeds the spawned frame's local 0 with
/// `arg`; the thread body reads it with `LOAD 0` and `RET`s it back, and
/// `THREAD_JOIN` surfaces it (distilled spec §4.5).
#[test]
fn thread_create_passes_arg_through_to_the_spawned_thread() {
    let outcome = run(
        "0x004A 5\n\
         0x004A 42\n\
         0x0401 0x1506\n\
         0x0401 0x1507\n\
         0x0400\n\
         0x004B 0\n\
         0x0202\n",
    )
    .unwrap();
    assert_eq!(outcome.stack.snapshot(), &[Value::I32(42)]);
}

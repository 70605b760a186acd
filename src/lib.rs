// Copyright (c) The water-vm Authors
// SPDX-License-Identifier: Apache-2.0

//! `water-vm`: the execution core of the water virtual machine — a
//! stack-based interpreter for a textual, one-instruction-per-line
//! bytecode format. This crate covers the value model, operand stack,
//! local-variable store, call frames, opcode dispatch, the instruction
//! set, the syscall subsystem, program loading, and the interpreter loop
//! itself. It does not include a compiler front-end, a package manager, or
//! any other outer tooling (see the crate's top-level docs for the full
//! boundary).

pub mod dispatch;
pub mod engine;
pub mod error;
pub mod frame;
pub mod instructions;
pub mod locals;
pub mod loader;
pub mod opcode;
pub mod runtime;
pub mod stack;
pub mod syscall;
pub mod value;

/// Sentinel `return_pc` for the root stack frame: no real program counter
/// reaches it, so a `RET` from the root frame is unambiguous (distilled
/// spec §6, engine termination).
pub const PROGRAM_END: i32 = i32::MAX;

/// PC value the engine's fetch loop treats as "stop": set by `HALT`
/// (distilled spec §4.2).
pub const HALT_SENTINEL: i32 = -1;

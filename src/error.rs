// Copyright (c) The water-vm Authors
// SPDX-License-Identifier: Apache-2.0

//! Error kinds for the interpreter core, grouped the way they are raised:
//! loader/format errors come from loading a program, precondition
//! violations come from instructions and syscalls, and engine aborts are
//! anything that terminates the main loop uncleanly. See the error design
//! in the crate's top-level docs for the fatal/recoverable split.

use thiserror::Error;

pub type VmResult<T> = Result<T, VmError>;

/// The PC at which a fault occurred, when one is meaningful.
pub type Pc = i32;

#[derive(Error, Debug)]
pub enum VmError {
    #[error("failed to load program {path}: {source}")]
    Loader {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("program {0} is empty")]
    EmptyProgram(String),

    #[error("at pc {pc}: malformed instruction: {reason}")]
    MalformedInstruction { pc: Pc, reason: String },

    #[error("at pc {pc}: unknown opcode {opcode:#06x}")]
    UnknownOpcode { pc: Pc, opcode: u32 },

    #[error("at pc {pc}: {reason}")]
    Precondition { pc: Pc, reason: String },

    #[error("at pc {pc}: division by zero")]
    DivideByZero { pc: Pc },

    #[error("at pc {pc}: operand stack underflow")]
    StackUnderflow { pc: Pc },

    #[error("at pc {pc}: type mismatch: expected {expected}, found {found}")]
    TypeMismatch {
        pc: Pc,
        expected: &'static str,
        found: &'static str,
    },

    #[error("at pc {pc}: call stack is empty")]
    EmptyCallStack { pc: Pc },

    #[error("at pc {pc}: invalid branch target {target}")]
    InvalidBranchTarget { pc: Pc, target: i32 },

    #[error("at pc {pc}: syscall precondition violated: {reason}")]
    SyscallPrecondition { pc: Pc, reason: String },
}

impl VmError {
    /// The PC the fault occurred at, if the variant carries one.
    pub fn pc(&self) -> Option<Pc> {
        match self {
            VmError::MalformedInstruction { pc, .. }
            | VmError::UnknownOpcode { pc, .. }
            | VmError::Precondition { pc, .. }
            | VmError::DivideByZero { pc }
            | VmError::StackUnderflow { pc }
            | VmError::TypeMismatch { pc, .. }
            | VmError::EmptyCallStack { pc }
            | VmError::InvalidBranchTarget { pc, .. }
            | VmError::SyscallPrecondition { pc, .. } => Some(*pc),
            VmError::Loader { .. } | VmError::EmptyProgram(_) => None,
        }
    }
}

/// Thread-local last-error record set by syscall handlers on OS-level
/// failures (kind 5 in the error design: these never abort the VM).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Errno(pub i32);

impl Errno {
    pub const NONE: Errno = Errno(0);

    pub fn from_io(err: &std::io::Error) -> Errno {
        Errno(err.raw_os_error().unwrap_or(libc::EIO))
    }

    pub fn message(self) -> String {
        if self.0 == 0 {
            "no error".to_string()
        } else {
            std::io::Error::from_raw_os_error(self.0).to_string()
        }
    }
}

thread_local! {
    static LAST_ERRNO: std::cell::Cell<Errno> = const { std::cell::Cell::new(Errno::NONE) };
}

/// Records `errno` as the most recent syscall failure on this thread.
pub fn set_errno(errno: Errno) {
    LAST_ERRNO.with(|cell| cell.set(errno));
    tracing::debug!(errno = errno.0, "syscall set errno");
}

/// Reads the most recent syscall failure recorded on this thread.
pub fn last_errno() -> Errno {
    LAST_ERRNO.with(|cell| cell.get())
}

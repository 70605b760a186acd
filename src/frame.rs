// Copyright (c) The water-vm Authors
// SPDX-License-Identifier: Apache-2.0

//! Stack frames and the call stack. The root frame is pushed exactly once
//! at engine start with `return_pc = PROGRAM_END` and is never popped
//! during normal execution; a `RET` from it is what lets the main loop
//! terminate uniformly instead of special-casing "call stack empty".

use std::rc::Rc;
use std::sync::Arc;

use crate::error::{Pc, VmError, VmResult};
use crate::locals::LocalVariableStore;
use crate::PROGRAM_END;

/// `(name, caller)` — used only for debug printing and stack traces, never
/// consulted by instruction semantics.
#[derive(Debug, Clone)]
pub struct MethodContext {
    pub name: String,
    pub caller: Option<Arc<MethodContext>>,
}

impl MethodContext {
    pub fn root() -> Arc<MethodContext> {
        Arc::new(MethodContext {
            name: "<root>".to_string(),
            caller: None,
        })
    }

    pub fn child(caller: Arc<MethodContext>, target_pc: i32) -> Arc<MethodContext> {
        Arc::new(MethodContext {
            name: format!("fn@{target_pc}"),
            caller: Some(caller),
        })
    }

    /// Renders a `callee <- caller <- ... <- <root>` trace for debug output.
    pub fn trace(&self) -> String {
        let mut frames = vec![self.name.clone()];
        let mut current = self.caller.clone();
        while let Some(ctx) = current {
            frames.push(ctx.name.clone());
            current = ctx.caller.clone();
        }
        frames.join(" <- ")
    }
}

/// `(return_pc, locals, ctx)`. `locals` uses `Rc<RefCell<..>>` so the root
/// frame's store can be the same instance the engine holds for compaction
/// on exit, while child frames own a private instance.
pub struct StackFrame {
    pub return_pc: i32,
    pub locals: Rc<std::cell::RefCell<LocalVariableStore>>,
    pub ctx: Arc<MethodContext>,
}

impl StackFrame {
    pub fn root(locals: Rc<std::cell::RefCell<LocalVariableStore>>) -> Self {
        Self {
            return_pc: PROGRAM_END,
            locals,
            ctx: MethodContext::root(),
        }
    }

    pub fn child(return_pc: i32, caller_ctx: Arc<MethodContext>, target_pc: i32) -> Self {
        Self {
            return_pc,
            locals: Rc::new(std::cell::RefCell::new(LocalVariableStore::new())),
            ctx: MethodContext::child(caller_ctx, target_pc),
        }
    }

    pub fn is_root(&self) -> bool {
        self.return_pc == PROGRAM_END
    }
}

/// Ordered sequence of frames with push/peek/pop/is-empty. The bottom frame
/// is always the root frame.
#[derive(Default)]
pub struct CallStack {
    frames: Vec<StackFrame>,
}

impl CallStack {
    pub fn new() -> Self {
        Self { frames: Vec::new() }
    }

    pub fn push(&mut self, frame: StackFrame) {
        self.frames.push(frame);
    }

    pub fn peek(&self, pc: Pc) -> VmResult<&StackFrame> {
        self.frames.last().ok_or(VmError::EmptyCallStack { pc })
    }

    pub fn peek_mut(&mut self, pc: Pc) -> VmResult<&mut StackFrame> {
        self.frames.last_mut().ok_or(VmError::EmptyCallStack { pc })
    }

    pub fn pop(&mut self, pc: Pc) -> VmResult<StackFrame> {
        self.frames.pop().ok_or(VmError::EmptyCallStack { pc })
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    pub fn depth(&self) -> usize {
        self.frames.len()
    }
}

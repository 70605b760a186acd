// Copyright (c) The water-vm Authors
// SPDX-License-Identifier: Apache-2.0

//! The process-wide runtime: every registry a syscall handler or a spawned
//! thread needs access to, bundled behind a single `Arc` so handlers,
//! worker threads, and the engine's root invocation all share one instance
//! (distilled spec §5: "registries are process-wide state shared by every
//! frame and every thread").

use std::sync::{Arc, Weak};

use crate::loader::Program;
use crate::syscall::fd_table::FdTable;
use crate::syscall::multiplex::EpollRegistry;
use crate::syscall::objects::ObjectRegistry;
use crate::syscall::process_thread::{ProcessRegistry, ThreadRegistry};
use crate::syscall::sockets::SocketRegistry;
use crate::syscall::sysinfo::EnvRegistry;
use crate::syscall::SyscallDispatcher;

pub struct Runtime {
    pub fds: FdTable,
    pub env: EnvRegistry,
    pub processes: ProcessRegistry,
    pub threads: ThreadRegistry,
    pub sockets: SocketRegistry,
    pub epoll: EpollRegistry,
    pub objects: ObjectRegistry,
    /// The syscall dispatch table (C7): process-wide and read-only after
    /// boot, so it lives alongside the registries it serves rather than
    /// inside the per-thread engine loop.
    pub syscalls: SyscallDispatcher,
    program: Arc<Program>,
    self_ref: Weak<Runtime>,
}

impl Runtime {
    /// A runtime with an empty program, for syscall unit tests that never
    /// spawn threads re-entering the engine.
    pub fn new() -> Arc<Runtime> {
        Self::with_program(Program::placeholder())
    }

    pub fn with_program(program: Program) -> Arc<Runtime> {
        Arc::new_cyclic(|self_ref| Runtime {
            fds: FdTable::new(),
            env: EnvRegistry::new(),
            processes: ProcessRegistry::new(),
            threads: ThreadRegistry::new(),
            sockets: SocketRegistry::new(),
            epoll: EpollRegistry::new(),
            objects: ObjectRegistry::new(),
            syscalls: SyscallDispatcher::new(),
            program: Arc::new(program),
            self_ref: self_ref.clone(),
        })
    }

    /// An owned handle to this runtime, for syscalls that hand it to a
    /// freshly spawned thread (`THREAD_CREATE`).
    pub fn self_arc(&self) -> Arc<Runtime> {
        self.self_ref.upgrade().expect("runtime dropped while still in use")
    }

    pub fn program(&self) -> Arc<Program> {
        Arc::clone(&self.program)
    }
}

impl Drop for Runtime {
    fn drop(&mut self) {
        self.fds.close_all();
    }
}

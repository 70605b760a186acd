// Copyright (c) The water-vm Authors
// SPDX-License-Identifier: Apache-2.0

//! Process & thread syscalls, family `0x1500` (distilled spec §4.5).
//!
//! There is no true `fork`/`execve` pairing available to a safe interpreter
//! running as a single OS process, so `FORK(cmd: list<text>)` launches
//! `cmd[0]` with `cmd[1..]` as arguments synchronously and forwards its
//! stdout/stderr, and `EXEC(path, argv, env)` launches `path` as a
//! subprocess and halts the parent once it exits (see DESIGN.md, Open
//! Questions). `THREAD_CREATE` spawns a genuine OS thread running the same
//! program from a given PC, sharing the runtime's registries.

use std::collections::HashMap;
use std::process::{Command, Stdio};
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;

use super::{SyscallCtx, SyscallDispatcher};
use crate::error::VmResult;
use crate::opcode::syscalls as sc;
use crate::value::Value;

/// A completed child process/thread's exit status, keyed by a VM-assigned
/// pid/tid.
#[derive(Default)]
pub struct ProcessRegistry {
    next_pid: AtomicI64,
    exit_codes: Mutex<HashMap<i64, i32>>,
}

impl ProcessRegistry {
    pub fn new() -> Self {
        Self {
            next_pid: AtomicI64::new(1),
            exit_codes: Mutex::new(HashMap::new()),
        }
    }

    fn allocate_pid(&self) -> i64 {
        self.next_pid.fetch_add(1, Ordering::SeqCst)
    }

    fn record_exit(&self, pid: i64, code: i32) {
        self.exit_codes.lock().insert(pid, code);
    }

    fn take_exit(&self, pid: i64) -> Option<i32> {
        self.exit_codes.lock().remove(&pid)
    }

    /// Removes and returns an arbitrary recorded child's exit status, for
    /// `WAIT(0)`/`WAIT(null)` ("wait for any registered child").
    fn take_any_exit(&self) -> Option<i32> {
        let mut codes = self.exit_codes.lock();
        let pid = *codes.keys().next()?;
        codes.remove(&pid)
    }
}

/// `tid -> join handle`, used by `THREAD_JOIN`. The join handle yields the
/// thread's final operand-stack top, or `Null` on panic, per the thread
/// lifecycle design note.
#[derive(Default)]
pub struct ThreadRegistry {
    next_tid: AtomicI64,
    handles: Mutex<HashMap<i64, std::thread::JoinHandle<Value>>>,
}

impl ThreadRegistry {
    pub fn new() -> Self {
        Self {
            next_tid: AtomicI64::new(1),
            handles: Mutex::new(HashMap::new()),
        }
    }

    fn spawn(&self, f: impl FnOnce() -> Value + Send + 'static) -> i64 {
        let tid = self.next_tid.fetch_add(1, Ordering::SeqCst);
        let handle = std::thread::spawn(f);
        self.handles.lock().insert(tid, handle);
        tid
    }

    fn join(&self, tid: i64) -> Option<Value> {
        let handle = self.handles.lock().remove(&tid)?;
        Some(handle.join().unwrap_or(Value::Null))
    }
}

pub fn install(d: &mut SyscallDispatcher) {
    d.register(sc::EXIT, exit);
    d.register(sc::FORK, fork);
    d.register(sc::EXEC, exec);
    d.register(sc::WAIT, wait);
    d.register(sc::GETPID, getpid);
    d.register(sc::GETPPID, getppid);
    d.register(sc::THREAD_CREATE, thread_create);
    d.register(sc::THREAD_JOIN, thread_join);
    d.register(sc::SLEEP, sleep);
}

/// Terminates the interpreter immediately with the popped status code.
/// Implemented as a process exit rather than an engine-level signal since
/// `EXIT` is specified to never return to the caller.
fn exit(ctx: &mut SyscallCtx) -> VmResult<()> {
    let code = ctx.pop_int()?;
    tracing::info!(code, "EXIT syscall, terminating process");
    std::process::exit(code as i32);
}

/// Decodes a `list<text>` argument the way `multiplex.rs` decodes its
/// fd-set arguments: JSON-encoded inside a `Text` value, since the value
/// model (§3) has no native list variant.
fn pop_text_list(ctx: &mut SyscallCtx) -> VmResult<Vec<String>> {
    let json = ctx.pop_text()?;
    serde_json::from_str(&json).map_err(|e| ctx.precondition(format!("{json:?} is not a JSON list<text>: {e}")))
}

/// Runs `cmd` (`cmd[0]` as the program, `cmd[1..]` as its arguments)
/// synchronously, forwarding its stdout/stderr to this process's, and
/// returns a pid whose exit code is retrievable via `WAIT` (chosen
/// resolution of the FORK semantics open question — distilled spec §4.5
/// `FORK(cmd: list<text>)`, §8 scenario 5).
fn fork(ctx: &mut SyscallCtx) -> VmResult<()> {
    let cmd = pop_text_list(ctx)?;
    let (program, args) = cmd
        .split_first()
        .ok_or_else(|| ctx.precondition("FORK cmd must not be empty"))?;
    match Command::new(program).args(args).stdout(Stdio::inherit()).stderr(Stdio::inherit()).status() {
        Ok(status) => {
            let pid = ctx.runtime.processes.allocate_pid();
            ctx.runtime.processes.record_exit(pid, status.code().unwrap_or(-1));
            ctx.push_i64(pid);
        }
        Err(err) => ctx.fail_io(&err),
    }
    Ok(())
}

/// Launches `path` as a subprocess — `argv[1..]` as its arguments (`argv[0]`
/// is the conventional, unused-by-`Command` program-name slot execve
/// callers fill in), its environment the env registry's snapshot merged
/// with `env` (distilled spec §4.5: "merges the env registry snapshot with
/// the supplied env") — and halts this interpreter with its exit code once
/// it completes, since there is no portable safe way to replace the
/// running process image (chosen resolution of the EXEC semantics open
/// question).
fn exec(ctx: &mut SyscallCtx) -> VmResult<()> {
    let env_json = ctx.pop_text()?;
    let argv = pop_text_list(ctx)?;
    let path = ctx.pop_text()?;

    let supplied_env: HashMap<String, String> = serde_json::from_str(&env_json)
        .map_err(|e| ctx.precondition(format!("{env_json:?} is not a JSON map<text,text>: {e}")))?;
    let mut env = ctx.runtime.env.snapshot();
    env.extend(supplied_env);

    let mut command = Command::new(&path);
    if let Some((_argv0, rest)) = argv.split_first() {
        command.args(rest);
    }
    command.env_clear().envs(&env);

    match command.status() {
        Ok(status) => std::process::exit(status.code().unwrap_or(-1)),
        Err(err) => ctx.fail_io(&err),
    }
    Ok(())
}

/// `WAIT(pid?)`: a `null`/`0` pid waits for any registered child (distilled
/// spec §4.5); otherwise waits for the specific pid.
fn wait(ctx: &mut SyscallCtx) -> VmResult<()> {
    let pid = ctx.pop_optional_int()?.unwrap_or(0);
    let exit_code = if pid == 0 {
        ctx.runtime
            .processes
            .take_any_exit()
            .ok_or_else(|| ctx.precondition("no registered child to wait on"))?
    } else {
        ctx.runtime
            .processes
            .take_exit(pid)
            .ok_or_else(|| ctx.precondition(format!("no recorded child with pid {pid}")))?
    };
    ctx.push_i64(exit_code as i64);
    Ok(())
}

fn getpid(ctx: &mut SyscallCtx) -> VmResult<()> {
    ctx.push_i64(std::process::id() as i64);
    Ok(())
}

fn getppid(ctx: &mut SyscallCtx) -> VmResult<()> {
    #[cfg(unix)]
    {
        ctx.push_i64(unsafe { libc::getppid() } as i64);
    }
    #[cfg(not(unix))]
    {
        ctx.push_i64(0);
    }
    Ok(())
}

/// Spawns a new OS thread that re-enters the engine at `target_pc`, sharing
/// the runtime's registries but starting with its own fresh operand stack,
/// local-variable store, and call stack (distilled spec §5 concurrency
/// model: "threads share the runtime's registries, not each other's
/// execution state"). `arg` (distilled spec §4.5 `THREAD_CREATE(entry,
/// arg)`) is seeded into the spawned frame's local slot 0, so the thread
/// body reads it with `LOAD 0`.
fn thread_create(ctx: &mut SyscallCtx) -> VmResult<()> {
    let arg = ctx.pop()?;
    let target_pc = ctx.pop_int()? as i32;
    let runtime = Arc::clone(&ctx.runtime.self_arc());
    let program = ctx.runtime.program();
    let tid = ctx.runtime.threads.spawn(move || {
        match crate::engine::run_from(&program, runtime, target_pc, arg) {
            Ok(value) => value,
            Err(err) => {
                tracing::error!(error = %err, "thread aborted");
                Value::Null
            }
        }
    });
    ctx.push_i64(tid);
    Ok(())
}

fn thread_join(ctx: &mut SyscallCtx) -> VmResult<()> {
    let tid = ctx.pop_int()?;
    match ctx.runtime.threads.join(tid) {
        Some(value) => ctx.push(value),
        None => return Err(ctx.precondition(format!("no recorded thread with tid {tid}"))),
    }
    Ok(())
}

fn sleep(ctx: &mut SyscallCtx) -> VmResult<()> {
    let millis = ctx.pop_int()?.max(0) as u64;
    std::thread::sleep(Duration::from_millis(millis));
    ctx.push_i64(0);
    Ok(())
}

// Copyright (c) The water-vm Authors
// SPDX-License-Identifier: Apache-2.0

//! Multiplexing syscalls, family `0x1300` (distilled spec §4.5): `SELECT`,
//! the epoll family, and `IO_WAIT`. Lists in and out of these calls are
//! JSON-encoded text, since the value model (§3) has no native list
//! variant — see DESIGN.md for this choice.

use std::collections::HashMap;
use std::sync::atomic::{AtomicI32, Ordering};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::json;

use super::{SyscallCtx, SyscallDispatcher};
use crate::error::VmResult;
use crate::opcode::syscalls as sc;
use crate::value::Value;

pub const EPOLL_CTL_ADD: i64 = 1;
pub const EPOLL_CTL_MOD: i64 = 2;
pub const EPOLL_CTL_DEL: i64 = 3;

pub const EPOLLIN: i64 = 0x001;
pub const EPOLLOUT: i64 = 0x004;

/// `epfd -> EpollInstance`, where `EpollInstance` maps `fd -> event-mask`
/// (distilled spec §3).
pub struct EpollInstance {
    watched: Mutex<HashMap<i32, i64>>,
}

#[derive(Default)]
pub struct EpollRegistry {
    instances: Mutex<HashMap<i32, EpollInstance>>,
    next_epfd: AtomicI32,
}

impl EpollRegistry {
    pub fn new() -> Self {
        Self {
            instances: Mutex::new(HashMap::new()),
            next_epfd: AtomicI32::new(1000),
        }
    }

    fn create(&self) -> i32 {
        let epfd = self.next_epfd.fetch_add(1, Ordering::SeqCst);
        self.instances.lock().insert(
            epfd,
            EpollInstance {
                watched: Mutex::new(HashMap::new()),
            },
        );
        epfd
    }

    fn ctl(&self, epfd: i32, op: i64, fd: i32, events: i64) -> Result<(), String> {
        let instances = self.instances.lock();
        let instance = instances
            .get(&epfd)
            .ok_or_else(|| format!("invalid epfd {epfd}"))?;
        let mut watched = instance.watched.lock();
        match op {
            EPOLL_CTL_ADD => {
                watched.insert(fd, events);
                Ok(())
            }
            EPOLL_CTL_MOD => {
                if watched.contains_key(&fd) {
                    watched.insert(fd, events);
                    Ok(())
                } else {
                    Err(format!("MOD on unregistered fd {fd}"))
                }
            }
            EPOLL_CTL_DEL => {
                if watched.remove(&fd).is_some() {
                    Ok(())
                } else {
                    Err(format!("DEL on unregistered fd {fd}"))
                }
            }
            other => Err(format!("invalid epoll op {other}")),
        }
    }

    fn watched(&self, epfd: i32) -> Option<Vec<(i32, i64)>> {
        let instances = self.instances.lock();
        let instance = instances.get(&epfd)?;
        Some(instance.watched.lock().iter().map(|(fd, ev)| (*fd, *ev)).collect())
    }
}

pub fn install(d: &mut SyscallDispatcher) {
    d.register(sc::SELECT, select);
    d.register(sc::EPOLL_CREATE, epoll_create);
    d.register(sc::EPOLL_CTL, epoll_ctl);
    d.register(sc::EPOLL_WAIT, epoll_wait);
    d.register(sc::IO_WAIT, io_wait);
}

#[derive(Serialize, Deserialize)]
struct ReadyEvent {
    fd: i32,
    events: i64,
}

fn raw_fd_for(ctx: &SyscallCtx, fd: i32) -> Option<std::os::fd::RawFd> {
    ctx.runtime.fds.get(fd).and_then(|c| c.lock().raw_fd())
}

/// Polls a set of raw fds with the given requested event masks, returning
/// those that became ready within `timeout_ms` (negative = infinite).
fn poll_raw(fds: &[(libc::c_int, i16)], timeout_ms: i64) -> Vec<(libc::c_int, i16)> {
    if fds.is_empty() {
        return Vec::new();
    }
    let mut pollfds: Vec<libc::pollfd> = fds
        .iter()
        .map(|(fd, events)| libc::pollfd {
            fd: *fd,
            events: *events,
            revents: 0,
        })
        .collect();
    let timeout = if timeout_ms < 0 { -1 } else { timeout_ms as libc::c_int };
    let rc = unsafe { libc::poll(pollfds.as_mut_ptr(), pollfds.len() as libc::nfds_t, timeout) };
    if rc <= 0 {
        return Vec::new();
    }
    pollfds
        .into_iter()
        .filter(|p| p.revents != 0)
        .map(|p| (p.fd, p.revents))
        .collect()
}

fn select(ctx: &mut SyscallCtx) -> VmResult<()> {
    let timeout_ms = ctx.pop_int()?;
    let except_fds: Vec<i32> = serde_json::from_str(&ctx.pop_text()?).unwrap_or_default();
    let write_fds: Vec<i32> = serde_json::from_str(&ctx.pop_text()?).unwrap_or_default();
    let read_fds: Vec<i32> = serde_json::from_str(&ctx.pop_text()?).unwrap_or_default();

    let mut requests = Vec::new();
    for fd in &read_fds {
        if let Some(raw) = raw_fd_for(ctx, *fd) {
            requests.push((raw, libc::POLLIN));
        }
    }
    for fd in &write_fds {
        if let Some(raw) = raw_fd_for(ctx, *fd) {
            requests.push((raw, libc::POLLOUT));
        }
    }
    for fd in &except_fds {
        if let Some(raw) = raw_fd_for(ctx, *fd) {
            requests.push((raw, libc::POLLPRI));
        }
    }
    let ready = poll_raw(&requests, timeout_ms);
    let ready_raw: std::collections::HashSet<libc::c_int> = ready.iter().map(|(fd, _)| *fd).collect();

    let filter = |fds: &[i32]| -> Vec<i32> {
        fds.iter()
            .copied()
            .filter(|fd| raw_fd_for(ctx, *fd).map(|raw| ready_raw.contains(&raw)).unwrap_or(false))
            .collect()
    };
    let result = json!({
        "read": filter(&read_fds),
        "write": filter(&write_fds),
        "except": filter(&except_fds),
    });
    ctx.push(Value::Text(result.to_string()));
    Ok(())
}

fn epoll_create(ctx: &mut SyscallCtx) -> VmResult<()> {
    let _flags = ctx.pop_optional_int()?;
    let epfd = ctx.runtime.epoll.create();
    ctx.push_i64(epfd as i64);
    Ok(())
}

fn epoll_ctl(ctx: &mut SyscallCtx) -> VmResult<()> {
    let events = ctx.pop_int()?;
    let fd = ctx.pop_int()? as i32;
    let op = ctx.pop_int()?;
    let epfd = ctx.pop_int()? as i32;
    match ctx.runtime.epoll.ctl(epfd, op, fd, events) {
        Ok(()) => {
            ctx.push_i64(0);
            Ok(())
        }
        Err(reason) => Err(ctx.precondition(reason)),
    }
}

fn epoll_wait(ctx: &mut SyscallCtx) -> VmResult<()> {
    let timeout_ms = ctx.pop_int()?;
    let max = ctx.pop_int()?;
    let epfd = ctx.pop_int()? as i32;
    let watched = ctx
        .runtime
        .epoll
        .watched(epfd)
        .ok_or_else(|| ctx.precondition(format!("invalid epfd {epfd}")))?;

    let mut requests = Vec::new();
    let mut fd_by_raw = HashMap::new();
    for (fd, events) in &watched {
        if let Some(raw) = raw_fd_for(ctx, *fd) {
            let mut poll_events = 0i16;
            if events & EPOLLIN != 0 {
                poll_events |= libc::POLLIN;
            }
            if events & EPOLLOUT != 0 {
                poll_events |= libc::POLLOUT;
            }
            requests.push((raw, poll_events));
            fd_by_raw.insert(raw, *fd);
        }
    }
    let ready = poll_raw(&requests, timeout_ms);
    let events: Vec<ReadyEvent> = ready
        .into_iter()
        .take(max.max(0) as usize)
        .filter_map(|(raw, revents)| {
            fd_by_raw.get(&raw).map(|fd| ReadyEvent {
                fd: *fd,
                events: revents as i64,
            })
        })
        .collect();
    ctx.push(Value::Text(serde_json::to_string(&events).unwrap_or_default()));
    Ok(())
}

#[derive(Deserialize)]
struct WaitRequest {
    fd: i32,
    events: i64,
}

fn io_wait(ctx: &mut SyscallCtx) -> VmResult<()> {
    let timeout_ms = ctx.pop_int()?;
    let requests_json = ctx.pop_text()?;
    let requests: Vec<WaitRequest> = serde_json::from_str(&requests_json)
        .map_err(|e| ctx.precondition(format!("malformed IO_WAIT request list: {e}")))?;

    let mut polls = Vec::new();
    let mut fd_by_raw = HashMap::new();
    for req in &requests {
        if let Some(raw) = raw_fd_for(ctx, req.fd) {
            let mut poll_events = 0i16;
            if req.events & EPOLLIN != 0 {
                poll_events |= libc::POLLIN;
            }
            if req.events & EPOLLOUT != 0 {
                poll_events |= libc::POLLOUT;
            }
            polls.push((raw, poll_events));
            fd_by_raw.insert(raw, req.fd);
        }
    }
    let ready = poll_raw(&polls, timeout_ms);
    let events: Vec<ReadyEvent> = ready
        .into_iter()
        .filter_map(|(raw, revents)| {
            fd_by_raw.get(&raw).map(|fd| ReadyEvent {
                fd: *fd,
                events: revents as i64,
            })
        })
        .collect();
    ctx.push(Value::Text(serde_json::to_string(&events).unwrap_or_default()));
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::Runtime;
    use crate::stack::OperandStack;

    fn ctx<'a>(stack: &'a mut OperandStack, runtime: &'a Runtime) -> SyscallCtx<'a> {
        SyscallCtx { stack, runtime, pc: 0 }
    }

    #[test]
    fn epoll_lifecycle_pipe_becomes_readable() {
        let runtime = Runtime::new();
        let mut stack = OperandStack::new();

        epoll_create(&mut ctx(&mut stack, &runtime)).unwrap();
        let epfd = match stack.pop(0).unwrap() {
            Value::I64(v) => v as i32,
            _ => panic!(),
        };

        let (r, w) = crate::syscall::channel::new_pipe().unwrap();
        let read_fd = runtime.fds.register(Box::new(r));
        let write_fd = runtime.fds.register(Box::new(w));

        stack.push(Value::I64(epfd as i64));
        stack.push(Value::I64(EPOLL_CTL_ADD));
        stack.push(Value::I64(read_fd as i64));
        stack.push(Value::I64(EPOLLIN));
        epoll_ctl(&mut ctx(&mut stack, &runtime)).unwrap();
        assert_eq!(stack.pop(0).unwrap(), Value::I64(0));

        {
            let channel = runtime.fds.get(write_fd).unwrap();
            channel.lock().write(b"x").unwrap();
        }

        stack.push(Value::I64(epfd as i64));
        stack.push(Value::I64(16));
        stack.push(Value::I64(1000));
        epoll_wait(&mut ctx(&mut stack, &runtime)).unwrap();
        let events_json = match stack.pop(0).unwrap() {
            Value::Text(s) => s,
            _ => panic!(),
        };
        assert!(events_json.contains(&read_fd.to_string()));

        stack.push(Value::I64(epfd as i64));
        stack.push(Value::I64(EPOLL_CTL_DEL));
        stack.push(Value::I64(read_fd as i64));
        stack.push(Value::I64(0));
        epoll_ctl(&mut ctx(&mut stack, &runtime)).unwrap();
        assert_eq!(stack.pop(0).unwrap(), Value::I64(0));

        stack.push(Value::I64(epfd as i64));
        stack.push(Value::I64(EPOLL_CTL_DEL));
        stack.push(Value::I64(read_fd as i64));
        stack.push(Value::I64(0));
        let err = epoll_ctl(&mut ctx(&mut stack, &runtime)).unwrap_err();
        assert!(matches!(err, crate::error::VmError::SyscallPrecondition { .. }));
    }
}

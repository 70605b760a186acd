// Copyright (c) The water-vm Authors
// SPDX-License-Identifier: Apache-2.0

//! Socket syscalls, family `0x1400` (distilled spec §4.5).
//!
//! `domain` is encoded `1 = AF_INET`, `2 = AF_INET6`, `3 = AF_UNIX`; `type`
//! is `1 = SOCK_STREAM`, `2 = SOCK_DGRAM` (an encoding this crate invents in
//! the absence of a spec-fixed one, documented here and in DESIGN.md).
//! Addresses are a single text argument: `"host:port"` for INET sockets, a
//! filesystem path for UNIX sockets.

use std::net::Shutdown;
use std::os::fd::{AsRawFd, RawFd};

use dashmap::DashMap;
use socket2::{Domain, SockAddr, Socket, Type};

use super::channel::Channel;
use super::{SyscallCtx, SyscallDispatcher};
use crate::error::VmResult;
use crate::opcode::syscalls as sc;
use crate::value::Value;

pub const AF_INET: i64 = 1;
pub const AF_INET6: i64 = 2;
pub const AF_UNIX: i64 = 3;

pub const SOCK_STREAM: i64 = 1;
pub const SOCK_DGRAM: i64 = 2;

struct SocketEntry {
    socket: Socket,
    domain: i64,
    /// Set by `LISTEN`; `CONNECT` closes and replaces a listening socket
    /// rather than calling `connect` on it directly (distilled spec §4.5).
    listening: bool,
}

/// VM fd -> the real `socket2::Socket` backing it; kept separate from the
/// FD table's `Channel` entries (registered there only as an identity
/// placeholder so `SELECT`/`epoll` can poll the same raw fd).
#[derive(Default)]
pub struct SocketRegistry {
    entries: DashMap<i32, SocketEntry>,
}

impl SocketRegistry {
    pub fn new() -> Self {
        Self::default()
    }
}

/// A fd-table placeholder for a socket: doesn't own the underlying fd (the
/// `SocketRegistry` entry does), only identifies it for polling.
struct SocketHandle(RawFd);

impl Channel for SocketHandle {
    fn read(&mut self, _buf: &mut [u8]) -> std::io::Result<usize> {
        Err(std::io::Error::new(
            std::io::ErrorKind::Unsupported,
            "use RECV, not generic read, on a socket fd",
        ))
    }
    fn write(&mut self, _buf: &[u8]) -> std::io::Result<usize> {
        Err(std::io::Error::new(
            std::io::ErrorKind::Unsupported,
            "use SEND, not generic write, on a socket fd",
        ))
    }
    fn raw_fd(&self) -> Option<RawFd> {
        Some(self.0)
    }
}

pub fn install(d: &mut SyscallDispatcher) {
    d.register(sc::SOCKET, socket);
    d.register(sc::BIND, bind);
    d.register(sc::LISTEN, listen);
    d.register(sc::ACCEPT, accept);
    d.register(sc::CONNECT, connect);
    d.register(sc::SEND, send);
    d.register(sc::RECV, recv);
    d.register(sc::SENDTO, sendto);
    d.register(sc::RECVFROM, recvfrom);
    d.register(sc::SHUTDOWN, shutdown);
    d.register(sc::SETSOCKOPT, setsockopt);
    d.register(sc::GETSOCKOPT, getsockopt);
    d.register(sc::GETPEERNAME, getpeername);
    d.register(sc::GETSOCKNAME, getsockname);
    d.register(sc::GETADDRINFO, getaddrinfo);
}

fn domain_of(domain: i64) -> Domain {
    match domain {
        AF_INET6 => Domain::IPV6,
        AF_UNIX => Domain::UNIX,
        _ => Domain::IPV4,
    }
}

fn type_of(kind: i64) -> Type {
    match kind {
        SOCK_DGRAM => Type::DGRAM,
        _ => Type::STREAM,
    }
}

fn parse_addr(domain: i64, addr: &str) -> Result<SockAddr, String> {
    if domain == AF_UNIX {
        return Ok(SockAddr::unix(addr).map_err(|e| e.to_string())?);
    }
    let socket_addr: std::net::SocketAddr = addr
        .parse()
        .map_err(|_| format!("malformed host:port address {addr:?}"))?;
    Ok(SockAddr::from(socket_addr))
}

fn register_socket(ctx: &mut SyscallCtx, socket: Socket, domain: i64) -> i32 {
    let raw = socket.as_raw_fd();
    let fd = ctx.runtime.fds.register(Box::new(SocketHandle(raw)));
    ctx.runtime
        .sockets
        .entries
        .insert(fd, SocketEntry { socket, domain, listening: false });
    fd
}

/// Installs `socket` at an already-known fd in place, used by `CONNECT`
/// to auto-create a client socket for a channel-less fd or to replace a
/// listening socket (distilled spec §4.5), via `fd_table.rs`'s `replace`.
fn replace_socket_at(ctx: &mut SyscallCtx, fd: i32, socket: Socket, domain: i64) {
    let raw = socket.as_raw_fd();
    ctx.runtime.fds.replace(fd, Box::new(SocketHandle(raw)));
    ctx.runtime
        .sockets
        .entries
        .insert(fd, SocketEntry { socket, domain, listening: false });
}

/// Best-effort address-family guess for a `CONNECT` on a fd with no prior
/// socket at all: inet/inet6 if `addr` parses as a `host:port`, unix
/// otherwise (distilled spec §4.5 leaves this case's domain unspecified).
fn infer_domain(addr: &str) -> i64 {
    match addr.parse::<std::net::SocketAddr>() {
        Ok(sock_addr) if sock_addr.is_ipv6() => AF_INET6,
        Ok(_) => AF_INET,
        Err(_) => AF_UNIX,
    }
}

fn socket(ctx: &mut SyscallCtx) -> VmResult<()> {
    let protocol = ctx.pop_optional_int()?.unwrap_or(0);
    let kind = ctx.pop_int()?;
    let domain = ctx.pop_int()?;
    let _ = protocol;
    match Socket::new(domain_of(domain), type_of(kind), None) {
        Ok(socket) => {
            let fd = register_socket(ctx, socket, domain);
            ctx.push_i64(fd as i64);
        }
        Err(err) => ctx.fail_io(&err),
    }
    Ok(())
}

fn bind(ctx: &mut SyscallCtx) -> VmResult<()> {
    let addr_text = ctx.pop_text()?;
    let fd = ctx.pop_int()? as i32;
    let entry = ctx
        .runtime
        .sockets
        .entries
        .get(&fd)
        .ok_or_else(|| ctx.precondition(format!("invalid socket fd {fd}")))?;
    let addr = parse_addr(entry.domain, &addr_text).map_err(|e| ctx.precondition(e))?;
    match entry.socket.bind(&addr) {
        Ok(()) => ctx.push_i64(0),
        Err(err) => ctx.fail_io(&err),
    }
    Ok(())
}

fn listen(ctx: &mut SyscallCtx) -> VmResult<()> {
    let backlog = ctx.pop_optional_int()?.unwrap_or(128);
    let fd = ctx.pop_int()? as i32;
    let mut entry = ctx
        .runtime
        .sockets
        .entries
        .get_mut(&fd)
        .ok_or_else(|| ctx.precondition(format!("invalid socket fd {fd}")))?;
    match entry.socket.listen(backlog as i32) {
        Ok(()) => {
            entry.listening = true;
            drop(entry);
            ctx.push_i64(0);
        }
        Err(err) => {
            drop(entry);
            ctx.fail_io(&err);
        }
    }
    Ok(())
}

fn accept(ctx: &mut SyscallCtx) -> VmResult<()> {
    let fd = ctx.pop_int()? as i32;
    let domain = {
        let entry = ctx
            .runtime
            .sockets
            .entries
            .get(&fd)
            .ok_or_else(|| ctx.precondition(format!("invalid socket fd {fd}")))?;
        entry.domain
    };
    let accepted = {
        let entry = ctx.runtime.sockets.entries.get(&fd).unwrap();
        entry.socket.accept()
    };
    match accepted {
        Ok((conn, _addr)) => {
            let conn_fd = register_socket(ctx, conn, domain);
            ctx.push_i64(conn_fd as i64);
        }
        Err(err) => ctx.fail_io(&err),
    }
    Ok(())
}

/// `CONNECT(fd, addr, port) → 0` (distilled spec §4.5): if `fd` has no
/// socket channel yet, creates a fresh client socket and registers it
/// under `fd`; if `fd` is currently a listening socket, closes it and
/// replaces it with a fresh client socket at the same `fd`; otherwise
/// connects the existing socket in place.
fn connect(ctx: &mut SyscallCtx) -> VmResult<()> {
    let addr_text = ctx.pop_text()?;
    let fd = ctx.pop_int()? as i32;

    let existing = ctx.runtime.sockets.entries.get(&fd).map(|entry| (entry.domain, entry.listening));
    let needs_fresh_socket = !matches!(existing, Some((_, false)));
    let domain = match existing {
        Some((domain, _)) => domain,
        None => infer_domain(&addr_text),
    };

    if needs_fresh_socket {
        match Socket::new(domain_of(domain), Type::STREAM, None) {
            Ok(socket) => replace_socket_at(ctx, fd, socket, domain),
            Err(err) => {
                ctx.fail_io(&err);
                return Ok(());
            }
        }
    }

    let entry = ctx
        .runtime
        .sockets
        .entries
        .get(&fd)
        .ok_or_else(|| ctx.precondition(format!("invalid socket fd {fd}")))?;
    let addr = parse_addr(domain, &addr_text).map_err(|e| ctx.precondition(e))?;
    match entry.socket.connect(&addr) {
        Ok(()) => ctx.push_i64(0),
        Err(err) => ctx.fail_io(&err),
    }
    Ok(())
}

fn send(ctx: &mut SyscallCtx) -> VmResult<()> {
    let data = ctx.pop_bytes_like()?;
    let fd = ctx.pop_int()? as i32;
    let entry = ctx
        .runtime
        .sockets
        .entries
        .get(&fd)
        .ok_or_else(|| ctx.precondition(format!("invalid socket fd {fd}")))?;
    match entry.socket.send(&data) {
        Ok(n) => ctx.push_i64(n as i64),
        Err(err) => ctx.fail_io(&err),
    }
    Ok(())
}

fn recv(ctx: &mut SyscallCtx) -> VmResult<()> {
    let max_len = ctx.pop_int()?.max(0) as usize;
    let fd = ctx.pop_int()? as i32;
    let entry = ctx
        .runtime
        .sockets
        .entries
        .get(&fd)
        .ok_or_else(|| ctx.precondition(format!("invalid socket fd {fd}")))?;
    let mut buf = vec![0u8; max_len];
    match entry.socket.recv(unsafe {
        std::slice::from_raw_parts_mut(buf.as_mut_ptr().cast(), buf.len())
    }) {
        Ok(n) => {
            buf.truncate(n);
            ctx.push(Value::Bytes(buf));
        }
        Err(err) => ctx.fail_io(&err),
    }
    Ok(())
}

fn sendto(ctx: &mut SyscallCtx) -> VmResult<()> {
    let addr_text = ctx.pop_text()?;
    let data = ctx.pop_bytes_like()?;
    let fd = ctx.pop_int()? as i32;
    let entry = ctx
        .runtime
        .sockets
        .entries
        .get(&fd)
        .ok_or_else(|| ctx.precondition(format!("invalid socket fd {fd}")))?;
    let addr = parse_addr(entry.domain, &addr_text).map_err(|e| ctx.precondition(e))?;
    match entry.socket.send_to(&data, &addr) {
        Ok(n) => ctx.push_i64(n as i64),
        Err(err) => ctx.fail_io(&err),
    }
    Ok(())
}

fn recvfrom(ctx: &mut SyscallCtx) -> VmResult<()> {
    let max_len = ctx.pop_int()?.max(0) as usize;
    let fd = ctx.pop_int()? as i32;
    let entry = ctx
        .runtime
        .sockets
        .entries
        .get(&fd)
        .ok_or_else(|| ctx.precondition(format!("invalid socket fd {fd}")))?;
    let mut buf = vec![std::mem::MaybeUninit::new(0u8); max_len];
    match entry.socket.recv_from(&mut buf) {
        Ok((n, addr)) => {
            let bytes: Vec<u8> = buf[..n].iter().map(|b| unsafe { b.assume_init() }).collect();
            let from = addr
                .as_socket()
                .map(|a| a.to_string())
                .unwrap_or_else(|| "unknown".to_string());
            let result = serde_json::json!({ "data": bytes, "from": from });
            ctx.push(Value::Text(result.to_string()));
        }
        Err(err) => ctx.fail_io(&err),
    }
    Ok(())
}

fn shutdown(ctx: &mut SyscallCtx) -> VmResult<()> {
    let how = ctx.pop_int()?;
    let fd = ctx.pop_int()? as i32;
    let entry = ctx
        .runtime
        .sockets
        .entries
        .get(&fd)
        .ok_or_else(|| ctx.precondition(format!("invalid socket fd {fd}")))?;
    let shutdown_how = match how {
        0 => Shutdown::Read,
        1 => Shutdown::Write,
        _ => Shutdown::Both,
    };
    match entry.socket.shutdown(shutdown_how) {
        Ok(()) => ctx.push_i64(0),
        Err(err) => ctx.fail_io(&err),
    }
    Ok(())
}

fn setsockopt(ctx: &mut SyscallCtx) -> VmResult<()> {
    let value = ctx.pop_int()?;
    let option = ctx.pop_int()?;
    let fd = ctx.pop_int()? as i32;
    let entry = ctx
        .runtime
        .sockets
        .entries
        .get(&fd)
        .ok_or_else(|| ctx.precondition(format!("invalid socket fd {fd}")))?;
    let result = match option {
        1 => entry.socket.set_reuse_address(value != 0),
        2 => entry.socket.set_nodelay(value != 0),
        _ => return Err(ctx.precondition(format!("unknown sockopt {option}"))),
    };
    match result {
        Ok(()) => ctx.push_i64(0),
        Err(err) => ctx.fail_io(&err),
    }
    Ok(())
}

fn getsockopt(ctx: &mut SyscallCtx) -> VmResult<()> {
    let option = ctx.pop_int()?;
    let fd = ctx.pop_int()? as i32;
    let entry = ctx
        .runtime
        .sockets
        .entries
        .get(&fd)
        .ok_or_else(|| ctx.precondition(format!("invalid socket fd {fd}")))?;
    let result = match option {
        1 => entry.socket.reuse_address().map(|v| v as i64),
        2 => entry.socket.nodelay().map(|v| v as i64),
        _ => return Err(ctx.precondition(format!("unknown sockopt {option}"))),
    };
    match result {
        Ok(v) => ctx.push_i64(v),
        Err(err) => ctx.fail_io(&err),
    }
    Ok(())
}

fn getpeername(ctx: &mut SyscallCtx) -> VmResult<()> {
    let fd = ctx.pop_int()? as i32;
    let entry = ctx
        .runtime
        .sockets
        .entries
        .get(&fd)
        .ok_or_else(|| ctx.precondition(format!("invalid socket fd {fd}")))?;
    match entry.socket.peer_addr() {
        Ok(addr) => ctx.push(Value::Text(
            addr.as_socket().map(|a| a.to_string()).unwrap_or_else(|| "unix".to_string()),
        )),
        Err(err) => ctx.fail_io(&err),
    }
    Ok(())
}

fn getsockname(ctx: &mut SyscallCtx) -> VmResult<()> {
    let fd = ctx.pop_int()? as i32;
    let entry = ctx
        .runtime
        .sockets
        .entries
        .get(&fd)
        .ok_or_else(|| ctx.precondition(format!("invalid socket fd {fd}")))?;
    match entry.socket.local_addr() {
        Ok(addr) => ctx.push(Value::Text(
            addr.as_socket().map(|a| a.to_string()).unwrap_or_else(|| "unix".to_string()),
        )),
        Err(err) => ctx.fail_io(&err),
    }
    Ok(())
}

fn getaddrinfo(ctx: &mut SyscallCtx) -> VmResult<()> {
    use std::net::ToSocketAddrs;
    let host = ctx.pop_text()?;
    let lookup = format!("{host}:0");
    match lookup.to_socket_addrs() {
        Ok(addrs) => {
            let ips: Vec<String> = addrs.map(|a| a.ip().to_string()).collect();
            ctx.push(Value::Text(serde_json::to_string(&ips).unwrap_or_default()));
        }
        Err(err) => ctx.fail_io(&err),
    }
    Ok(())
}

// Copyright (c) The water-vm Authors
// SPDX-License-Identifier: Apache-2.0

//! Files & FDs syscalls, family `0x1000` (distilled spec §4.5).

use std::fs::{self, OpenOptions};
use std::io::SeekFrom;
use std::os::unix::fs::OpenOptionsExt;

use super::channel::{new_pipe, FileChannel};
use super::{SyscallCtx, SyscallDispatcher};
use crate::error::VmResult;
use crate::opcode::syscalls as sc;
use crate::value::Value;

pub fn install(d: &mut SyscallDispatcher) {
    d.register(sc::OPEN, open);
    d.register(sc::READ, read);
    d.register(sc::WRITE, write);
    d.register(sc::SEEK, seek);
    d.register(sc::CLOSE, close);
    d.register(sc::STAT, stat);
    d.register(sc::FSTAT, fstat);
    d.register(sc::UNLINK, unlink);
    d.register(sc::DUP, dup);
    d.register(sc::DUP2, dup2);
    d.register(sc::PIPE, pipe);
    d.register(sc::TRUNCATE, truncate);
    d.register(sc::FTRUNCATE, ftruncate);
    d.register(sc::RENAME, rename);
    d.register(sc::LINK, link);
    d.register(sc::SYMLINK, symlink);
    d.register(sc::READLINK, readlink);
    d.register(sc::SET_NONBLOCK, set_nonblock);
}

/// `flags` is a bitmask: bit 0 write, bit 1 append, bit 2 create,
/// bit 3 truncate. Read access is implicit unless write-only is requested
/// by also clearing bit 4 (read disabled) — kept simple and documented
/// here since the distilled spec leaves the encoding to the upstream
/// compiler.
const OPEN_WRITE: i64 = 1 << 0;
const OPEN_APPEND: i64 = 1 << 1;
const OPEN_CREATE: i64 = 1 << 2;
const OPEN_TRUNCATE: i64 = 1 << 3;

fn open(ctx: &mut SyscallCtx) -> VmResult<()> {
    let flags = ctx.pop_int()?;
    let path = ctx.pop_text()?;
    let mut options = OpenOptions::new();
    options.read(true).mode(0o644);
    if flags & OPEN_WRITE != 0 {
        options.write(true);
    }
    if flags & OPEN_APPEND != 0 {
        options.append(true);
    }
    if flags & OPEN_CREATE != 0 {
        options.create(true);
    }
    if flags & OPEN_TRUNCATE != 0 {
        options.truncate(true);
    }
    match options.open(&path) {
        Ok(file) => {
            let fd = ctx.runtime.fds.register(Box::new(FileChannel::new(file, path.into())));
            ctx.push_i64(fd as i64);
        }
        Err(err) => ctx.fail_io(&err),
    }
    Ok(())
}

fn read(ctx: &mut SyscallCtx) -> VmResult<()> {
    let n = ctx.pop_int()?;
    let fd = ctx.pop_int()? as i32;
    let channel = ctx
        .runtime
        .fds
        .get(fd)
        .ok_or_else(|| ctx.precondition(format!("invalid fd {fd}")))?;
    let mut buf = vec![0u8; n.max(0) as usize];
    match channel.lock().read(&mut buf) {
        Ok(read) => {
            buf.truncate(read);
            ctx.push(Value::Bytes(buf));
        }
        Err(err) => ctx.fail_io(&err),
    }
    Ok(())
}

fn write(ctx: &mut SyscallCtx) -> VmResult<()> {
    let data = ctx.pop_bytes_like()?;
    let fd = ctx.pop_int()? as i32;
    let channel = ctx
        .runtime
        .fds
        .get(fd)
        .ok_or_else(|| ctx.precondition(format!("invalid fd {fd}")))?;
    match channel.lock().write(&data) {
        Ok(written) => ctx.push_i64(written as i64),
        Err(err) => ctx.fail_io(&err),
    }
    Ok(())
}

fn seek(ctx: &mut SyscallCtx) -> VmResult<()> {
    let whence = ctx.pop_int()?;
    let offset = ctx.pop_int()?;
    let fd = ctx.pop_int()? as i32;
    let channel = ctx
        .runtime
        .fds
        .get(fd)
        .ok_or_else(|| ctx.precondition(format!("invalid fd {fd}")))?;
    let pos = match whence {
        0 => SeekFrom::Start(offset.max(0) as u64),
        1 => SeekFrom::Current(offset),
        2 => SeekFrom::End(offset),
        other => return Err(ctx.precondition(format!("invalid whence {other}"))),
    };
    match channel.lock().seek(pos) {
        Ok(new_pos) => ctx.push_i64(new_pos as i64),
        Err(err) => ctx.fail_io(&err),
    }
    Ok(())
}

fn close(ctx: &mut SyscallCtx) -> VmResult<()> {
    let fd = ctx.pop_int()? as i32;
    ctx.runtime.fds.close(fd);
    ctx.push_i64(0);
    Ok(())
}

fn stat_map(metadata: &std::fs::Metadata) -> Value {
    use std::os::unix::fs::MetadataExt;
    let mut map = serde_json::Map::new();
    map.insert("size".into(), serde_json::json!(metadata.len()));
    map.insert("mode".into(), serde_json::json!(metadata.mode()));
    map.insert("is_dir".into(), serde_json::json!(metadata.is_dir()));
    map.insert("mtime_ms".into(), serde_json::json!(metadata.mtime() * 1000));
    Value::Text(serde_json::Value::Object(map).to_string())
}

fn stat(ctx: &mut SyscallCtx) -> VmResult<()> {
    let path = ctx.pop_text()?;
    match fs::metadata(&path) {
        Ok(metadata) => ctx.push(stat_map(&metadata)),
        Err(err) => ctx.fail_io(&err),
    }
    Ok(())
}

fn fstat(ctx: &mut SyscallCtx) -> VmResult<()> {
    let fd = ctx.pop_int()? as i32;
    let channel = ctx
        .runtime
        .fds
        .get(fd)
        .ok_or_else(|| ctx.precondition(format!("invalid fd {fd}")))?;
    let path = channel.lock().path().map(|p| p.to_path_buf());
    match path {
        Some(path) => match fs::metadata(&path) {
            Ok(metadata) => ctx.push(stat_map(&metadata)),
            Err(err) => ctx.fail_io(&err),
        },
        None => {
            crate::error::set_errno(crate::error::Errno(libc::ENOTTY));
            ctx.push_i64(-1);
        }
    }
    Ok(())
}

fn unlink(ctx: &mut SyscallCtx) -> VmResult<()> {
    let path = ctx.pop_text()?;
    match fs::remove_file(&path) {
        Ok(()) => ctx.push_i64(0),
        Err(err) => ctx.fail_io(&err),
    }
    Ok(())
}

fn dup(ctx: &mut SyscallCtx) -> VmResult<()> {
    let fd = ctx.pop_int()? as i32;
    match ctx.runtime.fds.dup(fd) {
        Some(new_fd) => ctx.push_i64(new_fd as i64),
        None => return Err(ctx.precondition(format!("invalid fd {fd}"))),
    }
    Ok(())
}

fn dup2(ctx: &mut SyscallCtx) -> VmResult<()> {
    let new_fd = ctx.pop_int()? as i32;
    let old_fd = ctx.pop_int()? as i32;
    match ctx.runtime.fds.dup2(old_fd, new_fd) {
        Some(fd) => ctx.push_i64(fd as i64),
        None => return Err(ctx.precondition(format!("invalid fd {old_fd}"))),
    }
    Ok(())
}

/// `PIPE() -> (readfd, writefd)`; read pushed first so write ends up on
/// top of the stack (distilled spec §4.5).
fn pipe(ctx: &mut SyscallCtx) -> VmResult<()> {
    match new_pipe() {
        Ok((r, w)) => {
            let read_fd = ctx.runtime.fds.register(Box::new(r));
            let write_fd = ctx.runtime.fds.register(Box::new(w));
            ctx.push_i64(read_fd as i64);
            ctx.push_i64(write_fd as i64);
        }
        Err(err) => ctx.fail_io(&err),
    }
    Ok(())
}

fn truncate(ctx: &mut SyscallCtx) -> VmResult<()> {
    let len = ctx.pop_int()?;
    let path = ctx.pop_text()?;
    match OpenOptions::new().write(true).open(&path).and_then(|f| f.set_len(len.max(0) as u64)) {
        Ok(()) => ctx.push_i64(0),
        Err(err) => ctx.fail_io(&err),
    }
    Ok(())
}

fn ftruncate(ctx: &mut SyscallCtx) -> VmResult<()> {
    let len = ctx.pop_int()?;
    let fd = ctx.pop_int()? as i32;
    let channel = ctx
        .runtime
        .fds
        .get(fd)
        .ok_or_else(|| ctx.precondition(format!("invalid fd {fd}")))?;
    let path = channel.lock().path().map(|p| p.to_path_buf());
    match path {
        Some(path) => match OpenOptions::new().write(true).open(&path).and_then(|f| f.set_len(len.max(0) as u64)) {
            Ok(()) => ctx.push_i64(0),
            Err(err) => ctx.fail_io(&err),
        },
        None => {
            crate::error::set_errno(crate::error::Errno(libc::ENOTTY));
            ctx.push_i64(-1);
        }
    }
    Ok(())
}

fn rename(ctx: &mut SyscallCtx) -> VmResult<()> {
    let new_path = ctx.pop_text()?;
    let old_path = ctx.pop_text()?;
    match fs::rename(&old_path, &new_path) {
        Ok(()) => ctx.push_i64(0),
        Err(err) => ctx.fail_io(&err),
    }
    Ok(())
}

fn link(ctx: &mut SyscallCtx) -> VmResult<()> {
    let new_path = ctx.pop_text()?;
    let old_path = ctx.pop_text()?;
    match fs::hard_link(&old_path, &new_path) {
        Ok(()) => ctx.push_i64(0),
        Err(err) => ctx.fail_io(&err),
    }
    Ok(())
}

fn symlink(ctx: &mut SyscallCtx) -> VmResult<()> {
    let link_path = ctx.pop_text()?;
    let target = ctx.pop_text()?;
    match std::os::unix::fs::symlink(&target, &link_path) {
        Ok(()) => ctx.push_i64(0),
        Err(err) => ctx.fail_io(&err),
    }
    Ok(())
}

fn readlink(ctx: &mut SyscallCtx) -> VmResult<()> {
    let path = ctx.pop_text()?;
    match fs::read_link(&path) {
        Ok(target) => ctx.push(Value::Text(target.to_string_lossy().into_owned())),
        Err(err) => ctx.fail_io(&err),
    }
    Ok(())
}

fn set_nonblock(ctx: &mut SyscallCtx) -> VmResult<()> {
    let on = ctx.pop_int()? != 0;
    let fd = ctx.pop_int()? as i32;
    let channel = ctx
        .runtime
        .fds
        .get(fd)
        .ok_or_else(|| ctx.precondition(format!("invalid fd {fd}")))?;
    match channel.lock().set_nonblocking(on) {
        Ok(()) => ctx.push_i64(0),
        Err(err) => ctx.fail_io(&err),
    }
    Ok(())
}

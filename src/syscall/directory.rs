// Copyright (c) The water-vm Authors
// SPDX-License-Identifier: Apache-2.0

//! Directory & FS syscalls, family `0x1100` (distilled spec §4.5).

use std::fs;

use super::{SyscallCtx, SyscallDispatcher};
use crate::error::VmResult;
use crate::opcode::syscalls as sc;
use crate::value::Value;

pub fn install(d: &mut SyscallDispatcher) {
    d.register(sc::MKDIR, mkdir);
    d.register(sc::RMDIR, rmdir);
    d.register(sc::CHDIR, chdir);
    d.register(sc::GETCWD, getcwd);
    d.register(sc::READDIR, readdir);
    d.register(sc::CHMOD, chmod);
    d.register(sc::FCHMOD, fchmod);
    d.register(sc::UTIME, utime);
}

fn mkdir(ctx: &mut SyscallCtx) -> VmResult<()> {
    let mode = ctx.pop_optional_int()?;
    let path = ctx.pop_text()?;
    let result = fs::create_dir(&path);
    if let (Ok(()), Some(mode)) = (&result, mode) {
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let _ = fs::set_permissions(&path, fs::Permissions::from_mode(mode as u32));
        }
    }
    match result {
        Ok(()) => ctx.push_i64(0),
        Err(err) => ctx.fail_io(&err),
    }
    Ok(())
}

fn rmdir(ctx: &mut SyscallCtx) -> VmResult<()> {
    let path = ctx.pop_text()?;
    match fs::remove_dir(&path) {
        Ok(()) => ctx.push_i64(0),
        Err(err) => ctx.fail_io(&err),
    }
    Ok(())
}

fn chdir(ctx: &mut SyscallCtx) -> VmResult<()> {
    let path = ctx.pop_text()?;
    match std::env::set_current_dir(&path) {
        Ok(()) => ctx.push_i64(0),
        Err(err) => ctx.fail_io(&err),
    }
    Ok(())
}

fn getcwd(ctx: &mut SyscallCtx) -> VmResult<()> {
    match std::env::current_dir() {
        Ok(cwd) => ctx.push(Value::Text(cwd.to_string_lossy().into_owned())),
        Err(err) => ctx.fail_io(&err),
    }
    Ok(())
}

fn readdir(ctx: &mut SyscallCtx) -> VmResult<()> {
    let path = ctx.pop_text()?;
    match fs::read_dir(&path) {
        Ok(entries) => {
            let names: Vec<String> = entries
                .filter_map(|entry| entry.ok())
                .map(|entry| entry.file_name().to_string_lossy().into_owned())
                .collect();
            ctx.push(Value::Text(serde_json::to_string(&names).unwrap_or_default()));
        }
        Err(err) => ctx.fail_io(&err),
    }
    Ok(())
}

fn chmod(ctx: &mut SyscallCtx) -> VmResult<()> {
    use std::os::unix::fs::PermissionsExt;
    let mode = ctx.pop_int()?;
    let path = ctx.pop_text()?;
    match fs::set_permissions(&path, fs::Permissions::from_mode(mode as u32)) {
        Ok(()) => ctx.push_i64(0),
        Err(err) => ctx.fail_io(&err),
    }
    Ok(())
}

fn fchmod(ctx: &mut SyscallCtx) -> VmResult<()> {
    use std::os::unix::fs::PermissionsExt;
    let mode = ctx.pop_int()?;
    let fd = ctx.pop_int()? as i32;
    let channel = ctx
        .runtime
        .fds
        .get(fd)
        .ok_or_else(|| ctx.precondition(format!("invalid fd {fd}")))?;
    let path = channel.lock().path().map(|p| p.to_path_buf());
    match path {
        Some(path) => match fs::set_permissions(&path, fs::Permissions::from_mode(mode as u32)) {
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

/// `mtime`/`atime` are millisecond epochs; `atime` is best-effort (the
/// underlying `filetime`-free std API can only set both together, so we
/// apply `mtime` to both when `atime` access is unavailable).
fn utime(ctx: &mut SyscallCtx) -> VmResult<()> {
    let atime_ms = ctx.pop_optional_int()?;
    let mtime_ms = ctx.pop_int()?;
    let path = ctx.pop_text()?;

    let mtime = libc::timespec {
        tv_sec: mtime_ms / 1000,
        tv_nsec: (mtime_ms % 1000) * 1_000_000,
    };
    let atime = match atime_ms {
        Some(ms) => libc::timespec {
            tv_sec: ms / 1000,
            tv_nsec: (ms % 1000) * 1_000_000,
        },
        None => mtime,
    };
    let times = [atime, mtime];
    let c_path = match std::ffi::CString::new(path.as_str()) {
        Ok(p) => p,
        Err(_) => return Err(ctx.precondition("path contains an interior NUL byte")),
    };
    let rc = unsafe { libc::utimensat(libc::AT_FDCWD, c_path.as_ptr(), times.as_ptr(), 0) };
    if rc == 0 {
        ctx.push_i64(0);
    } else {
        ctx.fail_io(&std::io::Error::last_os_error());
    }
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
    fn mkdir_readdir_rmdir_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let sub = dir.path().join("child");
        let runtime = Runtime::new();
        let mut stack = OperandStack::new();

        stack.push(Value::Text(sub.to_string_lossy().into_owned()));
        stack.push(Value::Null);
        mkdir(&mut ctx(&mut stack, &runtime)).unwrap();
        assert_eq!(stack.pop(0).unwrap(), Value::I64(0));

        stack.push(Value::Text(dir.path().to_string_lossy().into_owned()));
        readdir(&mut ctx(&mut stack, &runtime)).unwrap();
        let listing = match stack.pop(0).unwrap() {
            Value::Text(s) => s,
            _ => panic!(),
        };
        assert!(listing.contains("child"));

        stack.push(Value::Text(sub.to_string_lossy().into_owned()));
        rmdir(&mut ctx(&mut stack, &runtime)).unwrap();
        assert_eq!(stack.pop(0).unwrap(), Value::I64(0));
    }

    #[test]
    fn getcwd_returns_a_path() {
        let runtime = Runtime::new();
        let mut stack = OperandStack::new();
        getcwd(&mut ctx(&mut stack, &runtime)).unwrap();
        match stack.pop(0).unwrap() {
            Value::Text(s) => assert!(!s.is_empty()),
            _ => panic!(),
        }
    }
}

// Copyright (c) The water-vm Authors
// SPDX-License-Identifier: Apache-2.0

//! Console / standard I/O syscalls, family `0x1200` (distilled spec §4.5).

use std::io::{BufRead, Write};

use super::{SyscallCtx, SyscallDispatcher};
use crate::error::VmResult;
use crate::opcode::syscalls as sc;
use crate::value::Value;

pub fn install(d: &mut SyscallDispatcher) {
    d.register(sc::PRINT, print);
    d.register(sc::PRINTLN, println);
    d.register(sc::STDIN_READ, stdin_read);
    d.register(sc::STDOUT_WRITE, stdout_write);
    d.register(sc::STDERR_WRITE, stderr_write);
}

fn print(ctx: &mut SyscallCtx) -> VmResult<()> {
    let value = ctx.pop()?;
    print!("{}", value.stringify());
    let _ = std::io::stdout().flush();
    ctx.push_i64(0);
    Ok(())
}

fn println(ctx: &mut SyscallCtx) -> VmResult<()> {
    let value = ctx.pop()?;
    println!("{}", value.stringify());
    ctx.push_i64(0);
    Ok(())
}

fn stdin_read(ctx: &mut SyscallCtx) -> VmResult<()> {
    let mut line = String::new();
    match std::io::stdin().lock().read_line(&mut line) {
        Ok(0) => ctx.push(Value::Null),
        Ok(_) => {
            if line.ends_with('\n') {
                line.pop();
                if line.ends_with('\r') {
                    line.pop();
                }
            }
            ctx.push(Value::Text(line));
        }
        Err(err) => ctx.fail_io(&err),
    }
    Ok(())
}

/// `data` is bytes, text, or `null` -> `"null"`, otherwise stringified
/// (distilled spec §4.5).
fn stdout_write(ctx: &mut SyscallCtx) -> VmResult<()> {
    let bytes = ctx.pop_bytes_like()?;
    match std::io::stdout().write_all(&bytes) {
        Ok(()) => {
            let _ = std::io::stdout().flush();
            ctx.push_i64(bytes.len() as i64);
        }
        Err(err) => ctx.fail_io(&err),
    }
    Ok(())
}

fn stderr_write(ctx: &mut SyscallCtx) -> VmResult<()> {
    let bytes = ctx.pop_bytes_like()?;
    let _ = std::io::stderr().write_all(&bytes);
    ctx.push_i64(0);
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
    fn stdout_write_reports_byte_count() {
        let runtime = Runtime::new();
        let mut stack = OperandStack::new();
        stack.push(Value::Text("Hello World".into()));
        stdout_write(&mut ctx(&mut stack, &runtime)).unwrap();
        assert_eq!(stack.pop(0).unwrap(), Value::I64(11));
    }

    #[test]
    fn null_stringifies_to_literal_null_for_stdout_write() {
        let runtime = Runtime::new();
        let mut stack = OperandStack::new();
        stack.push(Value::Null);
        stdout_write(&mut ctx(&mut stack, &runtime)).unwrap();
        assert_eq!(stack.pop(0).unwrap(), Value::I64(4));
    }
}

// Copyright (c) The water-vm Authors
// SPDX-License-Identifier: Apache-2.0

//! `PUSH` (typed, one literal-parsing function per scalar type) and the
//! untyped stack ops `POP, DUP, SWAP` (distilled spec §4.3/§4.4). `PUSH`'s
//! operand is the literal's source text exactly as it appears on the
//! `.water` line; text/bytes literals are quoted, bytes additionally
//! hex-encoded (e.g. `PUSH "48656c6c6f"` for `Bytes`).

use super::ExecContext;
use crate::error::{VmError, VmResult};
use crate::value::Value;

fn malformed(ctx: &ExecContext, reason: impl Into<String>) -> VmError {
    VmError::MalformedInstruction {
        pc: ctx.pc,
        reason: reason.into(),
    }
}

macro_rules! push_int {
    ($name:ident, $variant:ident, $ty:ty) => {
        pub fn $name(ctx: &mut ExecContext) -> VmResult<()> {
            let literal = ctx.operand(0)?;
            let value: $ty = literal.parse().map_err(|_| {
                malformed(ctx, format!("{literal:?} is not a valid {} literal", stringify!($ty)))
            })?;
            ctx.stack.push(Value::$variant(value));
            Ok(())
        }
    };
}

macro_rules! push_float {
    ($name:ident, $variant:ident, $ty:ty) => {
        pub fn $name(ctx: &mut ExecContext) -> VmResult<()> {
            let literal = ctx.operand(0)?;
            let value: $ty = literal.parse().map_err(|_| {
                malformed(ctx, format!("{literal:?} is not a valid {} literal", stringify!($ty)))
            })?;
            ctx.stack.push(Value::$variant(value));
            Ok(())
        }
    };
}

push_int!(push_i8, I8, i8);
push_int!(push_i16, I16, i16);
push_int!(push_i32, I32, i32);
push_int!(push_i64, I64, i64);
push_float!(push_f32, F32, f32);
push_float!(push_f64, F64, f64);

/// Strips one layer of `"..."` quoting the loader leaves intact on text
/// literals (the loader only strips `//` comments and surrounding
/// whitespace, never literal syntax).
fn unquote(ctx: &ExecContext, literal: &str) -> VmResult<String> {
    let stripped = literal
        .strip_prefix('"')
        .and_then(|s| s.strip_suffix('"'))
        .ok_or_else(|| malformed(ctx, format!("{literal:?} is not a quoted text literal")))?;
    Ok(stripped.to_string())
}

pub fn push_text(ctx: &mut ExecContext) -> VmResult<()> {
    let literal = ctx.operand_rest(0)?;
    let text = unquote(ctx, &literal)?;
    ctx.stack.push(Value::Text(text));
    Ok(())
}

pub fn push_bytes(ctx: &mut ExecContext) -> VmResult<()> {
    let literal = ctx.operand_rest(0)?;
    let hex = unquote(ctx, &literal)?;
    if hex.len() % 2 != 0 {
        return Err(malformed(ctx, "hex-encoded bytes literal has odd length"));
    }
    let mut bytes = Vec::with_capacity(hex.len() / 2);
    let chars: Vec<char> = hex.chars().collect();
    for pair in chars.chunks(2) {
        let byte_str: String = pair.iter().collect();
        let byte = u8::from_str_radix(&byte_str, 16)
            .map_err(|_| malformed(ctx, format!("{byte_str:?} is not valid hex")))?;
        bytes.push(byte);
    }
    ctx.stack.push(Value::Bytes(bytes));
    Ok(())
}

pub fn push_null(ctx: &mut ExecContext) -> VmResult<()> {
    ctx.stack.push(Value::Null);
    Ok(())
}

pub fn pop(ctx: &mut ExecContext) -> VmResult<()> {
    ctx.stack.pop(ctx.pc)?;
    Ok(())
}

pub fn dup(ctx: &mut ExecContext) -> VmResult<()> {
    let top = ctx.stack.peek(ctx.pc)?.clone();
    ctx.stack.push(top);
    Ok(())
}

pub fn swap(ctx: &mut ExecContext) -> VmResult<()> {
    let b = ctx.stack.pop(ctx.pc)?;
    let a = ctx.stack.pop(ctx.pc)?;
    ctx.stack.push(b);
    ctx.stack.push(a);
    Ok(())
}

/// Registers typed `PUSH` for every scalar type family, `PUSH_TEXT`,
/// `PUSH_BYTES`, `PUSH_NULL`, and the untyped `POP, DUP, SWAP`.
pub fn install(d: &mut crate::dispatch::Dispatcher) {
    use crate::opcode::{push_opcode, TypeFamily};

    d.register(push_opcode(TypeFamily::Byte8), push_i8);
    d.register(push_opcode(TypeFamily::Short16), push_i16);
    d.register(push_opcode(TypeFamily::Int32), push_i32);
    d.register(push_opcode(TypeFamily::Long64), push_i64);
    d.register(push_opcode(TypeFamily::Float32), push_f32);
    d.register(push_opcode(TypeFamily::Double64), push_f64);

    d.register(crate::opcode::PUSH_TEXT, push_text);
    d.register(crate::opcode::PUSH_BYTES, push_bytes);
    d.register(crate::opcode::PUSH_NULL, push_null);

    d.register(crate::opcode::POP, pop);
    d.register(crate::opcode::DUP, dup);
    d.register(crate::opcode::SWAP, swap);
}

// Copyright (c) The water-vm Authors
// SPDX-License-Identifier: Apache-2.0

//! The tagged value type every operand-stack slot, local-variable slot, and
//! syscall argument/result carries. Integer arithmetic on these is
//! two's-complement with wraparound; float arithmetic follows IEEE-754.

use crate::error::{Pc, VmError, VmResult};

/// A handle into one of the runtime's process-wide object registries
/// (arrays, concurrency primitives). Opaque to instructions: only the
/// syscall subsystem interprets the number.
pub type RefHandle = u64;

#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    I8(i8),
    I16(i16),
    I32(i32),
    I64(i64),
    F32(f32),
    F64(f64),
    Bytes(Vec<u8>),
    Text(String),
    Ref(RefHandle),
    Null,
}

/// Short type name used in type-mismatch error messages.
impl Value {
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::I8(_) => "i8",
            Value::I16(_) => "i16",
            Value::I32(_) => "i32",
            Value::I64(_) => "i64",
            Value::F32(_) => "f32",
            Value::F64(_) => "f64",
            Value::Bytes(_) => "bytes",
            Value::Text(_) => "text",
            Value::Ref(_) => "ref",
            Value::Null => "null",
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Stringifies for console/string-coercing syscalls (PRINT, STDOUT_WRITE
    /// on a non-bytes operand, etc). `Null` renders as `"null"` per §4.5.
    pub fn stringify(&self) -> String {
        match self {
            Value::I8(v) => v.to_string(),
            Value::I16(v) => v.to_string(),
            Value::I32(v) => v.to_string(),
            Value::I64(v) => v.to_string(),
            Value::F32(v) => v.to_string(),
            Value::F64(v) => v.to_string(),
            Value::Bytes(b) => String::from_utf8_lossy(b).into_owned(),
            Value::Text(s) => s.clone(),
            Value::Ref(r) => format!("ref#{r}"),
            Value::Null => "null".to_string(),
        }
    }

    /// Bytes for syscalls that accept "bytes, text, or null" (§4.5
    /// STDOUT_WRITE contract).
    pub fn to_bytes(&self) -> Vec<u8> {
        match self {
            Value::Bytes(b) => b.clone(),
            other => other.stringify().into_bytes(),
        }
    }
}

macro_rules! typed_pop {
    ($name:ident, $variant:ident, $ty:ty) => {
        /// Pops a value of this variant, or a typed pop helper used by
        /// individual instruction implementations; type mismatch is an
        /// instruction precondition violation (fatal, per §7).
        pub fn $name(value: Value, pc: Pc) -> VmResult<$ty> {
            match value {
                Value::$variant(v) => Ok(v),
                other => Err(VmError::TypeMismatch {
                    pc,
                    expected: stringify!($variant),
                    found: other.type_name(),
                }),
            }
        }
    };
}

typed_pop!(expect_i8, I8, i8);
typed_pop!(expect_i16, I16, i16);
typed_pop!(expect_i32, I32, i32);
typed_pop!(expect_i64, I64, i64);
typed_pop!(expect_f32, F32, f32);
typed_pop!(expect_f64, F64, f64);

pub fn expect_text(value: Value, pc: Pc) -> VmResult<String> {
    match value {
        Value::Text(s) => Ok(s),
        other => Err(VmError::TypeMismatch {
            pc,
            expected: "text",
            found: other.type_name(),
        }),
    }
}

pub fn expect_bytes(value: Value, pc: Pc) -> VmResult<Vec<u8>> {
    match value {
        Value::Bytes(b) => Ok(b),
        other => Err(VmError::TypeMismatch {
            pc,
            expected: "bytes",
            found: other.type_name(),
        }),
    }
}

pub fn expect_ref(value: Value, pc: Pc) -> VmResult<RefHandle> {
    match value {
        Value::Ref(r) => Ok(r),
        other => Err(VmError::TypeMismatch {
            pc,
            expected: "ref",
            found: other.type_name(),
        }),
    }
}

/// Integer-like pop: accepts any signed integer variant and widens to i64,
/// used by syscall argument marshalling where the bytecode may push any
/// integer width for a fd/length/flag argument.
pub fn expect_int(value: Value, pc: Pc) -> VmResult<i64> {
    match value {
        Value::I8(v) => Ok(v as i64),
        Value::I16(v) => Ok(v as i64),
        Value::I32(v) => Ok(v as i64),
        Value::I64(v) => Ok(v),
        other => Err(VmError::TypeMismatch {
            pc,
            expected: "integer",
            found: other.type_name(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stringify_null_is_literal_null() {
        assert_eq!(Value::Null.stringify(), "null");
    }

    #[test]
    fn stringify_numeric() {
        assert_eq!(Value::I32(-7).stringify(), "-7");
        assert_eq!(Value::F64(1.5).stringify(), "1.5");
    }

    #[test]
    fn to_bytes_for_text_is_utf8() {
        assert_eq!(Value::Text("hi".into()).to_bytes(), b"hi".to_vec());
    }

    #[test]
    fn expect_i32_type_mismatch() {
        let err = expect_i32(Value::Text("x".into()), 3).unwrap_err();
        match err {
            VmError::TypeMismatch { pc, expected, found } => {
                assert_eq!(pc, 3);
                assert_eq!(expected, "I32");
                assert_eq!(found, "text");
            }
            _ => panic!("wrong error variant"),
        }
    }

    #[test]
    fn expect_int_widens_all_integer_variants() {
        assert_eq!(expect_int(Value::I8(-1), 0).unwrap(), -1);
        assert_eq!(expect_int(Value::I16(300), 0).unwrap(), 300);
        assert_eq!(expect_int(Value::I64(9), 0).unwrap(), 9);
    }
}

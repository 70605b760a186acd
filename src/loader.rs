// Copyright (c) The water-vm Authors
// SPDX-License-Identifier: Apache-2.0

//! Reads a `.water` program from disk: one instruction per line, with
//! `//`-terminated trailing comments and blank lines stripped. Lines whose
//! first non-whitespace character is `#` are left in the program (the
//! engine treats those as fetch-time no-ops, distilled spec §4.2).

use std::fs;
use std::path::Path;

use crate::error::{VmError, VmResult};

/// An ordered, `0..N`-indexed program: `program[pc]` is one already-stripped
/// instruction line.
#[derive(Debug, Clone)]
pub struct Program {
    lines: Vec<String>,
}

impl Program {
    pub fn load(path: impl AsRef<Path>) -> VmResult<Program> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|source| VmError::Loader {
            path: path.display().to_string(),
            source,
        })?;
        let lines = strip(&text);
        if lines.is_empty() {
            return Err(VmError::EmptyProgram(path.display().to_string()));
        }
        tracing::debug!(path = %path.display(), instructions = lines.len(), "loaded program");
        Ok(Program { lines })
    }

    pub fn from_source(source: &str) -> VmResult<Program> {
        let lines = strip(source);
        if lines.is_empty() {
            return Err(VmError::EmptyProgram("<in-memory>".to_string()));
        }
        Ok(Program { lines })
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    pub fn get(&self, pc: i32) -> Option<&str> {
        if pc < 0 {
            return None;
        }
        self.lines.get(pc as usize).map(String::as_str)
    }

    /// A single-instruction `HALT` program, for contexts that need a
    /// `Runtime` before any real program is loaded (syscall unit tests).
    pub fn placeholder() -> Program {
        Program {
            lines: vec!["0x0400".to_string()],
        }
    }
}

/// Strips `//...` trailing comments then trims; drops lines that become
/// empty. `#`-prefixed lines are kept (the engine, not the loader, decides
/// what to do with them).
fn strip(text: &str) -> Vec<String> {
    text.lines()
        .filter_map(|line| {
            let stripped = match line.find("//") {
                Some(idx) => &line[..idx],
                None => line,
            };
            let trimmed = stripped.trim();
            if trimmed.is_empty() {
                None
            } else {
                Some(trimmed.to_string())
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_trailing_comments_and_blank_lines() {
        let program = Program::from_source(
            "0x0400 // entry\n\n   \n// pure comment line\n0x0100\n",
        )
        .unwrap();
        assert_eq!(program.len(), 2);
        assert_eq!(program.get(0), Some("0x0400"));
        assert_eq!(program.get(1), Some("0x0100"));
    }

    #[test]
    fn keeps_hash_comment_lines_for_the_engine() {
        let program = Program::from_source("# a comment\n0x0400\n").unwrap();
        assert_eq!(program.len(), 2);
        assert_eq!(program.get(0), Some("# a comment"));
    }

    #[test]
    fn empty_program_is_an_error() {
        let err = Program::from_source("// only a comment\n").unwrap_err();
        assert!(matches!(err, VmError::EmptyProgram(_)));
    }

    #[test]
    fn missing_file_is_a_loader_error() {
        let err = Program::load("/nonexistent/path/does-not-exist.water").unwrap_err();
        assert!(matches!(err, VmError::Loader { .. }));
    }

    #[test]
    fn out_of_bounds_get_is_none() {
        let program = Program::from_source("0x0400\n").unwrap();
        assert_eq!(program.get(5), None);
        assert_eq!(program.get(-1), None);
    }
}

//! Program loader.
//!
//! Syntax: one instruction per line, blank lines ignored.
//! ```text
//! inc a
//! jio a, +2
//! tpl a
//! inc a
//! ```

use crate::machine::decode::{decode, DecodeError};
use crate::machine::program::Program;
use thiserror::Error;

/// Assemble source text into a program.
pub fn assemble(source: &str) -> Result<Program, AssemblerError> {
    assemble_lines(source.lines())
}

/// Assemble pre-split lines, already stripped of their newlines.
pub fn assemble_lines<I, S>(lines: I) -> Result<Program, AssemblerError>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut instructions = Vec::new();

    for (line_num, line) in lines.into_iter().enumerate() {
        let line = line.as_ref().trim();
        if line.is_empty() {
            continue;
        }

        let instr = decode(line).map_err(|source| AssemblerError::Syntax {
            line: line_num + 1,
            text: line.to_string(),
            source,
        })?;
        instructions.push(instr);
    }

    Ok(Program::from_instructions(instructions))
}

/// Errors that can occur during assembly.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AssemblerError {
    #[error("syntax error on line {line} ({text:?}): {source}")]
    Syntax {
        line: usize,
        text: String,
        source: DecodeError,
    },
}

impl AssemblerError {
    /// The 1-based source line of the error.
    pub fn line(&self) -> usize {
        match self {
            AssemblerError::Syntax { line, .. } => *line,
        }
    }
}

//! Loading and listing programs.
//!
//! This module provides:
//! - an assembler (text → [`Program`](crate::machine::Program))
//! - a disassembler (program → indexed listing)

pub mod assembler;
pub mod disasm;

pub use assembler::{assemble, assemble_lines, AssemblerError};
pub use disasm::disassemble;

//! # regvm
//!
//! An interpreter for the small register machines of the puzzle tablets:
//! the two-register Turing lock, the sound card, the duet pair and the
//! coprocessor. All four share one decoder, one register file and one
//! dispatch loop; they differ in their instruction sets, in what `snd` and
//! `rcv` do, and in when they stop.

pub mod machine;
pub mod asm;

#[cfg(feature = "tui")]
pub mod tui;

#[cfg(feature = "wasm")]
pub mod wasm;

// Re-export commonly used types
pub use machine::{
    decode, Duet, DuetOutcome, Instruction, Machine, MachineError, MachineState, Mailboxes,
    Opcode, Operand, Program, Register, RegisterFile, Snapshot, Variant,
};
pub use asm::{assemble, disassemble, AssemblerError};

#[cfg(feature = "tui")]
pub use tui::run_debugger;

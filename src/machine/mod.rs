//! Register machine emulation.
//!
//! This module implements the shared machine core:
//! - an instruction decoder for every dialect's text form
//! - a lazily-zeroed register file
//! - the fetch-advance-execute loop with per-dialect `snd`/`rcv`
//! - a driver for two cooperating duet machines

pub mod decode;
pub mod duet;
pub mod execute;
pub mod program;
pub mod registers;
pub mod snapshot;
pub mod variant;

pub use decode::{decode, DecodeError, Instruction, Opcode, Operand};
pub use duet::{Duet, DuetOutcome, Mailboxes};
pub use execute::{Link, Machine, MachineError, MachineState, Step};
pub use program::Program;
pub use registers::{Register, RegisterFile};
pub use snapshot::{load_snapshot, load_snapshots, save_snapshot, save_snapshots, Snapshot, SnapshotError};
pub use variant::Variant;

//! TUI debugger for register machines.
//!
//! Provides an interactive terminal-based debugger with:
//! - Program listing with the pc marker and breakpoints
//! - Register panels (one per machine for duet programs)
//! - Mailbox queues for duet programs
//! - Step/run/breakpoint controls

mod app;
mod ui;

pub use app::{DebuggerApp, run_debugger};

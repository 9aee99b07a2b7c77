//! Machine snapshots.
//!
//! A snapshot is the mutable half of a machine (the program is not
//! included). Snapshots are stored as JSON.

use crate::machine::decode::Opcode;
use crate::machine::execute::MachineState;
use crate::machine::registers::RegisterFile;
use crate::machine::variant::Variant;
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snapshot {
    pub variant: Variant,
    pub pc: i64,
    pub state: MachineState,
    pub cycles: u64,
    pub registers: RegisterFile,
    /// Execution counts of every opcode that ran at least once.
    pub executed: Vec<(Opcode, u64)>,
    pub last_sound: Option<i64>,
    pub recovered: Option<i64>,
    pub sent: u64,
}

/// Write a snapshot to disk.
pub fn save_snapshot<P: AsRef<Path>>(path: P, snapshot: &Snapshot) -> Result<(), SnapshotError> {
    let json = serde_json::to_string_pretty(snapshot)?;
    std::fs::write(path.as_ref(), json).map_err(|e| SnapshotError::IoError(e.to_string()))
}

/// Read a snapshot from disk.
pub fn load_snapshot<P: AsRef<Path>>(path: P) -> Result<Snapshot, SnapshotError> {
    let json = std::fs::read_to_string(path.as_ref())
        .map_err(|e| SnapshotError::IoError(e.to_string()))?;
    Ok(serde_json::from_str(&json)?)
}

/// Write the snapshots of several machines (a duet pair) as one JSON array.
pub fn save_snapshots<P: AsRef<Path>>(path: P, snapshots: &[Snapshot]) -> Result<(), SnapshotError> {
    let json = serde_json::to_string_pretty(snapshots)?;
    std::fs::write(path.as_ref(), json).map_err(|e| SnapshotError::IoError(e.to_string()))
}

/// Read snapshots written by [`save_snapshots`].
pub fn load_snapshots<P: AsRef<Path>>(path: P) -> Result<Vec<Snapshot>, SnapshotError> {
    let json = std::fs::read_to_string(path.as_ref())
        .map_err(|e| SnapshotError::IoError(e.to_string()))?;
    Ok(serde_json::from_str(&json)?)
}

/// Errors that can occur while saving or loading snapshots.
#[derive(Debug, Error)]
pub enum SnapshotError {
    #[error("I/O error: {0}")]
    IoError(String),

    #[error("malformed snapshot: {0}")]
    Json(#[from] serde_json::Error),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::asm::assemble;
    use crate::machine::execute::Machine;
    use std::sync::Arc;

    #[test]
    fn test_save_load_roundtrip() {
        let program = Arc::new(assemble("set a 1\nadd a 2\nsnd a\nmul a a").unwrap());
        let mut machine = Machine::new(program, Variant::Sound).unwrap();
        machine.run().unwrap();

        let snapshot = machine.snapshot();
        let path = std::env::temp_dir().join(format!("regvm-snapshot-{}.json", std::process::id()));
        save_snapshot(&path, &snapshot).unwrap();
        let loaded = load_snapshot(&path).unwrap();
        let _ = std::fs::remove_file(&path);

        assert_eq!(loaded, snapshot);
        assert_eq!(loaded.last_sound, Some(3));
        assert_eq!(loaded.state, MachineState::Halted);
        assert!(loaded.executed.contains(&(Opcode::Mul, 1)));
    }

    #[test]
    fn test_save_load_duet_pair() {
        use crate::machine::duet::Duet;

        let program = Arc::new(assemble("snd 1\nsnd p\nrcv a\nrcv b\nrcv c").unwrap());
        let mut duet = Duet::new(program).unwrap();
        duet.run().unwrap();

        let snapshots: Vec<Snapshot> = duet.machines().iter().map(|m| m.snapshot()).collect();
        let path = std::env::temp_dir().join(format!("regvm-duet-{}.json", std::process::id()));
        save_snapshots(&path, &snapshots).unwrap();
        let loaded = load_snapshots(&path).unwrap();
        let _ = std::fs::remove_file(&path);

        assert_eq!(loaded, snapshots);
        assert_eq!(loaded[0].registers.get(crate::machine::Register::letter(b'b')), 1);
        assert_eq!(loaded[1].registers.get(crate::machine::Register::letter(b'b')), 0);
        assert_eq!(loaded[1].sent, 2);
    }

    #[test]
    fn test_malformed_snapshot() {
        let err = serde_json::from_str::<Snapshot>("{\"variant\":\"abacus\"}").unwrap_err();
        assert!(SnapshotError::from(err).to_string().starts_with("malformed snapshot"));
    }

    #[test]
    fn test_missing_file() {
        let result = load_snapshot("/nonexistent/regvm/snapshot.json");
        assert!(matches!(result, Err(SnapshotError::IoError(_))));
    }
}

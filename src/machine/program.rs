//! The program store.
//!
//! A program is fixed once loaded. Peer machines share one copy through an
//! `Arc`, so nothing here is mutable.

use crate::machine::decode::Instruction;
use crate::machine::execute::MachineError;
use crate::machine::variant::Variant;
use serde::{Deserialize, Serialize};
use std::fmt;

/// An ordered, immutable sequence of instructions.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Program {
    instructions: Vec<Instruction>,
}

impl Program {
    pub fn from_instructions(instructions: Vec<Instruction>) -> Self {
        Self { instructions }
    }

    /// Number of instructions.
    #[inline]
    pub fn len(&self) -> usize {
        self.instructions.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.instructions.is_empty()
    }

    /// Fetch the instruction at a program counter value.
    ///
    /// Returns `None` for any pc outside `[0, len)`, negative values included.
    #[inline]
    pub fn get(&self, pc: i64) -> Option<&Instruction> {
        usize::try_from(pc).ok().and_then(|i| self.instructions.get(i))
    }

    /// True if `pc` addresses an instruction.
    #[inline]
    pub fn contains(&self, pc: i64) -> bool {
        self.get(pc).is_some()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Instruction> + '_ {
        self.instructions.iter()
    }

    pub fn instructions(&self) -> &[Instruction] {
        &self.instructions
    }

    /// Reject instructions outside `variant`'s dialect, and duet receives
    /// into an immediate.
    pub fn check(&self, variant: Variant) -> Result<(), MachineError> {
        variant.check(self)
    }
}

impl FromIterator<Instruction> for Program {
    fn from_iter<I: IntoIterator<Item = Instruction>>(iter: I) -> Self {
        Self::from_instructions(iter.into_iter().collect())
    }
}

/// One instruction per line, in the form the assembler accepts.
impl fmt::Display for Program {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for instr in &self.instructions {
            writeln!(f, "{}", instr)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::machine::decode::decode;

    #[test]
    fn test_get_bounds() {
        let program: Program = ["inc a", "tpl a"]
            .iter()
            .map(|l| decode(l).unwrap())
            .collect();

        assert_eq!(program.len(), 2);
        assert!(program.get(-1).is_none());
        assert!(program.get(0).is_some());
        assert!(program.get(1).is_some());
        assert!(program.get(2).is_none());
        assert!(!program.contains(i64::MIN));
    }

    #[test]
    fn test_check_against_dialect() {
        let program: Program = ["set a 1", "rcv 5"]
            .iter()
            .map(|l| decode(l).unwrap())
            .collect();
        assert!(program.check(Variant::Sound).is_ok());
        assert_eq!(
            program.check(Variant::Duet),
            Err(MachineError::ReceiveNeedsRegister { index: 1 })
        );
        assert!(matches!(
            program.check(Variant::Coprocessor),
            Err(MachineError::Unsupported { index: 1, .. })
        ));
    }

    #[test]
    fn test_display_lists_lines() {
        let program: Program = ["set a 1", "jgz a -1"]
            .iter()
            .map(|l| decode(l).unwrap())
            .collect();
        assert_eq!(program.to_string(), "set a 1\njgz a -1\n");
    }
}

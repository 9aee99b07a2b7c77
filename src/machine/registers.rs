//! Register names and the register file.
//!
//! Registers are named by short identifiers (`a`, `b`, `p`, ...). A register
//! that was never written reads as zero, so the file only stores slots that
//! have been set.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// A register name of 1 to 8 ASCII identifier characters.
///
/// Stored inline so instructions stay `Copy`.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Register {
    bytes: [u8; Register::MAX_LEN],
    len: u8,
}

impl Register {
    /// Longest accepted register name.
    pub const MAX_LEN: usize = 8;

    /// Parse a register name.
    ///
    /// Names start with an ASCII letter or `_` and continue with letters,
    /// digits or `_`.
    pub fn new(name: &str) -> Result<Self, RegisterNameError> {
        let raw = name.as_bytes();
        if raw.is_empty() || raw.len() > Self::MAX_LEN {
            return Err(RegisterNameError(name.to_string()));
        }
        if raw[0].is_ascii_digit() {
            return Err(RegisterNameError(name.to_string()));
        }
        if !raw.iter().all(|b| b.is_ascii_alphanumeric() || *b == b'_') {
            return Err(RegisterNameError(name.to_string()));
        }

        let mut bytes = [0u8; Self::MAX_LEN];
        bytes[..raw.len()].copy_from_slice(raw);
        Ok(Self {
            bytes,
            len: raw.len() as u8,
        })
    }

    /// A single-letter register, for names fixed at compile time.
    /// `letter` must be an ASCII letter.
    pub const fn letter(letter: u8) -> Self {
        let mut bytes = [0u8; Self::MAX_LEN];
        bytes[0] = letter;
        Self { bytes, len: 1 }
    }

    /// The register's name.
    pub fn as_str(&self) -> &str {
        // Only ASCII bytes are ever stored.
        std::str::from_utf8(&self.bytes[..self.len as usize]).unwrap_or_default()
    }
}

impl FromStr for Register {
    type Err = RegisterNameError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl fmt::Display for Register {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl fmt::Debug for Register {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "%{}", self.as_str())
    }
}

impl Serialize for Register {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for Register {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let name = String::deserialize(deserializer)?;
        Register::new(&name).map_err(serde::de::Error::custom)
    }
}

/// A string that is not a valid register name.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid register name: {0:?}")]
pub struct RegisterNameError(pub String);

/// The register file of one machine.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegisterFile {
    slots: BTreeMap<Register, i64>,
}

impl RegisterFile {
    /// Create an empty register file; every register reads as zero.
    pub fn new() -> Self {
        Self {
            slots: BTreeMap::new(),
        }
    }

    /// Read a register, or 0 if it was never set.
    #[inline]
    pub fn get(&self, reg: Register) -> i64 {
        self.slots.get(&reg).copied().unwrap_or(0)
    }

    /// Store a value, creating the slot if absent.
    #[inline]
    pub fn set(&mut self, reg: Register, value: i64) {
        self.slots.insert(reg, value);
    }

    /// Iterate over the registers that have been written, in name order.
    pub fn iter(&self) -> impl Iterator<Item = (Register, i64)> + '_ {
        self.slots.iter().map(|(reg, value)| (*reg, *value))
    }

    /// Number of registers that have been written.
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// True if no register has been written.
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Forget every register.
    pub fn clear(&mut self) {
        self.slots.clear();
    }
}

impl fmt::Display for RegisterFile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for (reg, value) in self.iter() {
            if !first {
                write!(f, " ")?;
            }
            write!(f, "{}={}", reg, value)?;
            first = false;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reg(name: &str) -> Register {
        Register::new(name).unwrap()
    }

    #[test]
    fn test_register_names() {
        assert_eq!(reg("a").as_str(), "a");
        assert_eq!(reg("snd_2").as_str(), "snd_2");
        assert!(Register::new("").is_err());
        assert!(Register::new("1a").is_err());
        assert!(Register::new("a-b").is_err());
        assert!(Register::new("abcdefghi").is_err());
    }

    #[test]
    fn test_unset_register_reads_zero() {
        let regs = RegisterFile::new();
        assert_eq!(regs.get(reg("z")), 0);
        assert!(regs.is_empty());
    }

    #[test]
    fn test_set_and_get() {
        let mut regs = RegisterFile::new();
        regs.set(reg("a"), -7);
        regs.set(reg("b"), 0);
        assert_eq!(regs.get(reg("a")), -7);
        assert_eq!(regs.get(reg("b")), 0);
        assert_eq!(regs.len(), 2);

        regs.set(reg("a"), 12);
        assert_eq!(regs.get(reg("a")), 12);
        assert_eq!(regs.len(), 2);
    }

    #[test]
    fn test_display_is_name_ordered() {
        let mut regs = RegisterFile::new();
        regs.set(reg("b"), 2);
        regs.set(reg("a"), 1);
        assert_eq!(regs.to_string(), "a=1 b=2");
    }

    #[test]
    fn test_register_serde() {
        let mut regs = RegisterFile::new();
        regs.set(reg("p"), 1);
        let json = serde_json::to_string(&regs).unwrap();
        assert_eq!(json, r#"{"slots":{"p":1}}"#);
        let back: RegisterFile = serde_json::from_str(&json).unwrap();
        assert_eq!(back, regs);
    }
}

//! Instruction decoder.
//!
//! Every dialect shares one textual form: a mnemonic followed by one or two
//! operands, separated by whitespace and optionally a comma
//! (`jio a, +2`). An operand is an immediate when it looks like a signed
//! decimal integer and a register name otherwise.

use crate::machine::registers::{Register, RegisterNameError};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// An instruction operand.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Operand {
    /// Resolved against the register file at execution time.
    Reg(Register),
    /// A constant fixed at parse time.
    Imm(i64),
}

impl Operand {
    /// The register this operand names, if any.
    pub fn register(&self) -> Option<Register> {
        match self {
            Operand::Reg(reg) => Some(*reg),
            Operand::Imm(_) => None,
        }
    }
}

impl fmt::Display for Operand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operand::Reg(reg) => write!(f, "{}", reg),
            Operand::Imm(value) => write!(f, "{}", value),
        }
    }
}

impl FromStr for Operand {
    type Err = DecodeError;

    fn from_str(token: &str) -> Result<Self, Self::Err> {
        if is_immediate(token) {
            return token
                .parse::<i64>()
                .map(Operand::Imm)
                .map_err(|_| DecodeError::ImmediateOutOfRange(token.to_string()));
        }
        Ok(Operand::Reg(Register::new(token)?))
    }
}

/// `^[+-]?[0-9]+$`
fn is_immediate(token: &str) -> bool {
    let digits = token
        .strip_prefix('+')
        .or_else(|| token.strip_prefix('-'))
        .unwrap_or(token);
    !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit())
}

/// The closed set of operations understood by any dialect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Opcode {
    Hlf,
    Tpl,
    Inc,
    Jmp,
    Jie,
    Jio,
    Set,
    Add,
    Sub,
    Mul,
    Mod,
    Snd,
    Rcv,
    Jgz,
    Jnz,
}

impl Opcode {
    /// Number of opcodes.
    pub const COUNT: usize = 15;

    /// Every opcode, in declaration order.
    pub const ALL: [Opcode; Opcode::COUNT] = [
        Opcode::Hlf,
        Opcode::Tpl,
        Opcode::Inc,
        Opcode::Jmp,
        Opcode::Jie,
        Opcode::Jio,
        Opcode::Set,
        Opcode::Add,
        Opcode::Sub,
        Opcode::Mul,
        Opcode::Mod,
        Opcode::Snd,
        Opcode::Rcv,
        Opcode::Jgz,
        Opcode::Jnz,
    ];

    pub fn mnemonic(self) -> &'static str {
        match self {
            Opcode::Hlf => "hlf",
            Opcode::Tpl => "tpl",
            Opcode::Inc => "inc",
            Opcode::Jmp => "jmp",
            Opcode::Jie => "jie",
            Opcode::Jio => "jio",
            Opcode::Set => "set",
            Opcode::Add => "add",
            Opcode::Sub => "sub",
            Opcode::Mul => "mul",
            Opcode::Mod => "mod",
            Opcode::Snd => "snd",
            Opcode::Rcv => "rcv",
            Opcode::Jgz => "jgz",
            Opcode::Jnz => "jnz",
        }
    }

    pub fn from_mnemonic(mnemonic: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|op| op.mnemonic() == mnemonic)
    }

    /// Number of operands the opcode takes.
    pub fn arity(self) -> usize {
        match self {
            Opcode::Hlf | Opcode::Tpl | Opcode::Inc | Opcode::Jmp => 1,
            Opcode::Snd | Opcode::Rcv => 1,
            _ => 2,
        }
    }

    /// True for the relative jumps.
    pub fn is_jump(self) -> bool {
        matches!(
            self,
            Opcode::Jmp | Opcode::Jie | Opcode::Jio | Opcode::Jgz | Opcode::Jnz
        )
    }

    /// Position in [`Opcode::ALL`], for per-opcode tables.
    #[inline]
    pub fn index(self) -> usize {
        self as usize
    }
}

impl fmt::Display for Opcode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.mnemonic())
    }
}

/// A decoded instruction.
///
/// Operand positions that the dialects always write to are typed as
/// [`Register`]; everything that is only read is an [`Operand`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Instruction {
    // ==================== Turing lock ====================

    /// X := X / 2, truncating toward zero
    Hlf { reg: Register },

    /// X := X * 3
    Tpl { reg: Register },

    /// X := X + 1
    Inc { reg: Register },

    /// Unconditional relative jump
    Jmp { offset: Operand },

    /// Relative jump if X is even
    Jie { reg: Register, offset: Operand },

    /// Relative jump if X is exactly one
    Jio { reg: Register, offset: Operand },

    // ==================== Arithmetic ====================

    /// X := Y
    Set { dst: Register, src: Operand },

    /// X := X + Y
    Add { dst: Register, src: Operand },

    /// X := X - Y
    Sub { dst: Register, src: Operand },

    /// X := X * Y
    Mul { dst: Register, src: Operand },

    /// X := X mod Y, with the sign of Y
    Mod { dst: Register, src: Operand },

    // ==================== Communication ====================

    /// Play a sound, or send to the peer machine
    Snd { value: Operand },

    /// Recover the last sound, or receive from the peer machine
    Rcv { operand: Operand },

    // ==================== Conditional jumps ====================

    /// Relative jump by Y if X > 0
    Jgz { cond: Operand, offset: Operand },

    /// Relative jump by Y if X != 0
    Jnz { cond: Operand, offset: Operand },
}

impl Instruction {
    pub fn opcode(&self) -> Opcode {
        match self {
            Instruction::Hlf { .. } => Opcode::Hlf,
            Instruction::Tpl { .. } => Opcode::Tpl,
            Instruction::Inc { .. } => Opcode::Inc,
            Instruction::Jmp { .. } => Opcode::Jmp,
            Instruction::Jie { .. } => Opcode::Jie,
            Instruction::Jio { .. } => Opcode::Jio,
            Instruction::Set { .. } => Opcode::Set,
            Instruction::Add { .. } => Opcode::Add,
            Instruction::Sub { .. } => Opcode::Sub,
            Instruction::Mul { .. } => Opcode::Mul,
            Instruction::Mod { .. } => Opcode::Mod,
            Instruction::Snd { .. } => Opcode::Snd,
            Instruction::Rcv { .. } => Opcode::Rcv,
            Instruction::Jgz { .. } => Opcode::Jgz,
            Instruction::Jnz { .. } => Opcode::Jnz,
        }
    }
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let op = self.opcode();
        match self {
            Instruction::Hlf { reg } | Instruction::Tpl { reg } | Instruction::Inc { reg } => {
                write!(f, "{} {}", op, reg)
            }
            Instruction::Jmp { offset } => write!(f, "{} {}", op, Signed(offset)),
            Instruction::Jie { reg, offset } | Instruction::Jio { reg, offset } => {
                write!(f, "{} {}, {}", op, reg, Signed(offset))
            }
            Instruction::Set { dst, src }
            | Instruction::Add { dst, src }
            | Instruction::Sub { dst, src }
            | Instruction::Mul { dst, src }
            | Instruction::Mod { dst, src } => write!(f, "{} {} {}", op, dst, src),
            Instruction::Snd { value } => write!(f, "{} {}", op, value),
            Instruction::Rcv { operand } => write!(f, "{} {}", op, operand),
            Instruction::Jgz { cond, offset } | Instruction::Jnz { cond, offset } => {
                write!(f, "{} {} {}", op, cond, offset)
            }
        }
    }
}

/// Turing-lock offsets are always written with an explicit sign.
struct Signed<'a>(&'a Operand);

impl fmt::Display for Signed<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0 {
            Operand::Imm(value) => write!(f, "{:+}", value),
            Operand::Reg(reg) => write!(f, "{}", reg),
        }
    }
}

impl FromStr for Instruction {
    type Err = DecodeError;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        decode(line)
    }
}

/// Decode one line of program text.
pub fn decode(line: &str) -> Result<Instruction, DecodeError> {
    let mut tokens = line
        .split(|c: char| c.is_whitespace() || c == ',')
        .filter(|t| !t.is_empty());

    let mnemonic = tokens.next().ok_or(DecodeError::Empty)?;
    let op = Opcode::from_mnemonic(mnemonic)
        .ok_or_else(|| DecodeError::UnknownMnemonic(mnemonic.to_string()))?;

    let args = tokens
        .map(|t| t.parse::<Operand>())
        .collect::<Result<Vec<_>, _>>()?;
    if args.len() != op.arity() {
        return Err(DecodeError::Arity {
            opcode: op,
            expected: op.arity(),
            found: args.len(),
        });
    }

    let reg = |operand: Operand| {
        operand
            .register()
            .ok_or(DecodeError::ExpectedRegister { opcode: op, operand })
    };

    let instruction = match op {
        Opcode::Hlf => Instruction::Hlf { reg: reg(args[0])? },
        Opcode::Tpl => Instruction::Tpl { reg: reg(args[0])? },
        Opcode::Inc => Instruction::Inc { reg: reg(args[0])? },
        Opcode::Jmp => Instruction::Jmp { offset: args[0] },
        Opcode::Jie => Instruction::Jie { reg: reg(args[0])?, offset: args[1] },
        Opcode::Jio => Instruction::Jio { reg: reg(args[0])?, offset: args[1] },
        Opcode::Set => Instruction::Set { dst: reg(args[0])?, src: args[1] },
        Opcode::Add => Instruction::Add { dst: reg(args[0])?, src: args[1] },
        Opcode::Sub => Instruction::Sub { dst: reg(args[0])?, src: args[1] },
        Opcode::Mul => Instruction::Mul { dst: reg(args[0])?, src: args[1] },
        Opcode::Mod => Instruction::Mod { dst: reg(args[0])?, src: args[1] },
        Opcode::Snd => Instruction::Snd { value: args[0] },
        Opcode::Rcv => Instruction::Rcv { operand: args[0] },
        Opcode::Jgz => Instruction::Jgz { cond: args[0], offset: args[1] },
        Opcode::Jnz => Instruction::Jnz { cond: args[0], offset: args[1] },
    };

    Ok(instruction)
}

/// Errors that can occur while decoding a single line.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    #[error("empty instruction")]
    Empty,

    #[error("unknown mnemonic: {0}")]
    UnknownMnemonic(String),

    #[error("{opcode} takes {expected} operand(s), found {found}")]
    Arity {
        opcode: Opcode,
        expected: usize,
        found: usize,
    },

    #[error("{opcode} needs a register, found {operand}")]
    ExpectedRegister { opcode: Opcode, operand: Operand },

    #[error("immediate out of range: {0}")]
    ImmediateOutOfRange(String),

    #[error(transparent)]
    InvalidRegister(#[from] RegisterNameError),
}

//! Machine dialects.
//!
//! The dialects share the decoder and the dispatch loop; they differ in
//! which opcodes they accept, what `snd`/`rcv` mean, and what the answer is.

use crate::machine::decode::{Instruction, Opcode};
use crate::machine::execute::MachineError;
use crate::machine::program::Program;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Variant {
    /// Two-register Turing lock: hlf, tpl, inc, jmp, jie, jio.
    Turing,
    /// Sound card: snd plays, rcv recovers the last sound.
    Sound,
    /// Two cooperating programs: snd sends, rcv receives or blocks.
    Duet,
    /// Coprocessor: set, sub, mul, jnz, with mul executions counted.
    Coprocessor,
}

impl Variant {
    pub const ALL: [Variant; 4] = [
        Variant::Turing,
        Variant::Sound,
        Variant::Duet,
        Variant::Coprocessor,
    ];

    /// Opcodes this dialect understands.
    pub fn opcodes(self) -> &'static [Opcode] {
        use Opcode::*;
        match self {
            Variant::Turing => &[Hlf, Tpl, Inc, Jmp, Jie, Jio],
            Variant::Sound | Variant::Duet => &[Snd, Set, Add, Mul, Mod, Rcv, Jgz],
            Variant::Coprocessor => &[Set, Sub, Mul, Jnz],
        }
    }

    pub fn supports(self, op: Opcode) -> bool {
        self.opcodes().contains(&op)
    }

    pub fn name(self) -> &'static str {
        match self {
            Variant::Turing => "turing",
            Variant::Sound => "sound",
            Variant::Duet => "duet",
            Variant::Coprocessor => "coprocessor",
        }
    }

    /// Load-time validation of a program against this dialect.
    pub fn check(self, program: &Program) -> Result<(), MachineError> {
        for (index, instr) in program.iter().enumerate() {
            let opcode = instr.opcode();
            if !self.supports(opcode) {
                return Err(MachineError::Unsupported {
                    index,
                    opcode,
                    variant: self,
                });
            }
            if self == Variant::Duet {
                if let Instruction::Rcv { operand } = instr {
                    if operand.register().is_none() {
                        return Err(MachineError::ReceiveNeedsRegister { index });
                    }
                }
            }
        }
        Ok(())
    }
}

impl fmt::Display for Variant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::asm::assemble;

    #[test]
    fn test_check_accepts_dialect() {
        let program = assemble("set a 3\nsub a 1\nmul b a\njnz a -2").unwrap();
        assert!(Variant::Coprocessor.check(&program).is_ok());
    }

    #[test]
    fn test_check_rejects_foreign_opcode() {
        let program = assemble("inc a\nsnd a").unwrap();
        match Variant::Turing.check(&program) {
            Err(MachineError::Unsupported { index, opcode, variant }) => {
                assert_eq!(index, 1);
                assert_eq!(opcode, Opcode::Snd);
                assert_eq!(variant, Variant::Turing);
            }
            other => panic!("expected unsupported, got {:?}", other),
        }
    }

    #[test]
    fn test_duet_receive_needs_register() {
        let program = assemble("rcv 1").unwrap();
        assert!(Variant::Sound.check(&program).is_ok());
        assert!(matches!(
            Variant::Duet.check(&program),
            Err(MachineError::ReceiveNeedsRegister { index: 0 })
        ));
    }
}

//! Program listings.

use crate::machine::decode::Instruction;
use crate::machine::program::Program;

/// Disassemble a single instruction to text.
pub fn disassemble_instruction(instr: &Instruction) -> String {
    instr.to_string()
}

/// Render an indexed listing of a program.
///
/// Jumps with an immediate offset are annotated with their target index.
pub fn disassemble(program: &Program) -> String {
    let mut output = String::new();
    output.push_str("; Program listing\n");
    output.push_str("; ---------------\n\n");

    for (addr, instr) in program.iter().enumerate() {
        let line = disassemble_instruction(instr);
        match jump_target(addr as i64, instr) {
            Some(target) if program.contains(target) => {
                output.push_str(&format!("{:03}: {:<16} ; -> {:03}\n", addr, line, target));
            }
            Some(target) => {
                output.push_str(&format!("{:03}: {:<16} ; -> {} (exit)\n", addr, line, target));
            }
            None => output.push_str(&format!("{:03}: {}\n", addr, line)),
        }
    }

    output
}

/// Target of a jump whose offset is known before running.
pub fn jump_target(addr: i64, instr: &Instruction) -> Option<i64> {
    use crate::machine::decode::Operand;

    if !instr.opcode().is_jump() {
        return None;
    }
    let offset = match instr {
        Instruction::Jmp { offset }
        | Instruction::Jie { offset, .. }
        | Instruction::Jio { offset, .. }
        | Instruction::Jgz { offset, .. }
        | Instruction::Jnz { offset, .. } => offset,
        _ => return None,
    };
    match offset {
        Operand::Imm(k) => addr.checked_add(*k),
        Operand::Reg(_) => None,
    }
}

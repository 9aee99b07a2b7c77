//! Dispatch loop for the register machines.
//!
//! Implements the fetch-advance-execute cycle shared by every dialect.

use crate::machine::decode::{Instruction, Opcode, Operand};
use crate::machine::duet::Mailboxes;
use crate::machine::program::Program;
use crate::machine::registers::{Register, RegisterFile};
use crate::machine::snapshot::Snapshot;
use crate::machine::variant::Variant;
use log::{debug, info, trace, warn};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;

/// Machine execution state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MachineState {
    /// Machine is running normally.
    Running,
    /// Waiting on `rcv` with an empty inbox. Resumes once a message arrives.
    Blocked,
    /// The program counter left the program, or a sound was recovered.
    Halted,
    /// A runtime error stopped the machine.
    Faulted,
}

/// Outcome of a single [`Machine::step`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    /// The instruction ran.
    Executed(Instruction),
    /// The instruction is a receive with nothing to receive; it did not run.
    Blocked,
}

/// Mailbox slots of a linked duet machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Link {
    /// This machine's inbox.
    pub inbox: usize,
    /// The peer's inbox, where `snd` delivers.
    pub outbox: usize,
}

/// Result of executing an instruction body.
enum Flow {
    Continue,
    Block,
}

/// A register machine.
#[derive(Clone)]
pub struct Machine {
    program: Arc<Program>,
    variant: Variant,
    /// Register file.
    pub regs: RegisterFile,
    pc: i64,
    state: MachineState,
    cycles: u64,
    executed: [u64; Opcode::COUNT],
    last_sound: Option<i64>,
    recovered: Option<i64>,
    sent: u64,
    link: Option<Link>,
    last_instr: Option<Instruction>,
}

impl Machine {
    /// Create a machine for `program`, rejecting instructions the dialect
    /// does not have.
    pub fn new(program: Arc<Program>, variant: Variant) -> Result<Self, MachineError> {
        program.check(variant)?;

        let state = if program.is_empty() {
            MachineState::Halted
        } else {
            MachineState::Running
        };

        Ok(Self {
            program,
            variant,
            regs: RegisterFile::new(),
            pc: 0,
            state,
            cycles: 0,
            executed: [0; Opcode::COUNT],
            last_sound: None,
            recovered: None,
            sent: 0,
            link: None,
            last_instr: None,
        })
    }

    /// Attach this machine to a mailbox table.
    pub fn link(&mut self, link: Link) {
        self.link = Some(link);
    }

    /// Reset registers, counters and pc; keeps the program and link.
    pub fn reset(&mut self) {
        self.regs.clear();
        self.pc = 0;
        self.state = if self.program.is_empty() {
            MachineState::Halted
        } else {
            MachineState::Running
        };
        self.cycles = 0;
        self.executed = [0; Opcode::COUNT];
        self.last_sound = None;
        self.recovered = None;
        self.sent = 0;
        self.last_instr = None;
    }

    /// Execute a single instruction of an unlinked machine.
    pub fn step(&mut self) -> Result<Step, MachineError> {
        self.step_inner(None)
    }

    /// Execute a single instruction, with `snd`/`rcv` going through `mail`.
    pub fn step_linked(&mut self, mail: &mut Mailboxes) -> Result<Step, MachineError> {
        self.step_inner(Some(mail))
    }

    /// Run until the machine stops running.
    ///
    /// Returns the number of instructions executed.
    pub fn run(&mut self) -> Result<u64, MachineError> {
        let start_cycles = self.cycles;

        while self.state == MachineState::Running {
            self.step()?;
        }

        Ok(self.cycles - start_cycles)
    }

    /// Run for at most `max_cycles` instructions.
    pub fn run_limited(&mut self, max_cycles: u64) -> Result<u64, MachineError> {
        let start_cycles = self.cycles;
        let limit = self.cycles.saturating_add(max_cycles);

        while self.state == MachineState::Running && self.cycles < limit {
            self.step()?;
        }
        if self.state == MachineState::Running {
            warn!("cycle limit of {} reached at pc {}", max_cycles, self.pc);
        }

        Ok(self.cycles - start_cycles)
    }

    /// Run a linked machine until it halts or blocks.
    pub fn run_linked(&mut self, mail: &mut Mailboxes) -> Result<u64, MachineError> {
        self.run_linked_limited(mail, u64::MAX)
    }

    /// Run a linked machine for at most `max_cycles` instructions.
    pub fn run_linked_limited(
        &mut self,
        mail: &mut Mailboxes,
        max_cycles: u64,
    ) -> Result<u64, MachineError> {
        let start_cycles = self.cycles;
        let limit = self.cycles.saturating_add(max_cycles);

        while self.state == MachineState::Running && self.cycles < limit {
            self.step_linked(mail)?;
        }

        Ok(self.cycles - start_cycles)
    }

    /// Move a blocked machine back to `Running` if its inbox has a message.
    ///
    /// Returns true if the machine can run afterwards.
    pub fn resume_if_ready(&mut self, mail: &Mailboxes) -> bool {
        if self.state == MachineState::Blocked {
            if let Some(link) = self.link {
                if !mail.is_empty(link.inbox) {
                    debug!("machine {} resumed with {} queued", link.inbox, mail.len(link.inbox));
                    self.state = MachineState::Running;
                }
            }
        }
        self.state == MachineState::Running
    }

    /// True if the next instruction is a `rcv` that cannot complete.
    ///
    /// This only looks at the pending instruction; a machine spinning in a
    /// loop without receiving is never reported as blocked.
    pub fn is_receive_blocked(&self, mail: &Mailboxes) -> bool {
        let Some(link) = self.link else {
            return false;
        };
        matches!(self.program.get(self.pc), Some(Instruction::Rcv { .. }))
            && mail.is_empty(link.inbox)
    }

    fn step_inner(&mut self, mail: Option<&mut Mailboxes>) -> Result<Step, MachineError> {
        if self.state != MachineState::Running {
            return Err(MachineError::NotRunning(self.state));
        }

        // Fetch
        let at = self.pc;
        let instr = match self.program.get(at) {
            Some(instr) => *instr,
            None => {
                self.state = MachineState::Halted;
                return Err(MachineError::NotRunning(self.state));
            }
        };

        // Advance before executing; jumps adjust relative to this
        self.pc += 1;

        // Execute
        let flow = match self.execute(instr, at, mail) {
            Ok(flow) => flow,
            Err(e) => {
                self.pc = at;
                self.state = MachineState::Faulted;
                return Err(e);
            }
        };

        if let Flow::Block = flow {
            self.pc = at;
            self.state = MachineState::Blocked;
            debug!("[{}] blocked on {:03}: {}", self.variant, at, instr);
            return Ok(Step::Blocked);
        }

        trace!("[{}] {:03}: {:<12} {}", self.variant, at, instr.to_string(), self.regs);

        // Update state
        self.cycles += 1;
        self.executed[instr.opcode().index()] += 1;
        self.last_instr = Some(instr);

        if self.state == MachineState::Running && !self.program.contains(self.pc) {
            self.state = MachineState::Halted;
            info!("[{}] halted at pc={} after {} cycles", self.variant, self.pc, self.cycles);
        }

        Ok(Step::Executed(instr))
    }

    /// Execute a fetched instruction. `at` is its own index; `self.pc`
    /// already points at the next one.
    fn execute(
        &mut self,
        instr: Instruction,
        at: i64,
        mail: Option<&mut Mailboxes>,
    ) -> Result<Flow, MachineError> {
        let op = instr.opcode();

        match instr {
            // ==================== Turing lock ====================

            Instruction::Hlf { reg } => {
                let value = self.regs.get(reg);
                self.regs.set(reg, value / 2);
            }

            Instruction::Tpl { reg } => {
                let value = self.regs.get(reg).checked_mul(3);
                self.store(reg, value, op, at)?;
            }

            Instruction::Inc { reg } => {
                let value = self.regs.get(reg).checked_add(1);
                self.store(reg, value, op, at)?;
            }

            Instruction::Jmp { offset } => {
                self.jump(offset, op, at)?;
            }

            Instruction::Jie { reg, offset } => {
                if self.regs.get(reg) % 2 == 0 {
                    self.jump(offset, op, at)?;
                }
            }

            Instruction::Jio { reg, offset } => {
                if self.regs.get(reg) == 1 {
                    self.jump(offset, op, at)?;
                }
            }

            // ==================== Arithmetic ====================

            Instruction::Set { dst, src } => {
                let value = self.resolve(src);
                self.regs.set(dst, value);
            }

            Instruction::Add { dst, src } => {
                let value = self.regs.get(dst).checked_add(self.resolve(src));
                self.store(dst, value, op, at)?;
            }

            Instruction::Sub { dst, src } => {
                let value = self.regs.get(dst).checked_sub(self.resolve(src));
                self.store(dst, value, op, at)?;
            }

            Instruction::Mul { dst, src } => {
                let value = self.regs.get(dst).checked_mul(self.resolve(src));
                self.store(dst, value, op, at)?;
            }

            Instruction::Mod { dst, src } => {
                let divisor = self.resolve(src);
                if divisor == 0 {
                    return Err(MachineError::ModuloByZero { pc: at });
                }
                let value = floored_mod(self.regs.get(dst), divisor);
                self.store(dst, value, op, at)?;
            }

            // ==================== Communication ====================

            Instruction::Snd { value } => {
                let value = self.resolve(value);
                if self.variant == Variant::Duet {
                    let (link, mail) = self.linked(mail)?;
                    mail.push(link.outbox, value)?;
                    self.sent += 1;
                } else {
                    self.last_sound = Some(value);
                }
            }

            Instruction::Rcv { operand } => {
                if self.variant == Variant::Duet {
                    let reg = operand
                        .register()
                        .ok_or(MachineError::ReceiveNeedsRegister { index: at as usize })?;
                    let (link, mail) = self.linked(mail)?;
                    match mail.pop(link.inbox) {
                        Some(value) => self.regs.set(reg, value),
                        None => return Ok(Flow::Block),
                    }
                } else if self.resolve(operand) != 0 {
                    if let Some(sound) = self.last_sound {
                        self.recovered = Some(sound);
                        self.state = MachineState::Halted;
                        info!("[{}] recovered {} at pc={}", self.variant, sound, at);
                    }
                }
            }

            // ==================== Conditional jumps ====================

            Instruction::Jgz { cond, offset } => {
                if self.resolve(cond) > 0 {
                    self.jump(offset, op, at)?;
                }
            }

            Instruction::Jnz { cond, offset } => {
                if self.resolve(cond) != 0 {
                    self.jump(offset, op, at)?;
                }
            }
        }

        Ok(Flow::Continue)
    }

    /// Value of an operand: a register's contents or the immediate itself.
    #[inline]
    fn resolve(&self, operand: Operand) -> i64 {
        match operand {
            Operand::Reg(reg) => self.regs.get(reg),
            Operand::Imm(value) => value,
        }
    }

    fn store(
        &mut self,
        reg: Register,
        value: Option<i64>,
        opcode: Opcode,
        at: i64,
    ) -> Result<(), MachineError> {
        let value = value.ok_or(MachineError::Overflow { pc: at, opcode })?;
        self.regs.set(reg, value);
        Ok(())
    }

    /// Relative jump. The counter was already advanced past the jump, so
    /// the adjustment is `offset - 1` and the target is `at + offset`.
    fn jump(&mut self, offset: Operand, opcode: Opcode, at: i64) -> Result<(), MachineError> {
        let offset = self.resolve(offset);
        self.pc = offset
            .checked_sub(1)
            .and_then(|adjust| self.pc.checked_add(adjust))
            .ok_or(MachineError::Overflow { pc: at, opcode })?;
        Ok(())
    }

    fn linked<'m>(
        &self,
        mail: Option<&'m mut Mailboxes>,
    ) -> Result<(Link, &'m mut Mailboxes), MachineError> {
        match (self.link, mail) {
            (Some(link), Some(mail)) => Ok((link, mail)),
            _ => Err(MachineError::Unlinked),
        }
    }

    /// Capture the machine's mutable state.
    pub fn snapshot(&self) -> Snapshot {
        Snapshot {
            variant: self.variant,
            pc: self.pc,
            state: self.state,
            cycles: self.cycles,
            registers: self.regs.clone(),
            executed: Opcode::ALL
                .iter()
                .filter(|op| self.executed[op.index()] > 0)
                .map(|op| (*op, self.executed[op.index()]))
                .collect(),
            last_sound: self.last_sound,
            recovered: self.recovered,
            sent: self.sent,
        }
    }

    /// Rebuild a machine from a snapshot taken while running `program`.
    pub fn restore(program: Arc<Program>, snapshot: &Snapshot) -> Result<Self, MachineError> {
        let mut machine = Self::new(program, snapshot.variant)?;
        machine.regs = snapshot.registers.clone();
        machine.pc = snapshot.pc;
        machine.state = snapshot.state;
        machine.cycles = snapshot.cycles;
        for (op, count) in &snapshot.executed {
            machine.executed[op.index()] = *count;
        }
        machine.last_sound = snapshot.last_sound;
        machine.recovered = snapshot.recovered;
        machine.sent = snapshot.sent;

        if machine.state == MachineState::Running && !machine.program.contains(machine.pc) {
            machine.state = MachineState::Halted;
        }
        Ok(machine)
    }

    /// Register file, read-only. Presets go through the public `regs` field.
    pub fn registers(&self) -> &RegisterFile {
        &self.regs
    }

    pub fn program(&self) -> &Arc<Program> {
        &self.program
    }

    pub fn variant(&self) -> Variant {
        self.variant
    }

    /// Index of the next instruction to fetch.
    pub fn pc(&self) -> i64 {
        self.pc
    }

    pub fn state(&self) -> MachineState {
        self.state
    }

    /// Instructions executed so far.
    pub fn cycles(&self) -> u64 {
        self.cycles
    }

    /// How many times `op` has executed.
    pub fn executed(&self, op: Opcode) -> u64 {
        self.executed[op.index()]
    }

    /// Executions of `mul`, the coprocessor's answer.
    pub fn mul_count(&self) -> u64 {
        self.executed(Opcode::Mul)
    }

    /// The frequency captured by the first successful `rcv` of a sound machine.
    pub fn recovered(&self) -> Option<i64> {
        self.recovered
    }

    /// The most recent `snd` of a sound machine.
    pub fn last_sound(&self) -> Option<i64> {
        self.last_sound
    }

    /// Messages sent by a duet machine.
    pub fn sent(&self) -> u64 {
        self.sent
    }

    pub fn link_info(&self) -> Option<Link> {
        self.link
    }

    /// Get the last executed instruction.
    pub fn last_instruction(&self) -> Option<Instruction> {
        self.last_instr
    }

    pub fn is_halted(&self) -> bool {
        self.state == MachineState::Halted
    }

    pub fn is_running(&self) -> bool {
        self.state == MachineState::Running
    }

    pub fn is_blocked(&self) -> bool {
        self.state == MachineState::Blocked
    }
}

impl std::fmt::Debug for Machine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Machine")
            .field("variant", &self.variant)
            .field("state", &self.state)
            .field("pc", &self.pc)
            .field("cycles", &self.cycles)
            .field("regs", &self.regs)
            .finish()
    }
}

/// Remainder with the sign of the divisor.
fn floored_mod(value: i64, divisor: i64) -> Option<i64> {
    let r = value.checked_rem(divisor)?;
    if r != 0 && (r < 0) != (divisor < 0) {
        Some(r + divisor)
    } else {
        Some(r)
    }
}

/// Errors that can occur while loading or running a machine.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MachineError {
    #[error("machine not running: {0:?}")]
    NotRunning(MachineState),

    #[error("instruction {index}: {opcode} is not part of the {variant} instruction set")]
    Unsupported {
        index: usize,
        opcode: Opcode,
        variant: Variant,
    },

    #[error("instruction {index}: rcv needs a register to receive into")]
    ReceiveNeedsRegister { index: usize },

    #[error("arithmetic overflow in {opcode} at pc={pc}")]
    Overflow { pc: i64, opcode: Opcode },

    #[error("modulo by zero at pc={pc}")]
    ModuloByZero { pc: i64 },

    #[error("snd/rcv on a duet machine without a mailbox")]
    Unlinked,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::asm::assemble;

    fn machine(source: &str, variant: Variant) -> Machine {
        let program = assemble(source).unwrap();
        Machine::new(Arc::new(program), variant).unwrap()
    }

    fn reg(name: &str) -> Register {
        Register::new(name).unwrap()
    }

    #[test]
    fn test_turing_example() {
        let mut m = machine("inc a\njio a, +2\ntpl a\ninc a", Variant::Turing);
        let executed = m.run().unwrap();

        assert_eq!(m.regs.get(reg("a")), 2);
        assert_eq!(executed, 3);
        assert!(m.is_halted());
        assert_eq!(m.pc(), 4);
    }

    #[test]
    fn test_registers_accessor_sees_presets() {
        let mut m = machine("inc b", Variant::Turing);
        m.regs.set(reg("a"), 7);
        m.run().unwrap();

        let regs: Vec<(Register, i64)> = m.registers().iter().collect();
        assert_eq!(regs, vec![(reg("a"), 7), (reg("b"), 1)]);
    }

    #[test]
    fn test_empty_program_starts_halted() {
        let m = Machine::new(Arc::new(Program::default()), Variant::Turing).unwrap();
        assert!(m.is_halted());
    }

    #[test]
    fn test_step_when_halted() {
        let mut m = machine("inc a", Variant::Turing);
        m.run().unwrap();
        assert_eq!(m.step(), Err(MachineError::NotRunning(MachineState::Halted)));
    }

    #[test]
    fn test_jump_lands_relative_to_itself() {
        // jmp at index 1 with offset +2 lands on index 3
        let mut m = machine("inc a\njmp +2\ninc b\ninc c", Variant::Turing);
        m.step().unwrap();
        m.step().unwrap();
        assert_eq!(m.pc(), 3);

        // and backwards
        let mut m = machine("inc a\ninc b\njmp -2", Variant::Turing);
        m.step().unwrap();
        m.step().unwrap();
        m.step().unwrap();
        assert_eq!(m.pc(), 0);
    }

    #[test]
    fn test_jump_to_self() {
        let mut m = machine("jmp +0", Variant::Turing);
        assert_eq!(m.run_limited(100).unwrap(), 100);
        assert_eq!(m.pc(), 0);
        assert!(m.is_running());
    }

    #[test]
    fn test_jump_off_the_front_halts() {
        let mut m = machine("jmp -1", Variant::Turing);
        m.run().unwrap();
        assert!(m.is_halted());
        assert_eq!(m.pc(), -1);
    }

    #[test]
    fn test_hlf_truncates_toward_zero() {
        let mut m = machine("hlf a", Variant::Turing);
        m.regs.set(reg("a"), -1);
        m.run().unwrap();
        assert_eq!(m.regs.get(reg("a")), 0);

        let mut m = machine("hlf a", Variant::Turing);
        m.regs.set(reg("a"), -7);
        m.run().unwrap();
        assert_eq!(m.regs.get(reg("a")), -3);
    }

    #[test]
    fn test_jie_and_jio() {
        let mut m = machine("jie a, +2\ninc b\njio a, +2\ninc c", Variant::Turing);
        m.run().unwrap();
        // a = 0 is even, so inc b is skipped; a != 1, so inc c runs
        assert_eq!(m.regs.get(reg("b")), 0);
        assert_eq!(m.regs.get(reg("c")), 1);
    }

    #[test]
    fn test_sound_recovers() {
        let source = "set a 1\nadd a 2\nmul a a\nmod a 5\nsnd a\nset a 0\nrcv a\njgz a -1\nset a 1\njgz a -2";
        let mut m = machine(source, Variant::Sound);
        m.run().unwrap();

        assert_eq!(m.recovered(), Some(4));
        assert!(m.is_halted());
    }

    #[test]
    fn test_sound_rcv_without_sound_is_noop() {
        let mut m = machine("rcv 1\nset a 5", Variant::Sound);
        m.run().unwrap();
        assert_eq!(m.recovered(), None);
        assert_eq!(m.regs.get(reg("a")), 5);
    }

    #[test]
    fn test_coprocessor_counts_mul() {
        let source = "set b 3\nset c 0\nmul c b\nsub b 1\njnz b -2";
        let mut m = machine(source, Variant::Coprocessor);
        m.run().unwrap();

        assert_eq!(m.mul_count(), 3);
        assert_eq!(m.executed(Opcode::Jnz), 3);
        assert_eq!(m.regs.get(reg("b")), 0);
    }

    #[test]
    fn test_floored_mod() {
        assert_eq!(floored_mod(-7, 3), Some(2));
        assert_eq!(floored_mod(7, -3), Some(-2));
        assert_eq!(floored_mod(-7, -3), Some(-1));
        assert_eq!(floored_mod(9, 5), Some(4));
        assert_eq!(floored_mod(i64::MIN, -1), None);
    }

    #[test]
    fn test_modulo_by_zero_faults() {
        let mut m = machine("set a 3\nmod a b\nset c 1", Variant::Sound);
        assert_eq!(m.run(), Err(MachineError::ModuloByZero { pc: 1 }));
        assert_eq!(m.state(), MachineState::Faulted);
        assert_eq!(m.pc(), 1);
        assert_eq!(m.regs.get(reg("c")), 0);
    }

    #[test]
    fn test_overflow_faults() {
        let mut m = machine("set a 9223372036854775807\nadd a 1", Variant::Sound);
        assert_eq!(
            m.run(),
            Err(MachineError::Overflow { pc: 1, opcode: Opcode::Add })
        );
        assert_eq!(m.regs.get(reg("a")), i64::MAX);
    }

    #[test]
    fn test_unlinked_duet_machine() {
        let mut m = machine("snd 1", Variant::Duet);
        assert_eq!(m.run(), Err(MachineError::Unlinked));
    }

    #[test]
    fn test_reset() {
        let mut m = machine("inc a\ninc a", Variant::Turing);
        m.run().unwrap();
        m.reset();
        assert!(m.is_running());
        assert_eq!(m.pc(), 0);
        assert_eq!(m.cycles(), 0);
        assert_eq!(m.regs.get(reg("a")), 0);
    }

    #[test]
    fn test_snapshot_restore() {
        let mut m = machine("inc a\ntpl a\ninc b\ntpl a", Variant::Turing);
        m.step().unwrap();
        m.step().unwrap();

        let snapshot = m.snapshot();
        let mut restored = Machine::restore(m.program().clone(), &snapshot).unwrap();
        assert_eq!(restored.pc(), 2);
        assert_eq!(restored.regs.get(reg("a")), 3);

        restored.run().unwrap();
        m.run().unwrap();
        assert_eq!(restored.regs, m.regs);
        assert_eq!(restored.cycles(), m.cycles());
        assert_eq!(restored.executed(Opcode::Tpl), 2);
    }
}

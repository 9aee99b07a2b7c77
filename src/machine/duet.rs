//! Two cooperating duet machines.
//!
//! The driver owns both machines and the mailbox table. Machines only know
//! their own slot and their peer's slot in the table, never the peer itself.
//! Scheduling is cooperative: one machine runs until it halts or blocks on
//! an empty `rcv` (a half-turn), then the other gets a turn.

use crate::machine::execute::{Link, Machine, MachineError, MachineState, Step};
use crate::machine::program::Program;
use crate::machine::registers::Register;
use crate::machine::variant::Variant;
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::Arc;

/// Register preloaded with each machine's id.
pub const ID_REGISTER: Register = Register::letter(b'p');

/// One FIFO queue per machine.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Mailboxes {
    queues: Vec<VecDeque<i64>>,
}

impl Mailboxes {
    /// Create `count` empty queues.
    pub fn new(count: usize) -> Self {
        Self {
            queues: vec![VecDeque::new(); count],
        }
    }

    /// Append a message to `slot`.
    pub fn push(&mut self, slot: usize, value: i64) -> Result<(), MachineError> {
        let queue = self.queues.get_mut(slot).ok_or(MachineError::Unlinked)?;
        queue.push_back(value);
        Ok(())
    }

    /// Take the oldest message from `slot`.
    pub fn pop(&mut self, slot: usize) -> Option<i64> {
        self.queues.get_mut(slot).and_then(|q| q.pop_front())
    }

    /// True if `slot` holds no messages. Unknown slots are empty.
    pub fn is_empty(&self, slot: usize) -> bool {
        self.len(slot) == 0
    }

    /// Messages waiting in `slot`.
    pub fn len(&self, slot: usize) -> usize {
        self.queues.get(slot).map_or(0, |q| q.len())
    }

    pub fn queue(&self, slot: usize) -> Option<&VecDeque<i64>> {
        self.queues.get(slot)
    }

    /// Number of slots.
    pub fn slots(&self) -> usize {
        self.queues.len()
    }
}

/// How a duet run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DuetOutcome {
    /// Both machines wait on `rcv` with empty inboxes.
    Deadlock,
    /// Neither machine can continue, and at least one has halted.
    Finished,
}

/// The two-machine duet system.
#[derive(Debug, Clone)]
pub struct Duet {
    machines: [Machine; 2],
    mail: Mailboxes,
    turn: usize,
    half_turns: u64,
}

impl Duet {
    /// Build both machines from one program, with `p` set to 0 and 1.
    pub fn new(program: Arc<Program>) -> Result<Self, MachineError> {
        let build = |id: usize| -> Result<Machine, MachineError> {
            let mut machine = Machine::new(Arc::clone(&program), Variant::Duet)?;
            machine.regs.set(ID_REGISTER, id as i64);
            machine.link(Link {
                inbox: id,
                outbox: 1 - id,
            });
            Ok(machine)
        };
        let machines = [build(0)?, build(1)?];

        Ok(Self {
            machines,
            mail: Mailboxes::new(2),
            turn: 0,
            half_turns: 0,
        })
    }

    /// Alternate half-turns until neither machine can continue.
    pub fn run(&mut self) -> Result<DuetOutcome, MachineError> {
        loop {
            if let Some(outcome) = self.outcome() {
                self.report(outcome);
                return Ok(outcome);
            }
            self.half_turn(u64::MAX)?;
        }
    }

    /// Like [`Duet::run`], but stop after `max_cycles` instructions in total.
    ///
    /// Returns `None` if the limit was reached first.
    pub fn run_limited(&mut self, max_cycles: u64) -> Result<Option<DuetOutcome>, MachineError> {
        let mut remaining = max_cycles;
        loop {
            if let Some(outcome) = self.outcome() {
                self.report(outcome);
                return Ok(Some(outcome));
            }
            if remaining == 0 {
                warn!("cycle limit of {} reached after {} half-turns", max_cycles, self.half_turns);
                return Ok(None);
            }
            let ran = self.half_turn(remaining)?;
            remaining -= ran;
        }
    }

    /// Execute one instruction of the machine whose turn it is.
    ///
    /// Returns `None` once the duet has ended. The turn passes to the peer
    /// when the current machine stops running.
    pub fn step(&mut self) -> Result<Option<Step>, MachineError> {
        if self.outcome().is_some() {
            return Ok(None);
        }

        let id = self.turn;
        let Self { machines, mail, .. } = self;
        let machine = &mut machines[id];
        let step = if machine.resume_if_ready(mail) {
            machine.step_linked(mail)?
        } else {
            Step::Blocked
        };

        if !machine.is_running() {
            self.pass_turn();
        }
        Ok(Some(step))
    }

    /// Let the current machine run until it stops, then pass the turn.
    fn half_turn(&mut self, max_cycles: u64) -> Result<u64, MachineError> {
        let id = self.turn;
        let Self { machines, mail, .. } = self;
        let machine = &mut machines[id];

        let ran = if machine.resume_if_ready(mail) {
            machine.run_linked_limited(mail, max_cycles)?
        } else {
            0
        };
        debug!(
            "machine {} ran {} instructions, now {:?}, sent {}",
            id,
            ran,
            machine.state(),
            machine.sent()
        );

        if !machine.is_running() {
            self.pass_turn();
        }
        Ok(ran)
    }

    fn pass_turn(&mut self) {
        self.turn = 1 - self.turn;
        self.half_turns += 1;
    }

    /// The terminal condition, if it holds.
    ///
    /// Deadlock is decided from each machine's next pending instruction only.
    pub fn outcome(&self) -> Option<DuetOutcome> {
        let blocked = |m: &Machine| m.is_receive_blocked(&self.mail);
        let stopped = |m: &Machine| {
            matches!(m.state(), MachineState::Halted | MachineState::Faulted)
        };

        if self.machines.iter().all(blocked) {
            Some(DuetOutcome::Deadlock)
        } else if self.machines.iter().all(|m| blocked(m) || stopped(m)) {
            Some(DuetOutcome::Finished)
        } else {
            None
        }
    }

    pub fn is_deadlocked(&self) -> bool {
        self.outcome() == Some(DuetOutcome::Deadlock)
    }

    fn report(&self, outcome: DuetOutcome) {
        info!(
            "duet ended in {:?} after {} half-turns; sent {} / {}",
            outcome,
            self.half_turns,
            self.machines[0].sent(),
            self.machines[1].sent()
        );
    }

    /// Messages sent by program 1.
    pub fn answer(&self) -> u64 {
        self.machines[1].sent()
    }

    pub fn machine(&self, id: usize) -> Option<&Machine> {
        self.machines.get(id)
    }

    pub fn machine_mut(&mut self, id: usize) -> Option<&mut Machine> {
        self.machines.get_mut(id)
    }

    pub fn machines(&self) -> &[Machine; 2] {
        &self.machines
    }

    pub fn mailboxes(&self) -> &Mailboxes {
        &self.mail
    }

    /// Id of the machine that runs next.
    pub fn turn(&self) -> usize {
        self.turn
    }

    pub fn half_turns(&self) -> u64 {
        self.half_turns
    }

    /// Preload a register in both machines.
    pub fn preset(&mut self, reg: Register, value: i64) {
        for machine in &mut self.machines {
            machine.regs.set(reg, value);
        }
    }
}

//! Debugger application state and logic.

use crate::asm::disasm::disassemble_instruction;
use crate::machine::{Duet, Machine, MachineError, Program, Register, Step, Variant};
use std::collections::HashSet;
use std::sync::Arc;

/// What is being debugged.
pub enum Target {
    Single(Machine),
    Pair(Duet),
}

/// Debugger application state.
pub struct DebuggerApp {
    /// The machine (or duet pair) being debugged.
    pub target: Target,
    /// Original program for reference.
    pub program: Arc<Program>,
    pub variant: Variant,
    /// Registers preloaded before every (re)start.
    pub presets: Vec<(Register, i64)>,
    /// Breakpoints (by instruction index).
    pub breakpoints: HashSet<i64>,
    /// Is the debugger running continuously?
    pub running: bool,
    /// Should we quit?
    pub should_quit: bool,
    /// Status message to display.
    pub status: String,
}

impl DebuggerApp {
    /// Create a new debugger with a loaded program.
    pub fn new(
        program: Arc<Program>,
        variant: Variant,
        presets: Vec<(Register, i64)>,
    ) -> Result<Self, MachineError> {
        let target = build_target(&program, variant, &presets)?;

        Ok(Self {
            target,
            program,
            variant,
            presets,
            breakpoints: HashSet::new(),
            running: false,
            should_quit: false,
            status: "Ready. Press 's' to step, 'r' to run, 'q' to quit.".into(),
        })
    }

    /// The machine whose pc the listing follows.
    pub fn current(&self) -> &Machine {
        match &self.target {
            Target::Single(machine) => machine,
            Target::Pair(duet) => &duet.machines()[duet.turn()],
        }
    }

    /// Every machine, in id order.
    pub fn machines(&self) -> Vec<&Machine> {
        match &self.target {
            Target::Single(machine) => vec![machine],
            Target::Pair(duet) => duet.machines().iter().collect(),
        }
    }

    /// True once nothing more can execute.
    pub fn finished(&self) -> bool {
        match &self.target {
            Target::Single(machine) => !machine.is_running(),
            Target::Pair(duet) => duet.outcome().is_some(),
        }
    }

    /// Step one instruction.
    pub fn step(&mut self) {
        if self.finished() {
            self.status = self.summary();
            self.running = false;
            return;
        }

        let pc = self.current().pc();
        let result = match &mut self.target {
            Target::Single(machine) => machine.step().map(Some),
            Target::Pair(duet) => duet.step(),
        };

        match result {
            Ok(Some(Step::Executed(instr))) => {
                self.status = format!("PC={:03}: {}", pc, disassemble_instruction(&instr));
            }
            Ok(Some(Step::Blocked)) => {
                self.status = format!("PC={:03}: blocked on receive", pc);
            }
            Ok(None) => {
                self.status = self.summary();
                self.running = false;
            }
            Err(e) => {
                self.status = format!("Error: {}", e);
                self.running = false;
            }
        }
    }

    /// Run until halt, breakpoint, or error.
    pub fn run(&mut self) {
        self.running = true;
        self.status = "Running...".into();
    }

    /// Run one iteration of continuous execution.
    pub fn tick(&mut self) {
        if !self.running {
            return;
        }

        if self.finished() {
            self.running = false;
            self.status = self.summary();
            return;
        }

        // Check for breakpoint
        let pc = self.current().pc();
        if self.breakpoints.contains(&pc) && self.current().is_running() {
            self.running = false;
            self.status = format!("Breakpoint at PC={}", pc);
            return;
        }

        self.step();
    }

    /// Toggle breakpoint at the current PC.
    pub fn toggle_breakpoint(&mut self) {
        let pc = self.current().pc();
        if self.breakpoints.contains(&pc) {
            self.breakpoints.remove(&pc);
            self.status = format!("Removed breakpoint at PC={}", pc);
        } else {
            self.breakpoints.insert(pc);
            self.status = format!("Set breakpoint at PC={}", pc);
        }
    }

    /// Reset to the initial state.
    pub fn reset(&mut self) {
        match build_target(&self.program, self.variant, &self.presets) {
            Ok(target) => {
                self.target = target;
                self.status = "Reset. Ready.".into();
            }
            Err(e) => self.status = format!("Error: {}", e),
        }
        self.running = false;
    }

    /// The variant's answer so far.
    pub fn summary(&self) -> String {
        match &self.target {
            Target::Single(machine) => match self.variant {
                Variant::Sound => format!(
                    "{:?}; recovered {}",
                    machine.state(),
                    machine.recovered().map_or("nothing".to_string(), |v| v.to_string())
                ),
                Variant::Coprocessor => {
                    format!("{:?}; mul executed {} times", machine.state(), machine.mul_count())
                }
                _ => format!("{:?} after {} cycles", machine.state(), machine.cycles()),
            },
            Target::Pair(duet) => match duet.outcome() {
                Some(outcome) => format!("{:?}; program 1 sent {}", outcome, duet.answer()),
                None => format!("Running; program 1 sent {}", duet.answer()),
            },
        }
    }

    /// Get the listing around the current PC.
    pub fn get_disassembly(&self, lines: usize) -> Vec<(i64, String, bool)> {
        let pc = self.current().pc();
        let start = pc.saturating_sub(lines as i64 / 2).max(0);

        (0..lines as i64)
            .filter_map(|i| {
                let addr = start.checked_add(i)?;
                self.program.get(addr).map(|instr| {
                    (addr, disassemble_instruction(instr), addr == pc)
                })
            })
            .collect()
    }
}

fn build_target(
    program: &Arc<Program>,
    variant: Variant,
    presets: &[(Register, i64)],
) -> Result<Target, MachineError> {
    if variant == Variant::Duet {
        let mut duet = Duet::new(Arc::clone(program))?;
        for (reg, value) in presets {
            duet.preset(*reg, *value);
        }
        Ok(Target::Pair(duet))
    } else {
        let mut machine = Machine::new(Arc::clone(program), variant)?;
        for (reg, value) in presets {
            machine.regs.set(*reg, *value);
        }
        Ok(Target::Single(machine))
    }
}

/// Run the debugger with a program.
pub fn run_debugger(
    program: Arc<Program>,
    variant: Variant,
    presets: Vec<(Register, i64)>,
) -> std::io::Result<()> {
    use crossterm::{
        event::{self, Event, KeyCode, KeyEventKind},
        terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
        ExecutableCommand,
    };
    use ratatui::prelude::*;
    use std::io::stdout;
    use std::time::Duration;

    let mut app = DebuggerApp::new(program, variant, presets)
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidInput, e))?;

    // Setup terminal
    enable_raw_mode()?;
    stdout().execute(EnterAlternateScreen)?;
    let mut terminal = Terminal::new(CrosstermBackend::new(stdout()))?;

    // Main loop
    loop {
        terminal.draw(|frame| {
            super::ui::draw(frame, &app);
        })?;

        if event::poll(Duration::from_millis(50))? {
            if let Event::Key(key) = event::read()? {
                if key.kind == KeyEventKind::Press {
                    match key.code {
                        KeyCode::Char('q') => app.should_quit = true,
                        KeyCode::Char('s') => {
                            app.running = false;
                            app.step();
                        }
                        KeyCode::Char('r') => app.run(),
                        KeyCode::Char('p') => {
                            app.running = false;
                            app.status = "Paused.".into();
                        }
                        KeyCode::Char('b') => app.toggle_breakpoint(),
                        KeyCode::Char('x') => app.reset(),
                        _ => {}
                    }
                }
            }
        }

        // Tick for continuous running
        if app.running {
            for _ in 0..64 {
                app.tick();
                if !app.running {
                    break;
                }
            }
        }

        if app.should_quit {
            break;
        }
    }

    // Restore terminal
    disable_raw_mode()?;
    stdout().execute(LeaveAlternateScreen)?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::asm::assemble;

    fn app(source: &str, variant: Variant) -> DebuggerApp {
        DebuggerApp::new(Arc::new(assemble(source).unwrap()), variant, Vec::new()).unwrap()
    }

    #[test]
    fn test_step_updates_status() {
        let mut app = app("inc a\njio a, +2\ntpl a\ninc a", Variant::Turing);
        app.step();
        assert!(app.status.contains("inc a"));
        assert_eq!(app.current().pc(), 1);
    }

    #[test]
    fn test_breakpoint_stops_run() {
        let mut app = app("inc a\ninc a\ninc a", Variant::Turing);
        app.breakpoints.insert(2);
        app.run();
        for _ in 0..10 {
            app.tick();
        }
        assert!(!app.running);
        assert_eq!(app.current().pc(), 2);
    }

    #[test]
    fn test_duet_runs_to_deadlock() {
        let mut app = app("snd 1\nsnd 2\nsnd p\nrcv a\nrcv b\nrcv c\nrcv d", Variant::Duet);
        app.run();
        for _ in 0..100 {
            app.tick();
        }
        assert!(app.finished());
        assert!(app.status.contains("Deadlock"));
        assert!(app.status.contains("sent 3"));
    }

    #[test]
    fn test_listing_after_far_jump_off_front() {
        let mut app = app("jmp -9223372036854775807\ninc a", Variant::Turing);
        app.step();
        assert_eq!(app.current().pc(), -9223372036854775807);
        assert!(app.finished());
        let listing = app.get_disassembly(30);
        assert_eq!(listing.len(), 2);
        assert!(listing.iter().all(|(_, _, is_current)| !is_current));
    }

    #[test]
    fn test_listing_centres_on_pc() {
        let mut app = app("inc a\ninc a\ninc a\ninc a\ninc a\ninc a", Variant::Turing);
        for _ in 0..4 {
            app.step();
        }
        let listing = app.get_disassembly(4);
        let addrs: Vec<i64> = listing.iter().map(|(addr, _, _)| *addr).collect();
        assert_eq!(addrs, vec![2, 3, 4, 5]);
        assert!(listing[2].2);
    }

    #[test]
    fn test_reset_restores_presets() {
        let a = Register::new("a").unwrap();
        let program = Arc::new(assemble("inc a").unwrap());
        let mut app = DebuggerApp::new(program, Variant::Turing, vec![(a, 5)]).unwrap();
        app.step();
        assert_eq!(app.current().regs.get(a), 6);
        app.reset();
        assert_eq!(app.current().regs.get(a), 5);
    }
}

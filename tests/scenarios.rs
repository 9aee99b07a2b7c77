//! End-to-end runs of the reference programs through the public API.

use regvm::{
    assemble, Duet, DuetOutcome, Machine, MachineError, MachineState, Register, Variant,
};
use std::sync::Arc;

fn reg(name: &str) -> Register {
    name.parse().unwrap()
}

fn machine(source: &str, variant: Variant) -> Machine {
    let _ = env_logger::builder().is_test(true).try_init();
    Machine::new(Arc::new(assemble(source).unwrap()), variant).unwrap()
}

const SOUND_EXAMPLE: &str = "set a 1
add a 2
mul a a
mod a 5
snd a
set a 0
rcv a
jgz a -1
set a 1
jgz a -2";

#[test]
fn test_turing_example() {
    let mut m = machine("inc a\njio a, +2\ntpl a\ninc a", Variant::Turing);
    m.run().unwrap();

    assert_eq!(m.state(), MachineState::Halted);
    assert_eq!(m.regs.get(reg("a")), 2);
    assert_eq!(m.regs.get(reg("b")), 0);
    assert_eq!(m.pc(), 4);
}

#[test]
fn test_turing_preset_register() {
    // Collatz-style loop from the lock puzzle, started with a = 1.
    let source = "jio a, +8
inc b
jie a, +4
tpl a
inc a
jmp +2
hlf a
jmp -7";
    let mut m = machine(source, Variant::Turing);
    m.regs.set(reg("a"), 3);
    m.run().unwrap();

    // 3 -> 10 -> 5 -> 16 -> 8 -> 4 -> 2 -> 1
    assert_eq!(m.regs.get(reg("b")), 7);
    assert_eq!(m.regs.get(reg("a")), 1);
}

#[test]
fn test_sound_example_recovers_four() {
    let mut m = machine(SOUND_EXAMPLE, Variant::Sound);
    m.run().unwrap();

    assert_eq!(m.recovered(), Some(4));
    assert_eq!(m.last_sound(), Some(4));
    assert!(m.is_halted());
}

#[test]
fn test_duet_example_deadlocks() {
    let program = Arc::new(assemble("snd 1\nsnd 2\nsnd p\nrcv a\nrcv b\nrcv c\nrcv d").unwrap());
    let mut duet = Duet::new(program).unwrap();

    assert_eq!(duet.run().unwrap(), DuetOutcome::Deadlock);
    assert_eq!(duet.answer(), 3);

    // Each program received its peer's three values, then blocked on `rcv d`.
    let p0 = duet.machine(0).unwrap();
    let p1 = duet.machine(1).unwrap();
    assert_eq!(p0.regs.get(reg("c")), 1);
    assert_eq!(p1.regs.get(reg("c")), 0);
    assert_eq!(p0.pc(), 6);
    assert_eq!(p1.pc(), 6);
}

#[test]
fn test_duet_sound_program_runs_as_pair() {
    // The sound example loops forever under duet rules; a bound stops it.
    let program = Arc::new(assemble(SOUND_EXAMPLE).unwrap());
    let mut duet = Duet::new(program).unwrap();
    let outcome = duet.run_limited(10_000).unwrap();

    assert_eq!(outcome, Some(DuetOutcome::Deadlock));
    assert_eq!(duet.answer(), 1);
}

#[test]
fn test_coprocessor_counts_mul() {
    let source = "set b 5
set c 0
mul c b
sub b 1
jnz b -2";
    let mut m = machine(source, Variant::Coprocessor);
    m.run().unwrap();

    assert_eq!(m.mul_count(), 5);
    assert_eq!(m.regs.get(reg("b")), 0);
}

#[test]
fn test_unsupported_rejected_before_running() {
    let program = Arc::new(assemble("inc a\nsnd a").unwrap());
    let err = Machine::new(program, Variant::Turing).unwrap_err();

    assert!(matches!(err, MachineError::Unsupported { index: 1, .. }));
}

#[test]
fn test_duet_rcv_of_immediate_rejected() {
    let program = Arc::new(assemble("rcv 1").unwrap());
    assert!(matches!(
        Duet::new(program),
        Err(MachineError::ReceiveNeedsRegister { index: 0 })
    ));
}

#[test]
fn test_overflow_faults_machine() {
    let mut m = machine("set a 9223372036854775807\nadd a 1", Variant::Sound);
    let err = m.run().unwrap_err();

    assert!(matches!(err, MachineError::Overflow { pc: 1, .. }));
    assert_eq!(m.state(), MachineState::Faulted);
    assert_eq!(m.regs.get(reg("a")), i64::MAX);
}

#[test]
fn test_snapshot_file_roundtrip() {
    let program = Arc::new(assemble(SOUND_EXAMPLE).unwrap());
    let mut m = Machine::new(Arc::clone(&program), Variant::Sound).unwrap();
    m.run_limited(6).unwrap();

    let path = std::env::temp_dir().join(format!("regvm-scenario-{}.json", std::process::id()));
    regvm::machine::save_snapshot(&path, &m.snapshot()).unwrap();
    let loaded = regvm::machine::load_snapshot(&path).unwrap();
    let _ = std::fs::remove_file(&path);

    let mut resumed = Machine::restore(program, &loaded).unwrap();
    resumed.run().unwrap();
    m.run().unwrap();

    assert_eq!(resumed.recovered(), Some(4));
    assert_eq!(resumed.cycles(), m.cycles());
    assert_eq!(resumed.snapshot(), m.snapshot());
}

#[test]
fn test_disassembly_reassembles() {
    let program = assemble(SOUND_EXAMPLE).unwrap();
    let text = program.to_string();
    assert_eq!(assemble(&text).unwrap(), program);
}

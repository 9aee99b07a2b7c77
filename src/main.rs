//! regvm - CLI Entry Point
//!
//! Commands:
//! - `regvm run <program> --variant V` - Run a program to completion
//! - `regvm check <program> --variant V` - Validate a program for a variant
//! - `regvm disasm <program>` - Print an annotated listing
//! - `regvm debug <program> --variant V` - Interactive debugger
//! - `regvm selftest` - Run the built-in example scenarios

use clap::{Parser, Subcommand};
use regvm::{Program, Register, Variant};
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "regvm")]
#[command(version = "0.1.0")]
#[command(about = "An interpreter for the puzzle register machines")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a program until it halts
    Run {
        /// Path to the program text
        program: String,
        /// Machine variant to run the program on
        #[arg(short, long, value_enum, default_value_t = Variant::Turing)]
        variant: Variant,
        /// Preset a register before running, as `name=value` (repeatable)
        #[arg(short, long = "set", value_parser = parse_preset)]
        set: Vec<(Register, i64)>,
        /// Maximum number of instructions to run
        #[arg(short, long, default_value = "100000000")]
        max_cycles: u64,
        /// Log every executed instruction (trace level, this crate only)
        #[arg(short, long)]
        trace: bool,
        /// Write the final machine state as JSON
        #[arg(short, long)]
        dump: Option<String>,
    },
    /// Check that a program only uses the variant's instructions
    Check {
        /// Path to the program text
        program: String,
        #[arg(short, long, value_enum, default_value_t = Variant::Turing)]
        variant: Variant,
    },
    /// Print an annotated listing
    Disasm {
        /// Path to the program text
        program: String,
    },
    /// Interactive debugger
    Debug {
        /// Path to the program text
        program: String,
        #[arg(short, long, value_enum, default_value_t = Variant::Turing)]
        variant: Variant,
        /// Preset a register before running, as `name=value` (repeatable)
        #[arg(short, long = "set", value_parser = parse_preset)]
        set: Vec<(Register, i64)>,
    },
    /// Run the built-in self-test
    Selftest,
}

fn main() {
    let cli = Cli::parse();

    let trace = matches!(cli.command, Some(Commands::Run { trace: true, .. }));
    init_logger(trace);

    match cli.command {
        Some(Commands::Run { program, variant, set, max_cycles, dump, .. }) => {
            run_program(&program, variant, &set, max_cycles, dump.as_deref());
        }
        Some(Commands::Check { program, variant }) => {
            check_program(&program, variant);
        }
        Some(Commands::Disasm { program }) => {
            disassemble_file(&program);
        }
        Some(Commands::Debug { program, variant, set }) => {
            debug_program(&program, variant, set);
        }
        Some(Commands::Selftest) => {
            run_self_test();
        }
        None => {
            println!("regvm v0.1.0");
            println!("Register machine interpreter: turing, sound, duet, coprocessor");
            println!();
            println!("Use --help for available commands");
        }
    }
}

/// `RUST_LOG` sets the filter; `--trace` adds per-instruction logging for this crate.
fn init_logger(trace: bool) {
    let _ = log_builder(trace).try_init();
}

fn log_builder(trace: bool) -> env_logger::Builder {
    let mut builder =
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn"));
    if trace {
        builder.filter_module("regvm", log::LevelFilter::Trace);
    }
    builder
}

fn parse_preset(s: &str) -> Result<(Register, i64), String> {
    let (name, value) = s
        .split_once('=')
        .ok_or_else(|| format!("expected name=value, got `{}`", s))?;
    let reg = name.trim().parse::<Register>().map_err(|e| e.to_string())?;
    let value = value
        .trim()
        .parse::<i64>()
        .map_err(|e| format!("bad value `{}`: {}", value, e))?;
    Ok((reg, value))
}

fn load_program(path: &str) -> Program {
    let source = match std::fs::read_to_string(path) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("❌ Failed to read file: {}", e);
            std::process::exit(1);
        }
    };

    match regvm::assemble(&source) {
        Ok(program) => {
            println!("📝 Loaded {} instructions", program.len());
            program
        }
        Err(e) => {
            eprintln!("❌ Assembly error: {}", e);
            std::process::exit(1);
        }
    }
}

fn run_program(
    path: &str,
    variant: Variant,
    presets: &[(Register, i64)],
    max_cycles: u64,
    dump: Option<&str>,
) {
    println!("🔧 Running: {} ({})", path, variant);
    let program = Arc::new(load_program(path));

    if variant == Variant::Duet {
        run_duet(program, presets, max_cycles, dump);
    } else {
        run_single(program, variant, presets, max_cycles, dump);
    }
}

fn run_single(
    program: Arc<Program>,
    variant: Variant,
    presets: &[(Register, i64)],
    max_cycles: u64,
    dump: Option<&str>,
) {
    use regvm::machine::Step;
    use regvm::Machine;

    let mut machine = match Machine::new(program, variant) {
        Ok(m) => m,
        Err(e) => {
            eprintln!("❌ Failed to load program: {}", e);
            std::process::exit(1);
        }
    };
    for (reg, value) in presets {
        machine.regs.set(*reg, *value);
    }

    println!();
    println!("━━━ Execution ━━━");

    while machine.is_running() && machine.cycles() < max_cycles {
        let pc = machine.pc();
        match machine.step() {
            Ok(Step::Executed(_)) => {}
            Ok(Step::Blocked) => break,
            Err(e) => {
                eprintln!("❌ Machine error at PC={}: {}", pc, e);
                dump_single(&machine, dump);
                std::process::exit(1);
            }
        }
    }

    println!();
    println!("━━━ Result ━━━");
    println!("Cycles: {}", machine.cycles());
    println!("State: {:?}", machine.state());
    println!("PC: {}", machine.pc());
    println!("Registers: {}", machine.registers());
    match variant {
        Variant::Sound => println!(
            "Recovered: {}",
            machine.recovered().map_or("nothing".to_string(), |v| v.to_string())
        ),
        Variant::Coprocessor => println!("mul executed: {}", machine.mul_count()),
        _ => {}
    }

    if machine.is_running() {
        println!();
        println!("⚠️  Reached max cycles limit ({}). Use --max-cycles to increase.", max_cycles);
    }

    dump_single(&machine, dump);
}

fn run_duet(program: Arc<Program>, presets: &[(Register, i64)], max_cycles: u64, dump: Option<&str>) {
    use regvm::Duet;

    let mut duet = match Duet::new(program) {
        Ok(d) => d,
        Err(e) => {
            eprintln!("❌ Failed to load program: {}", e);
            std::process::exit(1);
        }
    };
    for (reg, value) in presets {
        duet.preset(*reg, *value);
    }

    println!();
    println!("━━━ Execution ━━━");

    let outcome = match duet.run_limited(max_cycles) {
        Ok(outcome) => outcome,
        Err(e) => {
            eprintln!("❌ Machine error: {}", e);
            dump_duet(&duet, dump);
            std::process::exit(1);
        }
    };

    println!();
    println!("━━━ Result ━━━");
    println!("Half-turns: {}", duet.half_turns());
    for (id, machine) in duet.machines().iter().enumerate() {
        println!(
            "Program {}: {:?} at PC={} after {} cycles, sent {}",
            id,
            machine.state(),
            machine.pc(),
            machine.cycles(),
            machine.sent()
        );
        println!("  {}", machine.regs);
    }
    match outcome {
        Some(outcome) => {
            println!("Outcome: {:?}", outcome);
            println!("Program 1 sent: {}", duet.answer());
        }
        None => {
            println!();
            println!("⚠️  Reached max cycles limit ({}). Use --max-cycles to increase.", max_cycles);
        }
    }

    dump_duet(&duet, dump);
}

fn dump_single(machine: &regvm::Machine, dump: Option<&str>) {
    let Some(path) = dump else {
        return;
    };
    match regvm::machine::save_snapshot(path, &machine.snapshot()) {
        Ok(()) => println!("✓ Saved state to {}", path),
        Err(e) => {
            eprintln!("❌ Failed to save snapshot: {}", e);
            std::process::exit(1);
        }
    }
}

fn dump_duet(duet: &regvm::Duet, dump: Option<&str>) {
    let Some(path) = dump else {
        return;
    };
    let snapshots: Vec<regvm::Snapshot> = duet.machines().iter().map(|m| m.snapshot()).collect();
    match regvm::machine::save_snapshots(path, &snapshots) {
        Ok(()) => println!("✓ Saved state to {}", path),
        Err(e) => {
            eprintln!("❌ Failed to save snapshot: {}", e);
            std::process::exit(1);
        }
    }
}

fn check_program(path: &str, variant: Variant) {
    println!("🔍 Checking: {} ({})", path, variant);
    let program = load_program(path);

    if let Err(e) = program.check(variant) {
        eprintln!("❌ {}", e);
        std::process::exit(1);
    }
    println!("✓ Program is valid for {}", variant);
}

fn disassemble_file(path: &str) {
    println!("📖 Disassembling: {}", path);
    println!();

    let program = load_program(path);
    println!();
    print!("{}", regvm::disassemble(&program));
}

#[cfg(feature = "tui")]
fn debug_program(path: &str, variant: Variant, presets: Vec<(Register, i64)>) {
    println!("🔍 Loading: {}", path);
    let program = Arc::new(load_program(path));

    println!("🚀 Launching debugger...");
    println!();

    if let Err(e) = regvm::run_debugger(program, variant, presets) {
        eprintln!("❌ Debugger error: {}", e);
        std::process::exit(1);
    }
}

#[cfg(not(feature = "tui"))]
fn debug_program(_path: &str, _variant: Variant, _presets: Vec<(Register, i64)>) {
    eprintln!("❌ Built without the `tui` feature");
    std::process::exit(1);
}

const TURING_EXAMPLE: &str = "inc a\njio a, +2\ntpl a\ninc a";

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

const DUET_EXAMPLE: &str = "snd 1\nsnd 2\nsnd p\nrcv a\nrcv b\nrcv c\nrcv d";

fn run_self_test() {
    use regvm::{Duet, DuetOutcome, Machine};

    println!("━━━ regvm Self-Test ━━━");
    println!();

    let mut passed = 0;
    let mut failed = 0;

    let a = Register::letter(b'a');

    let run = |source: &str, variant: Variant| -> Option<Machine> {
        let program = regvm::assemble(source).ok()?;
        let mut machine = Machine::new(Arc::new(program), variant).ok()?;
        machine.run().ok()?;
        Some(machine)
    };

    // Test 1: Turing example
    print!("Turing example halts with a=2... ");
    match run(TURING_EXAMPLE, Variant::Turing) {
        Some(m) if m.is_halted() && m.regs.get(a) == 2 => {
            println!("✓");
            passed += 1;
        }
        other => {
            println!("✗ (got {:?})", other.map(|m| m.regs.get(a)));
            failed += 1;
        }
    }

    // Test 2: hlf truncates toward zero
    print!("hlf of -1 is 0... ");
    let hlf = regvm::assemble("hlf a").ok().and_then(|program| {
        let mut m = Machine::new(Arc::new(program), Variant::Turing).ok()?;
        m.regs.set(a, -1);
        m.run().ok()?;
        Some(m.regs.get(a))
    });
    if hlf == Some(0) {
        println!("✓");
        passed += 1;
    } else {
        println!("✗ (got {:?})", hlf);
        failed += 1;
    }

    // Test 3: jump lands on i + k
    print!("Jump lands on i+k... ");
    let landed = regvm::assemble("jmp +3\ninc a\ninc a\ninc b").ok().and_then(|program| {
        let mut m = Machine::new(Arc::new(program), Variant::Turing).ok()?;
        m.step().ok()?;
        Some(m.pc())
    });
    if landed == Some(3) {
        println!("✓");
        passed += 1;
    } else {
        println!("✗ (got {:?})", landed);
        failed += 1;
    }

    // Test 4: Sound example
    print!("Sound example recovers 4... ");
    let recovered = run(SOUND_EXAMPLE, Variant::Sound).and_then(|m| m.recovered());
    if recovered == Some(4) {
        println!("✓");
        passed += 1;
    } else {
        println!("✗ (got {:?})", recovered);
        failed += 1;
    }

    // Test 5: Duet example
    print!("Duet example deadlocks after 3 sends... ");
    let duet = regvm::assemble(DUET_EXAMPLE).ok().and_then(|program| {
        let mut duet = Duet::new(Arc::new(program)).ok()?;
        let outcome = duet.run().ok()?;
        Some((outcome, duet.answer()))
    });
    if duet == Some((DuetOutcome::Deadlock, 3)) {
        println!("✓");
        passed += 1;
    } else {
        println!("✗ (got {:?})", duet);
        failed += 1;
    }

    // Test 6: Floored modulo
    print!("mod takes the sign of the divisor... ");
    let modulo = run("set a -7\nmod a 3", Variant::Sound).map(|m| m.regs.get(a));
    if modulo == Some(2) {
        println!("✓");
        passed += 1;
    } else {
        println!("✗ (got {:?})", modulo);
        failed += 1;
    }

    // Test 7: Coprocessor mul count
    print!("Coprocessor counts 3 muls... ");
    let muls = run("set a 3\nmul b 2\nsub a 1\njnz a -2", Variant::Coprocessor).map(|m| m.mul_count());
    if muls == Some(3) {
        println!("✓");
        passed += 1;
    } else {
        println!("✗ (got {:?})", muls);
        failed += 1;
    }

    // Test 8: Variant check rejects foreign instructions
    print!("Turing rejects snd... ");
    let rejected = regvm::assemble("snd 1")
        .ok()
        .map(|program| Variant::Turing.check(&program).is_err());
    if rejected == Some(true) {
        println!("✓");
        passed += 1;
    } else {
        println!("✗");
        failed += 1;
    }

    println!();
    println!("━━━ Results: {} passed, {} failed ━━━", passed, failed);

    if failed > 0 {
        std::process::exit(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use log::{Level, Log, Metadata};

    fn enabled(logger: &env_logger::Logger, target: &str, level: Level) -> bool {
        logger.enabled(&Metadata::builder().target(target).level(level).build())
    }

    #[test]
    fn test_trace_is_scoped_to_crate() {
        let logger = log_builder(true).build();
        assert!(enabled(&logger, "regvm::machine::execute", Level::Trace));
        assert!(!enabled(&logger, "crossterm::terminal", Level::Trace));
    }

    #[test]
    fn test_no_trace_by_default() {
        let logger = log_builder(false).build();
        assert!(!enabled(&logger, "regvm::machine::execute", Level::Trace));
    }

    #[test]
    fn test_parse_preset() {
        let (reg, value) = parse_preset("a=-12").unwrap();
        assert_eq!(reg.as_str(), "a");
        assert_eq!(value, -12);
        assert!(parse_preset("a").is_err());
        assert!(parse_preset("a=x").is_err());
        assert!(parse_preset("1a=3").is_err());
    }
}

//! WebAssembly bindings.
//!
//! This module provides JavaScript-friendly wrappers around the machines.

use wasm_bindgen::prelude::*;
use crate::asm::assembler::assemble;
use crate::asm::disasm::disassemble_instruction;
use crate::machine::{Duet, Machine, Program, Step, Variant};
use std::sync::Arc;

/// Initialize panic hook for better error messages in console.
#[wasm_bindgen(start)]
pub fn init() {
    #[cfg(feature = "console_error_panic_hook")]
    console_error_panic_hook::set_once();
}

enum Target {
    Empty,
    Single(Machine),
    Pair(Duet),
}

/// WebAssembly-friendly machine wrapper.
#[wasm_bindgen]
pub struct WasmMachine {
    target: Target,
    program: Arc<Program>,
    variant: Variant,
}

#[wasm_bindgen]
impl WasmMachine {
    /// Create an empty machine for a variant name
    /// (`turing`, `sound`, `duet` or `coprocessor`).
    #[wasm_bindgen(constructor)]
    pub fn new(variant: &str) -> Result<WasmMachine, JsError> {
        let variant = parse_variant(variant)?;
        Ok(Self {
            target: Target::Empty,
            program: Arc::new(Program::default()),
            variant,
        })
    }

    /// Load a program from source. Returns the instruction count.
    #[wasm_bindgen]
    pub fn load(&mut self, source: &str) -> Result<usize, JsError> {
        let program = assemble(source)
            .map_err(|e| JsError::new(&format!("{}", e)))?;

        let len = program.len();
        self.program = Arc::new(program);
        self.reset()?;
        Ok(len)
    }

    /// Step one instruction. Returns the instruction text.
    #[wasm_bindgen]
    pub fn step(&mut self) -> Result<String, JsError> {
        let step = match &mut self.target {
            Target::Empty => return Err(JsError::new("no program loaded")),
            Target::Single(machine) => machine.step().map(Some),
            Target::Pair(duet) => duet.step(),
        }
        .map_err(|e| JsError::new(&format!("{}", e)))?;

        Ok(match step {
            Some(Step::Executed(instr)) => disassemble_instruction(&instr),
            Some(Step::Blocked) => "blocked".to_string(),
            None => "finished".to_string(),
        })
    }

    /// Run until the machine stops or `max_cycles` instructions have run.
    #[wasm_bindgen]
    pub fn run(&mut self, max_cycles: u32) -> Result<u64, JsError> {
        let result = match &mut self.target {
            Target::Empty => return Err(JsError::new("no program loaded")),
            Target::Single(machine) => machine.run_limited(max_cycles as u64).map(|_| ()),
            Target::Pair(duet) => duet.run_limited(max_cycles as u64).map(|_| ()),
        };
        result.map_err(|e| JsError::new(&format!("{}", e)))?;
        Ok(self.cycles())
    }

    /// Reset to the initial state with the loaded program.
    #[wasm_bindgen]
    pub fn reset(&mut self) -> Result<(), JsError> {
        let program = Arc::clone(&self.program);
        self.target = if self.variant == Variant::Duet {
            Target::Pair(Duet::new(program).map_err(|e| JsError::new(&format!("{}", e)))?)
        } else {
            Target::Single(
                Machine::new(program, self.variant).map_err(|e| JsError::new(&format!("{}", e)))?,
            )
        };
        Ok(())
    }

    /// Set a register before running.
    #[wasm_bindgen]
    pub fn set_register(&mut self, name: &str, value: i64) -> Result<(), JsError> {
        let reg = crate::machine::Register::new(name)
            .map_err(|e| JsError::new(&format!("{}", e)))?;
        match &mut self.target {
            Target::Empty => return Err(JsError::new("no program loaded")),
            Target::Single(machine) => machine.regs.set(reg, value),
            Target::Pair(duet) => duet.preset(reg, value),
        }
        Ok(())
    }

    /// True while instructions can still execute.
    #[wasm_bindgen]
    pub fn is_running(&self) -> bool {
        match &self.target {
            Target::Empty => false,
            Target::Single(machine) => machine.is_running(),
            Target::Pair(duet) => duet.outcome().is_none(),
        }
    }

    /// Instructions executed, summed over both machines for duet programs.
    #[wasm_bindgen]
    pub fn cycles(&self) -> u64 {
        self.machines().iter().map(|m| m.cycles()).sum()
    }

    /// Program counter of machine `id` (0 for single machines).
    #[wasm_bindgen]
    pub fn pc(&self, id: usize) -> Option<i64> {
        self.machines().get(id).map(|m| m.pc())
    }

    /// State of machine `id` as a string.
    #[wasm_bindgen]
    pub fn state(&self, id: usize) -> String {
        self.machines()
            .get(id)
            .map_or("Empty".to_string(), |m| format!("{:?}", m.state()))
    }

    /// Registers of machine `id` as a JSON object.
    #[wasm_bindgen]
    pub fn registers_json(&self, id: usize) -> Result<String, JsError> {
        let machine = self
            .machines()
            .get(id)
            .copied()
            .ok_or_else(|| JsError::new("no such machine"))?;
        let regs: std::collections::BTreeMap<String, i64> = machine
            .registers()
            .iter()
            .map(|(reg, value)| (reg.to_string(), value))
            .collect();
        serde_json::to_string(&regs).map_err(|e| JsError::new(&format!("{}", e)))
    }

    /// Values waiting in a duet mailbox, oldest first, as BigInts.
    #[wasm_bindgen]
    pub fn mailbox(&self, slot: usize) -> js_sys::Array {
        let queued = js_sys::Array::new();
        if let Target::Pair(duet) = &self.target {
            if let Some(queue) = duet.mailboxes().queue(slot) {
                for value in queue {
                    queued.push(&js_sys::BigInt::from(*value).into());
                }
            }
        }
        queued
    }

    /// The variant's answer: recovered sound, mul count, or program 1's sends.
    /// Turing machines have no single answer; read a register instead.
    #[wasm_bindgen]
    pub fn answer(&self) -> Option<i64> {
        match &self.target {
            Target::Empty => None,
            Target::Single(machine) => match self.variant {
                Variant::Sound => machine.recovered(),
                Variant::Coprocessor => Some(machine.mul_count() as i64),
                _ => None,
            },
            Target::Pair(duet) => Some(duet.answer() as i64),
        }
    }
}

impl WasmMachine {
    fn machines(&self) -> Vec<&Machine> {
        match &self.target {
            Target::Empty => Vec::new(),
            Target::Single(machine) => vec![machine],
            Target::Pair(duet) => duet.machines().iter().collect(),
        }
    }
}

fn parse_variant(name: &str) -> Result<Variant, JsError> {
    Variant::ALL
        .into_iter()
        .find(|v| v.name() == name)
        .ok_or_else(|| JsError::new(&format!("unknown variant: {}", name)))
}

/// Assemble source code and return instruction count.
#[wasm_bindgen]
pub fn wasm_assemble(source: &str) -> Result<usize, JsError> {
    let program = assemble(source)
        .map_err(|e| JsError::new(&format!("{}", e)))?;
    Ok(program.len())
}

/// Normalise one line of program text.
#[wasm_bindgen]
pub fn wasm_disassemble(line: &str) -> Result<String, JsError> {
    let instr = crate::machine::decode(line)
        .map_err(|e| JsError::new(&format!("{}", e)))?;
    Ok(disassemble_instruction(&instr))
}

use rustc_hash::FxHashMap;

use crate::{
    emulation::{ExecutionContext, Register},
    stubs::Architecture,
    Error, Result,
};

/// Scripted execution context for driver and convention tests.
///
/// Memory and registers are plain maps without aliasing. `step` does not decode anything:
/// it moves the instruction pointer along the transitions registered with
/// [`MockContext::transition`] and faults at any address without one.
#[derive(Debug, Clone, PartialEq)]
pub struct MockContext {
    architecture: Architecture,
    memory: FxHashMap<u64, u8>,
    registers: FxHashMap<Register, u64>,
    transitions: FxHashMap<u64, u64>,
    fetched: Vec<(u64, usize)>,
}

impl MockContext {
    pub fn new(architecture: Architecture) -> Self {
        MockContext {
            architecture,
            memory: FxHashMap::default(),
            registers: FxHashMap::default(),
            transitions: FxHashMap::default(),
            fetched: Vec::new(),
        }
    }

    // Stepping at `from` moves the instruction pointer to `to`
    pub fn transition(&mut self, from: u64, to: u64) -> &mut Self {
        self.transitions.insert(from, to);
        self
    }

    // Every (address, window length) handed to `step`, in order
    pub fn fetched(&self) -> &[(u64, usize)] {
        &self.fetched
    }

    fn check(&self, register: Register) -> Result<()> {
        if register.exists_on(self.architecture) {
            Ok(())
        } else {
            Err(Error::InvalidRegister {
                register,
                architecture: self.architecture,
            })
        }
    }
}

impl ExecutionContext for MockContext {
    fn architecture(&self) -> Architecture {
        self.architecture
    }

    fn set_memory(&mut self, address: u64, bytes: &[u8]) -> Result<()> {
        for (offset, byte) in bytes.iter().enumerate() {
            self.memory.insert(address.wrapping_add(offset as u64), *byte);
        }
        Ok(())
    }

    fn get_memory(&self, address: u64, length: usize) -> Result<Vec<u8>> {
        Ok((0..length as u64)
            .map(|offset| {
                self.memory
                    .get(&address.wrapping_add(offset))
                    .copied()
                    .unwrap_or(0)
            })
            .collect())
    }

    fn set_register(&mut self, register: Register, value: u64) -> Result<()> {
        self.check(register)?;
        self.registers.insert(register, value);
        Ok(())
    }

    fn get_register(&self, register: Register) -> Result<u64> {
        self.check(register)?;
        Ok(self.registers.get(&register).copied().unwrap_or(0))
    }

    fn step(&mut self, address: u64, opcode: &[u8]) -> Result<()> {
        self.fetched.push((address, opcode.len()));
        let next = self
            .transitions
            .get(&address)
            .copied()
            .ok_or_else(|| emulation_fault!(address, "no transition"))?;
        self.registers
            .insert(self.architecture.instruction_pointer(), next);
        Ok(())
    }
}

//! Reference x86 execution engine.
//!
//! [`X86Machine`] is a small concrete [`ExecutionContext`] for 32- and 64-bit x86. It decodes
//! with `iced-x86` and interprets the integer subset that position independent string and
//! memory routines are made of. It is not a CPU model: there are no segments, no
//! privilege levels, no floating point and no vector registers.
//!
//! # Supported Instructions
//!
//! | Group | Mnemonics |
//! |-------|-----------|
//! | Data movement | `mov`, `movzx`, `movsx`, `movsxd`, `lea`, `push`, `pop` |
//! | Arithmetic | `add`, `sub`, `cmp`, `inc`, `dec`, `neg` |
//! | Logic | `and`, `or`, `xor`, `test`, `not` |
//! | Control flow | `jmp`, all 16 `jcc`, `call`, `ret`, `ret imm16` |
//! | Other | `nop` |
//!
//! Everything else, including `int3`, `hlt` and `ud2`, raises
//! [`crate::Error::EmulationFault`].
//!
//! # Memory
//!
//! Memory is sparse and paged ([`PAGE_SIZE`]). Host writes through
//! [`ExecutionContext::set_memory`] map pages on demand and host reads of unmapped memory
//! return zeros. In strict mode ([`X86Machine::with_strict_memory`]) instruction fetches
//! and data accesses performed by [`ExecutionContext::step`] fault on unmapped pages, which
//! catches stubs running off their blob or dereferencing wild pointers.
//!
//! # Example
//!
//! ```rust
//! use stubscope::{Architecture, ExecutionContext, Register, X86Machine};
//!
//! let mut machine = X86Machine::new(Architecture::X86_64);
//! // mov eax, 0x2a ; ret
//! machine.set_memory(0x1000, &[0xB8, 0x2A, 0x00, 0x00, 0x00, 0xC3])?;
//! machine.set_register(Register::Rip, 0x1000)?;
//!
//! let window = machine.get_memory(0x1000, 16)?;
//! machine.step(0x1000, &window)?;
//! assert_eq!(machine.get_register(Register::Rax)?, 0x2a);
//! assert_eq!(machine.get_register(Register::Rip)?, 0x1005);
//! # Ok::<(), stubscope::Error>(())
//! ```

mod execute;
mod memory;
mod registers;

use iced_x86::{Decoder, DecoderOptions};
use log::trace;

use crate::{
    emulation::{ExecutionContext, Register},
    stubs::Architecture,
    Error, Result,
};

use memory::PagedMemory;
use registers::{Location, RegisterFile};

pub use memory::PAGE_SIZE;
pub use registers::Flags;

/// Concrete x86 machine state with a single-step interpreter.
///
/// All state is owned and `Clone`; two machines compare equal when registers, flags and
/// every mapped page are identical, which makes before/after snapshots cheap to assert on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct X86Machine {
    architecture: Architecture,
    registers: RegisterFile,
    memory: PagedMemory,
    strict_memory: bool,
}

impl X86Machine {
    /// Creates a machine with zeroed registers and no mapped memory.
    #[must_use]
    pub fn new(architecture: Architecture) -> Self {
        X86Machine {
            architecture,
            registers: RegisterFile::default(),
            memory: PagedMemory::new(architecture.word_mask()),
            strict_memory: false,
        }
    }

    /// Makes fetches and data accesses of [`ExecutionContext::step`] fault on unmapped pages.
    #[must_use]
    pub fn with_strict_memory(mut self, strict: bool) -> Self {
        self.strict_memory = strict;
        self
    }

    /// Returns `true` if unmapped accesses by executed instructions fault.
    #[must_use]
    pub fn is_strict(&self) -> bool {
        self.strict_memory
    }

    /// Maps zeroed pages covering `[address, address + length)`.
    ///
    /// Already mapped pages keep their contents. Needed in strict mode for memory a stub
    /// writes to but the host never initialized, such as the stack.
    pub fn map(&mut self, address: u64, length: usize) {
        self.memory.map(address, length);
    }

    /// Returns `true` if every byte of `[address, address + length)` is mapped.
    #[must_use]
    pub fn is_mapped(&self, address: u64, length: usize) -> bool {
        self.memory.first_unmapped(address, length).is_none()
    }

    /// Number of mapped pages.
    #[must_use]
    pub fn mapped_pages(&self) -> usize {
        self.memory.page_count()
    }

    /// Current arithmetic flags.
    #[must_use]
    pub fn flags(&self) -> Flags {
        self.registers.flags
    }

    fn locate(&self, register: Register) -> Result<Option<Location>> {
        if register.exists_on(self.architecture) {
            Ok(Location::of_name(register))
        } else {
            Err(Error::InvalidRegister {
                register,
                architecture: self.architecture,
            })
        }
    }
}

impl ExecutionContext for X86Machine {
    fn architecture(&self) -> Architecture {
        self.architecture
    }

    fn set_memory(&mut self, address: u64, bytes: &[u8]) -> Result<()> {
        self.memory.write(address, bytes);
        Ok(())
    }

    fn get_memory(&self, address: u64, length: usize) -> Result<Vec<u8>> {
        Ok(self.memory.read(address, length))
    }

    fn set_register(&mut self, register: Register, value: u64) -> Result<()> {
        match self.locate(register)? {
            Some(location) => self.registers.write(location, value),
            None => {
                self.registers.ip = value & self.architecture.word_mask() & register_mask(register);
            }
        }
        Ok(())
    }

    fn get_register(&self, register: Register) -> Result<u64> {
        Ok(match self.locate(register)? {
            Some(location) => self.registers.read(location),
            None => self.registers.ip & register_mask(register),
        })
    }

    fn step(&mut self, address: u64, opcode: &[u8]) -> Result<()> {
        let address = address & self.architecture.word_mask();
        let mut decoder = Decoder::with_ip(
            self.architecture.bitness(),
            opcode,
            address,
            DecoderOptions::NONE,
        );
        let instruction = decoder.decode();
        if instruction.is_invalid() {
            return Err(emulation_fault!(
                address,
                "invalid instruction encoding {:02x?}",
                opcode
            ));
        }

        if self.strict_memory {
            if let Some(unmapped) = self.memory.first_unmapped(address, instruction.len()) {
                return Err(emulation_fault!(
                    address,
                    "instruction fetch from unmapped memory at 0x{unmapped:x}"
                ));
            }
        }

        trace!("0x{address:x}: {instruction}");
        execute::Executor::new(self, &instruction).execute()
    }
}

fn register_mask(register: Register) -> u64 {
    if register.is_64bit() {
        u64::MAX
    } else {
        0xFFFF_FFFF
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test::{stub_machine, write_cstr, STACK_TOP, STUB_BASE};
    use crate::{stubs::Abi, Driver, DriverConfig};

    fn run(machine: &mut X86Machine, code: &[u8]) -> Result<()> {
        machine.set_memory(0x1000, code)?;
        let ip = machine.architecture().instruction_pointer();
        machine.set_register(ip, 0x1000)?;
        let end = 0x1000 + code.len() as u64;
        while machine.get_register(ip)? != end {
            let pc = machine.get_register(ip)?;
            let window = machine.get_memory(pc, 16)?;
            machine.step(pc, &window)?;
        }
        Ok(())
    }

    #[test]
    fn register_views() {
        let mut machine = X86Machine::new(Architecture::X86_64);
        machine.set_register(Register::Rax, u64::MAX).unwrap();
        assert_eq!(machine.get_register(Register::Eax).unwrap(), 0xFFFF_FFFF);

        machine.set_register(Register::Eax, 5).unwrap();
        assert_eq!(machine.get_register(Register::Rax).unwrap(), 5);

        machine.set_register(Register::Rip, 0x1_0000_1000).unwrap();
        assert_eq!(machine.get_register(Register::Eip).unwrap(), 0x1000);
    }

    #[test]
    fn invalid_register_on_x86() {
        let mut machine = X86Machine::new(Architecture::X86);
        assert_eq!(
            machine.set_register(Register::R8, 1).unwrap_err(),
            Error::InvalidRegister {
                register: Register::R8,
                architecture: Architecture::X86
            }
        );
        assert!(machine.get_register(Register::Rip).is_err());

        machine.set_register(Register::Eip, 0x1_2345_6789).unwrap();
        assert_eq!(machine.get_register(Register::Eip).unwrap(), 0x2345_6789);
    }

    #[test]
    fn arithmetic_and_flags() {
        let mut machine = X86Machine::new(Architecture::X86_64);
        #[rustfmt::skip]
        let code = [
            0xB8, 0xFF, 0xFF, 0xFF, 0xFF, // mov eax, 0xffffffff
            0x83, 0xC0, 0x01,             // add eax, 1
        ];
        run(&mut machine, &code).unwrap();
        assert_eq!(machine.get_register(Register::Rax).unwrap(), 0);
        let flags = machine.flags();
        assert!(flags.cf && flags.zf && !flags.of && !flags.sf);

        #[rustfmt::skip]
        let code = [
            0x31, 0xC0,                   // xor eax, eax
            0x83, 0xE8, 0x01,             // sub eax, 1
            0x48, 0x0F, 0xBE, 0xC8,       // movsx rcx, al
            0x48, 0xF7, 0xD9,             // neg rcx
        ];
        run(&mut machine, &code).unwrap();
        assert_eq!(machine.get_register(Register::Rax).unwrap(), 0xFFFF_FFFF);
        assert_eq!(machine.get_register(Register::Rcx).unwrap(), 1);
        assert!(machine.flags().cf);
    }

    #[test]
    fn signed_overflow() {
        let mut machine = X86Machine::new(Architecture::X86);
        #[rustfmt::skip]
        let code = [
            0xB8, 0xFF, 0xFF, 0xFF, 0x7F, // mov eax, 0x7fffffff
            0x40,                         // inc eax
        ];
        run(&mut machine, &code).unwrap();
        let flags = machine.flags();
        assert!(flags.of && flags.sf && !flags.zf);
    }

    #[test]
    fn push_pop_call_ret() {
        let mut machine = X86Machine::new(Architecture::X86_64);
        machine.set_register(Register::Rsp, 0x8000).unwrap();
        #[rustfmt::skip]
        let code = [
            0x6A, 0x07,                   // 00: push 7
            0xE8, 0x02, 0x00, 0x00, 0x00, // 02: call 09
            0xEB, 0x04,                   // 07: jmp 0d
            0x5A,                         // 09: pop rdx (return address)
            0x58,                         // 0a: pop rax (7)
            0xFF, 0xE2,                   // 0b: jmp rdx
        ];
        machine.set_memory(0x1000, &code).unwrap();
        machine.set_register(Register::Rip, 0x1000).unwrap();
        for _ in 0..6 {
            let pc = machine.get_register(Register::Rip).unwrap();
            let window = machine.get_memory(pc, 16).unwrap();
            machine.step(pc, &window).unwrap();
        }
        assert_eq!(machine.get_register(Register::Rip).unwrap(), 0x100d);
        assert_eq!(machine.get_register(Register::Rax).unwrap(), 7);
        assert_eq!(machine.get_register(Register::Rdx).unwrap(), 0x1007);
        assert_eq!(machine.get_register(Register::Rsp).unwrap(), 0x8000);
    }

    #[test]
    fn ret_with_immediate() {
        let mut machine = X86Machine::new(Architecture::X86);
        machine.set_register(Register::Esp, 0x8000).unwrap();
        machine.set_memory(0x8000, &[0x34, 0x12, 0, 0]).unwrap();
        machine.set_memory(0x1000, &[0xC2, 0x08, 0x00]).unwrap();

        let window = machine.get_memory(0x1000, 16).unwrap();
        machine.step(0x1000, &window).unwrap();
        assert_eq!(machine.get_register(Register::Eip).unwrap(), 0x1234);
        assert_eq!(machine.get_register(Register::Esp).unwrap(), 0x800C);
    }

    #[test]
    fn traps_fault() {
        for code in [&[0xCC][..], &[0xF4], &[0x0F, 0x0B]] {
            let mut machine = X86Machine::new(Architecture::X86_64);
            let error = run(&mut machine, code).unwrap_err();
            assert!(
                matches!(error, Error::EmulationFault { address: 0x1000, .. }),
                "{code:02x?}: {error}"
            );
        }
    }

    #[test]
    fn truncated_window_faults() {
        let mut machine = X86Machine::new(Architecture::X86_64);
        let error = machine.step(0x1000, &[0xB8, 0x01]).unwrap_err();
        assert!(matches!(error, Error::EmulationFault { address: 0x1000, .. }));
        assert!(machine.step(0x1000, &[]).is_err());
    }

    #[test]
    fn strict_memory() {
        let mut machine = X86Machine::new(Architecture::X86_64).with_strict_memory(true);
        // mov eax, [0x5000]
        machine
            .set_memory(0x1000, &[0x8B, 0x04, 0x25, 0x00, 0x50, 0x00, 0x00])
            .unwrap();
        let window = machine.get_memory(0x1000, 16).unwrap();
        let error = machine.step(0x1000, &window).unwrap_err();
        assert_eq!(
            error,
            emulation_fault!(0x1000, "read of 4 bytes from unmapped memory at 0x5000")
        );

        machine.map(0x5000, 4);
        machine.step(0x1000, &window).unwrap();
        assert_eq!(machine.get_register(Register::Rax).unwrap(), 0);

        let error = machine.step(0x9000, &window).unwrap_err();
        assert!(matches!(error, Error::EmulationFault { address: 0x9000, .. }));
    }

    #[test]
    fn high_byte_registers() {
        let mut machine = X86Machine::new(Architecture::X86);
        #[rustfmt::skip]
        let code = [
            0xB8, 0x34, 0x12, 0x00, 0x00, // mov eax, 0x1234
            0x88, 0xE3,                   // mov bl, ah
            0x80, 0xFB, 0x12,             // cmp bl, 0x12
        ];
        run(&mut machine, &code).unwrap();
        assert_eq!(machine.get_register(Register::Ebx).unwrap(), 0x12);
        assert!(machine.flags().zf);
    }

    #[test]
    fn runs_installed_stub() {
        let (mut machine, stubs) = stub_machine(Abi::SysVAmd64);
        write_cstr(&mut machine, 0x1000, "abc");

        let driver = Driver::new(DriverConfig::default());
        let entry = stubs.entry(STUB_BASE, "strlen").unwrap();
        let completion = driver
            .call(&mut machine, Abi::SysVAmd64, entry, &[0x1000])
            .unwrap();
        assert_eq!(completion.value, 3);
        assert_eq!(machine.get_register(Register::Rsp).unwrap(), STACK_TOP);
    }
}

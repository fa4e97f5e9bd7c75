//! The interface between the stub driver and an execution engine.
//!
//! The driver never interprets instructions itself. Everything it needs from an engine is
//! captured by [`ExecutionContext`]: concrete memory access, concrete register access by
//! name, and a primitive that executes exactly one instruction.

use strum::{Display, EnumIter, EnumString, IntoStaticStr};

use crate::{stubs::Architecture, Result};

/// Register names understood by every [`ExecutionContext`].
///
/// Names parse from and display as their lowercase assembler spelling, so hosts that
/// address registers by string can use `"rdi".parse::<Register>()`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, EnumIter, IntoStaticStr)]
#[strum(serialize_all = "lowercase")]
pub enum Register {
    /// 64-bit accumulator register (RAX)
    Rax,
    /// 64-bit counter register (RCX)
    Rcx,
    /// 64-bit data register (RDX)
    Rdx,
    /// 64-bit base register (RBX)
    Rbx,
    /// 64-bit stack pointer (RSP)
    Rsp,
    /// 64-bit base pointer (RBP)
    Rbp,
    /// 64-bit source index (RSI)
    Rsi,
    /// 64-bit destination index (RDI)
    Rdi,
    /// 64-bit extended register R8
    R8,
    /// 64-bit extended register R9
    R9,
    /// 64-bit extended register R10
    R10,
    /// 64-bit extended register R11
    R11,
    /// 64-bit extended register R12
    R12,
    /// 64-bit extended register R13
    R13,
    /// 64-bit extended register R14
    R14,
    /// 64-bit extended register R15
    R15,
    /// 64-bit instruction pointer (RIP)
    Rip,

    /// 32-bit accumulator register (EAX)
    Eax,
    /// 32-bit counter register (ECX)
    Ecx,
    /// 32-bit data register (EDX)
    Edx,
    /// 32-bit base register (EBX)
    Ebx,
    /// 32-bit stack pointer (ESP)
    Esp,
    /// 32-bit base pointer (EBP)
    Ebp,
    /// 32-bit source index (ESI)
    Esi,
    /// 32-bit destination index (EDI)
    Edi,
    /// 32-bit instruction pointer (EIP)
    Eip,
}

impl Register {
    /// Width of the register in bytes.
    #[must_use]
    pub fn size(self) -> usize {
        if self.is_64bit() {
            8
        } else {
            4
        }
    }

    /// Returns `true` for the 64-bit register names.
    #[must_use]
    pub fn is_64bit(self) -> bool {
        matches!(
            self,
            Register::Rax
                | Register::Rcx
                | Register::Rdx
                | Register::Rbx
                | Register::Rsp
                | Register::Rbp
                | Register::Rsi
                | Register::Rdi
                | Register::R8
                | Register::R9
                | Register::R10
                | Register::R11
                | Register::R12
                | Register::R13
                | Register::R14
                | Register::R15
                | Register::Rip
        )
    }

    /// Returns `true` if the register exists on `architecture`.
    ///
    /// The 32-bit names are valid on both architectures (as the low half of the 64-bit
    /// registers on `x86_64`); the 64-bit names only exist on `x86_64`.
    #[must_use]
    pub fn exists_on(self, architecture: Architecture) -> bool {
        match architecture {
            Architecture::X86 => !self.is_64bit(),
            Architecture::X86_64 => true,
        }
    }
}

/// Concrete memory, registers and a single-step primitive of one emulation session.
///
/// An execution context is exclusively owned by whoever drives it; the driver takes it by
/// `&mut` for the duration of one invocation and never shares it.
///
/// # Faults
///
/// [`step`](Self::step) reports invalid instructions and bad memory accesses as
/// [`crate::Error::EmulationFault`]. The driver propagates whatever error a context returns
/// unchanged.
pub trait ExecutionContext {
    /// Architecture of this context; fixed for its lifetime.
    fn architecture(&self) -> Architecture;

    /// Writes `bytes` starting at `address`.
    ///
    /// # Errors
    ///
    /// Returns an error if the engine refuses the write.
    fn set_memory(&mut self, address: u64, bytes: &[u8]) -> Result<()>;

    /// Reads `length` bytes starting at `address`.
    ///
    /// # Errors
    ///
    /// Returns an error if the engine refuses the read.
    fn get_memory(&self, address: u64, length: usize) -> Result<Vec<u8>>;

    /// Writes a register, including the instruction and stack pointers.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::InvalidRegister`] if the register does not exist on this
    /// architecture.
    fn set_register(&mut self, register: Register, value: u64) -> Result<()>;

    /// Reads a register.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::InvalidRegister`] if the register does not exist on this
    /// architecture.
    fn get_register(&self, register: Register) -> Result<u64>;

    /// Decodes and executes exactly one instruction located at `address`.
    ///
    /// `opcode` holds candidate bytes starting at `address`; it may be longer than the
    /// instruction. Registers and memory, including the instruction pointer, are updated
    /// as a side effect.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::EmulationFault`] for undecodable or unsupported instructions
    /// and for faulting memory accesses.
    fn step(&mut self, address: u64, opcode: &[u8]) -> Result<()>;

    /// Reads a little-endian word of the context's natural width.
    ///
    /// # Errors
    ///
    /// Propagates errors from [`get_memory`](Self::get_memory).
    fn read_word(&self, address: u64) -> Result<u64> {
        let size = self.architecture().word_size();
        let bytes = self.get_memory(address, size)?;
        if bytes.len() < size {
            return Err(emulation_fault!(
                address,
                "short read of {} bytes for a {size}-byte word",
                bytes.len()
            ));
        }
        let mut buffer = [0u8; 8];
        buffer[..size].copy_from_slice(&bytes[..size]);
        Ok(u64::from_le_bytes(buffer))
    }

    /// Writes a little-endian word of the context's natural width.
    ///
    /// # Errors
    ///
    /// Propagates errors from [`set_memory`](Self::set_memory).
    fn write_word(&mut self, address: u64, value: u64) -> Result<()> {
        let size = self.architecture().word_size();
        self.set_memory(address, &value.to_le_bytes()[..size])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn register_names() {
        assert_eq!("rdi".parse::<Register>().unwrap(), Register::Rdi);
        assert_eq!("r15".parse::<Register>().unwrap(), Register::R15);
        assert_eq!(Register::Eip.to_string(), "eip");
        assert!("xmm0".parse::<Register>().is_err());
    }

    #[test]
    fn register_availability() {
        assert!(Register::Eax.exists_on(Architecture::X86));
        assert!(Register::Eax.exists_on(Architecture::X86_64));
        assert!(!Register::Rax.exists_on(Architecture::X86));
        assert!(!Register::R8.exists_on(Architecture::X86));
        assert_eq!(Register::Rip.size(), 8);
        assert_eq!(Register::Esp.size(), 4);
    }
}

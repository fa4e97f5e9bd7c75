//! Instruction semantics of [`X86Machine`].

use iced_x86::{Instruction, Mnemonic, OpKind, Register as IcedRegister};

use super::{
    registers::{sign_bit, size_mask, Flags, Location},
    X86Machine,
};
use crate::Result;

/// Stack pointer slot in encoding order.
const RSP_SLOT: usize = 4;

#[derive(Debug, Clone, Copy)]
enum Operand {
    Register(Location),
    Memory { address: u64, size: usize },
    Immediate(u64),
}

/// Executes one decoded instruction against a machine.
///
/// Faults carry the address of the instruction being executed.
pub(super) struct Executor<'a> {
    machine: &'a mut X86Machine,
    instruction: &'a Instruction,
    address: u64,
    mask: u64,
    word: usize,
}

impl<'a> Executor<'a> {
    pub(super) fn new(machine: &'a mut X86Machine, instruction: &'a Instruction) -> Self {
        let mask = machine.architecture.word_mask();
        let word = machine.architecture.word_size();
        Executor {
            machine,
            instruction,
            address: instruction.ip() & mask,
            mask,
            word,
        }
    }

    pub(super) fn execute(mut self) -> Result<()> {
        let next_ip = self.instruction.next_ip() & self.mask;
        let mnemonic = self.instruction.mnemonic();

        match mnemonic {
            Mnemonic::Nop => {}
            Mnemonic::Mov | Mnemonic::Movzx => {
                let destination = self.operand(0)?;
                let value = self.read(self.operand(1)?)?;
                self.write(destination, value)?;
            }
            Mnemonic::Movsx | Mnemonic::Movsxd => {
                let destination = self.operand(0)?;
                let source = self.operand(1)?;
                let value = sign_extend(self.read(source)?, self.size(source)?);
                self.write(destination, value)?;
            }
            Mnemonic::Lea => {
                let destination = self.operand(0)?;
                let address = self.effective_address()?;
                self.write(destination, address)?;
            }
            Mnemonic::Push => {
                let source = self.operand(0)?;
                let size = match source {
                    Operand::Immediate(_) => self.word,
                    operand => self.size(operand)?,
                };
                let value = self.read(source)?;
                self.push(value, size)?;
            }
            Mnemonic::Pop => {
                let destination = self.operand(0)?;
                let size = self.size(destination)?;
                let value = self.pop(size)?;
                self.write(destination, value)?;
            }
            Mnemonic::Add
            | Mnemonic::Sub
            | Mnemonic::Cmp
            | Mnemonic::And
            | Mnemonic::Or
            | Mnemonic::Xor
            | Mnemonic::Test => self.binary(mnemonic)?,
            Mnemonic::Inc | Mnemonic::Dec | Mnemonic::Neg | Mnemonic::Not => {
                self.unary(mnemonic)?;
            }
            Mnemonic::Jmp => {
                let target = self.branch_target()?;
                self.machine.registers.ip = target;
                return Ok(());
            }
            Mnemonic::Call => {
                let target = self.branch_target()?;
                self.push(next_ip, self.word)?;
                self.machine.registers.ip = target;
                return Ok(());
            }
            Mnemonic::Ret => {
                let target = self.pop(self.word)?;
                if self.instruction.op_count() == 1 {
                    let release = u64::from(self.instruction.immediate16());
                    let sp = self.stack_pointer().wrapping_add(release) & self.mask;
                    self.set_stack_pointer(sp);
                }
                self.machine.registers.ip = target & self.mask;
                return Ok(());
            }
            _ => {
                if let Some(taken) = condition(mnemonic, self.machine.registers.flags) {
                    self.machine.registers.ip = if taken {
                        self.branch_target()?
                    } else {
                        next_ip
                    };
                    return Ok(());
                }
                return Err(emulation_fault!(
                    self.address,
                    "unsupported instruction {:?}",
                    mnemonic
                ));
            }
        }

        self.machine.registers.ip = next_ip;
        Ok(())
    }

    fn operand(&self, index: u32) -> Result<Operand> {
        let instruction = self.instruction;
        Ok(match instruction.op_kind(index) {
            OpKind::Register => {
                let register = instruction.op_register(index);
                let location = Location::of(register).ok_or_else(|| {
                    emulation_fault!(self.address, "unsupported register {:?}", register)
                })?;
                Operand::Register(location)
            }
            OpKind::Memory => Operand::Memory {
                address: self.effective_address()?,
                size: instruction.memory_size().size(),
            },
            OpKind::Immediate8 => Operand::Immediate(u64::from(instruction.immediate8())),
            OpKind::Immediate16 => Operand::Immediate(u64::from(instruction.immediate16())),
            OpKind::Immediate32 => Operand::Immediate(u64::from(instruction.immediate32())),
            OpKind::Immediate64 => Operand::Immediate(instruction.immediate64()),
            OpKind::Immediate8to16 => {
                Operand::Immediate(i64::from(instruction.immediate8to16()) as u64)
            }
            OpKind::Immediate8to32 => {
                Operand::Immediate(i64::from(instruction.immediate8to32()) as u64)
            }
            OpKind::Immediate8to64 => Operand::Immediate(instruction.immediate8to64() as u64),
            OpKind::Immediate32to64 => Operand::Immediate(instruction.immediate32to64() as u64),
            kind => {
                return Err(emulation_fault!(
                    self.address,
                    "unsupported operand kind {:?}",
                    kind
                ))
            }
        })
    }

    fn size(&self, operand: Operand) -> Result<usize> {
        match operand {
            Operand::Register(location) => Ok(location.size),
            Operand::Memory { size, .. } if (1..=8).contains(&size) => Ok(size),
            Operand::Memory { size, .. } => Err(emulation_fault!(
                self.address,
                "unsupported memory operand of {size} bytes"
            )),
            Operand::Immediate(_) => Err(emulation_fault!(
                self.address,
                "immediate operand has no width of its own"
            )),
        }
    }

    fn effective_address(&self) -> Result<u64> {
        let instruction = self.instruction;
        let base = instruction.memory_base();
        if base == IcedRegister::RIP || base == IcedRegister::EIP {
            return Ok(instruction.memory_displacement64() & self.mask);
        }

        let mut address = instruction.memory_displacement64();
        if base != IcedRegister::None {
            address = address.wrapping_add(self.register(base)?);
        }

        let index = instruction.memory_index();
        if index != IcedRegister::None {
            let scale = u64::from(instruction.memory_index_scale());
            address = address.wrapping_add(self.register(index)?.wrapping_mul(scale));
        }

        Ok(address & self.mask)
    }

    fn register(&self, register: IcedRegister) -> Result<u64> {
        let location = Location::of(register).ok_or_else(|| {
            emulation_fault!(self.address, "unsupported address register {:?}", register)
        })?;
        Ok(self.machine.registers.read(location))
    }

    fn read(&self, operand: Operand) -> Result<u64> {
        match operand {
            Operand::Register(location) => Ok(self.machine.registers.read(location)),
            Operand::Memory { address, .. } => self.load(address, self.size(operand)?),
            Operand::Immediate(value) => Ok(value),
        }
    }

    fn write(&mut self, operand: Operand, value: u64) -> Result<()> {
        match operand {
            Operand::Register(location) => {
                self.machine.registers.write(location, value);
                Ok(())
            }
            Operand::Memory { address, .. } => {
                let size = self.size(operand)?;
                self.store(address, size, value)
            }
            Operand::Immediate(_) => Err(emulation_fault!(
                self.address,
                "write to an immediate operand"
            )),
        }
    }

    fn load(&self, address: u64, size: usize) -> Result<u64> {
        if self.machine.strict_memory {
            if let Some(unmapped) = self.machine.memory.first_unmapped(address, size) {
                return Err(emulation_fault!(
                    self.address,
                    "read of {size} bytes from unmapped memory at 0x{unmapped:x}"
                ));
            }
        }

        let bytes = self.machine.memory.read(address, size);
        let mut buffer = [0u8; 8];
        buffer[..size].copy_from_slice(&bytes);
        Ok(u64::from_le_bytes(buffer))
    }

    fn store(&mut self, address: u64, size: usize, value: u64) -> Result<()> {
        if self.machine.strict_memory {
            if let Some(unmapped) = self.machine.memory.first_unmapped(address, size) {
                return Err(emulation_fault!(
                    self.address,
                    "write of {size} bytes to unmapped memory at 0x{unmapped:x}"
                ));
            }
        }

        self.machine
            .memory
            .write(address, &value.to_le_bytes()[..size]);
        Ok(())
    }

    fn stack_pointer(&self) -> u64 {
        self.machine.registers.read(self.stack_location())
    }

    fn set_stack_pointer(&mut self, value: u64) {
        let location = self.stack_location();
        self.machine.registers.write(location, value);
    }

    fn stack_location(&self) -> Location {
        Location {
            slot: RSP_SLOT,
            size: self.word,
            high: false,
        }
    }

    fn push(&mut self, value: u64, size: usize) -> Result<()> {
        let sp = self.stack_pointer().wrapping_sub(size as u64) & self.mask;
        self.store(sp, size, value)?;
        self.set_stack_pointer(sp);
        Ok(())
    }

    fn pop(&mut self, size: usize) -> Result<u64> {
        let sp = self.stack_pointer();
        let value = self.load(sp, size)?;
        self.set_stack_pointer(sp.wrapping_add(size as u64) & self.mask);
        Ok(value)
    }

    fn branch_target(&self) -> Result<u64> {
        let target = match self.instruction.op_kind(0) {
            OpKind::NearBranch16 | OpKind::NearBranch32 | OpKind::NearBranch64 => {
                self.instruction.near_branch_target()
            }
            _ => self.read(self.operand(0)?)?,
        };
        Ok(target & self.mask)
    }

    fn binary(&mut self, mnemonic: Mnemonic) -> Result<()> {
        let destination = self.operand(0)?;
        let size = self.size(destination)?;
        let mask = size_mask(size);
        let sign = sign_bit(size);
        let left = self.read(destination)? & mask;
        let right = self.read(self.operand(1)?)? & mask;

        let mut flags = self.machine.registers.flags;
        let result = match mnemonic {
            Mnemonic::Add => {
                let result = left.wrapping_add(right) & mask;
                flags.cf = u128::from(left) + u128::from(right) > u128::from(mask);
                flags.of = (left ^ result) & (right ^ result) & sign != 0;
                result
            }
            Mnemonic::Sub | Mnemonic::Cmp => {
                let result = left.wrapping_sub(right) & mask;
                flags.cf = left < right;
                flags.of = (left ^ right) & (left ^ result) & sign != 0;
                result
            }
            _ => {
                flags.cf = false;
                flags.of = false;
                match mnemonic {
                    Mnemonic::Or => left | right,
                    Mnemonic::Xor => left ^ right,
                    _ => left & right,
                }
            }
        };
        flags.set_result(result, size);
        self.machine.registers.flags = flags;

        if matches!(mnemonic, Mnemonic::Cmp | Mnemonic::Test) {
            Ok(())
        } else {
            self.write(destination, result)
        }
    }

    fn unary(&mut self, mnemonic: Mnemonic) -> Result<()> {
        let destination = self.operand(0)?;
        let size = self.size(destination)?;
        let mask = size_mask(size);
        let sign = sign_bit(size);
        let value = self.read(destination)? & mask;

        let mut flags = self.machine.registers.flags;
        let result = match mnemonic {
            Mnemonic::Inc => {
                let result = value.wrapping_add(1) & mask;
                flags.of = result == sign;
                flags.set_result(result, size);
                result
            }
            Mnemonic::Dec => {
                let result = value.wrapping_sub(1) & mask;
                flags.of = value == sign;
                flags.set_result(result, size);
                result
            }
            Mnemonic::Neg => {
                let result = value.wrapping_neg() & mask;
                flags.cf = value != 0;
                flags.of = value == sign;
                flags.set_result(result, size);
                result
            }
            _ => !value & mask,
        };
        self.machine.registers.flags = flags;

        self.write(destination, result)
    }
}

/// Evaluates a conditional jump; `None` if `mnemonic` is not a `jcc`.
fn condition(mnemonic: Mnemonic, flags: Flags) -> Option<bool> {
    Some(match mnemonic {
        Mnemonic::Je => flags.zf,
        Mnemonic::Jne => !flags.zf,
        Mnemonic::Jl => flags.sf != flags.of,
        Mnemonic::Jge => flags.sf == flags.of,
        Mnemonic::Jle => flags.zf || flags.sf != flags.of,
        Mnemonic::Jg => !flags.zf && flags.sf == flags.of,
        Mnemonic::Jb => flags.cf,
        Mnemonic::Jae => !flags.cf,
        Mnemonic::Jbe => flags.cf || flags.zf,
        Mnemonic::Ja => !flags.cf && !flags.zf,
        Mnemonic::Js => flags.sf,
        Mnemonic::Jns => !flags.sf,
        Mnemonic::Jo => flags.of,
        Mnemonic::Jno => !flags.of,
        Mnemonic::Jp => flags.pf,
        Mnemonic::Jnp => !flags.pf,
        _ => return None,
    })
}

fn sign_extend(value: u64, size: usize) -> u64 {
    if size >= 8 {
        return value;
    }
    let shift = 64 - size as u32 * 8;
    (((value << shift) as i64) >> shift) as u64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn conditions() {
        let flags = Flags {
            cf: true,
            zf: false,
            sf: true,
            of: false,
            pf: true,
        };
        assert_eq!(condition(Mnemonic::Jb, flags), Some(true));
        assert_eq!(condition(Mnemonic::Ja, flags), Some(false));
        assert_eq!(condition(Mnemonic::Jl, flags), Some(true));
        assert_eq!(condition(Mnemonic::Jg, flags), Some(false));
        assert_eq!(condition(Mnemonic::Jnp, flags), Some(false));
        assert_eq!(condition(Mnemonic::Mov, flags), None);
    }

    #[test]
    fn sign_extension() {
        assert_eq!(sign_extend(0x80, 1), 0xFFFF_FFFF_FFFF_FF80);
        assert_eq!(sign_extend(0x7F, 1), 0x7F);
        assert_eq!(sign_extend(0x8000_0000, 4), 0xFFFF_FFFF_8000_0000);
        assert_eq!(sign_extend(0x1234, 8), 0x1234);
    }
}

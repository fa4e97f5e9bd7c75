//! Register file and arithmetic flags of [`super::X86Machine`].
//!
//! The sixteen general purpose registers are stored as full 64-bit slots in encoding order
//! (`rax`, `rcx`, `rdx`, `rbx`, `rsp`, `rbp`, `rsi`, `rdi`, `r8`..`r15`). Narrower names are
//! views on a slot:
//!
//! | View | Read | Write |
//! |------|------|-------|
//! | 64-bit | whole slot | whole slot |
//! | 32-bit | low 32 bits | zero-extends into the slot |
//! | 16-bit | low 16 bits | merges, upper bits preserved |
//! | 8-bit low | bits 0..8 | merges |
//! | 8-bit high (`ah`..`bh`) | bits 8..16 | merges |

use iced_x86::Register as IcedRegister;

use crate::emulation::Register;

#[rustfmt::skip]
const GPR64: [IcedRegister; 16] = [
    IcedRegister::RAX, IcedRegister::RCX, IcedRegister::RDX, IcedRegister::RBX,
    IcedRegister::RSP, IcedRegister::RBP, IcedRegister::RSI, IcedRegister::RDI,
    IcedRegister::R8, IcedRegister::R9, IcedRegister::R10, IcedRegister::R11,
    IcedRegister::R12, IcedRegister::R13, IcedRegister::R14, IcedRegister::R15,
];

#[rustfmt::skip]
const GPR32: [IcedRegister; 16] = [
    IcedRegister::EAX, IcedRegister::ECX, IcedRegister::EDX, IcedRegister::EBX,
    IcedRegister::ESP, IcedRegister::EBP, IcedRegister::ESI, IcedRegister::EDI,
    IcedRegister::R8D, IcedRegister::R9D, IcedRegister::R10D, IcedRegister::R11D,
    IcedRegister::R12D, IcedRegister::R13D, IcedRegister::R14D, IcedRegister::R15D,
];

#[rustfmt::skip]
const GPR16: [IcedRegister; 16] = [
    IcedRegister::AX, IcedRegister::CX, IcedRegister::DX, IcedRegister::BX,
    IcedRegister::SP, IcedRegister::BP, IcedRegister::SI, IcedRegister::DI,
    IcedRegister::R8W, IcedRegister::R9W, IcedRegister::R10W, IcedRegister::R11W,
    IcedRegister::R12W, IcedRegister::R13W, IcedRegister::R14W, IcedRegister::R15W,
];

#[rustfmt::skip]
const GPR8: [IcedRegister; 16] = [
    IcedRegister::AL, IcedRegister::CL, IcedRegister::DL, IcedRegister::BL,
    IcedRegister::SPL, IcedRegister::BPL, IcedRegister::SIL, IcedRegister::DIL,
    IcedRegister::R8L, IcedRegister::R9L, IcedRegister::R10L, IcedRegister::R11L,
    IcedRegister::R12L, IcedRegister::R13L, IcedRegister::R14L, IcedRegister::R15L,
];

const GPR8_HIGH: [IcedRegister; 4] = [
    IcedRegister::AH,
    IcedRegister::CH,
    IcedRegister::DH,
    IcedRegister::BH,
];

/// A view on one general purpose register slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Location {
    /// Slot index in encoding order
    pub slot: usize,
    /// Width of the view in bytes
    pub size: usize,
    /// The view is bits 8..16 (`ah`, `ch`, `dh`, `bh`)
    pub high: bool,
}

impl Location {
    /// Resolves a decoder register; `None` for anything but a general purpose register.
    pub fn of(register: IcedRegister) -> Option<Location> {
        let find = |table: &[IcedRegister], size: usize, high: bool| {
            table
                .iter()
                .position(|candidate| *candidate == register)
                .map(|slot| Location { slot, size, high })
        };

        find(&GPR64[..], 8, false)
            .or_else(|| find(&GPR32[..], 4, false))
            .or_else(|| find(&GPR16[..], 2, false))
            .or_else(|| find(&GPR8[..], 1, false))
            .or_else(|| find(&GPR8_HIGH[..], 1, true))
    }

    /// Resolves a public register name; `None` for the instruction pointers.
    pub fn of_name(register: Register) -> Option<Location> {
        let (slot, size) = match register {
            Register::Rax => (0, 8),
            Register::Rcx => (1, 8),
            Register::Rdx => (2, 8),
            Register::Rbx => (3, 8),
            Register::Rsp => (4, 8),
            Register::Rbp => (5, 8),
            Register::Rsi => (6, 8),
            Register::Rdi => (7, 8),
            Register::R8 => (8, 8),
            Register::R9 => (9, 8),
            Register::R10 => (10, 8),
            Register::R11 => (11, 8),
            Register::R12 => (12, 8),
            Register::R13 => (13, 8),
            Register::R14 => (14, 8),
            Register::R15 => (15, 8),
            Register::Eax => (0, 4),
            Register::Ecx => (1, 4),
            Register::Edx => (2, 4),
            Register::Ebx => (3, 4),
            Register::Esp => (4, 4),
            Register::Ebp => (5, 4),
            Register::Esi => (6, 4),
            Register::Edi => (7, 4),
            Register::Rip | Register::Eip => return None,
        };
        Some(Location {
            slot,
            size,
            high: false,
        })
    }
}

/// Arithmetic status flags.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Flags {
    /// Carry flag
    pub cf: bool,
    /// Zero flag
    pub zf: bool,
    /// Sign flag
    pub sf: bool,
    /// Overflow flag
    pub of: bool,
    /// Parity flag (even number of set bits in the low byte)
    pub pf: bool,
}

impl Flags {
    /// Sets ZF, SF and PF from a result of `size` bytes.
    pub fn set_result(&mut self, result: u64, size: usize) {
        self.zf = result & size_mask(size) == 0;
        self.sf = result & sign_bit(size) != 0;
        self.pf = (result as u8).count_ones() % 2 == 0;
    }
}

/// The general purpose registers plus instruction pointer and flags.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RegisterFile {
    gpr: [u64; 16],
    /// Instruction pointer
    pub ip: u64,
    /// Status flags
    pub flags: Flags,
}

impl RegisterFile {
    /// Reads a view, zero-extended to 64 bits.
    pub fn read(&self, location: Location) -> u64 {
        let value = self.gpr[location.slot];
        if location.high {
            (value >> 8) & 0xFF
        } else {
            value & size_mask(location.size)
        }
    }

    /// Writes a view with x86 merge rules.
    pub fn write(&mut self, location: Location, value: u64) {
        let slot = &mut self.gpr[location.slot];
        *slot = match (location.size, location.high) {
            (1, true) => (*slot & !0xFF00) | ((value & 0xFF) << 8),
            (8, _) => value,
            (4, _) => value & 0xFFFF_FFFF,
            (size, _) => {
                let mask = size_mask(size);
                (*slot & !mask) | (value & mask)
            }
        };
    }
}

/// All-ones mask of an operand of `size` bytes.
pub fn size_mask(size: usize) -> u64 {
    if size >= 8 {
        u64::MAX
    } else {
        (1u64 << (size * 8)) - 1
    }
}

/// Sign bit of an operand of `size` bytes.
pub fn sign_bit(size: usize) -> u64 {
    1u64 << (size * 8 - 1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn locate() {
        assert_eq!(
            Location::of(IcedRegister::R10D),
            Some(Location {
                slot: 10,
                size: 4,
                high: false
            })
        );
        assert_eq!(Location::of(IcedRegister::BH).map(|l| (l.slot, l.high)), Some((3, true)));
        assert_eq!(Location::of(IcedRegister::XMM0), None);
        assert_eq!(Location::of_name(Register::Esi), Location::of(IcedRegister::ESI));
        assert_eq!(Location::of_name(Register::Rip), None);
    }

    #[test]
    fn write_rules() {
        let mut file = RegisterFile::default();
        let rax = Location::of(IcedRegister::RAX).unwrap();

        file.write(rax, 0x1122_3344_5566_7788);
        file.write(Location::of(IcedRegister::AH).unwrap(), 0xAB);
        assert_eq!(file.read(rax), 0x1122_3344_5566_AB88);

        file.write(Location::of(IcedRegister::AX).unwrap(), 0xFFFF_0102);
        assert_eq!(file.read(rax), 0x1122_3344_5566_0102);

        file.write(Location::of(IcedRegister::EAX).unwrap(), 0xDEAD_BEEF);
        assert_eq!(file.read(rax), 0xDEAD_BEEF);
        assert_eq!(file.read(Location::of(IcedRegister::AL).unwrap()), 0xEF);
        assert_eq!(file.read(Location::of(IcedRegister::AH).unwrap()), 0xBE);
    }

    #[test]
    fn result_flags() {
        let mut flags = Flags::default();
        flags.set_result(0x100, 1);
        assert!(flags.zf);
        assert!(flags.pf);

        flags.set_result(0x80, 1);
        assert!(!flags.zf);
        assert!(flags.sf);
        assert!(!flags.pf);
    }
}

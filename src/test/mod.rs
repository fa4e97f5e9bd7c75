mod mock;

pub use mock::MockContext;

use crate::{
    emulation::{ExecutionContext, Register, X86Machine},
    install, lookup,
    stubs::{Abi, Architecture, Library, StubSet},
};

/// Install base used by the stub tests
pub const STUB_BASE: u64 = 0x6660_0000;

/// Initial stack and frame pointer of test machines
pub const STACK_TOP: u64 = 0x7fff_fff0;

// Helper function to create a machine with the libc stubs of `abi` installed at STUB_BASE
pub fn stub_machine(abi: Abi) -> (X86Machine, &'static StubSet) {
    let architecture = abi.architecture();
    let stubs = lookup(architecture, abi, Library::Libc).unwrap();
    let mut machine = X86Machine::new(architecture);
    install(stubs, STUB_BASE, &mut machine).unwrap();
    machine
        .set_register(architecture.stack_pointer(), STACK_TOP)
        .unwrap();
    machine
        .set_register(frame_pointer(architecture), STACK_TOP)
        .unwrap();
    (machine, stubs)
}

// Helper function to write a NUL terminated string
pub fn write_cstr(machine: &mut X86Machine, address: u64, text: &str) {
    let mut bytes = text.as_bytes().to_vec();
    bytes.push(0);
    machine.set_memory(address, &bytes).unwrap();
}

fn frame_pointer(architecture: Architecture) -> Register {
    match architecture {
        Architecture::X86 => Register::Ebp,
        Architecture::X86_64 => Register::Rbp,
    }
}

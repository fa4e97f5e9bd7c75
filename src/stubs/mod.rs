//! Stub library catalog: relocatable libc replacements per architecture and ABI.
//!
//! Binaries under analysis frequently call into the C runtime (`strlen`, `strcmp`,
//! `memcpy`, ...) while the runtime itself is not part of the analyzed image. This module
//! ships a small machine-code implementation of each supported function for every
//! supported target, so an emulator can resolve such calls by running real instructions
//! instead of modeling the library.
//!
//! # Architecture
//!
//! Stub sets are keyed by an (architecture, ABI, library) triple. All target specific
//! knowledge lives in which [`StubSet`] gets selected; the driver that runs the stubs is
//! written once against [`crate::emulation::ExecutionContext`].
//!
//! ```text
//! (Architecture, Abi, Library) ──lookup──► StubSet { code, symbols }
//!                                              │
//!                              install(base) ──┘──► context memory @ base
//!                                                     │
//!                  entry = base + symbols[name] ──────┘──► invoke()
//! ```
//!
//! # Key Components
//!
//! - [`StubRegistry`] - Process-wide, immutable catalog built on first access
//! - [`StubSet`] - Machine-code blob plus its symbol table
//! - [`SymbolTable`] - Function name to blob offset mapping
//! - [`Architecture`], [`Abi`], [`Library`] - The registry key
//!
//! # Registered Targets
//!
//! | Architecture | ABI | Library | Functions |
//! |--------------|-----|---------|-----------|
//! | `x86_64` | `sysv-amd64` | `libc` | `strlen`, `strcmp`, `strncmp`, `strncasecmp`, `memcmp`, `memcpy`, `memset` |
//! | `x86` | `sysv-i386` | `libc` | `strlen`, `strcmp`, `strncmp`, `strncasecmp`, `memcmp`, `memcpy`, `memset` |
//!
//! # Example
//!
//! ```rust
//! use stubscope::{install, lookup, Abi, Architecture, Library, X86Machine};
//!
//! let stubs = lookup(Architecture::X86_64, Abi::SysVAmd64, Library::Libc)?;
//! let mut machine = X86Machine::new(Architecture::X86_64);
//! let base = install(stubs, 0x6660_0000, &mut machine)?;
//! let strlen = stubs.entry(base, "strlen")?;
//! assert_eq!(strlen, 0x6660_0000 + stubs.symbol("strlen")?);
//! # Ok::<(), stubscope::Error>(())
//! ```
//!
//! # Thread Safety
//!
//! The registry and every [`StubSet`] are immutable after construction and `Sync`, so they
//! can be shared by any number of concurrently running execution contexts.

mod i386;
mod set;
mod x86_64;

use std::sync::LazyLock;

use rustc_hash::FxHashMap;
use strum::{Display, EnumIter, EnumString, IntoStaticStr};

use crate::{
    emulation::{ExecutionContext, Register},
    Error, Result,
};

pub use set::{StubFragment, StubSet, SymbolTable, STUB_ALIGNMENT, STUB_PADDING};

/// Instruction set and register width of an execution context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, EnumIter, IntoStaticStr)]
pub enum Architecture {
    /// 32-bit x86 (i386)
    #[strum(serialize = "x86")]
    X86,
    /// 64-bit x86 (amd64)
    #[strum(serialize = "x86_64")]
    X86_64,
}

impl Architecture {
    /// Bitness as understood by the decoder (32 or 64).
    #[must_use]
    pub fn bitness(self) -> u32 {
        match self {
            Architecture::X86 => 32,
            Architecture::X86_64 => 64,
        }
    }

    /// Natural word size in bytes; also the size of a stack slot and of a return address.
    #[must_use]
    pub fn word_size(self) -> usize {
        match self {
            Architecture::X86 => 4,
            Architecture::X86_64 => 8,
        }
    }

    /// Mask applied to addresses and word-sized values.
    #[must_use]
    pub fn word_mask(self) -> u64 {
        match self {
            Architecture::X86 => 0xFFFF_FFFF,
            Architecture::X86_64 => u64::MAX,
        }
    }

    /// The instruction pointer register.
    #[must_use]
    pub fn instruction_pointer(self) -> Register {
        match self {
            Architecture::X86 => Register::Eip,
            Architecture::X86_64 => Register::Rip,
        }
    }

    /// The stack pointer register.
    #[must_use]
    pub fn stack_pointer(self) -> Register {
        match self {
            Architecture::X86 => Register::Esp,
            Architecture::X86_64 => Register::Rsp,
        }
    }
}

/// Calling convention of a stub set.
///
/// Each ABI belongs to exactly one [`Architecture`]. The argument marshaling rules of each
/// variant are implemented by [`crate::emulation::CallingConvention`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, EnumIter, IntoStaticStr)]
pub enum Abi {
    /// System V i386 (cdecl): every argument is passed on the stack, result in `eax`.
    #[strum(serialize = "sysv-i386")]
    SysVI386,
    /// System V AMD64: the first six integer arguments are passed in registers, result in `rax`.
    #[strum(serialize = "sysv-amd64")]
    SysVAmd64,
}

impl Abi {
    /// The architecture this calling convention is defined for.
    #[must_use]
    pub fn architecture(self) -> Architecture {
        match self {
            Abi::SysVI386 => Architecture::X86,
            Abi::SysVAmd64 => Architecture::X86_64,
        }
    }
}

/// Logical grouping of stub functions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, EnumIter, IntoStaticStr)]
pub enum Library {
    /// The C standard library
    #[strum(serialize = "libc")]
    Libc,
}

/// Registry key: one stub set per (architecture, ABI, library).
pub type StubTarget = (Architecture, Abi, Library);

/// Immutable, process-wide catalog of stub sets.
///
/// The global instance is linked once, on first access, from the assembled listings in
/// this module and is never mutated afterwards. Callers copy a set's code into their own
/// context memory; the registry's bytes are never patched in place.
#[derive(Debug)]
pub struct StubRegistry {
    sets: FxHashMap<StubTarget, StubSet>,
}

static REGISTRY: LazyLock<StubRegistry> = LazyLock::new(StubRegistry::builtin);

impl StubRegistry {
    /// Returns the process-wide registry.
    #[must_use]
    pub fn global() -> &'static StubRegistry {
        &REGISTRY
    }

    /// Links every built-in stub set.
    fn builtin() -> Self {
        let mut sets = FxHashMap::default();
        sets.insert(
            (Architecture::X86_64, Abi::SysVAmd64, Library::Libc),
            StubSet::link(Architecture::X86_64, x86_64::LIBC),
        );
        sets.insert(
            (Architecture::X86, Abi::SysVI386, Library::Libc),
            StubSet::link(Architecture::X86, i386::LIBC),
        );

        for ((architecture, abi, library), set) in &sets {
            log::debug!(
                "linked {architecture}/{abi}/{library} stubs: {} bytes, {} symbols",
                set.code().len(),
                set.symbols().len()
            );
        }

        StubRegistry { sets }
    }

    /// Looks up the stub set registered for a triple.
    ///
    /// # Arguments
    ///
    /// * `architecture` - Target instruction set
    /// * `abi` - Calling convention the stubs are compiled for
    /// * `library` - Logical library the functions belong to
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotSupported`] if no stub set is registered for the triple.
    pub fn get(&self, architecture: Architecture, abi: Abi, library: Library) -> Result<&StubSet> {
        self.sets
            .get(&(architecture, abi, library))
            .ok_or(Error::NotSupported {
                architecture,
                abi,
                library,
            })
    }

    /// Returns all registered triples in a stable order.
    #[must_use]
    pub fn targets(&self) -> Vec<StubTarget> {
        let mut targets: Vec<StubTarget> = self.sets.keys().copied().collect();
        targets.sort_by_key(|(architecture, abi, library)| {
            (
                <&'static str>::from(*architecture),
                <&'static str>::from(*abi),
                <&'static str>::from(*library),
            )
        });
        targets
    }

    /// Number of registered stub sets.
    #[must_use]
    pub fn len(&self) -> usize {
        self.sets.len()
    }

    /// Returns `true` if no stub set is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.sets.is_empty()
    }
}

/// Looks up a stub set in the process-wide registry.
///
/// # Errors
///
/// Returns [`Error::NotSupported`] if no stub set is registered for the triple.
///
/// # Example
///
/// ```rust
/// use stubscope::{lookup, Abi, Architecture, Library};
///
/// let stubs = lookup(Architecture::X86, Abi::SysVI386, Library::Libc)?;
/// assert!(stubs.symbols().contains("strncasecmp"));
/// # Ok::<(), stubscope::Error>(())
/// ```
pub fn lookup(architecture: Architecture, abi: Abi, library: Library) -> Result<&'static StubSet> {
    StubRegistry::global().get(architecture, abi, library)
}

/// Copies a stub set's code into context memory at `base`.
///
/// This is a pure overwrite: installing the same set at the same base twice leaves memory
/// exactly as installing it once. The caller chooses the base; the code is position
/// independent and runs from any address.
///
/// # Returns
///
/// The base address, for convenience when computing entry points.
///
/// # Errors
///
/// Propagates any error the context reports while writing memory.
pub fn install<C>(stubs: &StubSet, base: u64, ctx: &mut C) -> Result<u64>
where
    C: ExecutionContext + ?Sized,
{
    ctx.set_memory(base, stubs.code())?;
    log::debug!(
        "installed {} bytes of stub code at 0x{base:x}",
        stubs.code().len()
    );
    Ok(base)
}

#[cfg(test)]
mod tests {
    use strum::IntoEnumIterator;

    use super::*;

    #[test]
    fn registered_targets() {
        let registry = StubRegistry::global();
        assert_eq!(registry.len(), 2);
        assert_eq!(
            registry.targets(),
            vec![
                (Architecture::X86, Abi::SysVI386, Library::Libc),
                (Architecture::X86_64, Abi::SysVAmd64, Library::Libc),
            ]
        );
    }

    #[test]
    fn every_abi_matches_its_registered_architecture() {
        for (architecture, abi, _) in StubRegistry::global().targets() {
            assert_eq!(abi.architecture(), architecture);
        }
    }

    #[test]
    fn lookup_unregistered_triple() {
        let result = lookup(Architecture::X86, Abi::SysVAmd64, Library::Libc);
        assert_eq!(
            result.unwrap_err(),
            Error::NotSupported {
                architecture: Architecture::X86,
                abi: Abi::SysVAmd64,
                library: Library::Libc,
            }
        );

        assert!(lookup(Architecture::X86_64, Abi::SysVI386, Library::Libc).is_err());
    }

    #[test]
    fn required_symbols_present() {
        for (architecture, abi, library) in StubRegistry::global().targets() {
            let stubs = lookup(architecture, abi, library).unwrap();
            for name in ["strlen", "strcmp", "strncasecmp"] {
                assert!(
                    stubs.symbols().contains(name),
                    "{name} missing for {architecture}/{abi}"
                );
            }
        }
    }

    #[test]
    fn lookup_is_shared() {
        let a = lookup(Architecture::X86_64, Abi::SysVAmd64, Library::Libc).unwrap();
        let b = lookup(Architecture::X86_64, Abi::SysVAmd64, Library::Libc).unwrap();
        assert!(std::ptr::eq(a, b));
    }

    #[test]
    fn enum_names_roundtrip() {
        for architecture in Architecture::iter() {
            let name = architecture.to_string();
            assert_eq!(name.parse::<Architecture>().unwrap(), architecture);
        }
        for abi in Abi::iter() {
            assert_eq!(abi.to_string().parse::<Abi>().unwrap(), abi);
        }
        assert_eq!("libc".parse::<Library>().unwrap(), Library::Libc);
        assert_eq!(Abi::SysVAmd64.to_string(), "sysv-amd64");
    }

    #[test]
    fn architecture_properties() {
        assert_eq!(Architecture::X86.word_size(), 4);
        assert_eq!(Architecture::X86_64.word_size(), 8);
        assert_eq!(Architecture::X86.instruction_pointer(), Register::Eip);
        assert_eq!(Architecture::X86_64.stack_pointer(), Register::Rsp);
        assert_eq!(Architecture::X86.word_mask(), 0xFFFF_FFFF);
    }
}

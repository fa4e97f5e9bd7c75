//! Stub sets: linked machine code plus the symbol table describing its entry points.

use std::collections::BTreeMap;

use crate::{stubs::Architecture, Error, Result};

/// Entry points inside a linked blob start on this boundary.
pub const STUB_ALIGNMENT: usize = 16;

/// Filler between functions (`int3`), so a stray fall-through traps instead of running into
/// the next stub.
pub const STUB_PADDING: u8 = 0xCC;

/// One assembled function listing, as produced for a target at build time.
///
/// Listings only use relative branches, so the linked blob stays position independent.
#[derive(Debug, Clone, Copy)]
pub struct StubFragment {
    /// Exported symbol name
    pub name: &'static str,
    /// Encoded instructions of the function
    pub code: &'static [u8],
}

/// Mapping from function name to byte offset inside a [`StubSet`]'s code.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SymbolTable {
    offsets: BTreeMap<&'static str, u64>,
}

impl SymbolTable {
    /// Returns the offset of `name` within the stub code.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnknownSymbol`] if the function is not implemented by this set.
    pub fn get(&self, name: &str) -> Result<u64> {
        self.offsets
            .get(name)
            .copied()
            .ok_or_else(|| Error::UnknownSymbol(name.to_string()))
    }

    /// Returns `true` if `name` is implemented by this set.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.offsets.contains_key(name)
    }

    /// Iterates over `(name, offset)` pairs in name order.
    pub fn iter(&self) -> impl Iterator<Item = (&'static str, u64)> + '_ {
        self.offsets.iter().map(|(name, offset)| (*name, *offset))
    }

    /// Number of exported functions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.offsets.len()
    }

    /// Returns `true` if no function is exported.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.offsets.is_empty()
    }
}

/// A relocatable machine-code blob together with its symbol table.
///
/// Invariants:
/// - every offset in [`symbols`](Self::symbols) is strictly less than `code().len()` and is
///   the first byte of a function
/// - the code contains no absolute addresses and runs from any base it is copied to
///
/// A `StubSet` is immutable; use [`crate::install`] to copy it into an execution context.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StubSet {
    architecture: Architecture,
    code: Vec<u8>,
    symbols: SymbolTable,
}

impl StubSet {
    /// Links function listings into a single blob.
    ///
    /// Each function starts on a [`STUB_ALIGNMENT`] boundary; gaps are filled with
    /// [`STUB_PADDING`].
    pub(crate) fn link(architecture: Architecture, fragments: &[StubFragment]) -> Self {
        let mut code = Vec::new();
        let mut offsets = BTreeMap::new();

        for fragment in fragments {
            debug_assert!(!fragment.code.is_empty(), "empty stub {}", fragment.name);

            let aligned = code.len().next_multiple_of(STUB_ALIGNMENT);
            code.resize(aligned, STUB_PADDING);

            let previous = offsets.insert(fragment.name, aligned as u64);
            debug_assert!(previous.is_none(), "duplicate stub {}", fragment.name);

            code.extend_from_slice(fragment.code);
        }

        StubSet {
            architecture,
            code,
            symbols: SymbolTable { offsets },
        }
    }

    /// The architecture the code is encoded for.
    #[must_use]
    pub fn architecture(&self) -> Architecture {
        self.architecture
    }

    /// The linked machine code.
    #[must_use]
    pub fn code(&self) -> &[u8] {
        &self.code
    }

    /// The symbol table.
    #[must_use]
    pub fn symbols(&self) -> &SymbolTable {
        &self.symbols
    }

    /// Offset of `name` within [`code`](Self::code).
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnknownSymbol`] if the function is not implemented by this set.
    pub fn symbol(&self, name: &str) -> Result<u64> {
        self.symbols.get(name)
    }

    /// Entry address of `name` once the code is installed at `base`.
    ///
    /// The sum wraps at the architecture's address width, matching where
    /// [`crate::install`] places the bytes on a context of that architecture.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnknownSymbol`] if the function is not implemented by this set.
    pub fn entry(&self, base: u64, name: &str) -> Result<u64> {
        Ok(base.wrapping_add(self.symbol(name)?) & self.architecture.word_mask())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stubs::{lookup, Abi, Architecture, Library, StubRegistry};

    const RET: &[u8] = &[0xC3];
    const XOR_RET: &[u8] = &[0x31, 0xC0, 0xC3];

    #[test]
    fn link_aligns_entries() {
        let set = StubSet::link(Architecture::X86_64, &[
            StubFragment {
                name: "first",
                code: XOR_RET,
            },
            StubFragment {
                name: "second",
                code: RET,
            },
        ]);

        assert_eq!(set.symbol("first").unwrap(), 0);
        assert_eq!(set.symbol("second").unwrap(), 16);
        assert_eq!(set.code().len(), 17);
        assert!(set.code()[3..16].iter().all(|b| *b == STUB_PADDING));
        assert_eq!(set.code()[16], 0xC3);
    }

    #[test]
    fn unknown_symbol() {
        let set = lookup(Architecture::X86_64, Abi::SysVAmd64, Library::Libc).unwrap();
        assert_eq!(
            set.symbol("doesnotexist").unwrap_err(),
            Error::UnknownSymbol("doesnotexist".to_string())
        );
        assert!(set.entry(0x1000, "doesnotexist").is_err());
    }

    #[test]
    fn offsets_are_valid_entry_points() {
        let registry = StubRegistry::global();
        for (architecture, abi, library) in registry.targets() {
            let set = registry.get(architecture, abi, library).unwrap();
            assert!(!set.symbols().is_empty());
            for (name, offset) in set.symbols().iter() {
                assert!(
                    (offset as usize) < set.code().len(),
                    "{name} points outside the blob"
                );
                assert_eq!(offset as usize % STUB_ALIGNMENT, 0);
                if offset > 0 {
                    // Every entry is preceded by padding or the previous stub's `ret`.
                    let previous = set.code()[offset as usize - 1];
                    assert!(previous == STUB_PADDING || previous == 0xC3);
                }
            }
        }
    }

    #[test]
    fn entry_adds_base() {
        let set = lookup(Architecture::X86, Abi::SysVI386, Library::Libc).unwrap();
        let offset = set.symbol("strcmp").unwrap();
        assert_eq!(set.entry(0x6660_0000, "strcmp").unwrap(), 0x6660_0000 + offset);
    }

    #[test]
    fn entry_wraps_at_address_width() {
        let set = lookup(Architecture::X86, Abi::SysVI386, Library::Libc).unwrap();
        assert_eq!(set.architecture(), Architecture::X86);
        let offset = set.symbol("strcmp").unwrap();
        assert_eq!(set.entry(0xffff_fff0, "strcmp").unwrap(), offset - 0x10);

        let set = lookup(Architecture::X86_64, Abi::SysVAmd64, Library::Libc).unwrap();
        assert_eq!(
            set.entry(0xffff_fff0, "strcmp").unwrap(),
            0xffff_fff0 + set.symbol("strcmp").unwrap()
        );
    }
}

//! Sparse paged memory for [`super::X86Machine`].

use std::fmt;

use rustc_hash::FxHashMap;

/// Granularity of mapped memory.
pub const PAGE_SIZE: usize = 0x1000;

const PAGE_SHIFT: u32 = PAGE_SIZE.trailing_zeros();
const PAGE_OFFSET_MASK: u64 = PAGE_SIZE as u64 - 1;

/// Address space made of lazily allocated, zero-initialized 4 KiB pages.
///
/// Addresses wrap at the width of the address space (`mask`), so an access straddling the
/// top of a 32-bit space continues at address 0. Because the wrap point is page aligned,
/// an access chunk never straddles both a page boundary and the wrap.
#[derive(Clone, PartialEq, Eq)]
pub struct PagedMemory {
    pages: FxHashMap<u64, Box<[u8; PAGE_SIZE]>>,
    mask: u64,
}

impl PagedMemory {
    /// Creates an empty address space limited to `mask`.
    pub fn new(mask: u64) -> Self {
        PagedMemory {
            pages: FxHashMap::default(),
            mask,
        }
    }

    /// Splits `[address, address + length)` into per-page chunks of
    /// `(page number, offset in page, chunk length, offset in buffer)`.
    fn chunks(
        mask: u64,
        address: u64,
        length: usize,
    ) -> impl Iterator<Item = (u64, usize, usize, usize)> {
        let mut done = 0usize;
        std::iter::from_fn(move || {
            if done >= length {
                return None;
            }
            let current = address.wrapping_add(done as u64) & mask;
            let offset = (current & PAGE_OFFSET_MASK) as usize;
            let chunk = (PAGE_SIZE - offset).min(length - done);
            let item = (current >> PAGE_SHIFT, offset, chunk, done);
            done += chunk;
            Some(item)
        })
    }

    /// Reads `length` bytes; unmapped bytes read as zero.
    pub fn read(&self, address: u64, length: usize) -> Vec<u8> {
        let mut buffer = vec![0u8; length];
        for (page, offset, chunk, done) in Self::chunks(self.mask, address, length) {
            if let Some(data) = self.pages.get(&page) {
                buffer[done..done + chunk].copy_from_slice(&data[offset..offset + chunk]);
            }
        }
        buffer
    }

    /// Writes `bytes`, mapping every touched page.
    pub fn write(&mut self, address: u64, bytes: &[u8]) {
        for (page, offset, chunk, done) in Self::chunks(self.mask, address, bytes.len()) {
            let data = self
                .pages
                .entry(page)
                .or_insert_with(|| Box::new([0u8; PAGE_SIZE]));
            data[offset..offset + chunk].copy_from_slice(&bytes[done..done + chunk]);
        }
    }

    /// Maps zeroed pages covering `[address, address + length)`; mapped pages keep their data.
    pub fn map(&mut self, address: u64, length: usize) {
        for (page, ..) in Self::chunks(self.mask, address, length) {
            self.pages
                .entry(page)
                .or_insert_with(|| Box::new([0u8; PAGE_SIZE]));
        }
    }

    /// First unmapped address within `[address, address + length)`, if any.
    pub fn first_unmapped(&self, address: u64, length: usize) -> Option<u64> {
        Self::chunks(self.mask, address, length)
            .find(|(page, ..)| !self.pages.contains_key(page))
            .map(|(_, _, _, done)| address.wrapping_add(done as u64) & self.mask)
    }

    /// Number of mapped pages.
    pub fn page_count(&self) -> usize {
        self.pages.len()
    }
}

impl fmt::Debug for PagedMemory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut pages: Vec<u64> = self.pages.keys().map(|page| page << PAGE_SHIFT).collect();
        pages.sort_unstable();
        f.debug_struct("PagedMemory")
            .field("mask", &format_args!("0x{:x}", self.mask))
            .field("pages", &format_args!("{pages:x?}"))
            .finish()
    }
}

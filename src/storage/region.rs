//! # Anonymous Memory Regions
//!
//! This module implements `Region`, a writable byte range acquired from the
//! OS through an anonymous private mapping and released deterministically
//! when the region is dropped.
//!
//! ## Why mmap Instead of the Heap?
//!
//! Remora's whole reason for existing is to hand memory back to the kernel
//! the moment the host needs it. A `Vec<u8>` cannot promise that: freed heap
//! chunks sit in the allocator, interleaved with live allocations, and the
//! pages backing them are rarely returned. An anonymous mapping is a single
//! contiguous reservation that `munmap` gives back in one syscall, so
//! discarding a table translates directly into RSS shrinking.
//!
//! ## Pre-population
//!
//! Mappings are created with `populate`, the equivalent of `MAP_POPULATE`:
//! the kernel wires the pages up front instead of lazily on first touch.
//! Entry writes into a fresh table therefore never stall on a page fault in
//! the middle of a cache operation.
//!
//! ## Safety Model
//!
//! The mapping is private and anonymous, so no other process can observe or
//! mutate it, and there is no file whose truncation could invalidate it. The
//! borrow checker does the rest:
//!
//! ```text
//! as_slice(&self) -> &[u8]          // Immutable borrow of self
//! as_mut_slice(&mut self) -> &mut [u8]  // Mutable borrow (exclusive)
//! ```
//!
//! The mapping lives exactly as long as the `Region`, so slices cannot
//! outlive the memory they point into.

use eyre::{ensure, Result, WrapErr};
use memmap2::{MmapMut, MmapOptions};

use crate::config::MAX_REGION_SIZE;

/// A contiguous writable byte range backed by an anonymous private mapping.
///
/// Dropping the region unmaps it, returning the pages to the OS immediately.
#[derive(Debug)]
pub struct Region {
    map: MmapMut,
}

impl Region {
    /// Acquires a zero-filled anonymous region of exactly `len` bytes.
    ///
    /// The mapping is pre-populated so first writes do not page-fault.
    pub fn anon(len: usize) -> Result<Self> {
        ensure!(len > 0, "region length must be non-zero");
        ensure!(
            len <= MAX_REGION_SIZE,
            "region length {} exceeds maximum {}",
            len,
            MAX_REGION_SIZE
        );

        let mut opts = MmapOptions::new();
        opts.len(len);
        // MAP_POPULATE wires the pages up front; other platforms fault
        // lazily on first touch.
        #[cfg(target_os = "linux")]
        opts.populate();

        let map = opts
            .map_anon()
            .wrap_err_with(|| format!("failed to map {} byte anonymous region", len))?;

        Ok(Self { map })
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.len() == 0
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.map
    }

    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        &mut self.map
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_anon_region_is_zeroed() {
        let region = Region::anon(4096).unwrap();
        assert_eq!(region.len(), 4096);
        assert!(region.as_slice().iter().all(|&b| b == 0));
    }

    #[test]
    fn test_anon_region_is_writable() {
        let mut region = Region::anon(4096).unwrap();
        region.as_mut_slice()[0] = 0xab;
        region.as_mut_slice()[4095] = 0xcd;
        assert_eq!(region.as_slice()[0], 0xab);
        assert_eq!(region.as_slice()[4095], 0xcd);
    }

    #[test]
    fn test_zero_length_region_rejected() {
        assert!(Region::anon(0).is_err());
    }

    #[test]
    fn test_oversized_region_rejected() {
        assert!(Region::anon(MAX_REGION_SIZE + 1).is_err());
    }
}

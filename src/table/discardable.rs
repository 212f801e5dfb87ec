//! # Discardable Tables
//!
//! `DiscardableTable` pairs a [`PackedTable`] with the anonymous region it
//! lives in and a liveness flag, so the cache manager can drop a whole
//! table's memory in one step or hand the region to a replacement table
//! without a round trip through the OS.
//!
//! ## Liveness
//!
//! Every table carries a `dead` flag shared (via `Arc`) with the
//! [`TableRef`] handles stored in the cache's global index. The flag is
//! loadable without any lock, which is what lets the index sweeper propose
//! stale slots from outside the cache lock. It is only a hint in that
//! direction: `is_dead() == true` is authoritative, while `false` may be
//! stale. Authoritative liveness is membership in the cache manager's table
//! collection, checked under the cache lock.
//!
//! After `discard` or `recycle`, the dead handle answers `is_dead`, the
//! stat getters, and the miss/no-op branches of `has`/`get`/`put`/`delete`;
//! `reset` and `recycle` on a dead handle abort.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use eyre::Result;

use crate::config::AUTO_GC_DIVISOR;
use crate::storage::Region;
use crate::table::{NoSpace, PackedTable};

/// Lock-free handle to a table's identity and liveness, stored in the
/// cache's global index.
#[derive(Clone)]
pub struct TableRef {
    gen: u64,
    dead: Arc<AtomicBool>,
}

impl TableRef {
    /// Generation number the table was created or recycled with.
    pub fn generation(&self) -> u64 {
        self.gen
    }

    /// Whether the table has been discarded or recycled. `true` is
    /// authoritative; `false` may be stale.
    pub fn is_dead(&self) -> bool {
        self.dead.load(Ordering::Acquire)
    }
}

impl std::fmt::Debug for TableRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TableRef")
            .field("gen", &self.gen)
            .field("dead", &self.is_dead())
            .finish()
    }
}

/// A packed table whose region can be discarded to the OS or recycled into
/// a successor table.
pub struct DiscardableTable {
    inner: Option<PackedTable>,
    dead: Arc<AtomicBool>,
    gen: u64,
}

impl DiscardableTable {
    /// Allocates a fresh anonymous region of `size` bytes and wraps it in an
    /// empty table tagged with generation `gen`.
    pub fn new(size: usize, gen: u64) -> Result<Self> {
        let region = Region::anon(size)?;
        let auto_gc = size / AUTO_GC_DIVISOR;
        Ok(Self {
            inner: Some(PackedTable::new(region, auto_gc)),
            dead: Arc::new(AtomicBool::new(false)),
            gen,
        })
    }

    /// Consumes this table and builds an empty successor around the same
    /// region, skipping OS release and re-acquisition. The old handle is
    /// marked dead.
    pub fn recycle(mut self, gen: u64) -> Self {
        let inner = self.inner.take().expect("recycle on discarded table");
        self.dead.store(true, Ordering::Release);
        let region = inner.into_region();
        let auto_gc = region.len() / AUTO_GC_DIVISOR;
        Self {
            inner: Some(PackedTable::new(region, auto_gc)),
            dead: Arc::new(AtomicBool::new(false)),
            gen,
        }
    }

    /// Releases the region back to the OS and marks the table dead. Safe to
    /// call more than once.
    pub fn discard(&mut self) {
        if self.inner.is_none() {
            return;
        }
        // Dropping the packed table drops its region, which unmaps.
        self.inner = None;
        self.dead.store(true, Ordering::Release);
    }

    /// Erases all entries, keeping the region.
    pub fn reset(&mut self) {
        self.inner
            .as_mut()
            .expect("reset on discarded table")
            .reset();
    }

    pub fn is_dead(&self) -> bool {
        self.dead.load(Ordering::Acquire)
    }

    /// Handle suitable for storing in the cache's global index.
    pub fn handle(&self) -> TableRef {
        TableRef {
            gen: self.gen,
            dead: Arc::clone(&self.dead),
        }
    }

    pub fn generation(&self) -> u64 {
        self.gen
    }

    pub fn num_entries(&self) -> usize {
        self.inner.as_ref().map_or(0, PackedTable::num_entries)
    }

    pub fn num_deleted(&self) -> usize {
        self.inner.as_ref().map_or(0, PackedTable::num_deleted)
    }

    pub fn free_space(&self) -> usize {
        self.inner.as_ref().map_or(0, PackedTable::free_space)
    }

    pub fn live_space(&self) -> usize {
        self.inner.as_ref().map_or(0, PackedTable::live_space)
    }

    pub fn deleted_space(&self) -> usize {
        self.inner.as_ref().map_or(0, PackedTable::deleted_space)
    }

    pub fn has(&self, key: &[u8]) -> bool {
        match &self.inner {
            Some(t) => t.has(key),
            None => false,
        }
    }

    pub fn get(&self, key: &[u8]) -> Option<&[u8]> {
        self.inner.as_ref()?.get(key)
    }

    pub fn put(&mut self, key: &[u8], val: &[u8]) -> Result<(), NoSpace> {
        match &mut self.inner {
            Some(t) => t.put(key, val),
            None => Ok(()),
        }
    }

    pub fn delete(&mut self, key: &[u8]) -> bool {
        match &mut self.inner {
            Some(t) => t.delete(key),
            None => false,
        }
    }
}

impl Drop for DiscardableTable {
    fn drop(&mut self) {
        self.dead.store(true, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_discard_marks_handle_dead() {
        let mut t = DiscardableTable::new(4096, 1).unwrap();
        let handle = t.handle();
        assert!(!handle.is_dead());
        assert_eq!(handle.generation(), 1);

        t.put(b"foo", b"bar").unwrap();
        t.discard();
        assert!(handle.is_dead());
        assert!(t.is_dead());

        // Dead tables answer the no-op branches.
        assert!(!t.has(b"foo"));
        assert_eq!(t.get(b"foo"), None);
        assert!(t.put(b"foo", b"baz").is_ok());
        assert!(!t.delete(b"foo"));
        assert_eq!(t.num_entries(), 0);
        assert_eq!(t.free_space(), 0);
    }

    #[test]
    fn test_recycle_transfers_region() {
        let mut t = DiscardableTable::new(4096, 1).unwrap();
        t.put(b"foo", b"bar").unwrap();
        let old_handle = t.handle();

        let recycled = t.recycle(2);
        assert!(old_handle.is_dead());
        assert!(!recycled.is_dead());
        assert_eq!(recycled.generation(), 2);
        assert_eq!(recycled.num_entries(), 0);
        assert_eq!(recycled.free_space(), 4096);
        assert!(!recycled.has(b"foo"));
    }

    #[test]
    fn test_drop_marks_handle_dead() {
        let t = DiscardableTable::new(4096, 3).unwrap();
        let handle = t.handle();
        drop(t);
        assert!(handle.is_dead());
    }

    #[test]
    #[should_panic(expected = "reset on discarded table")]
    fn test_reset_after_discard_panics() {
        let mut t = DiscardableTable::new(4096, 1).unwrap();
        t.discard();
        t.reset();
    }
}

//! # Packed Key/Value Table
//!
//! `PackedTable` stores key and value bytes contiguously inside a single
//! [`Region`]. The only data held outside the region is a hash index used to
//! locate entries.
//!
//! ## Design Goals
//!
//! The primary goals are to minimize heap fragmentation and to let the owner
//! instantly free all memory used by the table (the region unmaps in one
//! syscall). Entry bytes never touch the general-purpose allocator.
//!
//! ## Entry Layout
//!
//! Entries are appended at a monotonically advancing write cursor:
//!
//! ```text
//! +-----------+-----------+----------···+----------···+
//! | key size  | val size  |  key bytes  |  val bytes  |
//! |  u32 LE   |  u32 LE   |             |             |
//! +-----------+-----------+----------···+----------···+
//! ```
//!
//! The 1 GiB region cap keeps sizes below `1 << 30`, so the top two bits of
//! the key-size word stay reserved for flag use.
//!
//! ## Index
//!
//! The index is a hash table with linear-probed open addressing. Instead of
//! a dynamically sized slot array, a `u32`-keyed map stands in for a `2^32`
//! element array: a missing key is an empty slot (and terminates probing), a
//! value of `-1` is a tombstone (probing continues), and a non-negative
//! value is the byte offset of an entry whose stored key must be compared.
//! Probing advances the 32-bit hash by one, wrapping.
//!
//! ## Space Accounting
//!
//! Deleting an entry only tombstones it; the bytes are reclaimed by
//! compaction ([`PackedTable::gc`]), which replays the live entries in
//! offset order and packs them back to the front of the region. At every
//! observable point `live_space + free_space + deleted_space` equals the
//! region length.
//!
//! Note: `PackedTable` is not thread-safe; it relies on its single owner for
//! synchronization.

use std::hash::Hasher;

use hashbrown::HashMap;
use twox_hash::XxHash32;
use zerocopy::little_endian::U32;
use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout};

use crate::config::{ENTRY_PREFIX_LEN, KEY_SIZE_FLAG_MASK, MAX_REGION_SIZE};
use crate::storage::Region;

/// Recoverable "table is full" signal returned by [`PackedTable::put`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NoSpace {
    pub requested: usize,
    pub available: usize,
}

impl std::fmt::Display for NoSpace {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "insufficient space left: entry needs {} bytes but only {} are free",
            self.requested, self.available
        )
    }
}

impl std::error::Error for NoSpace {}

/// Size prefix preceding every entry in the region.
#[derive(FromBytes, IntoBytes, KnownLayout, Immutable)]
#[repr(C)]
struct EntryPrefix {
    key_size: U32,
    val_size: U32,
}

/// Default 32-bit key hash for the per-table index.
pub fn hash32(key: &[u8]) -> u32 {
    let mut hasher = XxHash32::with_seed(0);
    hasher.write(key);
    hasher.finish() as u32
}

/// A key/value table that packs all entry bytes into one region.
pub struct PackedTable {
    region: Region,
    auto_gc_threshold: usize,
    /// Next free byte in the region.
    off: usize,
    /// Sparse realization of a `2^32` slot array: key hash -> entry offset,
    /// with `-1` marking tombstoned slots.
    keys: HashMap<u32, i32>,
    hasher: fn(&[u8]) -> u32,

    added: usize,
    deleted: usize,
    deleted_space: usize,
}

impl PackedTable {
    /// Constructs an empty table storing entries in `region`.
    ///
    /// `auto_gc_threshold` is the number of bytes of deleted data the table
    /// tolerates before compacting itself; 0 disables automatic compaction.
    pub fn new(region: Region, auto_gc_threshold: usize) -> Self {
        Self::with_hasher(region, auto_gc_threshold, hash32)
    }

    /// Like [`PackedTable::new`] with an explicit key-hash function.
    pub fn with_hasher(
        region: Region,
        auto_gc_threshold: usize,
        hasher: fn(&[u8]) -> u32,
    ) -> Self {
        assert!(
            region.len() <= MAX_REGION_SIZE,
            "region length {} exceeds 1 GiB table cap",
            region.len()
        );

        Self {
            region,
            auto_gc_threshold,
            off: 0,
            keys: HashMap::new(),
            hasher,
            added: 0,
            deleted: 0,
            deleted_space: 0,
        }
    }

    /// Erases all entries, keeping the region.
    pub fn reset(&mut self) {
        self.off = 0;
        self.added = 0;
        self.deleted = 0;
        self.deleted_space = 0;
        self.keys.clear();
    }

    /// Consumes the table, handing its region to a new owner.
    pub fn into_region(self) -> Region {
        self.region
    }

    /// Space used by `key`/`val` when stored, prefix included.
    pub fn entry_size(key: &[u8], val: &[u8]) -> usize {
        key.len() + val.len() + ENTRY_PREFIX_LEN
    }

    /// Usable free bytes remaining in the region.
    pub fn free_space(&self) -> usize {
        self.region.len() - self.off
    }

    /// Bytes occupied by live entries.
    pub fn live_space(&self) -> usize {
        self.off - self.deleted_space
    }

    /// Bytes occupied by deleted entries, reclaimable through [`gc`].
    ///
    /// Note: `live_space + free_space + deleted_space` equals the region
    /// length.
    ///
    /// [`gc`]: PackedTable::gc
    pub fn deleted_space(&self) -> usize {
        self.deleted_space
    }

    pub fn num_entries(&self) -> usize {
        self.added - self.deleted
    }

    pub fn num_deleted(&self) -> usize {
        self.deleted
    }

    fn read_size(&self, off: usize) -> (usize, usize) {
        let buf = &self.region.as_slice()[off..off + ENTRY_PREFIX_LEN];
        let prefix =
            EntryPrefix::ref_from_bytes(buf).expect("entry prefix must parse at a valid offset");
        debug_assert_eq!(prefix.key_size.get() & KEY_SIZE_FLAG_MASK, 0);
        (prefix.key_size.get() as usize, prefix.val_size.get() as usize)
    }

    fn write_size(&mut self, key: usize, val: usize) -> usize {
        let off = self.off;
        let prefix = EntryPrefix {
            key_size: U32::new(key as u32),
            val_size: U32::new(val as u32),
        };
        self.region.as_mut_slice()[off..off + ENTRY_PREFIX_LEN]
            .copy_from_slice(prefix.as_bytes());
        self.off += ENTRY_PREFIX_LEN;
        off
    }

    /// Probes for `key`, returning the slot that either holds it already or
    /// is the first empty slot past any tombstones.
    fn hash_entry(&self, key: &[u8]) -> u32 {
        let mut hash = (self.hasher)(key);
        loop {
            match self.keys.get(&hash) {
                None => break,
                Some(&off) if off < 0 => {}
                Some(&off) => {
                    if self.entry_key_matches(off as usize, key) {
                        break;
                    }
                }
            }
            hash = hash.wrapping_add(1);
        }
        hash
    }

    /// Probes for `key`, returning its entry offset if present.
    fn find_key(&self, key: &[u8]) -> Option<usize> {
        let mut hash = (self.hasher)(key);
        loop {
            match self.keys.get(&hash) {
                None => return None,
                Some(&off) if off < 0 => {}
                Some(&off) => {
                    if self.entry_key_matches(off as usize, key) {
                        return Some(off as usize);
                    }
                }
            }
            hash = hash.wrapping_add(1);
        }
    }

    fn entry_key_matches(&self, off: usize, key: &[u8]) -> bool {
        let (key_size, _) = self.read_size(off);
        let key_off = off + ENTRY_PREFIX_LEN;
        key_size == key.len() && &self.region.as_slice()[key_off..key_off + key_size] == key
    }

    /// Returns whether the table contains `key`.
    pub fn has(&self, key: &[u8]) -> bool {
        assert!(!key.is_empty(), "zero-sized key");
        self.find_key(key).is_some()
    }

    /// Returns the value stored for `key`, if any.
    ///
    /// The slice borrows the table's region and is only valid until the next
    /// mutating call.
    pub fn get(&self, key: &[u8]) -> Option<&[u8]> {
        assert!(!key.is_empty(), "zero-sized key");

        let off = self.find_key(key)?;
        let (key_size, val_size) = self.read_size(off);
        let val_off = off + ENTRY_PREFIX_LEN + key_size;
        Some(&self.region.as_slice()[val_off..val_off + val_size])
    }

    /// Adds `key`/`val` to the table if there is sufficient free space.
    ///
    /// If the table already contains the key, the existing entry is deleted
    /// first (as if [`delete`] was called), then the new entry inserted.
    ///
    /// [`delete`]: PackedTable::delete
    pub fn put(&mut self, key: &[u8], val: &[u8]) -> Result<(), NoSpace> {
        assert!(!key.is_empty(), "zero-sized key");

        let hash = self.hash_entry(key);
        if let Some(&off) = self.keys.get(&hash) {
            if off >= 0 {
                self.delete_entry(hash, off as usize, false);
            }
        }

        let size = Self::entry_size(key, val);
        if size > self.free_space() {
            return Err(NoSpace {
                requested: size,
                available: self.free_space(),
            });
        }

        let off = self.write_size(key.len(), val.len());
        self.region.as_mut_slice()[self.off..self.off + key.len()].copy_from_slice(key);
        self.off += key.len();
        self.region.as_mut_slice()[self.off..self.off + val.len()].copy_from_slice(val);
        self.off += val.len();
        self.keys.insert(hash, off as i32);
        self.added += 1;
        Ok(())
    }

    /// Removes `key`, returning whether it existed.
    ///
    /// Deleting does not immediately free the entry's bytes; space is
    /// reclaimed once deleted bytes exceed the auto-GC threshold or a
    /// compaction is performed explicitly.
    pub fn delete(&mut self, key: &[u8]) -> bool {
        assert!(!key.is_empty(), "zero-sized key");

        let hash = self.hash_entry(key);
        match self.keys.get(&hash) {
            Some(&off) if off >= 0 => {
                self.delete_entry(hash, off as usize, true);
                true
            }
            _ => false,
        }
    }

    fn delete_entry(&mut self, hash: u32, off: usize, remove_slot: bool) {
        let (key_size, val_size) = self.read_size(off);
        if remove_slot {
            if self.keys.contains_key(&hash.wrapping_add(1)) {
                self.keys.insert(hash, -1);
            } else {
                self.keys.remove(&hash);
            }
        } else {
            // The slot is about to be reused for the replacement entry;
            // tombstone it so compaction skips the old bytes.
            self.keys.insert(hash, -1);
        }
        self.deleted += 1;
        self.deleted_space += key_size + val_size + ENTRY_PREFIX_LEN;
        self.auto_gc();
    }

    fn auto_gc(&mut self) {
        if self.auto_gc_threshold > 0 && self.deleted_space > self.auto_gc_threshold {
            self.gc();
        }
    }

    /// Compacts the table in place, reclaiming all deleted space.
    ///
    /// Live entries are replayed in offset order and packed back to the
    /// front of the region; index slots are rewritten to the new offsets.
    /// Tombstoned slots are retained so probe chains through collision runs
    /// stay intact.
    pub fn gc(&mut self) {
        if self.deleted == 0 {
            return;
        }

        let mut entries: Vec<(u32, i32)> = self
            .keys
            .iter()
            .filter(|(_, &off)| off >= 0)
            .map(|(&hash, &off)| (hash, off))
            .collect();
        entries.sort_unstable_by_key(|&(_, off)| off);

        self.added = 0;
        self.deleted = 0;
        self.deleted_space = 0;
        self.off = 0;
        let mut prev_off: i64 = -1;
        for (hash, off) in entries {
            let off = off as usize;
            assert!(off as i64 > prev_off, "entry offsets must be strictly increasing");
            assert!(off >= self.off, "read cursor fell behind write cursor");
            let (key_size, val_size) = self.read_size(off);
            let entry_size = key_size + val_size + ENTRY_PREFIX_LEN;
            self.region
                .as_mut_slice()
                .copy_within(off..off + entry_size, self.off);
            self.keys.insert(hash, self.off as i32);
            self.off += entry_size;
            self.added += 1;
            prev_off = off as i64;
        }
    }
}

//! # Cache Manager
//!
//! The cache manager owns a bounded, generation-ordered collection of
//! discardable tables and routes every operation through a global 64-bit
//! hash index with linear probing.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                           Cache                              │
//! │  ┌─────────────────────────────┐   ┌──────────────────────┐  │
//! │  │   Mutex<CacheInner>         │   │  background workers  │  │
//! │  │   tables: gen -> table      │   │  ┌────────────────┐  │  │
//! │  │   order: newest..oldest     │   │  │ memory watcher │  │  │
//! │  │   index: hash64 -> slot     │   │  └────────────────┘  │  │
//! │  │   changed: delta buffer     │   │  ┌────────────────┐  │  │
//! │  └─────────────────────────────┘   │  │ index sweeper  │  │  │
//! │                                    │  └────────────────┘  │  │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Locking Discipline
//!
//! A single mutex serializes every public operation and every background
//! mutation. Packed tables are only touched while it is held. Long external
//! work (the memory policy callback, sweep candidate preparation) happens
//! outside the lock; only short reconciliation steps reacquire it.
//!
//! ## Aging and Promotion
//!
//! Each table is tagged with a monotonically increasing generation number
//! at creation or recycle. Writes land in the newest tables, so a table's
//! generation is a proxy for the age of its entries; reclaiming memory by
//! discarding the oldest table approximates LRU eviction. Read hits in
//! sufficiently old tables are reinserted ("promoted") into a newer table
//! so hot keys survive eviction.
//!
//! ## Index States
//!
//! A global-index slot is either bound to a table, a probe-through marker,
//! or absent (see [`index`](self::index)). Slots bound to dead tables are
//! transparent to probing (the table answers "no"), and are reclaimed
//! asynchronously by the sweeper.

pub(crate) mod index;
pub(crate) mod sweeper;
pub(crate) mod watcher;

use std::collections::VecDeque;
use std::hash::Hasher;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use eyre::{ensure, Result, WrapErr};
use hashbrown::HashMap;
use parking_lot::Mutex;
use smallvec::SmallVec;
use twox_hash::XxHash64;

use crate::config::{
    CHANGED_KEYS_SOFT_LIMIT, DEFAULT_MAX_KEY_SIZE, DEFAULT_MAX_VAL_SIZE, DEFAULT_TABLE_SIZE,
    ENTRY_PREFIX_LEN, MAX_REGION_SIZE, PROMOTE_MIN_AGE, PUT_TABLE_SCAN, WATCHER_INTERVAL_MS,
};
use crate::memory::{available_memory, MemFunc};
use crate::table::{DiscardableTable, PackedTable};

use self::index::{IndexDelta, Slot, SlotChange, SweepHandoff};
use self::watcher::WatcherGate;

const MEGABYTE: i64 = 1024 * 1024;

/// Default 64-bit key hash for the global index.
pub fn hash64(key: &[u8]) -> u64 {
    let mut hasher = XxHash64::with_seed(0);
    hasher.write(key);
    hasher.finish()
}

/// Point-in-time counters exposed for monitoring and tests.
#[derive(Debug, Clone, Copy)]
pub struct CacheStats {
    /// Number of live tables.
    pub tables: usize,
    /// Current table budget.
    pub max_tables: usize,
    /// Number of populated global-index slots, probe-through included.
    pub index_entries: usize,
    /// Next table generation number.
    pub generation: u64,
}

/// State guarded by the cache's single mutex.
pub(crate) struct CacheInner {
    /// Live tables keyed by generation.
    pub(crate) tables: HashMap<u64, DiscardableTable>,
    /// Generations ordered front = newest, back = oldest.
    pub(crate) order: VecDeque<u64>,
    /// Global index: 64-bit key hash -> slot.
    pub(crate) index: HashMap<u64, Slot>,
    /// Index mutations not yet handed to the sweeper.
    pub(crate) changed: Vec<IndexDelta>,
    /// Next generation number. Overflow is fatal.
    pub(crate) count: u64,
    /// Dynamic table budget, recomputed each watcher tick.
    pub(crate) max_tables: usize,

    table_size: usize,
    max_key_size: usize,
    max_val_size: usize,
}

impl CacheInner {
    fn new(table_size: usize, max_key_size: usize, max_val_size: usize) -> Self {
        Self {
            tables: HashMap::new(),
            order: VecDeque::new(),
            index: HashMap::new(),
            changed: Vec::new(),
            count: 0,
            max_tables: 0,
            table_size,
            max_key_size,
            max_val_size,
        }
    }

    /// Empties the slot at `hash` without breaking probe chains, recording
    /// the mutation for the sweeper. Returns whether the slot was removed
    /// outright (as opposed to downgraded to probe-through).
    pub(crate) fn erase(&mut self, hash: u64) -> bool {
        if self.index.contains_key(&hash.wrapping_add(1)) {
            self.index.insert(hash, Slot::ProbeThrough);
            self.changed.push(IndexDelta {
                hash,
                change: SlotChange::ProbeThrough,
            });
            false
        } else {
            // No successor slot, so no probe can pass through here.
            self.index.remove(&hash);
            self.changed.push(IndexDelta {
                hash,
                change: SlotChange::Removed,
            });
            true
        }
    }

    fn has_with_hash(&self, key: &[u8], mut hash: u64) -> bool {
        loop {
            match self.index.get(&hash) {
                None => return false,
                Some(Slot::ProbeThrough) => {}
                Some(Slot::Present(table)) => {
                    if let Some(t) = self.tables.get(&table.generation()) {
                        if t.has(key) {
                            return true;
                        }
                    }
                }
            }
            hash = hash.wrapping_add(1);
        }
    }

    fn get_with_hash(&mut self, key: &[u8], key_hash: u64, out: &mut Vec<u8>) -> bool {
        let start = out.len();
        let mut hit: Option<u64> = None;
        let mut hash = key_hash;
        loop {
            match self.index.get(&hash) {
                None => break,
                Some(Slot::ProbeThrough) => {}
                Some(Slot::Present(table)) => {
                    let gen = table.generation();
                    if let Some(t) = self.tables.get(&gen) {
                        if let Some(val) = t.get(key) {
                            out.extend_from_slice(val);
                            hit = Some(gen);
                        }
                    }
                }
            }
            if hit.is_some() {
                break;
            }
            hash = hash.wrapping_add(1);
        }

        let Some(gen) = hit else {
            return false;
        };

        // Promote old keys to a newer table for LRU-like behaviour.
        let age = self.count - gen;
        if age > PROMOTE_MIN_AGE && age > self.order.len() as u64 / 2 {
            let val = out[start..].to_vec();
            self.put_with_hash(key, &val, key_hash);
        }
        true
    }

    fn put_with_hash(&mut self, key: &[u8], val: &[u8], hash: u64) {
        self.delete_with_hash(key, hash);

        if self.max_tables == 0 {
            return;
        }
        if key.len() > self.max_key_size || val.is_empty() || val.len() > self.max_val_size {
            return;
        }

        let entry_size = PackedTable::entry_size(key, val);
        let gen = match self.find_put_table(entry_size) {
            Some(gen) => gen,
            None => self.create_table(),
        };

        let table = self.tables.get_mut(&gen).expect("routed table must exist");
        if let Err(e) = table.put(key, val) {
            panic!("table routed by free space rejected entry: {e}");
        }
        let handle = table.handle();

        let mut slot = hash;
        while self.index.contains_key(&slot) {
            slot = slot.wrapping_add(1);
        }
        self.index.insert(slot, Slot::Present(handle.clone()));
        self.changed.push(IndexDelta {
            hash: slot,
            change: SlotChange::Present(handle),
        });
    }

    fn delete_with_hash(&mut self, key: &[u8], mut hash: u64) {
        enum Step {
            Stop,
            Erase,
            Next,
            Deleted(u64),
        }

        loop {
            let step = match self.index.get(&hash) {
                None => Step::Stop,
                Some(Slot::ProbeThrough) => Step::Erase,
                Some(Slot::Present(table)) => match self.tables.get_mut(&table.generation()) {
                    None => Step::Erase,
                    Some(t) => {
                        if t.delete(key) {
                            Step::Deleted(table.generation())
                        } else {
                            Step::Next
                        }
                    }
                },
            };

            match step {
                Step::Stop => break,
                Step::Erase => {
                    self.erase(hash);
                }
                Step::Next => {}
                Step::Deleted(gen) => {
                    self.erase(hash);
                    self.compact_after_delete(gen);
                    // Keys are unique across tables, so stop here.
                    break;
                }
            }
            hash = hash.wrapping_add(1);
        }
    }

    /// If the delete emptied the table, reclaim all its bytes in O(1) and
    /// move it to the back of the list so it becomes the next recycle
    /// candidate.
    fn compact_after_delete(&mut self, gen: u64) {
        let Some(table) = self.tables.get_mut(&gen) else {
            return;
        };
        if table.num_entries() != 0 {
            return;
        }
        table.reset();
        if let Some(pos) = self.order.iter().position(|&g| g == gen) {
            if let Some(g) = self.order.remove(pos) {
                self.order.push_back(g);
            }
        }
    }

    /// Best-fit scan over the newest tables: among those with room for the
    /// entry, pick the one with the least free space.
    fn find_put_table(&self, entry_size: usize) -> Option<u64> {
        let candidates: SmallVec<[(u64, usize); PUT_TABLE_SCAN]> = self
            .order
            .iter()
            .take(PUT_TABLE_SCAN)
            .filter_map(|&gen| {
                let free = self.tables.get(&gen)?.free_space();
                (free >= entry_size).then_some((gen, free))
            })
            .collect();
        candidates
            .into_iter()
            .min_by_key(|&(_, free)| free)
            .map(|(gen, _)| gen)
    }

    /// Creates a table at the front of the list, recycling the back-most
    /// table's region when that table is empty or the cache is at its
    /// budget.
    fn create_table(&mut self) -> u64 {
        let gen = self.next_generation();

        let recycle = match self.order.back() {
            Some(back_gen) => {
                let back = self.tables.get(back_gen).expect("ordered table must exist");
                back.num_entries() == 0 || self.order.len() >= self.max_tables
            }
            None => false,
        };

        let table = if recycle {
            let back_gen = self.order.pop_back().expect("checked non-empty");
            let old = self
                .tables
                .remove(&back_gen)
                .expect("ordered table must exist");
            old.recycle(gen)
        } else {
            match DiscardableTable::new(self.table_size, gen) {
                Ok(table) => table,
                Err(e) => panic!("anonymous region acquisition failed: {e}"),
            }
        };

        self.tables.insert(gen, table);
        self.order.push_front(gen);
        gen
    }

    fn next_generation(&mut self) -> u64 {
        let gen = self.count;
        self.count = self
            .count
            .checked_add(1)
            .expect("table generation counter overflow");
        gen
    }

    /// Enforces the table budget. Returns whether any non-empty table was
    /// discarded, in which case stale index slots now exist and a sweep
    /// should be requested.
    pub(crate) fn downsize(&mut self) -> bool {
        // First pass: tables emptied by deletions cost memory for nothing.
        let empties: SmallVec<[u64; 8]> = self
            .order
            .iter()
            .copied()
            .filter(|gen| self.tables.get(gen).is_some_and(|t| t.num_entries() == 0))
            .collect();
        for gen in &empties {
            self.order.retain(|g| g != gen);
            let mut table = self.tables.remove(gen).expect("ordered table must exist");
            table.discard();
        }

        // Second pass: drop the oldest tables until the budget fits.
        let mut swept_stale = false;
        while self.order.len() > self.max_tables {
            let gen = self.order.pop_back().expect("checked non-empty");
            let mut table = self.tables.remove(&gen).expect("ordered table must exist");
            if table.num_entries() > 0 {
                swept_stale = true;
            }
            table.discard();
        }
        swept_stale
    }
}

/// State shared between the public handle and the background workers.
pub(crate) struct Shared {
    pub(crate) inner: Mutex<CacheInner>,
    pub(crate) handoff: SweepHandoff,
    pub(crate) watcher_gate: WatcherGate,
    pub(crate) table_size: usize,
    max_key_size: usize,
    max_val_size: usize,
    hash_fn: fn(&[u8]) -> u64,
}

impl Shared {
    /// Hands the pending delta buffer to the sweeper and asks for a
    /// reconciliation pass.
    pub(crate) fn request_sweep(&self) {
        let batch = std::mem::take(&mut self.inner.lock().changed);
        self.handoff.submit(batch, true);
    }
}

/// Builder for configuring and opening a [`Cache`].
pub struct CacheBuilder {
    table_size: usize,
    max_key_size: usize,
    max_val_size: usize,
    mem_func: Option<MemFunc>,
    hash_fn: fn(&[u8]) -> u64,
    watcher_interval: Duration,
}

impl Default for CacheBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl CacheBuilder {
    pub fn new() -> Self {
        Self {
            table_size: DEFAULT_TABLE_SIZE,
            max_key_size: DEFAULT_MAX_KEY_SIZE,
            max_val_size: DEFAULT_MAX_VAL_SIZE,
            mem_func: None,
            hash_fn: hash64,
            watcher_interval: Duration::from_millis(WATCHER_INTERVAL_MS),
        }
    }

    /// Size of each table region in bytes. Default 4 MiB.
    pub fn table_size(mut self, bytes: usize) -> Self {
        self.table_size = bytes;
        self
    }

    /// Largest accepted key, in bytes. Default 1024.
    pub fn max_key_size(mut self, bytes: usize) -> Self {
        self.max_key_size = bytes;
        self
    }

    /// Largest accepted value, in bytes. Default 1 MiB.
    pub fn max_val_size(mut self, bytes: usize) -> Self {
        self.max_val_size = bytes;
        self
    }

    /// Memory policy consulted each watcher tick. Defaults to
    /// [`available_memory`] with a 512 MiB reserve.
    pub fn mem_func(mut self, mem_func: MemFunc) -> Self {
        self.mem_func = Some(mem_func);
        self
    }

    /// Overrides the global key-hash function. Intended for tests.
    pub fn hash_fn(mut self, hash_fn: fn(&[u8]) -> u64) -> Self {
        self.hash_fn = hash_fn;
        self
    }

    /// Interval between memory-watcher ticks. Default 1 s.
    pub fn watcher_interval(mut self, interval: Duration) -> Self {
        self.watcher_interval = interval;
        self
    }

    /// Validates the configuration, spawns the background workers, and
    /// returns the cache.
    pub fn open(self) -> Result<Cache> {
        ensure!(self.table_size > 0, "table size must be non-zero");
        ensure!(
            self.table_size <= MAX_REGION_SIZE,
            "table size {} exceeds maximum region size {}",
            self.table_size,
            MAX_REGION_SIZE
        );
        ensure!(
            self.max_key_size >= 1 && self.max_val_size >= 1,
            "key and value size limits must be at least 1"
        );
        ensure!(
            self.max_key_size + self.max_val_size + ENTRY_PREFIX_LEN <= self.table_size,
            "a maximum-size entry ({} + {} bytes) must fit in one table ({} bytes)",
            self.max_key_size,
            self.max_val_size,
            self.table_size
        );

        let mut mem_func = self
            .mem_func
            .unwrap_or_else(|| available_memory(512 * MEGABYTE, 1.0));

        let mut inner = CacheInner::new(self.table_size, self.max_key_size, self.max_val_size);
        // Prime the budget so writes before the first watcher tick are
        // admitted.
        let target = mem_func(0).max(0) as u64;
        inner.max_tables = (target / self.table_size as u64) as usize;

        let shared = Arc::new(Shared {
            inner: Mutex::new(inner),
            handoff: SweepHandoff::new(),
            watcher_gate: WatcherGate::new(),
            table_size: self.table_size,
            max_key_size: self.max_key_size,
            max_val_size: self.max_val_size,
            hash_fn: self.hash_fn,
        });

        let watcher_shared = Arc::clone(&shared);
        let interval = self.watcher_interval;
        let watcher = thread::Builder::new()
            .name("remora-memwatch".into())
            .spawn(move || watcher::run(&watcher_shared, mem_func, interval))
            .wrap_err("failed to spawn memory watcher thread")?;

        let sweeper_shared = Arc::clone(&shared);
        let sweeper = thread::Builder::new()
            .name("remora-sweep".into())
            .spawn(move || sweeper::run(&sweeper_shared))
            .wrap_err("failed to spawn index sweeper thread")?;

        Ok(Cache {
            shared,
            watcher: Some(watcher),
            sweeper: Some(sweeper),
        })
    }
}

/// An opportunistic in-memory key/value cache.
///
/// All operations are safe to call concurrently; a single internal mutex
/// serializes them. Dropping the cache stops the background workers and
/// releases every table region.
pub struct Cache {
    shared: Arc<Shared>,
    watcher: Option<JoinHandle<()>>,
    sweeper: Option<JoinHandle<()>>,
}

impl Cache {
    pub fn builder() -> CacheBuilder {
        CacheBuilder::new()
    }

    pub fn min_key_size(&self) -> usize {
        1
    }

    pub fn max_key_size(&self) -> usize {
        self.shared.max_key_size
    }

    pub fn min_val_size(&self) -> usize {
        1
    }

    pub fn max_val_size(&self) -> usize {
        self.shared.max_val_size
    }

    /// Returns whether the cache currently holds `key`.
    pub fn has(&self, key: &[u8]) -> bool {
        assert!(!key.is_empty(), "zero-sized key");
        let hash = (self.shared.hash_fn)(key);
        self.shared.inner.lock().has_with_hash(key, hash)
    }

    /// Looks up `key`, appending the value bytes to `out` on a hit.
    ///
    /// The bytes are copied out under the cache lock; `out` is untouched on
    /// a miss.
    pub fn get(&self, key: &[u8], out: &mut Vec<u8>) -> bool {
        assert!(!key.is_empty(), "zero-sized key");
        let hash = (self.shared.hash_fn)(key);
        let (found, need_sweep) = {
            let mut inner = self.shared.inner.lock();
            let found = inner.get_with_hash(key, hash, out);
            (found, inner.changed.len() > CHANGED_KEYS_SOFT_LIMIT)
        };
        if need_sweep {
            self.shared.request_sweep();
        }
        found
    }

    /// Stores `key`/`val`, replacing any existing entry.
    ///
    /// Writes whose key or value falls outside the configured size bounds
    /// are silently dropped, as is everything while the table budget is
    /// zero.
    pub fn put(&self, key: &[u8], val: &[u8]) {
        assert!(!key.is_empty(), "zero-sized key");
        let hash = (self.shared.hash_fn)(key);
        let need_sweep = {
            let mut inner = self.shared.inner.lock();
            inner.put_with_hash(key, val, hash);
            inner.changed.len() > CHANGED_KEYS_SOFT_LIMIT
        };
        if need_sweep {
            self.shared.request_sweep();
        }
    }

    /// Removes `key` if present.
    pub fn delete(&self, key: &[u8]) {
        assert!(!key.is_empty(), "zero-sized key");
        let hash = (self.shared.hash_fn)(key);
        let need_sweep = {
            let mut inner = self.shared.inner.lock();
            inner.delete_with_hash(key, hash);
            inner.changed.len() > CHANGED_KEYS_SOFT_LIMIT
        };
        if need_sweep {
            self.shared.request_sweep();
        }
    }

    /// Point-in-time counters.
    pub fn stats(&self) -> CacheStats {
        let inner = self.shared.inner.lock();
        CacheStats {
            tables: inner.order.len(),
            max_tables: inner.max_tables,
            index_entries: inner.index.len(),
            generation: inner.count,
        }
    }
}

impl Drop for Cache {
    fn drop(&mut self) {
        self.shared.watcher_gate.shutdown();
        self.shared.handoff.shutdown();
        if let Some(watcher) = self.watcher.take() {
            let _ = watcher.join();
        }
        if let Some(sweeper) = self.sweeper.take() {
            let _ = sweeper.join();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::constant_memory;

    fn test_cache(budget_tables: i64, table_size: usize) -> Cache {
        Cache::builder()
            .table_size(table_size)
            .max_key_size(64)
            .max_val_size(1024)
            .mem_func(constant_memory(budget_tables * table_size as i64))
            .watcher_interval(Duration::from_secs(3600))
            .open()
            .unwrap()
    }

    fn get_string(cache: &Cache, key: &str) -> Option<String> {
        let mut buf = Vec::new();
        cache
            .get(key.as_bytes(), &mut buf)
            .then(|| String::from_utf8(buf).unwrap())
    }

    #[test]
    fn test_overwrite_roundtrip() {
        let cache = test_cache(4, 4096);

        cache.put(b"foo", b"hello");
        assert_eq!(get_string(&cache, "foo").as_deref(), Some("hello"));

        cache.put(b"foo", b"world");
        assert_eq!(get_string(&cache, "foo").as_deref(), Some("world"));

        cache.delete(b"foo");
        assert!(!cache.has(b"foo"));
        assert_eq!(get_string(&cache, "foo"), None);
    }

    #[test]
    fn test_hash_collisions() {
        fn designated_random_number(_: &[u8]) -> u64 {
            7
        }
        let cache = Cache::builder()
            .table_size(4096)
            .max_key_size(64)
            .max_val_size(1024)
            .mem_func(constant_memory(4 * 4096))
            .hash_fn(designated_random_number)
            .watcher_interval(Duration::from_secs(3600))
            .open()
            .unwrap();

        assert!(!cache.has(b"foo"));
        assert!(!cache.has(b"bar"));
        assert!(!cache.has(b"baz"));

        cache.put(b"foo", b"11");
        cache.put(b"bar", b"22");
        assert!(cache.has(b"foo"));
        assert!(cache.has(b"bar"));
        assert!(!cache.has(b"baz"));
        assert_eq!(get_string(&cache, "foo").as_deref(), Some("11"));
        assert_eq!(get_string(&cache, "bar").as_deref(), Some("22"));
        assert_eq!(get_string(&cache, "baz"), None);

        cache.delete(b"foo");
        assert!(!cache.has(b"foo"));
        assert!(cache.has(b"bar"));
        assert!(!cache.has(b"baz"));

        cache.put(b"baz", b"33");
        cache.put(b"foo", b"44");
        assert_eq!(get_string(&cache, "foo").as_deref(), Some("44"));
        assert_eq!(get_string(&cache, "bar").as_deref(), Some("22"));
        assert_eq!(get_string(&cache, "baz").as_deref(), Some("33"));

        cache.delete(b"baz");
        cache.delete(b"foo");
        assert!(!cache.has(b"foo"));
        assert!(cache.has(b"bar"));
        assert!(!cache.has(b"baz"));
    }

    #[test]
    fn test_out_of_bounds_writes_dropped() {
        let cache = test_cache(4, 4096);

        cache.put(&[b'k'; 65], b"val");
        assert!(!cache.has(&[b'k'; 65]));

        cache.put(b"key", &[0u8; 1025]);
        assert!(!cache.has(b"key"));

        cache.put(b"key", b"");
        assert!(!cache.has(b"key"));

        // An out-of-bounds overwrite still deletes the old entry.
        cache.put(b"key", b"val");
        assert!(cache.has(b"key"));
        cache.put(b"key", &[0u8; 1025]);
        assert!(!cache.has(b"key"));
    }

    #[test]
    fn test_zero_budget_drops_writes() {
        let cache = test_cache(0, 4096);
        cache.put(b"foo", b"bar");
        assert!(!cache.has(b"foo"));
        assert_eq!(cache.stats().tables, 0);
    }

    #[test]
    fn test_spills_into_multiple_tables() {
        let cache = test_cache(8, 4096);

        let val = [0u8; 512];
        for i in 0..40u32 {
            cache.put(format!("key-{i:04}").as_bytes(), &val);
        }

        let stats = cache.stats();
        assert!(stats.tables > 1, "expected multiple tables, got {}", stats.tables);
        assert!(stats.tables <= stats.max_tables);

        // Every key is in exactly one table.
        let inner = cache.shared.inner.lock();
        for i in 0..40u32 {
            let key = format!("key-{i:04}");
            let holders = inner
                .tables
                .values()
                .filter(|t| t.has(key.as_bytes()))
                .count();
            assert_eq!(holders, 1, "key {key} held by {holders} tables");
        }
    }

    #[test]
    fn test_promotion_moves_old_keys_forward() {
        let cache = test_cache(16, 4096);

        cache.put(b"old-key", b"old-value");
        let old_gen = {
            let inner = cache.shared.inner.lock();
            *inner
                .tables
                .iter()
                .find(|(_, t)| t.has(b"old-key"))
                .map(|(gen, _)| gen)
                .unwrap()
        };

        // Push enough data to create a deep stack of newer tables.
        let val = [0u8; 512];
        for i in 0..80u32 {
            cache.put(format!("fill-{i:04}").as_bytes(), &val);
        }
        let stats = cache.stats();
        let age = stats.generation - old_gen;
        assert!(age > PROMOTE_MIN_AGE && age > stats.tables as u64 / 2);

        assert_eq!(get_string(&cache, "old-key").as_deref(), Some("old-value"));

        let new_gen = {
            let inner = cache.shared.inner.lock();
            *inner
                .tables
                .iter()
                .find(|(_, t)| t.has(b"old-key"))
                .map(|(gen, _)| gen)
                .unwrap()
        };
        assert!(new_gen > old_gen, "key not promoted: {new_gen} <= {old_gen}");
        assert_eq!(get_string(&cache, "old-key").as_deref(), Some("old-value"));
    }

    #[test]
    fn test_stats_track_index_entries() {
        let cache = test_cache(4, 4096);
        assert_eq!(cache.stats().index_entries, 0);

        cache.put(b"a", b"1");
        cache.put(b"b", b"2");
        assert_eq!(cache.stats().index_entries, 2);

        cache.delete(b"a");
        assert_eq!(cache.stats().index_entries, 1);
    }

    #[test]
    #[should_panic(expected = "zero-sized key")]
    fn test_zero_key_panics() {
        let cache = test_cache(1, 4096);
        cache.put(b"", b"val");
    }

    #[test]
    fn test_builder_rejects_undersized_tables() {
        let result = Cache::builder()
            .table_size(1024)
            .max_key_size(1024)
            .max_val_size(1024)
            .open();
        assert!(result.is_err());
    }
}

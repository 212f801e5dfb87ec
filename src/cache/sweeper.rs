//! # Index Sweeper
//!
//! Background worker that reconciles the global index with table discards.
//! Discarding or recycling a table leaves index slots bound to a dead
//! table; reads and deletes pass over such slots transparently, but the
//! slots themselves linger until something erases them. Doing that scan
//! inline would hold the cache lock for the whole index, so the sweeper
//! does it optimistically instead:
//!
//! 1. Merge the latest batch of index deltas into a private copy of the
//!    index, maintained incrementally across batches.
//! 2. Scan the copy, without any lock, for slots that are probe-through or
//!    bound to a dead table (the per-table dead flag is an atomic readable
//!    lock-free), collecting up to a bounded number of candidates.
//! 3. Take the cache lock and re-read each candidate from the authoritative
//!    index; only slots that are still stale are erased.
//!
//! A false negative (missing a stale slot this round) is benign, it will be
//! caught by a later pass. A false positive is impossible because of the
//! re-check under the lock. A full candidate batch immediately requests a
//! follow-up sweep.

use std::time::Duration;

use hashbrown::HashMap;
use tracing::debug;

use crate::cache::index::{IndexDelta, Slot, SlotChange};
use crate::cache::Shared;
use crate::config::{SWEEP_CANDIDATE_LIMIT, SWEEP_FALLBACK_INTERVAL_MS};
use crate::table::TableRef;

/// Sweeper-private view of one index slot.
#[derive(Clone, Debug)]
pub(crate) enum CopySlot {
    Present(TableRef),
    ProbeThrough,
}

/// Applies a delta batch to the sweeper's private index copy.
pub(crate) fn merge_batch(copy: &mut HashMap<u64, CopySlot>, batch: Vec<IndexDelta>) {
    for delta in batch {
        match delta.change {
            SlotChange::Removed => {
                copy.remove(&delta.hash);
            }
            SlotChange::ProbeThrough => {
                copy.insert(delta.hash, CopySlot::ProbeThrough);
            }
            SlotChange::Present(table) => {
                copy.insert(delta.hash, CopySlot::Present(table));
            }
        }
    }
}

/// Collects up to [`SWEEP_CANDIDATE_LIMIT`] slots that look stale: emptied
/// probe-through slots and slots bound to a table whose dead flag is set.
pub(crate) fn collect_candidates(copy: &HashMap<u64, CopySlot>) -> Vec<u64> {
    copy.iter()
        .filter(|(_, slot)| match slot {
            CopySlot::ProbeThrough => true,
            CopySlot::Present(table) => table.is_dead(),
        })
        .map(|(&hash, _)| hash)
        .take(SWEEP_CANDIDATE_LIMIT)
        .collect()
}

/// Sweeper loop body. Runs until shutdown.
pub(crate) fn run(shared: &Shared) {
    let fallback = Duration::from_millis(SWEEP_FALLBACK_INTERVAL_MS);
    let mut copy: HashMap<u64, CopySlot> = HashMap::new();

    loop {
        let (batch, _requested, shutdown) = shared.handoff.wait(fallback);
        if shutdown {
            break;
        }
        merge_batch(&mut copy, batch);

        let candidates = collect_candidates(&copy);
        if candidates.is_empty() {
            continue;
        }
        let full_batch = candidates.len() >= SWEEP_CANDIDATE_LIMIT;

        let mut erased = 0usize;
        {
            let mut inner = shared.inner.lock();
            for &hash in &candidates {
                let stale = match inner.index.get(&hash) {
                    Some(Slot::ProbeThrough) => true,
                    Some(Slot::Present(table)) => !inner.tables.contains_key(&table.generation()),
                    None => {
                        // Already gone; forget our stale view of it.
                        copy.remove(&hash);
                        false
                    }
                };
                if stale {
                    if inner.erase(hash) {
                        copy.remove(&hash);
                    } else {
                        copy.insert(hash, CopySlot::ProbeThrough);
                    }
                    erased += 1;
                }
            }
        }

        debug!(
            candidates = candidates.len(),
            erased, "swept stale index slots"
        );

        if full_batch {
            shared.request_sweep();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::table::DiscardableTable;

    fn live_ref(gen: u64) -> (DiscardableTable, TableRef) {
        let table = DiscardableTable::new(4096, gen).unwrap();
        let handle = table.handle();
        (table, handle)
    }

    #[test]
    fn test_merge_batch_applies_states() {
        let (_t, handle) = live_ref(1);
        let mut copy = HashMap::new();

        merge_batch(
            &mut copy,
            vec![
                IndexDelta {
                    hash: 10,
                    change: SlotChange::Present(handle.clone()),
                },
                IndexDelta {
                    hash: 11,
                    change: SlotChange::ProbeThrough,
                },
            ],
        );
        assert_eq!(copy.len(), 2);
        assert!(matches!(copy.get(&10), Some(CopySlot::Present(_))));
        assert!(matches!(copy.get(&11), Some(CopySlot::ProbeThrough)));

        merge_batch(
            &mut copy,
            vec![IndexDelta {
                hash: 10,
                change: SlotChange::Removed,
            }],
        );
        assert!(!copy.contains_key(&10));
    }

    #[test]
    fn test_collect_candidates_flags_dead_and_probe_through() {
        let (live_table, live) = live_ref(1);
        let (mut dead_table, dead) = live_ref(2);
        dead_table.discard();
        let _keep = live_table;

        let mut copy = HashMap::new();
        copy.insert(1, CopySlot::Present(live));
        copy.insert(2, CopySlot::Present(dead));
        copy.insert(3, CopySlot::ProbeThrough);

        let mut candidates = collect_candidates(&copy);
        candidates.sort_unstable();
        assert_eq!(candidates, vec![2, 3]);
    }

    #[test]
    fn test_collect_candidates_respects_limit() {
        let mut copy = HashMap::new();
        for hash in 0..(SWEEP_CANDIDATE_LIMIT as u64 + 500) {
            copy.insert(hash, CopySlot::ProbeThrough);
        }
        assert_eq!(collect_candidates(&copy).len(), SWEEP_CANDIDATE_LIMIT);
    }
}

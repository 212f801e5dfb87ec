//! # Global Index Types
//!
//! The cache routes every key through a single index keyed by a 64-bit key
//! hash, realized as a sparse map with linear probing. A slot is in one of
//! three states:
//!
//! - **present**: bound to a specific table (a [`TableRef`] handle),
//! - **probe-through**: emptied of its binding but retained so linear
//!   probing does not terminate early,
//! - **absent**: no map entry at all, which terminates probing.
//!
//! A fourth state, the **removed** marker, exists only inside the delta
//! stream handed to the sweeper: it tells the sweeper's index copy that a
//! slot was erased outright.

use parking_lot::{Condvar, Mutex};
use std::time::Duration;

use crate::table::TableRef;

/// One slot of the global hash index.
#[derive(Clone, Debug)]
pub(crate) enum Slot {
    /// The key hashing here (or probing through here) lives in this table.
    Present(TableRef),
    /// Emptied slot that must not break a probe chain.
    ProbeThrough,
}

/// State a slot changed to, as recorded in the sweeper delta stream.
#[derive(Clone, Debug)]
pub(crate) enum SlotChange {
    Present(TableRef),
    ProbeThrough,
    /// The slot was removed from the index entirely.
    Removed,
}

/// A single recorded index mutation.
#[derive(Clone, Debug)]
pub(crate) struct IndexDelta {
    pub hash: u64,
    pub change: SlotChange,
}

/// Single-slot handoff between the cache manager and the sweeper.
///
/// Mutation batches coalesce into any pending batch; the sweeper drains the
/// whole thing on each wake-up.
pub(crate) struct SweepHandoff {
    state: Mutex<HandoffState>,
    cond: Condvar,
}

struct HandoffState {
    batch: Vec<IndexDelta>,
    sweep_requested: bool,
    shutdown: bool,
}

impl SweepHandoff {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(HandoffState {
                batch: Vec::new(),
                sweep_requested: false,
                shutdown: false,
            }),
            cond: Condvar::new(),
        }
    }

    /// Coalesces `batch` into the pending batch, optionally flagging that a
    /// reconciliation pass should run.
    pub fn submit(&self, batch: Vec<IndexDelta>, request_sweep: bool) {
        let mut state = self.state.lock();
        if state.batch.is_empty() {
            state.batch = batch;
        } else {
            state.batch.extend(batch);
        }
        if request_sweep {
            state.sweep_requested = true;
        }
        self.cond.notify_one();
    }

    /// Blocks until a sweep is requested, shutdown is signalled, or
    /// `fallback` elapses; returns the drained batch and the flags.
    pub fn wait(&self, fallback: Duration) -> (Vec<IndexDelta>, bool, bool) {
        let mut state = self.state.lock();
        if !state.sweep_requested && !state.shutdown {
            let _ = self.cond.wait_for(&mut state, fallback);
        }
        let batch = std::mem::take(&mut state.batch);
        let requested = state.sweep_requested;
        state.sweep_requested = false;
        (batch, requested, state.shutdown)
    }

    pub fn shutdown(&self) {
        self.state.lock().shutdown = true;
        self.cond.notify_all();
    }
}

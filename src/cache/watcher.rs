//! # Memory Watcher
//!
//! Background worker that keeps the cache's table budget in step with what
//! the host can spare. Each tick it snapshots current usage under the cache
//! lock, consults the caller-supplied [`MemFunc`] outside the lock (the
//! policy may read `/proc/meminfo` or otherwise block), then reacquires the
//! lock to install the new budget and downsize.
//!
//! Downsizing discards empty tables first, then pops the oldest tables
//! until the count fits the budget. Discarding a non-empty table leaves
//! stale global-index slots behind, so that case requests a sweep.
//!
//! [`MemFunc`]: crate::memory::MemFunc

use std::time::Duration;

use parking_lot::{Condvar, Mutex};
use tracing::debug;

use crate::cache::Shared;
use crate::memory::MemFunc;

/// Interruptible sleep used by the watcher loop; `shutdown` wakes it
/// immediately.
pub(crate) struct WatcherGate {
    shutdown: Mutex<bool>,
    cond: Condvar,
}

impl WatcherGate {
    pub fn new() -> Self {
        Self {
            shutdown: Mutex::new(false),
            cond: Condvar::new(),
        }
    }

    /// Sleeps for `interval` or until shutdown; returns whether shutdown
    /// was signalled.
    pub fn sleep(&self, interval: Duration) -> bool {
        let mut shutdown = self.shutdown.lock();
        if !*shutdown {
            let _ = self.cond.wait_for(&mut shutdown, interval);
        }
        *shutdown
    }

    pub fn shutdown(&self) {
        *self.shutdown.lock() = true;
        self.cond.notify_all();
    }
}

/// Watcher loop body. Runs one tick per interval until shutdown.
pub(crate) fn run(shared: &Shared, mut mem_func: MemFunc, interval: Duration) {
    loop {
        if shared.watcher_gate.sleep(interval) {
            break;
        }

        let usage = shared.inner.lock().order.len() * shared.table_size;
        // The policy may block; keep the cache unlocked while it runs.
        let target = mem_func(usage as i64).max(0) as u64;

        let (tables, max_tables, swept_stale) = {
            let mut inner = shared.inner.lock();
            inner.max_tables = (target / shared.table_size as u64) as usize;
            let swept_stale = inner.downsize();
            (inner.order.len(), inner.max_tables, swept_stale)
        };

        debug!(usage, target, tables, max_tables, "memory watcher tick");

        if swept_stale {
            shared.request_sweep();
        }
    }
}

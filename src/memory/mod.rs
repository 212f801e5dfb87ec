//! # Memory Budget Policies
//!
//! The cache does not decide how much memory it may use; the embedding
//! application does, through a [`MemFunc`] callback. Once per watcher tick
//! the cache reports its current table bytes and receives a target byte
//! budget back, which it converts into a table count and enforces by
//! discarding tables.
//!
//! Two standard policies are provided:
//!
//! - [`constant_memory`]: a fixed byte budget.
//! - [`available_memory`]: size the cache to the host's free-memory
//!   envelope, minus a reserve.
//!
//! ## Why usage is part of the availability computation
//!
//! The available-memory policy computes
//! `(available + usage - min_free) * max_utilization`. Including current
//! usage matters: the cache conceptually should only occupy memory nobody
//! else wants, so the budget has to be derived from what would be available
//! if the cache gave everything back. With utilization set to 70% and the
//! cache holding 1G against 1G available, the true envelope is 2G and the
//! budget 1.4G. If the host then drops to 0.1G available, the envelope is
//! 1.1G and the budget 0.77G, correctly forcing a shrink; a computation
//! based on the kernel's availability figure alone would conclude 1.07G and
//! never release anything.
//!
//! The signature works in `i64` so a deficit can go negative before the
//! watcher clamps it.

use sysinfo::System;

/// Callback mapping current cache usage (bytes) to a target budget (bytes).
///
/// Invoked once per watcher tick, outside the cache lock. A non-positive
/// return shrinks the cache to zero tables.
pub type MemFunc = Box<dyn FnMut(i64) -> i64 + Send>;

/// A policy that always returns the same byte budget.
pub fn constant_memory(bytes: i64) -> MemFunc {
    Box::new(move |_usage| bytes)
}

/// A policy that sizes the cache to all memory the host can spare.
///
/// `min_free` is the number of bytes that should be kept available for
/// other workloads; `max_utilization` is the fraction of the spare envelope
/// the cache may occupy.
pub fn available_memory(min_free: i64, max_utilization: f64) -> MemFunc {
    let mut sys = System::new();
    Box::new(move |usage| {
        sys.refresh_memory();
        let available = sys.available_memory() as i64;
        ((available + usage - min_free) as f64 * max_utilization) as i64
    })
}

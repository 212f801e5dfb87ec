//! # Table Module
//!
//! Packed key/value tables and the discardable wrapper the cache manager
//! stacks on top of them.
//!
//! A [`PackedTable`] keeps every entry byte inside one anonymous region and
//! locates entries through a linear-probed hash index. A
//! [`DiscardableTable`] adds the lifecycle the cache needs: a lock-free
//! liveness flag, whole-table discard that returns the region to the OS,
//! and recycling that hands a region from a retiring table to its
//! replacement.
//!
//! ## Module Organization
//!
//! - `packed`: Entry storage, probing, deletion, compaction (`PackedTable`)
//! - `discardable`: Region lifecycle and liveness (`DiscardableTable`,
//!   `TableRef`)

mod discardable;
mod packed;

pub use discardable::{DiscardableTable, TableRef};
pub use packed::{hash32, NoSpace, PackedTable};

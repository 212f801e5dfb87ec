//! # Remora - Opportunistic In-Memory Cache
//!
//! Remora is an in-memory key/value cache built to be colocated with other
//! workloads on a shared host. Unlike a conventional cache, its footprint is
//! a guest, not a tenant: it continuously watches host memory availability
//! and grows or shrinks to fit the free-memory envelope, returning memory to
//! the operating system quickly and deterministically instead of holding it
//! hostage in heap fragmentation.
//!
//! ## Quick Start
//!
//! ```ignore
//! use remora::{available_memory, Cache};
//!
//! let cache = Cache::builder()
//!     .mem_func(available_memory(512 * 1024 * 1024, 1.0))
//!     .open()?;
//!
//! cache.put(b"foo", b"hello");
//! let mut buf = Vec::new();
//! if cache.get(b"foo", &mut buf) {
//!     assert_eq!(buf, b"hello");
//! }
//! cache.delete(b"foo");
//! ```
//!
//! ## Architecture
//!
//! Remora is layered, leaves first:
//!
//! ```text
//! ┌─────────────────────────────────────┐
//! │     Wire Adapters (RESP server)      │
//! ├─────────────────────────────────────┤
//! │   Cache Manager (routing, budget,    │
//! │   global index, watcher, sweeper)    │
//! ├─────────────────────────────────────┤
//! │   Packed Tables (entries + index,    │
//! │   compaction, recycling)             │
//! ├─────────────────────────────────────┤
//! │   Anonymous Memory Regions (mmap)    │
//! └─────────────────────────────────────┘
//! ```
//!
//! Every entry's bytes live inside one packed table, and every packed table
//! lives inside one anonymous mapping. Freeing memory is therefore a whole-
//! table operation: discard the table, unmap the region, and the RSS drops
//! immediately. An approximate LRU falls out of tagging tables with
//! generation numbers and always discarding the oldest.
//!
//! ## Consistency Expectations
//!
//! The cache is volatile and single-node. `put` is an overwrite, `delete`
//! of an absent key is a no-op, and entries can vanish at any time when the
//! host wants its memory back. Anything stored here must be recomputable.
//!
//! ## Module Overview
//!
//! - [`storage`]: Anonymous memory regions with deterministic release
//! - [`table`]: Packed key/value tables and their discard/recycle lifecycle
//! - [`cache`]: The cache manager and its background workers
//! - [`memory`]: Memory budget policies (`MemFunc`)
//! - [`server`]: Wire adapters (RESP subset)

pub mod cache;
pub mod config;
pub mod memory;
pub mod server;
pub mod storage;
pub mod table;

pub use cache::{hash64, Cache, CacheBuilder, CacheStats};
pub use memory::{available_memory, constant_memory, MemFunc};
pub use server::RespServer;
pub use table::{DiscardableTable, NoSpace, PackedTable};

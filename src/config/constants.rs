//! # Remora Configuration Constants
//!
//! This module centralizes all configuration constants, grouping
//! interdependent values together and documenting their relationships.
//!
//! ## Dependency Graph
//!
//! ```text
//! MAX_REGION_SIZE (1 GiB)
//!       │
//!       ├─> KEY_SIZE_FLAG_MASK (top 2 bits of the key-size word)
//!       │     The 1 GiB region cap bounds every stored offset and size to
//!       │     30 bits, which is what frees the top 2 bits of the key-size
//!       │     prefix word for flag use.
//!       │
//!       └─> ENTRY_PREFIX_LEN (8 bytes: two little-endian u32 size words)
//!
//! DEFAULT_TABLE_SIZE (4 MiB)
//!       │
//!       └─> AUTO_GC_DIVISOR (4)
//!             Each table compacts itself once a quarter of its region is
//!             dead space.
//!
//! CHANGED_KEYS_SOFT_LIMIT (10,000)
//!       │
//!       └─> SWEEP_CANDIDATE_LIMIT (10,000)
//!             A full candidate batch immediately requests a follow-up
//!             sweep, so the two limits bound sweeper latency together.
//! ```
//!
//! ## Critical Invariants
//!
//! 1. `MAX_REGION_SIZE <= 1 << 30` (offsets must fit in an `i32` with the
//!    flag bits clear)
//! 2. `DEFAULT_MAX_KEY_SIZE + DEFAULT_MAX_VAL_SIZE + ENTRY_PREFIX_LEN <=
//!    DEFAULT_TABLE_SIZE` (a maximum-size entry must fit in a fresh table)

// ============================================================================
// PACKED TABLE LAYOUT
// These define the fundamental entry structure inside a region
// ============================================================================

/// Hard cap on the size of a single table region.
/// Offsets into the region are stored as `i32` index values, and the top two
/// bits of the key-size prefix word are reserved, so regions larger than
/// 1 GiB cannot be represented.
pub const MAX_REGION_SIZE: usize = 1 << 30;

/// Length of the size prefix preceding every key/value entry.
/// Two little-endian u32 words: key size, then value size.
pub const ENTRY_PREFIX_LEN: usize = 8;

/// Reserved flag bits in the key-size prefix word.
/// The 1 GiB region cap keeps real key sizes below `1 << 30`, leaving these
/// two bits permanently clear for deletion-tagging schemes.
pub const KEY_SIZE_FLAG_MASK: u32 = 3 << 30;

/// Fraction of a region (as a divisor) that may be dead space before the
/// owning table compacts itself.
pub const AUTO_GC_DIVISOR: usize = 4;

const _: () = assert!(
    MAX_REGION_SIZE <= 1 << 30,
    "region offsets must fit in 30 bits"
);

// ============================================================================
// CACHE MANAGER CONFIGURATION
// ============================================================================

/// Default size of each table region (4 MiB).
pub const DEFAULT_TABLE_SIZE: usize = 4 * 1024 * 1024;

/// Default maximum key size accepted by the cache.
pub const DEFAULT_MAX_KEY_SIZE: usize = 1024;

/// Default maximum value size accepted by the cache (1 MiB).
pub const DEFAULT_MAX_VAL_SIZE: usize = 1024 * 1024;

/// Number of newest tables inspected when routing a write (best-fit scan).
pub const PUT_TABLE_SCAN: usize = 4;

/// Minimum age (in table generations) before a read hit is promoted to a
/// newer table.
pub const PROMOTE_MIN_AGE: u64 = 4;

const _: () = assert!(
    DEFAULT_MAX_KEY_SIZE + DEFAULT_MAX_VAL_SIZE + ENTRY_PREFIX_LEN <= DEFAULT_TABLE_SIZE,
    "a maximum-size entry must fit in a freshly allocated table"
);

// ============================================================================
// BACKGROUND WORKERS
// ============================================================================

/// Interval between memory-watcher ticks.
pub const WATCHER_INTERVAL_MS: u64 = 1000;

/// Pending index-change buffer length that eagerly requests a sweep.
pub const CHANGED_KEYS_SOFT_LIMIT: usize = 10_000;

/// Maximum stale-slot candidates collected per sweep pass. A full batch
/// requests an immediate follow-up sweep.
pub const SWEEP_CANDIDATE_LIMIT: usize = 10_000;

/// Fallback wake-up period for the sweeper when no sweep is requested, so a
/// quiescent cache still drains its pending delta buffer.
pub const SWEEP_FALLBACK_INTERVAL_MS: u64 = 60_000;

//! # Server Module
//!
//! Wire adapters exposing the cache to external clients. These are thin
//! shims over the [`Cache`](crate::cache::Cache) contract: they validate
//! sizes early (the cache itself silently drops out-of-bounds writes) and
//! translate protocol framing to `has`/`get`/`put`/`delete` calls.
//!
//! ## Module Organization
//!
//! - `resp`: Redis serialization protocol subset (`SET`, `GET`, `DEL`,
//!   `EXISTS`)

mod resp;

pub use resp::RespServer;

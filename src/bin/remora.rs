//! # Remora Server Entry Point
//!
//! Binds the RESP listener, builds the cache with the selected memory
//! policy, and serves until killed.
//!
//! ## Usage
//!
//! ```bash
//! # Use all available host memory, keeping 512 MiB free
//! remora --redis-listen-addr 0.0.0.0:19513
//!
//! # Fixed 256 MiB budget
//! remora --const-cache-size-mb 256
//! ```

use std::net::TcpListener;
use std::sync::Arc;

use clap::Parser;
use eyre::{Result, WrapErr};
use tracing::warn;
use tracing_subscriber::EnvFilter;

use remora::{available_memory, constant_memory, Cache, RespServer};

const MEGABYTE: i64 = 1024 * 1024;

/// Opportunistic in-memory key/value cache speaking a RESP subset.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Address/port for the RESP server to listen on
    #[arg(long, default_value = "0.0.0.0:19513")]
    redis_listen_addr: String,

    /// Minimum host memory to keep available, in MiB
    #[arg(long, default_value_t = 512)]
    min_available_mb: i64,

    /// Constant cache size in MiB; 0 means size to available host memory
    #[arg(long, default_value_t = 0)]
    const_cache_size_mb: i64,

    /// Max key size in bytes
    #[arg(long, default_value_t = 1024)]
    max_key_size: usize,

    /// Max value size in bytes
    #[arg(long, default_value_t = 1024 * 1024)]
    max_val_size: usize,

    /// Table region size in MiB
    #[arg(long, default_value_t = 4)]
    table_size_mb: usize,

    /// Keep the default OOM score instead of volunteering to be killed
    /// first under memory pressure
    #[arg(long)]
    no_oom_adj: bool,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let args = Args::parse();

    if !args.no_oom_adj {
        if let Err(e) = std::fs::write("/proc/self/oom_score_adj", b"1000") {
            warn!(error = %e, "unable to adjust OOM score");
        }
    }

    let mem_func = if args.const_cache_size_mb != 0 {
        constant_memory(args.const_cache_size_mb * MEGABYTE)
    } else {
        available_memory(args.min_available_mb * MEGABYTE, 1.0)
    };

    let cache = Cache::builder()
        .table_size(args.table_size_mb * MEGABYTE as usize)
        .max_key_size(args.max_key_size)
        .max_val_size(args.max_val_size)
        .mem_func(mem_func)
        .open()
        .wrap_err("failed to open cache")?;

    let listener = TcpListener::bind(&args.redis_listen_addr)
        .wrap_err_with(|| format!("failed to listen on {}", args.redis_listen_addr))?;

    RespServer::new(Arc::new(cache)).serve(listener)
}

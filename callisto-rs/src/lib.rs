//! Callisto is a library for building distributed, peer-cooperative in-memory caches.
//!
//! # Introduction
//! **Callisto** nodes jointly serve read-through caches: a client may ask *any* node for a
//! key and that node will either answer from its local cache, forward the request to the
//! peer deterministically responsible for the key, or materialize the value via a
//! user-supplied loader. There are no writes, no invalidation and no TTLs - values only
//! ever leave a node through LRU eviction. This deliberately small contract is what makes
//! the system robust: every key has exactly one authoritative cache location and every
//! cache miss costs at most one backend call, no matter how many clients stampede onto it.
//!
//! Three building blocks carry the whole design:
//!
//! * **A byte-budgeted LRU cache** ([lru]) which keeps each node's memory usage below a
//!   configured limit by evicting the least recently used entries first.
//! * **A consistent hash ring** ([ring]) which assigns each key to an owning peer while
//!   moving as few keys as possible when the peer set changes.
//! * **A request coalescer** ([coalesce]) which collapses concurrent loads of the same key
//!   into a single execution whose result is shared by all callers.
//!
//! The [Group](group::Group) composes these into the user-visible cache namespace and the
//! [HttpPool](http::HttpPool) connects the nodes via a minimal HTTP protocol.
//!
//! # Features
//! * **Fully asynchronous** - a node is an ordinary [tokio](https://tokio.rs/) service;
//!   every cache read, peer fetch and loader call is just a future.
//! * **Live reconfiguration** - the config file is watched and re-read while the node
//!   keeps serving, because restarting an in-memory cache throws its warmup away.
//! * **Pluggable at the seams**: the ring hash, the peer transport and the value loader are
//!   all single-method interfaces which can be swapped without touching the core.
//! * **Small enough to read in an afternoon** - when a cluster misbehaves, the sources
//!   answer questions faster than any document could.
//!
//! # Using Callisto
//! Most deployments embed **Callisto** into a binary of their own, wiring real loaders to
//! real data sources. For everything else there is **callisto-io**: a complete, runnable
//! node which only needs a config file listing its peers.
//!
//! ```no_run
//! use callisto::builder::Builder;
//! use callisto::group::{loader_fn, GroupRegistry};
//! use callisto::http::HttpPool;
//!
//! #[tokio::main]
//! async fn main() {
//!     // Set up logging, config and signal handling, then build the platform...
//!     let platform = Builder::new().enable_all().build().await;
//!
//!     // ...create a cache namespace backed by whatever is authoritative for the data...
//!     let registry = GroupRegistry::install(&platform);
//!     let group = registry
//!         .create_group("scores", 64 * 1024 * 1024, loader_fn(|key| {
//!             Ok(format!("value of {}", key).into_bytes())
//!         }))
//!         .unwrap();
//!
//!     // ...wire the node into its cluster...
//!     let pool = HttpPool::install(&platform, "http://localhost:8001");
//!     pool.set_peers(&["http://localhost:8001", "http://localhost:8002"]);
//!     group.register_peers(pool.clone()).unwrap();
//!
//!     // ...and serve peer traffic until CTRL-C arrives.
//!     pool.serve().await;
//! }
//! ```
#![deny(
    warnings,
    missing_docs,
    trivial_casts,
    trivial_numeric_casts,
    unused_extern_crates,
    unused_import_braces,
    unused_results
)]
use simplelog::{ConfigBuilder, LevelFilter, SimpleLogger};
use std::sync::Once;

pub mod builder;
pub mod coalesce;
pub mod config;
pub mod fmt;
pub mod group;
pub mod http;
pub mod lru;
pub mod peers;
pub mod platform;
pub mod ring;
pub mod signals;
pub mod view;

/// Contains the version of the Callisto library.
pub const CALLISTO_VERSION: &str = "DEVELOPMENT-SNAPSHOT";

/// Sets up logging to stdout.
///
/// A Callisto node logs to stdout and nothing else - in the container setups we target,
/// the runtime collects stdout anyway, and a cache node writing its own log files would
/// just compete with the cache for disk and memory. Timestamps are RFC 3339 so every log
/// shipper can parse them.
///
/// The call is idempotent: only the first invocation installs a logger, which keeps test
/// binaries (where many tests may try to initialize logging) from panicking.
pub fn init_logging() {
    static INSTALL_LOGGER: Once = Once::new();

    INSTALL_LOGGER.call_once(|| {
        let config = ConfigBuilder::new()
            .set_time_format_rfc3339()
            .set_thread_level(LevelFilter::Trace)
            .set_target_level(LevelFilter::Error)
            .build();

        SimpleLogger::init(LevelFilter::Debug, config)
            .expect("another logger was installed before init_logging ran");
    });
}

/// Spawns a fire-and-forget task on the tokio runtime.
///
/// This is a thin wrapper around [tokio::spawn] which explicitly discards the returned
/// join handle, for the many places where a background task is launched and nobody ever
/// joins on it.
///
/// # Example
/// ```
/// # #[macro_use] extern crate callisto;
/// # #[tokio::main]
/// # async fn main() {
/// spawn!(async move {
///     // background work which runs to completion on its own...
/// });
/// # }
/// ```
#[macro_export]
macro_rules! spawn {
    ($future:expr) => {{
        let _ = tokio::spawn($future);
    }};
}

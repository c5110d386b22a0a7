//! fncache: a function-result cache for async Rust.
//!
//! Wrap any `async fn(...) -> Result<T, E>` with an [`InvocationWrapper`] and
//! its results are looked up by a key derived from the procedure's identity
//! and arguments, stored through a pluggable [`Serializer`] onto a pluggable
//! [`Storage`] backend (in-memory TTL, in-memory LRU, or an external
//! key-value store), invalidated in O(1) via version counters rather than
//! key enumeration, and deduplicated across concurrent callers by a
//! singleflight coalescer.
//!
//! # Quick start
//!
//! ```rust,no_run
//! use fncache::prelude::*;
//! use std::sync::Arc;
//!
//! #[derive(Clone, serde::Serialize, serde::Deserialize)]
//! struct Profile { name: String }
//!
//! #[tokio::main]
//! async fn main() {
//!     let manager = CacheManager::new(MemoryTtlStorage::new());
//!     let wrapper: Arc<InvocationWrapper<_, _, Profile>> =
//!         Arc::new(InvocationWrapper::new(manager, "load_profile"));
//!
//!     let args = CallArgs::new().arg("user_id", &42i64);
//!     let profile = wrapper
//!         .call(args, None, CallOptions::default(), || async {
//!             Ok::<Profile, String>(Profile { name: "ada".into() })
//!         })
//!         .await
//!         .unwrap();
//!     println!("{}", profile.name);
//! }
//! ```

pub mod key_builder;
pub mod manager;
pub mod registry;
pub mod stats;
pub mod version;
pub mod wrapper;

// Re-export the core traits and types every caller needs: storage contract,
// serializers, error taxonomy, the renderable-argument sum type.
pub use fncache_core::*;

#[cfg(feature = "memory")]
pub use fncache_storage::{MemoryLruStorage, MemoryTtlStorage};

#[cfg(feature = "redis")]
pub use fncache_storage::{RedisConfig, RedisStoreClient};

pub use fncache_storage::ExternalStorage;

#[cfg(feature = "macros")]
pub use fncache_macros::cached;

/// Re-exports consumed only by the generated code of the `#[cached]`
/// attribute macro, not part of the crate's public API.
#[cfg(feature = "macros")]
#[doc(hidden)]
pub mod __private {
    pub use once_cell;
}

pub use key_builder::{ArgsFragment, CallArgs, KeyBuilder};
pub use manager::{CacheManager, CacheManagerConfig, CoalesceError, Coalescer};
pub use registry::{GlobalRegistry, RegisteredManager};
pub use stats::{MemoryReport, StatsSnapshot, Statistics};
pub use version::VersionRegistry;
pub use wrapper::{CallOptions, InvocationWrapper, PreloadSeed};

use std::time::Duration;

/// Invoke every registered preload provider across every wrapper in the
/// process, priming each with `cache_read=false, cache_write=true`.
pub async fn preload_all() {
    registry::global().preload_all().await;
}

/// Bump the global version counter on every manager in the process. O(1):
/// no entry is touched, every subsequently derived key simply differs.
pub async fn invalidate_all() {
    registry::global().invalidate_all().await;
}

/// Bump the per-user version counter, scoped to `user_id`, on every manager
/// in the process that has ever seen a call for that user.
pub async fn invalidate_user(user_id: &str) {
    registry::global().invalidate_user(user_id).await;
}

/// Turn the cache on for the whole process. Takes effect on the next call;
/// in-flight singleflight calls are unaffected.
pub fn enable_global_cache() {
    registry::global().enable();
}

/// Turn the cache off for the whole process: every manager's `get` reports a
/// miss and every `set` becomes a no-op until re-enabled.
pub fn disable_global_cache() {
    registry::global().disable();
}

pub fn is_global_cache_enabled() -> bool {
    registry::global().is_enabled()
}

/// Snapshot every registered manager's hit/miss/set/delete/error counters
/// and latency distribution, keyed by manager name.
pub fn get_statistics() -> Vec<(String, StatsSnapshot)> {
    registry::global().statistics()
}

/// Zero every registered manager's counters. Does not touch stored entries.
pub fn reset_statistics() {
    registry::global().reset_statistics();
}

/// Start a background task that samples every manager's memory footprint
/// once per `interval` and logs a summary line. Replaces any previously
/// running sampler.
pub fn start_memory_monitoring(interval: Duration) {
    registry::global().start_memory_monitoring(interval);
}

pub fn stop_memory_monitoring() {
    registry::global().stop_memory_monitoring();
}

/// Snapshot of every registered manager's entry count and approximate byte
/// footprint, keyed by manager name.
pub async fn get_memory_usage() -> Vec<(String, MemoryReport)> {
    registry::global().memory_usage().await
}

/// Convenient bundle of the crate's public surface for `use fncache::prelude::*`.
pub mod prelude {
    pub use crate::{
        disable_global_cache, enable_global_cache, get_memory_usage, get_statistics,
        invalidate_all, invalidate_user, is_global_cache_enabled, preload_all, reset_statistics,
        start_memory_monitoring, stop_memory_monitoring,
    };
    pub use crate::{
        ArgsFragment, CacheManager, CacheManagerConfig, CallArgs, CallOptions, CoalesceError,
        Coalescer, InvocationWrapper, KeyBuilder, MemoryReport, PreloadSeed, StatsSnapshot,
        Statistics, VersionRegistry,
    };
    pub use fncache_core::{
        CacheEntry, CacheError, CacheOptions, CacheOpts, CacheResult, CacheStats,
        JsonSerializer, RawStringSerializer, Result, Serializer, Storage,
    };

    #[cfg(feature = "memory")]
    pub use crate::{MemoryLruStorage, MemoryTtlStorage};

    #[cfg(feature = "redis")]
    pub use crate::{RedisConfig, RedisStoreClient};

    #[cfg(feature = "msgpack")]
    pub use fncache_core::MsgPackSerializer;

    #[cfg(feature = "bincode")]
    pub use fncache_core::BincodeSerializer;

    #[cfg(feature = "macros")]
    pub use fncache_macros::cached;
}

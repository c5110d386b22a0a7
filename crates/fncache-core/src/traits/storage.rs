//! Storage trait: the uniform backend contract the cache manager builds on.

use async_trait::async_trait;
use crate::{CacheEntry, CacheError, CacheOptions, CacheStats};

/// Core trait for all cache storage backends.
///
/// Every operation is keyed by a string and every value is an opaque byte
/// string — the storage layer never sees the caller's type, only what the
/// manager's serializer already produced. Implementations include the
/// in-memory TTL/LRU storages and the external key-value adapter.
#[async_trait]
pub trait Storage: Send + Sync + 'static {
    /// Fetch a value. Returns `None` if absent or expired; never throws on
    /// plain absence.
    async fn get(&self, key: &str) -> Result<Option<CacheEntry<Vec<u8>>>, CacheError>;

    /// Write a value with the given options (in particular TTL). Overwrites
    /// any existing entry at `key`.
    async fn set(
        &self,
        key: &str,
        value: Vec<u8>,
        options: &CacheOptions,
    ) -> Result<(), CacheError>;

    /// Remove an entry if present. Idempotent: deleting an absent key is not
    /// an error.
    async fn delete(&self, key: &str) -> Result<bool, CacheError>;

    /// Atomically increment the integer counter stored at `key` and return
    /// its new value. A missing counter is treated as zero before the
    /// increment, so the first call on a fresh key returns 1.
    async fn incr(&self, key: &str) -> Result<u64, CacheError>;

    /// Remove every entry owned by this storage. External backends must
    /// scope this to the manager's key prefix and must never flush the
    /// whole server.
    async fn clear(&self) -> Result<(), CacheError>;

    /// Snapshot of this storage's own counters.
    async fn stats(&self) -> Result<CacheStats, CacheError>;

    /// Number of live entries. External backends that cannot report this
    /// cheaply may return an approximation.
    async fn len(&self) -> Result<usize, CacheError>;

    async fn is_empty(&self) -> Result<bool, CacheError> {
        Ok(self.len().await? == 0)
    }
}

/// Blocking counterpart of [`Storage`], implemented only by the in-memory
/// backends (external backends are network-bound and expose the suspending
/// form only, per the cooperative-variant rule).
pub trait SyncStorage: Send + Sync + 'static {
    fn get_sync(&self, key: &str) -> Result<Option<CacheEntry<Vec<u8>>>, CacheError>;
    fn set_sync(&self, key: &str, value: Vec<u8>, options: &CacheOptions) -> Result<(), CacheError>;
    fn delete_sync(&self, key: &str) -> Result<bool, CacheError>;
    fn incr_sync(&self, key: &str) -> Result<u64, CacheError>;
    fn clear_sync(&self) -> Result<(), CacheError>;
}

/// The narrow five-operation protocol an external key-value service must
/// support: get, set-with-ttl, delete, incr, scan-by-prefix. No
/// transactions, no pub/sub, no scripting. The core crate depends only on
/// this trait, never on a concrete client library.
#[async_trait]
pub trait ExternalStoreClient: Send + Sync + 'static {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, CacheError>;
    async fn set(&self, key: &str, value: Vec<u8>, ttl_secs: Option<u64>) -> Result<(), CacheError>;
    async fn delete(&self, key: &str) -> Result<bool, CacheError>;
    async fn incr(&self, key: &str) -> Result<u64, CacheError>;
    /// Enumerate every key with the given prefix, in batches the client may
    /// choose; used only by `clear()`.
    async fn scan_prefix(&self, prefix: &str) -> Result<Vec<String>, CacheError>;
}

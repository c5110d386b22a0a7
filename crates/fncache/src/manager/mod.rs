//! The cache manager: binds a [`Storage`], a [`Serializer`], a key builder,
//! and a version registry into one object with the public operations
//! described by the engine's component design.

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;

use fncache_core::{
    CacheEntry, CacheOptions, CacheResult, JsonSerializer, Serializer, Storage, SyncStorage,
};

mod coalescer;
pub use coalescer::{CoalesceError, Coalescer};

use crate::key_builder::{ArgsFragment, KeyBuilder};
use crate::registry::{self, RegisteredManager};
use crate::stats::{MemoryReport, StatsSnapshot, Statistics};
use crate::version::VersionRegistry;

/// Construction-time configuration for a [`CacheManager`].
#[derive(Debug, Clone)]
pub struct CacheManagerConfig {
    /// Applied when neither the call nor a dynamic-TTL function supplies one.
    pub default_ttl: Option<Duration>,
    /// Prepended to every composed key. Defaults to `"cache:"`.
    pub key_prefix: String,
    /// Used to namespace the global/user version-counter keys so multiple
    /// managers sharing one storage don't collide. Defaults to `"fncache"`.
    pub library_name: String,
    /// Identifies this manager in the global registry's statistics and
    /// memory-monitor output.
    pub name: String,
}

impl Default for CacheManagerConfig {
    fn default() -> Self {
        Self {
            default_ttl: Some(Duration::from_secs(300)),
            key_prefix: "cache:".to_string(),
            library_name: "fncache".to_string(),
            name: "default".to_string(),
        }
    }
}

/// Binds one [`Storage`] backend, one [`Serializer`], a key builder, and a
/// version registry. The error policy of the engine's public surface
/// applies here: `get`/`set`/`delete` never surface a `CacheError` to
/// callers, only logs and the error counter in [`Statistics`].
pub struct CacheManager<St: Storage, Se: Serializer = JsonSerializer> {
    storage: Arc<St>,
    serializer: Se,
    config: CacheManagerConfig,
    versions: VersionRegistry<St>,
    key_builder: KeyBuilder,
    stats: Arc<Statistics>,
}

impl<St: Storage> CacheManager<St, JsonSerializer> {
    pub fn new(storage: St) -> Arc<Self> {
        Self::with_config(storage, CacheManagerConfig::default())
    }

    pub fn with_config(storage: St, config: CacheManagerConfig) -> Arc<Self> {
        Self::with_serializer(storage, JsonSerializer, config)
    }
}

impl<St: Storage, Se: Serializer> CacheManager<St, Se> {
    pub fn with_serializer(storage: St, serializer: Se, config: CacheManagerConfig) -> Arc<Self> {
        let storage = Arc::new(storage);
        let versions = VersionRegistry::new(storage.clone(), &config.library_name);
        let key_builder = KeyBuilder::new(config.key_prefix.clone());
        let manager = Arc::new(Self {
            storage,
            serializer,
            config,
            versions,
            key_builder,
            stats: Arc::new(Statistics::new()),
        });
        registry::global().register_manager(Arc::downgrade(&manager) as _);
        manager
    }

    pub fn stats(&self) -> Arc<Statistics> {
        self.stats.clone()
    }

    pub fn key_builder(&self) -> &KeyBuilder {
        &self.key_builder
    }

    pub fn default_ttl(&self) -> Option<Duration> {
        self.config.default_ttl
    }

    /// Resolve a fully composed key for `procedure_id`, inlining the
    /// current global (and, if requested, per-user) version counters. A
    /// version-read failure degrades to version 1 rather than propagating —
    /// consistent with the manager's overall policy of never letting a
    /// storage error surface to the caller.
    pub async fn build_key(
        &self,
        procedure_id: &str,
        fragment: &ArgsFragment,
        user_id: Option<&str>,
    ) -> String {
        let global = self.versions.global_version().await.unwrap_or(1);
        let user = match user_id {
            Some(uid) => {
                let version = self.versions.user_version(uid).await.unwrap_or(1);
                Some((uid, version))
            }
            None => None,
        };
        self.key_builder.build(procedure_id, fragment, global, user)
    }

    pub async fn increment_global_version(&self) -> u64 {
        match self.versions.increment_global().await {
            Ok(v) => v,
            Err(err) => {
                self.stats.record_error();
                warn_storage_error("increment_global_version", &err);
                0
            }
        }
    }

    pub async fn increment_user_version(&self, user_id: &str) -> u64 {
        match self.versions.increment_user(user_id).await {
            Ok(v) => v,
            Err(err) => {
                self.stats.record_error();
                warn_storage_error("increment_user_version", &err);
                0
            }
        }
    }

    /// Bulk invalidation: O(1), bumps the global counter rather than
    /// touching any stored entry.
    pub async fn invalidate_all(&self) -> u64 {
        self.increment_global_version().await
    }

    pub async fn invalidate_user(&self, user_id: &str) -> u64 {
        self.increment_user_version(user_id).await
    }

    /// Physical purge: removes every entry this storage owns.
    pub async fn clear(&self) {
        if let Err(err) = self.storage.clear().await {
            self.stats.record_error();
            warn_storage_error("clear", &err);
        }
    }

    pub async fn len(&self) -> usize {
        self.storage.len().await.unwrap_or(0)
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Look up `key`. Never returns an error: storage failures and
    /// deserialization failures both degrade to [`CacheResult::Miss`],
    /// counted as an error and logged, per the engine's error policy.
    pub async fn get<T>(&self, key: &str) -> CacheResult<T>
    where
        T: DeserializeOwned,
    {
        if !registry::global().is_enabled() {
            return CacheResult::Miss;
        }

        let start = Instant::now();
        let result = match self.storage.get(key).await {
            Ok(Some(entry)) => match self.serializer.deserialize::<T>(&entry.value) {
                Ok(value) => {
                    self.stats.record_hit();
                    CacheResult::Hit(CacheEntry {
                        value,
                        created_at: entry.created_at,
                        expires_at: entry.expires_at,
                        size: entry.size,
                    })
                }
                Err(err) => {
                    // Open question (decode failure after a successful
                    // encode): treat as miss and delete the offending key.
                    let _ = self.storage.delete(key).await;
                    self.stats.record_error();
                    warn_storage_error("get:deserialize", &err);
                    CacheResult::Miss
                }
            },
            Ok(None) => {
                self.stats.record_miss();
                CacheResult::Miss
            }
            Err(err) => {
                self.stats.record_error();
                warn_storage_error("get", &err);
                CacheResult::Miss
            }
        };
        self.stats.record_latency(start.elapsed());
        result
    }

    /// Store `value` under `key`. Never returns an error: a serialization
    /// or storage failure is logged and counted, and the call still
    /// succeeds from the caller's point of view (the value is simply not
    /// cached).
    pub async fn set<T>(&self, key: &str, value: &T, ttl: Option<Duration>)
    where
        T: Serialize,
    {
        if !registry::global().is_enabled() {
            return;
        }

        let start = Instant::now();
        match self.serializer.serialize(value) {
            Ok(bytes) => {
                let options = CacheOptions {
                    ttl: ttl.or(self.config.default_ttl),
                };
                if let Err(err) = self.storage.set(key, bytes, &options).await {
                    self.stats.record_error();
                    warn_storage_error("set", &err);
                } else {
                    self.stats.record_set();
                }
            }
            Err(err) => {
                self.stats.record_error();
                warn_storage_error("set:serialize", &err);
            }
        }
        self.stats.record_latency(start.elapsed());
    }

    /// Delete `key`. Idempotent; always reports success per the error
    /// policy, even when the underlying storage call itself failed.
    pub async fn delete(&self, key: &str) -> bool {
        match self.storage.delete(key).await {
            Ok(existed) => {
                if existed {
                    self.stats.record_delete();
                }
                existed
            }
            Err(err) => {
                self.stats.record_error();
                warn_storage_error("delete", &err);
                true
            }
        }
    }
}

/// Blocking counterparts of [`CacheManager::get`]/`set`/`delete`, available
/// only when the underlying storage is in-memory (implements
/// [`SyncStorage`]): external backends are network-bound and expose the
/// suspending family only.
impl<St: Storage + SyncStorage, Se: Serializer> CacheManager<St, Se> {
    pub fn get_sync<T>(&self, key: &str) -> CacheResult<T>
    where
        T: DeserializeOwned,
    {
        if !registry::global().is_enabled() {
            return CacheResult::Miss;
        }

        let start = Instant::now();
        let result = match self.storage.get_sync(key) {
            Ok(Some(entry)) => match self.serializer.deserialize::<T>(&entry.value) {
                Ok(value) => {
                    self.stats.record_hit();
                    CacheResult::Hit(CacheEntry {
                        value,
                        created_at: entry.created_at,
                        expires_at: entry.expires_at,
                        size: entry.size,
                    })
                }
                Err(err) => {
                    let _ = self.storage.delete_sync(key);
                    self.stats.record_error();
                    warn_storage_error("get_sync:deserialize", &err);
                    CacheResult::Miss
                }
            },
            Ok(None) => {
                self.stats.record_miss();
                CacheResult::Miss
            }
            Err(err) => {
                self.stats.record_error();
                warn_storage_error("get_sync", &err);
                CacheResult::Miss
            }
        };
        self.stats.record_latency(start.elapsed());
        result
    }

    pub fn set_sync<T>(&self, key: &str, value: &T, ttl: Option<Duration>)
    where
        T: Serialize,
    {
        if !registry::global().is_enabled() {
            return;
        }

        let start = Instant::now();
        match self.serializer.serialize(value) {
            Ok(bytes) => {
                let options = CacheOptions {
                    ttl: ttl.or(self.config.default_ttl),
                };
                if let Err(err) = self.storage.set_sync(key, bytes, &options) {
                    self.stats.record_error();
                    warn_storage_error("set_sync", &err);
                } else {
                    self.stats.record_set();
                }
            }
            Err(err) => {
                self.stats.record_error();
                warn_storage_error("set_sync:serialize", &err);
            }
        }
        self.stats.record_latency(start.elapsed());
    }

    pub fn delete_sync(&self, key: &str) -> bool {
        match self.storage.delete_sync(key) {
            Ok(existed) => {
                if existed {
                    self.stats.record_delete();
                }
                existed
            }
            Err(err) => {
                self.stats.record_error();
                warn_storage_error("delete_sync", &err);
                true
            }
        }
    }
}

fn warn_storage_error(op: &str, err: &fncache_core::CacheError) {
    #[cfg(feature = "tracing")]
    tracing::warn!(operation = op, error = %err, "cache manager operation failed");
    #[cfg(not(feature = "tracing"))]
    let _ = (op, err);
}

#[async_trait]
impl<St: Storage, Se: Serializer> RegisteredManager for CacheManager<St, Se> {
    fn name(&self) -> &str {
        &self.config.name
    }

    async fn invalidate_all_version(&self) -> fncache_core::Result<u64> {
        Ok(self.invalidate_all().await)
    }

    async fn invalidate_user_version(&self, user_id: &str) -> fncache_core::Result<u64> {
        Ok(self.invalidate_user(user_id).await)
    }

    fn stats_snapshot(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    fn reset_statistics(&self) {
        self.stats.reset();
    }

    async fn memory_report(&self) -> MemoryReport {
        match self.storage.stats().await {
            Ok(stats) => MemoryReport {
                entries: stats.size,
                bytes: stats.memory_bytes,
                capacity: stats.capacity,
            },
            Err(_) => MemoryReport::default(),
        }
    }
}

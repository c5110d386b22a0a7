//! The external key-value storage adapter: translates the four `Storage`
//! operations to an injected [`ExternalStoreClient`]'s five-operation
//! protocol, never transforming the value itself (serialization happens
//! above this layer, in the manager).

#[cfg(feature = "redis")]
mod redis_client;

#[cfg(feature = "redis")]
pub use redis_client::{RedisConfig, RedisStoreClient};

use async_trait::async_trait;
use std::sync::atomic::{AtomicU64, Ordering};

use fncache_core::{CacheEntry, CacheError, CacheOptions, CacheStats, ExternalStoreClient, Storage};

/// Generic external-store adapter. The core's `Storage` contract is
/// implemented purely in terms of the narrow [`ExternalStoreClient`]
/// protocol, so this adapter works with any conforming client — the
/// concrete Redis implementation is one instantiation, not a hardwired
/// dependency.
pub struct ExternalStorage<C: ExternalStoreClient> {
    client: C,
    key_prefix: String,
    hits: AtomicU64,
    misses: AtomicU64,
    writes: AtomicU64,
    deletes: AtomicU64,
}

impl<C: ExternalStoreClient> ExternalStorage<C> {
    pub fn new(client: C, key_prefix: impl Into<String>) -> Self {
        Self {
            client,
            key_prefix: key_prefix.into(),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            writes: AtomicU64::new(0),
            deletes: AtomicU64::new(0),
        }
    }
}

#[async_trait]
impl<C: ExternalStoreClient> Storage for ExternalStorage<C> {
    async fn get(&self, key: &str) -> Result<Option<CacheEntry<Vec<u8>>>, CacheError> {
        match self.client.get(key).await {
            Ok(Some(bytes)) => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                let size = bytes.len();
                Ok(Some(CacheEntry::new(bytes, size)))
            }
            Ok(None) => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                Ok(None)
            }
            Err(e) => {
                // Transport errors convert to a miss for reads; the caller
                // (the cache manager) is responsible for logging and
                // counting the error.
                Err(e)
            }
        }
    }

    async fn set(&self, key: &str, value: Vec<u8>, options: &CacheOptions) -> Result<(), CacheError> {
        let ttl_secs = options.ttl.map(|d| d.as_secs());
        self.client.set(key, value, ttl_secs).await?;
        self.writes.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<bool, CacheError> {
        let deleted = self.client.delete(key).await?;
        if deleted {
            self.deletes.fetch_add(1, Ordering::Relaxed);
        }
        Ok(deleted)
    }

    async fn incr(&self, key: &str) -> Result<u64, CacheError> {
        self.client.incr(key).await
    }

    async fn clear(&self) -> Result<(), CacheError> {
        // Prefix-scoped only: never flush the whole server.
        let keys = self.client.scan_prefix(&self.key_prefix).await?;
        for key in keys {
            self.client.delete(&key).await?;
        }
        Ok(())
    }

    async fn stats(&self) -> Result<CacheStats, CacheError> {
        Ok(CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            writes: self.writes.load(Ordering::Relaxed),
            deletes: self.deletes.load(Ordering::Relaxed),
            evictions: 0,
            size: 0,        // "unknown" per the memory monitor's contract for external storages
            memory_bytes: 0,
            capacity: None,
        })
    }

    async fn len(&self) -> Result<usize, CacheError> {
        Ok(self.client.scan_prefix(&self.key_prefix).await?.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::Mutex;

    struct FakeClient {
        data: Mutex<HashMap<String, Vec<u8>>>,
        counters: Mutex<HashMap<String, u64>>,
        fail_next: std::sync::atomic::AtomicBool,
    }

    impl FakeClient {
        fn new() -> Self {
            Self {
                data: Mutex::new(HashMap::new()),
                counters: Mutex::new(HashMap::new()),
                fail_next: std::sync::atomic::AtomicBool::new(false),
            }
        }
    }

    #[async_trait]
    impl ExternalStoreClient for FakeClient {
        async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, CacheError> {
            if self.fail_next.swap(false, Ordering::SeqCst) {
                return Err(CacheError::Transport("simulated".into()));
            }
            Ok(self.data.lock().unwrap().get(key).cloned())
        }

        async fn set(&self, key: &str, value: Vec<u8>, _ttl_secs: Option<u64>) -> Result<(), CacheError> {
            self.data.lock().unwrap().insert(key.to_string(), value);
            Ok(())
        }

        async fn delete(&self, key: &str) -> Result<bool, CacheError> {
            Ok(self.data.lock().unwrap().remove(key).is_some())
        }

        async fn incr(&self, key: &str) -> Result<u64, CacheError> {
            let mut counters = self.counters.lock().unwrap();
            let next = counters.entry(key.to_string()).or_insert(0);
            *next += 1;
            Ok(*next)
        }

        async fn scan_prefix(&self, prefix: &str) -> Result<Vec<String>, CacheError> {
            Ok(self
                .data
                .lock()
                .unwrap()
                .keys()
                .filter(|k| k.starts_with(prefix))
                .cloned()
                .collect())
        }
    }

    #[tokio::test]
    async fn test_get_set_roundtrip() {
        let storage = ExternalStorage::new(FakeClient::new(), "cache:");
        storage
            .set("cache:k", b"v".to_vec(), &CacheOptions::default())
            .await
            .unwrap();
        let got = storage.get("cache:k").await.unwrap();
        assert_eq!(got.unwrap().value, b"v".to_vec());
    }

    #[tokio::test]
    async fn test_clear_is_prefix_scoped() {
        let client = FakeClient::new();
        client.set("cache:a", b"1".to_vec(), None).await.unwrap();
        client.set("other:b", b"2".to_vec(), None).await.unwrap();
        let storage = ExternalStorage::new(client, "cache:");

        storage.clear().await.unwrap();

        assert!(storage.get("cache:a").await.unwrap().is_none());
        // "other:b" belongs to a different prefix and must survive.
        let scan = storage.client.scan_prefix("other:").await.unwrap();
        assert_eq!(scan.len(), 1);
    }

    #[tokio::test]
    async fn test_transport_error_propagates_for_manager_to_handle() {
        let client = FakeClient::new();
        client.fail_next.store(true, Ordering::SeqCst);
        let storage = ExternalStorage::new(client, "cache:");

        let err = storage.get("k").await.unwrap_err();
        assert!(matches!(err, CacheError::Transport(_)));
    }
}

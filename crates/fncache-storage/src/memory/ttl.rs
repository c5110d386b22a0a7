//! In-memory TTL storage: insertion-ordered mapping with lazy expiry.

use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::RwLock;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use fncache_core::{CacheEntry, CacheError, CacheOptions, CacheStats, Storage, SyncStorage};

/// Sweep for expired entries every this many writes, per the budget the
/// storage contract suggests for opportunistic reclamation.
const SWEEP_EVERY_N_WRITES: u64 = 1024;

#[derive(Debug, Default)]
struct TtlStats {
    hits: u64,
    misses: u64,
    writes: u64,
    deletes: u64,
    evictions: u64,
}

/// Mapping from key to (payload, absolute-expiry-instant). Reads lazily
/// skip and reclaim expired entries; no background reaper thread is run.
#[derive(Clone)]
pub struct MemoryTtlStorage {
    data: Arc<DashMap<String, CacheEntry<Vec<u8>>>>,
    stats: Arc<RwLock<TtlStats>>,
    write_count: Arc<AtomicU64>,
}

impl MemoryTtlStorage {
    pub fn new() -> Self {
        Self {
            data: Arc::new(DashMap::new()),
            stats: Arc::new(RwLock::new(TtlStats::default())),
            write_count: Arc::new(AtomicU64::new(0)),
        }
    }

    fn sweep_expired(&self) {
        let expired: Vec<String> = self
            .data
            .iter()
            .filter(|entry| entry.is_expired())
            .map(|entry| entry.key().clone())
            .collect();
        let mut stats = self.stats.write();
        for key in expired {
            if self.data.remove(&key).is_some() {
                stats.evictions += 1;
            }
        }
    }

    fn memory_usage(&self) -> usize {
        self.data.iter().map(|e| e.size + e.key().len()).sum()
    }

    fn get_impl(&self, key: &str) -> Option<CacheEntry<Vec<u8>>> {
        match self.data.get(key) {
            Some(entry) if entry.is_expired() => {
                drop(entry);
                self.data.remove(key);
                self.stats.write().evictions += 1;
                None
            }
            Some(entry) => Some(entry.clone()),
            None => None,
        }
    }

    fn set_impl(&self, key: &str, value: Vec<u8>, options: &CacheOptions) {
        let size = value.len();
        let entry = match options.ttl {
            Some(ttl) if !ttl.is_zero() => CacheEntry::with_ttl(value, size, ttl),
            _ => CacheEntry::new(value, size),
        };
        self.data.insert(key.to_string(), entry);
        self.stats.write().writes += 1;

        if self.write_count.fetch_add(1, Ordering::Relaxed) % SWEEP_EVERY_N_WRITES == 0 {
            self.sweep_expired();
        }
    }

    fn delete_impl(&self, key: &str) -> bool {
        let existed = self.data.remove(key).is_some();
        if existed {
            self.stats.write().deletes += 1;
        }
        existed
    }

    fn incr_impl(&self, key: &str) -> u64 {
        let mut entry = self
            .data
            .entry(key.to_string())
            .or_insert_with(|| CacheEntry::new(0u64.to_be_bytes().to_vec(), 8));
        let current = u64::from_be_bytes(entry.value.clone().try_into().unwrap_or([0; 8]));
        let next = current + 1;
        entry.value = next.to_be_bytes().to_vec();
        next
    }
}

impl Default for MemoryTtlStorage {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Storage for MemoryTtlStorage {
    async fn get(&self, key: &str) -> Result<Option<CacheEntry<Vec<u8>>>, CacheError> {
        match self.get_impl(key) {
            Some(entry) => {
                self.stats.write().hits += 1;
                Ok(Some(entry))
            }
            None => {
                self.stats.write().misses += 1;
                Ok(None)
            }
        }
    }

    async fn set(&self, key: &str, value: Vec<u8>, options: &CacheOptions) -> Result<(), CacheError> {
        self.set_impl(key, value, options);
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<bool, CacheError> {
        Ok(self.delete_impl(key))
    }

    async fn incr(&self, key: &str) -> Result<u64, CacheError> {
        Ok(self.incr_impl(key))
    }

    async fn clear(&self) -> Result<(), CacheError> {
        self.data.clear();
        Ok(())
    }

    async fn stats(&self) -> Result<CacheStats, CacheError> {
        let stats = self.stats.read();
        Ok(CacheStats {
            hits: stats.hits,
            misses: stats.misses,
            writes: stats.writes,
            deletes: stats.deletes,
            evictions: stats.evictions,
            size: self.data.len(),
            memory_bytes: self.memory_usage(),
            capacity: None,
        })
    }

    async fn len(&self) -> Result<usize, CacheError> {
        Ok(self.data.len())
    }
}

impl SyncStorage for MemoryTtlStorage {
    fn get_sync(&self, key: &str) -> Result<Option<CacheEntry<Vec<u8>>>, CacheError> {
        match self.get_impl(key) {
            Some(e) => {
                self.stats.write().hits += 1;
                Ok(Some(e))
            }
            None => {
                self.stats.write().misses += 1;
                Ok(None)
            }
        }
    }

    fn set_sync(&self, key: &str, value: Vec<u8>, options: &CacheOptions) -> Result<(), CacheError> {
        self.set_impl(key, value, options);
        Ok(())
    }

    fn delete_sync(&self, key: &str) -> Result<bool, CacheError> {
        Ok(self.delete_impl(key))
    }

    fn incr_sync(&self, key: &str) -> Result<u64, CacheError> {
        Ok(self.incr_impl(key))
    }

    fn clear_sync(&self) -> Result<(), CacheError> {
        self.data.clear();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_basic_get_set() {
        let storage = MemoryTtlStorage::new();
        let options = CacheOptions {
            ttl: Some(Duration::from_secs(60)),
        };
        storage.set("key1", b"value1".to_vec(), &options).await.unwrap();

        let result = storage.get("key1").await.unwrap();
        assert_eq!(result.unwrap().value, b"value1".to_vec());
    }

    #[tokio::test]
    async fn test_expired_entry_is_miss() {
        let storage = MemoryTtlStorage::new();
        let options = CacheOptions {
            ttl: Some(Duration::from_millis(1)),
        };
        storage.set("key1", b"value1".to_vec(), &options).await.unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;

        let result = storage.get("key1").await.unwrap();
        assert!(result.is_none());
    }

    #[tokio::test]
    async fn test_no_ttl_never_expires() {
        let storage = MemoryTtlStorage::new();
        storage
            .set("key1", b"value1".to_vec(), &CacheOptions::default())
            .await
            .unwrap();
        let result = storage.get("key1").await.unwrap();
        assert!(result.is_some());
    }

    #[tokio::test]
    async fn test_delete_idempotent() {
        let storage = MemoryTtlStorage::new();
        storage
            .set("key1", b"value1".to_vec(), &CacheOptions::default())
            .await
            .unwrap();
        assert!(storage.delete("key1").await.unwrap());
        assert!(!storage.delete("key1").await.unwrap());
    }

    #[tokio::test]
    async fn test_incr_starts_at_one() {
        let storage = MemoryTtlStorage::new();
        assert_eq!(storage.incr("counter").await.unwrap(), 1);
        assert_eq!(storage.incr("counter").await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_clear() {
        let storage = MemoryTtlStorage::new();
        storage
            .set("key1", b"v".to_vec(), &CacheOptions::default())
            .await
            .unwrap();
        storage.clear().await.unwrap();
        assert_eq!(storage.len().await.unwrap(), 0);
    }
}

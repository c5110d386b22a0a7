//! In-memory LRU storage: bounded-capacity, access-ordered mapping.
//!
//! No ordered-map crate is carried in this workspace's dependency stack, so
//! recency is tracked by hand with a plain value map plus a separate
//! recency queue, the way a global cache with FIFO/LRU eviction policies
//! tracks its own order queue alongside its value map.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use fncache_core::{CacheEntry, CacheError, CacheOptions, CacheStats, Storage, SyncStorage};

#[derive(Debug, Default)]
struct LruStats {
    hits: u64,
    misses: u64,
    writes: u64,
    deletes: u64,
    evictions: u64,
}

struct Inner {
    entries: HashMap<String, CacheEntry<Vec<u8>>>,
    /// Recency queue, most-recently-used at the back. May contain stale
    /// duplicates left behind by a move-to-tail; `entries` is the source of
    /// truth for membership.
    order: VecDeque<String>,
}

/// Fixed-capacity LRU storage, optionally TTL-layered.
#[derive(Clone)]
pub struct MemoryLruStorage {
    capacity: usize,
    inner: Arc<Mutex<Inner>>,
    stats: Arc<Mutex<LruStats>>,
}

impl MemoryLruStorage {
    /// `capacity` must be greater than zero. This is a construction-time
    /// configuration error, never one discovered later at call time, so it
    /// panics here rather than returning a `CacheError` callers would have
    /// to thread through every storage constructor.
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "MemoryLruStorage capacity must be greater than zero");
        Self {
            capacity,
            inner: Arc::new(Mutex::new(Inner {
                entries: HashMap::new(),
                order: VecDeque::new(),
            })),
            stats: Arc::new(Mutex::new(LruStats::default())),
        }
    }

    fn touch(inner: &mut Inner, key: &str) {
        inner.order.push_back(key.to_string());
    }

    fn evict_to_capacity(&self, inner: &mut Inner) -> u64 {
        let mut evicted = 0;
        while inner.entries.len() > self.capacity {
            // Pop from the front until we find a key still live; this
            // drains stale duplicates left by earlier touches for free.
            while let Some(candidate) = inner.order.pop_front() {
                if inner.entries.contains_key(&candidate) {
                    inner.entries.remove(&candidate);
                    evicted += 1;
                    break;
                }
            }
            if inner.order.is_empty() && inner.entries.len() > self.capacity {
                // Defensive: shouldn't happen if order/entries stay in sync.
                break;
            }
        }
        evicted
    }

    fn memory_usage(inner: &Inner) -> usize {
        inner.entries.iter().map(|(k, v)| k.len() + v.size).sum()
    }
}

#[async_trait]
impl Storage for MemoryLruStorage {
    async fn get(&self, key: &str) -> Result<Option<CacheEntry<Vec<u8>>>, CacheError> {
        let mut inner = self.inner.lock();
        let expired = matches!(inner.entries.get(key), Some(e) if e.is_expired());
        if expired {
            inner.entries.remove(key);
            self.stats.lock().misses += 1;
            return Ok(None);
        }
        match inner.entries.get(key).cloned() {
            Some(entry) => {
                Self::touch(&mut inner, key);
                self.stats.lock().hits += 1;
                Ok(Some(entry))
            }
            None => {
                self.stats.lock().misses += 1;
                Ok(None)
            }
        }
    }

    async fn set(&self, key: &str, value: Vec<u8>, options: &CacheOptions) -> Result<(), CacheError> {
        let size = value.len();
        let entry = match options.ttl {
            Some(ttl) if !ttl.is_zero() => CacheEntry::with_ttl(value, size, ttl),
            _ => CacheEntry::new(value, size),
        };

        let mut inner = self.inner.lock();
        inner.entries.insert(key.to_string(), entry);
        Self::touch(&mut inner, key);
        let evicted = self.evict_to_capacity(&mut inner);
        drop(inner);

        let mut stats = self.stats.lock();
        stats.writes += 1;
        stats.evictions += evicted;
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<bool, CacheError> {
        let mut inner = self.inner.lock();
        let existed = inner.entries.remove(key).is_some();
        if existed {
            self.stats.lock().deletes += 1;
        }
        Ok(existed)
    }

    async fn incr(&self, key: &str) -> Result<u64, CacheError> {
        let mut inner = self.inner.lock();
        let current = inner
            .entries
            .get(key)
            .map(|e| u64::from_be_bytes(e.value.clone().try_into().unwrap_or([0; 8])))
            .unwrap_or(0);
        let next = current + 1;
        inner
            .entries
            .insert(key.to_string(), CacheEntry::new(next.to_be_bytes().to_vec(), 8));
        Self::touch(&mut inner, key);
        let evicted = self.evict_to_capacity(&mut inner);
        drop(inner);
        self.stats.lock().evictions += evicted;
        Ok(next)
    }

    async fn clear(&self) -> Result<(), CacheError> {
        let mut inner = self.inner.lock();
        inner.entries.clear();
        inner.order.clear();
        Ok(())
    }

    async fn stats(&self) -> Result<CacheStats, CacheError> {
        let inner = self.inner.lock();
        let stats = self.stats.lock();
        Ok(CacheStats {
            hits: stats.hits,
            misses: stats.misses,
            writes: stats.writes,
            deletes: stats.deletes,
            evictions: stats.evictions,
            size: inner.entries.len(),
            memory_bytes: Self::memory_usage(&inner),
            capacity: Some(self.capacity),
        })
    }

    async fn len(&self) -> Result<usize, CacheError> {
        Ok(self.inner.lock().entries.len())
    }
}

impl SyncStorage for MemoryLruStorage {
    fn get_sync(&self, key: &str) -> Result<Option<CacheEntry<Vec<u8>>>, CacheError> {
        let mut inner = self.inner.lock();
        let expired = matches!(inner.entries.get(key), Some(e) if e.is_expired());
        if expired {
            inner.entries.remove(key);
            self.stats.lock().misses += 1;
            return Ok(None);
        }
        match inner.entries.get(key).cloned() {
            Some(entry) => {
                Self::touch(&mut inner, key);
                self.stats.lock().hits += 1;
                Ok(Some(entry))
            }
            None => {
                self.stats.lock().misses += 1;
                Ok(None)
            }
        }
    }

    fn set_sync(&self, key: &str, value: Vec<u8>, options: &CacheOptions) -> Result<(), CacheError> {
        let size = value.len();
        let entry = match options.ttl {
            Some(ttl) if !ttl.is_zero() => CacheEntry::with_ttl(value, size, ttl),
            _ => CacheEntry::new(value, size),
        };
        let mut inner = self.inner.lock();
        inner.entries.insert(key.to_string(), entry);
        Self::touch(&mut inner, key);
        let evicted = self.evict_to_capacity(&mut inner);
        drop(inner);
        let mut stats = self.stats.lock();
        stats.writes += 1;
        stats.evictions += evicted;
        Ok(())
    }

    fn delete_sync(&self, key: &str) -> Result<bool, CacheError> {
        let mut inner = self.inner.lock();
        let existed = inner.entries.remove(key).is_some();
        if existed {
            self.stats.lock().deletes += 1;
        }
        Ok(existed)
    }

    fn incr_sync(&self, key: &str) -> Result<u64, CacheError> {
        let mut inner = self.inner.lock();
        let current = inner
            .entries
            .get(key)
            .map(|e| u64::from_be_bytes(e.value.clone().try_into().unwrap_or([0; 8])))
            .unwrap_or(0);
        let next = current + 1;
        inner
            .entries
            .insert(key.to_string(), CacheEntry::new(next.to_be_bytes().to_vec(), 8));
        Self::touch(&mut inner, key);
        drop(inner);
        Ok(next)
    }

    fn clear_sync(&self) -> Result<(), CacheError> {
        let mut inner = self.inner.lock();
        inner.entries.clear();
        inner.order.clear();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_capacity_is_enforced() {
        let storage = MemoryLruStorage::new(2);
        let opts = CacheOptions::default();
        storage.set("a", b"1".to_vec(), &opts).await.unwrap();
        storage.set("b", b"2".to_vec(), &opts).await.unwrap();
        storage.set("c", b"3".to_vec(), &opts).await.unwrap();

        assert_eq!(storage.len().await.unwrap(), 2);
        assert!(storage.get("a").await.unwrap().is_none());
        assert!(storage.get("b").await.unwrap().is_some());
        assert!(storage.get("c").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_recently_read_survives_eviction() {
        let storage = MemoryLruStorage::new(2);
        let opts = CacheOptions::default();
        storage.set("a", b"1".to_vec(), &opts).await.unwrap();
        storage.set("b", b"2".to_vec(), &opts).await.unwrap();
        // Touch "a" so it becomes the most recently used.
        storage.get("a").await.unwrap();
        storage.set("c", b"3".to_vec(), &opts).await.unwrap();

        assert!(storage.get("a").await.unwrap().is_some());
        assert!(storage.get("b").await.unwrap().is_none());
        assert!(storage.get("c").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_ttl_layered_on_lru() {
        let storage = MemoryLruStorage::new(10);
        let opts = CacheOptions {
            ttl: Some(std::time::Duration::from_millis(1)),
        };
        storage.set("a", b"1".to_vec(), &opts).await.unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        assert!(storage.get("a").await.unwrap().is_none());
    }
}

//! Version counters: a global counter plus per-user counters, persisted
//! through whatever storage the cache manager uses. Concatenating a
//! counter's current value into every cache key makes bulk invalidation an
//! O(1) increment rather than an enumerate-and-delete.

use std::sync::Arc;

use fncache_core::{CacheOptions, CacheError, Storage};

fn decode_counter(bytes: &[u8]) -> u64 {
    let mut buf = [0u8; 8];
    let len = bytes.len().min(8);
    buf[..len].copy_from_slice(&bytes[..len]);
    u64::from_be_bytes(buf)
}

/// Process-wide version counters for one cache manager.
///
/// The first read of a counter that was never written initializes it to 1
/// and persists that value; `Storage::incr` already treats a missing key as
/// 0 before adding 1, so the two code paths agree on "1" as the first value
/// a counter ever takes.
pub struct VersionRegistry<St: Storage> {
    storage: Arc<St>,
    global_key: String,
    user_key_prefix: String,
}

impl<St: Storage> VersionRegistry<St> {
    pub fn new(storage: Arc<St>, library_name: &str) -> Self {
        Self {
            storage,
            global_key: format!("{library_name}:global:version"),
            user_key_prefix: format!("{library_name}:user:version:"),
        }
    }

    fn user_key(&self, user_id: &str) -> String {
        format!("{}{}", self.user_key_prefix, user_id)
    }

    pub async fn global_version(&self) -> Result<u64, CacheError> {
        match self.storage.get(&self.global_key).await? {
            Some(entry) => Ok(decode_counter(&entry.value)),
            None => {
                self.storage
                    .set(&self.global_key, 1u64.to_be_bytes().to_vec(), &CacheOptions::default())
                    .await?;
                Ok(1)
            }
        }
    }

    pub async fn user_version(&self, user_id: &str) -> Result<u64, CacheError> {
        let key = self.user_key(user_id);
        match self.storage.get(&key).await? {
            Some(entry) => Ok(decode_counter(&entry.value)),
            None => {
                self.storage
                    .set(&key, 1u64.to_be_bytes().to_vec(), &CacheOptions::default())
                    .await?;
                Ok(1)
            }
        }
    }

    pub async fn increment_global(&self) -> Result<u64, CacheError> {
        self.storage.incr(&self.global_key).await
    }

    pub async fn increment_user(&self, user_id: &str) -> Result<u64, CacheError> {
        self.storage.incr(&self.user_key(user_id)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fncache_storage::MemoryTtlStorage;

    #[tokio::test]
    async fn test_first_read_is_one() {
        let registry = VersionRegistry::new(Arc::new(MemoryTtlStorage::new()), "fncache");
        assert_eq!(registry.global_version().await.unwrap(), 1);
        assert_eq!(registry.user_version("42").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_increment_is_monotonic() {
        let registry = VersionRegistry::new(Arc::new(MemoryTtlStorage::new()), "fncache");
        assert_eq!(registry.increment_global().await.unwrap(), 1);
        assert_eq!(registry.increment_global().await.unwrap(), 2);
        assert_eq!(registry.global_version().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_user_counters_are_independent() {
        let registry = VersionRegistry::new(Arc::new(MemoryTtlStorage::new()), "fncache");
        registry.increment_user("1").await.unwrap();
        assert_eq!(registry.user_version("1").await.unwrap(), 1);
        assert_eq!(registry.user_version("2").await.unwrap(), 1);
    }
}

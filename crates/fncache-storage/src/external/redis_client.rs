//! Redis-backed [`ExternalStoreClient`].

use async_trait::async_trait;
use bb8::Pool;
use bb8_redis::RedisConnectionManager;
use redis::AsyncCommands;
use std::time::Duration;

use fncache_core::{CacheError, ExternalStoreClient};

/// Connection parameters for the Redis-backed external store.
#[derive(Debug, Clone)]
pub struct RedisConfig {
    pub url: String,
    pub pool_size: u32,
    pub connect_timeout: Duration,
    pub command_timeout: Duration,
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            url: "redis://127.0.0.1:6379".to_string(),
            pool_size: 10,
            connect_timeout: Duration::from_secs(1),
            command_timeout: Duration::from_secs(1),
        }
    }
}

impl RedisConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Default::default()
        }
    }

    /// Build connection parameters from `FNCACHE_REDIS_*` environment
    /// variables, falling back to defaults for anything unset.
    pub fn from_env() -> Self {
        let mut cfg = Self::default();
        let host = std::env::var("FNCACHE_REDIS_HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
        let port = std::env::var("FNCACHE_REDIS_PORT").unwrap_or_else(|_| "6379".to_string());
        let db = std::env::var("FNCACHE_REDIS_DB").unwrap_or_else(|_| "0".to_string());
        cfg.url = match std::env::var("FNCACHE_REDIS_PASSWORD") {
            Ok(password) if !password.is_empty() => {
                format!("redis://:{password}@{host}:{port}/{db}")
            }
            _ => format!("redis://{host}:{port}/{db}"),
        };
        cfg
    }
}

/// [`ExternalStoreClient`] backed by a pooled Redis connection.
#[derive(Clone)]
pub struct RedisStoreClient {
    pool: Pool<RedisConnectionManager>,
    command_timeout: Duration,
}

impl RedisStoreClient {
    pub async fn connect(config: RedisConfig) -> Result<Self, CacheError> {
        let manager = RedisConnectionManager::new(config.url.as_str())
            .map_err(|e| CacheError::Configuration(e.to_string()))?;

        let pool = Pool::builder()
            .max_size(config.pool_size)
            .connection_timeout(config.connect_timeout)
            .build(manager)
            .await
            .map_err(|e| CacheError::Transport(e.to_string()))?;

        Ok(Self {
            pool,
            command_timeout: config.command_timeout,
        })
    }

    async fn with_timeout<F, T>(&self, fut: F) -> Result<T, CacheError>
    where
        F: std::future::Future<Output = Result<T, CacheError>>,
    {
        tokio::time::timeout(self.command_timeout, fut)
            .await
            .map_err(|_| CacheError::Transport("operation timed out".to_string()))?
    }
}

#[async_trait]
impl ExternalStoreClient for RedisStoreClient {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, CacheError> {
        self.with_timeout(async {
            let mut conn = self
                .pool
                .get()
                .await
                .map_err(|e| CacheError::Transport(e.to_string()))?;
            conn.get(key)
                .await
                .map_err(|e| CacheError::Transport(e.to_string()))
        })
        .await
    }

    async fn set(&self, key: &str, value: Vec<u8>, ttl_secs: Option<u64>) -> Result<(), CacheError> {
        self.with_timeout(async {
            let mut conn = self
                .pool
                .get()
                .await
                .map_err(|e| CacheError::Transport(e.to_string()))?;
            match ttl_secs {
                Some(ttl) if ttl > 0 => conn
                    .set_ex::<_, _, ()>(key, value, ttl)
                    .await
                    .map_err(|e| CacheError::Transport(e.to_string())),
                _ => conn
                    .set::<_, _, ()>(key, value)
                    .await
                    .map_err(|e| CacheError::Transport(e.to_string())),
            }
        })
        .await
    }

    async fn delete(&self, key: &str) -> Result<bool, CacheError> {
        self.with_timeout(async {
            let mut conn = self
                .pool
                .get()
                .await
                .map_err(|e| CacheError::Transport(e.to_string()))?;
            conn.del(key)
                .await
                .map_err(|e| CacheError::Transport(e.to_string()))
        })
        .await
    }

    async fn incr(&self, key: &str) -> Result<u64, CacheError> {
        self.with_timeout(async {
            let mut conn = self
                .pool
                .get()
                .await
                .map_err(|e| CacheError::Transport(e.to_string()))?;
            conn.incr(key, 1u64)
                .await
                .map_err(|e| CacheError::Transport(e.to_string()))
        })
        .await
    }

    async fn scan_prefix(&self, prefix: &str) -> Result<Vec<String>, CacheError> {
        self.with_timeout(async {
            let mut conn = self
                .pool
                .get()
                .await
                .map_err(|e| CacheError::Transport(e.to_string()))?;
            let pattern = format!("{prefix}*");
            let mut cursor = 0u64;
            let mut found = Vec::new();
            loop {
                let (next_cursor, keys): (u64, Vec<String>) = redis::cmd("SCAN")
                    .cursor_arg(cursor)
                    .arg("MATCH")
                    .arg(&pattern)
                    .arg("COUNT")
                    .arg(1000)
                    .query_async(&mut *conn)
                    .await
                    .map_err(|e| CacheError::Transport(e.to_string()))?;
                found.extend(keys);
                cursor = next_cursor;
                if cursor == 0 {
                    break;
                }
            }
            Ok(found)
        })
        .await
    }
}

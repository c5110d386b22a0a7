//! Concrete `Storage`/`ExternalStoreClient` implementations: in-memory
//! TTL and LRU backends, and an adapter onto external key-value stores.

#[cfg(feature = "memory")]
pub mod memory;

#[cfg(feature = "memory")]
pub use memory::{MemoryLruStorage, MemoryTtlStorage};

pub mod external;

pub use external::ExternalStorage;

#[cfg(feature = "redis")]
pub use external::{RedisConfig, RedisStoreClient};

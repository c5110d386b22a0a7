//! Core traits for cache operations.

mod serializer;
mod storage;

pub use serializer::{JsonSerializer, RawStringSerializer, Serializer};
pub use storage::{ExternalStoreClient, Storage, SyncStorage};

#[cfg(feature = "msgpack")]
pub use serializer::MsgPackSerializer;

#[cfg(feature = "bincode")]
pub use serializer::BincodeSerializer;

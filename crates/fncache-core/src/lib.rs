//! fncache-core: core traits and types for the fncache function-result
//! caching engine.
//!
//! This crate has no storage implementations and no runtime manager — it
//! defines the seams the rest of the workspace builds on: the [`Storage`]
//! contract, pluggable [`Serializer`]s, the [`RenderValue`] argument-key sum
//! type, and the shared [`CacheError`] taxonomy.

mod error;
mod render;
mod traits;
mod types;

pub use error::{CacheError, Result};
pub use render::{RenderValue, ToRenderValue};
pub use traits::*;
pub use types::*;

//! Storage-write options.

use std::time::Duration;

/// Options accompanying a storage `set`.
#[derive(Debug, Clone, Default)]
pub struct CacheOptions {
    /// Time-to-live. `None` or zero means "no expiry" for in-memory
    /// storages, "use backend default" for external ones.
    pub ttl: Option<Duration>,
}

/// Builder for [`CacheOptions`] with a fluent API.
#[derive(Debug, Clone, Default)]
pub struct CacheOpts(CacheOptions);

impl CacheOpts {
    /// Create a new options builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set TTL.
    pub fn ttl(mut self, duration: Duration) -> Self {
        self.0.ttl = Some(duration);
        self
    }

    /// Set TTL in seconds.
    pub fn ttl_secs(self, seconds: u64) -> Self {
        self.ttl(Duration::from_secs(seconds))
    }

    /// Build the options.
    pub fn build(self) -> CacheOptions {
        self.0
    }
}

impl From<CacheOpts> for CacheOptions {
    fn from(opts: CacheOpts) -> Self {
        opts.0
    }
}

impl From<Duration> for CacheOptions {
    fn from(ttl: Duration) -> Self {
        CacheOptions { ttl: Some(ttl) }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_default() {
        let opts = CacheOpts::new().build();
        assert!(opts.ttl.is_none());
    }

    #[test]
    fn test_builder_fluent() {
        let opts = CacheOpts::new().ttl_secs(60).build();
        assert_eq!(opts.ttl, Some(Duration::from_secs(60)));
    }

    #[test]
    fn test_from_duration() {
        let opts: CacheOptions = Duration::from_secs(300).into();
        assert_eq!(opts.ttl, Some(Duration::from_secs(300)));
    }
}

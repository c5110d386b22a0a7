//! Cache entry type.

use std::time::Duration;
use tokio::time::Instant;

/// A stored payload plus its absolute expiry instant.
///
/// Entries are inserted on a miss-then-produce, mutated only by being
/// re-inserted (TTL refresh is never implicit), and destroyed by explicit
/// delete, eviction, or a lazy skip on expired read.
///
/// Expiry is measured against [`tokio::time::Instant`] rather than
/// `SystemTime`/`std::time::Instant` so that tests running under
/// `#[tokio::test(start_paused = true)]` and `tokio::time::advance` actually
/// exercise expiry — `SystemTime::now()` ignores the paused virtual clock
/// entirely.
#[derive(Debug, Clone)]
pub struct CacheEntry<T> {
    /// The cached value.
    pub value: T,
    /// When the entry was created.
    pub created_at: Instant,
    /// Absolute expiry instant. `None` means "never expires".
    pub expires_at: Option<Instant>,
    /// Size in bytes of the serialized payload, used by the memory monitor.
    pub size: usize,
}

impl<T> CacheEntry<T> {
    /// Create an entry with no expiry.
    pub fn new(value: T, size: usize) -> Self {
        Self {
            value,
            created_at: Instant::now(),
            expires_at: None,
            size,
        }
    }

    /// Create an entry expiring `ttl` from now. `ttl <= 0` never expires.
    pub fn with_ttl(value: T, size: usize, ttl: Duration) -> Self {
        let mut entry = Self::new(value, size);
        if !ttl.is_zero() {
            entry.expires_at = entry.created_at.checked_add(ttl);
        }
        entry
    }

    /// True if this entry's expiry instant is at or before now.
    pub fn is_expired(&self) -> bool {
        match self.expires_at {
            Some(instant) => instant <= Instant::now(),
            None => false,
        }
    }

    /// Remaining time before expiry, `None` if the entry never expires or
    /// has already expired.
    pub fn ttl_remaining(&self) -> Option<Duration> {
        self.expires_at
            .and_then(|instant| instant.checked_duration_since(Instant::now()))
    }

    /// Age of the entry since creation.
    pub fn age(&self) -> Duration {
        self.created_at.elapsed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_new_entry_never_expires() {
        let entry = CacheEntry::new("test".to_string(), 4);
        assert_eq!(entry.value, "test");
        assert!(!entry.is_expired());
        assert!(entry.ttl_remaining().is_none());
    }

    #[tokio::test]
    async fn test_entry_with_ttl() {
        let entry = CacheEntry::with_ttl("test".to_string(), 4, Duration::from_secs(60));
        assert!(!entry.is_expired());
        assert!(entry.ttl_remaining().is_some());
    }

    #[tokio::test]
    async fn test_entry_with_zero_ttl_never_expires() {
        let entry = CacheEntry::with_ttl("test".to_string(), 4, Duration::from_secs(0));
        assert!(entry.expires_at.is_none());
        assert!(!entry.is_expired());
    }

    #[tokio::test(start_paused = true)]
    async fn test_entry_expires_after_paused_clock_advance() {
        let entry = CacheEntry::with_ttl("test".to_string(), 4, Duration::from_secs(2));
        assert!(!entry.is_expired());

        tokio::time::advance(Duration::from_secs(3)).await;
        assert!(entry.is_expired());
    }
}

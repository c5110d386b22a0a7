//! Cache lookup result type.

use super::entry::CacheEntry;

/// Result of a storage lookup operation.
#[derive(Debug, Clone)]
pub enum CacheResult<T> {
    /// Fresh cache hit.
    Hit(CacheEntry<T>),
    /// Cache miss: absent, expired, or suppressed by an error.
    Miss,
}

impl<T> CacheResult<T> {
    /// True if this is a hit.
    pub fn is_hit(&self) -> bool {
        matches!(self, CacheResult::Hit(_))
    }

    /// True if this is a miss.
    pub fn is_miss(&self) -> bool {
        matches!(self, CacheResult::Miss)
    }

    /// Extract the value, consuming the result.
    pub fn value(self) -> Option<T> {
        match self {
            CacheResult::Hit(entry) => Some(entry.value),
            CacheResult::Miss => None,
        }
    }

    /// Extract the full entry, consuming the result.
    pub fn entry(self) -> Option<CacheEntry<T>> {
        match self {
            CacheResult::Hit(entry) => Some(entry),
            CacheResult::Miss => None,
        }
    }

    /// Map the value if present.
    pub fn map<U, F>(self, f: F) -> CacheResult<U>
    where
        F: FnOnce(T) -> U,
    {
        match self {
            CacheResult::Hit(entry) => CacheResult::Hit(CacheEntry {
                value: f(entry.value),
                created_at: entry.created_at,
                expires_at: entry.expires_at,
                size: entry.size,
            }),
            CacheResult::Miss => CacheResult::Miss,
        }
    }
}

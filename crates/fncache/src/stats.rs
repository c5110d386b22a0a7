//! Per-manager statistics: hit/miss/set/delete/error counters plus a
//! Welford running mean of operation latency in microseconds.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use parking_lot::Mutex;

#[derive(Debug, Default)]
struct Welford {
    count: u64,
    mean_us: f64,
    m2: f64,
}

impl Welford {
    fn observe(&mut self, sample_us: f64) {
        self.count += 1;
        let delta = sample_us - self.mean_us;
        self.mean_us += delta / self.count as f64;
        let delta2 = sample_us - self.mean_us;
        self.m2 += delta * delta2;
    }

    fn variance(&self) -> f64 {
        if self.count > 1 {
            self.m2 / (self.count - 1) as f64
        } else {
            0.0
        }
    }
}

/// Read-only snapshot of a manager's counters, exposed by `get_statistics`.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct StatsSnapshot {
    pub hits: u64,
    pub misses: u64,
    pub sets: u64,
    pub deletes: u64,
    pub errors: u64,
    pub mean_latency_us: f64,
    pub latency_variance_us: f64,
    pub sample_count: u64,
}

impl StatsSnapshot {
    pub fn total_calls(&self) -> u64 {
        self.hits + self.misses
    }

    pub fn hit_ratio(&self) -> f64 {
        let total = self.total_calls();
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

/// Hit/miss/set/delete/error counters and a latency accumulator for one
/// cache manager. Counters are atomic; the latency accumulator is
/// mutex-guarded since Welford's update is not representable with a single
/// atomic operation.
#[derive(Default)]
pub struct Statistics {
    hits: AtomicU64,
    misses: AtomicU64,
    sets: AtomicU64,
    deletes: AtomicU64,
    errors: AtomicU64,
    latency: Mutex<Welford>,
}

impl Statistics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_hit(&self) {
        self.hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_miss(&self) {
        self.misses.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_set(&self) {
        self.sets.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_delete(&self) {
        self.deletes.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_error(&self) {
        self.errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_latency(&self, elapsed: Duration) {
        self.latency.lock().observe(elapsed.as_secs_f64() * 1_000_000.0);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        let latency = self.latency.lock();
        StatsSnapshot {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            sets: self.sets.load(Ordering::Relaxed),
            deletes: self.deletes.load(Ordering::Relaxed),
            errors: self.errors.load(Ordering::Relaxed),
            mean_latency_us: latency.mean_us,
            latency_variance_us: latency.variance(),
            sample_count: latency.count,
        }
    }

    pub fn reset(&self) {
        self.hits.store(0, Ordering::Relaxed);
        self.misses.store(0, Ordering::Relaxed);
        self.sets.store(0, Ordering::Relaxed);
        self.deletes.store(0, Ordering::Relaxed);
        self.errors.store(0, Ordering::Relaxed);
        *self.latency.lock() = Welford::default();
    }
}

/// What the memory monitor reports for one manager's storage. External
/// storages report `capacity: None` and a best-effort byte estimate — per
/// the memory monitor's contract, an external store's true footprint is
/// "unknown" and is reported as zero.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct MemoryReport {
    pub entries: usize,
    pub bytes: usize,
    pub capacity: Option<usize>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hit_ratio() {
        let stats = Statistics::new();
        stats.record_hit();
        stats.record_hit();
        stats.record_miss();
        let snap = stats.snapshot();
        assert_eq!(snap.total_calls(), 3);
        assert!((snap.hit_ratio() - 2.0 / 3.0).abs() < 1e-9);
    }

    #[test]
    fn test_latency_mean() {
        let stats = Statistics::new();
        stats.record_latency(Duration::from_micros(100));
        stats.record_latency(Duration::from_micros(200));
        let snap = stats.snapshot();
        assert!((snap.mean_latency_us - 150.0).abs() < 1.0);
        assert_eq!(snap.sample_count, 2);
    }

    #[test]
    fn test_reset_clears_everything() {
        let stats = Statistics::new();
        stats.record_hit();
        stats.record_latency(Duration::from_micros(50));
        stats.reset();
        let snap = stats.snapshot();
        assert_eq!(snap, StatsSnapshot::default());
    }
}

//! Process-wide registry of every cache manager ever constructed, plus the
//! single on/off flag every manager consults on every get and set.

use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use async_trait::async_trait;
use once_cell::sync::Lazy;
use parking_lot::Mutex;
use tokio::task::JoinHandle;

use fncache_core::{CacheError, Result};

use crate::stats::{MemoryReport, StatsSnapshot};

type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;
type PreloadFn = Arc<dyn Fn() -> BoxFuture<'static, ()> + Send + Sync>;

/// What a cache manager exposes to the global registry: enough to fan out
/// bulk invalidation and to gather statistics/memory reports without the
/// registry needing to know the manager's storage or serializer types.
#[async_trait]
pub trait RegisteredManager: Send + Sync {
    fn name(&self) -> &str;
    async fn invalidate_all_version(&self) -> Result<u64>;
    async fn invalidate_user_version(&self, user_id: &str) -> Result<u64>;
    fn stats_snapshot(&self) -> StatsSnapshot;
    fn reset_statistics(&self);
    async fn memory_report(&self) -> MemoryReport;
}

struct Inner {
    managers: Vec<Weak<dyn RegisteredManager>>,
    preloads: Vec<PreloadFn>,
}

/// Global on/off flag, manager list, and preload-provider list. One
/// instance per process, lazily initialized at first use with no implicit
/// ordering between it and any particular manager's construction.
pub struct GlobalRegistry {
    enabled: AtomicBool,
    inner: Mutex<Inner>,
    monitor: Mutex<Option<JoinHandle<()>>>,
}

static REGISTRY: Lazy<GlobalRegistry> = Lazy::new(|| GlobalRegistry {
    enabled: AtomicBool::new(true),
    inner: Mutex::new(Inner {
        managers: Vec::new(),
        preloads: Vec::new(),
    }),
    monitor: Mutex::new(None),
});

/// The process-wide registry singleton.
pub fn global() -> &'static GlobalRegistry {
    &REGISTRY
}

impl GlobalRegistry {
    pub fn register_manager(&self, manager: Weak<dyn RegisteredManager>) {
        self.inner.lock().managers.push(manager);
    }

    pub fn register_preload<F, Fut>(&self, provider: F)
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.inner
            .lock()
            .preloads
            .push(Arc::new(move || Box::pin(provider())));
    }

    pub fn enable(&self) {
        self.enabled.store(true, Ordering::SeqCst);
    }

    pub fn disable(&self) {
        self.enabled.store(false, Ordering::SeqCst);
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::SeqCst)
    }

    fn live_managers(&self) -> Vec<Arc<dyn RegisteredManager>> {
        self.inner
            .lock()
            .managers
            .iter()
            .filter_map(|w| w.upgrade())
            .collect()
    }

    /// Increment the global version counter on every registered manager.
    pub async fn invalidate_all(&self) {
        for manager in self.live_managers() {
            if let Err(err) = manager.invalidate_all_version().await {
                log_registry_error(manager.name(), err);
            }
        }
    }

    /// Increment the per-user version counter, scoped to `user_id`, on
    /// every registered manager that recognizes it.
    pub async fn invalidate_user(&self, user_id: &str) {
        for manager in self.live_managers() {
            if let Err(err) = manager.invalidate_user_version(user_id).await {
                log_registry_error(manager.name(), err);
            }
        }
    }

    /// Invoke every registered preload provider, priming its wrapper's
    /// cache with the argument tuples it yields.
    pub async fn preload_all(&self) {
        let preloads = self.inner.lock().preloads.clone();
        for preload in preloads {
            preload().await;
        }
    }

    pub fn statistics(&self) -> Vec<(String, StatsSnapshot)> {
        self.live_managers()
            .into_iter()
            .map(|m| (m.name().to_string(), m.stats_snapshot()))
            .collect()
    }

    pub fn reset_statistics(&self) {
        for manager in self.live_managers() {
            manager.reset_statistics();
        }
    }

    pub async fn memory_usage(&self) -> Vec<(String, MemoryReport)> {
        let mut out = Vec::new();
        for manager in self.live_managers() {
            let report = manager.memory_report().await;
            out.push((manager.name().to_string(), report));
        }
        out
    }

    /// Start a background sampler that logs one summary line per tick.
    /// Replaces any previously running sampler.
    pub fn start_memory_monitoring(&self, interval: Duration) {
        self.stop_memory_monitoring();
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                for (name, report) in global().memory_usage().await {
                    tracing_log_memory(&name, &report);
                }
            }
        });
        *self.monitor.lock() = Some(handle);
    }

    pub fn stop_memory_monitoring(&self) {
        if let Some(handle) = self.monitor.lock().take() {
            handle.abort();
        }
    }
}

fn log_registry_error(manager_name: &str, err: CacheError) {
    #[cfg(feature = "tracing")]
    tracing::warn!(manager = manager_name, error = %err, "registry fan-out operation failed for manager");
    #[cfg(not(feature = "tracing"))]
    let _ = (manager_name, err);
}

fn tracing_log_memory(manager_name: &str, report: &MemoryReport) {
    #[cfg(feature = "tracing")]
    tracing::info!(
        manager = manager_name,
        entries = report.entries,
        bytes = report.bytes,
        capacity = ?report.capacity,
        "memory monitor tick"
    );
    #[cfg(not(feature = "tracing"))]
    let _ = (manager_name, report);
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct FakeManager {
        invalidated: AtomicU32,
    }

    #[async_trait]
    impl RegisteredManager for FakeManager {
        fn name(&self) -> &str {
            "fake"
        }
        async fn invalidate_all_version(&self) -> Result<u64> {
            Ok(self.invalidated.fetch_add(1, Ordering::SeqCst) as u64 + 1)
        }
        async fn invalidate_user_version(&self, _user_id: &str) -> Result<u64> {
            Ok(1)
        }
        fn stats_snapshot(&self) -> StatsSnapshot {
            StatsSnapshot::default()
        }
        fn reset_statistics(&self) {}
        async fn memory_report(&self) -> MemoryReport {
            MemoryReport::default()
        }
    }

    #[tokio::test]
    async fn test_enable_disable_flag() {
        let registry = GlobalRegistry {
            enabled: AtomicBool::new(true),
            inner: Mutex::new(Inner {
                managers: Vec::new(),
                preloads: Vec::new(),
            }),
            monitor: Mutex::new(None),
        };
        assert!(registry.is_enabled());
        registry.disable();
        assert!(!registry.is_enabled());
        registry.enable();
        assert!(registry.is_enabled());
    }

    #[tokio::test]
    async fn test_invalidate_all_fans_out_to_live_managers() {
        let registry = GlobalRegistry {
            enabled: AtomicBool::new(true),
            inner: Mutex::new(Inner {
                managers: Vec::new(),
                preloads: Vec::new(),
            }),
            monitor: Mutex::new(None),
        };
        let manager: Arc<dyn RegisteredManager> = Arc::new(FakeManager {
            invalidated: AtomicU32::new(0),
        });
        registry.register_manager(Arc::downgrade(&manager));
        registry.invalidate_all().await;
        let stats = registry.statistics();
        assert_eq!(stats.len(), 1);
    }

    #[tokio::test]
    async fn test_dropped_manager_is_not_fanned_out_to() {
        let registry = GlobalRegistry {
            enabled: AtomicBool::new(true),
            inner: Mutex::new(Inner {
                managers: Vec::new(),
                preloads: Vec::new(),
            }),
            monitor: Mutex::new(None),
        };
        {
            let manager: Arc<dyn RegisteredManager> = Arc::new(FakeManager {
                invalidated: AtomicU32::new(0),
            });
            registry.register_manager(Arc::downgrade(&manager));
        }
        assert_eq!(registry.statistics().len(), 0);
    }
}

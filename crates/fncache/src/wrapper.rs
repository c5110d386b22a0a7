//! The invocation wrapper: turns a plain procedure into a cache-backed one.
//!
//! Construction binds a [`CacheManager`] (created or reused by the caller)
//! to one procedure's identity and call-key policy. Each call runs the
//! state machine from the component design:
//!
//! ```text
//! idle -> lookup -> [hit]  -> return
//! idle -> lookup -> [miss] -> acquire-singleflight -> [existing] -> await -> return
//!                                                   -> [new]      -> execute -> [ok]   -> store -> release -> return
//!                                                                            -> [fail] -> release -> raise
//! ```

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::Serialize;

use fncache_core::{CacheResult, Serializer, Storage};

use crate::key_builder::{resolve_fragment, CallArgs, KeyBuilder};
use crate::manager::{CacheManager, CoalesceError, Coalescer};
use crate::registry;

type KeyFn = Arc<dyn Fn(&CallArgs) -> String + Send + Sync>;
type DynamicTtlFn<T> = Arc<dyn Fn(&T) -> Option<Duration> + Send + Sync>;

/// One seed a preload provider yields: the call's rendered arguments, an
/// optional user id, and a thunk that recomputes the value to store. Errors
/// from a preload thunk are logged and skipped rather than propagated —
/// startup priming must not crash the caller over one bad seed.
pub type PreloadSeed<T> = (
    CallArgs,
    Option<String>,
    Arc<dyn Fn() -> Pin<Box<dyn Future<Output = Result<T, String>> + Send>> + Send + Sync>,
);

#[derive(Clone, Debug)]
struct PreloadError(String);
impl ToString for PreloadError {
    fn to_string(&self) -> String {
        self.0.clone()
    }
}
impl From<String> for PreloadError {
    fn from(s: String) -> Self {
        PreloadError(s)
    }
}

/// Per-call overrides the wrapper strips before forwarding to the
/// underlying procedure.
#[derive(Debug, Clone, Copy)]
pub struct CallOptions {
    /// If false, skip the lookup and force execution.
    pub cache_read: bool,
    /// If false, do not store the result.
    pub cache_write: bool,
    /// If false (async callers only), schedule the store concurrently and
    /// return immediately instead of waiting for it to land.
    pub wait_for_write: bool,
}

impl Default for CallOptions {
    fn default() -> Self {
        Self {
            cache_read: true,
            cache_write: true,
            wait_for_write: true,
        }
    }
}

/// Builder-configured wrapper around one procedure identity.
pub struct InvocationWrapper<St: Storage, Se: Serializer, T> {
    manager: Arc<CacheManager<St, Se>>,
    procedure_id: String,
    selector: Option<Vec<String>>,
    key_fn: Option<KeyFn>,
    dynamic_ttl: Option<DynamicTtlFn<T>>,
    coalescer: Coalescer<T, String>,
}

impl<St, Se, T> InvocationWrapper<St, Se, T>
where
    St: Storage,
    Se: Serializer,
    T: Clone + Send + Sync + Serialize + DeserializeOwned + 'static,
{
    pub fn new(manager: Arc<CacheManager<St, Se>>, procedure_id: impl Into<String>) -> Self {
        Self {
            manager,
            procedure_id: procedure_id.into(),
            selector: None,
            key_fn: None,
            dynamic_ttl: None,
            coalescer: Coalescer::new(),
        }
    }

    pub fn with_selector(mut self, fields: Vec<String>) -> Self {
        self.selector = Some(fields);
        self
    }

    pub fn with_key_fn<F>(mut self, f: F) -> Self
    where
        F: Fn(&CallArgs) -> String + Send + Sync + 'static,
    {
        self.key_fn = Some(Arc::new(f));
        self
    }

    pub fn with_dynamic_ttl<F>(mut self, f: F) -> Self
    where
        F: Fn(&T) -> Option<Duration> + Send + Sync + 'static,
    {
        self.dynamic_ttl = Some(Arc::new(f));
        self
    }

    pub fn key_builder(&self) -> &KeyBuilder {
        self.manager.key_builder()
    }

    /// Register a preload provider with the global registry. When
    /// `preload_all` runs, `seeds` is invoked to produce argument tuples,
    /// and this wrapper is primed once per tuple with `cache_read=false,
    /// cache_write=true` — exactly the registry's `preload_all` contract.
    pub fn register_preload<F>(self: &Arc<Self>, seeds: F)
    where
        F: Fn() -> Vec<PreloadSeed<T>> + Send + Sync + 'static,
    {
        let wrapper = self.clone();
        registry::global().register_preload(move || {
            let wrapper = wrapper.clone();
            let seeds = seeds();
            async move {
                for (call_args, user_id, producer) in seeds {
                    let options = CallOptions {
                        cache_read: false,
                        cache_write: true,
                        wait_for_write: true,
                    };
                    let result = wrapper
                        .call(call_args, user_id, options, move || {
                            let producer = producer.clone();
                            async move { producer().await.map_err(PreloadError) }
                        })
                        .await;
                    if let Err(err) = result {
                        warn_preload_error(&wrapper.procedure_id, &err.0);
                    }
                }
            }
        });
    }

    fn resolve_fragment(&self, call_args: &CallArgs) -> crate::key_builder::ArgsFragment {
        resolve_fragment(
            call_args,
            self.selector.as_deref(),
            self.key_fn.as_deref(),
        )
    }

    /// Run one cache-backed call. `producer` must be callable more than
    /// once: it may run a second time if the singleflight leader's task is
    /// cancelled before broadcasting a result (the surviving followers each
    /// retry, possibly becoming the new leader themselves).
    pub async fn call<F, Fut, E>(
        &self,
        call_args: CallArgs,
        user_id: Option<String>,
        options: CallOptions,
        producer: F,
    ) -> Result<T, E>
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
        E: ToString + From<String> + Send + 'static,
    {
        // Key-derivation error policy: an unrenderable argument degrades
        // this one call to "skip the cache entirely".
        let degraded = call_args.is_degraded();
        let fragment = self.resolve_fragment(&call_args);
        let key = self
            .manager
            .build_key(&self.procedure_id, &fragment, user_id.as_deref())
            .await;

        let cache_enabled = registry::global().is_enabled() && !degraded;
        let cache_read = options.cache_read && cache_enabled;
        let cache_write = options.cache_write && cache_enabled;

        if cache_read {
            if let CacheResult::Hit(entry) = self.manager.get::<T>(&key).await {
                return Ok(entry.value);
            }
        }

        let producer = Arc::new(producer);
        let value = loop {
            let producer = producer.clone();
            let attempt = self
                .coalescer
                .do_call(&key, move || async move { producer().await.map_err(|e| e.to_string()) })
                .await;
            match attempt {
                Ok(value) => break value,
                Err(CoalesceError::LeaderLost) => continue,
                Err(CoalesceError::Producer(message)) => {
                    return Err(reconstruct_error::<E>(message));
                }
            }
        };

        if cache_write {
            let ttl = match &self.dynamic_ttl {
                Some(ttl_fn) => match ttl_fn(&value) {
                    Some(ttl) => Some(ttl),
                    None => {
                        // Negative/none dynamic TTL: do not cache this value.
                        return Ok(value);
                    }
                },
                None => None,
            };

            let manager = self.manager.clone();
            let key = key.clone();
            let value_to_store = value.clone();
            let store = async move { manager.set(&key, &value_to_store, ttl).await };
            if options.wait_for_write {
                store.await;
            } else {
                tokio::spawn(store);
            }
        }

        Ok(value)
    }
}

/// The producer's concrete error type `E` is required to round-trip through
/// `to_string`/`from` since the coalescer broadcasts one shared result to
/// every follower. Wrapping errors in a type that implements `From<String>`
/// (e.g. by deriving it or using a string-carrying variant) satisfies this;
/// callers whose error type cannot represent an arbitrary string should
/// implement a fallback variant for it.
fn reconstruct_error<E: From<String>>(message: String) -> E {
    E::from(message)
}

fn warn_preload_error(procedure_id: &str, message: &str) {
    #[cfg(feature = "tracing")]
    tracing::warn!(procedure = procedure_id, error = message, "preload seed failed");
    #[cfg(not(feature = "tracing"))]
    let _ = (procedure_id, message);
}

#[cfg(test)]
mod tests {
    use super::*;
    use fncache_storage::MemoryTtlStorage;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[derive(Debug, Clone, PartialEq)]
    struct StringError(String);
    impl From<String> for StringError {
        fn from(s: String) -> Self {
            StringError(s)
        }
    }
    impl ToString for StringError {
        fn to_string(&self) -> String {
            self.0.clone()
        }
    }

    #[tokio::test]
    async fn test_ttl_hit_then_miss_after_expiry() {
        tokio::time::pause();
        let manager = CacheManager::new(MemoryTtlStorage::new());
        let wrapper: InvocationWrapper<_, _, String> =
            InvocationWrapper::new(manager, "f").with_dynamic_ttl(|_v: &String| Some(Duration::from_secs(2)));
        let calls = Arc::new(AtomicU32::new(0));

        let calls1 = calls.clone();
        let r1 = wrapper
            .call(
                CallArgs::new().arg("x", &1i32),
                None,
                CallOptions::default(),
                move || {
                    let calls = calls1.clone();
                    async move {
                        calls.fetch_add(1, Ordering::SeqCst);
                        Ok::<String, StringError>("v1".to_string())
                    }
                },
            )
            .await
            .unwrap();
        assert_eq!(r1, "v1");

        tokio::time::advance(Duration::from_secs(1)).await;
        let calls2 = calls.clone();
        let r2 = wrapper
            .call(
                CallArgs::new().arg("x", &1i32),
                None,
                CallOptions::default(),
                move || {
                    let calls = calls2.clone();
                    async move {
                        calls.fetch_add(1, Ordering::SeqCst);
                        Ok::<String, StringError>("v1".to_string())
                    }
                },
            )
            .await
            .unwrap();
        assert_eq!(r2, "v1");
        assert_eq!(calls.load(Ordering::SeqCst), 1, "second call within ttl must hit");

        tokio::time::advance(Duration::from_secs(2)).await;
        let calls3 = calls.clone();
        let r3 = wrapper
            .call(
                CallArgs::new().arg("x", &1i32),
                None,
                CallOptions::default(),
                move || {
                    let calls = calls3.clone();
                    async move {
                        calls.fetch_add(1, Ordering::SeqCst);
                        Ok::<String, StringError>("v1".to_string())
                    }
                },
            )
            .await
            .unwrap();
        assert_eq!(r3, "v1");
        assert_eq!(calls.load(Ordering::SeqCst), 2, "call after ttl expiry must execute again");
    }

    #[tokio::test]
    async fn test_singleflight_concurrent_calls_execute_once() {
        let manager = CacheManager::new(MemoryTtlStorage::new());
        let wrapper: Arc<InvocationWrapper<_, _, i64>> =
            Arc::new(InvocationWrapper::new(manager, "slow"));
        let calls = Arc::new(AtomicU32::new(0));

        let mut handles = Vec::new();
        for _ in 0..100 {
            let wrapper = wrapper.clone();
            let calls = calls.clone();
            handles.push(tokio::spawn(async move {
                wrapper
                    .call(
                        CallArgs::new().arg("x", &1i32),
                        None,
                        CallOptions::default(),
                        move || {
                            let calls = calls.clone();
                            async move {
                                calls.fetch_add(1, Ordering::SeqCst);
                                tokio::time::sleep(Duration::from_millis(50)).await;
                                Ok::<i64, StringError>(7)
                            }
                        },
                    )
                    .await
            }));
        }

        for handle in handles {
            assert_eq!(handle.await.unwrap().unwrap(), 7);
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_global_invalidation_forces_recompute() {
        let manager = CacheManager::new(MemoryTtlStorage::new());
        let wrapper: InvocationWrapper<_, _, i32> = InvocationWrapper::new(manager.clone(), "h");
        let calls = Arc::new(AtomicU32::new(0));

        let calls1 = calls.clone();
        wrapper
            .call(CallArgs::new().arg("x", &7i32), None, CallOptions::default(), move || {
                let calls = calls1.clone();
                async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok::<i32, StringError>(1)
                }
            })
            .await
            .unwrap();

        manager.invalidate_all().await;

        let calls2 = calls.clone();
        wrapper
            .call(CallArgs::new().arg("x", &7i32), None, CallOptions::default(), move || {
                let calls = calls2.clone();
                async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok::<i32, StringError>(1)
                }
            })
            .await
            .unwrap();

        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_producer_error_is_not_cached_and_propagates() {
        let manager = CacheManager::new(MemoryTtlStorage::new());
        let wrapper: InvocationWrapper<_, _, i32> = InvocationWrapper::new(manager, "f");

        let result = wrapper
            .call(CallArgs::new(), None, CallOptions::default(), || async {
                Err::<i32, StringError>(StringError("boom".to_string()))
            })
            .await;
        assert_eq!(result, Err(StringError("boom".to_string())));
    }

    #[tokio::test]
    async fn test_cache_read_false_forces_execution() {
        let manager = CacheManager::new(MemoryTtlStorage::new());
        let wrapper: InvocationWrapper<_, _, i32> = InvocationWrapper::new(manager, "f");
        let calls = Arc::new(AtomicU32::new(0));

        let opts = CallOptions::default();
        for _ in 0..2 {
            let calls = calls.clone();
            let mut opts = opts;
            opts.cache_read = false;
            wrapper
                .call(CallArgs::new(), None, opts, move || {
                    let calls = calls.clone();
                    async move {
                        calls.fetch_add(1, Ordering::SeqCst);
                        Ok::<i32, StringError>(1)
                    }
                })
                .await
                .unwrap();
        }
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }
}

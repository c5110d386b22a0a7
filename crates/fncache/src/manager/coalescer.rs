//! Singleflight coordination: at most one execution of a given computation
//! per cache key is in flight within a process at any instant; concurrent
//! callers with the same key await the in-flight result instead of
//! launching a duplicate.

use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::broadcast;

/// Outcome of joining or leading a coalesced call.
#[derive(Debug, Clone)]
pub enum CoalesceError<Err> {
    /// The underlying computation itself failed; `Err` propagates verbatim.
    Producer(Err),
    /// The leader's task was dropped (e.g. cancelled) before it could
    /// broadcast a result. The entry has already been removed; the caller's
    /// policy is to retry, which may make it the new leader.
    LeaderLost,
}

/// Removes a singleflight table's entry for `key` when dropped, whether
/// that happens because the leader finished normally or because the task
/// running it was cancelled mid-flight. Cancellation drops this guard
/// during stack unwinding just the same as a normal return, so a leader
/// that never gets to broadcast still releases the table entry (and, with
/// it, its clone of the broadcast sender) instead of leaving every waiter
/// blocked on a channel that will never receive or close.
struct RemoveOnDrop<V, Err>
where
    V: Clone + Send + Sync + 'static,
    Err: Clone + Send + Sync + 'static,
{
    inflight: Arc<DashMap<String, broadcast::Sender<Result<V, Err>>>>,
    key: String,
}

impl<V, Err> Drop for RemoveOnDrop<V, Err>
where
    V: Clone + Send + Sync + 'static,
    Err: Clone + Send + Sync + 'static,
{
    fn drop(&mut self) {
        self.inflight.remove(&self.key);
    }
}

/// Per-key singleflight table. Generic over the computation's success (`V`)
/// and error (`Err`) types, both required to be `Clone` so a single
/// computed result or error can be broadcast to every waiting follower —
/// the same tradeoff Go's `singleflight.Group` makes by sharing one
/// `interface{}` result across all callers.
#[derive(Clone)]
pub struct Coalescer<V, Err>
where
    V: Clone + Send + Sync + 'static,
    Err: Clone + Send + Sync + 'static,
{
    inflight: Arc<DashMap<String, broadcast::Sender<Result<V, Err>>>>,
}

impl<V, Err> Default for Coalescer<V, Err>
where
    V: Clone + Send + Sync + 'static,
    Err: Clone + Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<V, Err> Coalescer<V, Err>
where
    V: Clone + Send + Sync + 'static,
    Err: Clone + Send + Sync + 'static,
{
    pub fn new() -> Self {
        Self {
            inflight: Arc::new(DashMap::new()),
        }
    }

    /// Join an in-flight call for `key`, or become its leader and run `f`.
    pub async fn do_call<F, Fut>(&self, key: &str, f: F) -> Result<V, CoalesceError<Err>>
    where
        F: FnOnce() -> Fut,
        Fut: std::future::Future<Output = Result<V, Err>> + Send + 'static,
    {
        let action = {
            match self.inflight.entry(key.to_string()) {
                dashmap::mapref::entry::Entry::Occupied(o) => Ok(o.get().subscribe()),
                dashmap::mapref::entry::Entry::Vacant(v) => {
                    let (tx, _rx) = broadcast::channel(1);
                    v.insert(tx.clone());
                    Err(tx)
                }
            }
        };

        match action {
            Ok(mut rx) => match rx.recv().await {
                Ok(res) => res.map_err(CoalesceError::Producer),
                Err(_) => Err(CoalesceError::LeaderLost),
            },
            Err(tx) => {
                let guard = RemoveOnDrop {
                    inflight: self.inflight.clone(),
                    key: key.to_string(),
                };
                let result = f().await;
                // Drop the guard (removing the table entry) before
                // broadcasting, same as the pre-guard ordering: a new
                // caller arriving right after the send sees a clean slate
                // rather than a just-finished entry.
                drop(guard);
                if tx.receiver_count() > 0 {
                    let _ = tx.send(result.clone());
                }
                result.map_err(CoalesceError::Producer)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    #[tokio::test]
    async fn test_concurrent_callers_coalesce_to_one_execution() {
        let coalescer: Coalescer<u64, String> = Coalescer::new();
        let calls = Arc::new(AtomicU32::new(0));

        let mut handles = Vec::new();
        for _ in 0..100 {
            let coalescer = coalescer.clone();
            let calls = calls.clone();
            handles.push(tokio::spawn(async move {
                coalescer
                    .do_call("slow", move || async move {
                        calls.fetch_add(1, Ordering::SeqCst);
                        tokio::time::sleep(Duration::from_millis(50)).await;
                        Ok::<u64, String>(42)
                    })
                    .await
            }));
        }

        for handle in handles {
            let result = handle.await.unwrap();
            assert!(matches!(result, Ok(42)));
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_error_propagates_to_all_waiters() {
        let coalescer: Coalescer<u64, String> = Coalescer::new();
        let mut handles = Vec::new();
        for _ in 0..5 {
            let coalescer = coalescer.clone();
            handles.push(tokio::spawn(async move {
                coalescer
                    .do_call("fails", || async move {
                        tokio::time::sleep(Duration::from_millis(20)).await;
                        Err::<u64, String>("boom".to_string())
                    })
                    .await
            }));
        }
        for handle in handles {
            let result = handle.await.unwrap();
            assert!(matches!(result, Err(CoalesceError::Producer(ref e)) if e == "boom"));
        }
    }

    #[tokio::test]
    async fn test_cancelled_leader_unblocks_waiters_instead_of_hanging() {
        let coalescer: Coalescer<u64, String> = Coalescer::new();

        let leader_coalescer = coalescer.clone();
        let leader = tokio::spawn(async move {
            leader_coalescer
                .do_call("slow", || async move {
                    tokio::time::sleep(Duration::from_secs(60)).await;
                    Ok::<u64, String>(1)
                })
                .await
        });

        // Give the leader a chance to install its entry before a follower
        // joins it, so the follower actually subscribes to the leader's
        // broadcast channel rather than becoming a new leader itself.
        tokio::time::sleep(Duration::from_millis(10)).await;
        let follower_coalescer = coalescer.clone();
        let follower = tokio::spawn(async move {
            follower_coalescer
                .do_call("slow", || async move { Ok::<u64, String>(2) })
                .await
        });
        tokio::time::sleep(Duration::from_millis(10)).await;

        leader.abort();
        let _ = leader.await;

        let outcome = tokio::time::timeout(Duration::from_secs(1), follower)
            .await
            .expect("follower must not hang once the leader is cancelled")
            .unwrap();
        assert!(matches!(outcome, Err(CoalesceError::LeaderLost)));
    }

    #[tokio::test]
    async fn test_distinct_keys_do_not_coalesce() {
        let coalescer: Coalescer<u64, String> = Coalescer::new();
        let calls = Arc::new(AtomicU32::new(0));

        let c1 = calls.clone();
        let r1 = coalescer
            .do_call("a", move || async move {
                c1.fetch_add(1, Ordering::SeqCst);
                Ok::<u64, String>(1)
            })
            .await;
        let c2 = calls.clone();
        let r2 = coalescer
            .do_call("b", move || async move {
                c2.fetch_add(1, Ordering::SeqCst);
                Ok::<u64, String>(2)
            })
            .await;

        assert!(matches!(r1, Ok(1)));
        assert!(matches!(r2, Ok(2)));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }
}

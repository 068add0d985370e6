//! Coalescing of concurrent operations on the same key.
//!
//! The first caller for a key becomes the leader and runs the
//! operation; everyone else arriving before it finishes waits on a
//! broadcast of the leader's result. Used for block fetches and bucket
//! location lookups, so at most one HTTP call is in flight per key.

use std::collections::HashMap;
use std::future::Future;
use std::hash::Hash;

use parking_lot::Mutex;
use rusty_gcsfs_common::GcsError;
use tokio::sync::broadcast;

type Shared<V> = Result<V, GcsError>;

enum Role<V> {
    Leader(broadcast::Sender<Shared<V>>),
    Waiter(broadcast::Receiver<Shared<V>>),
}

pub(crate) struct SingleFlight<K, V> {
    in_flight: Mutex<HashMap<K, broadcast::Sender<Shared<V>>>>,
}

impl<K, V> SingleFlight<K, V>
where
    K: Hash + Eq + Clone,
    V: Clone,
{
    pub fn new() -> Self {
        Self {
            in_flight: Mutex::new(HashMap::new()),
        }
    }

    /// Run `f` for `key`, or wait for the in-flight run of it.
    pub async fn run<F, Fut>(&self, key: K, f: F) -> Result<V, GcsError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V, GcsError>>,
    {
        let role: Role<V> = {
            let mut guard = self.in_flight.lock();
            match guard.get(&key) {
                Some(sender) => Role::Waiter(sender.subscribe()),
                None => {
                    let (sender, _) = broadcast::channel(1);
                    guard.insert(key.clone(), sender.clone());
                    Role::Leader(sender)
                }
            }
        };

        match role {
            Role::Waiter(mut receiver) => match receiver.recv().await {
                Ok(result) => result,
                // The leader was dropped before completing.
                Err(_) => Err(GcsError::internal(
                    "coalesced operation abandoned by its initiator",
                )),
            },
            Role::Leader(sender) => {
                let result: Shared<V> = f().await;
                self.in_flight.lock().remove(&key);
                let _ = sender.send(result.clone());
                result
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    use super::*;

    #[tokio::test]
    async fn test_concurrent_calls_coalesce() {
        let flight: Arc<SingleFlight<String, u32>> = Arc::new(SingleFlight::new());
        let calls: Arc<AtomicU32> = Arc::new(AtomicU32::new(0));

        let tasks: Vec<_> = (0..8)
            .map(|_| {
                let flight = flight.clone();
                let calls = calls.clone();
                tokio::spawn(async move {
                    flight
                        .run("key".to_string(), || async {
                            calls.fetch_add(1, Ordering::Relaxed);
                            tokio::time::sleep(Duration::from_millis(20)).await;
                            Ok(7u32)
                        })
                        .await
                })
            })
            .collect();

        for task in tasks {
            assert_eq!(task.await.unwrap().unwrap(), 7);
        }
        assert_eq!(calls.load(Ordering::Relaxed), 1);
    }

    #[tokio::test]
    async fn test_error_shared_with_waiters() {
        let flight: Arc<SingleFlight<String, u32>> = Arc::new(SingleFlight::new());

        let leader = {
            let flight = flight.clone();
            tokio::spawn(async move {
                flight
                    .run("key".to_string(), || async {
                        tokio::time::sleep(Duration::from_millis(20)).await;
                        Err::<u32, _>(GcsError::unavailable("fetch failed"))
                    })
                    .await
            })
        };
        tokio::time::sleep(Duration::from_millis(5)).await;
        let waiter = {
            let flight = flight.clone();
            tokio::spawn(async move {
                flight
                    .run("key".to_string(), || async { Ok(99u32) })
                    .await
            })
        };

        assert!(leader.await.unwrap().is_err());
        assert!(waiter.await.unwrap().is_err());
    }

    #[tokio::test]
    async fn test_sequential_calls_run_independently() {
        let flight: SingleFlight<String, u32> = SingleFlight::new();
        let first: u32 = flight.run("key".to_string(), || async { Ok(1) }).await.unwrap();
        let second: u32 = flight.run("key".to_string(), || async { Ok(2) }).await.unwrap();
        assert_eq!((first, second), (1, 2));
    }
}

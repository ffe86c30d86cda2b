//! Key-scoped mutual exclusion for async computations
//!
//! At most one computation per key is in flight. Callers that arrive while
//! it runs await the same [`Shared`] future and receive the identical
//! outcome, errors included. The registry entry is removed when the
//! computation settles, whether it succeeded, failed or panicked.

use crate::error::{MapmergeError, MapmergeResult};
use futures_util::future::{BoxFuture, FutureExt, Shared};
use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{debug, warn};

type Outcome<T> = Result<T, Arc<MapmergeError>>;
type Pending<T> = Shared<BoxFuture<'static, Outcome<T>>>;
type Registry<T> = Arc<Mutex<HashMap<String, Pending<T>>>>;

/// Runs at most one computation per key at a time
///
/// Each executor owns its own registry, so two executors never see each
/// other's keys even when the strings are equal.
pub struct KeyedExecutor<T> {
    keyspace: &'static str,
    in_flight: Registry<T>,
}

impl<T> KeyedExecutor<T>
where
    T: Clone + Send + Sync + 'static,
{
    /// Create an executor; `keyspace` only labels log output
    pub fn new(keyspace: &'static str) -> Self {
        Self {
            keyspace,
            in_flight: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Number of keys with a computation currently in flight
    pub fn in_flight(&self) -> usize {
        lock(&self.in_flight).len()
    }

    /// Run `computation` unless one is already in flight for `key`
    ///
    /// The computation is spawned onto the runtime, so it runs to
    /// completion even if the caller that started it is cancelled. Every
    /// error is returned as [`MapmergeError::Shared`] wrapping the single
    /// error the computation produced.
    pub async fn run_exclusive<F, Fut>(&self, key: &str, computation: F) -> MapmergeResult<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = MapmergeResult<T>> + Send + 'static,
    {
        let pending = {
            let mut in_flight = lock(&self.in_flight);
            match in_flight.get(key) {
                Some(pending) => {
                    debug!("[{}] joining in-flight computation for {}", self.keyspace, key);
                    pending.clone()
                }
                None => {
                    debug!("[{}] starting computation for {}", self.keyspace, key);
                    let pending = self.launch(key.to_string(), computation());
                    in_flight.insert(key.to_string(), pending.clone());
                    pending
                }
            }
        };

        pending.await.map_err(MapmergeError::Shared)
    }

    fn launch<Fut>(&self, key: String, work: Fut) -> Pending<T>
    where
        Fut: Future<Output = MapmergeResult<T>> + Send + 'static,
    {
        let registration = Registration {
            keyspace: self.keyspace,
            key: key.clone(),
            in_flight: Arc::clone(&self.in_flight),
        };
        let keyspace = self.keyspace;

        let handle = tokio::spawn(async move {
            let _registration = registration;
            work.await.map_err(Arc::new)
        });

        async move {
            match handle.await {
                Ok(outcome) => outcome,
                Err(e) => {
                    warn!("[{}] computation for {} aborted: {}", keyspace, key, e);
                    Err(Arc::new(MapmergeError::Internal(format!(
                        "computation for {} aborted: {}",
                        key, e
                    ))))
                }
            }
        }
        .boxed()
        .shared()
    }
}

/// Removes a key from the registry when the computation's task ends
///
/// Dropped on completion, on panic unwinding and on runtime shutdown alike.
struct Registration<T> {
    keyspace: &'static str,
    key: String,
    in_flight: Registry<T>,
}

impl<T> Drop for Registration<T> {
    fn drop(&mut self) {
        lock(&self.in_flight).remove(&self.key);
        debug!("[{}] released {}", self.keyspace, self.key);
    }
}

fn lock<T>(registry: &Registry<T>) -> MutexGuard<'_, HashMap<String, Pending<T>>> {
    registry.lock().unwrap_or_else(PoisonError::into_inner)
}

//! Request coalescing (single-flight) for upstream fetches
//!
//! For any burst of concurrent fetches with the same key, the producer
//! runs exactly once and every caller receives the same cloned result.
//! The registration is removed when the producer completes, so errors are
//! never cached and sequential calls each trigger a fresh execution.

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard};

use futures::FutureExt;
use futures::future::{BoxFuture, Shared};

type SharedFetch<T, E> = Shared<BoxFuture<'static, std::result::Result<T, E>>>;

/// Coalesces concurrent identical-key operations into one execution.
pub struct SingleFlight<T, E> {
    in_flight: Arc<Mutex<HashMap<String, SharedFetch<T, E>>>>,
}

impl<T, E> SingleFlight<T, E>
where
    T: Clone + Send + Sync + 'static,
    E: Clone + Send + Sync + 'static,
{
    pub fn new() -> Self {
        Self {
            in_flight: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Run `producer` under `key`, or join the in-flight execution.
    ///
    /// Futures are lazy, so when this call joins an existing execution the
    /// supplied `producer` is dropped without ever running. The producer's
    /// result (success or failure) is delivered to every waiter that
    /// joined this execution.
    pub async fn run<F>(&self, key: &str, producer: F) -> std::result::Result<T, E>
    where
        F: Future<Output = std::result::Result<T, E>> + Send + 'static,
    {
        let fetch = {
            let mut in_flight = lock(&self.in_flight);
            match in_flight.get(key) {
                Some(existing) => existing.clone(),
                None => {
                    let registry = Arc::clone(&self.in_flight);
                    let owned_key = key.to_string();
                    let fetch: SharedFetch<T, E> = async move {
                        let result = producer.await;
                        // Deregister before any waiter observes the result,
                        // so the next call starts a fresh execution.
                        lock(&registry).remove(&owned_key);
                        result
                    }
                    .boxed()
                    .shared();
                    in_flight.insert(key.to_string(), fetch.clone());
                    fetch
                }
            }
        };

        fetch.await
    }

    /// Number of keys currently executing (for observability and tests).
    pub fn in_flight_count(&self) -> usize {
        lock(&self.in_flight).len()
    }
}

impl<T, E> Default for SingleFlight<T, E>
where
    T: Clone + Send + Sync + 'static,
    E: Clone + Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

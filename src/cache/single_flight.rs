//! Single-flight execution keyed by an arbitrary value.
//!
//! [`SingleFlight::run`] guarantees that for a given key at most one unit of work is in
//! flight at a time. The first caller (the leader) starts the work; every concurrent caller
//! for the same key adopts the leader's [`Flight`] and receives a clone of its outcome.
//!
//! # Lifecycle
//!
//! ```text
//! (absent) --claim--> IN_FLIGHT --ok--> SUCCEEDED (kept for the registry's lifetime)
//!                         |
//!                         +----err--> FAILED (removed, next caller starts a new flight)
//! ```
//!
//! # Cancellation
//!
//! The work runs on its own tokio task, detached from the caller that started it. A
//! caller's [`CancelToken`] only ends that caller's wait with [`EnvError::Cancelled`]; the
//! flight keeps going and every other waiter still receives its outcome. Cancellation is
//! also checked before claiming, so a caller that is already cancelled never starts work.
//!
//! # Waking
//!
//! Waiters register on the flight's [`Notify`] before reading the outcome, so a
//! completion that lands between the check and the wait is never missed.

use crate::core::cancel::{CancelCheck, CancelToken};
use crate::core::{EnvError, EnvResult};
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use std::future::Future;
use std::hash::Hash;
use std::sync::{Arc, OnceLock};
use tokio::sync::Notify;

/// One attempt at producing a value for a key.
#[derive(Debug)]
pub struct Flight<V> {
    notify: Notify,
    outcome: OnceLock<EnvResult<V>>,
}

impl<V: Clone> Flight<V> {
    fn new() -> Self {
        Self {
            notify: Notify::new(),
            outcome: OnceLock::new(),
        }
    }

    fn completed(value: V) -> Self {
        let flight = Self::new();
        let _ = flight.outcome.set(Ok(value));
        flight
    }

    /// The outcome, once the flight has completed.
    pub fn outcome(&self) -> Option<&EnvResult<V>> {
        self.outcome.get()
    }

    /// Whether the flight completed successfully.
    pub fn succeeded(&self) -> bool {
        matches!(self.outcome.get(), Some(Ok(_)))
    }

    async fn wait(&self, cancel: &CancelToken) -> EnvResult<V> {
        loop {
            let notified = self.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if let Some(outcome) = self.outcome.get() {
                return outcome.clone();
            }

            tokio::select! {
                () = &mut notified => {}
                () = cancel.cancelled() => return Err(EnvError::Cancelled),
            }
        }
    }
}

/// Registry of flights keyed by `K`.
///
/// Cloning is cheap and clones share the same registry.
pub struct SingleFlight<K, V> {
    flights: Arc<DashMap<K, Arc<Flight<V>>>>,
}

impl<K, V> std::fmt::Debug for SingleFlight<K, V>
where
    K: Eq + Hash,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SingleFlight").field("flights", &self.flights.len()).finish()
    }
}

impl<K, V> Clone for SingleFlight<K, V> {
    fn clone(&self) -> Self {
        Self {
            flights: Arc::clone(&self.flights),
        }
    }
}

impl<K, V> Default for SingleFlight<K, V>
where
    K: Eq + Hash,
{
    fn default() -> Self {
        Self {
            flights: Arc::new(DashMap::new()),
        }
    }
}

impl<K, V> SingleFlight<K, V>
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `work` for `key` unless a flight for it already exists, then wait for the outcome.
    ///
    /// `work` is only invoked by the leader. The returned future is spawned, so it must be
    /// `Send + 'static`; a panic inside it surfaces as [`EnvError::Interrupted`].
    pub async fn run<F, Fut>(&self, key: K, work: F, cancel: &CancelToken) -> EnvResult<V>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = EnvResult<V>> + Send + 'static,
    {
        cancel.check()?;

        let (flight, leader) = match self.flights.entry(key.clone()) {
            Entry::Occupied(entry) => (Arc::clone(entry.get()), false),
            Entry::Vacant(entry) => {
                let flight = Arc::new(Flight::new());
                entry.insert(Arc::clone(&flight));
                (flight, true)
            }
        };

        if leader {
            let flights = Arc::clone(&self.flights);
            let driven = Arc::clone(&flight);
            let fut = work();
            tokio::spawn(async move {
                let outcome = match tokio::spawn(fut).await {
                    Ok(outcome) => outcome,
                    Err(join_err) => Err(EnvError::from(join_err)),
                };
                // A failed flight leaves the registry before anyone can observe its outcome,
                // so a caller retrying after the failure always starts a new attempt.
                if outcome.is_err() {
                    flights.remove_if(&key, |_, current| Arc::ptr_eq(current, &driven));
                }
                let _ = driven.outcome.set(outcome);
                driven.notify.notify_waiters();
            });
        }

        flight.wait(cancel).await
    }

    /// Record `value` as a completed flight for `key` without running anything.
    ///
    /// An existing flight for the key is left untouched.
    pub fn complete(&self, key: K, value: V) {
        self.flights.entry(key).or_insert_with(|| Arc::new(Flight::completed(value)));
    }

    /// Whether a flight for `key` completed successfully.
    #[must_use]
    pub fn succeeded(&self, key: &K) -> bool {
        self.flights.get(key).is_some_and(|flight| flight.succeeded())
    }

    /// Whether any flight (in flight or succeeded) is registered for `key`.
    #[must_use]
    pub fn contains(&self, key: &K) -> bool {
        self.flights.contains_key(key)
    }

    /// Number of registered flights.
    #[must_use]
    pub fn len(&self) -> usize {
        self.flights.len()
    }

    /// Whether the registry is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.flights.is_empty()
    }
}

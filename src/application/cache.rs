// TTL cache with coalesced computation per key
use crate::domain::error::AnalyticsResult;
use crate::domain::error::AnalyticsError;
use futures::future::{BoxFuture, FutureExt, Shared};
use std::collections::HashMap;
use std::future::Future;
use std::hash::Hash;
use std::panic::AssertUnwindSafe;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;

type SharedResult<V> = Shared<BoxFuture<'static, AnalyticsResult<V>>>;

struct Entry<V> {
    value: V,
    stored_at: Instant,
}

struct InFlight<V> {
    ticket: u64,
    future: SharedResult<V>,
}

struct State<K, V> {
    entries: HashMap<K, Entry<V>>,
    // Invalidation drops matching computations from here, so their results
    // reach their waiters but are never stored.
    in_flight: HashMap<K, InFlight<V>>,
    next_ticket: u64,
}

pub struct TtlCache<K, V> {
    name: &'static str,
    ttl: Duration,
    state: Mutex<State<K, V>>,
}

impl<K, V> TtlCache<K, V>
where
    K: Eq + Hash + Clone + Send + Sync + std::fmt::Debug + 'static,
    V: Clone + Send + Sync + 'static,
{
    pub fn new(name: &'static str, ttl: Duration) -> Self {
        Self {
            name,
            ttl,
            state: Mutex::new(State {
                entries: HashMap::new(),
                in_flight: HashMap::new(),
                next_ticket: 0,
            }),
        }
    }

    /// Serve a fresh entry, join a computation already running for `key`, or
    /// start one with `compute`. Errors, including a panic inside `compute`,
    /// are returned to every waiter and are not cached.
    pub async fn get_or_compute<F, Fut>(&self, key: K, compute: F) -> AnalyticsResult<V>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = AnalyticsResult<V>> + Send + 'static,
    {
        let (ticket, future) = {
            let mut state = self.state.lock().await;

            if let Some(entry) = state.entries.get(&key) {
                if entry.stored_at.elapsed() < self.ttl {
                    tracing::debug!(cache = self.name, ?key, "cache hit");
                    return Ok(entry.value.clone());
                }
            }

            match state.in_flight.get(&key) {
                Some(running) => {
                    tracing::debug!(cache = self.name, ?key, "joining in-flight computation");
                    (running.ticket, running.future.clone())
                }
                None => {
                    tracing::debug!(cache = self.name, ?key, "cache miss");
                    state.next_ticket += 1;
                    let ticket = state.next_ticket;
                    let future = AssertUnwindSafe(compute())
                        .catch_unwind()
                        .map(|outcome| outcome.unwrap_or_else(|panic| Err(AnalyticsError::from_panic(panic))))
                        .boxed()
                        .shared();
                    state.in_flight.insert(
                        key.clone(),
                        InFlight {
                            ticket,
                            future: future.clone(),
                        },
                    );
                    (ticket, future)
                }
            }
        };

        let result = future.await;

        // Every waiter settles the entry so a dropped leader cannot leave a
        // finished computation parked in `in_flight`.
        let mut state = self.state.lock().await;
        if state.in_flight.get(&key).is_some_and(|f| f.ticket == ticket) {
            state.in_flight.remove(&key);
            if let Ok(value) = &result {
                state.entries.insert(
                    key,
                    Entry {
                        value: value.clone(),
                        stored_at: Instant::now(),
                    },
                );
            }
        }

        result
    }

    /// Drop cached and in-flight entries whose key matches `predicate`.
    pub async fn invalidate<P>(&self, predicate: P) -> usize
    where
        P: Fn(&K) -> bool,
    {
        let mut state = self.state.lock().await;
        let before = state.entries.len();
        state.entries.retain(|k, _| !predicate(k));
        state.in_flight.retain(|k, _| !predicate(k));
        let removed = before - state.entries.len();
        tracing::info!(cache = self.name, removed, "cache invalidated");
        removed
    }

    pub async fn purge_expired(&self) -> usize {
        let mut state = self.state.lock().await;
        let before = state.entries.len();
        let ttl = self.ttl;
        state.entries.retain(|_, e| e.stored_at.elapsed() < ttl);
        before - state.entries.len()
    }

    pub async fn len(&self) -> usize {
        self.state.lock().await.entries.len()
    }
}

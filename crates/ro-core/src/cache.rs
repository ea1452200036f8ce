//! Process-local, TTL-bound fetch cache with single-flight deduplication.
//!
//! Every key moves through two maps:
//!
//! - `inflight` holds the shared future of a fetch that has not settled yet.
//!   Concurrent callers for the same key clone and await that future, so at
//!   most one upstream call is issued per key.
//! - `settled` holds the resolved value, stamped with the time the fetch
//!   started. It is served until `now - timestamp >= ttl`.
//!
//! Values are stored as produced, so a `Result::Err` is cached exactly like a
//! success and is not retried before its entry expires.

use std::future::Future;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use futures_util::future::{BoxFuture, FutureExt, Shared};

use crate::clock::Clock;

// ---------------------------------------------------------------------------
// CacheEntry
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct CacheEntry<T> {
    pub data: T,
    pub timestamp: DateTime<Utc>,
}

impl<T> CacheEntry<T> {
    pub fn new(data: T, timestamp: DateTime<Utc>) -> Self {
        Self { data, timestamp }
    }

    pub fn is_fresh(&self, now: DateTime<Utc>, ttl: Duration) -> bool {
        now - self.timestamp < ttl
    }
}

// ---------------------------------------------------------------------------
// FetchCache
// ---------------------------------------------------------------------------

type SharedFetch<V> = Shared<BoxFuture<'static, V>>;

enum Lookup<V: Clone> {
    Ready(V),
    Pending(SharedFetch<V>),
}

pub struct FetchCache<V: Clone> {
    ttl: Duration,
    clock: Arc<dyn Clock>,
    settled: Arc<DashMap<String, CacheEntry<V>>>,
    inflight: Arc<DashMap<String, SharedFetch<V>>>,
}

impl<V> FetchCache<V>
where
    V: Clone + Send + Sync + 'static,
{
    pub fn new(ttl: std::time::Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            ttl: Duration::from_std(ttl).unwrap_or(Duration::MAX),
            clock,
            settled: Arc::new(DashMap::new()),
            inflight: Arc::new(DashMap::new()),
        }
    }

    /// Return the cached value for `key`, joining an in-flight fetch if there
    /// is one, or start `fetch` and cache whatever it settles to.
    pub async fn get_or_fetch<F, Fut>(&self, key: &str, fetch: F) -> V
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = V> + Send + 'static,
    {
        match self.lookup(key, fetch) {
            Lookup::Ready(value) => value,
            Lookup::Pending(shared) => shared.await,
        }
    }

    fn lookup<F, Fut>(&self, key: &str, fetch: F) -> Lookup<V>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = V> + Send + 'static,
    {
        let now = self.clock.now();
        if let Some(value) = self.fresh(key, now) {
            return Lookup::Ready(value);
        }

        match self.inflight.entry(key.to_owned()) {
            Entry::Occupied(pending) => Lookup::Pending(pending.get().clone()),
            Entry::Vacant(slot) => {
                // The previous fetch may have settled after the first check.
                if let Some(value) = self.fresh(key, now) {
                    return Lookup::Ready(value);
                }

                let settled = Arc::clone(&self.settled);
                let inflight = Arc::clone(&self.inflight);
                let owned_key = key.to_owned();
                let upstream = fetch();
                let shared = async move {
                    let value = upstream.await;
                    settled.insert(owned_key.clone(), CacheEntry::new(value.clone(), now));
                    inflight.remove(&owned_key);
                    value
                }
                .boxed()
                .shared();

                slot.insert(shared.clone());
                Lookup::Pending(shared)
            }
        }
    }

    fn fresh(&self, key: &str, now: DateTime<Utc>) -> Option<V> {
        self.settled
            .get(key)
            .filter(|entry| entry.is_fresh(now, self.ttl))
            .map(|entry| entry.data.clone())
    }

    /// Peek at a settled, unexpired value without starting a fetch.
    pub fn get(&self, key: &str) -> Option<V> {
        self.fresh(key, self.clock.now())
    }

    pub fn invalidate(&self, key: &str) {
        self.settled.remove(key);
    }

    /// Drop settled entries whose TTL has elapsed.
    pub fn evict_expired(&self) -> usize {
        let now = self.clock.now();
        let before = self.settled.len();
        self.settled.retain(|_, entry| entry.is_fresh(now, self.ttl));
        before - self.settled.len()
    }

    pub fn len(&self) -> usize {
        self.settled.len()
    }

    pub fn is_empty(&self) -> bool {
        self.settled.is_empty()
    }

    pub fn in_flight(&self) -> usize {
        self.inflight.len()
    }

    pub fn ttl(&self) -> std::time::Duration {
        self.ttl.to_std().unwrap_or(std::time::Duration::MAX)
    }
}

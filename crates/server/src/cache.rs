//! Bounded, time-limited cache for upstream listing responses.
//!
//! Eviction is by insertion order, not recency: clients page forward through
//! a feed and rarely revisit a key inside the TTL.
use std::collections::{HashMap, VecDeque};
use std::future::Future;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::time::Instant;
use tracing::debug;

struct Entry<V> {
    stored_at: Instant,
    value: V,
}

struct Inner<V> {
    entries: HashMap<String, Entry<V>>,
    order: VecDeque<String>,
}

pub struct ResponseCache<V> {
    ttl: Duration,
    capacity: usize,
    inner: Mutex<Inner<V>>,
}

impl<V: Clone> ResponseCache<V> {
    pub fn new(ttl: Duration, capacity: usize) -> Self {
        Self {
            ttl,
            capacity: capacity.max(1),
            inner: Mutex::new(Inner {
                entries: HashMap::new(),
                order: VecDeque::new(),
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner<V>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Fresh entry for `key`, dropping it if it has expired.
    pub fn get(&self, key: &str) -> Option<V> {
        let mut guard = self.lock();
        let stored_at = guard.entries.get(key)?.stored_at;
        if stored_at.elapsed() < self.ttl {
            return guard.entries.get(key).map(|e| e.value.clone());
        }
        guard.entries.remove(key);
        guard.order.retain(|k| k != key);
        None
    }

    pub fn insert(&self, key: String, value: V) {
        let mut guard = self.lock();
        if guard.entries.contains_key(&key) {
            guard.order.retain(|k| k != &key);
        }
        guard.order.push_back(key.clone());
        guard.entries.insert(
            key,
            Entry {
                stored_at: Instant::now(),
                value,
            },
        );
        while guard.entries.len() > self.capacity {
            let Some(oldest) = guard.order.pop_front() else {
                break;
            };
            guard.entries.remove(&oldest);
        }
    }

    /// Returns the cached value or runs `fetch`. Only `Ok` results are stored.
    /// The lock is not held across `fetch`, so concurrent misses may both fetch.
    pub async fn get_or_fetch<E, F, Fut>(&self, key: &str, fetch: F) -> Result<V, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V, E>>,
    {
        if let Some(hit) = self.get(key) {
            debug!(key, "cache hit");
            return Ok(hit);
        }
        let value = fetch().await?;
        self.insert(key.to_string(), value.clone());
        Ok(value)
    }

    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cache() -> ResponseCache<u32> {
        ResponseCache::new(Duration::from_secs(300), 2)
    }

    #[tokio::test(start_paused = true)]
    async fn entries_expire_after_ttl() {
        let cache = cache();
        cache.insert("a".into(), 1);

        tokio::time::advance(Duration::from_secs(299)).await;
        assert_eq!(cache.get("a"), Some(1));

        tokio::time::advance(Duration::from_secs(1)).await;
        assert_eq!(cache.get("a"), None);
        assert_eq!(cache.len(), 0);
    }

    #[tokio::test]
    async fn oldest_insert_is_evicted_even_if_recently_read() {
        let cache = cache();
        cache.insert("a".into(), 1);
        cache.insert("b".into(), 2);
        assert_eq!(cache.get("a"), Some(1));

        cache.insert("c".into(), 3);

        assert_eq!(cache.get("a"), None);
        assert_eq!(cache.get("b"), Some(2));
        assert_eq!(cache.get("c"), Some(3));
    }

    #[tokio::test]
    async fn failed_fetches_are_not_cached() {
        let cache = cache();
        let miss: Result<u32, &str> = cache.get_or_fetch("k", || async { Err("boom") }).await;
        assert_eq!(miss, Err("boom"));
        assert_eq!(cache.len(), 0);

        let first: Result<u32, &str> = cache.get_or_fetch("k", || async { Ok(7) }).await;
        let second: Result<u32, &str> = cache.get_or_fetch("k", || async { Ok(8) }).await;
        assert_eq!(first, Ok(7));
        assert_eq!(second, Ok(7));
    }
}

//! Fetch-through result cache.
//!
//! Wraps caller-supplied async reads: a fresh entry short-circuits the fetch,
//! a miss runs it and stores the value under the key. Entries are fresh while
//! `now - stored_at < ttl`; stale entries read as misses and are removed
//! lazily. Failed fetches are returned to the caller and never stored.
//!
//! The map sits behind a single mutex that is never held across a fetch.
//! Callers missing on the same key at the same time each run their fetch and
//! the last write wins; that costs redundant reads, never a wrong value.

use std::any::Any;
use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use tracing::{debug, info, trace};

use crate::config::CacheConfig;
use crate::core::pressure::{PressureLevel, PressureResponder};
use crate::util::clock::{Clock, SystemClock};

/// Rewrites a fetch description before it runs, e.g. to bound a query.
pub trait DescriptionTransform: Send + Sync {
    /// Return the description to execute.
    fn transform(&self, description: &str) -> String;
}

struct CacheEntry {
    value: Arc<dyn Any + Send + Sync>,
    stored_at: Instant,
}

/// Hit/miss counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    /// Entries currently stored, fresh or not.
    pub entries: usize,
    /// Lookups answered from the cache.
    pub hits: u64,
    /// Lookups that ran the fetch.
    pub misses: u64,
    /// Calls without a key.
    pub bypasses: u64,
    /// Entries removed by invalidation, pressure cleanup, or staleness.
    pub evictions: u64,
}

#[derive(Debug, Default)]
struct CacheCounters {
    hits: AtomicU64,
    misses: AtomicU64,
    bypasses: AtomicU64,
    evictions: AtomicU64,
}

struct CacheInner {
    config: CacheConfig,
    clock: Arc<dyn Clock>,
    transform: RwLock<Option<Arc<dyn DescriptionTransform>>>,
    entries: Mutex<HashMap<String, CacheEntry>>,
    counters: CacheCounters,
}

/// Keyed, time-bounded cache over arbitrary async fetches. Cloning yields
/// another handle to the same cache.
#[derive(Clone)]
pub struct ResultCache {
    inner: Arc<CacheInner>,
}

impl ResultCache {
    /// Create a cache measured against the system clock.
    #[must_use]
    pub fn new(config: CacheConfig) -> Self {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    /// Create a cache measured against `clock`.
    #[must_use]
    pub fn with_clock(config: CacheConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            inner: Arc::new(CacheInner {
                config,
                clock,
                transform: RwLock::new(None),
                entries: Mutex::new(HashMap::new()),
                counters: CacheCounters::default(),
            }),
        }
    }

    /// Install the transform applied by [`ResultCache::fetch_described`].
    /// Replaces any previous transform for every handle to this cache.
    pub fn set_transform(&self, transform: Arc<dyn DescriptionTransform>) {
        *self.inner.transform.write() = Some(transform);
    }

    /// Return the fresh value under `key`, or run `fetch` and store its
    /// result.
    ///
    /// Without a key the fetch always runs and nothing is stored. `ttl`
    /// defaults to the configured freshness window. A value stored under the
    /// same key with a different type reads as a miss.
    ///
    /// # Errors
    ///
    /// Returns the fetch's own error; failures are not cached.
    pub async fn fetch_cached<T, E, F, Fut>(
        &self,
        key: Option<&str>,
        ttl: Option<Duration>,
        fetch: F,
    ) -> Result<T, E>
    where
        T: Clone + Send + Sync + 'static,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let Some(key) = key else {
            self.inner.counters.bypasses.fetch_add(1, Ordering::Relaxed);
            return fetch().await;
        };

        let ttl = ttl.unwrap_or_else(|| self.inner.config.default_ttl());
        if let Some(value) = self.lookup::<T>(key, ttl) {
            self.inner.counters.hits.fetch_add(1, Ordering::Relaxed);
            trace!(key, "cache hit");
            return Ok(value);
        }

        self.inner.counters.misses.fetch_add(1, Ordering::Relaxed);
        trace!(key, "cache miss");
        let value = fetch().await?;
        self.store(key, value.clone());
        Ok(value)
    }

    /// Like [`ResultCache::fetch_cached`], but the configured
    /// [`DescriptionTransform`] rewrites `description` before it is handed to
    /// `fetch`. The rewrite applies whether or not a key is given.
    ///
    /// # Errors
    ///
    /// Returns the fetch's own error; failures are not cached.
    pub async fn fetch_described<T, E, F, Fut>(
        &self,
        key: Option<&str>,
        ttl: Option<Duration>,
        description: &str,
        fetch: F,
    ) -> Result<T, E>
    where
        T: Clone + Send + Sync + 'static,
        F: FnOnce(String) -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let description = self.describe(description);
        self.fetch_cached(key, ttl, move || fetch(description)).await
    }

    /// Apply the configured transform to `description`.
    #[must_use]
    pub fn describe(&self, description: &str) -> String {
        match self.inner.transform.read().as_ref() {
            Some(transform) => transform.transform(description),
            None => description.to_owned(),
        }
    }

    /// Remove the named keys, or everything when `keys` is `None`.
    ///
    /// Returns the number of entries removed.
    pub fn invalidate(&self, keys: Option<&[&str]>) -> usize {
        let removed = {
            let mut entries = self.inner.entries.lock();
            match keys {
                Some(keys) => keys
                    .iter()
                    .filter(|key| entries.remove(**key).is_some())
                    .count(),
                None => {
                    let count = entries.len();
                    entries.clear();
                    count
                }
            }
        };
        self.record_evictions(removed);
        debug!(removed, all = keys.is_none(), "cache invalidated");
        removed
    }

    /// Remove every entry.
    pub fn clear(&self) -> usize {
        self.invalidate(None)
    }

    /// Remove entries stored at least `max_age` ago.
    pub fn evict_older_than(&self, max_age: Duration) -> usize {
        let now = self.inner.clock.now();
        let removed = {
            let mut entries = self.inner.entries.lock();
            let before = entries.len();
            entries.retain(|_, entry| now.saturating_duration_since(entry.stored_at) < max_age);
            before - entries.len()
        };
        self.record_evictions(removed);
        debug!(removed, ?max_age, "cache evicted by age");
        removed
    }

    /// Stored entries, including stale ones not yet removed.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.entries.lock().len()
    }

    /// True when nothing is stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Hit/miss counters.
    #[must_use]
    pub fn stats(&self) -> CacheStats {
        let counters = &self.inner.counters;
        CacheStats {
            entries: self.len(),
            hits: counters.hits.load(Ordering::Relaxed),
            misses: counters.misses.load(Ordering::Relaxed),
            bypasses: counters.bypasses.load(Ordering::Relaxed),
            evictions: counters.evictions.load(Ordering::Relaxed),
        }
    }

    fn lookup<T>(&self, key: &str, ttl: Duration) -> Option<T>
    where
        T: Clone + Send + Sync + 'static,
    {
        let now = self.inner.clock.now();
        let mut entries = self.inner.entries.lock();
        let entry = entries.get(key)?;
        let stale = now.saturating_duration_since(entry.stored_at) >= ttl;
        if stale {
            entries.remove(key);
            drop(entries);
            self.record_evictions(1);
            return None;
        }
        entry.value.downcast_ref::<T>().cloned()
    }

    fn store<T>(&self, key: &str, value: T)
    where
        T: Send + Sync + 'static,
    {
        let entry = CacheEntry {
            value: Arc::new(value),
            stored_at: self.inner.clock.now(),
        };
        self.inner.entries.lock().insert(key.to_owned(), entry);
    }

    fn record_evictions(&self, count: usize) {
        if count > 0 {
            self.inner
                .counters
                .evictions
                .fetch_add(count as u64, Ordering::Relaxed);
        }
    }
}

impl PressureResponder for ResultCache {
    fn name(&self) -> &str {
        "result_cache"
    }

    fn respond(&self, level: PressureLevel) -> anyhow::Result<()> {
        match level {
            PressureLevel::Critical => {
                let removed = self.clear();
                info!(removed, "result cache flushed under critical pressure");
            }
            PressureLevel::Warning => {
                let removed = self.evict_older_than(self.inner.config.warning_max_age());
                info!(removed, "result cache trimmed under warning pressure");
            }
            PressureLevel::Normal => {}
        }
        Ok(())
    }
}

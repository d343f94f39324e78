//! In-process response cache.
//!
//! Read endpoints cache their whole response under an operation-specific
//! key (`files_<category>_<page>_<limit>`, `categories`, `stats`). Each
//! entry carries the tags it depends on, and a `tag -> keys` index lets a
//! mutation drop exactly the affected entries.
//!
//! Invalidation is what keeps reads correct. The TTL only bounds how long
//! an untouched entry lives; the LRU capacity bounds memory.

use std::any::Any;
use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use lru::LruCache;

use crate::metrics::Metrics;

/// Key of the cached `GET /categories` response.
pub const CATEGORIES_KEY: &str = "categories";
/// Key of the cached `GET /stats` response.
pub const STATS_KEY: &str = "stats";
/// Pseudo-category selecting every category in a listing.
pub const ALL_CATEGORIES: &str = "all";

/// What a cached response depends on.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum CacheTag {
    /// A file listing for one category, or for [`ALL_CATEGORIES`].
    Listing(String),
    /// A response aggregated over every category.
    Aggregate,
}

impl CacheTag {
    pub fn listing(category: &str) -> Self {
        CacheTag::Listing(category.to_string())
    }
}

type Payload = Arc<dyn Any + Send + Sync>;

struct CacheEntry {
    payload: Payload,
    inserted_at: Instant,
    tags: Vec<CacheTag>,
}

struct CacheInner {
    entries: LruCache<String, CacheEntry>,
    index: HashMap<CacheTag, HashSet<String>>,
    // Bumped by every invalidation; a computation that saw an older epoch
    // must not store its result.
    epoch: u64,
}

impl CacheInner {
    fn unlink(&mut self, key: &str, tags: &[CacheTag]) {
        for tag in tags {
            if let Some(keys) = self.index.get_mut(tag) {
                keys.remove(key);
                if keys.is_empty() {
                    self.index.remove(tag);
                }
            }
        }
    }

    fn remove(&mut self, key: &str) -> bool {
        match self.entries.pop(key) {
            Some(entry) => {
                self.unlink(key, &entry.tags);
                true
            }
            None => false,
        }
    }

    fn insert(&mut self, key: String, entry: CacheEntry) {
        for tag in &entry.tags {
            self.index.entry(tag.clone()).or_default().insert(key.clone());
        }
        let tags = entry.tags.clone();
        // `push` hands back either the previous value under the same key or
        // the least recently used entry it evicted.
        if let Some((old_key, old)) = self.entries.push(key.clone(), entry) {
            self.unlink(&old_key, &old.tags);
            if old_key == key {
                for tag in tags {
                    self.index.entry(tag).or_default().insert(key.clone());
                }
            }
        }
    }
}

type Gate = Arc<tokio::sync::Mutex<()>>;

// Owns a key's in-flight gate for one fill; unregisters it on drop.
struct InflightSlot<'a> {
    cache: &'a ResponseCache,
    key: &'a str,
    gate: Gate,
}

impl Drop for InflightSlot<'_> {
    fn drop(&mut self) {
        let mut inflight = self.cache.inflight.lock().unwrap_or_else(|p| p.into_inner());
        if inflight.get(self.key).is_some_and(|g| Arc::ptr_eq(g, &self.gate)) {
            inflight.remove(self.key);
        }
    }
}

/// TTL response cache with tag-indexed invalidation and miss coalescing.
pub struct ResponseCache {
    inner: Mutex<CacheInner>,
    inflight: Mutex<HashMap<String, Gate>>,
    ttl: Duration,
    metrics: Metrics,
}

impl ResponseCache {
    pub fn new(ttl: Duration, capacity: usize, metrics: Metrics) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            inner: Mutex::new(CacheInner {
                entries: LruCache::new(capacity),
                index: HashMap::new(),
                epoch: 0,
            }),
            inflight: Mutex::new(HashMap::new()),
            ttl,
            metrics,
        }
    }

    fn lock(&self) -> MutexGuard<'_, CacheInner> {
        // The guarded maps stay consistent even if a holder panicked.
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn lookup<T>(&self, key: &str) -> Option<T>
    where
        T: Clone + Send + Sync + 'static,
    {
        let mut inner = self.lock();
        let expired = match inner.entries.peek(key) {
            Some(entry) => entry.inserted_at.elapsed() >= self.ttl,
            None => return None,
        };
        if expired {
            inner.remove(key);
            return None;
        }
        inner.entries.get(key).and_then(|entry| entry.payload.downcast_ref::<T>().cloned())
    }

    /// Returns a live entry, counting the hit or miss.
    pub fn get<T>(&self, key: &str) -> Option<T>
    where
        T: Clone + Send + Sync + 'static,
    {
        let found = self.lookup(key);
        if found.is_some() {
            self.metrics.inc_cache_hits();
        } else {
            self.metrics.inc_cache_misses();
        }
        found
    }

    pub fn insert<T>(&self, key: impl Into<String>, value: T, tags: Vec<CacheTag>)
    where
        T: Send + Sync + 'static,
    {
        let entry = CacheEntry { payload: Arc::new(value), inserted_at: Instant::now(), tags };
        self.lock().insert(key.into(), entry);
    }

    fn insert_if_current<T>(&self, key: &str, value: T, tags: Vec<CacheTag>, epoch: u64) -> bool
    where
        T: Send + Sync + 'static,
    {
        let mut inner = self.lock();
        if inner.epoch != epoch {
            return false;
        }
        let entry = CacheEntry { payload: Arc::new(value), inserted_at: Instant::now(), tags };
        inner.insert(key.to_string(), entry);
        true
    }

    fn current_epoch(&self) -> u64 {
        self.lock().epoch
    }

    /// Returns the cached value for `key` or computes, stores and returns it.
    ///
    /// Concurrent misses on the same key wait for the first computation
    /// instead of repeating it. A result is only stored when no invalidation
    /// happened while it was being computed.
    pub async fn get_or_compute<T, E, F, Fut>(&self, key: &str, tags: Vec<CacheTag>, compute: F) -> Result<T, E>
    where
        T: Clone + Send + Sync + 'static,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        if let Some(hit) = self.lookup::<T>(key) {
            self.metrics.inc_cache_hits();
            return Ok(hit);
        }

        let gate = {
            let mut inflight = self.inflight.lock().unwrap_or_else(|p| p.into_inner());
            inflight.entry(key.to_string()).or_default().clone()
        };
        // Declared before the lock guard so the gate is released first and
        // the map entry is removed even when this future is dropped.
        let slot = InflightSlot { cache: self, key, gate };
        let _guard = slot.gate.lock().await;

        if let Some(hit) = self.lookup::<T>(key) {
            self.metrics.inc_cache_hits();
            return Ok(hit);
        }
        self.metrics.inc_cache_misses();

        let epoch = self.current_epoch();
        let result = compute().await;
        if let Ok(value) = &result {
            if !self.insert_if_current(key, value.clone(), tags, epoch) {
                tracing::debug!("Discarding cache fill for '{}': invalidated during computation", key);
            }
        }

        result
    }

    /// Drops every entry a mutation of `categories` may have made stale:
    /// listings of those categories, all-category listings and every
    /// aggregate response. Returns the number of entries removed.
    pub fn invalidate<I, S>(&self, categories: I) -> usize
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut inner = self.lock();
        inner.epoch = inner.epoch.wrapping_add(1);

        let mut tags: Vec<CacheTag> = categories.into_iter().map(|c| CacheTag::listing(c.as_ref())).collect();
        tags.push(CacheTag::listing(ALL_CATEGORIES));
        tags.push(CacheTag::Aggregate);

        let mut doomed: HashSet<String> = HashSet::new();
        for tag in &tags {
            if let Some(keys) = inner.index.get(tag) {
                doomed.extend(keys.iter().cloned());
            }
        }
        // Fixed keys go unconditionally, tagged or not.
        doomed.insert(CATEGORIES_KEY.to_string());
        doomed.insert(STATS_KEY.to_string());

        let removed = doomed.iter().filter(|key| inner.remove(key)).count();
        drop(inner);
        self.metrics.inc_cache_invalidations();
        removed
    }

    /// Drops everything, e.g. after the library root changed.
    pub fn clear(&self) {
        let mut inner = self.lock();
        inner.epoch = inner.epoch.wrapping_add(1);
        inner.entries.clear();
        inner.index.clear();
        drop(inner);
        self.metrics.inc_cache_invalidations();
    }

    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, key: &str) -> bool {
        self.lock().entries.contains(key)
    }
}

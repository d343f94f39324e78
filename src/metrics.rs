use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

/// Counters for the cache and the library mutations.
#[derive(Clone)]
pub struct Metrics {
    pub cache_hits: Arc<AtomicU64>,
    pub cache_misses: Arc<AtomicU64>,
    pub cache_invalidations: Arc<AtomicU64>,
    pub files_moved: Arc<AtomicU64>,
    pub cross_device_copies: Arc<AtomicU64>,
    pub cleanup_failures: Arc<AtomicU64>,
    pub files_deleted: Arc<AtomicU64>,
    pub category_mutations: Arc<AtomicU64>,
    pub start_time: Instant,
}

impl Metrics {
    pub fn new() -> Self {
        Self {
            cache_hits: Arc::new(AtomicU64::new(0)),
            cache_misses: Arc::new(AtomicU64::new(0)),
            cache_invalidations: Arc::new(AtomicU64::new(0)),
            files_moved: Arc::new(AtomicU64::new(0)),
            cross_device_copies: Arc::new(AtomicU64::new(0)),
            cleanup_failures: Arc::new(AtomicU64::new(0)),
            files_deleted: Arc::new(AtomicU64::new(0)),
            category_mutations: Arc::new(AtomicU64::new(0)),
            start_time: Instant::now(),
        }
    }

    pub fn inc_cache_hits(&self) {
        self.cache_hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_cache_misses(&self) {
        self.cache_misses.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_cache_invalidations(&self) {
        self.cache_invalidations.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_files_moved(&self) {
        self.files_moved.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_cross_device_copies(&self) {
        self.cross_device_copies.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_cleanup_failures(&self) {
        self.cleanup_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_files_deleted(&self) {
        self.files_deleted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_category_mutations(&self) {
        self.category_mutations.fetch_add(1, Ordering::Relaxed);
    }

    pub fn get_snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            cache_hits: self.cache_hits.load(Ordering::Relaxed),
            cache_misses: self.cache_misses.load(Ordering::Relaxed),
            cache_invalidations: self.cache_invalidations.load(Ordering::Relaxed),
            files_moved: self.files_moved.load(Ordering::Relaxed),
            cross_device_copies: self.cross_device_copies.load(Ordering::Relaxed),
            cleanup_failures: self.cleanup_failures.load(Ordering::Relaxed),
            files_deleted: self.files_deleted.load(Ordering::Relaxed),
            category_mutations: self.category_mutations.load(Ordering::Relaxed),
            uptime_seconds: self.start_time.elapsed().as_secs(),
        }
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Serialize)]
pub struct MetricsSnapshot {
    pub cache_hits: u64,
    pub cache_misses: u64,
    pub cache_invalidations: u64,
    pub files_moved: u64,
    pub cross_device_copies: u64,
    pub cleanup_failures: u64,
    pub files_deleted: u64,
    pub category_mutations: u64,
    pub uptime_seconds: u64,
}

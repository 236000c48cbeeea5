//! # Metrics
//!
//! Lightweight operation counters for monitoring a running store. All
//! counters are relaxed atomics; they are statistics, not synchronization.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Metrics collector
#[derive(Clone)]
pub struct Metrics {
    inner: Arc<MetricsInner>,
}

struct MetricsInner {
    // Operation counts
    sets: AtomicU64,
    gets: AtomicU64,
    get_hits: AtomicU64,
    get_misses: AtomicU64,
    deletes: AtomicU64,

    // Log activity
    aof_appends: AtomicU64,
    aof_bytes: AtomicU64,
    flushes: AtomicU64,
    rewrites: AtomicU64,

    // TTL housekeeping
    expired_removed: AtomicU64,
}

impl Metrics {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(MetricsInner {
                sets: AtomicU64::new(0),
                gets: AtomicU64::new(0),
                get_hits: AtomicU64::new(0),
                get_misses: AtomicU64::new(0),
                deletes: AtomicU64::new(0),
                aof_appends: AtomicU64::new(0),
                aof_bytes: AtomicU64::new(0),
                flushes: AtomicU64::new(0),
                rewrites: AtomicU64::new(0),
                expired_removed: AtomicU64::new(0),
            }),
        }
    }

    pub fn record_set(&self) {
        self.inner.sets.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_get(&self, hit: bool) {
        self.inner.gets.fetch_add(1, Ordering::Relaxed);
        if hit {
            self.inner.get_hits.fetch_add(1, Ordering::Relaxed);
        } else {
            self.inner.get_misses.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn record_delete(&self) {
        self.inner.deletes.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_append(&self, bytes: u64) {
        self.inner.aof_appends.fetch_add(1, Ordering::Relaxed);
        self.inner.aof_bytes.fetch_add(bytes, Ordering::Relaxed);
    }

    pub fn record_flush(&self) {
        self.inner.flushes.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_rewrite(&self) {
        self.inner.rewrites.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_expired(&self, count: u64) {
        self.inner.expired_removed.fetch_add(count, Ordering::Relaxed);
    }

    /// Get current metrics snapshot
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            sets: self.inner.sets.load(Ordering::Relaxed),
            gets: self.inner.gets.load(Ordering::Relaxed),
            get_hits: self.inner.get_hits.load(Ordering::Relaxed),
            get_misses: self.inner.get_misses.load(Ordering::Relaxed),
            deletes: self.inner.deletes.load(Ordering::Relaxed),
            aof_appends: self.inner.aof_appends.load(Ordering::Relaxed),
            aof_bytes: self.inner.aof_bytes.load(Ordering::Relaxed),
            flushes: self.inner.flushes.load(Ordering::Relaxed),
            rewrites: self.inner.rewrites.load(Ordering::Relaxed),
            expired_removed: self.inner.expired_removed.load(Ordering::Relaxed),
        }
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Metrics snapshot
#[derive(Debug, Clone)]
pub struct MetricsSnapshot {
    pub sets: u64,
    pub gets: u64,
    pub get_hits: u64,
    pub get_misses: u64,
    pub deletes: u64,
    pub aof_appends: u64,
    pub aof_bytes: u64,
    pub flushes: u64,
    pub rewrites: u64,
    pub expired_removed: u64,
}

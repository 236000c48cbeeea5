//! # Store
//!
//! The top-level engine. Owns the hash index behind a reader-writer lock
//! and (optionally) the append-only log; concurrent readers share the
//! index, mutators serialize on it. A mutation updates the index first and
//! then appends its frame while still holding the write lock, so the log
//! order always matches the in-memory order.
//!
//! Lock order is fixed: index lock, then log mutex, never the reverse.
//!
//! An I/O failure from the log surfaces to the caller *after* the
//! in-memory mutation has been applied, so a caller that sees an error
//! must treat the mutation's outcome as indeterminate.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use bytes::Bytes;
use parking_lot::{Mutex, RwLock};
use tracing::{error, info};

use nubdb_core::{Error, FlushPolicy, Metrics, Result, StoreConfig};

use crate::aof::{replay, AofWriter, Op, KEY_MAX, VALUE_MAX};
use crate::cached_time;
use crate::compaction::{self, CompactorHandle};
use crate::index::{HashIndex, Record};

/// State shared with the compaction worker.
pub(crate) struct Shared {
    pub(crate) index: RwLock<HashIndex>,
    pub(crate) aof: Option<AofWriter>,
    pub(crate) metrics: Metrics,
    pub(crate) ops_count: AtomicU64,
    /// Serializes rewrites: the background worker and manual triggers must
    /// never run two at once.
    pub(crate) rewrite_lock: Mutex<()>,
}

/// In-memory key-value store with durable append-only persistence.
pub struct Store {
    shared: Arc<Shared>,
    compactor: Option<CompactorHandle>,
}

impl std::fmt::Debug for Store {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Store").finish_non_exhaustive()
    }
}

impl Store {
    /// Open a store: replay the log (if any) into a fresh index, then open
    /// the log for appending and start the compaction worker.
    pub fn open(config: StoreConfig) -> Result<Self> {
        if matches!(
            config.flush_policy,
            FlushPolicy::EveryNOps(0) | FlushPolicy::EveryNSecs(0)
        ) {
            return Err(Error::Configuration {
                message: "flush policy interval must be nonzero".to_string(),
            });
        }

        cached_time::init();

        let metrics = Metrics::new();
        let mut index = HashIndex::new();

        let aof = match &config.aof_path {
            Some(path) => {
                replay::replay(path, &mut index)?;
                Some(AofWriter::open(path, config.flush_policy, metrics.clone())?)
            }
            None => None,
        };

        let shared = Arc::new(Shared {
            index: RwLock::new(index),
            aof,
            metrics,
            ops_count: AtomicU64::new(0),
            rewrite_lock: Mutex::new(()),
        });

        let compactor = if shared.aof.is_some() {
            Some(compaction::spawn(
                Arc::clone(&shared),
                config.compaction_interval,
                config.rewrite_threshold,
            ))
        } else {
            None
        };

        info!(keys = shared.index.read().len(), "store open");
        Ok(Store { shared, compactor })
    }

    /// A store with persistence disabled; nothing survives the process.
    pub fn in_memory() -> Self {
        let config = StoreConfig {
            aof_path: None,
            ..StoreConfig::default()
        };
        Self::open(config).expect("in-memory store cannot fail to open")
    }

    /// Insert or overwrite a key. `ttl_secs` of 0 means the entry never
    /// expires. The TTL is not written to the log, so it does not survive
    /// a restart.
    pub fn set(&self, key: &[u8], value: &[u8], ttl_secs: u64) -> Result<()> {
        validate_key(key)?;
        if value.len() > VALUE_MAX {
            return Err(Error::Input {
                message: format!("value exceeds {} bytes", VALUE_MAX),
            });
        }

        let expires_at = if ttl_secs > 0 {
            cached_time::now_secs() + ttl_secs
        } else {
            0
        };

        let mut index = self.shared.index.write();
        index.put(
            Bytes::copy_from_slice(key),
            Record::new(Bytes::copy_from_slice(value), expires_at),
        );
        self.shared.metrics.record_set();
        self.bump_ops();

        if let Some(aof) = &self.shared.aof {
            aof.append(Op::Set, key, value)?;
        }
        Ok(())
    }

    /// Look up a key. Entries whose TTL has passed read as absent but stay
    /// in the table until [`Store::cleanup_expired`] runs; a read lock must
    /// not mutate. The returned `Bytes` is a refcounted view of the stored
    /// buffer.
    pub fn get(&self, key: &[u8]) -> Option<Bytes> {
        let index = self.shared.index.read();
        self.bump_ops();

        let value = index
            .get(key)
            .filter(|record| !record.is_expired(cached_time::now_secs()))
            .map(|record| record.value.clone());
        self.shared.metrics.record_get(value.is_some());
        value
    }

    /// Remove a key. Returns whether anything was removed; only an actual
    /// removal is logged.
    pub fn delete(&self, key: &[u8]) -> Result<bool> {
        let mut index = self.shared.index.write();
        self.bump_ops();

        if index.remove(key).is_none() {
            return Ok(false);
        }
        self.shared.metrics.record_delete();

        if let Some(aof) = &self.shared.aof {
            aof.append(Op::Delete, key, b"")?;
        }
        Ok(true)
    }

    /// Whether a key is present and unexpired.
    pub fn exists(&self, key: &[u8]) -> bool {
        let index = self.shared.index.read();
        self.bump_ops();
        index
            .get(key)
            .map(|record| !record.is_expired(cached_time::now_secs()))
            .unwrap_or(false)
    }

    /// Add `delta` to the key's value, treating an absent, expired, or
    /// non-numeric value as 0. Overflow wraps (best effort). The result is
    /// stored as base-10 text with any TTL cleared.
    pub fn increment(&self, key: &[u8], delta: i64) -> Result<i64> {
        validate_key(key)?;

        let mut index = self.shared.index.write();
        self.bump_ops();

        let current: i64 = index
            .get(key)
            .filter(|record| !record.is_expired(cached_time::now_secs()))
            .and_then(|record| std::str::from_utf8(&record.value).ok())
            .and_then(|text| text.trim().parse().ok())
            .unwrap_or(0);

        let new = current.wrapping_add(delta);
        let text = new.to_string();

        index.put(
            Bytes::copy_from_slice(key),
            Record::new(Bytes::from(text.clone().into_bytes()), 0),
        );
        self.shared.metrics.record_set();

        if let Some(aof) = &self.shared.aof {
            aof.append(Op::Set, key, text.as_bytes())?;
        }
        Ok(new)
    }

    /// Number of keys in the index. May include entries whose TTL has
    /// passed but that have not been cleaned up yet.
    pub fn len(&self) -> usize {
        self.shared.index.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop every key. Writes nothing to the log: after a crash, replay
    /// restores the pre-clear state until the next rewrite runs.
    pub fn clear(&self) {
        self.shared.index.write().clear();
        self.bump_ops();
    }

    /// Remove every entry whose TTL has passed. Returns the count removed.
    /// Nothing is logged; replay never resurrects a TTL anyway.
    pub fn cleanup_expired(&self) -> usize {
        let mut index = self.shared.index.write();
        let now = cached_time::now_secs();

        let expired: Vec<Bytes> = index
            .iter()
            .filter(|(_, record)| record.is_expired(now))
            .map(|(key, _)| key.clone())
            .collect();
        for key in &expired {
            index.remove(key);
        }

        self.shared.metrics.record_expired(expired.len() as u64);
        expired.len()
    }

    /// Fsync the log regardless of the flush policy.
    pub fn force_flush(&self) -> Result<()> {
        match &self.shared.aof {
            Some(aof) => aof.force_flush(),
            None => Ok(()),
        }
    }

    /// Rewrite the log to its minimal equivalent right now, without waiting
    /// for the background worker's threshold check.
    pub fn rewrite_aof(&self) -> Result<u64> {
        compaction::rewrite(&self.shared)
    }

    /// Current log length in bytes, or 0 for an in-memory store.
    pub fn log_size(&self) -> u64 {
        self.shared.aof.as_ref().map_or(0, |aof| aof.log_size())
    }

    pub fn metrics(&self) -> &Metrics {
        &self.shared.metrics
    }

    /// Operations served since open; a statistic, not a sequence number.
    pub fn ops_count(&self) -> u64 {
        self.shared.ops_count.load(Ordering::Relaxed)
    }

    /// Stop the compaction worker and flush the log. Errors from the final
    /// flush surface here instead of being swallowed by `Drop`.
    pub fn close(mut self) -> Result<()> {
        self.stop_compactor();
        self.force_flush()
    }

    fn stop_compactor(&mut self) {
        if let Some(mut compactor) = self.compactor.take() {
            compactor.stop();
        }
    }

    fn bump_ops(&self) {
        self.shared.ops_count.fetch_add(1, Ordering::Relaxed);
    }
}

impl Drop for Store {
    fn drop(&mut self) {
        self.stop_compactor();
        if let Some(aof) = &self.shared.aof {
            if let Err(e) = aof.force_flush() {
                error!(error = %e, "final log flush failed");
            }
        }
    }
}

fn validate_key(key: &[u8]) -> Result<()> {
    if key.is_empty() {
        return Err(Error::Input {
            message: "empty key".to_string(),
        });
    }
    if key.len() > KEY_MAX {
        return Err(Error::Input {
            message: format!("key exceeds {} bytes", KEY_MAX),
        });
    }
    Ok(())
}

//! # Append-Only File
//!
//! Every acknowledged mutation is appended to a single log file as one
//! binary frame (see [`frame`]); replaying the file from offset 0 rebuilds
//! the index. Appends go straight to the file descriptor, so an append that
//! returned is in the OS buffer; durability comes from fsync, governed by
//! the configured [`FlushPolicy`].
//!
//! The file handle is guarded by a mutex. Appends hold it for the
//! write-plus-policy-flush; the compactor holds it while swapping in a
//! rewritten log. Engine code always takes the index lock before this one.

mod frame;
pub mod replay;

pub use frame::{
    encode_frame, frame_len, read_frame, Frame, Op, ReadOutcome, FRAME_OVERHEAD, KEY_MAX,
    VALUE_MAX,
};

use std::fs::{File, OpenOptions};
use std::io::{Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;
use tracing::debug;

use nubdb_core::{Error, FlushPolicy, Metrics, Result};

use crate::cached_time;

/// Serializes mutations into the log file and fsyncs per policy.
pub struct AofWriter {
    path: PathBuf,
    file: Mutex<File>,
    policy: FlushPolicy,
    log_size: AtomicU64,
    ops_since_flush: AtomicU64,
    last_flush_secs: AtomicU64,
    metrics: Metrics,
}

impl AofWriter {
    /// Open the log for appending, creating it if needed. Replay the file
    /// with [`replay::replay`] *before* constructing the writer.
    pub fn open(path: &Path, policy: FlushPolicy, metrics: Metrics) -> Result<Self> {
        let mut file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .open(path)?;
        let size = file.seek(SeekFrom::End(0))?;

        Ok(Self {
            path: path.to_path_buf(),
            file: Mutex::new(file),
            policy,
            log_size: AtomicU64::new(size),
            ops_since_flush: AtomicU64::new(0),
            last_flush_secs: AtomicU64::new(cached_time::now_secs()),
            metrics,
        })
    }

    /// Append one frame. The frame is written with a single `write_all`, so
    /// frames from concurrent appenders never interleave. Errors surface to
    /// the caller; nothing is retried here.
    pub fn append(&self, op: Op, key: &[u8], value: &[u8]) -> Result<()> {
        let mut buf = Vec::with_capacity(frame_len(key, value));
        encode_frame(&mut buf, cached_time::now_secs() as i64, op, key, value);

        let mut file = self.file.lock();
        file.write_all(&buf).map_err(|e| Error::Aof {
            message: "append failed".to_string(),
            source: Some(Box::new(e)),
        })?;

        self.log_size.fetch_add(buf.len() as u64, Ordering::Relaxed);
        let ops = self.ops_since_flush.fetch_add(1, Ordering::Relaxed) + 1;
        self.metrics.record_append(buf.len() as u64);

        match self.policy {
            FlushPolicy::Always => self.flush_locked(&mut file)?,
            FlushPolicy::EveryNOps(n) => {
                if ops >= n {
                    self.flush_locked(&mut file)?;
                }
            }
            FlushPolicy::EveryNSecs(n) => {
                let now = cached_time::now_secs();
                if now.saturating_sub(self.last_flush_secs.load(Ordering::Relaxed)) >= n {
                    self.flush_locked(&mut file)?;
                }
            }
        }

        Ok(())
    }

    /// Unconditionally fsync and reset the policy counters. Called on clean
    /// shutdown.
    pub fn force_flush(&self) -> Result<()> {
        let mut file = self.file.lock();
        self.flush_locked(&mut file)
    }

    fn flush_locked(&self, file: &mut File) -> Result<()> {
        file.sync_data().map_err(|e| Error::Aof {
            message: "fsync failed".to_string(),
            source: Some(Box::new(e)),
        })?;
        self.ops_since_flush.store(0, Ordering::Relaxed);
        self.last_flush_secs
            .store(cached_time::now_secs(), Ordering::Relaxed);
        self.metrics.record_flush();
        Ok(())
    }

    /// Replace the live log with the compacted file at `tmp`, which the
    /// caller has already written and synced. The rename is the
    /// linearization point; the handle swap and counter resets happen under
    /// the log mutex so no append can slip between them.
    pub fn swap_compacted(&self, tmp: &Path) -> Result<u64> {
        let mut file = self.file.lock();

        std::fs::rename(tmp, &self.path)?;
        let mut reopened = OpenOptions::new().read(true).write(true).open(&self.path)?;
        let size = reopened.seek(SeekFrom::End(0))?;

        // Assigning closes the handle to the replaced file.
        *file = reopened;
        self.log_size.store(size, Ordering::Relaxed);
        self.ops_since_flush.store(0, Ordering::Relaxed);

        debug!(size, "swapped in compacted log");
        Ok(size)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Sibling path the compactor writes to before the atomic rename.
    pub fn tmp_path(&self) -> PathBuf {
        let mut os = self.path.clone().into_os_string();
        os.push(".tmp");
        PathBuf::from(os)
    }

    /// Log length as tracked by the internal counter.
    pub fn log_size(&self) -> u64 {
        self.log_size.load(Ordering::Relaxed)
    }

    /// Appends since the last fsync.
    pub fn ops_since_flush(&self) -> u64 {
        self.ops_since_flush.load(Ordering::Relaxed)
    }
}

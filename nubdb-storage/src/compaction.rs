//! # Compaction
//!
//! Background rewriting of the append-only log. Once the log crosses a
//! size threshold, a dedicated worker streams one SET frame per live key
//! into a sibling `.tmp` file, fsyncs it, and renames it over the live log.
//! The rename is the linearization point: a crash at any step leaves either
//! the old complete log or the new complete log on disk.
//!
//! The snapshot is taken under the index read lock, so mutators are blocked
//! while the temp file is written and its contents are exactly one
//! consistent state. The swap itself happens under the log mutex, after
//! the read lock is released.

use std::fs::OpenOptions;
use std::io::{BufWriter, Write};
use std::path::Path;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use parking_lot::{Condvar, Mutex};
use tracing::{debug, error, info};

use nubdb_core::{Error, Result};

use crate::aof::{encode_frame, Op};
use crate::cached_time;
use crate::engine::Shared;

/// Shutdown flag the worker polls between wakes. The condvar makes
/// shutdown prompt instead of waiting out the sleep.
struct Shutdown {
    stop: Mutex<bool>,
    cv: Condvar,
}

impl Shutdown {
    fn new() -> Self {
        Self {
            stop: Mutex::new(false),
            cv: Condvar::new(),
        }
    }

    fn signal(&self) {
        *self.stop.lock() = true;
        self.cv.notify_all();
    }

    /// Sleep for `timeout` or until signalled; returns whether shutdown
    /// has been requested.
    fn wait(&self, timeout: Duration) -> bool {
        let mut stop = self.stop.lock();
        if !*stop {
            self.cv.wait_for(&mut stop, timeout);
        }
        *stop
    }
}

pub(crate) struct CompactorHandle {
    shutdown: Arc<Shutdown>,
    thread: Option<JoinHandle<()>>,
}

impl CompactorHandle {
    pub(crate) fn stop(&mut self) {
        self.shutdown.signal();
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

/// Start the rewrite worker. Only called for stores with a log.
pub(crate) fn spawn(shared: Arc<Shared>, interval: Duration, threshold: u64) -> CompactorHandle {
    let shutdown = Arc::new(Shutdown::new());
    let worker_shutdown = Arc::clone(&shutdown);

    let thread = thread::Builder::new()
        .name("aof-rewrite".into())
        .spawn(move || {
            while !worker_shutdown.wait(interval) {
                let aof = match shared.aof.as_ref() {
                    Some(aof) => aof,
                    None => break,
                };
                if aof.log_size() < threshold {
                    continue;
                }
                match rewrite(&shared) {
                    Ok(size) => info!(size, "rewrote append-only log"),
                    Err(e) => error!(error = %e, "log rewrite failed, will retry"),
                }
            }
        })
        .expect("failed to spawn aof-rewrite thread");

    CompactorHandle {
        shutdown,
        thread: Some(thread),
    }
}

/// Rewrite the log to its minimal equivalent and swap it in. On any error
/// before the rename the temp file is removed and the live log is
/// untouched.
pub(crate) fn rewrite(shared: &Shared) -> Result<u64> {
    let aof = shared.aof.as_ref().ok_or_else(|| Error::Compaction {
        reason: "store has no append-only log".to_string(),
    })?;
    let _only_one = shared.rewrite_lock.lock();
    let tmp = aof.tmp_path();

    let live_keys = match write_snapshot(shared, &tmp) {
        Ok(n) => n,
        Err(e) => {
            let _ = std::fs::remove_file(&tmp);
            return Err(e);
        }
    };

    let size = match aof.swap_compacted(&tmp) {
        Ok(size) => size,
        Err(e) => {
            let _ = std::fs::remove_file(&tmp);
            return Err(e);
        }
    };

    shared.metrics.record_rewrite();
    debug!(live_keys, size, "compaction complete");
    Ok(size)
}

/// Stream every live entry into `tmp` as a SET frame and fsync it. Entries
/// whose TTL has already passed are dropped; unexpired TTL entries are
/// written without their TTL, since the frame format has no TTL field.
fn write_snapshot(shared: &Shared, tmp: &Path) -> Result<u64> {
    let index = shared.index.read();

    let file = OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(true)
        .open(tmp)?;
    let mut writer = BufWriter::new(file);

    let now = cached_time::now_secs();
    let mut live_keys = 0u64;
    let mut buf = Vec::new();

    for (key, record) in index.iter() {
        if record.is_expired(now) {
            continue;
        }
        buf.clear();
        encode_frame(&mut buf, now as i64, Op::Set, key, &record.value);
        writer.write_all(&buf)?;
        live_keys += 1;
    }

    writer.flush()?;
    writer.get_ref().sync_data()?;
    Ok(live_keys)
}

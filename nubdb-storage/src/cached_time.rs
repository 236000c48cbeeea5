//! Cached Unix clock for TTL checks.
//!
//! Expiry is second-granular, so gets don't need a syscall per lookup: a
//! background thread refreshes an atomic every 200ms and readers load it.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::OnceLock;
use std::thread;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

static CACHED_UNIX_SECS: AtomicU64 = AtomicU64::new(0);
static INIT: OnceLock<()> = OnceLock::new();

/// Start the background clock thread (idempotent).
pub fn init() {
    INIT.get_or_init(|| {
        refresh();

        thread::Builder::new()
            .name("ttl-clock".into())
            .spawn(|| loop {
                thread::sleep(Duration::from_millis(200));
                refresh();
            })
            .expect("failed to spawn ttl-clock thread");
    });
}

fn refresh() {
    CACHED_UNIX_SECS.store(wall_clock_secs(), Ordering::Relaxed);
}

fn wall_clock_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

/// Current Unix time in seconds (±200ms before the next refresh).
#[inline]
pub fn now_secs() -> u64 {
    let cached = CACHED_UNIX_SECS.load(Ordering::Relaxed);
    if cached == 0 {
        // init() not called yet, fall back to the real clock
        wall_clock_secs()
    } else {
        cached
    }
}

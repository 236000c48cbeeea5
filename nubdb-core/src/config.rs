//! # Configuration Management
//!
//! Configuration for the store and the TCP server.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub store: StoreConfig,
    pub server: ServerConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            store: StoreConfig::default(),
            server: ServerConfig::default(),
        }
    }
}

/// Store configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Path of the append-only log. `None` disables persistence entirely.
    pub aof_path: Option<PathBuf>,
    /// When appended frames are made durable.
    pub flush_policy: FlushPolicy,
    /// Log size at which the compactor rewrites the log.
    pub rewrite_threshold: u64,
    /// How often the compaction worker wakes to check the log size.
    pub compaction_interval: Duration,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            aof_path: Some(PathBuf::from("nubdb.aof")),
            flush_policy: FlushPolicy::default(),
            rewrite_threshold: 64 * 1024 * 1024, // 64MB
            compaction_interval: Duration::from_secs(10),
        }
    }
}

/// When the append-only log is fsync'd.
///
/// `EveryNOps` loses at most N-1 frames on crash, `EveryNSecs` at most the
/// last N seconds of appends, `Always` nothing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FlushPolicy {
    /// fsync after every append (safest, slowest)
    Always,
    /// fsync once N appends have accumulated
    EveryNOps(u64),
    /// fsync once N seconds have passed since the last flush
    EveryNSecs(u64),
}

impl Default for FlushPolicy {
    fn default() -> Self {
        FlushPolicy::EveryNOps(100)
    }
}

/// TCP server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub bind_addr: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0".to_string(),
            port: 6379,
        }
    }
}

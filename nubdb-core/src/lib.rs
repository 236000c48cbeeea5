//! # NubDB Core
//!
//! Shared building blocks for the NubDB key-value store:
//! - Error types
//! - Configuration
//! - Metrics
//!
//! The storage engine itself lives in `nubdb-storage`; the binary and the
//! line protocol live in `nubdb-cli`.

pub mod config;
pub mod error;
pub mod metrics;

pub use config::{Config, FlushPolicy, ServerConfig, StoreConfig};
pub use error::{Error, Result};
pub use metrics::{Metrics, MetricsSnapshot};

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

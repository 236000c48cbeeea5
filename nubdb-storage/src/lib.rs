//! # NubDB Storage Engine
//!
//! In-memory key-value store with durable append-only persistence.
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      Write Path                              │
//! │                                                              │
//! │  set/delete ──> Hash Index (write lock) ──> AOF append      │
//! │                                               │              │
//! │                                               ▼              │
//! │                                        fsync per policy      │
//! └─────────────────────────────────────────────────────────────┘
//!
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      Read Path                               │
//! │                                                              │
//! │  get/exists ──> Hash Index (read lock), never touches disk  │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! A background worker periodically rewrites the log down to one SET frame
//! per live key once it crosses a size threshold; the swap is a single
//! atomic rename.

pub mod aof;
pub mod cached_time;
pub mod compaction;
pub mod engine;
pub mod index;

pub use aof::{AofWriter, Op};
pub use engine::Store;
pub use index::{HashIndex, Record};

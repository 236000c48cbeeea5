//! Binary framing of log records.
//!
//! ```text
//! ┌───────────────┬────┬─────────────┬───────┬───────────────┬─────────┐
//! │ timestamp i64 │ op │ key_len u32 │ key   │ value_len u32 │ value   │
//! │ (LE, secs)    │ u8 │ (LE)        │ bytes │ (LE)          │ bytes   │
//! └───────────────┴────┴─────────────┴───────┴───────────────┴─────────┘
//! ```
//!
//! Timestamps are advisory; replay ignores them. DELETE frames carry a
//! zero-length value. There is no per-frame checksum.

use std::io::{ErrorKind, Read};

use byteorder::{LittleEndian, ReadBytesExt};
use bytes::Bytes;

use nubdb_core::{Error, Result};

/// Largest key accepted by replay.
pub const KEY_MAX: usize = 4096;
/// Largest value accepted by replay.
pub const VALUE_MAX: usize = 1024 * 1024;

/// Fixed bytes per frame in addition to the key and value.
pub const FRAME_OVERHEAD: usize = 8 + 1 + 4 + 4;

/// Mutation kind recorded in a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Op {
    Set = 1,
    Delete = 2,
}

impl TryFrom<u8> for Op {
    type Error = Error;

    fn try_from(value: u8) -> Result<Self> {
        match value {
            1 => Ok(Op::Set),
            2 => Ok(Op::Delete),
            _ => Err(Error::Corruption {
                details: format!("unknown op byte: {}", value),
            }),
        }
    }
}

/// A decoded log record.
#[derive(Debug, Clone)]
pub struct Frame {
    pub timestamp: i64,
    pub op: Op,
    pub key: Bytes,
    pub value: Bytes,
}

/// Result of attempting to read one frame.
#[derive(Debug)]
pub enum ReadOutcome {
    Frame(Frame),
    /// Clean end of file at a frame boundary.
    Eof,
    /// End of file inside a frame; the partial tail is discarded.
    Truncated,
}

/// Encoded size of a frame for the given key and value.
pub fn frame_len(key: &[u8], value: &[u8]) -> usize {
    FRAME_OVERHEAD + key.len() + value.len()
}

/// Append one encoded frame to `buf`.
pub fn encode_frame(buf: &mut Vec<u8>, timestamp: i64, op: Op, key: &[u8], value: &[u8]) {
    buf.reserve(frame_len(key, value));
    buf.extend_from_slice(&timestamp.to_le_bytes());
    buf.push(op as u8);
    buf.extend_from_slice(&(key.len() as u32).to_le_bytes());
    buf.extend_from_slice(key);
    buf.extend_from_slice(&(value.len() as u32).to_le_bytes());
    buf.extend_from_slice(value);
}

/// Read one frame. EOF before the first byte is a clean end; EOF anywhere
/// later is a truncated tail. Oversized lengths and unknown ops are
/// corruption and fail the caller.
pub fn read_frame(reader: &mut impl Read) -> Result<ReadOutcome> {
    let timestamp = match reader.read_i64::<LittleEndian>() {
        Ok(ts) => ts,
        Err(e) if e.kind() == ErrorKind::UnexpectedEof => return Ok(ReadOutcome::Eof),
        Err(e) => return Err(e.into()),
    };

    let op_byte = match reader.read_u8() {
        Ok(b) => b,
        Err(e) if e.kind() == ErrorKind::UnexpectedEof => return Ok(ReadOutcome::Truncated),
        Err(e) => return Err(e.into()),
    };
    let op = Op::try_from(op_byte)?;

    let key_len = match reader.read_u32::<LittleEndian>() {
        Ok(n) => n as usize,
        Err(e) if e.kind() == ErrorKind::UnexpectedEof => return Ok(ReadOutcome::Truncated),
        Err(e) => return Err(e.into()),
    };
    if key_len > KEY_MAX {
        return Err(Error::Corruption {
            details: format!("frame key length {} exceeds limit {}", key_len, KEY_MAX),
        });
    }

    let mut key = vec![0u8; key_len];
    match reader.read_exact(&mut key) {
        Ok(()) => {}
        Err(e) if e.kind() == ErrorKind::UnexpectedEof => return Ok(ReadOutcome::Truncated),
        Err(e) => return Err(e.into()),
    }

    let value_len = match reader.read_u32::<LittleEndian>() {
        Ok(n) => n as usize,
        Err(e) if e.kind() == ErrorKind::UnexpectedEof => return Ok(ReadOutcome::Truncated),
        Err(e) => return Err(e.into()),
    };
    if value_len > VALUE_MAX {
        return Err(Error::Corruption {
            details: format!("frame value length {} exceeds limit {}", value_len, VALUE_MAX),
        });
    }

    let mut value = vec![0u8; value_len];
    match reader.read_exact(&mut value) {
        Ok(()) => {}
        Err(e) if e.kind() == ErrorKind::UnexpectedEof => return Ok(ReadOutcome::Truncated),
        Err(e) => return Err(e.into()),
    }

    Ok(ReadOutcome::Frame(Frame {
        timestamp,
        op,
        key: Bytes::from(key),
        value: Bytes::from(value),
    }))
}

//! # Append-Only Log Tests
//!
//! Writer framing, flush-policy accounting, and replay edge cases
//! (empty log, truncated tail, corrupt frames).

use std::fs::OpenOptions;
use std::io::Write;

use tempfile::TempDir;

use nubdb_core::{Error, FlushPolicy, Metrics};
use nubdb_storage::aof::{frame_len, replay, AofWriter, Op, FRAME_OVERHEAD};
use nubdb_storage::index::HashIndex;

fn writer(dir: &TempDir, policy: FlushPolicy) -> AofWriter {
    AofWriter::open(&dir.path().join("nubdb.aof"), policy, Metrics::new()).unwrap()
}

// =============================================================================
// Writer
// =============================================================================

#[test]
fn test_append_tracks_log_size() {
    let dir = TempDir::new().unwrap();
    let aof = writer(&dir, FlushPolicy::Always);

    aof.append(Op::Set, b"name", b"Alice").unwrap();
    aof.append(Op::Delete, b"name", b"").unwrap();

    let expected = (frame_len(b"name", b"Alice") + frame_len(b"name", b"")) as u64;
    assert_eq!(aof.log_size(), expected);

    let on_disk = std::fs::metadata(aof.path()).unwrap().len();
    assert_eq!(on_disk, expected);
}

#[test]
fn test_always_policy_leaves_no_unflushed_ops() {
    let dir = TempDir::new().unwrap();
    let aof = writer(&dir, FlushPolicy::Always);

    for i in 0..5 {
        aof.append(Op::Set, format!("k{}", i).as_bytes(), b"v").unwrap();
        assert_eq!(aof.ops_since_flush(), 0);
    }
}

#[test]
fn test_every_n_ops_policy_resets_counter() {
    let dir = TempDir::new().unwrap();
    let aof = writer(&dir, FlushPolicy::EveryNOps(10));

    for i in 0..9 {
        aof.append(Op::Set, format!("k{}", i).as_bytes(), b"v").unwrap();
    }
    assert_eq!(aof.ops_since_flush(), 9);

    aof.append(Op::Set, b"k9", b"v").unwrap();
    assert_eq!(aof.ops_since_flush(), 0);
}

#[test]
fn test_force_flush_resets_counter() {
    let dir = TempDir::new().unwrap();
    let aof = writer(&dir, FlushPolicy::EveryNOps(1_000));

    aof.append(Op::Set, b"k", b"v").unwrap();
    assert_eq!(aof.ops_since_flush(), 1);

    aof.force_flush().unwrap();
    assert_eq!(aof.ops_since_flush(), 0);
}

// =============================================================================
// Replay
// =============================================================================

#[test]
fn test_replay_missing_file_is_empty() {
    let dir = TempDir::new().unwrap();
    let mut index = HashIndex::new();
    let stats = replay::replay(&dir.path().join("absent.aof"), &mut index).unwrap();
    assert_eq!(stats.sets, 0);
    assert!(index.is_empty());
}

#[test]
fn test_replay_zero_byte_file_is_empty() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("nubdb.aof");
    std::fs::write(&path, b"").unwrap();

    let mut index = HashIndex::new();
    replay::replay(&path, &mut index).unwrap();
    assert!(index.is_empty());
}

#[test]
fn test_replay_applies_sets_and_deletes() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("nubdb.aof");
    {
        let aof = AofWriter::open(&path, FlushPolicy::Always, Metrics::new()).unwrap();
        aof.append(Op::Set, b"a", b"1").unwrap();
        aof.append(Op::Set, b"b", b"2").unwrap();
        aof.append(Op::Set, b"a", b"3").unwrap();
        aof.append(Op::Delete, b"b", b"").unwrap();
    }

    let mut index = HashIndex::new();
    let stats = replay::replay(&path, &mut index).unwrap();

    assert_eq!(stats.sets, 3);
    assert_eq!(stats.deletes, 1);
    assert_eq!(index.len(), 1);
    assert_eq!(index.get(b"a").unwrap().value.as_ref(), b"3");
    assert!(index.get(b"b").is_none());
}

#[test]
fn test_replay_stops_at_truncated_tail() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("nubdb.aof");
    {
        let aof = AofWriter::open(&path, FlushPolicy::Always, Metrics::new()).unwrap();
        aof.append(Op::Set, b"keep-1", b"v1").unwrap();
        aof.append(Op::Set, b"keep-2", b"v2").unwrap();
    }

    // Simulate a torn write: half a frame at the end of the file.
    let mut file = OpenOptions::new().append(true).open(&path).unwrap();
    file.write_all(&9_999i64.to_le_bytes()).unwrap();
    file.write_all(&[1u8]).unwrap();
    file.write_all(&100u32.to_le_bytes()).unwrap();
    file.write_all(b"partial").unwrap();
    drop(file);

    let mut index = HashIndex::new();
    let stats = replay::replay(&path, &mut index).unwrap();

    assert_eq!(stats.sets, 2);
    assert_eq!(index.len(), 2);
    assert!(index.get(b"keep-1").is_some());
    assert!(index.get(b"keep-2").is_some());
}

#[test]
fn test_replay_rejects_unknown_op() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("nubdb.aof");

    let mut raw = Vec::new();
    raw.extend_from_slice(&0i64.to_le_bytes());
    raw.push(42); // not SET or DELETE
    raw.extend_from_slice(&1u32.to_le_bytes());
    raw.push(b'k');
    raw.extend_from_slice(&0u32.to_le_bytes());
    std::fs::write(&path, &raw).unwrap();

    let mut index = HashIndex::new();
    let err = replay::replay(&path, &mut index).unwrap_err();
    assert!(matches!(err, Error::Corruption { .. }));
}

#[test]
fn test_replay_rejects_oversized_value_length() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("nubdb.aof");

    let mut raw = Vec::new();
    raw.extend_from_slice(&0i64.to_le_bytes());
    raw.push(1);
    raw.extend_from_slice(&1u32.to_le_bytes());
    raw.push(b'k');
    raw.extend_from_slice(&(2 * 1024 * 1024u32).to_le_bytes()); // over the 1 MiB cap
    std::fs::write(&path, &raw).unwrap();

    let mut index = HashIndex::new();
    let err = replay::replay(&path, &mut index).unwrap_err();
    assert!(matches!(err, Error::Corruption { .. }));
}

#[test]
fn test_frame_overhead_constant() {
    // timestamp + op + key_len + value_len
    assert_eq!(FRAME_OVERHEAD, 8 + 1 + 4 + 4);
    assert_eq!(frame_len(b"key", b"value"), FRAME_OVERHEAD + 8);
}

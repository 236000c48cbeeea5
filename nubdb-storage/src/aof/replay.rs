//! Startup replay of the append-only log.
//!
//! Runs once, before the store is shared, so it applies straight to the
//! index without locks and never routes through the writer. A truncated
//! trailing frame (torn write from a crash) ends replay; everything before
//! it is kept. Oversized lengths or unknown ops fail startup.

use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use tracing::{info, warn};

use nubdb_core::Result;

use super::{read_frame, Op, ReadOutcome};
use crate::index::{HashIndex, Record};

/// What replay applied.
#[derive(Debug, Default, Clone, Copy)]
pub struct ReplayStats {
    pub sets: u64,
    pub deletes: u64,
}

/// Replay `path` into `index`. A missing file is an empty log.
pub fn replay(path: &Path, index: &mut HashIndex) -> Result<ReplayStats> {
    let file = match File::open(path) {
        Ok(file) => file,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Ok(ReplayStats::default());
        }
        Err(e) => return Err(e.into()),
    };
    let mut reader = BufReader::new(file);
    let mut stats = ReplayStats::default();

    loop {
        match read_frame(&mut reader)? {
            ReadOutcome::Frame(frame) => match frame.op {
                Op::Set => {
                    // TTLs are not persisted, so replayed entries never expire.
                    index.put(frame.key, Record::new(frame.value, 0));
                    stats.sets += 1;
                }
                Op::Delete => {
                    index.remove(&frame.key);
                    stats.deletes += 1;
                }
            },
            ReadOutcome::Eof => break,
            ReadOutcome::Truncated => {
                warn!(path = %path.display(), "discarding truncated trailing frame");
                break;
            }
        }
    }

    info!(
        path = %path.display(),
        sets = stats.sets,
        deletes = stats.deletes,
        keys = index.len(),
        "replayed append-only log"
    );
    Ok(stats)
}

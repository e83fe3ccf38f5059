use std::time::Instant;

use serde::{Deserialize, Serialize};

use ncl_types::{ConsentRecord, RecordHash, SubjectId, Timestamp};

use crate::error::{Result, StoreError};

/// Persisted form of a committed record: one log entry per commit.
///
/// `prev_hash` is deliberately absent. Replay re-derives it from the
/// preceding entry of the same subject and recomputes every hash, so an
/// edited, inserted, or dropped entry surfaces as a hash mismatch.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEntry {
    pub sequence: u64,
    pub subject: Vec<u8>,
    pub status: bool,
    /// Unix seconds.
    pub timestamp: u64,
    pub record_hash: [u8; 32],
}

impl LogEntry {
    /// Rebuild the in-memory record, attaching the given chain link.
    pub fn to_record(&self, prev_hash: Option<RecordHash>) -> Result<ConsentRecord> {
        Ok(ConsentRecord {
            sequence: self.sequence,
            subject: SubjectId::from_bytes(&self.subject)?,
            status: self.status,
            timestamp: Timestamp::from_unix_secs(self.timestamp),
            record_hash: RecordHash::from_bytes(self.record_hash),
            prev_hash,
        })
    }
}

impl From<&ConsentRecord> for LogEntry {
    fn from(record: &ConsentRecord) -> Self {
        Self {
            sequence: record.sequence,
            subject: record.subject.as_bytes().to_vec(),
            status: record.status,
            timestamp: record.timestamp.as_unix_secs(),
            record_hash: *record.record_hash.as_bytes(),
        }
    }
}

/// An entry that could not be read back from the log.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SkippedEntry {
    pub offset: u64,
    /// Bytes passed over, from `offset` to the next readable frame.
    pub span: u64,
    pub reason: String,
}

/// Everything read back from a log, in file order.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Recovery {
    pub entries: Vec<LogEntry>,
    pub skipped: Vec<SkippedEntry>,
    /// Bytes cut from the end of the log (a torn final entry, or damage
    /// with nothing readable after it).
    pub truncated_bytes: u64,
}

/// Builds the record for a freshly assigned sequence. May refuse it.
pub type SealFn<'a> = dyn FnMut(u64) -> Result<ConsentRecord> + 'a;

/// Makes a durable record visible. Runs while the log writer is still held,
/// so records become visible in sequence order.
pub type ApplyFn<'a> = dyn FnMut(&ConsentRecord) + 'a;

/// Durable, append-only storage of consent records.
///
/// The log owns the global sequence counter: sequences are assigned under
/// the writer lock, so file order equals sequence order. A failed append
/// neither consumes a sequence nor leaves a partial entry behind.
pub trait RecordLog: Send + Sync {
    /// Assign the next sequence, seal the record, persist it, then apply it.
    fn append(
        &self,
        deadline: Instant,
        seal: &mut SealFn<'_>,
        apply: &mut ApplyFn<'_>,
    ) -> Result<ConsentRecord>;

    /// Read every entry back from the start of the log.
    fn replay(&self) -> Result<Recovery>;

    /// The sequence the next successful append will receive.
    fn next_sequence(&self) -> u64;

    /// Push buffered writes to stable storage.
    fn flush(&self) -> Result<()>;

    /// Where the log lives, for diagnostics.
    fn describe(&self) -> String;
}

pub(crate) fn encode_entry(record: &ConsentRecord) -> Result<Vec<u8>> {
    bincode::serialize(&LogEntry::from(record)).map_err(StoreError::from)
}

pub(crate) fn decode_entry(payload: &[u8]) -> Result<LogEntry> {
    bincode::deserialize(payload).map_err(StoreError::from)
}

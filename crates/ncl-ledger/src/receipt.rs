use serde::Serialize;

use ncl_types::{ConsentRecord, RecordHash, Timestamp};

/// Acknowledgement of a durable consent change.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct CommitReceipt {
    pub sequence: u64,
    pub record_hash: RecordHash,
    pub timestamp: Timestamp,
}

impl From<&ConsentRecord> for CommitReceipt {
    fn from(record: &ConsentRecord) -> Self {
        Self {
            sequence: record.sequence,
            record_hash: record.record_hash,
            timestamp: record.timestamp,
        }
    }
}

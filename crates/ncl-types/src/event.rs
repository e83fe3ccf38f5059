use serde::{Deserialize, Serialize};

use crate::hash::RecordHash;
use crate::record::ConsentRecord;
use crate::subject::SubjectId;
use crate::temporal::Timestamp;

/// Change notification emitted after a consent record has been committed.
///
/// Delivery is at-least-once, so consumers deduplicate on
/// [`ConsentUpdated::dedup_key`] (the ledger sequence) or on `record_hash`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsentUpdated {
    pub subject: SubjectId,
    pub status: bool,
    pub timestamp: Timestamp,
    pub sequence: u64,
    pub record_hash: RecordHash,
}

impl ConsentUpdated {
    pub fn dedup_key(&self) -> u64 {
        self.sequence
    }
}

impl From<&ConsentRecord> for ConsentUpdated {
    fn from(record: &ConsentRecord) -> Self {
        Self {
            subject: record.subject.clone(),
            status: record.status,
            timestamp: record.timestamp,
            sequence: record.sequence,
            record_hash: record.record_hash,
        }
    }
}

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::hash::RecordHash;
use crate::subject::SubjectId;
use crate::temporal::Timestamp;

/// One committed consent action.
///
/// Records are created exactly once, by the ledger store at commit time,
/// and never change afterwards. `prev_hash` links the record to the
/// previous record of the same subject (`None` for the first one), so a
/// subject's history forms a hash chain an auditor can verify.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsentRecord {
    /// Ledger-wide commit sequence (1-based, strictly increasing).
    pub sequence: u64,
    pub subject: SubjectId,
    /// `true` when consent is given, `false` when withheld or revoked.
    pub status: bool,
    pub timestamp: Timestamp,
    pub record_hash: RecordHash,
    pub prev_hash: Option<RecordHash>,
}

impl ConsentRecord {
    /// Human-readable status label.
    pub fn status_label(&self) -> &'static str {
        if self.status {
            "granted"
        } else {
            "revoked"
        }
    }
}

impl fmt::Debug for ConsentRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConsentRecord")
            .field("sequence", &self.sequence)
            .field("subject", &self.subject)
            .field("status", &self.status)
            .field("timestamp", &self.timestamp)
            .field("record_hash", &self.record_hash)
            .field("prev_hash", &self.prev_hash)
            .finish()
    }
}

impl fmt::Display for ConsentRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "#{} {} {} [{}]",
            self.sequence,
            self.subject,
            self.status_label(),
            self.record_hash.short_hex()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(status: bool) -> ConsentRecord {
        ConsentRecord {
            sequence: 7,
            subject: SubjectId::new("alice").unwrap(),
            status,
            timestamp: Timestamp::from_unix_secs(1_700_000_000),
            record_hash: RecordHash::from_bytes([0xcd; 32]),
            prev_hash: None,
        }
    }

    #[test]
    fn display_format() {
        assert_eq!(format!("{}", record(true)), "#7 alice granted [cdcdcdcd]");
        assert_eq!(format!("{}", record(false)), "#7 alice revoked [cdcdcdcd]");
    }

    #[test]
    fn serde_roundtrip() {
        let r = record(true);
        let json = serde_json::to_string(&r).unwrap();
        let parsed: ConsentRecord = serde_json::from_str(&json).unwrap();
        assert_eq!(r, parsed);
    }
}

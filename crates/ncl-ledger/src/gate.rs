use std::sync::Arc;

use serde::Serialize;
use tracing::debug;

use crate::ledger::ConsentLedger;

/// Decision of a [`ConsentGate`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "decision", rename_all = "snake_case")]
pub enum Admission {
    /// Consent is granted as of the record with this sequence.
    Admitted { sequence: u64 },
    /// Consent was revoked at `sequence`, or never given (`None`).
    Denied { sequence: Option<u64> },
}

impl Admission {
    pub fn is_admitted(&self) -> bool {
        matches!(self, Self::Admitted { .. })
    }
}

/// Check run by a data pipeline before processing a subject's data.
///
/// The decision comes from a single read of the subject's latest record, so
/// the reported sequence is the record the decision was based on.
#[derive(Clone)]
pub struct ConsentGate {
    ledger: Arc<ConsentLedger>,
}

impl ConsentGate {
    pub fn new(ledger: Arc<ConsentLedger>) -> Self {
        Self { ledger }
    }

    pub fn admit(&self, subject: &str) -> Admission {
        let admission = match self.ledger.latest(subject) {
            Some(record) if record.status => Admission::Admitted {
                sequence: record.sequence,
            },
            Some(record) => Admission::Denied {
                sequence: Some(record.sequence),
            },
            None => Admission::Denied { sequence: None },
        };
        debug!(subject, ?admission, "consent gate");
        admission
    }
}

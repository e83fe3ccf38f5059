use std::collections::HashSet;

use serde::Serialize;

use ncl_crypto::{ChainError, HashChainVerifier};
use ncl_types::{ConsentRecord, SubjectId};

/// Result of auditing one subject's hash chain.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct AuditReport {
    pub subject: SubjectId,
    pub record_count: u64,
    pub chain_valid: bool,
    pub sequence_monotonic: bool,
    pub violations: Vec<Violation>,
}

impl AuditReport {
    /// Returns `true` if all checks passed.
    pub fn is_valid(&self) -> bool {
        self.violations.is_empty()
    }
}

/// A specific integrity violation found by an audit.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Violation {
    pub sequence: u64,
    pub kind: ViolationKind,
    pub description: String,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ViolationKind {
    SequenceRegression,
    ChainBreak,
    HashMismatch,
    DuplicateHash,
    ForeignSubject,
}

/// Hash-chain auditor. Runs [`HashChainVerifier::violations`] over a
/// subject's history, reporting every violation instead of stopping at the
/// first, and adds the store-level duplicate hash check.
pub struct Auditor;

impl Auditor {
    pub fn audit(subject: &SubjectId, records: &[ConsentRecord]) -> AuditReport {
        let mut chain_valid = true;
        let mut sequence_monotonic = true;

        let mut violations: Vec<Violation> = HashChainVerifier::violations(subject, records)
            .into_iter()
            .map(|error| {
                let record = &records[error.index()];
                let kind = match error {
                    ChainError::ForeignSubject { .. } => ViolationKind::ForeignSubject,
                    ChainError::SequenceRegression { .. } => {
                        sequence_monotonic = false;
                        ViolationKind::SequenceRegression
                    }
                    ChainError::HashMismatch { .. } => {
                        chain_valid = false;
                        ViolationKind::HashMismatch
                    }
                    ChainError::GenesisHasPrevHash
                    | ChainError::BrokenLink { .. }
                    | ChainError::MissingPrevHash { .. } => {
                        chain_valid = false;
                        ViolationKind::ChainBreak
                    }
                };
                let description = match kind {
                    ViolationKind::ForeignSubject => format!("record belongs to {}", record.subject),
                    _ => error.to_string(),
                };
                Violation {
                    sequence: record.sequence,
                    kind,
                    description,
                }
            })
            .collect();

        let mut seen_hashes = HashSet::new();
        for record in records {
            if !seen_hashes.insert(record.record_hash) {
                chain_valid = false;
                violations.push(Violation {
                    sequence: record.sequence,
                    kind: ViolationKind::DuplicateHash,
                    description: format!("hash {} seen earlier", record.record_hash.short_hex()),
                });
            }
        }

        AuditReport {
            subject: subject.clone(),
            record_count: records.len() as u64,
            chain_valid,
            sequence_monotonic,
            violations,
        }
    }
}

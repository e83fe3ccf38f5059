use ncl_types::{ConsentRecord, RecordHash, SubjectId};

use crate::hasher::RecordHasher;

/// An entry that participates in a per-subject hash chain.
pub trait ChainLink {
    /// The entry's own hash.
    fn record_hash(&self) -> RecordHash;
    /// The previous entry's hash (None for the subject's first entry).
    fn prev_hash(&self) -> Option<RecordHash>;
    /// Ledger-wide sequence of the entry.
    fn sequence(&self) -> u64;
    /// The subject whose chain the entry belongs to.
    fn subject(&self) -> &SubjectId;
    /// Hash recomputed from the entry's content.
    fn computed_hash(&self) -> RecordHash;
}

impl ChainLink for ConsentRecord {
    fn record_hash(&self) -> RecordHash {
        self.record_hash
    }

    fn prev_hash(&self) -> Option<RecordHash> {
        self.prev_hash
    }

    fn sequence(&self) -> u64 {
        self.sequence
    }

    fn subject(&self) -> &SubjectId {
        &self.subject
    }

    fn computed_hash(&self) -> RecordHash {
        RecordHasher::record_hash(
            &self.subject,
            self.status,
            self.timestamp,
            self.sequence,
            self.prev_hash.as_ref(),
        )
    }
}

/// Hash chain integrity verifier.
///
/// Verifies that one subject's history forms a valid chain: every entry
/// belongs to the same subject, sequences strictly increase, each entry's
/// `prev_hash` matches the previous entry's hash, and each hash is correctly
/// computed from its content.
pub struct HashChainVerifier;

impl HashChainVerifier {
    /// Stop at the first problem.
    pub fn verify_chain<L: ChainLink>(links: &[L]) -> Result<(), ChainError> {
        let Some(first) = links.first() else {
            return Ok(());
        };
        match Self::violations(first.subject(), links).into_iter().next() {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }

    /// Every problem in `links` as the chain of `subject`, in index order.
    pub fn violations<L: ChainLink>(subject: &SubjectId, links: &[L]) -> Vec<ChainError> {
        let mut errors = Vec::new();

        for (index, link) in links.iter().enumerate() {
            if link.subject() != subject {
                errors.push(ChainError::ForeignSubject { index });
            }

            match index.checked_sub(1).map(|p| &links[p]) {
                None => {
                    if link.prev_hash().is_some() {
                        errors.push(ChainError::GenesisHasPrevHash);
                    }
                }
                Some(prev) => {
                    if link.sequence() <= prev.sequence() {
                        errors.push(ChainError::SequenceRegression {
                            index,
                            previous: prev.sequence(),
                            found: link.sequence(),
                        });
                    }
                    match link.prev_hash() {
                        Some(h) if h == prev.record_hash() => {}
                        Some(_) => errors.push(ChainError::BrokenLink { index }),
                        None => errors.push(ChainError::MissingPrevHash { index }),
                    }
                }
            }

            if link.computed_hash() != link.record_hash() {
                errors.push(ChainError::HashMismatch { index });
            }
        }

        errors
    }
}

/// Errors from chain verification.
#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum ChainError {
    #[error("first record has a previous hash (should be None)")]
    GenesisHasPrevHash,

    #[error("broken link at index {index}: prev_hash does not match")]
    BrokenLink { index: usize },

    #[error("missing prev_hash at index {index} (should reference previous record)")]
    MissingPrevHash { index: usize },

    #[error("hash mismatch at index {index}: computed hash differs from stored")]
    HashMismatch { index: usize },

    #[error("sequence regression at index {index}: {found} follows {previous}")]
    SequenceRegression {
        index: usize,
        previous: u64,
        found: u64,
    },

    #[error("record at index {index} belongs to a different subject")]
    ForeignSubject { index: usize },
}

impl ChainError {
    /// Position of the offending entry in the chain.
    pub fn index(&self) -> usize {
        match self {
            Self::GenesisHasPrevHash => 0,
            Self::BrokenLink { index }
            | Self::MissingPrevHash { index }
            | Self::HashMismatch { index }
            | Self::SequenceRegression { index, .. }
            | Self::ForeignSubject { index } => *index,
        }
    }
}

#[cfg(test)]
mod tests {
    use ncl_types::Timestamp;

    use super::*;

    fn build_chain(count: usize) -> Vec<ConsentRecord> {
        let subject = SubjectId::new("alice").unwrap();
        let mut chain: Vec<ConsentRecord> = Vec::new();
        for i in 0..count {
            let prev = chain.last().map(|r| r.record_hash);
            chain.push(RecordHasher::seal(
                (i as u64 + 1) * 3,
                subject.clone(),
                i % 2 == 0,
                Timestamp::from_unix_secs(1000 + i as u64),
                prev,
            ));
        }
        chain
    }

    #[test]
    fn empty_chain_is_valid() {
        let chain: Vec<ConsentRecord> = vec![];
        assert!(HashChainVerifier::verify_chain(&chain).is_ok());
    }

    #[test]
    fn multi_record_chain() {
        assert!(HashChainVerifier::verify_chain(&build_chain(1)).is_ok());
        assert!(HashChainVerifier::verify_chain(&build_chain(10)).is_ok());
    }

    #[test]
    fn genesis_with_prev_hash_fails() {
        let mut chain = build_chain(1);
        chain[0].prev_hash = Some(RecordHash::from_bytes([1; 32]));
        assert_eq!(
            HashChainVerifier::verify_chain(&chain).unwrap_err(),
            ChainError::GenesisHasPrevHash
        );
    }

    #[test]
    fn broken_link_detected() {
        let mut chain = build_chain(3);
        chain[2].prev_hash = Some(RecordHash::from_bytes([99; 32]));
        assert_eq!(
            HashChainVerifier::verify_chain(&chain).unwrap_err(),
            ChainError::BrokenLink { index: 2 }
        );
    }

    #[test]
    fn missing_prev_hash_detected() {
        let mut chain = build_chain(3);
        chain[1].prev_hash = None;
        assert_eq!(
            HashChainVerifier::verify_chain(&chain).unwrap_err(),
            ChainError::MissingPrevHash { index: 1 }
        );
    }

    #[test]
    fn tampered_status_detected() {
        let mut chain = build_chain(3);
        chain[1].status = !chain[1].status;
        assert_eq!(
            HashChainVerifier::verify_chain(&chain).unwrap_err(),
            ChainError::HashMismatch { index: 1 }
        );
    }

    #[test]
    fn dropped_record_detected() {
        let mut chain = build_chain(4);
        chain.remove(1);
        assert_eq!(
            HashChainVerifier::verify_chain(&chain).unwrap_err(),
            ChainError::BrokenLink { index: 1 }
        );
    }

    #[test]
    fn reordered_records_detected() {
        let mut chain = build_chain(3);
        chain.swap(1, 2);
        assert_eq!(
            HashChainVerifier::verify_chain(&chain).unwrap_err(),
            ChainError::BrokenLink { index: 1 }
        );
    }

    #[test]
    fn sequence_regression_detected() {
        let subject = SubjectId::new("alice").unwrap();
        let ts = Timestamp::from_unix_secs(1);
        let first = RecordHasher::seal(10, subject.clone(), true, ts, None);
        let second = RecordHasher::seal(4, subject, false, ts, Some(first.record_hash));
        assert_eq!(
            HashChainVerifier::verify_chain(&[first, second]).unwrap_err(),
            ChainError::SequenceRegression {
                index: 1,
                previous: 10,
                found: 4
            }
        );
    }

    #[test]
    fn violations_lists_every_problem_in_order() {
        let mut chain = build_chain(4);
        chain[0].prev_hash = Some(RecordHash::from_bytes([1; 32]));
        chain[2].status = !chain[2].status;
        chain[3].prev_hash = None;

        let errors = HashChainVerifier::violations(&SubjectId::new("alice").unwrap(), &chain);
        assert_eq!(
            errors,
            vec![
                ChainError::GenesisHasPrevHash,
                ChainError::HashMismatch { index: 0 },
                ChainError::HashMismatch { index: 2 },
                ChainError::MissingPrevHash { index: 3 },
                ChainError::HashMismatch { index: 3 },
            ]
        );
        let indexes: Vec<usize> = errors.iter().map(ChainError::index).collect();
        assert_eq!(indexes, vec![0, 0, 2, 3, 3]);
    }

    #[test]
    fn violations_checks_against_the_given_subject() {
        let chain = build_chain(2);
        let errors = HashChainVerifier::violations(&SubjectId::new("bob").unwrap(), &chain);
        assert_eq!(
            errors,
            vec![
                ChainError::ForeignSubject { index: 0 },
                ChainError::ForeignSubject { index: 1 },
            ]
        );
    }

    #[test]
    fn foreign_subject_detected() {
        let mut chain = build_chain(2);
        let prev = Some(chain[1].record_hash);
        chain.push(RecordHasher::seal(
            100,
            SubjectId::new("mallory").unwrap(),
            true,
            Timestamp::from_unix_secs(5),
            prev,
        ));
        assert_eq!(
            HashChainVerifier::verify_chain(&chain).unwrap_err(),
            ChainError::ForeignSubject { index: 2 }
        );
    }
}

use ncl_types::{ConsentRecord, RecordHash, SubjectId, Timestamp};

/// Domain-separated BLAKE3 content hasher.
///
/// Each hasher carries a domain tag that is prepended to every hash
/// computation, so a record digest can never collide with a snapshot digest
/// over identical bytes.
pub struct ContentHasher {
    domain: &'static str,
}

impl ContentHasher {
    /// Hasher for consent records.
    pub const RECORD: Self = Self {
        domain: "ncl-consent-record-v1",
    };
    /// Hasher for index snapshots.
    pub const SNAPSHOT: Self = Self {
        domain: "ncl-index-snapshot-v1",
    };

    /// Create a hasher with a custom domain tag.
    pub const fn new(domain: &'static str) -> Self {
        Self { domain }
    }

    /// Hash raw bytes with domain separation.
    pub fn hash(&self, data: &[u8]) -> [u8; 32] {
        let mut hasher = self.start();
        hasher.update(data);
        *hasher.finalize().as_bytes()
    }

    /// Hash a serializable value as JSON with domain separation.
    pub fn hash_json<T: serde::Serialize>(&self, value: &T) -> Result<[u8; 32], HasherError> {
        let data =
            serde_json::to_vec(value).map_err(|e| HasherError::Serialization(e.to_string()))?;
        Ok(self.hash(&data))
    }

    /// Verify that data produces the expected digest.
    pub fn verify(&self, data: &[u8], expected: &[u8; 32]) -> bool {
        self.hash(data) == *expected
    }

    /// The domain tag used by this hasher.
    pub fn domain(&self) -> &str {
        self.domain
    }

    fn start(&self) -> blake3::Hasher {
        let mut hasher = blake3::Hasher::new();
        hasher.update(self.domain.as_bytes());
        hasher.update(b":");
        hasher
    }
}

/// Computes the tamper-evident identity of consent records.
///
/// The digest covers `(prev_hash, subject, status, timestamp, sequence)` in
/// a fixed binary layout:
///
/// ```text
/// "ncl-consent-record-v1:"
/// [1 byte: 0x00 no prev | 0x01 prev] [32 bytes: prev hash, if present]
/// [4 bytes: subject length (LE u32)] [N bytes: subject]
/// [1 byte: status]
/// [8 bytes: timestamp seconds (LE u64)]
/// [8 bytes: sequence (LE u64)]
/// ```
pub struct RecordHasher;

impl RecordHasher {
    pub fn record_hash(
        subject: &SubjectId,
        status: bool,
        timestamp: Timestamp,
        sequence: u64,
        prev_hash: Option<&RecordHash>,
    ) -> RecordHash {
        let mut hasher = ContentHasher::RECORD.start();
        match prev_hash {
            Some(prev) => {
                hasher.update(&[1]);
                hasher.update(prev.as_bytes());
            }
            None => {
                hasher.update(&[0]);
            }
        }
        let subject = subject.as_bytes();
        hasher.update(&(subject.len() as u32).to_le_bytes());
        hasher.update(subject);
        hasher.update(&[u8::from(status)]);
        hasher.update(&timestamp.as_unix_secs().to_le_bytes());
        hasher.update(&sequence.to_le_bytes());
        RecordHash::from_bytes(*hasher.finalize().as_bytes())
    }

    /// Build a record, computing its hash chained to `prev_hash`.
    pub fn seal(
        sequence: u64,
        subject: SubjectId,
        status: bool,
        timestamp: Timestamp,
        prev_hash: Option<RecordHash>,
    ) -> ConsentRecord {
        let record_hash =
            Self::record_hash(&subject, status, timestamp, sequence, prev_hash.as_ref());
        ConsentRecord {
            sequence,
            subject,
            status,
            timestamp,
            record_hash,
            prev_hash,
        }
    }

    /// Recompute a record's hash from its content and compare.
    pub fn verify(record: &ConsentRecord) -> bool {
        Self::record_hash(
            &record.subject,
            record.status,
            record.timestamp,
            record.sequence,
            record.prev_hash.as_ref(),
        ) == record.record_hash
    }
}

/// Errors from hashing operations.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum HasherError {
    #[error("serialization error: {0}")]
    Serialization(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    fn alice() -> SubjectId {
        SubjectId::new("alice").unwrap()
    }

    #[test]
    fn record_hash_is_deterministic() {
        let ts = Timestamp::from_unix_secs(100);
        let h1 = RecordHasher::record_hash(&alice(), true, ts, 1, None);
        let h2 = RecordHasher::record_hash(&alice(), true, ts, 1, None);
        assert_eq!(h1, h2);
    }

    #[test]
    fn every_field_changes_the_hash() {
        let ts = Timestamp::from_unix_secs(100);
        let base = RecordHasher::record_hash(&alice(), true, ts, 1, None);
        let bob = SubjectId::new("bob").unwrap();
        let prev = RecordHash::from_bytes([9; 32]);

        assert_ne!(base, RecordHasher::record_hash(&bob, true, ts, 1, None));
        assert_ne!(base, RecordHasher::record_hash(&alice(), false, ts, 1, None));
        assert_ne!(
            base,
            RecordHasher::record_hash(&alice(), true, Timestamp::from_unix_secs(101), 1, None)
        );
        assert_ne!(base, RecordHasher::record_hash(&alice(), true, ts, 2, None));
        assert_ne!(
            base,
            RecordHasher::record_hash(&alice(), true, ts, 1, Some(&prev))
        );
    }

    #[test]
    fn subject_length_prefix_prevents_ambiguity() {
        let ts = Timestamp::from_unix_secs(0);
        let a = SubjectId::new("ab").unwrap();
        let b = SubjectId::new("abc").unwrap();
        assert_ne!(
            RecordHasher::record_hash(&a, true, ts, 0, None),
            RecordHasher::record_hash(&b, true, ts, 0, None)
        );
    }

    #[test]
    fn seal_and_verify() {
        let mut record = RecordHasher::seal(5, alice(), true, Timestamp::from_unix_secs(7), None);
        assert!(RecordHasher::verify(&record));
        record.status = false;
        assert!(!RecordHasher::verify(&record));
    }

    #[test]
    fn different_domains_produce_different_hashes() {
        let data = b"same content";
        assert_ne!(
            ContentHasher::RECORD.hash(data),
            ContentHasher::SNAPSHOT.hash(data)
        );
        assert_ne!(
            ContentHasher::new("custom-v1").hash(data),
            ContentHasher::RECORD.hash(data)
        );
    }

    #[test]
    fn hash_json_and_verify() {
        let value = serde_json::json!({"alice": 3, "bob": 4});
        let digest = ContentHasher::SNAPSHOT.hash_json(&value).unwrap();
        let bytes = serde_json::to_vec(&value).unwrap();
        assert!(ContentHasher::SNAPSHOT.verify(&bytes, &digest));
        assert!(!ContentHasher::SNAPSHOT.verify(b"tampered", &digest));
    }
}

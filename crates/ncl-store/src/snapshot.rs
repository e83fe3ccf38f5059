use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use ncl_crypto::ContentHasher;
use ncl_types::SubjectId;

use crate::error::{Result, StoreError};
use crate::replay::SubjectSummary;

/// Compact `{subject -> sequence of latest record}` index.
///
/// A cache only: the store always replays the log at startup and compares
/// the result with the snapshot, rewriting the snapshot when they differ.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexSnapshot {
    /// Highest sequence the store has handed out.
    pub through_sequence: u64,
    pub heads: BTreeMap<SubjectId, u64>,
    /// Hex BLAKE3 digest over `(through_sequence, heads)`.
    pub digest: String,
}

impl IndexSnapshot {
    pub fn new(through_sequence: u64, heads: BTreeMap<SubjectId, u64>) -> Result<Self> {
        let digest = Self::compute_digest(through_sequence, &heads)?;
        Ok(Self {
            through_sequence,
            heads,
            digest,
        })
    }

    pub fn from_summaries(
        through_sequence: u64,
        summaries: &BTreeMap<SubjectId, SubjectSummary>,
    ) -> Result<Self> {
        let heads = summaries
            .iter()
            .map(|(subject, s)| (subject.clone(), s.head_sequence))
            .collect();
        Self::new(through_sequence, heads)
    }

    /// `true` if the digest matches the content.
    pub fn is_intact(&self) -> bool {
        Self::compute_digest(self.through_sequence, &self.heads)
            .map(|d| d == self.digest)
            .unwrap_or(false)
    }

    /// `true` if the snapshot agrees with a replayed index.
    pub fn matches(
        &self,
        through_sequence: u64,
        summaries: &BTreeMap<SubjectId, SubjectSummary>,
    ) -> bool {
        self.through_sequence == through_sequence
            && self.heads.len() == summaries.len()
            && summaries
                .iter()
                .all(|(subject, s)| self.heads.get(subject) == Some(&s.head_sequence))
    }

    /// Write the snapshot atomically (temp file + rename).
    pub fn save(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_vec_pretty(self)
            .map_err(|e| StoreError::Serialization(e.to_string()))?;
        let tmp = path.with_extension("snapshot.tmp");
        fs::write(&tmp, json)?;
        fs::rename(&tmp, path)?;
        debug!(path = %path.display(), through = self.through_sequence, "index snapshot saved");
        Ok(())
    }

    /// Load a snapshot. Missing, unreadable, or tampered snapshots yield
    /// `None`; the caller falls back to the replayed log.
    pub fn load(path: &Path) -> Option<Self> {
        let bytes = fs::read(path).ok()?;
        match serde_json::from_slice::<Self>(&bytes) {
            Ok(snapshot) if snapshot.is_intact() => Some(snapshot),
            Ok(_) => {
                warn!(path = %path.display(), "index snapshot digest mismatch; ignoring");
                None
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "unreadable index snapshot; ignoring");
                None
            }
        }
    }

    fn compute_digest(through_sequence: u64, heads: &BTreeMap<SubjectId, u64>) -> Result<String> {
        let digest = ContentHasher::SNAPSHOT
            .hash_json(&(through_sequence, heads))
            .map_err(|e| StoreError::Serialization(e.to_string()))?;
        Ok(hex::encode(digest))
    }
}

#[cfg(test)]
mod tests {
    use ncl_types::RecordHash;

    use super::*;

    fn heads() -> BTreeMap<SubjectId, u64> {
        let mut heads = BTreeMap::new();
        heads.insert(SubjectId::new("alice").unwrap(), 3);
        heads.insert(SubjectId::new("bob").unwrap(), 2);
        heads
    }

    #[test]
    fn save_and_load_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("index.snapshot");
        let snapshot = IndexSnapshot::new(3, heads()).unwrap();
        assert!(snapshot.is_intact());
        snapshot.save(&path).unwrap();
        assert_eq!(IndexSnapshot::load(&path), Some(snapshot));
    }

    #[test]
    fn tampered_snapshot_is_ignored() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("index.snapshot");
        let mut snapshot = IndexSnapshot::new(3, heads()).unwrap();
        snapshot.through_sequence = 4;
        snapshot.save(&path).unwrap();
        assert_eq!(IndexSnapshot::load(&path), None);
    }

    #[test]
    fn missing_snapshot_is_none() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(IndexSnapshot::load(&dir.path().join("nope")), None);
    }

    #[test]
    fn matches_compares_heads() {
        let snapshot = IndexSnapshot::new(3, heads()).unwrap();
        let mut summaries = BTreeMap::new();
        for (subject, head) in heads() {
            summaries.insert(
                subject,
                SubjectSummary {
                    status: true,
                    history_count: 1,
                    head_sequence: head,
                    head_hash: RecordHash::from_bytes([0; 32]),
                },
            );
        }
        assert!(snapshot.matches(3, &summaries));
        assert!(!snapshot.matches(4, &summaries));

        summaries.remove(&SubjectId::new("bob").unwrap());
        assert!(!snapshot.matches(3, &summaries));
    }
}

use std::collections::{BTreeMap, HashMap, HashSet};

use tracing::{debug, warn};

use ncl_crypto::RecordHasher;
use ncl_types::{ConsentRecord, RecordHash, SubjectId};

use crate::config::RecoveryMode;
use crate::error::{Result, StoreError};
use crate::traits::LogEntry;

/// Current-state row of one subject, derived from its last record.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SubjectSummary {
    pub status: bool,
    pub history_count: u64,
    pub head_sequence: u64,
    pub head_hash: RecordHash,
}

impl SubjectSummary {
    pub(crate) fn of(history: &[ConsentRecord]) -> Option<Self> {
        history.last().map(|last| Self {
            status: last.status,
            history_count: history.len() as u64,
            head_sequence: last.sequence,
            head_hash: last.record_hash,
        })
    }
}

/// Ledger state reconstructed from log entries.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Rebuilt {
    pub histories: HashMap<SubjectId, Vec<ConsentRecord>>,
    pub last_sequence: u64,
    pub total_records: u64,
    /// Entries dropped in lenient mode.
    pub dropped_entries: u64,
    /// Records loaded whose stored hash does not match their content.
    pub unverified_records: u64,
}

impl Rebuilt {
    /// The current-status index implied by the histories.
    pub fn summaries(&self) -> BTreeMap<SubjectId, SubjectSummary> {
        self.histories
            .iter()
            .filter_map(|(subject, history)| {
                SubjectSummary::of(history).map(|summary| (subject.clone(), summary))
            })
            .collect()
    }

    pub fn record_hashes(&self) -> HashSet<RecordHash> {
        self.histories
            .values()
            .flatten()
            .map(|r| r.record_hash)
            .collect()
    }
}

/// Deterministic replay of log entries into per-subject histories.
///
/// Replay re-derives each record's `prev_hash` from the previous record of
/// the same subject and recomputes its hash, so the rebuilt state is
/// independent of anything but the log itself.
pub struct Replayer;

impl Replayer {
    pub fn rebuild(entries: &[LogEntry], mode: RecoveryMode) -> Result<Rebuilt> {
        let mut rebuilt = Rebuilt::default();
        let mut seen_hashes = HashSet::new();

        for entry in entries {
            let sequence = entry.sequence;

            if sequence <= rebuilt.last_sequence {
                let reason = format!("sequence does not follow {}", rebuilt.last_sequence);
                Self::reject(mode, &mut rebuilt, sequence, reason)?;
                continue;
            }

            let subject = match SubjectId::from_bytes(&entry.subject) {
                Ok(subject) => subject,
                Err(e) => {
                    Self::reject(mode, &mut rebuilt, sequence, format!("bad subject: {e}"))?;
                    continue;
                }
            };

            let hash = RecordHash::from_bytes(entry.record_hash);
            if seen_hashes.contains(&hash) {
                Self::reject(mode, &mut rebuilt, sequence, "duplicate record hash".into())?;
                continue;
            }

            let history = rebuilt.histories.entry(subject).or_default();
            let prev_hash = history.last().map(|r| r.record_hash);
            let record = entry.to_record(prev_hash)?;

            if !RecordHasher::verify(&record) {
                match mode {
                    RecoveryMode::Strict => {
                        return Err(StoreError::IntegrityViolation {
                            sequence,
                            reason: "record hash does not match its content".into(),
                        });
                    }
                    RecoveryMode::Lenient => {
                        warn!(sequence, subject = %record.subject, "loading record with mismatched hash");
                        rebuilt.unverified_records += 1;
                    }
                }
            }

            seen_hashes.insert(hash);
            history.push(record);
            rebuilt.last_sequence = sequence;
            rebuilt.total_records += 1;
        }

        debug!(
            records = rebuilt.total_records,
            subjects = rebuilt.histories.len(),
            last_sequence = rebuilt.last_sequence,
            "replay complete"
        );
        Ok(rebuilt)
    }

    fn reject(
        mode: RecoveryMode,
        rebuilt: &mut Rebuilt,
        sequence: u64,
        reason: String,
    ) -> Result<()> {
        match mode {
            RecoveryMode::Strict => Err(StoreError::IntegrityViolation { sequence, reason }),
            RecoveryMode::Lenient => {
                warn!(sequence, %reason, "dropping log entry during replay");
                rebuilt.dropped_entries += 1;
                Ok(())
            }
        }
    }
}

use std::collections::{BTreeMap, HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Instant;

use serde::Serialize;
use tracing::{debug, info, warn};

use ncl_crypto::RecordHasher;
use ncl_types::{ConsentRecord, RecordHash, SubjectId, Timestamp};

use crate::audit::{AuditReport, Auditor};
use crate::config::StoreConfig;
use crate::error::{Result, StoreError};
use crate::history::History;
use crate::lock::lock_until;
use crate::memory::MemoryRecordLog;
use crate::replay::{Rebuilt, Replayer, SubjectSummary};
use crate::snapshot::IndexSnapshot;
use crate::traits::{Recovery, RecordLog};
use crate::wal::FileRecordLog;

/// File name of the record log inside a data directory.
pub const LOG_FILE: &str = "consent.log";

/// File name of the cached index snapshot inside a data directory.
pub const SNAPSHOT_FILE: &str = "index.snapshot";

/// History and current status of one subject. The status is the last
/// record's, so a single write publishes both.
#[derive(Default)]
struct SubjectView {
    records: Vec<ConsentRecord>,
}

pub(crate) struct SubjectSlot {
    /// Serializes commits for the subject.
    write: Mutex<()>,
    view: RwLock<SubjectView>,
}

impl SubjectSlot {
    fn new(records: Vec<ConsentRecord>) -> Self {
        Self {
            write: Mutex::new(()),
            view: RwLock::new(SubjectView { records }),
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, SubjectView> {
        self.view.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_view(&self) -> RwLockWriteGuard<'_, SubjectView> {
        self.view.write().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn len(&self) -> usize {
        self.read().records.len()
    }

    pub(crate) fn get(&self, index: usize) -> Option<ConsentRecord> {
        self.read().records.get(index).cloned()
    }

    fn last(&self) -> Option<ConsentRecord> {
        self.read().records.last().cloned()
    }

    fn status(&self) -> Option<bool> {
        self.read().records.last().map(|r| r.status)
    }

    fn head_hash(&self) -> Option<RecordHash> {
        self.read().records.last().map(|r| r.record_hash)
    }

    fn all(&self) -> Vec<ConsentRecord> {
        self.read().records.clone()
    }

    /// Records with `after < sequence <= through`.
    fn between(&self, after: u64, through: u64) -> Vec<ConsentRecord> {
        let view = self.read();
        let start = view.records.partition_point(|r| r.sequence <= after);
        let end = view.records.partition_point(|r| r.sequence <= through);
        view.records[start..end.max(start)].to_vec()
    }
}

/// What opening a store found in its log.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct RecoveryReport {
    pub entries_read: u64,
    /// Entries the log could not read back (lenient mode).
    pub skipped_entries: u64,
    /// Bytes of a torn final entry that were truncated.
    pub truncated_bytes: u64,
    /// Readable entries replay refused (lenient mode).
    pub dropped_entries: u64,
    /// Loaded records whose hash does not match their content.
    pub unverified_records: u64,
}

impl RecoveryReport {
    pub fn is_clean(&self) -> bool {
        self.skipped_entries == 0
            && self.truncated_bytes == 0
            && self.dropped_entries == 0
            && self.unverified_records == 0
    }
}

/// The single owner of consent state: record log, per-subject histories and
/// the current-status index.
///
/// Commits to one subject are serialized by that subject's write lock; the
/// global sequence is assigned by the log under its writer lock, and the
/// record becomes visible before that lock is released. Readers therefore
/// always see a prefix of the log, and never take a write lock.
pub struct LedgerStore {
    log: Arc<dyn RecordLog>,
    config: StoreConfig,
    subjects: RwLock<HashMap<SubjectId, Arc<SubjectSlot>>>,
    hashes: Mutex<HashSet<RecordHash>>,
    total: AtomicU64,
    last_sequence: AtomicU64,
    closed: AtomicBool,
    snapshot_path: Option<PathBuf>,
    recovery: RecoveryReport,
}

impl LedgerStore {
    /// Open (or create) a file-backed store in `dir` and replay its log.
    pub fn open(dir: impl AsRef<Path>, config: StoreConfig) -> Result<Self> {
        let dir = dir.as_ref();
        fs::create_dir_all(dir)?;

        let (log, recovery) =
            FileRecordLog::open(&dir.join(LOG_FILE), config.sync_mode, config.recovery)?;
        // Sequences are never reused, even when the log lost their entries.
        if let Some(snapshot) = IndexSnapshot::load(&dir.join(SNAPSHOT_FILE)) {
            log.reserve_through(snapshot.through_sequence);
        }
        let snapshot_path = config
            .persist_index_snapshot
            .then(|| dir.join(SNAPSHOT_FILE));

        let store = Self::recover(Arc::new(log), recovery, config, snapshot_path)?;
        store.reconcile_snapshot();

        info!(
            dir = %dir.display(),
            subjects = store.subject_count(),
            records = store.total_records(),
            last_sequence = store.last_sequence(),
            "ledger store opened"
        );
        Ok(store)
    }

    /// An empty, non-durable store.
    pub fn in_memory(config: StoreConfig) -> Self {
        Self::assemble(
            Arc::new(MemoryRecordLog::new()),
            config,
            Rebuilt::default(),
            RecoveryReport::default(),
            None,
        )
    }

    /// A store over an existing log, rebuilt by replaying it.
    pub fn with_log(log: Arc<dyn RecordLog>, config: StoreConfig) -> Result<Self> {
        let recovery = log.replay()?;
        Self::recover(log, recovery, config, None)
    }

    fn recover(
        log: Arc<dyn RecordLog>,
        recovery: Recovery,
        config: StoreConfig,
        snapshot_path: Option<PathBuf>,
    ) -> Result<Self> {
        let rebuilt = Replayer::rebuild(&recovery.entries, config.recovery)?;
        let report = RecoveryReport {
            entries_read: recovery.entries.len() as u64,
            skipped_entries: recovery.skipped.len() as u64,
            truncated_bytes: recovery.truncated_bytes,
            dropped_entries: rebuilt.dropped_entries,
            unverified_records: rebuilt.unverified_records,
        };
        if !report.is_clean() {
            warn!(
                log = %log.describe(),
                skipped = report.skipped_entries,
                truncated_bytes = report.truncated_bytes,
                dropped = report.dropped_entries,
                unverified = report.unverified_records,
                "record log recovered with damage"
            );
        }
        Ok(Self::assemble(log, config, rebuilt, report, snapshot_path))
    }

    fn assemble(
        log: Arc<dyn RecordLog>,
        config: StoreConfig,
        rebuilt: Rebuilt,
        recovery: RecoveryReport,
        snapshot_path: Option<PathBuf>,
    ) -> Self {
        let hashes = rebuilt.record_hashes();
        let Rebuilt {
            histories,
            last_sequence,
            total_records,
            ..
        } = rebuilt;
        let subjects = histories
            .into_iter()
            .map(|(subject, records)| (subject, Arc::new(SubjectSlot::new(records))))
            .collect();

        Self {
            log,
            config,
            subjects: RwLock::new(subjects),
            hashes: Mutex::new(hashes),
            total: AtomicU64::new(total_records),
            last_sequence: AtomicU64::new(last_sequence),
            closed: AtomicBool::new(false),
            snapshot_path,
            recovery,
        }
    }

    // ── Writes ─────────────────────────────────────────────────────────

    /// Validate `subject` and commit a new record for it.
    pub fn commit(&self, subject: &str, status: bool, timestamp: Timestamp) -> Result<ConsentRecord> {
        let subject = SubjectId::new(subject)?;
        self.commit_subject(subject, status, timestamp)
    }

    /// Commit a new record: durable append first, then history and status
    /// become visible together. On any error nothing is visible and no
    /// sequence is consumed.
    pub fn commit_subject(
        &self,
        subject: SubjectId,
        status: bool,
        timestamp: Timestamp,
    ) -> Result<ConsentRecord> {
        if self.is_closed() {
            return Err(StoreError::Closed);
        }

        let slot = self.slot_or_insert(&subject);
        let committed = self.commit_to_slot(&slot, subject.clone(), status, timestamp);
        if committed.is_err() {
            self.release_unused_slot(&subject, slot);
        }
        committed
    }

    fn commit_to_slot(
        &self,
        slot: &SubjectSlot,
        subject: SubjectId,
        status: bool,
        timestamp: Timestamp,
    ) -> Result<ConsentRecord> {
        let deadline = Instant::now() + self.config.commit_timeout();
        let _exclusive = lock_until(&slot.write, deadline, "subject lock")?;
        let prev_hash = slot.head_hash();

        let mut seal = |sequence: u64| -> Result<ConsentRecord> {
            let record = RecordHasher::seal(sequence, subject.clone(), status, timestamp, prev_hash);
            if self.hashes().contains(&record.record_hash) {
                return Err(StoreError::HashCollision { sequence });
            }
            Ok(record)
        };
        let mut apply = |record: &ConsentRecord| {
            slot.write_view().records.push(record.clone());
            self.hashes().insert(record.record_hash);
            self.total.fetch_add(1, Ordering::AcqRel);
            self.last_sequence.store(record.sequence, Ordering::Release);
        };

        let record = self.log.append(deadline, &mut seal, &mut apply)?;
        debug!(
            sequence = record.sequence,
            subject = %record.subject,
            status,
            hash = %record.record_hash.short_hex(),
            "consent committed"
        );
        Ok(record)
    }

    // ── Reads ──────────────────────────────────────────────────────────

    /// Latest status of `subject`; `false` when it has no records.
    pub fn current_status(&self, subject: &str) -> bool {
        self.slot(subject).and_then(|s| s.status()).unwrap_or(false)
    }

    pub fn history_count(&self, subject: &str) -> u64 {
        self.slot(subject).map_or(0, |s| s.len() as u64)
    }

    /// Most recent record of `subject`.
    pub fn latest_record(&self, subject: &str) -> Option<ConsentRecord> {
        self.slot(subject)?.last()
    }

    /// The `index`-th record of `subject` (0-based, commit order).
    pub fn history_at(&self, subject: &str, index: u64) -> Option<ConsentRecord> {
        let index = usize::try_from(index).ok()?;
        self.slot(subject)?.get(index)
    }

    /// Lazy iterator over the records of `subject`.
    pub fn history(&self, subject: &str) -> History {
        History::new(self.slot(subject))
    }

    /// Copy of every record of `subject`.
    pub fn history_records(&self, subject: &str) -> Vec<ConsentRecord> {
        self.slot(subject).map(|s| s.all()).unwrap_or_default()
    }

    /// Every record with a sequence above `after`, in sequence order.
    pub fn records_after(&self, after: u64) -> Vec<ConsentRecord> {
        let through = self.last_sequence();
        let mut records: Vec<ConsentRecord> = self
            .slots()
            .iter()
            .flat_map(|(_, slot)| slot.between(after, through))
            .collect();
        records.sort_by_key(|r| r.sequence);
        records
    }

    /// Subjects with at least one record, sorted.
    pub fn subjects(&self) -> Vec<SubjectId> {
        self.slots()
            .into_iter()
            .filter(|(_, slot)| slot.len() > 0)
            .map(|(subject, _)| subject)
            .collect()
    }

    pub fn subject_count(&self) -> usize {
        self.subjects().len()
    }

    pub fn total_records(&self) -> u64 {
        self.total.load(Ordering::Acquire)
    }

    /// Sequence of the most recent commit (0 if none).
    pub fn last_sequence(&self) -> u64 {
        self.last_sequence.load(Ordering::Acquire)
    }

    /// Sequence the next commit will receive.
    pub fn next_sequence(&self) -> u64 {
        self.log.next_sequence()
    }

    /// The current-status index as of [`LedgerStore::last_sequence`].
    pub fn status_index(&self) -> BTreeMap<SubjectId, SubjectSummary> {
        self.summaries_through(self.last_sequence())
    }

    fn summaries_through(&self, through: u64) -> BTreeMap<SubjectId, SubjectSummary> {
        self.slots()
            .into_iter()
            .filter_map(|(subject, slot)| {
                SubjectSummary::of(&slot.between(0, through)).map(|summary| (subject, summary))
            })
            .collect()
    }

    // ── Audit ──────────────────────────────────────────────────────────

    /// Audit the hash chain of one subject.
    pub fn verify_subject(&self, subject: &str) -> Result<AuditReport> {
        let id = SubjectId::new(subject)?;
        Ok(Auditor::audit(&id, &self.history_records(subject)))
    }

    /// Audit every subject, sorted by subject.
    pub fn verify_all(&self) -> Vec<AuditReport> {
        self.slots()
            .into_iter()
            .filter(|(_, slot)| slot.len() > 0)
            .map(|(subject, slot)| Auditor::audit(&subject, &slot.all()))
            .collect()
    }

    // ── Snapshot & lifecycle ───────────────────────────────────────────

    /// `{subject -> latest sequence}` as of the last commit.
    pub fn index_snapshot(&self) -> Result<IndexSnapshot> {
        let index = self.summaries_through(self.last_sequence());
        IndexSnapshot::from_summaries(self.high_water(), &index)
    }

    /// Highest sequence handed out, with or without a visible record.
    fn high_water(&self) -> u64 {
        self.next_sequence().saturating_sub(1)
    }

    fn reconcile_snapshot(&self) {
        let Some(path) = &self.snapshot_path else {
            return;
        };
        let index = self.summaries_through(self.last_sequence());
        let through = self.high_water();

        match IndexSnapshot::load(path) {
            Some(snapshot) if snapshot.matches(through, &index) => {
                debug!(through, "index snapshot is current");
                return;
            }
            Some(snapshot) => warn!(
                snapshot_through = snapshot.through_sequence,
                log_through = through,
                "index snapshot is stale; rewriting"
            ),
            None => debug!("no usable index snapshot; writing one"),
        }

        let written = IndexSnapshot::from_summaries(through, &index).and_then(|s| s.save(path));
        if let Err(e) = written {
            warn!(error = %e, "failed to write index snapshot");
        }
    }

    /// Sync the log and persist the index snapshot.
    pub fn flush(&self) -> Result<()> {
        self.log.flush()?;
        if let Some(path) = &self.snapshot_path {
            self.index_snapshot()?.save(path)?;
        }
        Ok(())
    }

    /// Flush and refuse further commits. Idempotent.
    pub fn close(&self) -> Result<()> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        self.flush()?;
        info!(
            log = %self.log.describe(),
            records = self.total_records(),
            last_sequence = self.last_sequence(),
            "ledger store closed"
        );
        Ok(())
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    /// What replay found when the store was opened.
    pub fn recovery_report(&self) -> &RecoveryReport {
        &self.recovery
    }

    /// Where the record log lives.
    pub fn describe(&self) -> String {
        self.log.describe()
    }

    // ── Internals ──────────────────────────────────────────────────────

    fn slot(&self, subject: &str) -> Option<Arc<SubjectSlot>> {
        self.subjects
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(subject)
            .cloned()
    }

    fn slot_or_insert(&self, subject: &SubjectId) -> Arc<SubjectSlot> {
        if let Some(slot) = self.slot(subject.as_str()) {
            return slot;
        }
        let mut subjects = self.subjects.write().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(
            subjects
                .entry(subject.clone())
                .or_insert_with(|| Arc::new(SubjectSlot::new(Vec::new()))),
        )
    }

    /// Drop a slot a failed first commit created, unless someone else
    /// holds it (a commit waiting on its lock, or a history reader).
    fn release_unused_slot(&self, subject: &SubjectId, slot: Arc<SubjectSlot>) {
        let mut subjects = self.subjects.write().unwrap_or_else(PoisonError::into_inner);
        let registered = subjects
            .get(subject)
            .is_some_and(|current| Arc::ptr_eq(current, &slot));
        // The map and `slot` itself are the only owners.
        if registered && Arc::strong_count(&slot) == 2 && slot.len() == 0 {
            subjects.remove(subject);
            debug!(subject = %subject, "released empty subject slot after failed commit");
        }
    }

    fn slots(&self) -> Vec<(SubjectId, Arc<SubjectSlot>)> {
        let mut slots: Vec<_> = self
            .subjects
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(subject, slot)| (subject.clone(), Arc::clone(slot)))
            .collect();
        slots.sort_by(|a, b| a.0.cmp(&b.0));
        slots
    }

    fn hashes(&self) -> MutexGuard<'_, HashSet<RecordHash>> {
        self.hashes.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Drop for LedgerStore {
    fn drop(&mut self) {
        if !self.is_closed() {
            if let Err(e) = self.log.flush() {
                warn!(error = %e, "failed to flush record log on drop");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::thread;

    use proptest::prelude::*;
    use rand::Rng;

    use crate::audit::ViolationKind;
    use crate::config::RecoveryMode;

    use super::*;

    fn ts(secs: u64) -> Timestamp {
        Timestamp::from_unix_secs(1_700_000_000 + secs)
    }

    fn store() -> LedgerStore {
        LedgerStore::in_memory(StoreConfig::default())
    }

    #[test]
    fn grant_then_revoke() {
        let store = store();
        let first = store.commit("alice", true, ts(1)).unwrap();
        assert_eq!(first.sequence, 1);
        assert_eq!(first.prev_hash, None);
        assert!(store.current_status("alice"));
        assert_eq!(store.history_count("alice"), 1);

        let second = store.commit("alice", false, ts(2)).unwrap();
        assert_eq!(second.sequence, 2);
        assert_eq!(second.prev_hash, Some(first.record_hash));
        assert!(!store.current_status("alice"));
        assert_eq!(store.history_count("alice"), 2);
        assert_eq!(store.history_at("alice", 0), Some(first));
        assert_eq!(store.history_at("alice", 1), Some(second));
        assert_eq!(store.history_at("alice", 2), None);
        assert_eq!(store.latest_record("alice").map(|r| r.sequence), Some(2));
    }

    #[test]
    fn unknown_subject_reads_defaults() {
        let store = store();
        store.commit("alice", true, ts(1)).unwrap();
        assert!(!store.current_status("unknown"));
        assert_eq!(store.history_count("unknown"), 0);
        assert_eq!(store.history_at("unknown", 0), None);
        assert_eq!(store.history("unknown").count(), 0);
        assert!(!store.current_status(""));
    }

    #[test]
    fn unchanged_status_still_appends() {
        let store = store();
        let a = store.commit("alice", true, ts(1)).unwrap();
        let b = store.commit("alice", true, ts(1)).unwrap();
        assert_eq!(store.history_count("alice"), 2);
        assert_ne!(a.sequence, b.sequence);
        assert_ne!(a.record_hash, b.record_hash);
        assert!(store.current_status("alice"));
    }

    #[test]
    fn malformed_subject_is_rejected() {
        let store = store();
        let long = "x".repeat(257);
        for bad in ["", " alice", "alice\n", long.as_str()] {
            let err = store.commit(bad, true, ts(1)).unwrap_err();
            assert!(err.is_validation(), "{bad:?} accepted");
        }
        assert_eq!(store.total_records(), 0);
        assert_eq!(store.next_sequence(), 1);
        assert!(store.subjects().is_empty());
    }

    #[test]
    fn storage_failure_leaves_index_unchanged() {
        let log = Arc::new(MemoryRecordLog::new());
        let shared: Arc<dyn RecordLog> = log.clone();
        let store = LedgerStore::with_log(shared, StoreConfig::default()).unwrap();
        store.commit("alice", true, ts(1)).unwrap();

        log.fail_appends(true);
        let err = store.commit("alice", false, ts(2)).unwrap_err();
        assert!(err.is_storage());
        assert!(store.current_status("alice"));
        assert_eq!(store.history_count("alice"), 1);
        assert_eq!(store.total_records(), 1);
        assert_eq!(store.next_sequence(), 2);

        let err = store.commit("bob", true, ts(2)).unwrap_err();
        assert!(err.is_storage());
        assert!(store.subjects().iter().all(|s| s.as_str() != "bob"));
        assert!(store.slot("bob").is_none());

        log.fail_appends(false);
        let retried = store.commit("alice", false, ts(3)).unwrap();
        assert_eq!(retried.sequence, 2);
        assert_eq!(log.len(), 2);
    }

    #[test]
    fn failed_first_commits_leave_no_empty_slots() {
        let log = Arc::new(MemoryRecordLog::new());
        let shared: Arc<dyn RecordLog> = log.clone();
        let store = LedgerStore::with_log(shared, StoreConfig::default()).unwrap();
        log.fail_appends(true);

        for i in 0..50 {
            assert!(store.commit(&format!("subject-{i}"), true, ts(i)).is_err());
        }
        assert_eq!(store.subjects.read().unwrap().len(), 0);

        // A slot somebody else still holds is kept.
        let carol = SubjectId::new("carol").unwrap();
        let held = store.slot_or_insert(&carol);
        assert!(store.commit("carol", true, ts(1)).is_err());
        assert!(store.slot("carol").is_some());
        drop(held);
        assert!(store.commit("carol", true, ts(2)).is_err());
        assert!(store.slot("carol").is_none());

        log.fail_appends(false);
        assert_eq!(store.commit("carol", true, ts(3)).unwrap().sequence, 1);
        assert_eq!(store.subject_count(), 1);
    }

    #[test]
    fn held_subject_lock_times_out() {
        let config = StoreConfig {
            commit_timeout_ms: 20,
            ..StoreConfig::default()
        };
        let store = LedgerStore::in_memory(config);
        store.commit("alice", true, ts(1)).unwrap();

        let slot = store.slot("alice").unwrap();
        let held = slot.write.lock().unwrap();
        let err = store.commit("alice", false, ts(2)).unwrap_err();
        assert!(matches!(
            err,
            StoreError::Timeout {
                resource: "subject lock",
                ..
            }
        ));
        assert_eq!(store.history_count("alice"), 1);

        // Other subjects are not blocked.
        store.commit("bob", true, ts(3)).unwrap();
        drop(held);
        store.commit("alice", false, ts(4)).unwrap();
        assert_eq!(store.next_sequence(), 4);
    }

    #[test]
    fn concurrent_commits_to_one_subject_serialize() {
        let store = Arc::new(store());
        let handles: Vec<_> = (0..8u64)
            .map(|t| {
                let store = Arc::clone(&store);
                thread::spawn(move || {
                    for i in 0..50u64 {
                        store.commit("alice", (t + i) % 2 == 0, ts(i)).unwrap();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(store.history_count("alice"), 400);
        let history = store.history_records("alice");
        assert!(history.windows(2).all(|w| w[0].sequence < w[1].sequence));
        assert_eq!(store.current_status("alice"), history[399].status);
        assert!(store.verify_subject("alice").unwrap().is_valid());
    }

    #[test]
    fn concurrent_commits_across_subjects_share_one_sequence() {
        let store = Arc::new(store());
        let handles: Vec<_> = (0..8)
            .map(|t| {
                let store = Arc::clone(&store);
                thread::spawn(move || {
                    let subject = format!("subject-{t}");
                    for i in 0..50u64 {
                        store.commit(&subject, i % 3 != 0, ts(i)).unwrap();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let sequences: Vec<u64> = store.records_after(0).iter().map(|r| r.sequence).collect();
        assert_eq!(sequences, (1..=400).collect::<Vec<_>>());
        assert_eq!(store.subject_count(), 8);
        assert!(store.verify_all().iter().all(AuditReport::is_valid));
    }

    #[test]
    fn record_hashes_unique_over_many_commits() {
        let store = store();
        let mut rng = rand::thread_rng();
        for _ in 0..20_000 {
            let subject = format!("subject-{}", rng.gen_range(0..50));
            store.commit(&subject, rng.gen::<bool>(), ts(0)).unwrap();
        }
        let hashes: HashSet<RecordHash> = store
            .records_after(0)
            .iter()
            .map(|r| r.record_hash)
            .collect();
        assert_eq!(hashes.len(), 20_000);
    }

    #[test]
    fn records_after_is_ordered_and_exclusive() {
        let store = store();
        store.commit("alice", true, ts(1)).unwrap();
        store.commit("bob", true, ts(2)).unwrap();
        store.commit("alice", false, ts(3)).unwrap();

        let after: Vec<u64> = store.records_after(1).iter().map(|r| r.sequence).collect();
        assert_eq!(after, vec![2, 3]);
        assert!(store.records_after(3).is_empty());
    }

    #[test]
    fn history_iterator_restarts() {
        let store = store();
        store.commit("alice", true, ts(1)).unwrap();
        store.commit("alice", false, ts(2)).unwrap();

        let mut history = store.history("alice");
        store.commit("alice", true, ts(3)).unwrap();
        let statuses: Vec<bool> = history.by_ref().map(|r| r.status).collect();
        assert_eq!(statuses, vec![true, false]);

        history.restart();
        assert_eq!(history.len(), 3);
        assert_eq!(history.last().map(|r| r.sequence), Some(3));
    }

    #[test]
    fn closed_store_rejects_commits() {
        let store = store();
        store.commit("alice", true, ts(1)).unwrap();
        store.close().unwrap();
        store.close().unwrap();
        assert!(matches!(
            store.commit("alice", false, ts(2)),
            Err(StoreError::Closed)
        ));
        assert!(store.current_status("alice"));
    }

    #[test]
    fn reopen_restores_state() {
        let dir = tempfile::tempdir().unwrap();
        let (index, records) = {
            let store = LedgerStore::open(dir.path(), StoreConfig::default()).unwrap();
            store.commit("alice", true, ts(1)).unwrap();
            store.commit("bob", true, ts(2)).unwrap();
            store.commit("alice", false, ts(3)).unwrap();
            store.close().unwrap();
            (store.status_index(), store.records_after(0))
        };

        let reopened = LedgerStore::open(dir.path(), StoreConfig::default()).unwrap();
        assert_eq!(reopened.status_index(), index);
        assert_eq!(reopened.records_after(0), records);
        assert_eq!(reopened.next_sequence(), 4);
        assert!(reopened.recovery_report().is_clean());

        let next = reopened.commit("alice", true, ts(4)).unwrap();
        assert_eq!(next.sequence, 4);
        assert_eq!(next.prev_hash, Some(records[2].record_hash));
    }

    #[test]
    fn flush_writes_index_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        let store = LedgerStore::open(dir.path(), StoreConfig::default()).unwrap();
        store.commit("alice", true, ts(1)).unwrap();
        store.commit("bob", false, ts(2)).unwrap();
        store.flush().unwrap();

        let snapshot = IndexSnapshot::load(&dir.path().join(SNAPSHOT_FILE)).unwrap();
        assert_eq!(snapshot.through_sequence, 2);
        assert_eq!(snapshot.heads.len(), 2);
        assert!(snapshot.matches(2, &store.status_index()));
    }

    #[test]
    fn stale_snapshot_is_rewritten_on_open() {
        let dir = tempfile::tempdir().unwrap();
        {
            let store = LedgerStore::open(dir.path(), StoreConfig::default()).unwrap();
            store.commit("alice", true, ts(1)).unwrap();
            store.close().unwrap();
        }
        let path = dir.path().join(SNAPSHOT_FILE);
        IndexSnapshot::new(0, BTreeMap::new())
            .unwrap()
            .save(&path)
            .unwrap();

        let store = LedgerStore::open(dir.path(), StoreConfig::default()).unwrap();
        let snapshot = IndexSnapshot::load(&path).unwrap();
        assert!(snapshot.matches(store.last_sequence(), &store.status_index()));
    }

    #[test]
    fn corrupted_entry_fails_strict_open_and_is_reported_in_lenient() {
        let dir = tempfile::tempdir().unwrap();
        {
            let store = LedgerStore::open(dir.path(), StoreConfig::default()).unwrap();
            store.commit("alice", true, ts(1)).unwrap();
            store.commit("alice", false, ts(2)).unwrap();
            store.close().unwrap();
        }
        let log_path = dir.path().join(LOG_FILE);
        let mut bytes = fs::read(&log_path).unwrap();
        bytes[8] ^= 0xFF;
        fs::write(&log_path, bytes).unwrap();

        let err = LedgerStore::open(dir.path(), StoreConfig::default()).err().unwrap();
        assert!(matches!(err, StoreError::Corrupted { offset: 0, .. }));

        let lenient = StoreConfig {
            recovery: RecoveryMode::Lenient,
            ..StoreConfig::default()
        };
        let store = LedgerStore::open(dir.path(), lenient).unwrap();
        let report = store.recovery_report();
        assert_eq!(report.skipped_entries, 1);
        assert_eq!(report.unverified_records, 1);
        assert_eq!(store.next_sequence(), 3);

        let audit = store.verify_subject("alice").unwrap();
        assert!(!audit.is_valid());
        assert_eq!(audit.violations[0].kind, ViolationKind::HashMismatch);
    }

    fn lenient() -> StoreConfig {
        StoreConfig {
            recovery: RecoveryMode::Lenient,
            ..StoreConfig::default()
        }
    }

    #[test]
    fn damaged_length_fails_strict_open_and_keeps_every_record() {
        let dir = tempfile::tempdir().unwrap();
        {
            let store = LedgerStore::open(dir.path(), StoreConfig::default()).unwrap();
            store.commit("alice", true, ts(1)).unwrap();
            store.commit("bob", true, ts(2)).unwrap();
            store.commit("alice", false, ts(3)).unwrap();
            store.close().unwrap();
        }
        let log_path = dir.path().join(LOG_FILE);
        let original = fs::read(&log_path).unwrap();
        let mut damaged = original.clone();
        damaged[..4].copy_from_slice(&1000u32.to_le_bytes());
        fs::write(&log_path, &damaged).unwrap();

        let err = LedgerStore::open(dir.path(), StoreConfig::default()).err().unwrap();
        assert!(matches!(err, StoreError::Corrupted { offset: 0, .. }));
        assert_eq!(fs::read(&log_path).unwrap(), damaged);

        fs::write(&log_path, &original).unwrap();
        let store = LedgerStore::open(dir.path(), StoreConfig::default()).unwrap();
        assert_eq!(store.total_records(), 3);
        assert!(!store.current_status("alice"));
    }

    #[test]
    fn lenient_open_never_reuses_sequence_of_skipped_entry() {
        let dir = tempfile::tempdir().unwrap();
        {
            let store = LedgerStore::open(dir.path(), StoreConfig::default()).unwrap();
            store.commit("alice", true, ts(1)).unwrap();
            store.commit("bob", true, ts(2)).unwrap();
            store.close().unwrap();
        }
        // Without the snapshot, the skipped frame alone must hold the floor.
        fs::remove_file(dir.path().join(SNAPSHOT_FILE)).unwrap();
        let log_path = dir.path().join(LOG_FILE);
        let mut bytes = fs::read(&log_path).unwrap();
        let last = bytes.len() - 1;
        bytes[last] ^= 0xFF;
        fs::write(&log_path, bytes).unwrap();

        let store = LedgerStore::open(dir.path(), lenient()).unwrap();
        assert_eq!(store.recovery_report().skipped_entries, 1);
        assert_eq!(store.history_count("bob"), 0);
        let carol = store.commit("carol", true, ts(3)).unwrap();
        assert_eq!(carol.sequence, 3);
    }

    #[test]
    fn snapshot_high_water_outlives_lost_log_entries() {
        let dir = tempfile::tempdir().unwrap();
        let alice_end = {
            let store = LedgerStore::open(dir.path(), StoreConfig::default()).unwrap();
            store.commit("alice", true, ts(1)).unwrap();
            let alice_end = fs::metadata(dir.path().join(LOG_FILE)).unwrap().len();
            store.commit("bob", true, ts(2)).unwrap();
            store.close().unwrap();
            alice_end
        };
        let file = fs::OpenOptions::new()
            .write(true)
            .open(dir.path().join(LOG_FILE))
            .unwrap();
        file.set_len(alice_end).unwrap();
        drop(file);

        let store = LedgerStore::open(dir.path(), StoreConfig::default()).unwrap();
        assert_eq!(store.last_sequence(), 1);
        assert_eq!(store.next_sequence(), 3);
        assert_eq!(store.commit("carol", true, ts(3)).unwrap().sequence, 3);
        store.close().unwrap();

        let snapshot = IndexSnapshot::load(&dir.path().join(SNAPSHOT_FILE)).unwrap();
        assert_eq!(snapshot.through_sequence, 3);
    }

    const SUBJECTS: [&str; 4] = ["alice", "bob", "carol", "dave"];

    fn apply_ops(store: &LedgerStore, ops: &[(usize, bool)]) {
        for (i, (subject, status)) in ops.iter().enumerate() {
            store.commit(SUBJECTS[*subject], *status, ts(i as u64)).unwrap();
        }
    }

    proptest! {
        #[test]
        fn status_is_last_write_and_count_is_writes(
            ops in prop::collection::vec((0..SUBJECTS.len(), any::<bool>()), 0..60)
        ) {
            let store = store();
            apply_ops(&store, &ops);

            for (index, subject) in SUBJECTS.iter().enumerate() {
                let writes: Vec<bool> = ops
                    .iter()
                    .filter(|(s, _)| *s == index)
                    .map(|(_, status)| *status)
                    .collect();
                prop_assert_eq!(store.history_count(subject), writes.len() as u64);
                prop_assert_eq!(store.current_status(subject), writes.last().copied().unwrap_or(false));
            }
            prop_assert_eq!(store.last_sequence(), ops.len() as u64);
        }

        #[test]
        fn replaying_the_log_rebuilds_the_same_state(
            ops in prop::collection::vec((0..SUBJECTS.len(), any::<bool>()), 0..60)
        ) {
            let log: Arc<dyn RecordLog> = Arc::new(MemoryRecordLog::new());
            let store = LedgerStore::with_log(Arc::clone(&log), StoreConfig::default()).unwrap();
            apply_ops(&store, &ops);

            let rebuilt = LedgerStore::with_log(log, StoreConfig::default()).unwrap();
            prop_assert_eq!(rebuilt.status_index(), store.status_index());
            prop_assert_eq!(rebuilt.records_after(0), store.records_after(0));
            prop_assert_eq!(rebuilt.next_sequence(), store.next_sequence());
        }
    }
}

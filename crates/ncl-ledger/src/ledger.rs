use std::path::Path;
use std::sync::Arc;

use tracing::{debug, info, warn};

use ncl_bus::{BusConfig, EventBus, EventFilter, Subscription};
use ncl_store::{AuditReport, History, LedgerStore, StoreConfig};
use ncl_types::{ConsentRecord, ConsentUpdated, Timestamp};

use crate::error::Result;
use crate::receipt::CommitReceipt;
use crate::status::{LedgerState, LedgerStatus};

/// The consent ledger: durable consent state plus change notifications.
///
/// Every successful [`ConsentLedger::set_consent`] is durable before it is
/// announced. Announcement problems (a full subscriber queue, a closed bus)
/// are logged and never turn a durable commit into an error.
pub struct ConsentLedger {
    name: String,
    store: Arc<LedgerStore>,
    bus: EventBus,
}

impl ConsentLedger {
    pub const DEFAULT_NAME: &'static str = "neuroguard-consent-ledger";

    /// Wrap an open store. The bus expects the store's next sequence.
    pub fn new(store: Arc<LedgerStore>, bus_config: BusConfig) -> Result<Self> {
        let bus = EventBus::new(bus_config, store.next_sequence())?;
        Ok(Self {
            name: Self::DEFAULT_NAME.to_string(),
            store,
            bus,
        })
    }

    /// Open a file-backed ledger in `dir`.
    pub fn open(dir: impl AsRef<Path>, store_config: StoreConfig, bus_config: BusConfig) -> Result<Self> {
        let store = LedgerStore::open(dir, store_config)?;
        let ledger = Self::new(Arc::new(store), bus_config)?;
        info!(
            name = %ledger.name,
            log = %ledger.store.describe(),
            last_sequence = ledger.store.last_sequence(),
            "consent ledger opened"
        );
        Ok(ledger)
    }

    /// A non-durable ledger.
    pub fn in_memory(bus_config: BusConfig) -> Result<Self> {
        Self::new(Arc::new(LedgerStore::in_memory(StoreConfig::default())), bus_config)
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    // ---- Writes ----

    /// Record `status` for `subject` at the current time.
    pub fn set_consent(&self, subject: &str, status: bool) -> Result<CommitReceipt> {
        self.set_consent_at(subject, status, Timestamp::now())
    }

    /// Record `status` for `subject` at a caller-supplied time.
    pub fn set_consent_at(
        &self,
        subject: &str,
        status: bool,
        timestamp: Timestamp,
    ) -> Result<CommitReceipt> {
        let record = self.store.commit(subject, status, timestamp)?;
        self.announce(&record);
        Ok(CommitReceipt::from(&record))
    }

    fn announce(&self, record: &ConsentRecord) {
        match self.bus.publish(ConsentUpdated::from(record)) {
            Ok(report) => debug!(
                sequence = record.sequence,
                delivered = report.delivered,
                held = report.held,
                "consent update announced"
            ),
            Err(e) => warn!(
                sequence = record.sequence,
                subject = %record.subject,
                error = %e,
                "consent update not announced"
            ),
        }
    }

    // ---- Reads ----

    /// Current status; `false` for unknown subjects.
    pub fn get_status(&self, subject: &str) -> bool {
        self.store.current_status(subject)
    }

    pub fn get_history_count(&self, subject: &str) -> u64 {
        self.store.history_count(subject)
    }

    /// Lazy, restartable iterator over the subject's records.
    pub fn get_history(&self, subject: &str) -> History {
        self.store.history(subject)
    }

    pub fn history_at(&self, subject: &str, index: u64) -> Option<ConsentRecord> {
        self.store.history_at(subject, index)
    }

    pub fn latest(&self, subject: &str) -> Option<ConsentRecord> {
        self.store.latest_record(subject)
    }

    // ---- Notifications ----

    /// Live updates from now on.
    pub fn subscribe(&self, filter: EventFilter) -> Result<Subscription> {
        Ok(self.bus.subscribe(filter)?)
    }

    /// Every update after `after_sequence`: the committed backlog first,
    /// then live updates, without gaps or duplicates.
    pub fn subscribe_from(&self, after_sequence: u64, filter: EventFilter) -> Result<Subscription> {
        let filter = filter.after(after_sequence);
        // Register before reading the backlog so nothing falls in between.
        let live = self.bus.subscribe(filter.clone())?;
        let backlog: Vec<ConsentUpdated> = self
            .store
            .records_after(after_sequence)
            .iter()
            .map(ConsentUpdated::from)
            .filter(|event| filter.matches(event))
            .collect();
        debug!(after_sequence, backlog = backlog.len(), "subscription restarted");
        Ok(live.with_backlog(backlog))
    }

    // ---- Audit & status ----

    /// Audit one subject's hash chain.
    pub fn verify(&self, subject: &str) -> Result<AuditReport> {
        Ok(self.store.verify_subject(subject)?)
    }

    pub fn verify_all(&self) -> Vec<AuditReport> {
        self.store.verify_all()
    }

    pub fn status(&self) -> LedgerStatus {
        let state = if self.store.is_closed() || self.bus.is_closed() {
            LedgerState::Offline
        } else {
            LedgerState::Operational
        };
        LedgerStatus {
            name: self.name.clone(),
            state,
            last_sequence: self.store.last_sequence(),
            total_consents_recorded: self.store.total_records(),
            subjects: self.store.subject_count() as u64,
            dropped_events: self.bus.dropped_events(),
        }
    }

    /// Flush and close the store, then close the bus. Subscribers drain
    /// what they have and then see the end of their stream.
    pub fn close(&self) -> Result<()> {
        let closed = self.store.close();
        self.bus.close();
        closed?;
        info!(name = %self.name, "consent ledger closed");
        Ok(())
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn store(&self) -> &Arc<LedgerStore> {
        &self.store
    }

    pub fn bus(&self) -> &EventBus {
        &self.bus
    }
}

#[cfg(test)]
mod tests {
    use std::thread;

    use ncl_store::{MemoryRecordLog, RecordLog};
    use ncl_types::SubjectId;

    use crate::error::LedgerError;

    use super::*;

    fn ledger() -> ConsentLedger {
        ConsentLedger::in_memory(BusConfig::default()).unwrap()
    }

    fn ts(secs: u64) -> Timestamp {
        Timestamp::from_unix_secs(1_700_000_000 + secs)
    }

    fn drain(sub: &mut Subscription) -> Vec<u64> {
        std::iter::from_fn(|| sub.try_recv().ok())
            .map(|e| e.sequence)
            .collect()
    }

    #[test]
    fn alice_grants_then_revokes() {
        let ledger = ledger();
        let granted = ledger.set_consent("alice", true).unwrap();
        assert!(ledger.get_status("alice"));
        assert_eq!(ledger.get_history_count("alice"), 1);

        let revoked = ledger.set_consent("alice", false).unwrap();
        assert!(!ledger.get_status("alice"));
        assert_eq!(ledger.get_history_count("alice"), 2);
        assert!(revoked.sequence > granted.sequence);

        let history: Vec<ConsentRecord> = ledger.get_history("alice").collect();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].record_hash, granted.record_hash);
        assert_eq!(history[1].record_hash, revoked.record_hash);
        assert_eq!(history[1].prev_hash, Some(granted.record_hash));
    }

    #[test]
    fn unknown_subject_is_not_an_error() {
        let ledger = ledger();
        assert!(!ledger.get_status("nobody"));
        assert_eq!(ledger.get_history_count("nobody"), 0);
        assert_eq!(ledger.get_history("nobody").count(), 0);
    }

    #[test]
    fn repeated_grant_is_recorded_twice() {
        let ledger = ledger();
        ledger.set_consent("alice", true).unwrap();
        ledger.set_consent("alice", true).unwrap();
        assert_eq!(ledger.get_history_count("alice"), 2);
        assert!(ledger.get_history("alice").all(|r| r.status));
    }

    #[test]
    fn receipt_matches_stored_record() {
        let ledger = ledger();
        let receipt = ledger.set_consent_at("alice", true, ts(5)).unwrap();
        let record = ledger.history_at("alice", 0).unwrap();
        assert_eq!(receipt.sequence, record.sequence);
        assert_eq!(receipt.record_hash, record.record_hash);
        assert_eq!(receipt.timestamp, ts(5));
    }

    #[test]
    fn malformed_subject_is_a_validation_error() {
        let ledger = ledger();
        let mut sub = ledger.subscribe(EventFilter::all()).unwrap();
        let err = ledger.set_consent("", true).unwrap_err();
        assert!(matches!(err, LedgerError::Validation(_)));
        assert!(drain(&mut sub).is_empty());
        assert_eq!(ledger.status().total_consents_recorded, 0);
    }

    #[test]
    fn failed_commit_is_not_announced() {
        let log = Arc::new(MemoryRecordLog::new());
        let shared: Arc<dyn RecordLog> = log.clone();
        let store = LedgerStore::with_log(shared, StoreConfig::default()).unwrap();
        let ledger = ConsentLedger::new(Arc::new(store), BusConfig::default()).unwrap();
        let mut sub = ledger.subscribe(EventFilter::all()).unwrap();

        ledger.set_consent("alice", true).unwrap();
        log.fail_appends(true);
        let err = ledger.set_consent("alice", false).unwrap_err();
        assert!(err.is_storage());
        assert!(ledger.get_status("alice"));

        log.fail_appends(false);
        ledger.set_consent("alice", false).unwrap();
        assert_eq!(drain(&mut sub), vec![1, 2]);
    }

    #[tokio::test]
    async fn subscriber_sees_committed_update() {
        let ledger = ledger();
        let alice = SubjectId::new("alice").unwrap();
        let mut sub = ledger.subscribe(EventFilter::subject(alice.clone())).unwrap();

        ledger.set_consent("bob", true).unwrap();
        let receipt = ledger.set_consent("alice", true).unwrap();

        let event = sub.recv().await.unwrap();
        assert_eq!(event.subject, alice);
        assert!(event.status);
        assert_eq!(event.sequence, receipt.sequence);
        assert_eq!(event.record_hash, receipt.record_hash);
        // Visible to readers by the time it is announced.
        assert!(ledger.get_status("alice"));
    }

    #[test]
    fn subscribe_from_backfills_then_continues() {
        let ledger = ledger();
        for i in 0..4 {
            ledger.set_consent_at("alice", i % 2 == 0, ts(i)).unwrap();
        }
        let mut sub = ledger.subscribe_from(2, EventFilter::all()).unwrap();
        ledger.set_consent_at("bob", true, ts(9)).unwrap();
        assert_eq!(drain(&mut sub), vec![3, 4, 5]);
    }

    #[test]
    fn concurrent_writers_are_announced_in_order() {
        let ledger = Arc::new(
            ConsentLedger::in_memory(BusConfig {
                capacity: 1024,
                reorder_window: 1024,
            })
            .unwrap(),
        );
        let mut sub = ledger.subscribe(EventFilter::all()).unwrap();

        let handles: Vec<_> = (0..8)
            .map(|t| {
                let ledger = Arc::clone(&ledger);
                thread::spawn(move || {
                    for i in 0..50 {
                        ledger.set_consent(&format!("subject-{t}"), i % 2 == 0).unwrap();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(drain(&mut sub), (1..=400).collect::<Vec<_>>());
        assert_eq!(ledger.status().last_sequence, 400);
    }

    #[test]
    fn status_reports_real_counts() {
        let ledger = ledger().with_name("test-ledger");
        ledger.set_consent("alice", true).unwrap();
        ledger.set_consent("bob", true).unwrap();
        ledger.set_consent("alice", false).unwrap();

        let status = ledger.status();
        assert_eq!(status.name, "test-ledger");
        assert_eq!(status.state, LedgerState::Operational);
        assert_eq!(status.last_sequence, 3);
        assert_eq!(status.total_consents_recorded, 3);
        assert_eq!(status.subjects, 2);
        assert_eq!(status.dropped_events, 0);
    }

    #[tokio::test]
    async fn close_takes_ledger_offline() {
        let ledger = ledger();
        let mut sub = ledger.subscribe(EventFilter::all()).unwrap();
        ledger.set_consent("alice", true).unwrap();
        ledger.close().unwrap();

        assert_eq!(ledger.status().state, LedgerState::Offline);
        assert!(ledger.set_consent("alice", false).unwrap_err().is_storage());
        assert!(ledger.get_status("alice"));
        assert_eq!(sub.recv().await.map(|e| e.sequence), Some(1));
        assert_eq!(sub.recv().await, None);
    }

    #[test]
    fn reopened_ledger_keeps_history_and_verifies() {
        let dir = tempfile::tempdir().unwrap();
        {
            let ledger =
                ConsentLedger::open(dir.path(), StoreConfig::default(), BusConfig::default()).unwrap();
            ledger.set_consent_at("alice", true, ts(1)).unwrap();
            ledger.set_consent_at("alice", false, ts(2)).unwrap();
            ledger.close().unwrap();
        }

        let ledger =
            ConsentLedger::open(dir.path(), StoreConfig::default(), BusConfig::default()).unwrap();
        assert!(!ledger.get_status("alice"));
        assert_eq!(ledger.get_history_count("alice"), 2);
        assert!(ledger.verify("alice").unwrap().is_valid());
        assert!(ledger.verify_all().iter().all(AuditReport::is_valid));

        let mut sub = ledger.subscribe(EventFilter::all()).unwrap();
        let receipt = ledger.set_consent_at("alice", true, ts(3)).unwrap();
        assert_eq!(receipt.sequence, 3);
        assert_eq!(drain(&mut sub), vec![3]);
    }
}

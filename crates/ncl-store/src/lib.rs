//! Ledger store for the NeuroGuard Consent Ledger (NCL).
//!
//! This crate owns all consent state. It provides:
//! - A framed, CRC-checked append-only record log ([`FileRecordLog`]) and an
//!   in-memory log for tests and embedding ([`MemoryRecordLog`])
//! - [`LedgerStore`]: atomic commits with per-subject serialization and a
//!   single global sequence
//! - Current-status and history queries that never take a write lock
//! - Deterministic replay of the log into the in-memory index
//! - Hash-chain audit reports and a cached index snapshot

pub mod audit;
pub mod config;
pub mod error;
pub mod history;
pub mod memory;
pub mod replay;
pub mod snapshot;
pub mod store;
pub mod traits;
pub mod wal;

mod lock;

pub use audit::{AuditReport, Auditor, Violation, ViolationKind};
pub use config::{RecoveryMode, StoreConfig, SyncMode};
pub use error::{Result, StoreError};
pub use history::History;
pub use memory::MemoryRecordLog;
pub use replay::{Rebuilt, Replayer, SubjectSummary};
pub use snapshot::IndexSnapshot;
pub use store::{LedgerStore, RecoveryReport, LOG_FILE, SNAPSHOT_FILE};
pub use traits::{LogEntry, Recovery, RecordLog, SkippedEntry};
pub use wal::FileRecordLog;

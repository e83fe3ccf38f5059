//! Consent ledger façade for the NeuroGuard Consent Ledger (NCL).
//!
//! [`ConsentLedger`] is the entry point for applications: it commits
//! consent changes through the store, announces them on the event bus once
//! they are durable, and answers status and history queries. [`ConsentGate`]
//! is the check a data pipeline runs before touching a subject's data.

pub mod error;
pub mod gate;
pub mod ledger;
pub mod receipt;
pub mod status;

pub use error::{LedgerError, Result};
pub use gate::{Admission, ConsentGate};
pub use ledger::ConsentLedger;
pub use receipt::CommitReceipt;
pub use status::{LedgerState, LedgerStatus};

// Re-export key types
pub use ncl_bus::{BusConfig, EventFilter, Subscription, TryRecvError};
pub use ncl_crypto::{ChainError, HashChainVerifier};
pub use ncl_store::{AuditReport, History, RecoveryMode, StoreConfig, SyncMode, Violation, ViolationKind};
pub use ncl_types::{ConsentRecord, ConsentUpdated, RecordHash, SubjectId, Timestamp};

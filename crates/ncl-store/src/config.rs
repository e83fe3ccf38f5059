use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Flush/sync strategy for the record log.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncMode {
    /// `fsync` after every append (safest, highest latency).
    EveryWrite,
    /// `fsync` at most once per interval; `flush` syncs the remainder.
    Periodic { interval_ms: u64 },
    /// Rely on OS page-cache buffering (fastest, least durable).
    OsDefault,
}

impl Default for SyncMode {
    fn default() -> Self {
        Self::EveryWrite
    }
}

/// How the store treats damaged log content at startup.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecoveryMode {
    /// Refuse to open a log with corrupt entries or broken invariants.
    /// A torn final entry is still truncated.
    #[default]
    Strict,
    /// Skip entries that cannot be decoded and load the rest, logging
    /// every skipped entry. Hash mismatches are loaded and left for audit.
    Lenient,
}

/// Configuration for the [`LedgerStore`](crate::LedgerStore).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub sync_mode: SyncMode,
    /// Upper bound on how long a commit may wait for the subject lock and
    /// the log writer before failing with a storage error.
    pub commit_timeout_ms: u64,
    pub recovery: RecoveryMode,
    /// Persist the `{subject -> latest sequence}` snapshot on flush.
    pub persist_index_snapshot: bool,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            sync_mode: SyncMode::default(),
            commit_timeout_ms: 5_000,
            recovery: RecoveryMode::default(),
            persist_index_snapshot: true,
        }
    }
}

impl StoreConfig {
    pub fn commit_timeout(&self) -> Duration {
        Duration::from_millis(self.commit_timeout_ms)
    }
}

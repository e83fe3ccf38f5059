use std::io;

use ncl_types::TypeError;

/// Errors produced by the ledger store.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The subject identifier is malformed. Caller error; not retried.
    #[error("invalid subject: {0}")]
    Validation(#[from] TypeError),

    /// I/O error while appending to or reading the record log.
    #[error("io error: {0}")]
    Io(#[from] io::Error),

    /// Log entry could not be encoded or decoded.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// The commit could not reach the durable append in time.
    #[error("commit timed out after {waited_ms}ms waiting for the {resource}")]
    Timeout {
        resource: &'static str,
        waited_ms: u64,
    },

    /// The persisted log is damaged at a byte offset.
    #[error("log corrupted at offset {offset}: {reason}")]
    Corrupted { offset: u64, reason: String },

    /// A replayed record breaks a ledger invariant.
    #[error("integrity violation at sequence {sequence}: {reason}")]
    IntegrityViolation { sequence: u64, reason: String },

    #[error("record hash collision at sequence {sequence}")]
    HashCollision { sequence: u64 },

    #[error("{0} lock poisoned")]
    Poisoned(&'static str),

    #[error("store is closed")]
    Closed,
}

impl StoreError {
    /// `true` for caller errors (malformed input).
    pub fn is_validation(&self) -> bool {
        matches!(self, Self::Validation(_))
    }

    /// `true` for everything that is not a caller error: the append did not
    /// complete and the index is unchanged.
    pub fn is_storage(&self) -> bool {
        !self.is_validation()
    }
}

impl From<bincode::Error> for StoreError {
    fn from(e: bincode::Error) -> Self {
        Self::Serialization(e.to_string())
    }
}

/// Convenience alias used throughout the store crate.
pub type Result<T> = std::result::Result<T, StoreError>;

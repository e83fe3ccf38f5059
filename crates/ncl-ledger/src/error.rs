use ncl_bus::BusError;
use ncl_store::StoreError;
use ncl_types::TypeError;

/// Errors returned by the consent ledger.
#[derive(Debug, thiserror::Error)]
pub enum LedgerError {
    /// Malformed subject identifier. Not retried automatically.
    #[error("validation error: {0}")]
    Validation(#[from] TypeError),

    /// The commit did not become durable; nothing was recorded.
    #[error("storage error: {0}")]
    Storage(StoreError),

    /// The event bus refused a subscription or could not be built.
    #[error("event bus error: {0}")]
    Bus(#[from] BusError),
}

impl LedgerError {
    pub fn is_validation(&self) -> bool {
        matches!(self, Self::Validation(_))
    }

    pub fn is_storage(&self) -> bool {
        matches!(self, Self::Storage(_))
    }
}

impl From<StoreError> for LedgerError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::Validation(e) => Self::Validation(e),
            other => Self::Storage(other),
        }
    }
}

pub type Result<T> = std::result::Result<T, LedgerError>;

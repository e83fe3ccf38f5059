use serde::Serialize;

/// Whether the ledger accepts writes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum LedgerState {
    Operational,
    Offline,
}

impl std::fmt::Display for LedgerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Operational => write!(f, "Operational"),
            Self::Offline => write!(f, "Offline"),
        }
    }
}

/// Point-in-time summary of the ledger.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct LedgerStatus {
    pub name: String,
    pub state: LedgerState,
    /// Sequence of the most recent commit (0 if none).
    pub last_sequence: u64,
    pub total_consents_recorded: u64,
    pub subjects: u64,
    /// Events lost to full subscriber queues.
    pub dropped_events: u64,
}

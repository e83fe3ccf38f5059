/// Errors produced by the event bus.
#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum BusError {
    #[error("invalid bus configuration: {0}")]
    InvalidConfig(String),

    #[error("event bus is closed")]
    Closed,
}

/// Why [`Subscription::try_recv`](crate::Subscription::try_recv) returned
/// nothing.
#[derive(Debug, Clone, Copy, thiserror::Error, PartialEq, Eq)]
pub enum TryRecvError {
    #[error("no event ready")]
    Empty,

    #[error("subscription closed")]
    Closed,
}

pub type Result<T> = std::result::Result<T, BusError>;

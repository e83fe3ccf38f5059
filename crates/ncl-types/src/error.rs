use thiserror::Error;

/// Errors produced by type operations.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TypeError {
    #[error("subject identifier is empty")]
    EmptySubject,

    #[error("subject identifier too long: {len} bytes (max {max})")]
    SubjectTooLong { len: usize, max: usize },

    #[error("subject identifier is not valid UTF-8")]
    SubjectNotUtf8,

    #[error("subject identifier contains a control character at byte {position}")]
    SubjectControlChar { position: usize },

    #[error("subject identifier has leading or trailing whitespace")]
    SubjectWhitespace,

    #[error("invalid hex string: {0}")]
    InvalidHex(String),

    #[error("invalid byte length: expected {expected}, got {actual}")]
    InvalidLength { expected: usize, actual: usize },
}

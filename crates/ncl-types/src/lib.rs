//! Foundation types for the NeuroGuard Consent Ledger (NCL).
//!
//! Every other NCL crate depends on `ncl-types`.
//!
//! # Key Types
//!
//! - [`SubjectId`]: Validated key of a consent-bearing entity
//! - [`RecordHash`]: 32-byte BLAKE3 digest identifying a committed record
//! - [`Timestamp`]: Unix-seconds commit time
//! - [`ConsentRecord`]: Immutable entry of a subject's consent history
//! - [`ConsentUpdated`]: Change notification derived from a committed record

pub mod error;
pub mod event;
pub mod hash;
pub mod record;
pub mod subject;
pub mod temporal;

pub use error::TypeError;
pub use event::ConsentUpdated;
pub use hash::RecordHash;
pub use record::ConsentRecord;
pub use subject::{SubjectId, MAX_SUBJECT_LEN};
pub use temporal::Timestamp;

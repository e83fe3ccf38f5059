//! Cryptographic primitives for the NeuroGuard Consent Ledger.
//!
//! Provides domain-separated BLAKE3 hashing of consent records and
//! verification of per-subject hash chains.
//!
//! All crypto operations wrap established libraries; there is no custom cryptography.

pub mod chain;
pub mod hasher;

pub use chain::{ChainError, ChainLink, HashChainVerifier};
pub use hasher::{ContentHasher, HasherError, RecordHasher};

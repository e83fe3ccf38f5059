use std::borrow::Borrow;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::TypeError;

/// Maximum encoded length of a subject identifier, in bytes.
pub const MAX_SUBJECT_LEN: usize = 256;

/// Identity of a consent-bearing entity (a data owner or their proxy).
///
/// A `SubjectId` is opaque to the ledger: it is only compared, hashed, and
/// persisted. Construction validates it, so every `SubjectId` in the system
/// is well-formed:
///
/// - non-empty and at most [`MAX_SUBJECT_LEN`] bytes
/// - valid UTF-8 without control characters
/// - no leading or trailing whitespace
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct SubjectId(String);

impl SubjectId {
    /// Validate and wrap a subject identifier.
    pub fn new(value: impl Into<String>) -> Result<Self, TypeError> {
        let value = value.into();
        Self::validate(&value)?;
        Ok(Self(value))
    }

    /// Parse a subject from its persisted byte form.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, TypeError> {
        let s = std::str::from_utf8(bytes).map_err(|_| TypeError::SubjectNotUtf8)?;
        Self::new(s)
    }

    /// Check the well-formedness rules without allocating.
    pub fn validate(value: &str) -> Result<(), TypeError> {
        if value.is_empty() {
            return Err(TypeError::EmptySubject);
        }
        if value.len() > MAX_SUBJECT_LEN {
            return Err(TypeError::SubjectTooLong {
                len: value.len(),
                max: MAX_SUBJECT_LEN,
            });
        }
        if let Some((position, _)) = value.char_indices().find(|(_, c)| c.is_control()) {
            return Err(TypeError::SubjectControlChar { position });
        }
        if value.trim() != value {
            return Err(TypeError::SubjectWhitespace);
        }
        Ok(())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn as_bytes(&self) -> &[u8] {
        self.0.as_bytes()
    }
}

impl TryFrom<String> for SubjectId {
    type Error = TypeError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl TryFrom<&str> for SubjectId {
    type Error = TypeError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<SubjectId> for String {
    fn from(id: SubjectId) -> Self {
        id.0
    }
}

impl AsRef<str> for SubjectId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl Borrow<str> for SubjectId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for SubjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SubjectId({:?})", self.0)
    }
}

impl fmt::Display for SubjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

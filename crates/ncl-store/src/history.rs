use std::sync::Arc;

use ncl_types::ConsentRecord;

use crate::store::SubjectSlot;

/// Lazy iterator over one subject's records in commit order.
///
/// The bound is fixed when the iterator is created (or restarted), so
/// records committed during iteration are not observed until
/// [`History::restart`]. Each step takes the subject's read lock only long
/// enough to clone one record.
pub struct History {
    slot: Option<Arc<SubjectSlot>>,
    position: usize,
    end: usize,
}

impl History {
    pub(crate) fn new(slot: Option<Arc<SubjectSlot>>) -> Self {
        let end = slot.as_ref().map_or(0, |s| s.len());
        Self {
            slot,
            position: 0,
            end,
        }
    }

    /// Rewind to the first record and pick up records committed since.
    pub fn restart(&mut self) {
        self.position = 0;
        self.end = self.slot.as_ref().map_or(0, |s| s.len());
    }

    /// Records left before the bound.
    pub fn remaining(&self) -> usize {
        self.end - self.position
    }
}

impl Iterator for History {
    type Item = ConsentRecord;

    fn next(&mut self) -> Option<ConsentRecord> {
        if self.position >= self.end {
            return None;
        }
        let record = self.slot.as_ref()?.get(self.position)?;
        self.position += 1;
        Some(record)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.remaining();
        (remaining, Some(remaining))
    }
}

impl ExactSizeIterator for History {}

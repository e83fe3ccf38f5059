use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use std::time::Instant;

use tracing::debug;

use ncl_types::ConsentRecord;

use crate::error::{Result, StoreError};
use crate::lock::lock_until;
use crate::traits::{decode_entry, encode_entry, ApplyFn, Recovery, RecordLog, SealFn};

/// In-memory record log for tests, local demos, and embedding.
///
/// Entries are kept bincode-encoded, so replay goes through the same decode
/// path as the file log. [`MemoryRecordLog::fail_appends`] simulates a
/// storage device that rejects writes.
pub struct MemoryRecordLog {
    inner: Mutex<MemoryState>,
    failing: AtomicBool,
}

struct MemoryState {
    frames: Vec<Vec<u8>>,
    next_sequence: u64,
}

impl MemoryRecordLog {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(MemoryState {
                frames: Vec::new(),
                next_sequence: 1,
            }),
            failing: AtomicBool::new(false),
        }
    }

    /// Make every subsequent append fail (or succeed again) with an I/O error.
    pub fn fail_appends(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Number of persisted entries.
    pub fn len(&self) -> usize {
        self.inner
            .lock()
            .map(|s| s.frames.len())
            .unwrap_or_else(|poisoned| poisoned.into_inner().frames.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for MemoryRecordLog {
    fn default() -> Self {
        Self::new()
    }
}

impl RecordLog for MemoryRecordLog {
    fn append(
        &self,
        deadline: Instant,
        seal: &mut SealFn<'_>,
        apply: &mut ApplyFn<'_>,
    ) -> Result<ConsentRecord> {
        let mut state = lock_until(&self.inner, deadline, "log writer")?;
        let sequence = state.next_sequence;
        let record = seal(sequence)?;
        let frame = encode_entry(&record)?;

        if self.failing.load(Ordering::SeqCst) {
            return Err(StoreError::Io(std::io::Error::new(
                std::io::ErrorKind::Other,
                "simulated storage failure",
            )));
        }

        state.frames.push(frame);
        state.next_sequence = sequence + 1;
        apply(&record);
        debug!(sequence, "memory log append");
        Ok(record)
    }

    fn replay(&self) -> Result<Recovery> {
        let state = self
            .inner
            .lock()
            .map_err(|_| StoreError::Poisoned("log writer"))?;
        let entries = state
            .frames
            .iter()
            .map(|frame| decode_entry(frame))
            .collect::<Result<Vec<_>>>()?;
        Ok(Recovery {
            entries,
            ..Recovery::default()
        })
    }

    fn next_sequence(&self) -> u64 {
        self.inner
            .lock()
            .map(|s| s.next_sequence)
            .unwrap_or_else(|poisoned| poisoned.into_inner().next_sequence)
    }

    fn flush(&self) -> Result<()> {
        Ok(())
    }

    fn describe(&self) -> String {
        "memory".into()
    }
}

use std::ffi::OsString;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use ncl_types::ConsentRecord;

use crate::config::{RecoveryMode, SyncMode};
use crate::error::{Result, StoreError};
use crate::lock::lock_until;
use crate::traits::{
    decode_entry, encode_entry, ApplyFn, Recovery, RecordLog, SealFn, SkippedEntry,
};

/// Header size: 4 bytes length + 4 bytes CRC.
const HEADER_SIZE: usize = 8;

/// Entries are a few hundred bytes; anything larger is a damaged header.
const MAX_ENTRY_LEN: u32 = 64 * 1024;

/// Smallest possible frame: header plus an entry with a one-byte subject
/// (sequence 8, subject length 8 + 1, status 1, timestamp 8, hash 32).
const MIN_FRAME_LEN: u64 = HEADER_SIZE as u64 + 58;

/// Internal mutable state of the log writer.
struct LogWriter {
    file: File,
    /// Current end of the valid log, in bytes.
    offset: u64,
    next_sequence: u64,
    last_sync: Instant,
    /// Appended bytes not yet fsynced.
    dirty: bool,
}

/// Crash-recoverable, append-only consent record log.
///
/// On-disk format, one frame per commit:
/// ```text
/// [4 bytes: entry length (little-endian u32)]
/// [4 bytes: CRC32 of payload (little-endian u32)]
/// [N bytes: payload (bincode-serialized LogEntry)]
/// ```
///
/// Opening the log scans it front-to-back. An incomplete final frame (a
/// torn write from a crash) is cut away; a frame only counts as torn when
/// no readable frame follows it. Any other damage is fatal in
/// [`RecoveryMode::Strict`]. [`RecoveryMode::Lenient`] skips to the next
/// readable frame, and when there is none it moves the unreadable rest of
/// the file to a `.discarded-<offset>` side file before cutting it.
///
/// Sequences of skipped frames past the last readable entry stay reserved,
/// so a new commit never reuses them.
pub struct FileRecordLog {
    path: PathBuf,
    writer: Mutex<LogWriter>,
    sync_mode: SyncMode,
    recovery_mode: RecoveryMode,
}

impl FileRecordLog {
    /// Open (or create) the log file, returning what it already holds.
    pub fn open(
        path: &Path,
        sync_mode: SyncMode,
        recovery_mode: RecoveryMode,
    ) -> Result<(Self, Recovery)> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .append(true)
            .open(path)?;

        let scan = scan(path, recovery_mode)?;
        if scan.valid_len < scan.file_len {
            let side = discarded_path(path, scan.valid_len);
            fs::write(&side, &scan.tail)?;
            warn!(
                path = %path.display(),
                valid_len = scan.valid_len,
                discarded = scan.file_len - scan.valid_len,
                saved_to = %side.display(),
                "cutting unreadable tail of record log"
            );
            file.set_len(scan.valid_len)?;
            file.sync_all()?;
        }

        let next_sequence = scan.next_sequence();
        info!(
            path = %path.display(),
            entries = scan.recovery.entries.len(),
            skipped = scan.recovery.skipped.len(),
            reserved = scan.reserved,
            next_sequence,
            "record log opened"
        );

        let log = Self {
            path: path.to_path_buf(),
            writer: Mutex::new(LogWriter {
                file,
                offset: scan.valid_len,
                next_sequence,
                last_sync: Instant::now(),
                dirty: false,
            }),
            sync_mode,
            recovery_mode,
        };
        Ok((log, scan.recovery))
    }

    /// Path to the log file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Current end of the log, in bytes.
    pub fn offset(&self) -> u64 {
        self.writer
            .lock()
            .map(|w| w.offset)
            .unwrap_or_else(|poisoned| poisoned.into_inner().offset)
    }

    /// Never hand out `sequence` or anything below it. Used with a
    /// high-water mark recorded outside the log.
    pub fn reserve_through(&self, sequence: u64) {
        let mut w = self
            .writer
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if sequence >= w.next_sequence {
            info!(
                from = w.next_sequence,
                to = sequence + 1,
                "raising next sequence past recorded high-water mark"
            );
            w.next_sequence = sequence + 1;
        }
    }

    fn sync_after_write(&self, w: &mut LogWriter) -> io::Result<()> {
        match self.sync_mode {
            SyncMode::EveryWrite => {
                w.file.sync_data()?;
                w.last_sync = Instant::now();
                w.dirty = false;
            }
            SyncMode::Periodic { interval_ms } => {
                if w.last_sync.elapsed() >= Duration::from_millis(interval_ms) {
                    w.file.sync_data()?;
                    w.last_sync = Instant::now();
                    w.dirty = false;
                } else {
                    w.dirty = true;
                }
            }
            SyncMode::OsDefault => w.dirty = true,
        }
        Ok(())
    }
}

impl RecordLog for FileRecordLog {
    fn append(
        &self,
        deadline: Instant,
        seal: &mut SealFn<'_>,
        apply: &mut ApplyFn<'_>,
    ) -> Result<ConsentRecord> {
        let mut w = lock_until(&self.writer, deadline, "log writer")?;
        let sequence = w.next_sequence;
        let record = seal(sequence)?;

        let payload = encode_entry(&record)?;
        let mut frame = Vec::with_capacity(HEADER_SIZE + payload.len());
        frame.extend_from_slice(&(payload.len() as u32).to_le_bytes());
        frame.extend_from_slice(&crc32fast::hash(&payload).to_le_bytes());
        frame.extend_from_slice(&payload);

        let written = w.file.write_all(&frame);
        let result = written.and_then(|()| self.sync_after_write(&mut w));
        if let Err(e) = result {
            // Never leave a partial or unacknowledged frame behind.
            let rollback_to = w.offset;
            if let Err(rollback) = w.file.set_len(rollback_to) {
                warn!(error = %rollback, offset = rollback_to, "record log rollback failed");
            }
            return Err(e.into());
        }

        let entry_offset = w.offset;
        w.offset += frame.len() as u64;
        w.next_sequence = sequence + 1;
        apply(&record);

        debug!(sequence, offset = entry_offset, len = payload.len(), "record log append");
        Ok(record)
    }

    fn replay(&self) -> Result<Recovery> {
        // Hold the writer so the scan sees a consistent prefix.
        let w = self
            .writer
            .lock()
            .map_err(|_| StoreError::Poisoned("log writer"))?;
        let scan = scan(&self.path, self.recovery_mode)?;
        drop(w);
        Ok(scan.recovery)
    }

    fn next_sequence(&self) -> u64 {
        self.writer
            .lock()
            .map(|w| w.next_sequence)
            .unwrap_or_else(|poisoned| poisoned.into_inner().next_sequence)
    }

    fn flush(&self) -> Result<()> {
        let mut w = self
            .writer
            .lock()
            .map_err(|_| StoreError::Poisoned("log writer"))?;
        w.file.flush()?;
        if w.dirty {
            w.file.sync_all()?;
            w.last_sync = Instant::now();
            w.dirty = false;
        }
        Ok(())
    }

    fn describe(&self) -> String {
        self.path.display().to_string()
    }
}

struct Scan {
    recovery: Recovery,
    /// Offset the log is cut back to.
    valid_len: u64,
    file_len: u64,
    /// Bytes from `valid_len` to the end of the file.
    tail: Vec<u8>,
    /// Highest sequence read back.
    max_sequence: u64,
    /// Sequences that skipped frames past the last entry may have held.
    reserved: u64,
}

impl Scan {
    fn next_sequence(&self) -> u64 {
        self.max_sequence + self.reserved + 1
    }
}

/// Where the bytes cut from `path` at `offset` are kept.
fn discarded_path(path: &Path, offset: u64) -> PathBuf {
    let mut name = OsString::from(path.as_os_str());
    name.push(format!(".discarded-{offset}"));
    PathBuf::from(name)
}

fn header_at(bytes: &[u8], offset: usize) -> Option<(u32, u32)> {
    let header = bytes.get(offset..offset + HEADER_SIZE)?;
    let length = u32::from_le_bytes([header[0], header[1], header[2], header[3]]);
    let crc = u32::from_le_bytes([header[4], header[5], header[6], header[7]]);
    Some((length, crc))
}

/// A complete frame with a plausible length and a matching CRC.
fn frame_is_valid(bytes: &[u8], offset: usize) -> bool {
    let Some((length, crc)) = header_at(bytes, offset) else {
        return false;
    };
    if length == 0 || length > MAX_ENTRY_LEN {
        return false;
    }
    let start = offset + HEADER_SIZE;
    bytes
        .get(start..start + length as usize)
        .is_some_and(|payload| crc32fast::hash(payload) == crc)
}

fn next_valid_frame(bytes: &[u8], from: usize) -> Option<usize> {
    (from..bytes.len()).find(|&offset| frame_is_valid(bytes, offset))
}

/// Read all frames of the log file.
fn scan(path: &Path, mode: RecoveryMode) -> Result<Scan> {
    let bytes = fs::read(path)?;
    let file_len = bytes.len() as u64;
    let mut recovery = Recovery::default();
    let mut offset = 0usize;
    let mut cut_at = bytes.len();
    let mut max_sequence = 0u64;
    // Offset just past the last readable entry.
    let mut entries_end = 0usize;

    while offset < bytes.len() {
        let remaining = bytes.len() - offset;
        let damage = match header_at(&bytes, offset) {
            None => {
                warn!(offset, file_len, "incomplete entry header at end of log");
                cut_at = offset;
                break;
            }
            Some((length, _)) if length == 0 || length > MAX_ENTRY_LEN => {
                format!("invalid entry length {length}")
            }
            Some((length, _)) if HEADER_SIZE + length as usize > remaining => {
                if next_valid_frame(&bytes, offset + 1).is_none() {
                    warn!(offset, length, file_len, "truncated entry at end of log");
                    cut_at = offset;
                    break;
                }
                format!("entry length {length} runs past the end of the log")
            }
            Some((length, expected_crc)) => {
                let frame_end = offset + HEADER_SIZE + length as usize;
                let payload = &bytes[offset + HEADER_SIZE..frame_end];
                let actual_crc = crc32fast::hash(payload);
                if actual_crc == expected_crc {
                    match decode_entry(payload) {
                        Ok(entry) => {
                            max_sequence = max_sequence.max(entry.sequence);
                            recovery.entries.push(entry);
                            entries_end = frame_end;
                        }
                        Err(e) => {
                            let reason = e.to_string();
                            if mode == RecoveryMode::Strict {
                                return Err(corrupted(offset, reason));
                            }
                            warn!(offset, %reason, "skipping undecodable log entry");
                            recovery.skipped.push(SkippedEntry {
                                offset: offset as u64,
                                span: (frame_end - offset) as u64,
                                reason,
                            });
                        }
                    }
                    offset = frame_end;
                    continue;
                }

                let reason = format!(
                    "CRC mismatch: expected {expected_crc:#010x}, got {actual_crc:#010x}"
                );
                // A damaged payload keeps framing intact when the next frame
                // (or the end of the file) lines up with the stated length.
                if mode == RecoveryMode::Lenient
                    && (frame_end == bytes.len() || frame_is_valid(&bytes, frame_end))
                {
                    warn!(offset, %reason, "skipping unreadable log entry");
                    recovery.skipped.push(SkippedEntry {
                        offset: offset as u64,
                        span: (frame_end - offset) as u64,
                        reason,
                    });
                    offset = frame_end;
                    continue;
                }
                reason
            }
        };

        if mode == RecoveryMode::Strict {
            return Err(corrupted(offset, damage));
        }
        match next_valid_frame(&bytes, offset + 1) {
            Some(next) => {
                warn!(offset, resume_at = next, reason = %damage, "skipping damaged log region");
                recovery.skipped.push(SkippedEntry {
                    offset: offset as u64,
                    span: (next - offset) as u64,
                    reason: damage,
                });
                offset = next;
            }
            None => {
                warn!(offset, reason = %damage, "nothing readable after damaged log region");
                recovery.skipped.push(SkippedEntry {
                    offset: offset as u64,
                    span: remaining as u64,
                    reason: damage,
                });
                cut_at = offset;
                break;
            }
        }
    }

    // Each skipped region past the last entry held at least one frame, and
    // every frame is at least MIN_FRAME_LEN bytes.
    let reserved: u64 = recovery
        .skipped
        .iter()
        .filter(|s| s.offset >= entries_end as u64)
        .map(|s| (s.span / MIN_FRAME_LEN).max(1))
        .sum();

    recovery.truncated_bytes = (bytes.len() - cut_at) as u64;
    debug!(
        recovered = recovery.entries.len(),
        skipped = recovery.skipped.len(),
        "record log scan complete"
    );
    Ok(Scan {
        recovery,
        valid_len: cut_at as u64,
        file_len,
        tail: bytes[cut_at..].to_vec(),
        max_sequence,
        reserved,
    })
}

fn corrupted(offset: usize, reason: String) -> StoreError {
    StoreError::Corrupted {
        offset: offset as u64,
        reason,
    }
}

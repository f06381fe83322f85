//! Crash/corruption recovery: scans the log from offset 0 and rebuilds the
//! keydir, truncating a trailing partial record and salvaging past any
//! mid-file corruption it finds along the way.
//!
//! The append-only, self-delimited, CRC-protected record format makes
//! trailing-truncation recovery trivial (just stop at the first record that
//! doesn't fully fit) and mid-file recovery probabilistic but sound: a
//! false-positive salvage is bounded by the 32-bit CRC collision rate.

use std::path::Path;

use tracing::{debug, info, warn};

use crate::error::SaveStateResult;
use crate::format::{self, CHECKSUM_SIZE, HEADER_SIZE, MIN_RECORD_SIZE};
use crate::keydir::{Keydir, KeydirEntry};

/// Outcome of a single recovery pass.
pub struct RecoveryOutcome {
    pub keydir: Keydir,
    /// `Some(length)` if the file had a truncatable tail (partial record or
    /// unsalvageable corruption); `None` if the whole file parsed cleanly.
    pub truncate_to: Option<u64>,
}

/// Scan `buffer` (the full contents of the log file) and rebuild a keydir.
///
/// Does not touch the file; callers decide whether to apply `truncate_to`
/// based on whether the store was opened writable.
pub fn recover(buffer: &[u8], salvage_scan_limit: Option<u64>) -> SaveStateResult<RecoveryOutcome> {
    let mut keydir = Keydir::new();
    let len = buffer.len() as u64;
    let mut p: u64 = 0;
    let mut truncate_to: Option<u64> = None;

    while p < len {
        let remaining = len - p;
        if remaining < MIN_RECORD_SIZE as u64 {
            debug!(offset = p, remaining, "partial header at tail, stopping");
            truncate_to = Some(p);
            break;
        }

        let header_start = p as usize;
        let header =
            match format::decode_header(&buffer[header_start..header_start + HEADER_SIZE]) {
                Ok(h) => h,
                Err(_) => {
                    // Cannot even parse a header-shaped region; try to salvage from here.
                    match salvage(buffer, p + 1, len, salvage_scan_limit) {
                        Some(next) => {
                            p = next;
                            continue;
                        }
                        None => {
                            warn!(offset = p, "no salvageable record found, truncating");
                            truncate_to = Some(p);
                            break;
                        }
                    }
                }
            };

        let record_len = header.record_len() as u64;
        if p + record_len > len {
            debug!(
                offset = p,
                record_len, len, "trailing partial record, stopping"
            );
            truncate_to = Some(p);
            break;
        }

        let record_start = p as usize;
        let record_end = (p + record_len) as usize;
        let record = &buffer[record_start..record_end];

        match format::verify(record) {
            Ok(()) => {
                let key_start = HEADER_SIZE;
                let key_end = key_start + header.key_size as usize;
                let key = record[key_start..key_end].to_vec();

                if header.is_tombstone() {
                    keydir.remove(&key);
                } else {
                    let value_offset = p + HEADER_SIZE as u64 + header.key_size as u64;
                    let checksum_start = record.len() - CHECKSUM_SIZE;
                    let checksum = u32::from_be_bytes([
                        record[checksum_start],
                        record[checksum_start + 1],
                        record[checksum_start + 2],
                        record[checksum_start + 3],
                    ]);
                    keydir.put(
                        key,
                        KeydirEntry {
                            value_offset,
                            value_size: header.value_size,
                            checksum,
                        },
                    );
                }
                p += record_len;
            }
            Err(_) => {
                warn!(offset = p, "checksum mismatch, entering salvage mode");
                match salvage(buffer, p + 1, len, salvage_scan_limit) {
                    Some(next) => p = next,
                    None => {
                        warn!(offset = p, "salvage exhausted file, truncating");
                        truncate_to = Some(p);
                        break;
                    }
                }
            }
        }
    }

    if let Some(cut) = truncate_to {
        info!(
            recovered_keys = keydir.len(),
            truncated_at = cut,
            original_len = len,
            "recovery complete with a truncated tail"
        );
    } else {
        info!(recovered_keys = keydir.len(), "recovery complete, file intact");
    }

    Ok(RecoveryOutcome {
        keydir,
        truncate_to,
    })
}

/// Scan forward byte-by-byte from `start`, looking for the next position
/// that parses as a record header and whose record verifies under CRC-32.
/// Bounded by `limit` bytes past `start` if given, otherwise scans to EOF.
fn salvage(buffer: &[u8], start: u64, len: u64, limit: Option<u64>) -> Option<u64> {
    let bound = match limit {
        Some(l) => len.min(start.saturating_add(l)),
        None => len,
    };

    let mut pos = start;
    while pos + MIN_RECORD_SIZE as u64 <= bound {
        let idx = pos as usize;
        if let Ok(header) = format::decode_header(&buffer[idx..idx + HEADER_SIZE]) {
            let record_len = header.record_len() as u64;
            if pos + record_len <= len {
                let end = (pos + record_len) as usize;
                if format::verify(&buffer[idx..end]).is_ok() {
                    return Some(pos);
                }
            }
        }
        pos += 1;
    }
    None
}

/// Apply a truncation decided by [`recover`] to the file at `path`, if the
/// store was opened writable. Read-only opens leave the file untouched.
pub fn apply_truncation(path: &Path, truncate_to: u64, writable: bool) -> SaveStateResult<()> {
    if !writable {
        return Ok(());
    }
    let file = std::fs::OpenOptions::new().write(true).open(path)?;
    file.set_len(truncate_to)?;
    Ok(())
}

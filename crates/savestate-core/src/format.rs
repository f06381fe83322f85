//! On-disk record format for the savestate log.
//!
//! Every record is self-delimiting and CRC-protected so that recovery can
//! trust a record's own length prefix instead of needing an external index:
//!
//! `[key_size: u32 BE][value_size: u32 BE][key bytes][value bytes][checksum: u32 BE]`
//!
//! `value_size == TOMBSTONE_SENTINEL` marks a deletion; no value bytes follow
//! in that case. The checksum is CRC-32 (IEEE 802.3) over the header, key,
//! and value bytes — the same polynomial as the widely used `crc32` hash.

use crate::error::{SaveStateError, SaveStateResult};

/// Size of the fixed header: `key_size` (4B) + `value_size` (4B).
pub const HEADER_SIZE: usize = 8;

/// Size of the trailing checksum field.
pub const CHECKSUM_SIZE: usize = 4;

/// Minimum legal record length: header + empty key + checksum, tombstone of an empty key.
pub const MIN_RECORD_SIZE: usize = HEADER_SIZE + CHECKSUM_SIZE;

/// `value_size` sentinel marking a tombstone record.
pub const TOMBSTONE_SENTINEL: u32 = 0xFFFF_FFFF;

/// A decoded record header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecordHeader {
    pub key_size: u32,
    pub value_size: u32,
}

impl RecordHeader {
    pub fn is_tombstone(&self) -> bool {
        self.value_size == TOMBSTONE_SENTINEL
    }

    /// Length of the value bytes actually stored on disk (0 for a tombstone).
    pub fn stored_value_len(&self) -> usize {
        if self.is_tombstone() {
            0
        } else {
            self.value_size as usize
        }
    }

    /// Total on-disk length of the record this header belongs to.
    pub fn record_len(&self) -> usize {
        HEADER_SIZE + self.key_size as usize + self.stored_value_len() + CHECKSUM_SIZE
    }

    fn to_bytes(self) -> [u8; HEADER_SIZE] {
        let mut buf = [0u8; HEADER_SIZE];
        buf[0..4].copy_from_slice(&self.key_size.to_be_bytes());
        buf[4..8].copy_from_slice(&self.value_size.to_be_bytes());
        buf
    }
}

/// Decode the 8-byte fixed header at the start of a record.
///
/// `bytes` must be at least [`HEADER_SIZE`] long.
pub fn decode_header(bytes: &[u8]) -> SaveStateResult<RecordHeader> {
    if bytes.len() < HEADER_SIZE {
        return Err(SaveStateError::ShortRead {
            offset: 0,
            expected: HEADER_SIZE,
            actual: bytes.len(),
        });
    }
    let key_size = u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);
    let value_size = u32::from_be_bytes([bytes[4], bytes[5], bytes[6], bytes[7]]);
    Ok(RecordHeader {
        key_size,
        value_size,
    })
}

/// CRC-32 (IEEE 802.3) of `bytes`.
pub fn checksum_of(bytes: &[u8]) -> u32 {
    crc32fast::hash(bytes)
}

/// Encode a live record for `key`/`value`. Fails with `InvalidKey` on an empty key.
pub fn encode(key: &[u8], value: &[u8]) -> SaveStateResult<Vec<u8>> {
    if key.is_empty() {
        return Err(SaveStateError::InvalidKey);
    }
    let header = RecordHeader {
        key_size: key.len() as u32,
        value_size: value.len() as u32,
    };
    let mut buf = Vec::with_capacity(header.record_len());
    buf.extend_from_slice(&header.to_bytes());
    buf.extend_from_slice(key);
    buf.extend_from_slice(value);
    let checksum = checksum_of(&buf);
    buf.extend_from_slice(&checksum.to_be_bytes());
    Ok(buf)
}

/// Encode a tombstone record for `key`. Fails with `InvalidKey` on an empty key.
pub fn encode_tombstone(key: &[u8]) -> SaveStateResult<Vec<u8>> {
    if key.is_empty() {
        return Err(SaveStateError::InvalidKey);
    }
    let header = RecordHeader {
        key_size: key.len() as u32,
        value_size: TOMBSTONE_SENTINEL,
    };
    let mut buf = Vec::with_capacity(header.record_len());
    buf.extend_from_slice(&header.to_bytes());
    buf.extend_from_slice(key);
    let checksum = checksum_of(&buf);
    buf.extend_from_slice(&checksum.to_be_bytes());
    Ok(buf)
}

/// Verify a complete record's trailing checksum against its header+key+value bytes.
///
/// `record_bytes` must be the full, exact-length record (header, key, optional
/// value, and the trailing 4-byte checksum).
pub fn verify(record_bytes: &[u8]) -> SaveStateResult<()> {
    if record_bytes.len() < MIN_RECORD_SIZE {
        return Err(SaveStateError::ShortRead {
            offset: 0,
            expected: MIN_RECORD_SIZE,
            actual: record_bytes.len(),
        });
    }
    let split = record_bytes.len() - CHECKSUM_SIZE;
    let (payload, stored) = record_bytes.split_at(split);
    let expected = u32::from_be_bytes([stored[0], stored[1], stored[2], stored[3]]);
    let actual = checksum_of(payload);
    if actual != expected {
        return Err(SaveStateError::ChecksumMismatch {
            offset: 0,
            expected,
            actual,
        });
    }
    Ok(())
}

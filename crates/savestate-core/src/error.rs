//! Error types for the savestate storage engine.
//!
//! All engine errors are represented by the `SaveStateError` enum, which
//! carries enough context (path, offset, expected/actual values) to debug a
//! corrupted or misused store without re-deriving it from a bare message.

use std::error::Error;
use std::fmt;
use std::path::PathBuf;

/// Engine error kinds. Each variant is a distinct, catchable condition.
#[derive(Debug, Clone)]
pub enum SaveStateError {
    /// `get`/`delete`/`pop` of a missing key, or `open` in `r`/`w` on a missing file.
    NotFound,

    /// Any operation attempted after `close`.
    AlreadyClosed,

    /// A mutating operation attempted while the store is open in mode `r`.
    ReadOnly,

    /// An empty key was supplied to `put`.
    InvalidKey,

    /// A caller-input violation, e.g. `copy` to the store's own path.
    InvalidArgument {
        /// Human-readable description of the violation.
        message: String,
    },

    /// A record's stored checksum did not match the recomputed CRC-32.
    ChecksumMismatch {
        /// Byte offset of the record whose checksum failed.
        offset: u64,
        /// Checksum recorded in the file.
        expected: u32,
        /// Checksum recomputed from the record bytes.
        actual: u32,
    },

    /// The file is shorter than the keydir or a record header claims.
    ShortRead {
        /// Byte offset the read was attempted at.
        offset: u64,
        /// Number of bytes requested.
        expected: usize,
        /// Number of bytes actually available.
        actual: usize,
    },

    /// An underlying OS failure.
    Io {
        /// Path involved, if known.
        path: Option<PathBuf>,
        /// The underlying I/O error kind.
        kind: std::io::ErrorKind,
        /// Human-readable description.
        message: String,
    },

    /// `popitem` on an empty keydir.
    Empty,
}

impl fmt::Display for SaveStateError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SaveStateError::NotFound => write!(f, "key or file not found"),
            SaveStateError::AlreadyClosed => write!(f, "store is already closed"),
            SaveStateError::ReadOnly => write!(f, "store is open read-only"),
            SaveStateError::InvalidKey => write!(f, "keys must be non-empty"),
            SaveStateError::InvalidArgument { message } => {
                write!(f, "invalid argument: {}", message)
            }
            SaveStateError::ChecksumMismatch {
                offset,
                expected,
                actual,
            } => write!(
                f,
                "checksum mismatch at offset {}: expected 0x{:08x}, got 0x{:08x}",
                offset, expected, actual
            ),
            SaveStateError::ShortRead {
                offset,
                expected,
                actual,
            } => write!(
                f,
                "short read at offset {}: expected {} bytes, found {}",
                offset, expected, actual
            ),
            SaveStateError::Io {
                path,
                kind,
                message,
            } => {
                if let Some(path) = path {
                    write!(f, "I/O error at {}: {} ({})", path.display(), message, kind)
                } else {
                    write!(f, "I/O error: {} ({})", message, kind)
                }
            }
            SaveStateError::Empty => write!(f, "store is empty"),
        }
    }
}

impl Error for SaveStateError {}

impl From<std::io::Error> for SaveStateError {
    fn from(err: std::io::Error) -> Self {
        SaveStateError::Io {
            path: None,
            kind: err.kind(),
            message: err.to_string(),
        }
    }
}

/// Result type alias for savestate operations.
pub type SaveStateResult<T> = Result<T, SaveStateError>;

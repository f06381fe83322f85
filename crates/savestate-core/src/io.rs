//! Buffered, positional file I/O for the savestate log.
//!
//! `LogFile` is a thin wrapper around a single OS file: appends land in an
//! in-memory buffer and are flushed to the OS once the buffer crosses a
//! configurable threshold; positional reads transparently flush first so a
//! read can never observe a torn view of just-appended bytes; `sync` flushes
//! and then forces the OS to persist the file to stable storage.

use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use crate::error::{SaveStateError, SaveStateResult};
use crate::platform_durability::durable_sync;

/// Default flush threshold: 64 KiB of buffered writes before an implicit flush.
pub const DEFAULT_FLUSH_THRESHOLD: usize = 64 * 1024;

/// A single append-only log file with a buffered write path and positional reads.
pub struct LogFile {
    file: File,
    path: PathBuf,
    /// Length of the file as of the last flush (excludes buffered-but-unflushed bytes).
    flushed_len: u64,
    buffer: Vec<u8>,
    flush_threshold: usize,
    writable: bool,
}

impl LogFile {
    /// Open (and optionally create/truncate) the file at `path`.
    pub fn open(path: &Path, writable: bool, create: bool, truncate: bool) -> SaveStateResult<Self> {
        let mut opts = OpenOptions::new();
        opts.read(true);
        if writable {
            opts.write(true);
        }
        if create {
            opts.create(true);
        }
        if truncate {
            opts.truncate(true);
        }
        let file = opts.open(path).map_err(|e| SaveStateError::Io {
            path: Some(path.to_path_buf()),
            kind: e.kind(),
            message: format!("failed to open {}: {}", path.display(), e),
        })?;
        let flushed_len = file
            .metadata()
            .map_err(|e| SaveStateError::Io {
                path: Some(path.to_path_buf()),
                kind: e.kind(),
                message: format!("failed to stat {}: {}", path.display(), e),
            })?
            .len();

        Ok(Self {
            file,
            path: path.to_path_buf(),
            flushed_len,
            buffer: Vec::new(),
            flush_threshold: DEFAULT_FLUSH_THRESHOLD,
            writable,
        })
    }

    pub fn with_flush_threshold(mut self, threshold: usize) -> Self {
        self.flush_threshold = threshold.max(1);
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Total length of the file including buffered-but-unflushed bytes.
    pub fn len(&self) -> u64 {
        self.flushed_len + self.buffer.len() as u64
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Append `bytes` to the log. Returns the absolute offset the bytes will
    /// occupy once flushed. Flushes transparently once the buffer crosses
    /// the configured threshold.
    pub fn append(&mut self, bytes: &[u8]) -> SaveStateResult<u64> {
        if !self.writable {
            return Err(SaveStateError::ReadOnly);
        }
        let offset = self.len();
        self.buffer.extend_from_slice(bytes);
        if self.buffer.len() >= self.flush_threshold {
            self.flush()?;
        }
        Ok(offset)
    }

    /// Flush the in-memory write buffer to the OS (not necessarily to stable storage).
    pub fn flush(&mut self) -> SaveStateResult<()> {
        if self.buffer.is_empty() {
            return Ok(());
        }
        self.file
            .seek(SeekFrom::Start(self.flushed_len))
            .map_err(|e| self.io_err("seek", e))?;
        self.file
            .write_all(&self.buffer)
            .map_err(|e| self.io_err("write", e))?;
        self.flushed_len += self.buffer.len() as u64;
        self.buffer.clear();
        Ok(())
    }

    /// Positional read that does not disturb logical append order. Reads
    /// transparently from the buffer by flushing first if the requested
    /// range has not yet landed on disk.
    pub fn read_at(&mut self, offset: u64, length: usize) -> SaveStateResult<Vec<u8>> {
        if offset + length as u64 > self.flushed_len {
            self.flush()?;
        }
        let total = self.len();
        if offset + length as u64 > total {
            return Err(SaveStateError::ShortRead {
                offset,
                expected: length,
                actual: total.saturating_sub(offset) as usize,
            });
        }
        self.file
            .seek(SeekFrom::Start(offset))
            .map_err(|e| self.io_err("seek", e))?;
        let mut buf = vec![0u8; length];
        self.file.read_exact(&mut buf).map_err(|e| {
            if e.kind() == std::io::ErrorKind::UnexpectedEof {
                SaveStateError::ShortRead {
                    offset,
                    expected: length,
                    actual: 0,
                }
            } else {
                self.io_err("read", e)
            }
        })?;
        Ok(buf)
    }

    /// Force all buffered and OS-cached data to stable storage.
    pub fn sync(&mut self) -> SaveStateResult<()> {
        self.flush()?;
        durable_sync(&self.file).map_err(|e| self.io_err("sync", e))
    }

    /// Shorten the file to `length`, discarding any buffered bytes beyond it.
    pub fn truncate(&mut self, length: u64) -> SaveStateResult<()> {
        self.buffer.clear();
        self.file
            .set_len(length)
            .map_err(|e| self.io_err("truncate", e))?;
        self.flushed_len = length;
        Ok(())
    }

    /// Flush and release the descriptor.
    pub fn close(&mut self) -> SaveStateResult<()> {
        self.sync()
    }

    fn io_err(&self, op: &str, e: std::io::Error) -> SaveStateError {
        SaveStateError::Io {
            path: Some(self.path.clone()),
            kind: e.kind(),
            message: format!("{} failed on {}: {}", op, self.path.display(), e),
        }
    }
}

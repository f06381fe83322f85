//! Engine façade — the storage engine's single entry point: open-mode
//! permissions, the mapping operations, and lifecycle (`sync`/`compact`/`close`).
//!
//! **Read path**: keydir lookup, then a positional read of just the value
//! bytes (or the whole record, if checksum verification is enabled).
//! **Write path**: encode a record, append it, update the keydir.
//! There is no background thread and no RAM/WAL split here — every write
//! is synchronous all the way to the append buffer; durability to stable
//! storage is an explicit `sync()` away, per the single-writer contract.

use std::path::{Path, PathBuf};

use tracing::{info, warn};

use crate::compaction;
use crate::config::Config;
use crate::error::{SaveStateError, SaveStateResult};
use crate::format;
use crate::io::LogFile;
use crate::keydir::{Keydir, KeydirEntry};
use crate::recovery;

/// How the store was opened, and what it permits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenMode {
    /// Read-only. File must already exist.
    Read,
    /// Read-write. File must already exist.
    Write,
    /// Read-write, creating the file if it is missing.
    Create,
    /// Read-write, always truncating the file to empty first.
    New,
}

impl OpenMode {
    /// Parse the dbm-style single-character mode strings `r`/`w`/`c`/`n`.
    pub fn parse(s: &str) -> SaveStateResult<Self> {
        match s {
            "r" => Ok(Self::Read),
            "w" => Ok(Self::Write),
            "c" => Ok(Self::Create),
            "n" => Ok(Self::New),
            other => Err(SaveStateError::InvalidArgument {
                message: format!("unknown open mode {:?}, expected one of r/w/c/n", other),
            }),
        }
    }

    fn writable(self) -> bool {
        !matches!(self, Self::Read)
    }

    fn must_exist(self) -> bool {
        matches!(self, Self::Read | Self::Write)
    }

    fn create(self) -> bool {
        matches!(self, Self::Create | Self::New)
    }

    fn truncate(self) -> bool {
        matches!(self, Self::New)
    }
}

/// The storage engine: one open file, one keydir, one write buffer.
pub struct Engine {
    io: LogFile,
    keydir: Keydir,
    path: PathBuf,
    mode: OpenMode,
    verify_checksum: bool,
    config: Config,
    closed: bool,
}

/// Append `.savestate` to `path` unless it already carries that extension.
pub fn canonical_path(path: &Path) -> PathBuf {
    let has_suffix = path
        .extension()
        .map(|ext| ext == "savestate")
        .unwrap_or(false);
    if has_suffix {
        path.to_path_buf()
    } else {
        let mut s = path.as_os_str().to_os_string();
        s.push(".savestate");
        PathBuf::from(s)
    }
}

impl Engine {
    /// Open a store at `path` (the `.savestate` suffix is added if missing)
    /// with the given mode and checksum-verification policy.
    pub fn open(path: &Path, mode: OpenMode, verify_checksum: bool) -> SaveStateResult<Self> {
        Self::open_with_config(path, mode, verify_checksum, Config::default())
    }

    pub fn open_with_config(
        path: &Path,
        mode: OpenMode,
        verify_checksum: bool,
        config: Config,
    ) -> SaveStateResult<Self> {
        config.validate()?;
        let path = canonical_path(path);
        let exists = path.exists();

        if mode.must_exist() && !exists {
            return Err(SaveStateError::NotFound);
        }

        let io = LogFile::open(&path, mode.writable(), mode.create(), mode.truncate())?
            .with_flush_threshold(config.write_buffer_bytes);

        let keydir = if mode.truncate() || io.is_empty() {
            Keydir::new()
        } else {
            let mut file = std::fs::File::open(&path)?;
            let mut buf = Vec::new();
            std::io::Read::read_to_end(&mut file, &mut buf)?;
            let outcome = recovery::recover(&buf, config.salvage_scan_limit_bytes)?;
            if let Some(truncate_to) = outcome.truncate_to {
                recovery::apply_truncation(&path, truncate_to, mode.writable())?;
            }
            outcome.keydir
        };

        let mut io = io;
        if mode.writable() {
            // Recovery may have shortened the file out from under `io`'s
            // cached length; reopen so its bookkeeping matches reality.
            io = LogFile::open(&path, mode.writable(), false, false)?
                .with_flush_threshold(config.write_buffer_bytes);
        }

        info!(path = %path.display(), keys = keydir.len(), "store opened");

        Ok(Self {
            io,
            keydir,
            path,
            mode,
            verify_checksum,
            config,
            closed: false,
        })
    }

    fn check_open(&self) -> SaveStateResult<()> {
        if self.closed {
            return Err(SaveStateError::AlreadyClosed);
        }
        Ok(())
    }

    fn check_writable(&self) -> SaveStateResult<()> {
        self.check_open()?;
        if !self.mode.writable() {
            return Err(SaveStateError::ReadOnly);
        }
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn len(&self) -> SaveStateResult<usize> {
        self.check_open()?;
        Ok(self.keydir.len())
    }

    pub fn is_empty(&self) -> SaveStateResult<bool> {
        self.check_open()?;
        Ok(self.keydir.is_empty())
    }

    pub fn contains(&self, key: &[u8]) -> SaveStateResult<bool> {
        self.check_open()?;
        Ok(self.keydir.contains(key))
    }

    pub fn get(&mut self, key: &[u8]) -> SaveStateResult<Vec<u8>> {
        self.check_open()?;
        let entry = self.keydir.get(key).ok_or(SaveStateError::NotFound)?;
        self.read_value(key, &entry)
    }

    fn read_value(&mut self, key: &[u8], entry: &KeydirEntry) -> SaveStateResult<Vec<u8>> {
        if self.verify_checksum {
            let record_start = entry.value_offset - format::HEADER_SIZE as u64 - key.len() as u64;
            let record_len =
                format::HEADER_SIZE + key.len() + entry.value_size as usize + format::CHECKSUM_SIZE;
            let record = self.io.read_at(record_start, record_len)?;
            format::verify(&record).map_err(|_| SaveStateError::ChecksumMismatch {
                offset: record_start,
                expected: entry.checksum,
                actual: format::checksum_of(&record[..record.len() - format::CHECKSUM_SIZE]),
            })?;
            let value_start = format::HEADER_SIZE + key.len();
            Ok(record[value_start..value_start + entry.value_size as usize].to_vec())
        } else {
            self.io.read_at(entry.value_offset, entry.value_size as usize)
        }
    }

    pub fn put(&mut self, key: &[u8], value: &[u8]) -> SaveStateResult<()> {
        self.check_writable()?;
        let record = format::encode(key, value)?;
        let record_start = self.io.append(&record)?;
        let value_offset = record_start + format::HEADER_SIZE as u64 + key.len() as u64;
        let checksum = format::checksum_of(&record[..record.len() - format::CHECKSUM_SIZE]);
        self.keydir.put(
            key.to_vec(),
            KeydirEntry {
                value_offset,
                value_size: value.len() as u32,
                checksum,
            },
        );
        Ok(())
    }

    pub fn delete(&mut self, key: &[u8]) -> SaveStateResult<()> {
        self.check_writable()?;
        if !self.keydir.contains(key) {
            return Err(SaveStateError::NotFound);
        }
        let record = format::encode_tombstone(key)?;
        self.io.append(&record)?;
        self.keydir.remove(key);
        Ok(())
    }

    /// Keys in first-insertion order.
    pub fn keys(&self) -> Vec<Vec<u8>> {
        self.keydir.iter().map(|(k, _)| k.clone()).collect()
    }

    /// Keys in reverse insertion order.
    pub fn keys_rev(&self) -> Vec<Vec<u8>> {
        self.keydir.iter().rev().map(|(k, _)| k.clone()).collect()
    }

    /// Fetch values for `keys` one at a time; never materializes the whole
    /// value set in memory at once.
    pub fn values_for(&mut self, keys: &[Vec<u8>]) -> SaveStateResult<Vec<Vec<u8>>> {
        keys.iter().map(|k| self.get(k)).collect()
    }

    pub fn items_for(&mut self, keys: &[Vec<u8>]) -> SaveStateResult<Vec<(Vec<u8>, Vec<u8>)>> {
        keys.iter()
            .map(|k| self.get(k).map(|v| (k.clone(), v)))
            .collect()
    }

    /// Remove `key` and return its last value, or `default` if absent.
    pub fn pop(&mut self, key: &[u8], default: Option<Vec<u8>>) -> SaveStateResult<Vec<u8>> {
        self.check_writable()?;
        match self.get(key) {
            Ok(value) => {
                self.delete(key)?;
                Ok(value)
            }
            Err(SaveStateError::NotFound) => default.ok_or(SaveStateError::NotFound),
            Err(e) => Err(e),
        }
    }

    /// Remove and return the most-recently-inserted entry (LIFO).
    pub fn popitem(&mut self) -> SaveStateResult<(Vec<u8>, Vec<u8>)> {
        self.check_writable()?;
        let (key, entry) = self.keydir.pop_last().ok_or(SaveStateError::Empty)?;
        let value = self.read_value(&key, &entry)?;
        let record = format::encode_tombstone(&key)?;
        self.io.append(&record)?;
        Ok((key, value))
    }

    pub fn setdefault(&mut self, key: &[u8], default: &[u8]) -> SaveStateResult<Vec<u8>> {
        self.check_writable()?;
        match self.get(key) {
            Ok(value) => Ok(value),
            Err(SaveStateError::NotFound) => {
                self.put(key, default)?;
                Ok(default.to_vec())
            }
            Err(e) => Err(e),
        }
    }

    pub fn update(&mut self, pairs: &[(Vec<u8>, Vec<u8>)]) -> SaveStateResult<()> {
        self.check_writable()?;
        for (k, v) in pairs {
            self.put(k, v)?;
        }
        Ok(())
    }

    /// Delete every live key. Equivalent in observable effect to appending a
    /// tombstone for each key and discarding the keydir.
    pub fn clear(&mut self) -> SaveStateResult<()> {
        self.check_writable()?;
        let keys = self.keys();
        for key in keys {
            let record = format::encode_tombstone(&key)?;
            self.io.append(&record)?;
        }
        self.keydir.clear();
        Ok(())
    }

    /// Write the current live contents to a new file, leaving this store
    /// untouched. Fails with `InvalidArgument` if `new_path` is this file.
    pub fn copy(&mut self, new_path: &Path) -> SaveStateResult<()> {
        self.check_open()?;
        let dest = canonical_path(new_path);
        if dest == self.path {
            return Err(SaveStateError::InvalidArgument {
                message: "copy destination must differ from the current file".into(),
            });
        }
        compaction::copy_to(&dest, &mut self.io, &self.keydir)
    }

    pub fn sync(&mut self) -> SaveStateResult<()> {
        self.check_open()?;
        self.io.sync()
    }

    /// Rewrite the file to contain only live records, in place.
    pub fn compact(&mut self) -> SaveStateResult<()> {
        self.check_writable()?;
        compaction::compact_in_place(&self.path, &mut self.io, &mut self.keydir)
    }

    /// Sync and release resources, optionally compacting first. Subsequent
    /// operations fail with `AlreadyClosed`. Compaction errors are
    /// propagated but the store is still marked closed.
    pub fn close(&mut self, compact: bool) -> SaveStateResult<()> {
        if self.closed {
            return Ok(());
        }
        let result = (|| {
            if compact && self.mode.writable() {
                self.compact()?;
            }
            self.io.close()
        })();
        self.closed = true;
        result
    }
}

impl Drop for Engine {
    fn drop(&mut self) {
        if !self.closed {
            if let Err(e) = self.close(false) {
                warn!(error = %e, path = %self.path.display(), "error closing store on drop");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn open_new(dir: &TempDir, name: &str) -> Engine {
        Engine::open(&dir.path().join(name), OpenMode::New, true).unwrap()
    }

    #[test]
    fn test_mode_parse() {
        assert_eq!(OpenMode::parse("r").unwrap(), OpenMode::Read);
        assert_eq!(OpenMode::parse("w").unwrap(), OpenMode::Write);
        assert_eq!(OpenMode::parse("c").unwrap(), OpenMode::Create);
        assert_eq!(OpenMode::parse("n").unwrap(), OpenMode::New);
        assert!(OpenMode::parse("x").is_err());
    }

    #[test]
    fn test_suffix_appended_once() {
        assert_eq!(
            canonical_path(Path::new("/tmp/foo")),
            Path::new("/tmp/foo.savestate")
        );
        assert_eq!(
            canonical_path(Path::new("/tmp/foo.savestate")),
            Path::new("/tmp/foo.savestate")
        );
    }

    #[test]
    fn test_s1_basic_round_trip() {
        let dir = TempDir::new().unwrap();
        let mut engine = open_new(&dir, "s1");
        engine.put(b"foo", b"bar").unwrap();
        assert_eq!(engine.get(b"foo").unwrap(), b"bar");
        assert!(engine.contains(b"foo").unwrap());
        assert_eq!(engine.len().unwrap(), 1);
    }

    #[test]
    fn test_s2_overwrite_and_compact() {
        let dir = TempDir::new().unwrap();
        let mut engine = open_new(&dir, "s2");
        engine.put(b"k", b"v1").unwrap();
        engine.put(b"k", b"v2").unwrap();
        engine.sync().unwrap();
        let before = std::fs::metadata(engine.path()).unwrap().len();

        engine.compact().unwrap();
        let after = std::fs::metadata(engine.path()).unwrap().len();
        assert!(after < before);
        assert_eq!(engine.get(b"k").unwrap(), b"v2");
        assert_eq!(engine.len().unwrap(), 1);
    }

    #[test]
    fn test_second_compaction_is_a_no_op() {
        let dir = TempDir::new().unwrap();
        let mut engine = open_new(&dir, "compact-twice");
        engine.put(b"k", b"v1").unwrap();
        engine.put(b"k", b"v2").unwrap();
        engine.put(b"other", b"x").unwrap();
        engine.sync().unwrap();

        engine.compact().unwrap();
        let first_bytes = std::fs::read(engine.path()).unwrap();

        engine.compact().unwrap();
        let second_bytes = std::fs::read(engine.path()).unwrap();

        assert_eq!(second_bytes, first_bytes);
        assert_eq!(engine.get(b"k").unwrap(), b"v2");
        assert_eq!(engine.len().unwrap(), 2);
    }

    #[test]
    fn test_s3_delete_and_reopen() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("s3");
        {
            let mut engine = Engine::open(&path, OpenMode::New, true).unwrap();
            engine.put(b"a", b"1").unwrap();
            engine.put(b"b", b"2").unwrap();
            engine.delete(b"a").unwrap();
            engine.close(false).unwrap();
        }
        let mut reopened = Engine::open(&path, OpenMode::Read, true).unwrap();
        assert!(!reopened.contains(b"a").unwrap());
        assert_eq!(reopened.get(b"b").unwrap(), b"2");
        assert_eq!(reopened.len().unwrap(), 1);
    }

    #[test]
    fn test_s4_trailing_garbage() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("s4");
        let before_len;
        {
            let mut engine = Engine::open(&path, OpenMode::New, true).unwrap();
            engine.put(b"a", b"1").unwrap();
            engine.close(false).unwrap();
            before_len = std::fs::metadata(&path).unwrap().len();
        }
        {
            use std::io::Write;
            let mut f = std::fs::OpenOptions::new().append(true).open(&path).unwrap();
            f.write_all(&[1, 2, 3, 4, 5]).unwrap();
        }
        let mut engine = Engine::open(&path, OpenMode::Write, true).unwrap();
        assert_eq!(engine.len().unwrap(), 1);
        assert_eq!(engine.get(b"a").unwrap(), b"1");
        assert_eq!(std::fs::metadata(&path).unwrap().len(), before_len);
    }

    #[test]
    fn test_s5_mid_file_bitflip_verify_on() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("s5");
        {
            let mut engine = Engine::open(&path, OpenMode::New, true).unwrap();
            engine.put(b"k1", b"v1").unwrap();
            engine.put(b"k2", b"v2").unwrap();
            engine.put(b"k3", b"v3").unwrap();
            engine.close(false).unwrap();
        }
        {
            let rec1_len = format::encode(b"k1", b"v1").unwrap().len();
            let flip_at = rec1_len + format::HEADER_SIZE + 2; // inside k2's value
            let mut bytes = std::fs::read(&path).unwrap();
            bytes[flip_at] ^= 0x01;
            std::fs::write(&path, bytes).unwrap();
        }
        let mut engine = Engine::open(&path, OpenMode::Write, true).unwrap();
        assert_eq!(engine.get(b"k1").unwrap(), b"v1");
        assert_eq!(engine.get(b"k3").unwrap(), b"v3");
        assert!(!engine.contains(b"k2").unwrap());
    }

    #[test]
    fn test_s6_popitem_order() {
        let dir = TempDir::new().unwrap();
        let mut engine = open_new(&dir, "s6");
        engine.put(b"a", b"1").unwrap();
        engine.put(b"b", b"2").unwrap();
        engine.put(b"c", b"3").unwrap();

        assert_eq!(engine.popitem().unwrap(), (b"c".to_vec(), b"3".to_vec()));
        assert_eq!(engine.popitem().unwrap(), (b"b".to_vec(), b"2".to_vec()));
        assert_eq!(engine.popitem().unwrap(), (b"a".to_vec(), b"1".to_vec()));
        assert!(matches!(engine.popitem(), Err(SaveStateError::Empty)));
    }

    #[test]
    fn test_read_only_rejects_writes() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("ro");
        {
            let mut engine = Engine::open(&path, OpenMode::New, true).unwrap();
            engine.put(b"a", b"1").unwrap();
            engine.close(false).unwrap();
        }
        let mut ro = Engine::open(&path, OpenMode::Read, true).unwrap();
        assert!(matches!(ro.put(b"a", b"2"), Err(SaveStateError::ReadOnly)));
        assert!(matches!(ro.delete(b"a"), Err(SaveStateError::ReadOnly)));
    }

    #[test]
    fn test_open_read_missing_file_is_not_found() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("missing");
        assert!(matches!(
            Engine::open(&path, OpenMode::Read, true),
            Err(SaveStateError::NotFound)
        ));
    }

    #[test]
    fn test_closed_engine_rejects_operations() {
        let dir = TempDir::new().unwrap();
        let mut engine = open_new(&dir, "closed");
        engine.put(b"a", b"1").unwrap();
        engine.close(false).unwrap();
        assert!(matches!(
            engine.get(b"a"),
            Err(SaveStateError::AlreadyClosed)
        ));
    }

    #[test]
    fn test_copy_rejects_same_path() {
        let dir = TempDir::new().unwrap();
        let mut engine = open_new(&dir, "same");
        let path = engine.path().to_path_buf();
        assert!(matches!(
            engine.copy(&path),
            Err(SaveStateError::InvalidArgument { .. })
        ));
    }

    #[test]
    fn test_setdefault_and_update_and_clear() {
        let dir = TempDir::new().unwrap();
        let mut engine = open_new(&dir, "misc");
        assert_eq!(engine.setdefault(b"a", b"default").unwrap(), b"default");
        assert_eq!(engine.setdefault(b"a", b"other").unwrap(), b"default");

        engine
            .update(&[(b"b".to_vec(), b"2".to_vec()), (b"c".to_vec(), b"3".to_vec())])
            .unwrap();
        assert_eq!(engine.len().unwrap(), 3);

        engine.clear().unwrap();
        assert_eq!(engine.len().unwrap(), 0);
        assert!(!engine.contains(b"a").unwrap());
    }

    #[test]
    fn test_closed_engine_rejects_len_and_is_empty() {
        let dir = TempDir::new().unwrap();
        let mut engine = open_new(&dir, "closed-len");
        engine.put(b"a", b"1").unwrap();
        engine.close(false).unwrap();
        assert!(matches!(engine.len(), Err(SaveStateError::AlreadyClosed)));
        assert!(matches!(
            engine.is_empty(),
            Err(SaveStateError::AlreadyClosed)
        ));
    }
}

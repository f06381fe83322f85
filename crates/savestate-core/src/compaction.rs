//! Offline compaction: rewrites the log with only the latest value for each
//! live key, dropping tombstones and superseded records entirely.
//!
//! `compact_in_place` and `copy_to` share the same dense-rewrite routine;
//! they differ only in what happens to the result afterward (an atomic
//! rename back over the original file, versus leaving the new file where it
//! was written).

use std::path::{Path, PathBuf};

use tracing::info;

use crate::error::SaveStateResult;
use crate::format;
use crate::io::LogFile;
use crate::keydir::{Keydir, KeydirEntry};

/// Write a dense log containing only the current, live entries of `keydir`
/// (read from `source`) to a fresh file at `dest_path`, in keydir iteration
/// order. Returns the new file (synced, left open) and a keydir rebuilt
/// against the new file's offsets.
pub fn write_live_records(
    dest_path: &Path,
    source: &mut LogFile,
    keydir: &Keydir,
) -> SaveStateResult<(LogFile, Keydir)> {
    let mut dest = LogFile::open(dest_path, true, true, true)?;
    let mut new_keydir = Keydir::new();

    for (key, entry) in keydir.iter() {
        let value = source.read_at(entry.value_offset, entry.value_size as usize)?;
        let record = format::encode(key, &value)?;
        let record_start = dest.append(&record)?;
        let value_offset = record_start + crate::format::HEADER_SIZE as u64 + key.len() as u64;
        new_keydir.put(
            key.clone(),
            KeydirEntry {
                value_offset,
                value_size: entry.value_size,
                checksum: entry.checksum,
            },
        );
    }

    dest.sync()?;
    Ok((dest, new_keydir))
}

/// Compact `source` in place: write a dense rewrite to a temp file alongside
/// it, then atomically rename the temp file over the original path.
///
/// On success, `*source` and `*keydir` are swapped to point at the
/// compacted file; the caller's file descriptor and offsets are up to date
/// afterward. On failure, the original file and keydir are left untouched.
pub fn compact_in_place(
    path: &Path,
    source: &mut LogFile,
    keydir: &mut Keydir,
) -> SaveStateResult<()> {
    let temp_path = temp_path_for(path);
    let (new_file, new_keydir) = write_live_records(&temp_path, source, keydir)?;
    drop(new_file);

    std::fs::rename(&temp_path, path)?;

    let reopened = LogFile::open(path, true, false, false)?;
    let before = keydir.len();

    info!(
        live_keys = new_keydir.len(),
        dropped = before.saturating_sub(new_keydir.len()),
        "compaction complete"
    );

    *source = reopened;
    *keydir = new_keydir;
    Ok(())
}

/// Write a dense copy of the live contents of `source`/`keydir` to a new
/// file at `dest_path`, leaving the original store untouched.
pub fn copy_to(dest_path: &Path, source: &mut LogFile, keydir: &Keydir) -> SaveStateResult<()> {
    let (mut dest, _new_keydir) = write_live_records(dest_path, source, keydir)?;
    dest.close()?;
    Ok(())
}

/// A sibling temp path used as the rewrite target during in-place compaction.
pub fn temp_path_for(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".compact-tmp");
    path.with_file_name(name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keydir::KeydirEntry;
    use tempfile::TempDir;

    fn seed(log: &mut LogFile, keydir: &mut Keydir, key: &[u8], value: &[u8]) {
        let record = format::encode(key, value).unwrap();
        let start = log.append(&record).unwrap();
        let value_offset = start + format::HEADER_SIZE as u64 + key.len() as u64;
        keydir.put(
            key.to_vec(),
            KeydirEntry {
                value_offset,
                value_size: value.len() as u32,
                checksum: 0,
            },
        );
    }

    #[test]
    fn test_compact_in_place_drops_superseded_and_deleted() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("log");
        let mut log = LogFile::open(&path, true, true, false).unwrap();
        let mut keydir = Keydir::new();

        seed(&mut log, &mut keydir, b"a", b"1");
        seed(&mut log, &mut keydir, b"b", b"2");
        seed(&mut log, &mut keydir, b"a", b"1-updated"); // supersedes first "a"
        log.sync().unwrap();

        let before_len = log.len();
        compact_in_place(&path, &mut log, &mut keydir).unwrap();

        assert!(log.len() < before_len);
        assert_eq!(keydir.len(), 2);
        assert!(keydir.contains(b"a"));
        assert!(keydir.contains(b"b"));

        let a_entry = keydir.get(b"a").unwrap();
        let value = log.read_at(a_entry.value_offset, a_entry.value_size as usize).unwrap();
        assert_eq!(value, b"1-updated");
    }

    #[test]
    fn test_second_compaction_is_a_no_op() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("log");
        let mut log = LogFile::open(&path, true, true, false).unwrap();
        let mut keydir = Keydir::new();

        seed(&mut log, &mut keydir, b"a", b"1");
        seed(&mut log, &mut keydir, b"b", b"2");
        seed(&mut log, &mut keydir, b"a", b"1-updated");
        log.sync().unwrap();

        compact_in_place(&path, &mut log, &mut keydir).unwrap();
        let first_bytes = std::fs::read(&path).unwrap();
        let first_len = log.len();
        let first_keydir_len = keydir.len();

        compact_in_place(&path, &mut log, &mut keydir).unwrap();
        let second_bytes = std::fs::read(&path).unwrap();

        assert_eq!(second_bytes, first_bytes, "compacting an already-dense file must be byte-for-byte a no-op");
        assert_eq!(log.len(), first_len);
        assert_eq!(keydir.len(), first_keydir_len);
        assert_eq!(keydir.get(b"a").unwrap().value_size, 9);
    }

    #[test]
    fn test_copy_to_leaves_original_untouched() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("log");
        let dest_path = dir.path().join("copy");
        let mut log = LogFile::open(&path, true, true, false).unwrap();
        let mut keydir = Keydir::new();
        seed(&mut log, &mut keydir, b"a", b"1");
        seed(&mut log, &mut keydir, b"a", b"2");
        log.sync().unwrap();

        let original_len = log.len();
        copy_to(&dest_path, &mut log, &keydir).unwrap();

        assert_eq!(log.len(), original_len, "original file must be untouched");
        assert!(dest_path.exists());

        let mut copy = LogFile::open(&dest_path, false, false, false).unwrap();
        assert!(copy.len() < original_len, "copy must be dense, not verbatim");
    }

    #[test]
    fn test_temp_path_sibling_naming() {
        let path = Path::new("/tmp/store.savestate");
        let temp = temp_path_for(path);
        assert_eq!(temp, Path::new("/tmp/store.savestate.compact-tmp"));
    }
}

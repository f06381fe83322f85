//! Platform-specific durable sync implementations.
//!
//! Each platform has different guarantees for when data is actually written
//! to persistent storage. This module maps to the strongest durability
//! guarantee available on each platform so that `Engine::sync` means the
//! same thing everywhere: the bytes are on stable storage when it returns.

use std::fs::File;
use std::io;

/// Ensures data is durably written to persistent storage before returning.
///
/// Platform behaviors:
/// - Linux: `fdatasync()` - syncs data but not metadata (atime/mtime).
/// - macOS/iOS: `fcntl(F_FULLFSYNC)` - bypasses the disk write cache.
/// - Windows: `FlushFileBuffers()` - flushes buffers and requests a device flush.
/// - Other: `file.sync_data()` - Rust stdlib fallback.
pub fn durable_sync(file: &File) -> io::Result<()> {
    #[cfg(target_os = "linux")]
    {
        use std::os::unix::io::AsRawFd;
        let fd = file.as_raw_fd();
        // SAFETY: fdatasync is a POSIX call operating on a valid, open fd.
        let result = unsafe { libc::fdatasync(fd) };
        if result == 0 {
            Ok(())
        } else {
            Err(io::Error::last_os_error())
        }
    }

    #[cfg(any(target_os = "macos", target_os = "ios"))]
    {
        // Standard fsync() on Apple platforms only reaches the disk's
        // volatile write cache; F_FULLFSYNC is the only way to get a
        // durability guarantee that survives power loss.
        use std::os::unix::io::AsRawFd;
        let fd = file.as_raw_fd();
        // SAFETY: fcntl with F_FULLFSYNC operates on a valid, open fd.
        let result = unsafe { libc::fcntl(fd, libc::F_FULLFSYNC) };
        if result == 0 {
            Ok(())
        } else {
            Err(io::Error::last_os_error())
        }
    }

    #[cfg(target_os = "windows")]
    {
        use std::os::windows::io::AsRawHandle;
        use winapi::um::fileapi::FlushFileBuffers;
        let handle = file.as_raw_handle();
        // SAFETY: FlushFileBuffers is a Windows API call on a valid handle.
        let result = unsafe { FlushFileBuffers(handle as *mut _) };
        if result != 0 {
            Ok(())
        } else {
            Err(io::Error::last_os_error())
        }
    }

    #[cfg(not(any(
        target_os = "linux",
        target_os = "macos",
        target_os = "ios",
        target_os = "windows"
    )))]
    {
        file.sync_data()
    }
}

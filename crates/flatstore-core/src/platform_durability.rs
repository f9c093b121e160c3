//! Platform-specific durable sync implementations
//!
//! A rewrite is only crash-safe if the staged file's bytes reach persistent
//! storage before the rename, and the rename itself (a directory entry change)
//! reaches storage after it. This module maps both steps to the strongest
//! primitive each platform offers.

use std::fs::File;
use std::io;
use std::path::Path;

/// Ensures file data is durably written to persistent storage before returning.
///
/// Platform behaviors:
/// - Linux: fdatasync()
/// - macOS/iOS: fcntl(F_FULLFSYNC), the only call that flushes the drive cache
/// - Windows: FlushFileBuffers()
/// - Other: file.sync_data()
///
/// May block for a long time under heavy I/O.
pub fn durable_sync(file: &File) -> io::Result<()> {
    #[cfg(target_os = "linux")]
    {
        use std::os::unix::io::AsRawFd;
        let fd = file.as_raw_fd();
        // SAFETY: fd comes from a live File reference, so it is open for the call.
        let result = unsafe { libc::fdatasync(fd) };
        if result == 0 {
            Ok(())
        } else {
            Err(io::Error::last_os_error())
        }
    }

    #[cfg(any(target_os = "macos", target_os = "ios"))]
    {
        use std::os::unix::io::AsRawFd;
        let fd = file.as_raw_fd();
        // SAFETY: fd comes from a live File reference, so it is open for the call.
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
        // SAFETY: handle comes from a live File reference.
        let result = unsafe { FlushFileBuffers(handle as *mut _) };
        if result != 0 {
            Ok(())
        } else {
            Err(io::Error::last_os_error())
        }
    }

    #[cfg(not(any(target_os = "linux", target_os = "macos", target_os = "ios", target_os = "windows")))]
    {
        file.sync_data()
    }
}

/// Persist the directory entry of `path` so a completed rename survives power loss.
///
/// Directories cannot be opened as files on Windows; there the rename is
/// already journaled by NTFS and this is a no-op.
pub fn sync_parent_dir(path: &Path) -> io::Result<()> {
    #[cfg(unix)]
    {
        let parent = match path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p,
            _ => Path::new("."),
        };
        let dir = File::open(parent)?;
        dir.sync_all()
    }

    #[cfg(not(unix))]
    {
        let _ = path;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_durable_sync_success() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"id,username,location\n").unwrap();

        let result = durable_sync(file.as_file());
        assert!(result.is_ok(), "durable_sync failed: {:?}", result.err());
    }

    #[test]
    fn test_sync_parent_dir() {
        let dir = tempfile::TempDir::new().unwrap();
        let target = dir.path().join("users.csv");
        std::fs::write(&target, b"id,username,location\n").unwrap();
        assert!(sync_parent_dir(&target).is_ok());
    }

    #[test]
    fn test_sync_parent_dir_relative_name() {
        assert!(sync_parent_dir(Path::new("users.csv")).is_ok());
    }
}

//! Advisory locking on the data directory.
//!
//! Commands that mutate the snapshot (`ingest`, `reset`) take an exclusive
//! flock() for their duration so two CLI instances cannot interleave saves.
//! Read-only commands (`search`, `ask`, `info`) hold a shared lock while they
//! load, so a save never removes a generation they are reading.

use std::fs::{File, OpenOptions};
use std::io;
use std::path::Path;

#[cfg(unix)]
use std::os::unix::io::AsRawFd;

/// Lock file name placed in the base directory
const LOCK_FILE_NAME: &str = "qarag.lock";

/// A held file lock that releases on drop
pub struct FileLock {
    #[allow(dead_code)]
    file: File,
}

impl FileLock {
    /// Attempt to acquire an exclusive lock on the data directory.
    /// Fails with `WouldBlock` if another process holds it.
    pub fn try_acquire(base_path: &Path) -> io::Result<Self> {
        let file = Self::open(base_path)?;
        Self::try_lock_exclusive(&file)?;
        Ok(FileLock { file })
    }

    /// Acquire a shared lock, waiting for any exclusive holder to finish.
    pub fn acquire_shared(base_path: &Path) -> io::Result<Self> {
        let file = Self::open(base_path)?;
        Self::lock_shared(&file)?;
        Ok(FileLock { file })
    }

    fn open(base_path: &Path) -> io::Result<File> {
        std::fs::create_dir_all(base_path)?;
        OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(false)
            .open(base_path.join(LOCK_FILE_NAME))
    }

    #[cfg(unix)]
    fn try_lock_exclusive(file: &File) -> io::Result<()> {
        let fd = file.as_raw_fd();
        let result = unsafe { libc::flock(fd, libc::LOCK_EX | libc::LOCK_NB) };
        if result != 0 {
            let err = io::Error::last_os_error();
            if err.kind() == io::ErrorKind::WouldBlock
                || err.raw_os_error() == Some(libc::EWOULDBLOCK)
                || err.raw_os_error() == Some(libc::EAGAIN)
            {
                return Err(io::Error::new(
                    io::ErrorKind::WouldBlock,
                    "Index is locked by another qarag process",
                ));
            }
            return Err(err);
        }
        Ok(())
    }

    #[cfg(unix)]
    fn lock_shared(file: &File) -> io::Result<()> {
        let fd = file.as_raw_fd();
        let result = unsafe { libc::flock(fd, libc::LOCK_SH) };
        if result != 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(())
    }

    // No locking outside unix
    #[cfg(not(unix))]
    fn try_lock_exclusive(_file: &File) -> io::Result<()> {
        Ok(())
    }

    #[cfg(not(unix))]
    fn lock_shared(_file: &File) -> io::Result<()> {
        Ok(())
    }
}

#[cfg(unix)]
impl Drop for FileLock {
    fn drop(&mut self) {
        let fd = self.file.as_raw_fd();
        unsafe { libc::flock(fd, libc::LOCK_UN) };
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    #[cfg(unix)]
    fn test_acquire_and_release() {
        let tmp = tempfile::tempdir().unwrap();

        let lock1 = FileLock::try_acquire(tmp.path());
        assert!(lock1.is_ok(), "First lock should succeed");

        let lock2 = FileLock::try_acquire(tmp.path());
        let err = lock2.err().expect("Second lock should fail");
        assert_eq!(err.kind(), io::ErrorKind::WouldBlock);

        drop(lock1);

        let lock3 = FileLock::try_acquire(tmp.path());
        assert!(lock3.is_ok(), "Third lock should succeed after release");
    }

    #[test]
    #[cfg(unix)]
    fn test_shared_locks_exclude_writers() {
        let tmp = tempfile::tempdir().unwrap();

        let reader1 = FileLock::acquire_shared(tmp.path()).unwrap();
        let reader2 = FileLock::acquire_shared(tmp.path()).unwrap();

        let writer = FileLock::try_acquire(tmp.path());
        let err = writer.err().expect("Writer should wait for readers");
        assert_eq!(err.kind(), io::ErrorKind::WouldBlock);

        drop(reader1);
        drop(reader2);
        assert!(FileLock::try_acquire(tmp.path()).is_ok());
    }

    #[test]
    fn test_creates_missing_base_dir() {
        let tmp = tempfile::tempdir().unwrap();
        let base = tmp.path().join("nested").join("data");

        let _lock = FileLock::acquire_shared(&base).unwrap();
        assert!(base.join(LOCK_FILE_NAME).exists());
    }
}

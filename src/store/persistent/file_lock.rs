//! Single-owner lock for a geofence store directory.
//!
//! The owning process holds an OS lock on `.geonote.lock` and writes its pid
//! into the file, so a refused opener can say who owns the collection. The
//! pid is informational only; the OS lock is what excludes.

use std::fs::{self, File, OpenOptions};
use std::io::{self, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use crate::store::StorageError;

/// Name of the lock file created inside the store directory.
pub const LOCK_FILE_NAME: &str = ".geonote.lock";

/// Exclusive ownership of a store directory, released on drop.
#[derive(Debug)]
pub struct StoreLock {
    file: File,
    path: PathBuf,
    owner_pid: u32,
}

impl StoreLock {
    /// Take ownership of `dir` for this process.
    ///
    /// # Errors
    /// - `Locked` naming the recorded owner pid if another opener holds it
    /// - `Io` if the lock file cannot be created or written
    pub fn acquire(dir: &Path) -> Result<Self, StorageError> {
        let path = dir.join(LOCK_FILE_NAME);
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&path)?;

        if !os::try_lock_exclusive(&file)? {
            let owner = Self::recorded_owner(dir)
                .map_or_else(|| "unknown owner".to_string(), |pid| format!("owned by pid {pid}"));
            return Err(StorageError::Locked(format!("{} ({owner})", dir.display())));
        }

        let owner_pid = std::process::id();
        let mut lock = Self { file, path, owner_pid };
        lock.record_owner()?;
        Ok(lock)
    }

    /// Pid recorded in `dir`'s lock file, if any.
    ///
    /// A stale pid may remain after a crash; only a failed
    /// [`acquire`](Self::acquire) proves the directory is in use.
    #[must_use]
    pub fn recorded_owner(dir: &Path) -> Option<u32> {
        fs::read_to_string(dir.join(LOCK_FILE_NAME)).ok()?.trim().parse().ok()
    }

    /// Path of the lock file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Pid of the owning process.
    #[must_use]
    pub fn owner_pid(&self) -> u32 {
        self.owner_pid
    }

    fn record_owner(&mut self) -> io::Result<()> {
        self.file.set_len(0)?;
        self.file.seek(SeekFrom::Start(0))?;
        writeln!(self.file, "{}", self.owner_pid)?;
        self.file.flush()
    }
}

impl Drop for StoreLock {
    fn drop(&mut self) {
        // Clear the pid before the OS lock goes away with the handle.
        if let Err(e) = self.file.set_len(0) {
            tracing::debug!(path = %self.path.display(), error = %e, "failed to clear store lock owner");
        }
    }
}

#[cfg(unix)]
mod os {
    use std::fs::File;
    use std::io;
    use std::os::unix::io::AsRawFd;

    /// Ok(false) when someone else holds the lock.
    pub(super) fn try_lock_exclusive(file: &File) -> io::Result<bool> {
        // SAFETY: the descriptor is owned by `file` and valid for the call.
        if unsafe { libc::flock(file.as_raw_fd(), libc::LOCK_EX | libc::LOCK_NB) } == 0 {
            return Ok(true);
        }
        let err = io::Error::last_os_error();
        if err.raw_os_error() == Some(libc::EWOULDBLOCK) {
            Ok(false)
        } else {
            Err(err)
        }
    }
}

#[cfg(windows)]
mod os {
    use std::fs::File;
    use std::io;
    use std::os::windows::io::AsRawHandle;

    use windows_sys::Win32::Foundation::{ERROR_LOCK_VIOLATION, HANDLE};
    use windows_sys::Win32::Storage::FileSystem::{LockFileEx, LOCKFILE_EXCLUSIVE_LOCK, LOCKFILE_FAIL_IMMEDIATELY};
    use windows_sys::Win32::System::IO::OVERLAPPED;

    /// Ok(false) when someone else holds the lock.
    ///
    /// The locked byte sits at 4 GiB, past the pid text, so other openers
    /// can still read the owner.
    pub(super) fn try_lock_exclusive(file: &File) -> io::Result<bool> {
        // SAFETY: the handle is owned by `file`; OVERLAPPED only carries the
        // lock offset and is not retained past the call.
        let ok = unsafe {
            let mut overlapped = std::mem::zeroed::<OVERLAPPED>();
            overlapped.Anonymous.Anonymous.OffsetHigh = 1;
            LockFileEx(
                file.as_raw_handle() as HANDLE,
                LOCKFILE_EXCLUSIVE_LOCK | LOCKFILE_FAIL_IMMEDIATELY,
                0,
                1,
                0,
                &mut overlapped,
            )
        };
        if ok != 0 {
            return Ok(true);
        }
        let err = io::Error::last_os_error();
        #[allow(clippy::cast_possible_wrap)]
        if err.raw_os_error() == Some(ERROR_LOCK_VIOLATION as i32) {
            Ok(false)
        } else {
            Err(err)
        }
    }
}

#[cfg(not(any(unix, windows)))]
mod os {
    use std::fs::File;
    use std::io;

    pub(super) fn try_lock_exclusive(_file: &File) -> io::Result<bool> {
        Err(io::Error::new(
            io::ErrorKind::Unsupported,
            "store directory locking not supported on this platform",
        ))
    }
}

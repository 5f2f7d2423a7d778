//! Daemon singleton enforcement.
//!
//! One daemon per home directory, enforced with `flock(2)` on a dedicated
//! lock file (separate from the markers). Marker writes therefore only need
//! atomicity against crashes, never against concurrent writers.

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::os::unix::io::AsRawFd;
use std::path::Path;

use crate::error::DaemonError;

/// A held daemon lock; released when dropped.
pub struct DaemonLock {
    #[allow(dead_code)]
    file: File,
}

impl DaemonLock {
    /// Acquire the exclusive daemon lock for this home directory.
    ///
    /// Returns `DaemonError::AlreadyRunning` if another daemon holds it.
    pub fn acquire(lock_path: &Path) -> Result<Self, DaemonError> {
        if let Some(parent) = lock_path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| DaemonError::HomeSetup(format!("{}: {}", parent.display(), e)))?;
        }

        let lock_file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(false)
            .open(lock_path)
            .map_err(|e| DaemonError::LockFailed(format!("failed to open lock file: {}", e)))?;

        let fd = lock_file.as_raw_fd();

        // SAFETY: flock is safe to call with a valid file descriptor
        let result = unsafe { libc::flock(fd, libc::LOCK_EX | libc::LOCK_NB) };
        if result != 0 {
            return Err(DaemonError::AlreadyRunning);
        }

        // Write PID to lock file for debugging
        lock_file
            .set_len(0)
            .map_err(|e| DaemonError::LockFailed(format!("failed to truncate lock file: {}", e)))?;

        let mut lock_file = lock_file;
        writeln!(lock_file, "{}", std::process::id())
            .map_err(|e| DaemonError::LockFailed(format!("failed to write PID: {}", e)))?;

        Ok(Self { file: lock_file })
    }
}

/// Remove the lock file during daemon shutdown.
pub fn remove_lock_file(lock_path: &Path) {
    if lock_path.exists() {
        let _ = std::fs::remove_file(lock_path);
    }
}

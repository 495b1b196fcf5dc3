//! Single-flight lock for the drain loop.
//!
//! An advisory `flock` on `state/drain.lock`, held by an RAII guard. A
//! trigger that finds the lock busy yields immediately; the in-flight
//! drain will observe any newly dropped tasks on its next inbox scan.

#![allow(unsafe_code)]

use std::fs::{File, OpenOptions};
use std::os::unix::io::AsRawFd;
use std::path::Path;

use anyhow::{Context, Result};

/// Holds the drain lock until dropped. The kernel also releases the lock
/// if the process dies mid-task, so a crash never wedges the queue.
#[derive(Debug)]
pub struct FlockGuard {
    file: File,
}

impl Drop for FlockGuard {
    fn drop(&mut self) {
        unsafe {
            libc::flock(self.file.as_raw_fd(), libc::LOCK_UN);
        }
        // The lock file itself stays behind: unlinking it would let a
        // second process lock a fresh inode while this one still holds
        // the old, defeating the single-flight guarantee.
    }
}

/// Try to take the exclusive lock without blocking.
///
/// `Ok(None)` means another holder is in flight.
pub fn try_exclusive(path: &Path) -> Result<Option<FlockGuard>> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("create directory {}", parent.display()))?;
    }
    let file = OpenOptions::new()
        .create(true)
        .write(true)
        .open(path)
        .with_context(|| format!("open lock file {}", path.display()))?;

    let rc = unsafe { libc::flock(file.as_raw_fd(), libc::LOCK_EX | libc::LOCK_NB) };
    if rc == 0 {
        return Ok(Some(FlockGuard { file }));
    }
    let err = std::io::Error::last_os_error();
    if err.raw_os_error() == Some(libc::EWOULDBLOCK) {
        return Ok(None);
    }
    Err(err).with_context(|| format!("flock {}", path.display()))
}

//! Single-instance guard
//!
//! `connect` and `disconnect` drive the external client interactively, so two
//! of them running at once would fight over the same session. An exclusive
//! lock on a well-known file keeps that from happening. On Unix the lock is
//! `flock(2)`, which the kernel drops if the process dies. Elsewhere the lock
//! file is created exclusively and removed when the guard is dropped.

use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;

#[derive(Error, Debug)]
pub enum LockError {
    #[error("another vipconnect instance is running (lock held on {0})")]
    AlreadyRunning(PathBuf),
    #[error("Failed to open lock file {path}: {source}")]
    Io { path: PathBuf, source: io::Error },
}

/// Held for as long as the guarded operation runs
pub struct InstanceLock {
    path: PathBuf,
    #[cfg(unix)]
    _lock: nix::fcntl::Flock<std::fs::File>,
}

impl InstanceLock {
    /// Try to take the lock without blocking
    #[cfg(unix)]
    pub fn acquire(path: &Path) -> Result<Self, LockError> {
        use nix::errno::Errno;
        use nix::fcntl::{Flock, FlockArg};

        let file = std::fs::OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(path)
            .map_err(|source| LockError::Io {
                path: path.to_path_buf(),
                source,
            })?;

        match Flock::lock(file, FlockArg::LockExclusiveNonblock) {
            Ok(lock) => {
                debug!("Acquired instance lock {}", path.display());
                Ok(Self {
                    path: path.to_path_buf(),
                    _lock: lock,
                })
            }
            Err((_, Errno::EWOULDBLOCK)) => Err(LockError::AlreadyRunning(path.to_path_buf())),
            Err((_, errno)) => Err(LockError::Io {
                path: path.to_path_buf(),
                source: io::Error::from(errno),
            }),
        }
    }

    /// Try to take the lock without blocking
    #[cfg(not(unix))]
    pub fn acquire(path: &Path) -> Result<Self, LockError> {
        match std::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(path)
        {
            Ok(_) => {
                debug!("Acquired instance lock {}", path.display());
                Ok(Self {
                    path: path.to_path_buf(),
                })
            }
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                Err(LockError::AlreadyRunning(path.to_path_buf()))
            }
            Err(source) => Err(LockError::Io {
                path: path.to_path_buf(),
                source,
            }),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[cfg(not(unix))]
impl Drop for InstanceLock {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.path);
    }
}

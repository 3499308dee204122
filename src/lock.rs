//! Single instance lock using an advisory lock on a well-known file.

use std::fs::{self, File, OpenOptions, TryLockError};
use std::io::{self, Write};
use std::os::unix::fs::MetadataExt;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use derive_more::{Display, Error};

/// Default location of the lock file.
pub const DEFAULT_LOCK_FILE: &str = "/tmp/gnucash_backup.lock";

#[derive(Debug, Display, Error)]
/// Errors on acquiring the [LockFile].
///
/// Both variants mean the lock is *not* held and the backup must not run.
pub enum LockError {
    /// Another process holds the lock.
    #[display("Another instance is already running (lock {} is held)", _0.display())]
    Busy(#[error(ignore)] PathBuf),
    /// The lock file can't be opened or locked.
    #[display("Unable to lock {}: {source}", path.display())]
    Open { path: PathBuf, source: io::Error },
}

/// Exclusive, non-blocking hold on a lock file.
///
/// The lock is released when the [LockFile] is dropped or [released](Self::release)
/// explicitly, whichever happens first.
#[derive(Debug)]
pub struct LockFile {
    path: PathBuf,
    file: Mutex<Option<File>>,
}

impl LockFile {
    /// Tries to take the lock on `path`, creating the file if necessary.
    ///
    /// Never waits: if the lock is held by someone else [LockError::Busy] is
    /// returned immediately.
    pub fn acquire(path: impl Into<PathBuf>) -> Result<Self, LockError> {
        let path = path.into();

        let file = match OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&path)
        {
            Ok(file) => file,
            Err(source) => return Err(LockError::Open { path, source }),
        };

        match file.try_lock() {
            Ok(()) => {}
            Err(TryLockError::WouldBlock) => return Err(LockError::Busy(path)),
            Err(TryLockError::Error(source)) => return Err(LockError::Open { path, source }),
        }

        // a previous holder may have unlinked the file between our open and lock
        if !is_same_file(&file, &path) {
            return Err(LockError::Busy(path));
        }

        // the pid is informational only, the advisory lock is authoritative
        if let Err(e) = write_pid(&file) {
            log::debug!(target: "lock", "Writing pid to {} failed: {e}", path.display());
        }
        log::debug!(target: "lock", "Acquired lock {}", path.display());

        Ok(Self {
            path,
            file: Mutex::new(Some(file)),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns if the lock is still held by this handle.
    pub fn is_held(&self) -> bool {
        match self.file.lock() {
            Ok(file) => file.is_some(),
            Err(poisoned) => poisoned.into_inner().is_some(),
        }
    }

    /// Removes the lock file and closes the handle.
    ///
    /// Calling this more than once is a no-op. Errors are logged, never returned.
    pub fn release(&self) {
        let file = match self.file.lock() {
            Ok(mut file) => file.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        };
        let Some(file) = file else {
            return;
        };

        match fs::remove_file(&self.path) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => {
                log::warn!(target: "lock", "Removing lock file {} failed: {e}", self.path.display());
            }
        }

        // closing the last handle drops the advisory lock
        drop(file);
        log::debug!(target: "lock", "Released lock {}", self.path.display());
    }
}

impl Drop for LockFile {
    fn drop(&mut self) {
        self.release();
    }
}

fn is_same_file(file: &File, path: &Path) -> bool {
    match (file.metadata(), fs::metadata(path)) {
        (Ok(held), Ok(current)) => held.dev() == current.dev() && held.ino() == current.ino(),
        _ => false,
    }
}

fn write_pid(mut file: &File) -> io::Result<()> {
    file.set_len(0)?;
    writeln!(file, "{}", std::process::id())?;
    file.flush()
}

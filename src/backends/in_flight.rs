//! The dump currently being written.
//!
//! Shared between the backup run and the signal listener, so a terminated run
//! kills `pg_dump` and removes its incomplete output before the lock is
//! released.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::process::{Child, ExitStatus};
use std::sync::{Mutex, MutexGuard};

#[derive(Debug, Default)]
struct State {
    file: Option<PathBuf>,
    child: Option<Child>,
    aborted: bool,
}

/// Target file and process of the running dump, if any.
#[derive(Debug, Default)]
pub struct InFlightDump {
    state: Mutex<State>,
}

impl InFlightDump {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, State> {
        match self.state.lock() {
            Ok(state) => state,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Marks `file` as being written.
    pub fn begin(&self, file: &Path) {
        self.state().file = Some(file.to_path_buf());
    }

    /// The file is complete or already cleaned up, it must not be touched anymore.
    pub fn finish(&self) {
        self.state().file = None;
    }

    /// The file currently being written.
    pub fn file(&self) -> Option<PathBuf> {
        self.state().file.clone()
    }

    /// Pid of the running dump process.
    pub fn pid(&self) -> Option<u32> {
        self.state().child.as_ref().map(Child::id)
    }

    /// Takes ownership of the started dump process.
    ///
    /// After [InFlightDump::abort] the process is killed right away.
    pub fn attach(&self, mut child: Child) {
        let mut state = self.state();
        if state.aborted {
            kill_and_reap(&mut child);
            return;
        }
        state.child = Some(child);
    }

    /// Checks the dump process without blocking.
    ///
    /// Returns the exit status once it terminated. With `kill` set a still
    /// running process is killed and reaped. Fails if there is no process,
    /// i.e. it was never attached or the run was aborted.
    pub fn poll(&self, kill: bool) -> io::Result<Option<ExitStatus>> {
        let mut state = self.state();
        let child = state
            .child
            .as_mut()
            .ok_or_else(|| io::Error::other("dump process was aborted"))?;

        let status = match child.try_wait()? {
            Some(status) => status,
            None if kill => {
                log::warn!(target: "backend::pg_dump", "Killing pid {}", child.id());
                if let Err(e) = child.kill() {
                    // it may have exited in the meantime
                    log::debug!(target: "backend::pg_dump", "Killing pid {} failed: {e}", child.id());
                }
                child.wait()?
            }
            None => return Ok(None),
        };

        state.child = None;
        Ok(Some(status))
    }

    /// Kills the dump process and removes the incomplete file.
    ///
    /// Calling this more than once is a no-op. Errors are logged, never returned.
    pub fn abort(&self) {
        let mut state = self.state();
        state.aborted = true;

        if let Some(mut child) = state.child.take() {
            log::warn!(target: "backend::pg_dump", "Killing running dump (pid {})", child.id());
            kill_and_reap(&mut child);
        }

        if let Some(file) = state.file.take() {
            match fs::remove_file(&file) {
                Ok(()) => {
                    log::warn!(target: "backend::pg_dump", "Removed incomplete dump {}", file.display());
                }
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => {
                    log::error!(target: "backend::pg_dump", "Removing incomplete dump {} failed: {e}", file.display());
                }
            }
        }
    }
}

fn kill_and_reap(child: &mut Child) {
    if let Err(e) = child.kill() {
        log::debug!(target: "backend::pg_dump", "Killing pid {} failed: {e}", child.id());
    }
    if let Err(e) = child.wait() {
        log::warn!(target: "backend::pg_dump", "Waiting for pid {} failed: {e}", child.id());
    }
}

//! Releasing the lock when the process is terminated by a signal.
//!
//! Destructors don't run when a signal kills the process, so a listener
//! thread catches the termination signals. It kills a running dump, removes
//! its incomplete file, releases the lock and exits with the failure code.

use std::io;
use std::process;
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use signal_hook::consts::signal::{SIGHUP, SIGINT, SIGTERM};
use signal_hook::iterator::{Handle, Signals};

use crate::backends::InFlightDump;
use crate::lock::LockFile;
use crate::pipeline::EXIT_FAILURE;

pub const TERMINATION_SIGNALS: [i32; 3] = [SIGINT, SIGTERM, SIGHUP];

/// Installed signal listener. Dropping it stops listening.
pub struct ShutdownHook {
    handle: Handle,
    thread: Option<JoinHandle<()>>,
}

impl ShutdownHook {
    /// Starts listening for termination signals.
    ///
    /// On receipt `in_flight` is aborted first, so no dump keeps writing once
    /// `lock` is released.
    pub fn install(lock: Arc<LockFile>, in_flight: Arc<InFlightDump>) -> io::Result<Self> {
        let mut signals = Signals::new(TERMINATION_SIGNALS)?;
        let handle = signals.handle();

        let thread = thread::spawn(move || {
            if let Some(signal) = signals.forever().next() {
                log::warn!(
                    target: "shutdown",
                    "Received signal {signal}, aborting backup and releasing {}",
                    lock.path().display()
                );
                in_flight.abort();
                lock.release();
                log::logger().flush();
                process::exit(i32::from(EXIT_FAILURE));
            }
        });

        Ok(Self {
            handle,
            thread: Some(thread),
        })
    }
}

impl Drop for ShutdownHook {
    fn drop(&mut self) {
        self.handle.close();
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                log::debug!(target: "shutdown", "Signal listener panicked");
            }
        }
    }
}

//! Running the external dump tool.

use std::ffi::OsString;
use std::fmt;
use std::io::{self, Read};
use std::process::{Command, ExitStatus, Stdio};
use std::thread;
use std::time::{Duration, Instant};

use super::in_flight::InFlightDump;

const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// A fully built invocation of the dump tool.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DumpCommand {
    pub program: String,
    pub args: Vec<OsString>,
    /// Kill the process once it runs longer than this.
    pub timeout: Option<Duration>,
}

impl fmt::Display for DumpCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.program)?;
        for arg in &self.args {
            write!(f, " {}", arg.to_string_lossy())?;
        }
        Ok(())
    }
}

/// What the dump tool reported back.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DumpOutcome {
    /// Exit code, [None] if the process was terminated by a signal.
    pub exit_code: Option<i32>,
    /// Captured standard error, trailing whitespace removed.
    pub stderr: String,
    /// The process was killed after exceeding [DumpCommand::timeout].
    pub timed_out: bool,
}

impl DumpOutcome {
    pub fn success(&self) -> bool {
        !self.timed_out && self.exit_code == Some(0)
    }
}

/// Boundary to the external dump process.
pub trait DumpRunner {
    /// Runs `command` to completion.
    ///
    /// The started process is handed to `in_flight`, so it can be killed from
    /// elsewhere. Only failing to start or wait for the process is an error,
    /// a non-zero exit is reported through [DumpOutcome].
    fn run(&self, command: &DumpCommand, in_flight: &InFlightDump) -> io::Result<DumpOutcome>;
}

/// Runs the dump tool as child process.
#[derive(Debug, Default, Clone, Copy)]
pub struct ProcessRunner;

impl DumpRunner for ProcessRunner {
    fn run(&self, command: &DumpCommand, in_flight: &InFlightDump) -> io::Result<DumpOutcome> {
        let mut child = Command::new(&command.program)
            .args(&command.args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()?;
        log::trace!(target: "backend::pg_dump", "Started {} with pid {}", command.program, child.id());

        // drain stderr concurrently, a full pipe would block the child forever
        let mut stderr = child
            .stderr
            .take()
            .ok_or_else(|| io::Error::other("stderr of the dump process is not captured"))?;
        let drain = thread::spawn(move || {
            let mut buf = Vec::new();
            stderr.read_to_end(&mut buf).map(|_| buf)
        });

        in_flight.attach(child);
        let (status, timed_out) = wait_timeout(in_flight, command.timeout)?;

        let stderr = drain
            .join()
            .map_err(|_| io::Error::other("reading stderr of the dump process panicked"))??;

        Ok(DumpOutcome {
            exit_code: status.code(),
            stderr: String::from_utf8_lossy(&stderr).trim_end().to_string(),
            timed_out,
        })
    }
}

/// Polls the attached process until it exits, killing it once `timeout` passed.
fn wait_timeout(
    in_flight: &InFlightDump,
    timeout: Option<Duration>,
) -> io::Result<(ExitStatus, bool)> {
    let deadline = timeout.map(|timeout| Instant::now() + timeout);
    loop {
        if let Some(status) = in_flight.poll(false)? {
            return Ok((status, false));
        }

        if deadline.is_some_and(|deadline| Instant::now() >= deadline) {
            if let Some(timeout) = timeout {
                log::warn!(target: "backend::pg_dump", "Dump exceeded the timeout of {}s", timeout.as_secs());
            }
            if let Some(status) = in_flight.poll(true)? {
                return Ok((status, true));
            }
        }

        thread::sleep(POLL_INTERVAL);
    }
}

//! Dump of the GnuCash database using [`pg_dump`].
//!
//! The dump uses the custom archive format (compressed, restorable with
//! `pg_restore`), so no extra compression is applied.
//!
//! [`pg_dump`]: https://www.postgresql.org/docs/current/app-pgdump.html

use std::ffi::OsString;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{DateTime, Local};
use derive_more::{Display, Error};

use super::in_flight::InFlightDump;
use super::runner::{DumpCommand, DumpRunner};
use super::Backup;
use crate::config::BackupConfig;
use crate::util::{artifact, clock};

#[derive(Debug, Display, Error)]
/// Errors on dumping the database. Every one of them is fatal.
pub enum BackupError {
    /// The dump of this second already exists.
    #[display("Backup file {} already exists", _0.display())]
    ArtifactExists(#[error(ignore)] PathBuf),
    /// The dump tool couldn't be started.
    #[display("Running {program} failed: {source}")]
    Spawn { program: String, source: io::Error },
    /// The dump tool reported an error, `stderr` holds its output.
    #[display("{program} exited with {}{}", exit_description(*code), last_line(stderr))]
    DumpFailed {
        program: String,
        code: Option<i32>,
        stderr: String,
    },
    /// The dump tool exceeded the timeout and was killed.
    #[display("{program} did not finish within {}s and was killed", timeout.as_secs())]
    TimedOut { program: String, timeout: Duration },
}

fn exit_description(code: Option<i32>) -> String {
    match code {
        Some(code) => format!("exit code {code}"),
        None => "a signal".to_string(),
    }
}

fn last_line(stderr: &str) -> String {
    match stderr.lines().rev().find(|line| !line.trim().is_empty()) {
        Some(line) => format!(": {}", line.trim()),
        None => String::new(),
    }
}

/// Backend dumping the database with `pg_dump` into the output directory.
///
/// The dump in progress is published to `in_flight`, so a termination signal
/// can kill it and remove the incomplete file.
pub struct PgDump<'a> {
    config: &'a BackupConfig,
    runner: &'a dyn DumpRunner,
    in_flight: &'a InFlightDump,
}

impl<'a> PgDump<'a> {
    pub fn new(
        config: &'a BackupConfig,
        runner: &'a dyn DumpRunner,
        in_flight: &'a InFlightDump,
    ) -> Self {
        if config.output_dir.is_relative() {
            log::warn!(target: "backend::pg_dump", "output_dir is relative: {}", config.output_dir.display());
        }

        Self {
            config,
            runner,
            in_flight,
        }
    }

    /// Path of the dump created at `time`.
    ///
    /// Two runs within the same second would produce the same name, this is
    /// refused instead of overwriting the earlier dump.
    pub fn dump_file_at(&self, time: &DateTime<Local>) -> Result<PathBuf, BackupError> {
        let path = artifact::artifact_path(&self.config.output_dir, time);
        if path.exists() {
            return Err(BackupError::ArtifactExists(path));
        }

        Ok(path)
    }

    /// The `pg_dump` invocation writing to `dump_file`.
    pub fn command(&self, dump_file: &Path) -> DumpCommand {
        let BackupConfig {
            database,
            host,
            port,
            user,
            dump_program,
            timeout,
            ..
        } = self.config;

        let mut file_arg = OsString::from("--file=");
        file_arg.push(dump_file);

        DumpCommand {
            program: dump_program.clone(),
            args: vec![
                format!("--host={host}").into(),
                format!("--port={port}").into(),
                format!("--username={user}").into(),
                "--format=custom".into(),
                file_arg,
                // fail instead of prompting if the credentials file has no entry
                "--no-password".into(),
                database.into(),
            ],
            timeout: *timeout,
        }
    }

    fn remove_partial_dump(&self, dump_file: &Path) {
        match fs::remove_file(dump_file) {
            Ok(()) => {
                log::debug!(target: "backend::pg_dump", "Removed incomplete dump {}", dump_file.display());
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => {
                log::warn!(target: "backend::pg_dump", "Removing incomplete dump {} failed: {e}", dump_file.display());
            }
        }
    }
}

impl Backup for PgDump<'_> {
    type Error = BackupError;

    fn backup(&self, dry_run: bool) -> Result<PathBuf, Self::Error> {
        let BackupConfig {
            database,
            host,
            port,
            user,
            dump_program,
            ..
        } = self.config;
        log::info!(target: "backend::pg_dump", "Create database dump of {database} on {host}:{port}");
        log::trace!(target: "backend::pg_dump", "Using user '{user}' for backup");

        let dump_file = self.dump_file_at(&clock::now())?;
        let command = self.command(&dump_file);

        if dry_run {
            log::info!(target: "backend::pg_dump", "Dry run, not running: {command}");
            return Ok(dump_file);
        }

        log::debug!(target: "backend::pg_dump", "Running: {command}");
        self.in_flight.begin(&dump_file);
        let outcome = self.runner.run(&command, self.in_flight);
        self.in_flight.finish();
        let outcome = match outcome {
            Ok(outcome) => outcome,
            Err(source) => {
                self.remove_partial_dump(&dump_file);
                return Err(BackupError::Spawn {
                    program: dump_program.clone(),
                    source,
                });
            }
        };

        if !outcome.success() {
            for line in outcome.stderr.lines() {
                log::error!(target: "backend::pg_dump", "{dump_program}: {line}");
            }
            self.remove_partial_dump(&dump_file);

            return Err(match (outcome.timed_out, command.timeout) {
                (true, Some(timeout)) => BackupError::TimedOut {
                    program: dump_program.clone(),
                    timeout,
                },
                _ => BackupError::DumpFailed {
                    program: dump_program.clone(),
                    code: outcome.exit_code,
                    stderr: outcome.stderr,
                },
            });
        }

        // relay warnings of a successful dump
        for line in outcome.stderr.lines() {
            log::warn!(target: "backend::pg_dump", "{dump_program}: {line}");
        }
        log::info!(target: "backend::pg_dump", "Finished database dump: {}", dump_file.display());

        Ok(dump_file)
    }
}

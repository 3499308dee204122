//! The backup run: lock, preflight, dump, prune.

use std::path::PathBuf;
use std::sync::Arc;

use derive_more::{Display, Error, From};

use crate::backends::{Backup, BackupError, DumpRunner, InFlightDump, PgDump};
use crate::config::{BackupConfig, ConfigError};
use crate::lock::{LockError, LockFile};
use crate::preflight::{Preflight, PreflightError};
use crate::shutdown::ShutdownHook;
use crate::util::identity;
use crate::util::retention::{PruneReport, Retention};

/// Exit code of every failed run.
pub const EXIT_FAILURE: u8 = 1;

#[derive(Debug, Display, Error, From)]
/// Fatal errors of a backup run.
pub enum RunError {
    /// Bad or missing arguments.
    #[display("{_0}")]
    Config(ConfigError),
    /// Lock contention or an unusable lock file.
    #[display("{_0}")]
    Lock(LockError),
    /// The environment is not ready for a backup.
    #[display("Preflight check failed: {_0}")]
    Preflight(PreflightError),
    /// The database dump failed.
    #[display("Backup failed: {_0}")]
    Backup(BackupError),
}

/// Result of a successful run.
#[derive(Debug)]
pub struct RunSummary {
    /// The created dump (or the one that would have been created on a dry run).
    pub dump_file: PathBuf,
    pub pruned: PruneReport,
}

/// Runs one backup.
///
/// The lock is held for the whole run and released on every return path.
/// If a termination signal arrives the [ShutdownHook] kills a running dump,
/// removes its incomplete file and releases the lock. Old dumps are only
/// pruned after a successful dump.
pub fn run(config: &BackupConfig, runner: &dyn DumpRunner) -> Result<RunSummary, RunError> {
    let lock = Arc::new(LockFile::acquire(&config.lock_file)?);
    let in_flight = Arc::new(InFlightDump::new());
    // declared after the lock, so it stops listening before the lock is released
    let _hook = match ShutdownHook::install(Arc::clone(&lock), Arc::clone(&in_flight)) {
        Ok(hook) => Some(hook),
        Err(e) => {
            log::warn!(target: "shutdown", "Installing signal handlers failed: {e}");
            None
        }
    };

    Preflight::new(config).run()?;
    log_startup_summary(config);

    let dump_file = PgDump::new(config, runner, &in_flight).backup(config.dry_run)?;

    let retention = Retention::new(config.keep);
    let pruned = if config.dry_run {
        retention.prune_with_pending(&config.output_dir, &dump_file, true)
    } else {
        retention.prune(&config.output_dir, false)
    };
    if !pruned.is_clean() {
        log::warn!(
            target: "retention",
            "{} old backup(s) could not be removed",
            pruned.failed.len()
        );
    }

    Ok(RunSummary { dump_file, pruned })
}

fn log_startup_summary(config: &BackupConfig) {
    log::info!(
        "Starting {} {} as {}",
        env!("CARGO_PKG_NAME"),
        env!("CARGO_PKG_VERSION"),
        identity::user_name()
    );
    log::info!(
        "Database: {} on {}:{} as {}",
        config.database,
        config.host,
        config.port,
        config.user
    );
    log::info!(
        "Output directory: {} (keeping {} backups)",
        config.output_dir.display(),
        config.keep
    );
    log::info!("Log file: {}", config.log_file.display());
    if let Some(timeout) = config.timeout {
        log::info!("Dump timeout: {}s", timeout.as_secs());
    }
    if config.dry_run {
        log::warn!("Running in dry-run mode");
    }
}

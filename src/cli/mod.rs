use std::num::NonZeroUsize;
use std::path::PathBuf;

use clap::{ArgAction, Parser};
use log::LevelFilter;

use crate::lock::DEFAULT_LOCK_FILE;
use crate::logging::{self, LOG_FILE_ENV};

/// Backup a GnuCash PostgreSQL database with pg_dump and keep the newest dumps.
///
/// Connection settings not given on the command line are taken from the
/// config file, then from built-in defaults. The password is read by pg_dump
/// from `~/.pgpass` (or `$PGPASSFILE`).
#[derive(Parser, Debug)]
#[command(version, about, long_about, disable_version_flag = true)]
pub struct Cli {
    /// Name of the database to dump. [default: gnucash_db]
    #[arg(short = 'd', long)]
    pub database: Option<String>,

    /// Host of the database server. [default: 127.0.0.1]
    #[arg(short = 'H', long)]
    pub host: Option<String>,

    /// Port of the database server. [default: 5432]
    #[arg(short, long)]
    pub port: Option<u16>,

    /// User to connect as. [default: gnucash_user]
    #[arg(short, long)]
    pub user: Option<String>,

    /// Directory the dumps are written to and pruned in.
    #[arg(short, long)]
    pub output_dir: Option<PathBuf>,

    /// Number of dumps to keep. [default: 5]
    #[arg(short, long)]
    pub keep: Option<NonZeroUsize>,

    /// TOML config file with defaults for the options above.
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// The pg_dump executable, either a name looked up on PATH or a path. [default: pg_dump]
    #[arg(long = "pg-dump", value_name = "PROGRAM")]
    pub dump_program: Option<String>,

    /// Kill pg_dump if it runs longer than this many seconds.
    #[arg(long, value_name = "SECONDS")]
    pub timeout: Option<u64>,

    /// Credentials file checked before dumping. [default: ~/.pgpass]
    #[arg(long, env = "PGPASSFILE")]
    pub credentials_file: Option<PathBuf>,

    /// File used to prevent concurrent backups.
    #[arg(long, env = "GNUCASH_BACKUP_LOCK_FILE", default_value = DEFAULT_LOCK_FILE)]
    pub lock_file: PathBuf,

    /// Log file. [default: /var/log/gnucash_backup.log as root, /tmp/gnucash_backup.log otherwise]
    #[arg(long, env = LOG_FILE_ENV)]
    pub log_file: Option<PathBuf>,

    /// Simulative backup run: checks everything, dumps and removes nothing.
    #[arg(long)]
    pub dry_run: bool,

    /// Verbosity of the command output.
    #[arg(long)]
    pub verbose: Option<LevelFilter>,

    /// Print version.
    #[arg(short = 'v', long, action = ArgAction::Version)]
    version: Option<bool>,
}

impl Cli {
    /// Log file given on the command line, or the default for the current user.
    pub fn log_file(&self) -> PathBuf {
        self.log_file
            .clone()
            .unwrap_or_else(logging::default_log_file)
    }
}

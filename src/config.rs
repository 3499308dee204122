//! Resolution of the immutable [BackupConfig].
//!
//! Every setting is taken from the first source that provides it:
//!
//! 1. command line flag (or its environment variable),
//! 2. the optional TOML config file ([FileConfig]),
//! 3. the built-in default.
//!
//! ```toml
//! [database]
//! name = "gnucash_db"
//! host = "127.0.0.1"
//! port = 5432
//! user = "gnucash_user"
//!
//! [backup]
//! output_dir = "/srv/backups/gnucash"
//! keep = 5
//!
//! [dump]
//! program = "pg_dump"
//! timeout = 3600
//! credentials_file = "/root/.pgpass"
//! ```

use std::fs;
use std::io;
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use derive_more::{Display, Error};
use directories::BaseDirs;

use crate::cli::Cli;

pub const DEFAULT_DATABASE: &str = "gnucash_db";
pub const DEFAULT_HOST: &str = "127.0.0.1";
pub const DEFAULT_PORT: u16 = 5432;
pub const DEFAULT_USER: &str = "gnucash_user";
pub const DEFAULT_KEEP: NonZeroUsize = NonZeroUsize::new(5).expect("default keep is not zero");
pub const DEFAULT_DUMP_PROGRAM: &str = "pg_dump";

/// Credentials file of pg_dump, relative to the home directory.
pub const CREDENTIALS_FILE: &str = ".pgpass";

#[derive(Debug, Display, Error)]
/// Errors on building the [BackupConfig]. These are usage errors.
pub enum ConfigError {
    /// The config file can't be read.
    #[display("Reading the config file {} failed: {source}", path.display())]
    Read { path: PathBuf, source: io::Error },
    /// The config file isn't valid.
    #[display("Parsing the config file {} failed: {source}", path.display())]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
    /// Neither the command line nor the config file name an output directory.
    #[display("No output directory given, use --output-dir")]
    MissingOutputDir,
    /// No credentials file given and the home directory is unknown.
    #[display("Unable to determine the home directory to locate ~/.pgpass")]
    NoHomeDirectory,
}

/// Optional config file with defaults for the command line options.
#[derive(Debug, Default, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FileConfig {
    /// Connection to the database.
    pub database: DatabaseSection,
    /// Where the dumps go and how many stay.
    pub backup: BackupSection,
    /// How pg_dump is run.
    pub dump: DumpSection,
}

#[derive(Debug, Default, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DatabaseSection {
    pub name: Option<String>,
    pub host: Option<String>,
    pub port: Option<u16>,
    pub user: Option<String>,
}

#[derive(Debug, Default, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BackupSection {
    pub output_dir: Option<PathBuf>,
    pub keep: Option<NonZeroUsize>,
}

#[derive(Debug, Default, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DumpSection {
    pub program: Option<String>,
    /// Timeout in seconds.
    pub timeout: Option<u64>,
    pub credentials_file: Option<PathBuf>,
}

impl FileConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;

        Self::parse(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn parse(content: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(content)
    }
}

/// Settings of a single backup run. Never changes once built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackupConfig {
    pub database: String,
    pub host: String,
    pub port: u16,
    pub user: String,
    pub output_dir: PathBuf,
    pub keep: NonZeroUsize,
    pub dump_program: String,
    pub timeout: Option<Duration>,
    pub credentials_file: PathBuf,
    pub lock_file: PathBuf,
    pub log_file: PathBuf,
    pub dry_run: bool,
}

impl BackupConfig {
    /// Builds the config from the command line, loading `--config` if given.
    pub fn from_cli(cli: &Cli) -> Result<Self, ConfigError> {
        let file = match &cli.config {
            Some(path) => FileConfig::load(path)?,
            None => FileConfig::default(),
        };

        Self::resolve(cli, file)
    }

    /// Merges the command line over the config file over the defaults.
    pub fn resolve(cli: &Cli, file: FileConfig) -> Result<Self, ConfigError> {
        let FileConfig {
            database,
            backup,
            dump,
        } = file;

        let output_dir = cli
            .output_dir
            .clone()
            .or(backup.output_dir)
            .ok_or(ConfigError::MissingOutputDir)?;

        let credentials_file = match cli.credentials_file.clone().or(dump.credentials_file) {
            Some(path) => path,
            None => default_credentials_file().ok_or(ConfigError::NoHomeDirectory)?,
        };

        Ok(Self {
            database: cli
                .database
                .clone()
                .or(database.name)
                .unwrap_or_else(|| DEFAULT_DATABASE.to_string()),
            host: cli
                .host
                .clone()
                .or(database.host)
                .unwrap_or_else(|| DEFAULT_HOST.to_string()),
            port: cli.port.or(database.port).unwrap_or(DEFAULT_PORT),
            user: cli
                .user
                .clone()
                .or(database.user)
                .unwrap_or_else(|| DEFAULT_USER.to_string()),
            output_dir,
            keep: cli.keep.or(backup.keep).unwrap_or(DEFAULT_KEEP),
            dump_program: cli
                .dump_program
                .clone()
                .or(dump.program)
                .unwrap_or_else(|| DEFAULT_DUMP_PROGRAM.to_string()),
            timeout: cli.timeout.or(dump.timeout).map(Duration::from_secs),
            credentials_file,
            lock_file: cli.lock_file.clone(),
            log_file: cli.log_file(),
            dry_run: cli.dry_run,
        })
    }
}

/// `~/.pgpass` of the current user.
pub fn default_credentials_file() -> Option<PathBuf> {
    BaseDirs::new().map(|dirs| dirs.home_dir().join(CREDENTIALS_FILE))
}

//! Checks that must pass before a backup is attempted.
//!
//! The checks run in a fixed order and the first failure aborts:
//!
//! 1. the dump executable can be found,
//! 2. the output directory exists and is writable,
//! 3. the credentials file exists and is readable.

use std::env;
use std::ffi::{OsStr, OsString};
use std::fs::{self, File};
use std::io;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

use derive_more::{Display, Error};

use crate::config::BackupConfig;

#[derive(Debug, Display, Error)]
/// A failed precondition. No remediation is attempted.
pub enum PreflightError {
    /// The dump tool is not installed or not on `PATH`.
    #[display("Required executable '{_0}' not found, is PostgreSQL client installed?")]
    MissingExecutable(#[error(ignore)] String),
    /// The output directory is missing.
    #[display("Output directory {} does not exist or is not a directory", _0.display())]
    MissingOutputDir(#[error(ignore)] PathBuf),
    /// The output directory can't be written to.
    #[display("Output directory {} is not writable: {source}", path.display())]
    OutputDirNotWritable { path: PathBuf, source: io::Error },
    /// The credentials file is missing or unreadable.
    #[display("Credentials file {} is not readable: {source}", path.display())]
    CredentialsUnreadable { path: PathBuf, source: io::Error },
}

/// The ordered environment checks for one [BackupConfig].
#[derive(Debug, Clone)]
pub struct Preflight<'a> {
    dump_program: &'a str,
    output_dir: &'a Path,
    credentials_file: &'a Path,
    search_path: Option<OsString>,
}

impl<'a> Preflight<'a> {
    /// Checks for `config`, searching executables on the process' `PATH`.
    pub fn new(config: &'a BackupConfig) -> Self {
        Self {
            dump_program: &config.dump_program,
            output_dir: &config.output_dir,
            credentials_file: &config.credentials_file,
            search_path: env::var_os("PATH"),
        }
    }

    /// Replaces the `PATH` used to find the dump executable.
    pub fn with_search_path(mut self, search_path: Option<OsString>) -> Self {
        self.search_path = search_path;
        self
    }

    /// Runs all checks in order, returning the resolved dump executable.
    pub fn run(&self) -> Result<PathBuf, PreflightError> {
        let executable = find_executable(self.dump_program, self.search_path.as_deref())
            .ok_or_else(|| PreflightError::MissingExecutable(self.dump_program.to_string()))?;
        log::debug!(target: "preflight", "Using {}", executable.display());

        check_output_dir(self.output_dir)?;
        log::debug!(target: "preflight", "Output directory {} is writable", self.output_dir.display());

        check_credentials(self.credentials_file)?;
        log::debug!(target: "preflight", "Credentials file {} is readable", self.credentials_file.display());

        Ok(executable)
    }
}

/// Resolves `program` like a shell would.
///
/// Names containing a `/` are checked as given, bare names are searched in
/// `search_path`.
pub fn find_executable(program: &str, search_path: Option<&OsStr>) -> Option<PathBuf> {
    if program.is_empty() {
        return None;
    }

    if program.contains('/') {
        let path = PathBuf::from(program);
        return is_executable(&path).then_some(path);
    }

    env::split_paths(search_path?)
        .filter(|dir| !dir.as_os_str().is_empty())
        .map(|dir| dir.join(program))
        .find(|candidate| is_executable(candidate))
}

fn is_executable(path: &Path) -> bool {
    fs::metadata(path).is_ok_and(|meta| meta.is_file() && meta.permissions().mode() & 0o111 != 0)
}

/// The output directory must exist and accept new files.
///
/// Writability is tested by creating (and removing) a hidden file, permission
/// bits alone don't tell for root or ACLs.
pub fn check_output_dir(dir: &Path) -> Result<(), PreflightError> {
    if !dir.is_dir() {
        return Err(PreflightError::MissingOutputDir(dir.to_path_buf()));
    }

    tempfile::Builder::new()
        .prefix(".gnucash_backup-write-test-")
        .tempfile_in(dir)
        .map(drop)
        .map_err(|source| PreflightError::OutputDirNotWritable {
            path: dir.to_path_buf(),
            source,
        })
}

/// The credentials file must be a regular, readable file. Its content is pg_dump's business.
pub fn check_credentials(path: &Path) -> Result<(), PreflightError> {
    let unreadable = |source| PreflightError::CredentialsUnreadable {
        path: path.to_path_buf(),
        source,
    };

    let meta = fs::metadata(path).map_err(unreadable)?;
    if !meta.is_file() {
        return Err(unreadable(io::Error::other("not a regular file")));
    }
    File::open(path).map(drop).map_err(unreadable)
}

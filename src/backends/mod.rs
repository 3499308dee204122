//! Backend modules performing the database dump.
//!
//! Currently the following backend is implemented:
//!
//! - [PgDump]: Custom format dump of the GnuCash PostgreSQL database.
//!
//! The external process is hidden behind [DumpRunner], so the backend can be
//! driven by a fake dump tool.

pub mod in_flight;
pub mod pg_dump;
pub mod runner;

use std::path::PathBuf;

pub use in_flight::InFlightDump;
pub use pg_dump::{BackupError, PgDump};
pub use runner::{DumpCommand, DumpOutcome, DumpRunner, ProcessRunner};

/// Generic backup backend.
pub trait Backup {
    /// Error that may happen on backup.
    type Error;

    /// Creates a new backup and returns its path.
    ///
    /// # Dry Run
    ///
    /// On a dry run (`dry_run=true`) no files are created and no external
    /// tool is run. The returned path is the one a real run would have used.
    fn backup(&self, dry_run: bool) -> Result<PathBuf, Self::Error>;
}

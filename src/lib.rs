//! Library to backup a [GnuCash] PostgreSQL database.
//!
//! A run takes an exclusive lock so no two backups overlap, checks the
//! environment, dumps the database with `pg_dump` into a timestamped file and
//! finally removes all but the newest dumps. See [`pipeline::run`].
//!
//! [GnuCash]: https://gnucash.org/

#![forbid(unsafe_code)]

pub mod backends;
pub mod cli;
pub mod config;
pub mod lock;
pub mod logging;
pub mod pipeline;
pub mod preflight;
pub mod shutdown;
pub mod util;

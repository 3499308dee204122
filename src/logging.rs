//! Logging to the console and to a log file at the same time.
//!
//! The console sink is a regular [env_logger] logger, so `RUST_LOG` keeps
//! working. Every record that passes its filter is also appended to the log
//! file. Both sinks use the same line format:
//!
//! ```text
//! 2025-01-07 03:15:00 [INFO] Finished database dump: /backups/gnucash_20250107-031500.dump
//! ```

use std::fmt;
use std::fs::{File, OpenOptions};
use std::io::{self, LineWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::{DateTime, Local};
use env_logger::Env;
use log::{Level, LevelFilter, Log, Metadata, Record, SetLoggerError};

use crate::util::{clock, identity};

/// Log file used when running as root.
pub const PRIVILEGED_LOG_FILE: &str = "/var/log/gnucash_backup.log";

/// Log file used by everyone else.
pub const UNPRIVILEGED_LOG_FILE: &str = "/tmp/gnucash_backup.log";

/// Environment variable overriding the log file location.
pub const LOG_FILE_ENV: &str = "GNUCASH_BACKUP_LOG_FILE";

pub fn default_log_file() -> PathBuf {
    if identity::is_privileged() {
        PRIVILEGED_LOG_FILE.into()
    } else {
        UNPRIVILEGED_LOG_FILE.into()
    }
}

pub fn format_line(time: &DateTime<Local>, level: Level, args: &fmt::Arguments<'_>) -> String {
    format!("{} [{level}] {args}", clock::log_timestamp(time))
}

/// [Log] implementation writing to the console and a file.
pub struct DualLogger {
    console: env_logger::Logger,
    file: Option<Mutex<LineWriter<File>>>,
}

impl DualLogger {
    pub fn new(console: env_logger::Logger, file: Option<File>) -> Self {
        Self {
            console,
            file: file.map(|file| Mutex::new(LineWriter::new(file))),
        }
    }

    pub fn filter(&self) -> LevelFilter {
        self.console.filter()
    }
}

impl Log for DualLogger {
    fn enabled(&self, metadata: &Metadata<'_>) -> bool {
        self.console.enabled(metadata)
    }

    fn log(&self, record: &Record<'_>) {
        if !self.console.matches(record) {
            return;
        }
        self.console.log(record);

        if let Some(file) = &self.file {
            let line = format_line(&clock::now(), record.level(), record.args());
            let mut file = match file.lock() {
                Ok(file) => file,
                Err(poisoned) => poisoned.into_inner(),
            };
            // a full disk must not take the backup down with it
            let _ = writeln!(file, "{line}");
        }
    }

    fn flush(&self) {
        self.console.flush();
        if let Some(file) = &self.file {
            if let Ok(mut file) = file.lock() {
                let _ = file.flush();
            }
        }
    }
}

fn open_log_file(path: &Path) -> io::Result<File> {
    OpenOptions::new().create(true).append(true).open(path)
}

fn console_logger(verbose: Option<LevelFilter>) -> env_logger::Logger {
    let mut builder = env_logger::Builder::from_env(Env::default().default_filter_or("info"));
    if let Some(level) = verbose {
        builder.filter_level(level);
    }
    builder.format(|buf, record| {
        writeln!(
            buf,
            "{}",
            format_line(&clock::now(), record.level(), record.args())
        )
    });

    builder.build()
}

/// Installs the [DualLogger] as global logger.
///
/// If `log_file` can't be opened, a warning is logged and only the console is used.
pub fn init(verbose: Option<LevelFilter>, log_file: &Path) -> Result<(), SetLoggerError> {
    let console = console_logger(verbose);
    let (file, file_error) = match open_log_file(log_file) {
        Ok(file) => (Some(file), None),
        Err(e) => (None, Some(e)),
    };

    let logger = DualLogger::new(console, file);
    let max_level = logger.filter();
    log::set_boxed_logger(Box::new(logger))?;
    log::set_max_level(max_level);

    if let Some(e) = file_error {
        log::warn!(
            target: "logging",
            "Unable to open log file {}: {e}. Logging to console only",
            log_file.display()
        );
    }

    Ok(())
}

use std::env;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::error::ErrorKind;
use clap::Parser;
use log::LevelFilter;

use gnucash_backup_lib::backends::ProcessRunner;
use gnucash_backup_lib::cli::Cli;
use gnucash_backup_lib::config::BackupConfig;
use gnucash_backup_lib::logging::{self, LOG_FILE_ENV};
use gnucash_backup_lib::pipeline::{self, RunError, EXIT_FAILURE};

fn init_logger(verbose: Option<LevelFilter>, log_file: &Path) {
    if let Err(e) = logging::init(verbose, log_file) {
        eprintln!("Logger setup failed: {e}");
    }
}

fn main() -> ExitCode {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) if matches!(e.kind(), ErrorKind::DisplayHelp | ErrorKind::DisplayVersion) => {
            // help and version never touch the lock or the database
            let _ = e.print();
            return ExitCode::SUCCESS;
        }
        Err(e) => {
            let log_file = env::var_os(LOG_FILE_ENV)
                .map(PathBuf::from)
                .unwrap_or_else(logging::default_log_file);
            init_logger(None, &log_file);
            log::error!(target: "cli", "{}", e.to_string().trim_end());
            return ExitCode::from(EXIT_FAILURE);
        }
    };

    init_logger(cli.verbose, &cli.log_file());

    let result = BackupConfig::from_cli(&cli)
        .map_err(RunError::from)
        .and_then(|config| pipeline::run(&config, &ProcessRunner));

    let exit_code = match result {
        Ok(summary) => {
            log::info!(
                "Backup finished: {} ({} old backup(s) removed)",
                summary.dump_file.display(),
                summary.pruned.removed.len()
            );
            ExitCode::SUCCESS
        }
        Err(e) => {
            log::error!("{e}");
            ExitCode::from(EXIT_FAILURE)
        }
    };

    log::logger().flush();
    exit_code
}

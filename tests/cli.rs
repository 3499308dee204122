//! End to end runs of the `gnucash_backup` binary against a fake `pg_dump`.
//!
//! Every test gets its own `PATH`, `HOME`, lock file and log file, so the
//! tests neither need PostgreSQL nor interfere with each other.

use std::env;
use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::process::{self, Stdio};
use std::thread;
use std::time::{Duration, Instant};

use assert_cmd::Command;
use gnucash_backup_lib::lock::LockFile;
use predicates::prelude::*;
use tempfile::TempDir;

/// Writes its arguments next to itself and creates the `--file` like pg_dump.
const WORKING_PG_DUMP: &str = r#"#!/bin/sh
echo "$@" > "${0%/*}/invocation"
for arg in "$@"; do
  case "$arg" in
    --file=*) printf 'PGDMP' > "${arg#--file=}" ;;
  esac
done
"#;

const FAILING_PG_DUMP: &str = r#"#!/bin/sh
echo "$@" > "${0%/*}/invocation"
echo 'pg_dump: error: connection to server at "127.0.0.1", port 5432 failed' >&2
exit 1
"#;

/// Starts writing the `--file` and then hangs mid-dump.
const HANGING_PG_DUMP: &str = r#"#!/bin/sh
for arg in "$@"; do
  case "$arg" in
    --file=*) printf 'PGD' > "${arg#--file=}" ;;
  esac
done
echo $$ > "${0%/*}/pid"
echo "$@" > "${0%/*}/invocation"
exec sleep 10
"#;

struct Sandbox {
    root: TempDir,
}

impl Sandbox {
    fn new() -> Self {
        let root = tempfile::tempdir().unwrap();
        for dir in ["bin", "home", "backups"] {
            fs::create_dir(root.path().join(dir)).unwrap();
        }
        fs::write(
            root.path().join("home/.pgpass"),
            "127.0.0.1:5432:gnucash_db:gnucash_user:secret\n",
        )
        .unwrap();

        Self { root }
    }

    fn path(&self, rel: &str) -> PathBuf {
        self.root.path().join(rel)
    }

    fn backups(&self) -> PathBuf {
        self.path("backups")
    }

    fn lock_file(&self) -> PathBuf {
        self.path("gnucash_backup.lock")
    }

    fn invocation(&self) -> PathBuf {
        self.path("bin/invocation")
    }

    fn install_pg_dump(&self, script: &str) {
        let pg_dump = self.path("bin/pg_dump");
        fs::write(&pg_dump, script).unwrap();
        fs::set_permissions(&pg_dump, fs::Permissions::from_mode(0o755)).unwrap();
    }

    fn old_backups(&self) {
        for day in 1..=7 {
            fs::write(
                self.backups().join(format!("gnucash_2025010{day}-000000.dump")),
                b"PGDMP",
            )
            .unwrap();
        }
    }

    fn command(&self) -> Command {
        let mut cmd = Command::new(env!("CARGO_BIN_EXE_gnucash_backup"));
        cmd.env_clear()
            .env("PATH", self.path("bin"))
            .env("HOME", self.path("home"))
            .env("GNUCASH_BACKUP_LOCK_FILE", self.lock_file())
            .env("GNUCASH_BACKUP_LOG_FILE", self.path("gnucash_backup.log"));
        cmd
    }
}

fn file_names(dir: &Path) -> Vec<String> {
    let mut names: Vec<_> = fs::read_dir(dir)
        .unwrap()
        .map(|entry| entry.unwrap().file_name().into_string().unwrap())
        .collect();
    names.sort();
    names
}

#[test]
fn help_has_no_side_effects() {
    let sandbox = Sandbox::new();
    sandbox.install_pg_dump(WORKING_PG_DUMP);

    sandbox
        .command()
        .arg("-o")
        .arg(sandbox.backups())
        .args(["-k", "3", "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("--output-dir"))
        .stdout(predicate::str::contains("--keep"));

    assert!(!sandbox.lock_file().exists());
    assert!(!sandbox.invocation().exists());
    assert!(file_names(&sandbox.backups()).is_empty());
}

#[test]
fn version_flag() {
    let sandbox = Sandbox::new();

    sandbox
        .command()
        .arg("-v")
        .assert()
        .success()
        .stdout(predicate::str::contains(env!("CARGO_PKG_VERSION")));

    assert!(!sandbox.lock_file().exists());
}

#[test]
fn backup_then_prune() {
    let sandbox = Sandbox::new();
    sandbox.install_pg_dump(WORKING_PG_DUMP);
    sandbox.old_backups();
    fs::write(sandbox.backups().join("notes.txt"), "restore with pg_restore").unwrap();

    sandbox
        .command()
        .arg("-o")
        .arg(sandbox.backups())
        .args(["-k", "5"])
        .assert()
        .success();

    let names = file_names(&sandbox.backups());
    assert_eq!(names.len(), 6, "{names:?}");
    assert!(names.contains(&"notes.txt".to_string()));
    assert!(!names.contains(&"gnucash_20250101-000000.dump".to_string()));
    assert!(!names.contains(&"gnucash_20250102-000000.dump".to_string()));
    assert!(!names.contains(&"gnucash_20250103-000000.dump".to_string()));
    assert!(names.contains(&"gnucash_20250104-000000.dump".to_string()));

    let invocation = fs::read_to_string(sandbox.invocation()).unwrap();
    assert!(invocation.contains("--host=127.0.0.1"));
    assert!(invocation.contains("--port=5432"));
    assert!(invocation.contains("--username=gnucash_user"));
    assert!(invocation.contains("--format=custom"));
    assert!(invocation.trim_end().ends_with("gnucash_db"));

    let log = fs::read_to_string(sandbox.path("gnucash_backup.log")).unwrap();
    assert!(log.contains("[INFO] Finished database dump"), "{log}");
    assert!(!sandbox.lock_file().exists());
}

#[test]
fn connection_settings_are_passed_on() {
    let sandbox = Sandbox::new();
    sandbox.install_pg_dump(WORKING_PG_DUMP);

    sandbox
        .command()
        .args(["-d", "books", "-H", "db.local", "-p", "5433", "-u", "alice", "-o"])
        .arg(sandbox.backups())
        .assert()
        .success();

    let invocation = fs::read_to_string(sandbox.invocation()).unwrap();
    assert!(invocation.contains("--host=db.local"));
    assert!(invocation.contains("--port=5433"));
    assert!(invocation.contains("--username=alice"));
    assert!(invocation.trim_end().ends_with("books"));
}

#[test]
fn failed_dump_keeps_old_backups() {
    let sandbox = Sandbox::new();
    sandbox.install_pg_dump(FAILING_PG_DUMP);
    sandbox.old_backups();

    sandbox
        .command()
        .arg("-o")
        .arg(sandbox.backups())
        .args(["-k", "2"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("connection to server"));

    assert_eq!(file_names(&sandbox.backups()).len(), 7);
    assert!(!sandbox.lock_file().exists());
}

#[test]
fn missing_output_dir_fails_before_dump() {
    let sandbox = Sandbox::new();
    sandbox.install_pg_dump(WORKING_PG_DUMP);

    sandbox
        .command()
        .arg("-o")
        .arg(sandbox.path("missing"))
        .assert()
        .code(1)
        .stderr(predicate::str::contains("Output directory"));

    assert!(!sandbox.invocation().exists());
}

#[test]
fn output_dir_is_required() {
    let sandbox = Sandbox::new();
    sandbox.install_pg_dump(WORKING_PG_DUMP);

    sandbox
        .command()
        .assert()
        .code(1)
        .stderr(predicate::str::contains("--output-dir"));

    assert!(!sandbox.invocation().exists());
}

#[test]
fn zero_keep_is_rejected() {
    let sandbox = Sandbox::new();
    sandbox.install_pg_dump(WORKING_PG_DUMP);

    sandbox
        .command()
        .arg("-o")
        .arg(sandbox.backups())
        .args(["-k", "0"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("--keep"));

    assert!(!sandbox.invocation().exists());
    assert!(!sandbox.lock_file().exists());
}

#[test]
fn concurrent_run_is_rejected() {
    let sandbox = Sandbox::new();
    sandbox.install_pg_dump(WORKING_PG_DUMP);
    let _running = LockFile::acquire(sandbox.lock_file()).unwrap();

    sandbox
        .command()
        .arg("-o")
        .arg(sandbox.backups())
        .assert()
        .code(1)
        .stderr(predicate::str::contains("already running"));

    assert!(!sandbox.invocation().exists());
}

#[test]
fn missing_pg_dump_is_reported() {
    let sandbox = Sandbox::new();

    sandbox
        .command()
        .arg("-o")
        .arg(sandbox.backups())
        .assert()
        .code(1)
        .stderr(predicate::str::contains("'pg_dump' not found"));
}

#[test]
fn missing_credentials_are_reported() {
    let sandbox = Sandbox::new();
    sandbox.install_pg_dump(WORKING_PG_DUMP);
    fs::remove_file(sandbox.path("home/.pgpass")).unwrap();

    sandbox
        .command()
        .arg("-o")
        .arg(sandbox.backups())
        .assert()
        .code(1)
        .stderr(predicate::str::contains(".pgpass"));

    assert!(!sandbox.invocation().exists());
}

#[test]
fn config_file_provides_defaults() {
    let sandbox = Sandbox::new();
    sandbox.install_pg_dump(WORKING_PG_DUMP);
    sandbox.old_backups();
    let config = sandbox.path("gnucash_backup.toml");
    fs::write(
        &config,
        format!(
            "[database]\nname = \"books\"\n\n[backup]\noutput_dir = {:?}\nkeep = 1\n",
            sandbox.backups()
        ),
    )
    .unwrap();

    sandbox.command().arg("-c").arg(&config).assert().success();

    let names = file_names(&sandbox.backups());
    assert_eq!(names.len(), 1);
    assert!(names[0].starts_with("gnucash_2"));
    let invocation = fs::read_to_string(sandbox.invocation()).unwrap();
    assert!(invocation.trim_end().ends_with("books"));
}

#[test]
fn dry_run_changes_nothing() {
    let sandbox = Sandbox::new();
    sandbox.install_pg_dump(WORKING_PG_DUMP);
    sandbox.old_backups();

    sandbox
        .command()
        .arg("-o")
        .arg(sandbox.backups())
        .args(["-k", "1", "--dry-run"])
        .assert()
        .success()
        .stderr(predicate::str::contains("Would remove"));

    assert_eq!(file_names(&sandbox.backups()).len(), 7);
    assert!(!sandbox.invocation().exists());
}

#[test]
fn termination_signal_aborts_dump_and_releases_lock() {
    let sandbox = Sandbox::new();
    sandbox.install_pg_dump(HANGING_PG_DUMP);
    // the fake needs `sleep` from the real PATH
    let path = env::join_paths(
        [sandbox.path("bin")]
            .into_iter()
            .chain(env::split_paths(&env::var_os("PATH").unwrap_or_default())),
    )
    .unwrap();

    let mut child = process::Command::new(env!("CARGO_BIN_EXE_gnucash_backup"))
        .env_clear()
        .env("PATH", path)
        .env("HOME", sandbox.path("home"))
        .env("GNUCASH_BACKUP_LOCK_FILE", sandbox.lock_file())
        .env("GNUCASH_BACKUP_LOG_FILE", sandbox.path("gnucash_backup.log"))
        .arg("-o")
        .arg(sandbox.backups())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()
        .unwrap();

    let deadline = Instant::now() + Duration::from_secs(10);
    while !sandbox.invocation().exists() {
        assert!(Instant::now() < deadline, "pg_dump was never started");
        thread::sleep(Duration::from_millis(20));
    }
    // give the run time to take over the started process
    thread::sleep(Duration::from_millis(200));
    assert!(sandbox.lock_file().exists());
    assert_eq!(file_names(&sandbox.backups()).len(), 1);
    let pg_dump_pid = fs::read_to_string(sandbox.path("bin/pid")).unwrap();

    let killed = process::Command::new("sh")
        .arg("-c")
        .arg(format!("kill -TERM {}", child.id()))
        .status()
        .unwrap();
    assert!(killed.success());

    let status = child.wait().unwrap();
    assert_eq!(status.code(), Some(1));
    assert!(!sandbox.lock_file().exists());
    // the incomplete dump is gone and pg_dump was killed and reaped
    assert!(file_names(&sandbox.backups()).is_empty());
    assert!(!Path::new(&format!("/proc/{}", pg_dump_pid.trim())).exists());
}

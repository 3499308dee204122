//! Naming convention of backup artifacts: `gnucash_<YYYYMMDD>-<HHMMSS>.dump`.

use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use chrono::{DateTime, Local};
use regex::Regex;

use crate::util::clock;

pub const ARTIFACT_PREFIX: &str = "gnucash_";
pub const ARTIFACT_EXTENSION: &str = "dump";

static ARTIFACT_NAME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^gnucash_[0-9]{8}-[0-9]{6}\.dump$").expect("artifact name pattern should compile")
});

/// File name of the artifact created at `time`.
pub fn artifact_name(time: &DateTime<Local>) -> String {
    format!(
        "{ARTIFACT_PREFIX}{}.{ARTIFACT_EXTENSION}",
        clock::artifact_tag(time)
    )
}

/// Path of the artifact created at `time` inside `dir`.
pub fn artifact_path(dir: &Path, time: &DateTime<Local>) -> PathBuf {
    dir.join(artifact_name(time))
}

/// Returns if `name` is exactly an artifact name. Substrings don't count.
pub fn is_artifact_name(name: &str) -> bool {
    ARTIFACT_NAME.is_match(name)
}

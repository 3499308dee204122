//! Count based retention of backup artifacts.

use std::fs::{self, DirEntry};
use std::io;
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};

use crate::util::artifact;

/// Outcome of a single [Retention::prune] run.
#[derive(Debug, Default)]
pub struct PruneReport {
    /// Artifacts that are retained, oldest first.
    pub kept: Vec<PathBuf>,
    /// Artifacts that were removed (or would have been on a dry run).
    pub removed: Vec<PathBuf>,
    /// Artifacts that should have been removed but couldn't be.
    pub failed: Vec<(PathBuf, io::Error)>,
}

impl PruneReport {
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Keeps the newest `keep` backup artifacts of a directory.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Retention {
    keep: NonZeroUsize,
}

impl Retention {
    pub fn new(keep: NonZeroUsize) -> Self {
        Self { keep }
    }

    pub fn keep(&self) -> usize {
        self.keep.get()
    }

    /// Splits artifact names into `(expired, kept)`.
    ///
    /// Names are sorted ascending first, the newest `keep` names are kept.
    pub fn partition(&self, mut names: Vec<String>) -> (Vec<String>, Vec<String>) {
        names.sort();
        let excess = names.len().saturating_sub(self.keep());
        let kept = names.split_off(excess);

        (names, kept)
    }

    /// Removes all but the newest `keep` artifacts from `dir`.
    ///
    /// Pruning is best effort: a failing removal is logged and recorded in the
    /// report, the remaining candidates are still processed. Files not named
    /// like an artifact are never touched.
    pub fn prune(&self, dir: &Path, dry_run: bool) -> PruneReport {
        match artifact_names(dir) {
            Ok(names) => self.prune_names(dir, names, dry_run),
            Err(e) => {
                log::error!(target: "retention", "Listing backups in {} failed: {e}", dir.display());
                PruneReport::default()
            }
        }
    }

    /// Like [Retention::prune], counting `pending` as present.
    ///
    /// A dry run creates no dump, so the one it would have written is passed
    /// here to report the same removals as a real run.
    pub fn prune_with_pending(&self, dir: &Path, pending: &Path, dry_run: bool) -> PruneReport {
        let mut names = match artifact_names(dir) {
            Ok(names) => names,
            Err(e) => {
                log::error!(target: "retention", "Listing backups in {} failed: {e}", dir.display());
                return PruneReport::default();
            }
        };

        let pending_name = pending
            .file_name()
            .and_then(|name| name.to_str())
            .filter(|name| pending.parent() == Some(dir) && artifact::is_artifact_name(name));
        if let Some(name) = pending_name {
            if !names.iter().any(|existing| existing == name) {
                names.push(name.to_string());
            }
        }

        self.prune_names(dir, names, dry_run)
    }

    fn prune_names(&self, dir: &Path, names: Vec<String>, dry_run: bool) -> PruneReport {
        let (expired, kept) = self.partition(names);
        log::debug!(
            target: "retention",
            "Found {} backup(s) in {}, keeping {}",
            expired.len() + kept.len(),
            dir.display(),
            self.keep()
        );

        let expired = expired.into_iter().map(|name| dir.join(name)).collect();
        let (removed, failed) = remove_all(expired, dry_run);

        PruneReport {
            kept: kept.into_iter().map(|name| dir.join(name)).collect(),
            removed,
            failed,
        }
    }
}

/// Names of all regular files in `dir` that are named like an artifact.
///
/// A missing directory has no artifacts.
pub fn artifact_names(dir: &Path) -> io::Result<Vec<String>> {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e),
    };

    Ok(names_of_artifacts(dir, entries))
}

/// Unreadable entries are skipped, they are never pruned.
fn names_of_artifacts(
    dir: &Path,
    entries: impl IntoIterator<Item = io::Result<DirEntry>>,
) -> Vec<String> {
    let mut names = Vec::new();
    for entry in entries {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                log::warn!(target: "retention", "Skipping unreadable entry in {}: {e}", dir.display());
                continue;
            }
        };
        match entry.file_type() {
            Ok(file_type) if file_type.is_file() => {}
            Ok(_) => continue,
            Err(e) => {
                log::warn!(target: "retention", "Skipping {}: {e}", entry.path().display());
                continue;
            }
        }

        // non UTF-8 names can't match the pattern anyway
        if let Some(name) = entry.file_name().to_str() {
            if artifact::is_artifact_name(name) {
                names.push(name.to_string());
            }
        }
    }

    names
}

fn remove_all(paths: Vec<PathBuf>, dry_run: bool) -> (Vec<PathBuf>, Vec<(PathBuf, io::Error)>) {
    let mut removed = Vec::new();
    let mut failed = Vec::new();

    for path in paths {
        if dry_run {
            log::info!(target: "retention", "Would remove old backup: {}", path.display());
            removed.push(path);
            continue;
        }

        match fs::remove_file(&path) {
            Ok(()) => {
                log::info!(target: "retention", "Removed old backup: {}", path.display());
                removed.push(path);
            }
            Err(e) => {
                log::error!(target: "retention", "Removing old backup {} failed: {e}", path.display());
                failed.push((path, e));
            }
        }
    }

    (removed, failed)
}

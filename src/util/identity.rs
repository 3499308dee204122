//! Who is running the backup.

use std::env;
use std::fs;
use std::os::unix::fs::MetadataExt;

/// Effective user id of the current process.
///
/// `/proc/self` is owned by the effective uid of the process reading it.
/// Returns [None] if procfs is unavailable.
pub fn effective_uid() -> Option<u32> {
    fs::metadata("/proc/self").ok().map(|meta| meta.uid())
}

/// Whether the process runs with root privileges.
pub fn is_privileged() -> bool {
    effective_uid() == Some(0)
}

/// Name of the process owner for log output.
pub fn user_name() -> String {
    env::var("USER")
        .or_else(|_| env::var("LOGNAME"))
        .ok()
        .filter(|name| !name.is_empty())
        .unwrap_or_else(|| match effective_uid() {
            Some(uid) => format!("uid {uid}"),
            None => "unknown".to_string(),
        })
}

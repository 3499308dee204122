use chrono::{DateTime, Local};

/// Timestamp format of log lines, e.g. `2025-01-07 03:15:00`.
pub const LOG_TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Fixed width timestamp embedded in backup artifact names, e.g. `20250107-031500`.
pub const ARTIFACT_TIMESTAMP_FORMAT: &str = "%Y%m%d-%H%M%S";

pub fn now() -> DateTime<Local> {
    Local::now()
}

pub fn log_timestamp(time: &DateTime<Local>) -> String {
    time.format(LOG_TIMESTAMP_FORMAT).to_string()
}

/// Second resolution tag used to order backup artifacts.
///
/// Zero padded and fixed width, so the lexicographic order of two tags equals
/// their chronological order.
///
/// # Limitations
///
/// The tag is local wall clock time without an offset. When the clock is
/// turned back (end of daylight saving time) a dump can get a smaller tag
/// than one written in the repeated hour before it, and is then pruned as
/// the older one. Avoid scheduling backups in that hour, or run the tool
/// with `TZ=UTC`.
pub fn artifact_tag(time: &DateTime<Local>) -> String {
    time.format(ARTIFACT_TIMESTAMP_FORMAT).to_string()
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    #[test]
    fn tags_are_zero_padded() {
        let time = Local.with_ymd_and_hms(2025, 1, 7, 3, 5, 9).unwrap();

        assert_eq!(artifact_tag(&time), "20250107-030509");
        assert_eq!(log_timestamp(&time), "2025-01-07 03:05:09");
    }

    #[test]
    fn tag_order_is_chronological() {
        let earlier = Local.with_ymd_and_hms(2024, 12, 31, 23, 59, 59).unwrap();
        let later = Local.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap();

        assert!(artifact_tag(&earlier) < artifact_tag(&later));
    }

    #[test]
    fn tag_is_local_wall_clock_without_offset() {
        let time = Local.with_ymd_and_hms(2025, 10, 26, 2, 30, 0).earliest().unwrap();

        assert_eq!(
            artifact_tag(&time),
            time.naive_local().format("%Y%m%d-%H%M%S").to_string()
        );
        assert_eq!(artifact_tag(&time), "20251026-023000");
    }
}

use chrono::{DateTime, Local};

/// Format used for timestamps shown to users
pub const TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Splits `haystack` at the first occurrence of `needle`, returning None if no needle was found
pub fn split_first(haystack: &[u8], needle: u8) -> Option<(&[u8], &[u8])> {
    let index = haystack.iter().position(|&c| c == needle)?;
    let (key, rest) = haystack.split_at(index);

    Some((key, &rest[1..]))
}

/// Converts seconds since the epoch to local time; Slurm reports unset times as zero
pub fn local_time(timestamp: i64) -> Option<DateTime<Local>> {
    if timestamp <= 0 {
        return None;
    }

    DateTime::from_timestamp(timestamp, 0).map(|utc| utc.with_timezone(&Local))
}

pub fn format_time(time: &DateTime<Local>) -> String {
    time.format(TIME_FORMAT).to_string()
}

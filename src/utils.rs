// Helper functions.

use chrono::{DateTime, Utc};

/// Shorten `string_to_truncate` to `max_length` characters, ending in `...`
/// when anything was cut.
pub(crate) fn truncate_string(mut string_to_truncate: String, max_length: usize) -> String {
    if string_to_truncate.chars().count() > max_length {
        let truncated_length = max_length.saturating_sub(3);
        string_to_truncate = string_to_truncate
            .chars()
            .take(truncated_length)
            .collect::<String>()
            + "...";
    }
    string_to_truncate
}

pub(crate) fn format_timestamp(timestamp: &DateTime<Utc>) -> String {
    timestamp.format("%Y-%m-%d %H:%M:%S").to_string()
}

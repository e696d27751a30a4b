//! Shared utility functions used across the codebase.

use chrono::{DateTime, SecondsFormat, Utc};

/// Parse a configuration value as a boolean.
///
/// Recognises `1`, `true`, `yes`, `y`, `on` (case-insensitive) as `true`;
/// everything else maps to `false`.
pub fn parse_bool(value: &str) -> bool {
    matches!(
        value.trim().to_lowercase().as_str(),
        "1" | "true" | "yes" | "y" | "on"
    )
}

/// Format a timestamp as fixed-width RFC3339 (microseconds, `Z` suffix).
///
/// Fixed width keeps lexicographic order equal to chronological order, which
/// the SQLite store relies on for `ORDER BY created_at`.
pub fn timestamp_string(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Truncate a timestamp to the precision `timestamp_string` keeps.
pub fn truncate_to_micros(ts: DateTime<Utc>) -> DateTime<Utc> {
    DateTime::from_timestamp_micros(ts.timestamp_micros()).unwrap_or(ts)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_bool_accepts_common_truthy_values() {
        for value in ["1", "true", "YES", " y ", "On"] {
            assert!(parse_bool(value), "{value} should be truthy");
        }
        for value in ["0", "false", "off", ""] {
            assert!(!parse_bool(value), "{value} should be falsy");
        }
    }

    #[test]
    fn timestamp_strings_sort_chronologically() {
        let earlier = DateTime::from_timestamp(1_700_000_000, 5_000).unwrap();
        let later = DateTime::from_timestamp(1_700_000_000, 120_000_000).unwrap();
        assert!(timestamp_string(earlier) < timestamp_string(later));
        assert_eq!(timestamp_string(earlier), "2023-11-14T22:13:20.000005Z");
    }

    #[test]
    fn truncation_round_trips_through_string_form() {
        let now = truncate_to_micros(Utc::now());
        let parsed: DateTime<Utc> = timestamp_string(now).parse().unwrap();
        assert_eq!(parsed, now);
    }
}

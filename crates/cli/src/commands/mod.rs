//! Subcommand implementations

pub mod agent;
pub mod memory;
pub mod series;

use chrono::{DateTime, Utc};
use thiserror::Error;

/// Invalid command-line input
#[derive(Debug, Error)]
pub enum InputError {
    #[error("invalid timestamp '{value}': expected RFC 3339 (e.g. 2024-06-15T12:00:00Z)")]
    InvalidTimestamp { value: String },

    #[error("unknown metric '{0}'")]
    UnknownMetric(String),

    #[error("{0}")]
    Invalid(String),
}

/// Parse an RFC 3339 timestamp argument
pub fn parse_timestamp(value: &str) -> Result<DateTime<Utc>, InputError> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|_| InputError::InvalidTimestamp {
            value: value.to_string(),
        })
}

/// Reference time from an optional argument, defaulting to now
pub fn reference_time(now: Option<&str>) -> Result<DateTime<Utc>, InputError> {
    now.map(parse_timestamp).unwrap_or_else(|| Ok(Utc::now()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_parse_timestamp() {
        assert_eq!(
            parse_timestamp("2024-06-15T14:00:00+02:00").unwrap(),
            Utc.with_ymd_and_hms(2024, 6, 15, 12, 0, 0).unwrap()
        );
        assert!(matches!(
            parse_timestamp("yesterday"),
            Err(InputError::InvalidTimestamp { .. })
        ));
    }
}

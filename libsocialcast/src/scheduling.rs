//! Parsing of human-entered schedule strings
//!
//! Accepted forms, tried in order:
//! - RFC 3339 instants: "2025-11-20T15:00:00Z"
//! - Relative durations: "30m", "2h", "1 day"
//! - Natural language: "tomorrow", "next friday 10am"
//!
//! All results are unix seconds.

use chrono::{DateTime, Utc};

use crate::error::{Result, SocialcastError};

/// Parse `input` relative to `now` (unix seconds)
///
/// # Errors
///
/// Returns `InvalidInput` if the string is empty or matches none of the
/// accepted forms.
pub fn parse_schedule(input: &str, now: i64) -> Result<i64> {
    let input = input.trim();
    if input.is_empty() {
        return Err(SocialcastError::InvalidInput(
            "Schedule string cannot be empty".to_string(),
        ));
    }

    if let Ok(instant) = DateTime::parse_from_rfc3339(input) {
        return Ok(instant.timestamp());
    }

    if let Some(offset) = parse_duration(input) {
        return Ok(now.saturating_add(offset));
    }

    let base = DateTime::<Utc>::from_timestamp(now, 0)
        .ok_or_else(|| SocialcastError::InvalidInput(format!("Invalid reference time: {}", now)))?;
    chrono_english::parse_date_string(input, base, chrono_english::Dialect::Us)
        .map(|dt| dt.timestamp())
        .map_err(|_| {
            SocialcastError::InvalidInput(format!("Could not parse schedule string: {}", input))
        })
}

/// Parse a schedule string against the current clock
pub fn parse_schedule_from_now(input: &str) -> Result<i64> {
    parse_schedule(input, Utc::now().timestamp())
}

/// Duration in seconds, if `input` is a humantime duration
fn parse_duration(input: &str) -> Option<i64> {
    humantime::parse_duration(input)
        .ok()
        .and_then(|d| i64::try_from(d.as_secs()).ok())
}

/// Render a unix timestamp for display
pub fn format_timestamp(timestamp: i64) -> String {
    DateTime::<Utc>::from_timestamp(timestamp, 0)
        .map(|dt| dt.format("%Y-%m-%d %H:%M:%S UTC").to_string())
        .unwrap_or_else(|| timestamp.to_string())
}

//! Time parsing and formatting utilities.

use crate::error::{LbError, Result};
use chrono::{DateTime, Duration, NaiveDate, NaiveTime, TimeZone, Utc};

/// Parse a flexible date specification into a `DateTime<Utc>`.
///
/// Supports:
/// - RFC3339: `2025-01-15T12:00:00Z`
/// - Simple date: `2025-01-15` (start of day, UTC)
/// - Relative past duration: `-7d`, `-12h`, `-30m`, `-2w`
///
/// # Errors
///
/// Returns a validation error for unrecognized formats or units.
pub fn parse_flexible_date(s: &str, field_name: &str) -> Result<DateTime<Utc>> {
    let s = s.trim();

    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Ok(dt.with_timezone(&Utc));
    }

    if let Ok(date) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
        let midnight = NaiveTime::from_hms_opt(0, 0, 0).unwrap();
        return Ok(Utc.from_utc_datetime(&date.and_time(midnight)));
    }

    if let Some(rest) = s.strip_prefix('-') {
        if let Some(unit_char) = rest.chars().last() {
            let amount_str = &rest[..rest.len() - 1];
            if let Ok(amount) = amount_str.parse::<i64>() {
                let duration = match unit_char {
                    'm' => Duration::minutes(amount),
                    'h' => Duration::hours(amount),
                    'd' => Duration::days(amount),
                    'w' => Duration::weeks(amount),
                    _ => {
                        return Err(LbError::validation(
                            field_name,
                            "invalid unit (use m, h, d, w)",
                        ));
                    }
                };
                return Ok(Utc::now() - duration);
            }
        }
    }

    Err(LbError::validation(
        field_name,
        format!("unrecognized date '{s}' (use RFC3339, YYYY-MM-DD, or -7d)"),
    ))
}

/// Render an age like `45s`, `3m`, `2h`, `5d` for cache-staleness notices.
#[must_use]
pub fn humanize_age(since: DateTime<Utc>) -> String {
    let secs = (Utc::now() - since).num_seconds().max(0);
    if secs < 60 {
        format!("{secs}s")
    } else if secs < 3600 {
        format!("{}m", secs / 60)
    } else if secs < 86400 {
        format!("{}h", secs / 3600)
    } else {
        format!("{}d", secs / 86400)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_rfc3339() {
        let dt = parse_flexible_date("2025-01-15T12:00:00Z", "since").unwrap();
        assert_eq!(dt.to_rfc3339(), "2025-01-15T12:00:00+00:00");
    }

    #[test]
    fn test_parse_simple_date() {
        let dt = parse_flexible_date("2025-01-15", "since").unwrap();
        assert_eq!(dt.format("%Y-%m-%d %H:%M").to_string(), "2025-01-15 00:00");
    }

    #[test]
    fn test_parse_relative() {
        let dt = parse_flexible_date("-7d", "since").unwrap();
        let delta = Utc::now() - dt;
        assert!((delta.num_days() - 7).abs() <= 1);
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(parse_flexible_date("next tuesday", "since").is_err());
        assert!(parse_flexible_date("-7y", "since").is_err());
    }

    #[test]
    fn test_humanize_age() {
        assert_eq!(humanize_age(Utc::now()), "0s");
        assert_eq!(humanize_age(Utc::now() - Duration::minutes(5)), "5m");
        assert_eq!(humanize_age(Utc::now() - Duration::hours(3)), "3h");
        assert_eq!(humanize_age(Utc::now() - Duration::days(2)), "2d");
    }
}

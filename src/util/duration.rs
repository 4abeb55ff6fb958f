//! Human-readable interval strings such as `30s`, `5m`, `1h30m`, `7d` or `1y`.
//!
//! The same grammar is used for cache lifetimes, repository check intervals and
//! external URL refresh intervals.

use std::time::Duration;

use thiserror::Error;

const SECOND: u64 = 1;
const MINUTE: u64 = 60 * SECOND;
const HOUR: u64 = 60 * MINUTE;
const DAY: u64 = 24 * HOUR;
const WEEK: u64 = 7 * DAY;
const YEAR: u64 = 365 * DAY;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum DurationParseError {
    #[error("duration is empty")]
    Empty,
    #[error("expected a number at `{0}`")]
    MissingNumber(String),
    #[error("missing unit after `{0}`")]
    MissingUnit(String),
    #[error("unknown unit `{0}`")]
    UnknownUnit(String),
    #[error("duration overflows")]
    Overflow,
}

/// Parse a duration made of one or more `<integer><unit>` segments.
///
/// Units: `ms`, `s`, `m`, `h`, `d`, `w`, `y` (a year is 365 days). Unit
/// letters are case-insensitive.
pub fn parse_duration(input: &str) -> Result<Duration, DurationParseError> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Err(DurationParseError::Empty);
    }

    let lowered = trimmed.to_ascii_lowercase();
    let mut rest = lowered.as_str();
    let mut total = Duration::ZERO;

    while !rest.is_empty() {
        let digits_end = rest
            .find(|c: char| !c.is_ascii_digit())
            .unwrap_or(rest.len());
        if digits_end == 0 {
            return Err(DurationParseError::MissingNumber(rest.to_string()));
        }
        let (digits, tail) = rest.split_at(digits_end);
        let value: u64 = digits.parse().map_err(|_| DurationParseError::Overflow)?;

        let unit_end = tail
            .find(|c: char| c.is_ascii_digit())
            .unwrap_or(tail.len());
        let (unit, next) = tail.split_at(unit_end);
        let segment = segment_duration(value, unit.trim(), digits)?;

        total = total
            .checked_add(segment)
            .ok_or(DurationParseError::Overflow)?;
        rest = next;
    }

    Ok(total)
}

/// Parse `input`, falling back to `default` when it is absent or malformed.
pub fn parse_duration_or(input: Option<&str>, default: Duration) -> Duration {
    input
        .and_then(|value| parse_duration(value).ok())
        .unwrap_or(default)
}

fn segment_duration(value: u64, unit: &str, digits: &str) -> Result<Duration, DurationParseError> {
    if unit == "ms" {
        return Ok(Duration::from_millis(value));
    }

    let scale = match unit {
        "" => return Err(DurationParseError::MissingUnit(digits.to_string())),
        "s" => SECOND,
        "m" => MINUTE,
        "h" => HOUR,
        "d" => DAY,
        "w" => WEEK,
        "y" => YEAR,
        other => return Err(DurationParseError::UnknownUnit(other.to_string())),
    };

    value
        .checked_mul(scale)
        .map(Duration::from_secs)
        .ok_or(DurationParseError::Overflow)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_single_units() {
        assert_eq!(parse_duration("30s"), Ok(Duration::from_secs(30)));
        assert_eq!(parse_duration("5m"), Ok(Duration::from_secs(300)));
        assert_eq!(parse_duration("1h"), Ok(Duration::from_secs(3600)));
        assert_eq!(parse_duration("7d"), Ok(Duration::from_secs(7 * 86_400)));
        assert_eq!(parse_duration("2w"), Ok(Duration::from_secs(14 * 86_400)));
        assert_eq!(parse_duration("1y"), Ok(Duration::from_secs(365 * 86_400)));
        assert_eq!(parse_duration("250ms"), Ok(Duration::from_millis(250)));
    }

    #[test]
    fn parses_compound_and_mixed_case() {
        assert_eq!(parse_duration("1h30m"), Ok(Duration::from_secs(5400)));
        assert_eq!(parse_duration(" 1D12H "), Ok(Duration::from_secs(129_600)));
    }

    #[test]
    fn rejects_malformed_input() {
        assert_eq!(parse_duration(""), Err(DurationParseError::Empty));
        assert_eq!(
            parse_duration("10"),
            Err(DurationParseError::MissingUnit("10".to_string()))
        );
        assert_eq!(
            parse_duration("h"),
            Err(DurationParseError::MissingNumber("h".to_string()))
        );
        assert_eq!(
            parse_duration("3fortnights"),
            Err(DurationParseError::UnknownUnit("fortnights".to_string()))
        );
        assert_eq!(
            parse_duration("99999999999999999999s"),
            Err(DurationParseError::Overflow)
        );
    }

    #[test]
    fn fallback_applies_to_missing_and_invalid_values() {
        let default = Duration::from_secs(600);
        assert_eq!(parse_duration_or(None, default), default);
        assert_eq!(parse_duration_or(Some("soon"), default), default);
        assert_eq!(
            parse_duration_or(Some("1m"), default),
            Duration::from_secs(60)
        );
    }
}

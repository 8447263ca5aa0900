//! Expiry duration parsing
//!
//! Accepts one or more `<number><unit>` groups, e.g. `"90s"`, `"1.5h"`,
//! `"1d12h"`. Units: `s`, `m`, `h`, `d`, `w`.

use chrono::Duration;
use pasta_core::AppError;

fn unit_seconds(unit: &str) -> Option<f64> {
    match unit {
        "s" => Some(1.0),
        "m" => Some(60.0),
        "h" => Some(3_600.0),
        "d" => Some(86_400.0),
        "w" => Some(604_800.0),
        _ => None,
    }
}

/// Parse a positive duration. Zero, negative or malformed input is `InvalidDuration`.
pub fn parse_duration(input: &str) -> Result<Duration, AppError> {
    let invalid = || AppError::InvalidDuration(format!("Invalid duration '{}'", input));
    let s = input.trim();
    if s.is_empty() {
        return Err(invalid());
    }

    let mut total_seconds = 0.0_f64;
    let mut rest = s;
    while !rest.is_empty() {
        let number_len = rest
            .find(|c: char| !(c.is_ascii_digit() || c == '.'))
            .ok_or_else(invalid)?;
        if number_len == 0 {
            return Err(invalid());
        }
        let value: f64 = rest[..number_len].parse().map_err(|_| invalid())?;
        rest = &rest[number_len..];

        let unit_len = rest
            .find(|c: char| c.is_ascii_digit() || c == '.')
            .unwrap_or(rest.len());
        let factor = unit_seconds(&rest[..unit_len]).ok_or_else(invalid)?;
        rest = &rest[unit_len..];

        total_seconds += value * factor;
    }

    // Upper bound keeps the value inside chrono's range.
    if !total_seconds.is_finite() || total_seconds < 1.0 || total_seconds > 1e12 {
        return Err(invalid());
    }
    Ok(Duration::milliseconds((total_seconds * 1000.0).round() as i64))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_units() {
        assert_eq!(parse_duration("90s").unwrap(), Duration::seconds(90));
        assert_eq!(parse_duration("24h").unwrap(), Duration::hours(24));
        assert_eq!(parse_duration("7d").unwrap(), Duration::days(7));
        assert_eq!(parse_duration("2w").unwrap(), Duration::weeks(2));
    }

    #[test]
    fn test_compound_and_decimal() {
        assert_eq!(parse_duration("1d12h").unwrap(), Duration::hours(36));
        assert_eq!(parse_duration("1.5h").unwrap(), Duration::minutes(90));
        assert_eq!(parse_duration(" 30m ").unwrap(), Duration::minutes(30));
    }

    #[test]
    fn test_rejects_malformed() {
        for input in ["", "h", "10", "10x", "-5m", "0s", "1..5h", "never", "5 m"] {
            let err = parse_duration(input).unwrap_err();
            assert!(
                matches!(err, AppError::InvalidDuration(_)),
                "{input:?} should be InvalidDuration"
            );
        }
    }
}

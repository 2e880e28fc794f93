//! Conversion between OFX wire text and typed scalar values.
//!
//! OFX leaves carry strings, booleans, integers, decimal amounts, and compact
//! timestamps. The conversions here are pure functions keyed by
//! [`ScalarKind`]; the reader and writer never interpret leaf text
//! themselves.
//!
//! Strict scalars (dates, amounts, booleans, integers) fail hard on
//! malformed input. Enumerations are deliberately different: domain types
//! store the raw wire string and derive the well-known value through a
//! `from_ofx` lookup that yields `None` for unknown tokens, because real
//! institutions routinely emit non-conformant enum values.

use chrono::{DateTime, Duration, NaiveDate, Utc};
use rust_decimal::Decimal;
use std::str::FromStr;
use thiserror::Error;

/// Failure to convert a single leaf value.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CoerceError {
    /// Invalid OFX date/time format.
    #[error("invalid OFX date/time: {0}")]
    InvalidDate(String),

    /// Invalid amount format.
    #[error("invalid amount: {0}")]
    InvalidAmount(String),

    /// Invalid boolean token (expected Y/N/T/F).
    #[error("invalid boolean: {0}")]
    InvalidBoolean(String),

    /// Invalid integer.
    #[error("invalid integer: {0}")]
    InvalidInteger(String),
}

/// The scalar types an element field can declare.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScalarKind {
    String,
    Boolean,
    Integer,
    Decimal,
    DateTime,
}

impl ScalarKind {
    /// Human-readable name used in error reporting.
    pub fn name(&self) -> &'static str {
        match self {
            ScalarKind::String => "string",
            ScalarKind::Boolean => "boolean",
            ScalarKind::Integer => "integer",
            ScalarKind::Decimal => "decimal",
            ScalarKind::DateTime => "date/time",
        }
    }
}

/// A typed leaf value in transit between the engine and an accessor.
#[derive(Debug, Clone, PartialEq)]
pub enum ScalarValue {
    String(String),
    Boolean(bool),
    Integer(i32),
    Decimal(Decimal),
    DateTime(DateTime<Utc>),
}

/// Parse raw OFX text into the requested scalar kind.
pub fn parse(kind: ScalarKind, raw: &str) -> Result<ScalarValue, CoerceError> {
    match kind {
        ScalarKind::String => Ok(ScalarValue::String(raw.to_string())),
        ScalarKind::Boolean => parse_boolean(raw).map(ScalarValue::Boolean),
        ScalarKind::Integer => parse_integer(raw).map(ScalarValue::Integer),
        ScalarKind::Decimal => parse_decimal(raw).map(ScalarValue::Decimal),
        ScalarKind::DateTime => parse_datetime(raw).map(ScalarValue::DateTime),
    }
}

/// Render a typed scalar as OFX wire text.
pub fn render(value: &ScalarValue) -> String {
    match value {
        ScalarValue::String(s) => s.clone(),
        ScalarValue::Boolean(b) => (if *b { "Y" } else { "N" }).to_string(),
        ScalarValue::Integer(i) => i.to_string(),
        ScalarValue::Decimal(d) => d.to_string(),
        ScalarValue::DateTime(dt) => format_datetime(dt),
    }
}

/// Parse an OFX boolean. `Y`/`T` are true, `N`/`F` are false.
pub fn parse_boolean(raw: &str) -> Result<bool, CoerceError> {
    match raw.trim().to_ascii_uppercase().as_str() {
        "Y" | "T" => Ok(true),
        "N" | "F" => Ok(false),
        _ => Err(CoerceError::InvalidBoolean(raw.to_string())),
    }
}

pub fn parse_integer(raw: &str) -> Result<i32, CoerceError> {
    raw.trim()
        .parse::<i32>()
        .map_err(|_| CoerceError::InvalidInteger(raw.to_string()))
}

/// Parse a decimal amount, tolerating comma decimal separators as emitted by
/// some European institutions.
pub fn parse_decimal(raw: &str) -> Result<Decimal, CoerceError> {
    let trimmed = raw.trim();
    let normalized = if trimmed.contains(',') && trimmed.contains('.') {
        // Comma is a thousands separator here.
        trimmed.replace(',', "")
    } else {
        trimmed.replace(',', ".")
    };
    Decimal::from_str(&normalized).map_err(|_| CoerceError::InvalidAmount(raw.to_string()))
}

/// Parse an OFX compact timestamp.
///
/// The format is `YYYYMMDD[HHMMSS[.XXX]][[offset[:tzname]]]` with
/// progressively optional trailing components, e.g. `20230101`,
/// `20230101093000`, `20230101093000.250`, `20230101093000.250[-5:EST]`.
/// The optional bracketed offset is in hours (fractional offsets occur) and
/// the result is normalized to UTC.
pub fn parse_datetime(raw: &str) -> Result<DateTime<Utc>, CoerceError> {
    let value = raw.trim();
    let err = || CoerceError::InvalidDate(raw.to_string());

    let (stamp, offset_hours) = match value.find('[') {
        Some(bracket) => {
            let close = value.find(']').ok_or_else(err)?;
            if close < bracket {
                return Err(err());
            }
            let zone = &value[bracket + 1..close];
            let offset = zone.split(':').next().unwrap_or(zone);
            let hours = offset.parse::<f64>().map_err(|_| err())?;
            (&value[..bracket], hours)
        }
        None => (value, 0.0),
    };

    let valid_shape = match stamp.len() {
        8 | 14 => stamp.bytes().all(|b| b.is_ascii_digit()),
        18 => {
            stamp.as_bytes()[14] == b'.'
                && stamp[..14].bytes().all(|b| b.is_ascii_digit())
                && stamp[15..].bytes().all(|b| b.is_ascii_digit())
        }
        _ => false,
    };
    if !valid_shape {
        return Err(err());
    }

    let digits = |range: std::ops::Range<usize>| -> Result<u32, CoerceError> {
        stamp[range].parse::<u32>().map_err(|_| err())
    };

    let year = stamp[0..4].parse::<i32>().map_err(|_| err())?;
    let month = digits(4..6)?;
    let day = digits(6..8)?;
    let (hour, minute, second) = if stamp.len() >= 14 {
        (digits(8..10)?, digits(10..12)?, digits(12..14)?)
    } else {
        (0, 0, 0)
    };
    let milli = if stamp.len() == 18 { digits(15..18)? } else { 0 };

    let naive = NaiveDate::from_ymd_opt(year, month, day)
        .and_then(|d| d.and_hms_milli_opt(hour, minute, second, milli))
        .ok_or_else(err)?;

    // Local time minus the zone offset gives UTC.
    let offset_seconds = (offset_hours * 3600.0).round() as i64;
    let utc_naive = naive - Duration::seconds(offset_seconds);
    Ok(DateTime::from_naive_utc_and_offset(utc_naive, Utc))
}

/// Format a timestamp in the full OFX form, always `YYYYMMDDHHMMSS.XXX` in
/// UTC.
pub fn format_datetime(dt: &DateTime<Utc>) -> String {
    dt.format("%Y%m%d%H%M%S%.3f").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use pretty_assertions::assert_eq;
    use rust_decimal::Decimal;

    fn utc(y: i32, mo: u32, d: u32, h: u32, mi: u32, s: u32, ms: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, mo, d, h, mi, s).unwrap() + Duration::milliseconds(ms as i64)
    }

    #[test]
    fn test_parse_date_only() {
        assert_eq!(parse_datetime("20230101").unwrap(), utc(2023, 1, 1, 0, 0, 0, 0));
    }

    #[test]
    fn test_parse_date_time() {
        assert_eq!(
            parse_datetime("20230705142530").unwrap(),
            utc(2023, 7, 5, 14, 25, 30, 0)
        );
    }

    #[test]
    fn test_parse_date_time_millis() {
        assert_eq!(
            parse_datetime("20230705142530.250").unwrap(),
            utc(2023, 7, 5, 14, 25, 30, 250)
        );
    }

    #[test]
    fn test_parse_date_with_offset() {
        // 14:25:30 at GMT-5 is 19:25:30 UTC.
        assert_eq!(
            parse_datetime("20230705142530.000[-5:EST]").unwrap(),
            utc(2023, 7, 5, 19, 25, 30, 0)
        );
    }

    #[test]
    fn test_parse_date_fractional_offset() {
        // +9.5 hours (ACST): 12:00 local is 02:30 UTC.
        assert_eq!(
            parse_datetime("20230705120000.000[+9.5:ACST]").unwrap(),
            utc(2023, 7, 5, 2, 30, 0, 0)
        );
    }

    #[test]
    fn test_parse_date_malformed() {
        assert!(parse_datetime("2023").is_err());
        assert!(parse_datetime("2023010X").is_err());
        assert!(parse_datetime("20231301").is_err());
        assert!(parse_datetime("202307051425").is_err()); // truncated time
    }

    #[test]
    fn test_format_datetime_full_form() {
        let dt = utc(2023, 1, 1, 0, 0, 0, 0);
        assert_eq!(format_datetime(&dt), "20230101000000.000");
    }

    #[test]
    fn test_datetime_round_trip() {
        let dt = utc(2024, 12, 31, 23, 59, 59, 999);
        assert_eq!(parse_datetime(&format_datetime(&dt)).unwrap(), dt);
    }

    #[test]
    fn test_parse_boolean() {
        assert_eq!(parse_boolean("Y").unwrap(), true);
        assert_eq!(parse_boolean("t").unwrap(), true);
        assert_eq!(parse_boolean("N").unwrap(), false);
        assert_eq!(parse_boolean("F").unwrap(), false);
        assert!(parse_boolean("YES").is_err());
    }

    #[test]
    fn test_parse_decimal_locale_tolerant() {
        assert_eq!(parse_decimal("-255.00").unwrap(), Decimal::new(-25500, 2));
        assert_eq!(parse_decimal("25,50").unwrap(), Decimal::new(2550, 2));
        assert_eq!(parse_decimal("1,234.56").unwrap(), Decimal::new(123456, 2));
        assert!(parse_decimal("12x").is_err());
    }

    #[test]
    fn test_render_forms() {
        assert_eq!(render(&ScalarValue::Boolean(true)), "Y");
        assert_eq!(render(&ScalarValue::Boolean(false)), "N");
        assert_eq!(render(&ScalarValue::Decimal(Decimal::new(2550, 2))), "25.50");
        assert_eq!(render(&ScalarValue::String("BUY".into())), "BUY");
        assert_eq!(render(&ScalarValue::Integer(0)), "0");
    }
}

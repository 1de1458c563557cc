//! Polars `AnyValue` helpers.
//!
//! Source chunks arrive as Polars frames with whatever dtype the store
//! produced; these helpers turn single cells into the plain values the
//! reshaping code works with.

use chrono::{DateTime, Datelike, NaiveDate, NaiveDateTime, Utc};
use polars::prelude::{AnyValue, TimeUnit};

/// Days from 0001-01-01 (day 1) to 1970-01-01.
const UNIX_EPOCH_DAYS_FROM_CE: i32 = 719_163;

/// Converts a cell to a string, `None` for nulls.
///
/// Numbers are rendered without trailing zeros so that a code stored in a
/// numeric column reads the same as its character form.
///
/// # Examples
///
/// ```
/// use polars::prelude::AnyValue;
/// use cms_common::any_to_string;
///
/// assert_eq!(any_to_string(AnyValue::Null), None);
/// assert_eq!(any_to_string(AnyValue::Float64(1.0)).as_deref(), Some("1"));
/// assert_eq!(any_to_string(AnyValue::String("V5789")).as_deref(), Some("V5789"));
/// ```
pub fn any_to_string(value: AnyValue<'_>) -> Option<String> {
    match value {
        AnyValue::Null => None,
        AnyValue::Int8(v) => Some(v.to_string()),
        AnyValue::Int16(v) => Some(v.to_string()),
        AnyValue::Int32(v) => Some(v.to_string()),
        AnyValue::Int64(v) => Some(v.to_string()),
        AnyValue::UInt8(v) => Some(v.to_string()),
        AnyValue::UInt16(v) => Some(v.to_string()),
        AnyValue::UInt32(v) => Some(v.to_string()),
        AnyValue::UInt64(v) => Some(v.to_string()),
        AnyValue::Float32(v) => Some(format_numeric(f64::from(v))),
        AnyValue::Float64(v) => Some(format_numeric(v)),
        AnyValue::String(s) => Some(s.to_string()),
        AnyValue::StringOwned(s) => Some(s.to_string()),
        AnyValue::Date(days) => date_from_epoch_days(days).map(format_date),
        other => any_to_datetime(other.clone())
            .map(|dt| dt.to_string())
            .or_else(|| Some(other.to_string())),
    }
}

/// Formats a float without trailing zeros.
///
/// ```
/// use cms_common::format_numeric;
///
/// assert_eq!(format_numeric(25.0), "25");
/// assert_eq!(format_numeric(2.50), "2.5");
/// ```
pub fn format_numeric(v: f64) -> String {
    let s = format!("{v}");
    if !s.contains('.') {
        return s;
    }
    let trimmed = s.trim_end_matches('0').trim_end_matches('.');
    if trimmed.is_empty() || trimmed == "-" {
        "0".to_string()
    } else {
        trimmed.to_string()
    }
}

/// Converts a cell to `f64`; strings are parsed.
pub fn any_to_f64(value: AnyValue<'_>) -> Option<f64> {
    match value {
        AnyValue::Null => None,
        AnyValue::Int8(v) => Some(f64::from(v)),
        AnyValue::Int16(v) => Some(f64::from(v)),
        AnyValue::Int32(v) => Some(f64::from(v)),
        AnyValue::Int64(v) => Some(v as f64),
        AnyValue::UInt8(v) => Some(f64::from(v)),
        AnyValue::UInt16(v) => Some(f64::from(v)),
        AnyValue::UInt32(v) => Some(f64::from(v)),
        AnyValue::UInt64(v) => Some(v as f64),
        AnyValue::Float32(v) => Some(f64::from(v)),
        AnyValue::Float64(v) => Some(v),
        AnyValue::String(s) => parse_f64(s),
        AnyValue::StringOwned(s) => parse_f64(&s),
        _ => None,
    }
}

/// Converts a date, datetime or `YYYY-MM-DD...` string cell to a date.
pub fn any_to_date(value: AnyValue<'_>) -> Option<NaiveDate> {
    match value {
        AnyValue::Null => None,
        AnyValue::Date(days) => date_from_epoch_days(days),
        AnyValue::String(s) => parse_date(s),
        AnyValue::StringOwned(s) => parse_date(&s),
        other => any_to_datetime(other).map(|dt| dt.date()),
    }
}

/// Converts a datetime cell to a naive UTC timestamp.
pub fn any_to_datetime(value: AnyValue<'_>) -> Option<NaiveDateTime> {
    match value {
        AnyValue::Datetime(v, unit, _) => datetime_from_epoch(v, unit),
        AnyValue::DatetimeOwned(v, unit, _) => datetime_from_epoch(v, unit),
        AnyValue::Date(days) => date_from_epoch_days(days).and_then(|d| d.and_hms_opt(0, 0, 0)),
        AnyValue::String(s) => parse_datetime(s),
        AnyValue::StringOwned(s) => parse_datetime(&s),
        _ => None,
    }
}

fn datetime_from_epoch(v: i64, unit: TimeUnit) -> Option<NaiveDateTime> {
    let dt = match unit {
        TimeUnit::Milliseconds => DateTime::<Utc>::from_timestamp_millis(v)?,
        TimeUnit::Microseconds => DateTime::<Utc>::from_timestamp_micros(v)?,
        TimeUnit::Nanoseconds => DateTime::<Utc>::from_timestamp_nanos(v),
    };
    Some(dt.naive_utc())
}

/// Polars stores dates as days since 1970-01-01.
pub fn date_from_epoch_days(days: i32) -> Option<NaiveDate> {
    NaiveDate::from_num_days_from_ce_opt(days.checked_add(UNIX_EPOCH_DAYS_FROM_CE)?)
}

pub fn epoch_days(date: NaiveDate) -> i32 {
    date.num_days_from_ce() - UNIX_EPOCH_DAYS_FROM_CE
}

pub fn epoch_millis(ts: NaiveDateTime) -> i64 {
    ts.and_utc().timestamp_millis()
}

/// `YYYY-MM-DD`, the rendering used for date facts and surrogate keys.
pub fn format_date(date: NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}

/// Parses `YYYY-MM-DD`, ignoring any time part that follows.
pub fn parse_date(value: &str) -> Option<NaiveDate> {
    let trimmed = value.trim();
    let head = trimmed.get(..10).unwrap_or(trimmed);
    NaiveDate::parse_from_str(head, "%Y-%m-%d").ok()
}

/// Parses `YYYY-MM-DD HH:MM:SS[.f]` (space or `T` separated) or a bare date.
pub fn parse_datetime(value: &str) -> Option<NaiveDateTime> {
    let trimmed = value.trim();
    for format in ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f"] {
        if let Ok(ts) = NaiveDateTime::parse_from_str(trimmed, format) {
            return Some(ts);
        }
    }
    if trimmed.len() == 10 {
        return parse_date(trimmed).and_then(|d| d.and_hms_opt(0, 0, 0));
    }
    None
}

pub fn parse_f64(value: &str) -> Option<f64> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return None;
    }
    trimmed.parse::<f64>().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_any_to_string_null_and_numbers() {
        assert_eq!(any_to_string(AnyValue::Null), None);
        assert_eq!(any_to_string(AnyValue::Int64(-100)).as_deref(), Some("-100"));
        assert_eq!(any_to_string(AnyValue::Float64(1.5)).as_deref(), Some("1.5"));
        assert_eq!(any_to_string(AnyValue::Float64(100.0)).as_deref(), Some("100"));
    }

    #[test]
    fn test_format_numeric_keeps_integer_zeros() {
        assert_eq!(format_numeric(100.0), "100");
        assert_eq!(format_numeric(0.0), "0");
        assert_eq!(format_numeric(-0.5), "-0.5");
    }

    #[test]
    fn test_epoch_days_round_trip() {
        let date = NaiveDate::from_ymd_opt(2015, 3, 9).unwrap();
        assert_eq!(date_from_epoch_days(epoch_days(date)), Some(date));
        assert_eq!(epoch_days(NaiveDate::from_ymd_opt(1970, 1, 1).unwrap()), 0);
    }

    #[test]
    fn test_any_to_date() {
        let date = NaiveDate::from_ymd_opt(2015, 3, 9).unwrap();
        assert_eq!(any_to_date(AnyValue::Date(epoch_days(date))), Some(date));
        assert_eq!(any_to_date(AnyValue::String("2015-03-09")), Some(date));
        assert_eq!(any_to_date(AnyValue::String("2015-03-09 12:00:00")), Some(date));
        assert_eq!(any_to_date(AnyValue::String("03/09/2015")), None);
    }

    #[test]
    fn test_parse_datetime() {
        let ts = parse_datetime("2017-06-01 17:37:02").unwrap();
        assert_eq!(ts.to_string(), "2017-06-01 17:37:02");
        assert!(parse_datetime("2017-06-01T17:37:02.125").is_some());
        assert_eq!(
            parse_datetime("2017-06-01"),
            NaiveDate::from_ymd_opt(2017, 6, 1).unwrap().and_hms_opt(0, 0, 0)
        );
    }

    #[test]
    fn test_any_to_f64() {
        assert_eq!(any_to_f64(AnyValue::Int32(42)), Some(42.0));
        assert_eq!(any_to_f64(AnyValue::String(" 2.5 ")), Some(2.5));
        assert_eq!(any_to_f64(AnyValue::String("abc")), None);
    }
}

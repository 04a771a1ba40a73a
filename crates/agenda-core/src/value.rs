//! RFC 5545 property value decoding: DATE, DATE-TIME, DURATION and TEXT.

use chrono::{Duration, NaiveDate, NaiveDateTime};
use thiserror::Error;

use crate::model::DateValue;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValueError {
    #[error("invalid date {0:?}")]
    Date(String),

    #[error("invalid date-time {0:?}")]
    DateTime(String),

    #[error("invalid duration {0:?}")]
    Duration(String),
}

const DATE_FORMAT: &str = "%Y%m%d";
const DATE_TIME_FORMAT: &str = "%Y%m%dT%H%M%S";

/// Decode a single DATE or DATE-TIME value.
///
/// `tzid` is the `TZID` parameter of the property, `value_is_date` whether the
/// property carried `VALUE=DATE`. A trailing `Z` wins over any `TZID`.
pub fn parse_date_value(
    raw: &str,
    tzid: Option<&str>,
    value_is_date: bool,
) -> Result<DateValue, ValueError> {
    let raw = raw.trim();
    if value_is_date || (raw.len() == 8 && !raw.contains('T')) {
        return NaiveDate::parse_from_str(raw, DATE_FORMAT)
            .map(DateValue::Date)
            .map_err(|_| ValueError::Date(raw.to_string()));
    }

    if let Some(utc) = raw.strip_suffix('Z') {
        let local = NaiveDateTime::parse_from_str(utc, DATE_TIME_FORMAT)
            .map_err(|_| ValueError::DateTime(raw.to_string()))?;
        return Ok(DateValue::Utc(local.and_utc()));
    }

    let local = NaiveDateTime::parse_from_str(raw, DATE_TIME_FORMAT)
        .map_err(|_| ValueError::DateTime(raw.to_string()))?;
    Ok(match tzid {
        Some(tzid) => DateValue::Zoned {
            tzid: tzid.to_string(),
            local,
        },
        None => DateValue::Floating(local),
    })
}

/// Decode a comma-separated list of dates (`EXDATE`, `RDATE`).
///
/// PERIOD values (`start/end` or `start/duration`) contribute their start.
pub fn parse_date_list(
    raw: &str,
    tzid: Option<&str>,
    value_is_date: bool,
) -> Result<Vec<DateValue>, ValueError> {
    raw.split(',')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(|item| {
            let start = item.split_once('/').map_or(item, |(start, _)| start);
            parse_date_value(start, tzid, value_is_date)
        })
        .collect()
}

/// Decode a DURATION value such as `PT1H30M`, `P1D`, `-PT15M` or `P2W`.
pub fn parse_duration(raw: &str) -> Result<Duration, ValueError> {
    let invalid = || ValueError::Duration(raw.to_string());
    let trimmed = raw.trim();

    let (negative, rest) = match trimmed.as_bytes().first().copied() {
        Some(b'-') => (true, &trimmed[1..]),
        Some(b'+') => (false, &trimmed[1..]),
        _ => (false, trimmed),
    };
    let rest = rest.strip_prefix('P').ok_or_else(invalid)?;

    let mut total = Duration::zero();
    let mut digits = String::new();
    let mut in_time = false;
    let mut components = 0;

    for c in rest.chars() {
        if c.is_ascii_digit() {
            digits.push(c);
            continue;
        }
        if c == 'T' {
            if in_time || !digits.is_empty() {
                return Err(invalid());
            }
            in_time = true;
            continue;
        }

        let n: i64 = digits.parse().map_err(|_| invalid())?;
        digits.clear();
        let part = match (c, in_time) {
            ('W', false) => Duration::try_weeks(n),
            ('D', false) => Duration::try_days(n),
            ('H', true) => Duration::try_hours(n),
            ('M', true) => Duration::try_minutes(n),
            ('S', true) => Duration::try_seconds(n),
            _ => None,
        }
        .ok_or_else(invalid)?;
        total = total.checked_add(&part).ok_or_else(invalid)?;
        components += 1;
    }

    if components == 0 || !digits.is_empty() {
        return Err(invalid());
    }
    Ok(if negative { -total } else { total })
}

/// Undo TEXT escaping (`\n`, `\,`, `\;`, `\\`).
pub fn unescape_text(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n' | 'N') => out.push('\n'),
            Some(other) => out.push(other),
            None => out.push('\\'),
        }
    }
    out
}

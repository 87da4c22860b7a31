// src/io/time.rs
use chrono::{Months, NaiveDate, NaiveDateTime, TimeDelta};

use crate::error::CdiError;

/// Decodes a CF-style numeric time (`value` in `"<unit> since <epoch>"`).
pub fn decode_cf_time(value: f64, units: &str) -> Result<NaiveDate, CdiError> {
    if !value.is_finite() {
        return Err(CdiError::InvalidTimeAxis(format!(
            "time value {value} {units} is not a finite number"
        )));
    }
    let (unit, epoch) = units
        .split_once(" since ")
        .ok_or_else(|| CdiError::InvalidTimeAxis(format!("unrecognised time units '{units}'")))?;
    let epoch = parse_iso_date(epoch)?;

    let unit = unit.trim().to_lowercase();
    let seconds_per_unit = match unit.as_str() {
        "days" | "day" | "d" => 86_400.0,
        "hours" | "hour" | "h" => 3_600.0,
        "minutes" | "minute" | "min" => 60.0,
        "seconds" | "second" | "s" => 1.0,
        "months" | "month" => return add_months(epoch, value, units),
        other => {
            return Err(CdiError::InvalidTimeAxis(format!(
                "unsupported time unit '{other}'"
            )))
        }
    };

    let start = NaiveDateTime::from(epoch);
    TimeDelta::try_seconds((value * seconds_per_unit).round() as i64)
        .and_then(|delta| start.checked_add_signed(delta))
        .map(|dt| dt.date())
        .ok_or_else(|| {
            CdiError::InvalidTimeAxis(format!("time value {value} {units} is out of range"))
        })
}

/// Parses the date part of an ISO-8601 string (`2001-01-01`,
/// `2001-1-1 00:00:00`, `2001-01-01T12:00:00Z`).
pub fn parse_iso_date(s: &str) -> Result<NaiveDate, CdiError> {
    let date_part = s
        .trim()
        .split(|c: char| c == 'T' || c.is_whitespace())
        .next()
        .unwrap_or_default();
    NaiveDate::parse_from_str(date_part, "%Y-%m-%d")
        .map_err(|e| CdiError::InvalidTimeAxis(format!("cannot parse date '{s}': {e}")))
}

fn add_months(epoch: NaiveDate, value: f64, units: &str) -> Result<NaiveDate, CdiError> {
    if value < 0.0 || value.fract() != 0.0 {
        return Err(CdiError::InvalidTimeAxis(format!(
            "month offsets must be whole and non-negative, got {value} {units}"
        )));
    }
    epoch
        .checked_add_months(Months::new(value as u32))
        .ok_or_else(|| CdiError::InvalidTimeAxis(format!("time value {value} {units} is out of range")))
}

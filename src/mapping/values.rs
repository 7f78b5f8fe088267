//! Cell text to typed statement values.

use crate::model::CellValue;
use chrono::{NaiveDate, NaiveDateTime};
use once_cell::sync::Lazy;
use regex::Regex;

pub const PRECISION_YEAR: u8 = 9;
pub const PRECISION_MONTH: u8 = 10;
pub const PRECISION_DAY: u8 = 11;
pub const PRECISION_HOUR: u8 = 12;
pub const PRECISION_MINUTE: u8 = 13;
pub const PRECISION_SECOND: u8 = 14;

const OUTPUT_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

static YEAR: Lazy<Regex> = Lazy::new(|| Regex::new(r"^(-?[0-9]{1,4})$").expect("valid year regex"));
static YEAR_MONTH: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^([0-9]{4})-([0-9]{1,2})$").expect("valid month regex"));
static POINT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(?i)point\(\s*(\S+)\s+(\S+)\s*\)$").expect("valid point regex")
});

/// Parses a quantity, tolerating thousands separators and a leading `+`.
pub fn parse_quantity(value: &CellValue) -> Result<f64, String> {
    match value {
        CellValue::Number(n) => Ok(*n),
        CellValue::Text(text) => {
            let cleaned: String = text
                .trim()
                .trim_start_matches('+')
                .chars()
                .filter(|c| *c != ',' && !c.is_whitespace())
                .collect();
            cleaned
                .parse::<f64>()
                .ok()
                .filter(|n| n.is_finite())
                .ok_or_else(|| "not a number".to_string())
        }
    }
}

/// Parses a time into its normalized form and precision.
///
/// With `format` the text must match that chrono format; otherwise the
/// year, year-month, date and datetime ISO forms are accepted. A declared
/// `precision` wins over the inferred one.
pub fn parse_time(
    value: &CellValue,
    format: Option<&str>,
    precision: Option<u8>,
) -> Result<(String, u8), String> {
    let text = value.as_lookup_text();
    let (datetime, inferred) = match format {
        Some(format) => parse_with_format(&text, format)?,
        None => parse_iso(&text)?,
    };
    Ok((
        datetime.format(OUTPUT_FORMAT).to_string(),
        precision.unwrap_or(inferred),
    ))
}

fn parse_iso(text: &str) -> Result<(NaiveDateTime, u8), String> {
    let text = text.trim().trim_end_matches('Z');
    if let Some(caps) = YEAR.captures(text) {
        let year: i32 = caps[1].parse().map_err(|_| format!("invalid year '{text}'"))?;
        return start_of(year, 1, 1).map(|dt| (dt, PRECISION_YEAR));
    }
    if let Some(caps) = YEAR_MONTH.captures(text) {
        let year: i32 = caps[1].parse().map_err(|_| format!("invalid year '{text}'"))?;
        let month: u32 = caps[2].parse().map_err(|_| format!("invalid month '{text}'"))?;
        return start_of(year, month, 1).map(|dt| (dt, PRECISION_MONTH));
    }
    for (pattern, precision) in [
        ("%Y-%m-%dT%H:%M:%S", PRECISION_SECOND),
        ("%Y-%m-%d %H:%M:%S", PRECISION_SECOND),
        ("%Y-%m-%dT%H:%M", PRECISION_MINUTE),
        ("%Y-%m-%d %H:%M", PRECISION_MINUTE),
    ] {
        if let Ok(dt) = NaiveDateTime::parse_from_str(text, pattern) {
            return Ok((dt, precision));
        }
    }
    if let Ok(date) = NaiveDate::parse_from_str(text, "%Y-%m-%d") {
        return midnight(date).map(|dt| (dt, PRECISION_DAY));
    }
    Err(format!("'{text}' is not a recognized date or time"))
}

fn parse_with_format(text: &str, format: &str) -> Result<(NaiveDateTime, u8), String> {
    let inferred = precision_of_format(format);
    if let Ok(dt) = NaiveDateTime::parse_from_str(text, format) {
        return Ok((dt, inferred));
    }
    // chrono needs a full date; pad missing month/day with fixed fields.
    let (padded_text, padded_format) = match inferred {
        PRECISION_YEAR => (format!("{text}|01|01"), format!("{format}|%m|%d")),
        PRECISION_MONTH => (format!("{text}|01"), format!("{format}|%d")),
        _ => (text.to_string(), format.to_string()),
    };
    NaiveDate::parse_from_str(&padded_text, &padded_format)
        .map_err(|err| format!("'{text}' does not match format '{format}': {err}"))
        .and_then(midnight)
        .map(|dt| (dt, inferred))
}

fn precision_of_format(format: &str) -> u8 {
    let has = |directives: &[&str]| directives.iter().any(|d| format.contains(d));
    if has(&["%S", "%T", "%s"]) {
        PRECISION_SECOND
    } else if has(&["%M", "%R"]) {
        PRECISION_MINUTE
    } else if has(&["%H", "%I"]) {
        PRECISION_HOUR
    } else if has(&["%d", "%e", "%j", "%F", "%D"]) {
        PRECISION_DAY
    } else if has(&["%m", "%b", "%B", "%h"]) {
        PRECISION_MONTH
    } else {
        PRECISION_YEAR
    }
}

fn start_of(year: i32, month: u32, day: u32) -> Result<NaiveDateTime, String> {
    NaiveDate::from_ymd_opt(year, month, day)
        .ok_or_else(|| format!("{year}-{month:02}-{day:02} is not a valid date"))
        .and_then(midnight)
}

fn midnight(date: NaiveDate) -> Result<NaiveDateTime, String> {
    date.and_hms_opt(0, 0, 0)
        .ok_or_else(|| format!("{date} has no midnight"))
}

/// Parses `lat, long` or `Point(long lat)` into (latitude, longitude).
pub fn parse_coordinate(value: &CellValue) -> Result<(f64, f64), String> {
    let text = match value {
        CellValue::Text(text) => text.trim().to_string(),
        CellValue::Number(_) => return Err("a single number is not a coordinate".to_string()),
    };
    let (latitude, longitude) = if let Some(caps) = POINT.captures(&text) {
        (caps[2].to_string(), caps[1].to_string())
    } else {
        let (lat, long) = text
            .split_once(',')
            .ok_or_else(|| "expected 'latitude, longitude'".to_string())?;
        (lat.trim().to_string(), long.trim().to_string())
    };
    let latitude: f64 = latitude
        .parse()
        .map_err(|_| format!("invalid latitude '{latitude}'"))?;
    let longitude: f64 = longitude
        .parse()
        .map_err(|_| format!("invalid longitude '{longitude}'"))?;
    if !(-90.0..=90.0).contains(&latitude) {
        return Err(format!("latitude {latitude} is out of range"));
    }
    if !(-180.0..=180.0).contains(&longitude) {
        return Err(format!("longitude {longitude} is out of range"));
    }
    Ok((latitude, longitude))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn text(raw: &str) -> CellValue {
        CellValue::Text(raw.to_string())
    }

    #[test]
    fn quantities_accept_separators() {
        assert_eq!(parse_quantity(&text("+1,234.5")), Ok(1234.5));
        assert_eq!(parse_quantity(&CellValue::Number(7.0)), Ok(7.0));
        assert!(parse_quantity(&text("ten")).is_err());
    }

    #[test]
    fn iso_times_infer_precision() {
        assert_eq!(
            parse_time(&CellValue::Number(2020.0), None, None),
            Ok(("2020-01-01T00:00:00".to_string(), PRECISION_YEAR))
        );
        assert_eq!(
            parse_time(&text("2020-03"), None, None),
            Ok(("2020-03-01T00:00:00".to_string(), PRECISION_MONTH))
        );
        assert_eq!(
            parse_time(&text("2020-03-04"), None, None),
            Ok(("2020-03-04T00:00:00".to_string(), PRECISION_DAY))
        );
        assert_eq!(
            parse_time(&text("2020-03-04T05:06:07Z"), None, None),
            Ok(("2020-03-04T05:06:07".to_string(), PRECISION_SECOND))
        );
    }

    #[test]
    fn declared_format_and_precision_are_honored() {
        assert_eq!(
            parse_time(&text("04/03/2020"), Some("%d/%m/%Y"), None),
            Ok(("2020-03-04T00:00:00".to_string(), PRECISION_DAY))
        );
        assert_eq!(
            parse_time(&text("FY2019"), Some("FY%Y"), None),
            Ok(("2019-01-01T00:00:00".to_string(), PRECISION_YEAR))
        );
        assert_eq!(
            parse_time(&text("2020-03-04"), None, Some(PRECISION_YEAR)),
            Ok(("2020-03-04T00:00:00".to_string(), PRECISION_YEAR))
        );
        assert!(parse_time(&text("soon"), None, None).is_err());
    }

    #[test]
    fn coordinates_accept_both_forms() {
        assert_eq!(parse_coordinate(&text("12.5, -3.25")), Ok((12.5, -3.25)));
        assert_eq!(parse_coordinate(&text("Point(-3.25 12.5)")), Ok((12.5, -3.25)));
        assert!(parse_coordinate(&text("95, 0")).is_err());
    }
}

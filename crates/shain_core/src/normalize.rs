//! Field normalization for stored employee values.
//!
//! # Responsibility
//! - Convert heterogeneous cell values into canonical stored text.
//! - Filter caller-supplied field maps down to a category's known columns.
//!
//! # Invariants
//! - Normalization never fails; unparseable input becomes `None`.
//! - Blank cells, numeric zero and the sentinel strings `0`, `nan`, `NaT`
//!   and `None` all become `None`.
//! - Dates are stored as `YYYY-MM-DD`; numbers as the shortest exact decimal
//!   with no fractional part when integral.

use crate::model::category::{Category, FieldRole};
use crate::model::cell::CellValue;
use chrono::{DateTime, Datelike, Duration, NaiveDate};
use once_cell::sync::Lazy;
use regex::Regex;

const NULL_SENTINELS: &[&str] = &["0", "nan", "NaT", "None"];
const ISO_DATE_FORMAT: &str = "%Y-%m-%d";
/// Serial of 9999-12-31, the last date with a four-digit year.
const MAX_DATE_SERIAL: f64 = 2_958_465.0;
/// Largest magnitude where every integral `f64` is exactly representable as `i64`.
const MAX_EXACT_INTEGER: f64 = 9_007_199_254_740_992.0;

static DATE_TEXT_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(\d{4})[-/.](\d{1,2})[-/.](\d{1,2})(?:[ T]\d{1,2}:\d{2}(?::\d{2}(?:\.\d+)?)?)?$")
        .expect("valid date text regex")
});
static COMPACT_DATE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(\d{4})(\d{2})(\d{2})$").expect("valid compact date regex"));
static KANJI_DATE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(\d{4})年(\d{1,2})月(\d{1,2})日$").expect("valid kanji date regex")
});

/// Normalizes one raw value for `column` into its stored representation.
///
/// The column's role is a static lookup; see [`FieldRole::of`].
pub fn normalize(column: &str, value: &CellValue) -> Option<String> {
    if is_null_like(value) {
        return None;
    }

    match FieldRole::of(column) {
        FieldRole::Date => normalize_date(value),
        FieldRole::Numeric => normalize_number(value),
        FieldRole::Text => normalize_text(value),
    }
}

/// Filters `fields` to the columns `category` knows and normalizes each value.
///
/// Output follows canonical column order. When a column appears more than
/// once the last value wins.
pub fn normalize_known<K, V, I>(category: Category, fields: I) -> Vec<(&'static str, Option<String>)>
where
    K: AsRef<str>,
    V: Into<CellValue>,
    I: IntoIterator<Item = (K, V)>,
{
    let columns = category.columns();
    let mut slots: Vec<Option<Option<String>>> = vec![None; columns.len()];

    for (key, value) in fields {
        let Some(index) = columns.iter().position(|column| *column == key.as_ref()) else {
            continue;
        };
        let value = value.into();
        slots[index] = Some(normalize(columns[index], &value));
    }

    columns
        .iter()
        .copied()
        .zip(slots)
        .filter_map(|(column, slot)| slot.map(|value| (column, value)))
        .collect()
}

/// Converts a spreadsheet day-count serial (epoch 1899-12-30) to a date.
pub fn serial_to_date(serial: f64) -> Option<NaiveDate> {
    if !serial.is_finite() || serial <= 0.0 || serial.floor() > MAX_DATE_SERIAL {
        return None;
    }
    let epoch = NaiveDate::from_ymd_opt(1899, 12, 30)?;
    let days = serial.floor();
    epoch.checked_add_signed(Duration::try_days(days as i64)?)
}

/// Parses a stored ISO date back into a `NaiveDate`.
pub fn parse_iso_date(value: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(value.trim(), ISO_DATE_FORMAT).ok()
}

fn is_null_like(value: &CellValue) -> bool {
    match value {
        CellValue::Empty => true,
        CellValue::Number(number) => number.is_nan() || *number == 0.0,
        CellValue::Text(text) => {
            let trimmed = text.trim();
            trimmed.is_empty() || NULL_SENTINELS.contains(&trimmed)
        }
        CellValue::Bool(_) | CellValue::Date(_) | CellValue::DateTime(_) => false,
    }
}

fn normalize_date(value: &CellValue) -> Option<String> {
    let date = match value {
        CellValue::Date(date) => Some(*date),
        CellValue::DateTime(datetime) => Some(datetime.date()),
        CellValue::Number(serial) => serial_to_date(*serial),
        CellValue::Text(text) => parse_date_text(text.trim()),
        CellValue::Bool(_) | CellValue::Empty => None,
    }
    .filter(|date| (1..=9999).contains(&date.year()))?;
    Some(date.format(ISO_DATE_FORMAT).to_string())
}

fn parse_date_text(text: &str) -> Option<NaiveDate> {
    // 8-digit `YYYYMMDD` would otherwise read as a day serial.
    if COMPACT_DATE_RE.is_match(text) {
        return NaiveDate::parse_from_str(text, "%Y%m%d").ok();
    }
    if let Ok(serial) = text.parse::<f64>() {
        return serial_to_date(serial);
    }

    if let Some(captures) = DATE_TEXT_RE
        .captures(text)
        .or_else(|| KANJI_DATE_RE.captures(text))
    {
        let year = captures[1].parse().ok()?;
        let month = captures[2].parse().ok()?;
        let day = captures[3].parse().ok()?;
        return NaiveDate::from_ymd_opt(year, month, day);
    }

    DateTime::parse_from_rfc3339(text)
        .ok()
        .map(|datetime| datetime.date_naive())
}

fn normalize_number(value: &CellValue) -> Option<String> {
    match value {
        CellValue::Number(number) => format_number(*number),
        CellValue::Bool(true) => Some("1".to_string()),
        CellValue::Text(text) => {
            let cleaned: String = text.trim().chars().filter(|ch| *ch != ',').collect();
            cleaned.parse::<f64>().ok().and_then(format_number)
        }
        CellValue::Bool(false)
        | CellValue::Date(_)
        | CellValue::DateTime(_)
        | CellValue::Empty => None,
    }
}

fn normalize_text(value: &CellValue) -> Option<String> {
    let text = match value {
        CellValue::Text(text) => text.trim().to_string(),
        CellValue::Number(number) => format_number(*number)?,
        CellValue::Bool(flag) => flag.to_string(),
        CellValue::Date(date) => date.format(ISO_DATE_FORMAT).to_string(),
        CellValue::DateTime(datetime) => datetime.format("%Y-%m-%d %H:%M:%S").to_string(),
        CellValue::Empty => return None,
    };
    if text.is_empty() {
        None
    } else {
        Some(text)
    }
}

fn format_number(number: f64) -> Option<String> {
    if !number.is_finite() || number == 0.0 {
        return None;
    }
    if number.fract() == 0.0 && number.abs() < MAX_EXACT_INTEGER {
        return Some(format!("{}", number as i64));
    }
    Some(format!("{number}"))
}

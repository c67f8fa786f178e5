//! Cell values, the in-memory [`Dataset`], and date parsing helpers.
//!
//! A dataset is a header row plus rows of cells aligned to it. Rows are
//! addressed by their 0-based position internally and by their spreadsheet
//! row number (position + [`HEADER_ROW_OFFSET`]) in everything users see.

use std::fmt;

use anyhow::{Result, anyhow};
use chrono::{Duration, NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

/// Reported row number of the first data row (the header occupies row 1).
pub const HEADER_ROW_OFFSET: usize = 2;

/// Day-first formats are tried before month-first ones.
const DATE_FORMATS: &[&str] = &[
    "%Y-%m-%d", "%d/%m/%Y", "%d-%m-%Y", "%d.%m.%Y", "%Y/%m/%d", "%d/%m/%y", "%m/%d/%Y",
];

const DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%d/%m/%Y %H:%M:%S",
    "%d/%m/%Y %H:%M",
];

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum CellValue {
    #[default]
    Empty,
    String(String),
    Number(f64),
    Date(NaiveDate),
}

impl CellValue {
    pub fn is_missing(&self) -> bool {
        match self {
            CellValue::Empty => true,
            CellValue::String(s) => s.trim().is_empty(),
            _ => false,
        }
    }

    pub fn as_display(&self) -> String {
        match self {
            CellValue::Empty => String::new(),
            CellValue::String(s) => s.clone(),
            CellValue::Number(n) => {
                if n.fract() == 0.0 && n.abs() < 1e15 {
                    (*n as i64).to_string()
                } else {
                    n.to_string()
                }
            }
            CellValue::Date(d) => d.format("%Y-%m-%d").to_string(),
        }
    }
}

impl fmt::Display for CellValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_display())
    }
}

impl From<&str> for CellValue {
    fn from(value: &str) -> Self {
        if value.is_empty() {
            CellValue::Empty
        } else {
            CellValue::String(value.to_string())
        }
    }
}

/// Value of a cell at report time. A row or column that no longer resolves is
/// reported as `Unavailable`, which is distinct from a present-but-empty cell.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum CurrentValue {
    Value(CellValue),
    Unavailable,
}

impl fmt::Display for CurrentValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CurrentValue::Value(value) => write!(f, "{value}"),
            CurrentValue::Unavailable => write!(f, "unavailable"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct Dataset {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<CellValue>>,
}

impl Dataset {
    pub fn new(columns: Vec<String>) -> Self {
        Self {
            columns,
            rows: Vec::new(),
        }
    }

    /// Appends a row, padding or truncating it to the header width.
    pub fn push_row(&mut self, mut row: Vec<CellValue>) {
        row.resize(self.columns.len(), CellValue::Empty);
        self.rows.push(row);
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.column_index(name).is_some()
    }

    pub fn cell(&self, row: usize, field: &str) -> Option<&CellValue> {
        let col = self.column_index(field)?;
        self.rows.get(row).and_then(|r| r.get(col))
    }

    pub fn cell_mut(&mut self, row: usize, field: &str) -> Option<&mut CellValue> {
        let col = self.column_index(field)?;
        self.rows.get_mut(row).and_then(|r| r.get_mut(col))
    }

    /// Tolerant lookup by reported row number.
    pub fn current_value(&self, reported_row: usize, field: &str) -> CurrentValue {
        reported_row
            .checked_sub(HEADER_ROW_OFFSET)
            .and_then(|idx| self.cell(idx, field))
            .map(|value| CurrentValue::Value(value.clone()))
            .unwrap_or(CurrentValue::Unavailable)
    }
}

pub fn reported_row(index: usize) -> usize {
    index + HEADER_ROW_OFFSET
}

pub fn row_index(reported: usize) -> Option<usize> {
    reported.checked_sub(HEADER_ROW_OFFSET)
}

pub fn parse_naive_date(value: &str) -> Result<NaiveDate> {
    let value = value.trim();
    for fmt in DATE_FORMATS {
        if let Ok(parsed) = NaiveDate::parse_from_str(value, fmt) {
            return Ok(parsed);
        }
    }
    for fmt in DATETIME_FORMATS {
        if let Ok(parsed) = NaiveDateTime::parse_from_str(value, fmt) {
            return Ok(parsed.date());
        }
    }
    Err(anyhow!("Failed to parse '{value}' as date"))
}

/// Converts a spreadsheet serial day number (1900 date system) to a date.
pub fn excel_serial_to_date(serial: f64) -> Option<NaiveDate> {
    if !serial.is_finite() || serial < 1.0 {
        return None;
    }
    let base = NaiveDate::from_ymd_opt(1899, 12, 30)?;
    let offset = Duration::try_days(serial.trunc() as i64)?;
    base.checked_add_signed(offset)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_naive_date_prefers_day_first() {
        let expected = NaiveDate::from_ymd_opt(2024, 5, 6).unwrap();
        assert_eq!(parse_naive_date("2024-05-06").unwrap(), expected);
        assert_eq!(parse_naive_date("06/05/2024").unwrap(), expected);
        assert_eq!(parse_naive_date("06.05.2024").unwrap(), expected);
        assert_eq!(parse_naive_date("2024-05-06 00:00:00").unwrap(), expected);
    }

    #[test]
    fn parse_naive_date_falls_back_to_month_first_when_day_first_is_impossible() {
        let expected = NaiveDate::from_ymd_opt(2024, 12, 25).unwrap();
        assert_eq!(parse_naive_date("12/25/2024").unwrap(), expected);
        assert!(parse_naive_date("not a date").is_err());
    }

    #[test]
    fn excel_serial_maps_to_calendar_date() {
        assert_eq!(
            excel_serial_to_date(45292.0),
            NaiveDate::from_ymd_opt(2024, 1, 1)
        );
        assert_eq!(excel_serial_to_date(-3.0), None);
    }

    #[test]
    fn excel_serial_out_of_calendar_range_is_none() {
        assert_eq!(excel_serial_to_date(1e15), None);
        assert_eq!(excel_serial_to_date(1e300), None);
        assert_eq!(excel_serial_to_date(f64::NAN), None);
    }

    #[test]
    fn number_display_drops_integral_fraction() {
        assert_eq!(CellValue::Number(1.0).as_display(), "1");
        assert_eq!(CellValue::Number(12.5).as_display(), "12.5");
    }

    #[test]
    fn current_value_distinguishes_empty_from_unavailable() {
        let mut dataset = Dataset::new(vec!["IBAN".to_string()]);
        dataset.push_row(vec![CellValue::Empty]);
        assert_eq!(
            dataset.current_value(2, "IBAN"),
            CurrentValue::Value(CellValue::Empty)
        );
        assert_eq!(dataset.current_value(3, "IBAN"), CurrentValue::Unavailable);
        assert_eq!(dataset.current_value(2, "BIC"), CurrentValue::Unavailable);
        assert_eq!(dataset.current_value(0, "IBAN"), CurrentValue::Unavailable);
    }
}

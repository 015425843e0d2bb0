use std::fmt;

use chrono::{Duration, NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

/// Display format used when a date-time value is stringified.
pub const DATETIME_DISPLAY_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// JSON-friendly representation of a scalar cell value.
///
/// The enum uses an explicit `{type, value}` tagged layout so reports stay stable.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum CellValue {
    /// Empty / unset cell value.
    #[default]
    Empty,
    /// IEEE-754 double precision number.
    Number(f64),
    /// Plain string.
    String(String),
    Boolean(bool),
    /// Error literal such as `#N/A`.
    Error(String),
    /// Date-time value (only produced by the tabular reader; stored as a serial number on write).
    DateTime(NaiveDateTime),
}

impl CellValue {
    pub fn is_empty(&self) -> bool {
        match self {
            CellValue::Empty => true,
            CellValue::String(s) => s.is_empty(),
            _ => false,
        }
    }

    /// The text a user sees for this value, used for stringify-then-compare checks.
    ///
    /// Empty cells render as the empty string; integral numbers render without a fractional part.
    pub fn display_text(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for CellValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CellValue::Empty => Ok(()),
            CellValue::Number(n) => write!(f, "{n}"),
            CellValue::String(s) => f.write_str(s),
            CellValue::Boolean(true) => f.write_str("TRUE"),
            CellValue::Boolean(false) => f.write_str("FALSE"),
            CellValue::Error(e) => f.write_str(e),
            CellValue::DateTime(dt) => write!(f, "{}", dt.format(DATETIME_DISPLAY_FORMAT)),
        }
    }
}

impl From<f64> for CellValue {
    fn from(value: f64) -> Self {
        CellValue::Number(value)
    }
}

impl From<bool> for CellValue {
    fn from(value: bool) -> Self {
        CellValue::Boolean(value)
    }
}

impl From<String> for CellValue {
    fn from(value: String) -> Self {
        CellValue::String(value)
    }
}

impl From<&str> for CellValue {
    fn from(value: &str) -> Self {
        CellValue::String(value.to_string())
    }
}

impl From<NaiveDateTime> for CellValue {
    fn from(value: NaiveDateTime) -> Self {
        CellValue::DateTime(value)
    }
}

/// A worksheet cell: its cached value plus the formula text (without the leading `=`), if any.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Cell {
    pub value: CellValue,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub formula: Option<String>,
}

impl Cell {
    pub fn new(value: CellValue) -> Self {
        Self {
            value,
            formula: None,
        }
    }

    pub fn with_formula(formula: impl Into<String>) -> Self {
        Self {
            value: CellValue::Empty,
            formula: Some(formula.into()),
        }
    }

    /// The content a spreadsheet editor shows in its formula bar: `=<formula>` for formula
    /// cells, the display text of the value otherwise.
    pub fn content_text(&self) -> String {
        match &self.formula {
            Some(formula) => format!("={formula}"),
            None => self.value.display_text(),
        }
    }

    /// The content as a value suitable for recording in an audit trail.
    pub fn content_value(&self) -> CellValue {
        match &self.formula {
            Some(_) => CellValue::String(self.content_text()),
            None => self.value.clone(),
        }
    }
}

fn serial_epoch() -> NaiveDateTime {
    // 1899-12-30 absorbs the 1900 leap-year bug for serials after February 1900.
    NaiveDate::from_ymd_opt(1899, 12, 30)
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .unwrap_or_default()
}

/// Convert a 1900-system serial number to a date-time.
pub fn serial_to_datetime(serial: f64) -> Option<NaiveDateTime> {
    if !serial.is_finite() || !(1.0..=2_958_465.999_999).contains(&serial) {
        return None;
    }
    let millis = (serial * 86_400_000.0).round() as i64;
    serial_epoch().checked_add_signed(Duration::milliseconds(millis))
}

/// Convert a date-time to a 1900-system serial number.
pub fn datetime_to_serial(dt: NaiveDateTime) -> f64 {
    let delta = dt - serial_epoch();
    delta.num_milliseconds() as f64 / 86_400_000.0
}

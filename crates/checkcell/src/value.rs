//! Cell values as seen by the analysis.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Spreadsheet error codes recognised as error sentinels.
pub const ERROR_CODES: &[&str] = &[
    "#NULL!", "#DIV/0!", "#VALUE!", "#REF!", "#NAME?", "#NUM!", "#N/A", "#CIRC!",
];

/// The value held by a cell.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "lowercase")]
pub enum CellValue {
    /// A blank cell.
    #[default]
    Empty,
    /// A numeric value.
    Number(f64),
    /// A text value.
    Text(String),
    /// A boolean value.
    Bool(bool),
    /// An error sentinel such as `#DIV/0!`.
    Error(String),
}

impl CellValue {
    /// Numeric view of the value.
    ///
    /// Booleans count as `1`/`0` and blanks as `0`; text and errors have no
    /// numeric view.
    #[must_use]
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Self::Number(n) => Some(*n),
            Self::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
            Self::Empty => Some(0.0),
            Self::Text(_) | Self::Error(_) => None,
        }
    }

    /// Whether the value is an error sentinel.
    #[must_use]
    pub fn is_error(&self) -> bool {
        matches!(self, Self::Error(_))
    }

    /// Whether the cell holds a number (blanks and booleans excluded).
    #[must_use]
    pub fn is_number(&self) -> bool {
        matches!(self, Self::Number(_))
    }

    /// Convert a snapshot JSON value.
    ///
    /// `null` is blank, strings matching a known error code become
    /// [`CellValue::Error`]; arrays and objects are kept as their JSON text.
    #[must_use]
    pub fn from_json(value: &serde_json::Value) -> Self {
        match value {
            serde_json::Value::Null => Self::Empty,
            serde_json::Value::Bool(b) => Self::Bool(*b),
            serde_json::Value::Number(n) => n.as_f64().map_or(Self::Empty, Self::Number),
            serde_json::Value::String(s) if ERROR_CODES.contains(&s.as_str()) => {
                Self::Error(s.clone())
            }
            serde_json::Value::String(s) => Self::Text(s.clone()),
            other => Self::Text(other.to_string()),
        }
    }

    /// Convert back to the snapshot JSON representation.
    #[must_use]
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Self::Empty => serde_json::Value::Null,
            Self::Number(n) => serde_json::Number::from_f64(*n)
                .map_or(serde_json::Value::Null, serde_json::Value::Number),
            Self::Text(s) | Self::Error(s) => serde_json::Value::String(s.clone()),
            Self::Bool(b) => serde_json::Value::Bool(*b),
        }
    }

    /// Relative distance between two values, used to measure how far an
    /// output moved under perturbation.
    ///
    /// Numbers compare as `|a - b| / max(|a|, 1)`; any other pair is `0`
    /// when equal and `1` otherwise.
    #[must_use]
    pub fn relative_change(&self, baseline: &Self) -> f64 {
        match (self.as_number(), baseline.as_number()) {
            (Some(new), Some(base)) if !self.is_text() && !baseline.is_text() => {
                let delta = (new - base).abs();
                if delta.is_nan() {
                    1.0
                } else {
                    delta / base.abs().max(1.0)
                }
            }
            _ if self == baseline => 0.0,
            _ => 1.0,
        }
    }

    fn is_text(&self) -> bool {
        matches!(self, Self::Text(_))
    }
}

impl fmt::Display for CellValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Empty => Ok(()),
            Self::Number(n) => write!(f, "{n}"),
            Self::Text(s) | Self::Error(s) => f.write_str(s),
            Self::Bool(b) => f.write_str(if *b { "TRUE" } else { "FALSE" }),
        }
    }
}

impl From<f64> for CellValue {
    fn from(n: f64) -> Self {
        Self::Number(n)
    }
}

impl From<&str> for CellValue {
    fn from(s: &str) -> Self {
        Self::Text(s.to_string())
    }
}

//! Core value and type definitions shared by every pipeline stage.

use std::fmt;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

/// Characters tolerated inside numeric cells: grouping commas and spaces.
static NUMERIC_NOISE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[+-]?\d{1,3}([, ]\d{3})+(\.\d+)?$").expect("valid regex"));

/// Declared type of a source field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldType {
    /// Free text, kept verbatim (trimmed).
    Text,
    /// Whole numbers.
    Integer,
    /// Floating-point numbers.
    Float,
    /// true/false, yes/no, 1/0.
    Boolean,
}

impl FieldType {
    /// Returns true if this type is numeric.
    pub fn is_numeric(&self) -> bool {
        matches!(self, FieldType::Integer | FieldType::Float)
    }

    /// Parse a raw, non-null cell into a typed value.
    ///
    /// Numeric types accept thousands separators (`1,234` or `1 234`).
    /// Returns a short reason on failure.
    pub fn parse(&self, raw: &str) -> Result<FieldValue, String> {
        let trimmed = raw.trim();
        match self {
            FieldType::Text => Ok(FieldValue::Text(trimmed.to_string())),
            FieldType::Integer => {
                let cleaned = strip_grouping(trimmed);
                cleaned
                    .parse::<i64>()
                    .map(FieldValue::Integer)
                    .map_err(|_| format!("'{}' is not an integer", trimmed))
            }
            FieldType::Float => {
                let cleaned = strip_grouping(trimmed);
                match cleaned.parse::<f64>() {
                    Ok(v) if v.is_finite() => Ok(FieldValue::Float(v)),
                    _ => Err(format!("'{}' is not a number", trimmed)),
                }
            }
            FieldType::Boolean => match trimmed.to_ascii_lowercase().as_str() {
                "true" | "yes" | "y" | "1" => Ok(FieldValue::Boolean(true)),
                "false" | "no" | "n" | "0" => Ok(FieldValue::Boolean(false)),
                _ => Err(format!("'{}' is not a boolean", trimmed)),
            },
        }
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FieldType::Text => "text",
            FieldType::Integer => "integer",
            FieldType::Float => "float",
            FieldType::Boolean => "boolean",
        };
        f.write_str(name)
    }
}

fn strip_grouping(value: &str) -> String {
    if NUMERIC_NOISE.is_match(value) {
        value.chars().filter(|c| *c != ',' && *c != ' ').collect()
    } else {
        value.to_string()
    }
}

/// A single typed cell value.
///
/// Missing data is always an explicit `Null`; it serializes as JSON `null`
/// and is never coerced to zero or an empty string.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    #[default]
    Null,
    Boolean(bool),
    Integer(i64),
    Float(f64),
    Text(String),
}

impl FieldValue {
    /// Returns true for an explicit null.
    pub fn is_null(&self) -> bool {
        matches!(self, FieldValue::Null)
    }

    /// Numeric view of the value, if it is a number.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            FieldValue::Integer(v) => Some(*v as f64),
            FieldValue::Float(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            FieldValue::Text(v) => Some(v.as_str()),
            _ => None,
        }
    }

    /// Name of the variant, used in error messages.
    pub fn kind(&self) -> &'static str {
        match self {
            FieldValue::Null => "null",
            FieldValue::Boolean(_) => "boolean",
            FieldValue::Integer(_) => "integer",
            FieldValue::Float(_) => "float",
            FieldValue::Text(_) => "text",
        }
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldValue::Null => f.write_str("null"),
            FieldValue::Boolean(v) => write!(f, "{}", v),
            FieldValue::Integer(v) => write!(f, "{}", v),
            FieldValue::Float(v) => write!(f, "{}", v),
            FieldValue::Text(v) => f.write_str(v),
        }
    }
}

impl From<i64> for FieldValue {
    fn from(value: i64) -> Self {
        FieldValue::Integer(value)
    }
}

impl From<f64> for FieldValue {
    fn from(value: f64) -> Self {
        if value.is_finite() {
            FieldValue::Float(value)
        } else {
            FieldValue::Null
        }
    }
}

impl From<bool> for FieldValue {
    fn from(value: bool) -> Self {
        FieldValue::Boolean(value)
    }
}

impl From<&str> for FieldValue {
    fn from(value: &str) -> Self {
        FieldValue::Text(value.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(value: String) -> Self {
        FieldValue::Text(value)
    }
}

impl<T: Into<FieldValue>> From<Option<T>> for FieldValue {
    fn from(value: Option<T>) -> Self {
        value.map(Into::into).unwrap_or(FieldValue::Null)
    }
}

use std::fmt::{self, Display};

use serde::{Deserialize, Serialize};

/// A resolved parameter or result value.
///
/// Values flow from sweep enumeration into rendered commands and sqlite rows,
/// so the variant set mirrors sqlite storage classes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParamValue {
    /// Integer value, stored as `INTEGER`.
    Int(i64),
    /// Floating point value, stored as `REAL`.
    Real(f64),
    /// String value, stored as `TEXT`.
    Text(String),
}

impl ParamValue {
    /// Returns the sqlite storage class used for columns holding this value.
    pub fn storage_class(&self) -> &'static str {
        match self {
            ParamValue::Int(_) => "INTEGER",
            ParamValue::Real(_) => "REAL",
            ParamValue::Text(_) => "TEXT",
        }
    }

    /// True when the value is numeric (integer or real).
    pub fn is_numeric(&self) -> bool {
        matches!(self, ParamValue::Int(_) | ParamValue::Real(_))
    }

    /// Numeric view of the value, if it has one.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            ParamValue::Int(v) => Some(*v as f64),
            ParamValue::Real(v) => Some(*v),
            ParamValue::Text(_) => None,
        }
    }

    /// Parses a textual capture into the narrowest matching variant.
    ///
    /// Integer first, then real, falling back to text. Used when dictionizing
    /// regex captures from raw program output.
    pub fn coerce(text: &str) -> ParamValue {
        if let Ok(v) = text.parse::<i64>() {
            return ParamValue::Int(v);
        }
        if let Ok(v) = text.parse::<f64>() {
            return ParamValue::Real(v);
        }
        ParamValue::Text(text.to_string())
    }

    /// Converts a JSON value into a parameter value where one exists.
    pub fn from_json(value: &serde_json::Value) -> Option<ParamValue> {
        match value {
            serde_json::Value::Number(n) => {
                if let Some(v) = n.as_i64() {
                    Some(ParamValue::Int(v))
                } else {
                    n.as_f64().map(ParamValue::Real)
                }
            }
            serde_json::Value::String(s) => Some(ParamValue::Text(s.clone())),
            serde_json::Value::Bool(b) => Some(ParamValue::Int(i64::from(*b))),
            _ => None,
        }
    }
}

impl Display for ParamValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParamValue::Int(v) => write!(f, "{v}"),
            ParamValue::Real(v) => write!(f, "{v}"),
            ParamValue::Text(v) => write!(f, "{v}"),
        }
    }
}

impl From<i64> for ParamValue {
    fn from(v: i64) -> Self {
        ParamValue::Int(v)
    }
}

impl From<f64> for ParamValue {
    fn from(v: f64) -> Self {
        ParamValue::Real(v)
    }
}

impl From<&str> for ParamValue {
    fn from(v: &str) -> Self {
        ParamValue::Text(v.to_string())
    }
}

impl From<String> for ParamValue {
    fn from(v: String) -> Self {
        ParamValue::Text(v)
    }
}

//! Values flowing through the router: bound parameters,
//! shard column values and result rows.

use std::fmt::{Display, Formatter, Result as FmtResult};

use serde::{Deserialize, Serialize};

/// A single SQL value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(untagged)]
pub enum Value {
    #[default]
    Null,
    Bool(bool),
    Integer(i64),
    Float(f64),
    Text(String),
    Bytes(Vec<u8>),
}

impl Value {
    /// Value is SQL NULL.
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Coerce to a 64-bit integer, if the value has an integral meaning.
    pub fn integer(&self) -> Option<i64> {
        match self {
            Self::Integer(int) => Some(*int),
            Self::Text(text) => text.trim().parse().ok(),
            Self::Float(float) if float.fract() == 0.0 && float.is_finite() => {
                let int = *float as i64;
                if int as f64 == *float {
                    Some(int)
                } else {
                    None
                }
            }
            Self::Bool(b) => Some(*b as i64),
            _ => None,
        }
    }

    /// Parse a value from its textual SQL representation,
    /// e.g. as supplied on the command line.
    pub fn guess(text: &str) -> Self {
        if text.eq_ignore_ascii_case("null") {
            Self::Null
        } else if let Ok(int) = text.parse::<i64>() {
            Self::Integer(int)
        } else if let Ok(float) = text.parse::<f64>() {
            Self::Float(float)
        } else {
            Self::Text(text.to_owned())
        }
    }
}

impl Display for Value {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            Self::Null => write!(f, "NULL"),
            Self::Bool(b) => write!(f, "{}", b),
            Self::Integer(int) => write!(f, "{}", int),
            Self::Float(float) => write!(f, "{}", float),
            Self::Text(text) => write!(f, "{}", text),
            Self::Bytes(bytes) => write!(f, "<{} bytes>", bytes.len()),
        }
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Self::Integer(value)
    }
}

impl From<i32> for Value {
    fn from(value: i32) -> Self {
        Self::Integer(value as i64)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Self::Text(value.to_owned())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_integer_coercion() {
        assert_eq!(Value::from(" 42 ").integer(), Some(42));
        assert_eq!(Value::Float(7.0).integer(), Some(7));
        assert_eq!(Value::Float(7.5).integer(), None);
        assert_eq!(Value::from("abc").integer(), None);
        assert_eq!(Value::Null.integer(), None);
    }

    #[test]
    fn test_guess() {
        assert_eq!(Value::guess("15"), Value::Integer(15));
        assert_eq!(Value::guess("NULL"), Value::Null);
        assert_eq!(Value::guess("1.5"), Value::Float(1.5));
        assert_eq!(Value::guess("bob"), Value::Text("bob".into()));
    }
}

use std::cmp::Ordering;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::document::Document;
use crate::error::DocumentError;

/// Type tag for [`Value`]. The discriminants are part of the on-disk record
/// format and must never be renumbered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValueType {
    Null,
    Bool,
    Integer,
    Double,
    Text,
    Blob,
    Duration,
    Array,
    Document,
}

impl ValueType {
    pub(crate) fn to_u8(self) -> u8 {
        match self {
            ValueType::Null => 1,
            ValueType::Bool => 2,
            ValueType::Integer => 3,
            ValueType::Double => 4,
            ValueType::Text => 5,
            ValueType::Blob => 6,
            ValueType::Duration => 7,
            ValueType::Array => 8,
            ValueType::Document => 9,
        }
    }

    pub(crate) fn from_u8(tag: u8) -> Option<Self> {
        Some(match tag {
            1 => ValueType::Null,
            2 => ValueType::Bool,
            3 => ValueType::Integer,
            4 => ValueType::Double,
            5 => ValueType::Text,
            6 => ValueType::Blob,
            7 => ValueType::Duration,
            8 => ValueType::Array,
            9 => ValueType::Document,
            _ => return None,
        })
    }

    /// Whether values of this type belong to the numeric comparison class.
    pub fn is_number(self) -> bool {
        matches!(
            self,
            ValueType::Integer | ValueType::Double | ValueType::Duration
        )
    }
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ValueType::Null => "null",
            ValueType::Bool => "bool",
            ValueType::Integer => "integer",
            ValueType::Double => "double",
            ValueType::Text => "text",
            ValueType::Blob => "blob",
            ValueType::Duration => "duration",
            ValueType::Array => "array",
            ValueType::Document => "document",
        };
        f.write_str(name)
    }
}

/// A dynamically typed value. `Duration` counts signed nanoseconds.
#[derive(Debug, Clone)]
pub enum Value {
    Null,
    Bool(bool),
    Integer(i64),
    Double(f64),
    Text(String),
    Blob(Vec<u8>),
    Duration(i64),
    Array(Vec<Value>),
    Document(Document),
}

impl Value {
    pub fn type_of(&self) -> ValueType {
        match self {
            Value::Null => ValueType::Null,
            Value::Bool(_) => ValueType::Bool,
            Value::Integer(_) => ValueType::Integer,
            Value::Double(_) => ValueType::Double,
            Value::Text(_) => ValueType::Text,
            Value::Blob(_) => ValueType::Blob,
            Value::Duration(_) => ValueType::Duration,
            Value::Array(_) => ValueType::Array,
            Value::Document(_) => ValueType::Document,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Truthiness used by filters: the zero value of every type is falsy.
    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Null => false,
            Value::Bool(b) => *b,
            Value::Integer(n) => *n != 0,
            Value::Double(d) => *d != 0.0,
            Value::Duration(n) => *n != 0,
            Value::Text(s) => !s.is_empty(),
            Value::Blob(b) => !b.is_empty(),
            Value::Array(a) => !a.is_empty(),
            Value::Document(d) => !d.is_empty(),
        }
    }

    /// Numeric payload as f64, for cross-type numeric comparison.
    fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Integer(n) | Value::Duration(n) => Some(*n as f64),
            Value::Double(d) => Some(*d),
            _ => None,
        }
    }

    /// Rank used for cross-type ordering:
    /// Null < Bool < numbers < Text < Blob < Array < Document.
    fn rank(&self) -> u8 {
        match self {
            Value::Null => 0,
            Value::Bool(_) => 1,
            Value::Integer(_) | Value::Double(_) | Value::Duration(_) => 2,
            Value::Text(_) => 3,
            Value::Blob(_) => 4,
            Value::Array(_) => 5,
            Value::Document(_) => 6,
        }
    }

    /// Total order over values: payload order within a type class, type rank
    /// across classes. This is the order used by ORDER BY and by index keys.
    pub fn cmp_values(&self, other: &Value) -> Ordering {
        let (ra, rb) = (self.rank(), other.rank());
        if ra != rb {
            return ra.cmp(&rb);
        }
        match (self, other) {
            (Value::Null, Value::Null) => Ordering::Equal,
            (Value::Bool(a), Value::Bool(b)) => a.cmp(b),
            (Value::Text(a), Value::Text(b)) => a.cmp(b),
            (Value::Blob(a), Value::Blob(b)) => a.cmp(b),
            (Value::Array(a), Value::Array(b)) => {
                for (x, y) in a.iter().zip(b.iter()) {
                    let ord = x.cmp_values(y);
                    if ord != Ordering::Equal {
                        return ord;
                    }
                }
                a.len().cmp(&b.len())
            }
            (Value::Document(a), Value::Document(b)) => cmp_documents(a, b),
            _ => {
                // Same rank, not caught above: the numeric class.
                let (a, b) = (self.as_f64().unwrap_or(0.0), other.as_f64().unwrap_or(0.0));
                a.partial_cmp(&b).unwrap_or(Ordering::Equal)
            }
        }
    }

    /// Convert to the target type following the explicit cast rules.
    pub fn cast_as(self, target: ValueType) -> Result<Value, DocumentError> {
        let from = self.type_of();
        if from == target {
            return Ok(self);
        }
        // NULL casts to NULL regardless of the target.
        if from == ValueType::Null {
            return Ok(Value::Null);
        }
        match (self, target) {
            (Value::Bool(b), ValueType::Integer) => Ok(Value::Integer(b as i64)),
            (Value::Integer(n), ValueType::Bool) => Ok(Value::Bool(n != 0)),
            (Value::Integer(n), ValueType::Double) => Ok(Value::Double(n as f64)),
            (Value::Integer(n), ValueType::Duration) => Ok(Value::Duration(n)),
            (Value::Duration(n), ValueType::Integer) => Ok(Value::Integer(n)),
            (Value::Double(d), ValueType::Integer) => {
                if !d.is_finite() {
                    return Err(DocumentError::Cast { from, to: target });
                }
                let t = d.trunc();
                if t < i64::MIN as f64 || t > i64::MAX as f64 {
                    return Err(DocumentError::Cast { from, to: target });
                }
                Ok(Value::Integer(t as i64))
            }
            (Value::Text(s), ValueType::Integer) => s
                .trim()
                .parse::<i64>()
                .map(Value::Integer)
                .map_err(|_| DocumentError::ParseNumber(s)),
            (Value::Text(s), ValueType::Double) => s
                .trim()
                .parse::<f64>()
                .map(Value::Double)
                .map_err(|_| DocumentError::ParseNumber(s)),
            (Value::Text(s), ValueType::Blob) => Ok(Value::Blob(s.into_bytes())),
            (Value::Blob(b), ValueType::Text) => match String::from_utf8(b) {
                Ok(s) => Ok(Value::Text(s)),
                Err(_) => Err(DocumentError::Cast { from, to: target }),
            },
            _ => Err(DocumentError::Cast { from, to: target }),
        }
    }
}

fn cmp_documents(a: &Document, b: &Document) -> Ordering {
    let fa = a.to_field_buffer().unwrap_or_default();
    let fb = b.to_field_buffer().unwrap_or_default();
    for (x, y) in fa.iter().zip(fb.iter()) {
        let ord = x.name.cmp(&y.name);
        if ord != Ordering::Equal {
            return ord;
        }
        let ord = x.value.cmp_values(&y.value);
        if ord != Ordering::Equal {
            return ord;
        }
    }
    fa.len().cmp(&fb.len())
}

impl PartialEq for Value {
    /// Equality across numeric types compares mathematical value;
    /// everything else requires matching types.
    fn eq(&self, other: &Self) -> bool {
        if self.type_of().is_number() && other.type_of().is_number() {
            return self.as_f64() == other.as_f64();
        }
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Text(a), Value::Text(b)) => a == b,
            (Value::Blob(a), Value::Blob(b)) => a == b,
            (Value::Array(a), Value::Array(b)) => a == b,
            (Value::Document(a), Value::Document(b)) => a == b,
            _ => false,
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Text(s.to_string())
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Integer(n)
    }
}

impl From<f64> for Value {
    fn from(d: f64) -> Self {
        Value::Double(d)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

//! JSON ingest and rendering for values and documents, plus a tagged serde
//! representation used by the catalog to persist values losslessly.

use std::fmt;

use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::document::{Document, Field, FieldBuffer};
use crate::error::DocumentError;
use crate::value::{Value, ValueType};

impl Value {
    /// Parse a JSON text into a value. Objects become documents preserving
    /// member order; numbers become Integer when they fit, Double otherwise.
    pub fn from_json(s: &str) -> Result<Value, DocumentError> {
        let json: serde_json::Value = serde_json::from_str(s)?;
        Ok(Value::from_json_value(json))
    }

    pub fn from_json_value(json: serde_json::Value) -> Value {
        match json {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(b),
            serde_json::Value::Number(n) => match n.as_i64() {
                Some(i) => Value::Integer(i),
                None => Value::Double(n.as_f64().unwrap_or(0.0)),
            },
            serde_json::Value::String(s) => Value::Text(s),
            serde_json::Value::Array(items) => {
                Value::Array(items.into_iter().map(Value::from_json_value).collect())
            }
            serde_json::Value::Object(map) => {
                let mut fb = FieldBuffer::new();
                for (name, value) in map {
                    fb.add(name, Value::from_json_value(value));
                }
                Value::Document(Document::Buf(fb))
            }
        }
    }

    /// Plain JSON rendering. Blobs render as byte arrays, durations as
    /// nanosecond integers.
    pub fn to_json(&self) -> Result<serde_json::Value, DocumentError> {
        Ok(match self {
            Value::Null => serde_json::Value::Null,
            Value::Bool(b) => serde_json::Value::Bool(*b),
            Value::Integer(n) | Value::Duration(n) => serde_json::Value::from(*n),
            Value::Double(d) => serde_json::Number::from_f64(*d)
                .map(serde_json::Value::Number)
                .ok_or_else(|| DocumentError::Json("non-finite double".into()))?,
            Value::Text(s) => serde_json::Value::String(s.clone()),
            Value::Blob(b) => serde_json::Value::Array(
                b.iter().map(|&byte| serde_json::Value::from(byte)).collect(),
            ),
            Value::Array(items) => serde_json::Value::Array(
                items
                    .iter()
                    .map(Value::to_json)
                    .collect::<Result<_, _>>()?,
            ),
            Value::Document(doc) => {
                let mut map = serde_json::Map::new();
                doc.iterate(|name, value| {
                    map.insert(name.to_string(), value.to_json()?);
                    Ok(())
                })?;
                serde_json::Value::Object(map)
            }
        })
    }
}

impl FieldBuffer {
    /// Parse a JSON object into a field buffer, preserving member order.
    pub fn from_json(s: &str) -> Result<FieldBuffer, DocumentError> {
        match Value::from_json(s)? {
            Value::Document(doc) => doc.to_field_buffer(),
            other => Err(DocumentError::Json(format!(
                "expected a JSON object, got {}",
                other.type_of()
            ))),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.to_json() {
            Ok(json) => write!(f, "{json}"),
            Err(_) => write!(f, "<invalid>"),
        }
    }
}

impl fmt::Display for FieldBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{")?;
        for (i, Field { name, value }) in self.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{name:?}: {value}")?;
        }
        write!(f, "}}")
    }
}

impl fmt::Display for Document {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.to_field_buffer() {
            Ok(fb) => fb.fmt(f),
            Err(_) => write!(f, "<invalid document>"),
        }
    }
}

// ── Tagged serde form ───────────────────────────────────────────
//
// Plain JSON cannot distinguish Blob from Array or Duration from Integer,
// so persisted values (catalog defaults) carry an explicit type tag.

#[derive(Serialize, Deserialize)]
struct Tagged {
    t: ValueType,
    v: serde_json::Value,
}

fn to_tagged(value: &Value) -> Result<Tagged, DocumentError> {
    let v = match value {
        Value::Array(items) => serde_json::Value::Array(
            items
                .iter()
                .map(|item| {
                    to_tagged(item).and_then(|t| serde_json::to_value(t).map_err(Into::into))
                })
                .collect::<Result<_, DocumentError>>()?,
        ),
        Value::Document(doc) => {
            let mut pairs = Vec::new();
            doc.iterate(|name, field_value| {
                let tagged = serde_json::to_value(to_tagged(&field_value)?)?;
                pairs.push(serde_json::Value::Array(vec![
                    serde_json::Value::String(name.to_string()),
                    tagged,
                ]));
                Ok(())
            })?;
            serde_json::Value::Array(pairs)
        }
        other => other.to_json()?,
    };
    Ok(Tagged {
        t: value.type_of(),
        v,
    })
}

fn from_tagged(tagged: Tagged) -> Result<Value, DocumentError> {
    let bad = |msg: &str| DocumentError::Json(msg.to_string());
    Ok(match tagged.t {
        ValueType::Null => Value::Null,
        ValueType::Bool => Value::Bool(tagged.v.as_bool().ok_or_else(|| bad("expected bool"))?),
        ValueType::Integer => {
            Value::Integer(tagged.v.as_i64().ok_or_else(|| bad("expected integer"))?)
        }
        ValueType::Duration => {
            Value::Duration(tagged.v.as_i64().ok_or_else(|| bad("expected integer"))?)
        }
        ValueType::Double => {
            Value::Double(tagged.v.as_f64().ok_or_else(|| bad("expected number"))?)
        }
        ValueType::Text => Value::Text(
            tagged
                .v
                .as_str()
                .ok_or_else(|| bad("expected string"))?
                .to_string(),
        ),
        ValueType::Blob => {
            let items = tagged.v.as_array().ok_or_else(|| bad("expected array"))?;
            let bytes = items
                .iter()
                .map(|item| {
                    item.as_u64()
                        .and_then(|n| u8::try_from(n).ok())
                        .ok_or_else(|| bad("expected byte"))
                })
                .collect::<Result<_, _>>()?;
            Value::Blob(bytes)
        }
        ValueType::Array => {
            let serde_json::Value::Array(items) = tagged.v else {
                return Err(bad("expected array"));
            };
            Value::Array(
                items
                    .into_iter()
                    .map(|item| from_tagged(serde_json::from_value(item)?))
                    .collect::<Result<_, DocumentError>>()?,
            )
        }
        ValueType::Document => {
            let serde_json::Value::Array(pairs) = tagged.v else {
                return Err(bad("expected array of pairs"));
            };
            let mut fb = FieldBuffer::new();
            for pair in pairs {
                let serde_json::Value::Array(mut kv) = pair else {
                    return Err(bad("expected [name, value] pair"));
                };
                if kv.len() != 2 {
                    return Err(bad("expected [name, value] pair"));
                }
                let value = from_tagged(serde_json::from_value(kv.pop().unwrap())?)?;
                let serde_json::Value::String(name) = kv.pop().unwrap() else {
                    return Err(bad("expected field name"));
                };
                fb.add(name, value);
            }
            Value::Document(Document::Buf(fb))
        }
    })
}

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let tagged = to_tagged(self).map_err(serde::ser::Error::custom)?;
        tagged.serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Value {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let tagged = Tagged::deserialize(deserializer)?;
        from_tagged(tagged).map_err(D::Error::custom)
    }
}

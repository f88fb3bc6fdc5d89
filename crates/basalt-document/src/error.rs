use std::fmt;

use crate::value::ValueType;

#[derive(Debug)]
pub enum DocumentError {
    Encoding(String),
    Cast { from: ValueType, to: ValueType },
    ParseNumber(String),
    EmptyFieldName,
    PayloadTooLarge,
    InvalidPath(String),
    Json(String),
}

impl fmt::Display for DocumentError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DocumentError::Encoding(msg) => write!(f, "encoding error: {msg}"),
            DocumentError::Cast { from, to } => write!(f, "cannot cast {from} as {to}"),
            DocumentError::ParseNumber(lit) => write!(f, "cannot parse {lit:?} as a number"),
            DocumentError::EmptyFieldName => write!(f, "field name cannot be empty"),
            DocumentError::PayloadTooLarge => write!(f, "field payload exceeds maximum size"),
            DocumentError::InvalidPath(msg) => write!(f, "invalid path: {msg}"),
            DocumentError::Json(msg) => write!(f, "json error: {msg}"),
        }
    }
}

impl std::error::Error for DocumentError {}

impl From<serde_json::Error> for DocumentError {
    fn from(e: serde_json::Error) -> Self {
        DocumentError::Json(e.to_string())
    }
}

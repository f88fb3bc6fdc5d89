use std::fmt;

use basalt_document::{DocumentError, ValueType};
use basalt_store::StoreError;

#[derive(Debug)]
pub enum EngineError {
    TransactionReadOnly,
    TableNotFound(String),
    TableAlreadyExists(String),
    IndexNotFound(String),
    IndexAlreadyExists(String),
    /// No record stored under the given primary key.
    KeyNotFound,
    /// A record with the same primary key already exists.
    DuplicateKey(String),
    UniqueViolation(String),
    NotNullViolation(String),
    TypeMismatch {
        path: String,
        expected: ValueType,
        got: ValueType,
    },
    InvalidName(String),
    Document(DocumentError),
    Store(StoreError),
    Corrupted(String),
}

impl fmt::Display for EngineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TransactionReadOnly => write!(f, "transaction is read-only"),
            Self::TableNotFound(name) => write!(f, "table not found: {name}"),
            Self::TableAlreadyExists(name) => write!(f, "table already exists: {name}"),
            Self::IndexNotFound(name) => write!(f, "index not found: {name}"),
            Self::IndexAlreadyExists(name) => write!(f, "index already exists: {name}"),
            Self::KeyNotFound => write!(f, "key not found"),
            Self::DuplicateKey(key) => write!(f, "duplicate primary key: {key}"),
            Self::UniqueViolation(index) => {
                write!(f, "unique constraint violated by index {index}")
            }
            Self::NotNullViolation(path) => write!(f, "{path} must not be null"),
            Self::TypeMismatch {
                path,
                expected,
                got,
            } => write!(f, "{path} expects a {expected}, got a {got}"),
            Self::InvalidName(name) => write!(f, "invalid name: {name:?}"),
            Self::Document(e) => write!(f, "{e}"),
            Self::Store(e) => write!(f, "{e}"),
            Self::Corrupted(msg) => write!(f, "corrupted catalog entry: {msg}"),
        }
    }
}

impl std::error::Error for EngineError {}

impl From<StoreError> for EngineError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::ReadOnly => EngineError::TransactionReadOnly,
            other => EngineError::Store(other),
        }
    }
}

impl From<DocumentError> for EngineError {
    fn from(e: DocumentError) -> Self {
        EngineError::Document(e)
    }
}

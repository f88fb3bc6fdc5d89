use std::fmt;

use basalt_document::DocumentError;
use basalt_engine::EngineError;
use basalt_sql::{EvalError, ParseError};
use basalt_store::StoreError;

#[derive(Debug)]
pub enum ConstraintError {
    NotNull(String),
    Unique(String),
    PrimaryKey(String),
    SchemaType(String),
}

impl fmt::Display for ConstraintError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConstraintError::NotNull(path) => write!(f, "{path} must not be null"),
            ConstraintError::Unique(index) => {
                write!(f, "unique constraint violated by index {index}")
            }
            ConstraintError::PrimaryKey(key) => write!(f, "duplicate primary key: {key}"),
            ConstraintError::SchemaType(msg) => write!(f, "{msg}"),
        }
    }
}

#[derive(Debug)]
pub enum Error {
    Parse(ParseError),
    Eval(EvalError),
    Document(DocumentError),
    TableNotFound(String),
    IndexNotFound(String),
    Constraint(ConstraintError),
    Type(String),
    InvalidStatement(String),
    AlreadyInTransaction,
    NoActiveTransaction,
    Engine(EngineError),
    Store(StoreError),
    /// Control signal for early stream termination; never user-visible.
    StreamClosed,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Parse(e) => write!(f, "{e}"),
            Error::Eval(e) => write!(f, "{e}"),
            Error::Document(e) => write!(f, "{e}"),
            Error::TableNotFound(name) => write!(f, "table not found: {name}"),
            Error::IndexNotFound(name) => write!(f, "index not found: {name}"),
            Error::Constraint(e) => write!(f, "{e}"),
            Error::Type(msg) => write!(f, "type error: {msg}"),
            Error::InvalidStatement(msg) => write!(f, "invalid statement: {msg}"),
            Error::AlreadyInTransaction => write!(f, "a transaction is already open"),
            Error::NoActiveTransaction => write!(f, "no transaction is open"),
            Error::Engine(e) => write!(f, "{e}"),
            Error::Store(e) => write!(f, "{e}"),
            Error::StreamClosed => write!(f, "stream closed"),
        }
    }
}

impl std::error::Error for Error {}

impl From<ParseError> for Error {
    fn from(e: ParseError) -> Self {
        Error::Parse(e)
    }
}

impl From<EvalError> for Error {
    fn from(e: EvalError) -> Self {
        Error::Eval(e)
    }
}

impl From<DocumentError> for Error {
    fn from(e: DocumentError) -> Self {
        Error::Document(e)
    }
}

impl From<StoreError> for Error {
    fn from(e: StoreError) -> Self {
        Error::Store(e)
    }
}

impl From<EngineError> for Error {
    fn from(e: EngineError) -> Self {
        match e {
            EngineError::TableNotFound(name) => Error::TableNotFound(name),
            EngineError::IndexNotFound(name) => Error::IndexNotFound(name),
            EngineError::NotNullViolation(path) => {
                Error::Constraint(ConstraintError::NotNull(path))
            }
            EngineError::UniqueViolation(index) => {
                Error::Constraint(ConstraintError::Unique(index))
            }
            EngineError::DuplicateKey(key) => {
                Error::Constraint(ConstraintError::PrimaryKey(key))
            }
            EngineError::TypeMismatch { .. } => {
                Error::Constraint(ConstraintError::SchemaType(e.to_string()))
            }
            EngineError::Document(e) => Error::Document(e),
            EngineError::Store(e) => Error::Store(e),
            other => Error::Engine(other),
        }
    }
}

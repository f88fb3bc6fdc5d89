use std::fmt;

use basalt_document::DocumentError;

use crate::scanner::Pos;

/// Syntactic failure: what was found, what was expected, and where.
#[derive(Debug, Clone, PartialEq)]
pub struct ParseError {
    pub found: String,
    pub expected: Vec<String>,
    pub pos: Pos,
    pub message: Option<String>,
}

impl ParseError {
    pub fn new(found: impl Into<String>, expected: Vec<String>, pos: Pos) -> Self {
        Self {
            found: found.into(),
            expected,
            pos,
            message: None,
        }
    }

    pub fn with_message(message: impl Into<String>, pos: Pos) -> Self {
        Self {
            found: String::new(),
            expected: Vec::new(),
            pos,
            message: Some(message.into()),
        }
    }
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.message {
            Some(msg) => write!(f, "{} at line {}, char {}", msg, self.pos.line, self.pos.column),
            None => write!(
                f,
                "found {}, expected {} at line {}, char {}",
                self.found,
                self.expected.join(", "),
                self.pos.line,
                self.pos.column
            ),
        }
    }
}

impl std::error::Error for ParseError {}

/// Runtime expression failure.
#[derive(Debug)]
pub enum EvalError {
    /// A path was evaluated without a current value in scope.
    NoCurrentValue,
    UnknownParameter(String),
    ParameterOutOfRange(usize),
    DivideByZero,
    Type(String),
    BadLikePattern(String),
    UnknownFunction(String),
    Document(DocumentError),
}

impl fmt::Display for EvalError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EvalError::NoCurrentValue => write!(f, "field not found: no value in scope"),
            EvalError::UnknownParameter(name) => write!(f, "parameter not found: ${name}"),
            EvalError::ParameterOutOfRange(i) => write!(f, "no parameter bound at position {i}"),
            EvalError::DivideByZero => write!(f, "division by zero"),
            EvalError::Type(msg) => write!(f, "type error: {msg}"),
            EvalError::BadLikePattern(msg) => write!(f, "invalid LIKE pattern: {msg}"),
            EvalError::UnknownFunction(name) => write!(f, "unknown function: {name}()"),
            EvalError::Document(e) => write!(f, "{e}"),
        }
    }
}

impl std::error::Error for EvalError {}

impl From<DocumentError> for EvalError {
    fn from(e: DocumentError) -> Self {
        EvalError::Document(e)
    }
}

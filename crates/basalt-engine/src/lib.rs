mod catalog;
mod error;
mod keys;
mod transaction;
mod validate;

pub use catalog::{FieldConstraint, IndexInfo, Sequence, TableHandle, TableInfo};
pub use error::EngineError;
pub use transaction::{Engine, IndexEntry, IndexIter, RecordIter, Transaction};

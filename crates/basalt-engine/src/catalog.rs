use serde::{Deserialize, Serialize};

use basalt_document::{Path, Value, ValueType};

/// Declared constraints for one document path. `UNIQUE` is not stored here:
/// the runner declares it as a unique index instead.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldConstraint {
    pub path: Path,
    pub ty: Option<ValueType>,
    pub primary_key: bool,
    pub not_null: bool,
    pub default_value: Option<Value>,
}

impl FieldConstraint {
    pub fn new(path: Path) -> Self {
        FieldConstraint {
            path,
            ty: None,
            primary_key: false,
            not_null: false,
            default_value: None,
        }
    }
}

/// Monotonic integer generator backing AUTOINCREMENT columns.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sequence {
    pub path: Path,
    pub start: i64,
    pub increment: i64,
    /// Greatest value issued or observed so far.
    pub last: Option<i64>,
}

impl Sequence {
    /// The next value: strictly greater than everything issued before.
    pub fn next_value(&self) -> i64 {
        match self.last {
            Some(last) => last.saturating_add(self.increment.max(1)),
            None => self.start,
        }
    }
}

/// Table metadata persisted in the system keyspace.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct TableInfo {
    pub constraints: Vec<FieldConstraint>,
    pub sequences: Vec<Sequence>,
    /// Backs the synthetic primary key of tables declared without one.
    pub next_rowid: i64,
}

impl TableInfo {
    pub fn primary_key(&self) -> Option<&FieldConstraint> {
        self.constraints.iter().find(|fc| fc.primary_key)
    }

    pub fn sequence_for(&self, path: &Path) -> Option<&Sequence> {
        self.sequences.iter().find(|s| &s.path == path)
    }
}

/// Secondary index metadata persisted in the system keyspace.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexInfo {
    pub name: String,
    pub table: String,
    pub paths: Vec<Path>,
    pub unique: bool,
}

/// A resolved table: metadata plus its indexes, valid for the transaction
/// that produced it. Plain data, cheap to clone into plan nodes.
#[derive(Debug, Clone, PartialEq)]
pub struct TableHandle {
    pub name: String,
    pub info: TableInfo,
    pub indexes: Vec<IndexInfo>,
}

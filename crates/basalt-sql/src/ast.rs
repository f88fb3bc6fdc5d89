use basalt_document::{Path, ValueType};

use crate::expr::Expr;

/// Sort direction for ORDER BY and index scans.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Direction {
    #[default]
    Asc,
    Desc,
}

/// A parsed SQL statement.
#[derive(Debug, Clone, PartialEq)]
pub enum Statement {
    CreateTable(CreateTableStmt),
    CreateIndex(CreateIndexStmt),
    DropTable(DropTableStmt),
    DropIndex(DropIndexStmt),
    AlterTableRename { table: String, new_name: String },
    Insert(InsertStmt),
    Update(UpdateStmt),
    Delete(DeleteStmt),
    Select(SelectStmt),
    Explain(Box<Statement>),
    Reindex(ReindexStmt),
    Begin { read_only: bool },
    Commit,
    Rollback,
}

impl Statement {
    pub fn is_read_only(&self) -> bool {
        match self {
            Statement::Select(_) => true,
            Statement::Explain(inner) => inner.is_read_only(),
            _ => false,
        }
    }
}

/// One projected column: a wildcard or an expression labeled by its raw
/// source text (or an explicit alias).
#[derive(Debug, Clone, PartialEq)]
pub enum Projection {
    Wildcard,
    Expr { expr: Expr, name: String },
}

#[derive(Debug, Clone, PartialEq)]
pub struct SelectStmt {
    pub distinct: bool,
    pub projections: Vec<Projection>,
    pub table: Option<String>,
    pub filter: Option<Expr>,
    pub group_by: Option<Expr>,
    pub order_by: Option<(Path, Direction)>,
    pub offset: Option<Expr>,
    pub limit: Option<Expr>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum InsertSource {
    /// One expression per row: a document literal, a column-zipped value
    /// list, or a parameter.
    Values(Vec<Expr>),
    Select(Box<SelectStmt>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct InsertStmt {
    pub table: String,
    pub columns: Vec<String>,
    pub source: InsertSource,
    pub returning: Vec<Projection>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum UpdateAction {
    Set(Vec<(Path, Expr)>),
    Unset(Vec<String>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct UpdateStmt {
    pub table: String,
    pub action: UpdateAction,
    pub filter: Option<Expr>,
    pub returning: Vec<Projection>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DeleteStmt {
    pub table: String,
    pub filter: Option<Expr>,
    pub returning: Vec<Projection>,
}

/// A declared constraint set for one document path.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldConstraint {
    pub path: Path,
    pub ty: Option<ValueType>,
    pub primary_key: bool,
    pub not_null: bool,
    pub unique: bool,
    pub default_value: Option<Expr>,
    /// `AUTOINCREMENT[(start, increment)]`, integer fields only.
    pub auto_increment: Option<(i64, i64)>,
}

impl FieldConstraint {
    pub fn new(path: Path) -> Self {
        FieldConstraint {
            path,
            ty: None,
            primary_key: false,
            not_null: false,
            unique: false,
            default_value: None,
            auto_increment: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CreateTableStmt {
    pub table: String,
    pub if_not_exists: bool,
    pub fields: Vec<FieldConstraint>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CreateIndexStmt {
    /// Generated from the table and paths when the statement names none.
    pub name: Option<String>,
    pub table: String,
    pub paths: Vec<Path>,
    pub unique: bool,
    pub if_not_exists: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DropTableStmt {
    pub table: String,
    pub if_exists: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DropIndexStmt {
    pub name: String,
    pub if_exists: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ReindexStmt {
    /// A table or index name; everything when absent.
    pub target: Option<String>,
}

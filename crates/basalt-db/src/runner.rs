//! Statement execution: bind to a transaction, optimize, run.

use basalt_document::{FieldBuffer, Value};
use basalt_engine::{EngineError, FieldConstraint, IndexInfo, Sequence, TableInfo, Transaction};
use basalt_sql::{
    CreateIndexStmt, CreateTableStmt, Environment, Param, Statement,
};
use basalt_store::Store;

use crate::error::Error;
use crate::optimizer::optimize;
use crate::planner;
use crate::result::ResultSet;
use crate::stream::{Stream, exec};

/// Run one statement inside the given transaction.
pub fn run_statement<S: Store>(
    stmt: &Statement,
    tx: &Transaction<'_, S>,
    params: &[Param],
) -> Result<ResultSet, Error> {
    match stmt {
        Statement::CreateTable(create) => run_create_table(create, tx),
        Statement::CreateIndex(create) => run_create_index(create, tx),
        Statement::DropTable(drop) => match tx.drop_table(&drop.table) {
            Err(EngineError::TableNotFound(_)) if drop.if_exists => Ok(ResultSet::default()),
            Err(e) => Err(e.into()),
            Ok(_) => Ok(ResultSet::default()),
        },
        Statement::DropIndex(drop) => match tx.drop_index(&drop.name) {
            Err(EngineError::IndexNotFound(_)) if drop.if_exists => Ok(ResultSet::default()),
            Err(e) => Err(e.into()),
            Ok(()) => Ok(ResultSet::default()),
        },
        Statement::AlterTableRename { table, new_name } => {
            tx.rename_table(table, new_name)?;
            Ok(ResultSet::default())
        }
        Statement::Reindex(reindex) => {
            tx.reindex(reindex.target.as_deref())?;
            Ok(ResultSet::default())
        }
        Statement::Select(select) => {
            let stream = planner::select_to_stream(select, tx)?;
            exec_stream(stream, tx, params, true)
        }
        Statement::Insert(insert) => {
            let stream = planner::insert_to_stream(insert, tx)?;
            exec_stream(stream, tx, params, !insert.returning.is_empty())
        }
        Statement::Update(update) => {
            let stream = planner::update_to_stream(update, tx)?;
            exec_stream(stream, tx, params, !update.returning.is_empty())
        }
        Statement::Delete(delete) => {
            let stream = planner::delete_to_stream(delete, tx)?;
            exec_stream(stream, tx, params, !delete.returning.is_empty())
        }
        Statement::Explain(inner) => run_explain(inner, tx),
        Statement::Begin { .. } | Statement::Commit | Statement::Rollback => {
            Err(Error::InvalidStatement(
                "transaction statements run at the session level".into(),
            ))
        }
    }
}

/// EXPLAIN renders the optimized pipeline instead of executing it.
fn run_explain<S: Store>(
    inner: &Statement,
    tx: &Transaction<'_, S>,
) -> Result<ResultSet, Error> {
    let stream = match inner {
        Statement::Select(select) => planner::select_to_stream(select, tx)?,
        Statement::Insert(insert) => planner::insert_to_stream(insert, tx)?,
        Statement::Update(update) => planner::update_to_stream(update, tx)?,
        Statement::Delete(delete) => planner::delete_to_stream(delete, tx)?,
        other => {
            return Err(Error::InvalidStatement(format!(
                "cannot explain a {} statement",
                statement_keyword(other)
            )));
        }
    };
    let optimized = optimize(stream);
    let mut row = FieldBuffer::new();
    row.add("plan", Value::Text(optimized.to_string()));
    Ok(ResultSet::new(vec![row], 1))
}

fn exec_stream<S: Store>(
    stream: Stream,
    tx: &Transaction<'_, S>,
    params: &[Param],
    collect_rows: bool,
) -> Result<ResultSet, Error> {
    let optimized = optimize(stream);
    tracing::debug!(plan = %optimized, "executing stream");

    let mut rows = Vec::new();
    let mut count = 0u64;
    exec::iterate(&optimized, tx, params, &mut |env| {
        count += 1;
        if collect_rows
            && let Some(Value::Document(doc)) = env.get_current_value()
        {
            rows.push(doc.to_field_buffer()?);
        }
        Ok(())
    })?;
    Ok(ResultSet::new(rows, count))
}

// ── DDL ─────────────────────────────────────────────────────────

fn run_create_table<S: Store>(
    stmt: &CreateTableStmt,
    tx: &Transaction<'_, S>,
) -> Result<ResultSet, Error> {
    let mut constraints = Vec::new();
    let mut sequences = Vec::new();
    let mut unique_paths = Vec::new();

    for field in &stmt.fields {
        let mut fc = FieldConstraint::new(field.path.clone());
        fc.ty = field.ty;
        fc.primary_key = field.primary_key;
        fc.not_null = field.not_null;
        if let Some(default) = &field.default_value {
            let value = default
                .eval(&Environment::default())
                .map_err(|_| Error::InvalidStatement("DEFAULT expects a constant".into()))?;
            fc.default_value = Some(value);
        }
        if let Some((start, increment)) = field.auto_increment {
            sequences.push(Sequence {
                path: field.path.clone(),
                start,
                increment,
                last: None,
            });
        }
        if field.unique {
            unique_paths.push(field.path.clone());
        }
        constraints.push(fc);
    }

    let info = TableInfo {
        constraints,
        sequences,
        next_rowid: 0,
    };
    match tx.create_table(&stmt.table, info) {
        Err(EngineError::TableAlreadyExists(_)) if stmt.if_not_exists => {
            return Ok(ResultSet::default());
        }
        other => other?,
    }

    // Declared UNIQUE constraints become unique secondary indexes.
    for path in unique_paths {
        tx.create_index(IndexInfo {
            name: format!("{}_{}_idx", stmt.table, path),
            table: stmt.table.clone(),
            paths: vec![path],
            unique: true,
        })?;
    }
    Ok(ResultSet::default())
}

fn run_create_index<S: Store>(
    stmt: &CreateIndexStmt,
    tx: &Transaction<'_, S>,
) -> Result<ResultSet, Error> {
    let name = stmt.name.clone().unwrap_or_else(|| {
        let paths = stmt
            .paths
            .iter()
            .map(|p| p.to_string())
            .collect::<Vec<_>>()
            .join("_");
        format!("{}_{}_idx", stmt.table, paths)
    });
    let info = IndexInfo {
        name,
        table: stmt.table.clone(),
        paths: stmt.paths.clone(),
        unique: stmt.unique,
    };
    match tx.create_index(info) {
        Err(EngineError::IndexAlreadyExists(_)) if stmt.if_not_exists => {
            Ok(ResultSet::default())
        }
        Err(e) => Err(e.into()),
        Ok(()) => Ok(ResultSet::default()),
    }
}

fn statement_keyword(stmt: &Statement) -> &'static str {
    match stmt {
        Statement::CreateTable(_) => "CREATE TABLE",
        Statement::CreateIndex(_) => "CREATE INDEX",
        Statement::DropTable(_) => "DROP TABLE",
        Statement::DropIndex(_) => "DROP INDEX",
        Statement::AlterTableRename { .. } => "ALTER TABLE",
        Statement::Insert(_) => "INSERT",
        Statement::Update(_) => "UPDATE",
        Statement::Delete(_) => "DELETE",
        Statement::Select(_) => "SELECT",
        Statement::Explain(_) => "EXPLAIN",
        Statement::Reindex(_) => "REINDEX",
        Statement::Begin { .. } => "BEGIN",
        Statement::Commit => "COMMIT",
        Statement::Rollback => "ROLLBACK",
    }
}

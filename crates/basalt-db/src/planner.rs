//! Lowering from statement ASTs to operator streams. Table and index
//! handles are resolved here, before optimization, so resolution errors
//! surface without touching any data.

use basalt_document::{Path, Value};
use basalt_engine::Transaction;
use basalt_sql::{
    DeleteStmt, Direction, Expr, Function, InsertSource, InsertStmt, Projection, SelectStmt,
    UpdateAction, UpdateStmt,
};
use basalt_store::Store;

use crate::error::Error;
use crate::stream::{AggregatorBuilder, Op, Stream};

pub(crate) fn select_to_stream<S: Store>(
    stmt: &SelectStmt,
    tx: &Transaction<'_, S>,
) -> Result<Stream, Error> {
    let mut stream = match &stmt.table {
        Some(name) => Stream::new(Op::SeqScan {
            table: tx.table(name)?,
        }),
        None => {
            if stmt
                .projections
                .iter()
                .any(|p| matches!(p, Projection::Wildcard))
            {
                return Err(Error::InvalidStatement(
                    "SELECT * requires a FROM clause".into(),
                ));
            }
            // One empty row to project the expressions over.
            Stream::new(Op::Expressions {
                exprs: vec![Expr::Literal(Value::Null)],
            })
        }
    };

    if let Some(filter) = &stmt.filter {
        stream = stream.pipe(Op::Filter {
            expr: filter.clone(),
        });
    }
    if let Some(group) = &stmt.group_by {
        stream = stream.pipe(Op::GroupBy {
            expr: group.clone(),
        });
    }

    let aggregates = collect_aggregates(&stmt.projections);
    let mut projections = stmt.projections.clone();
    if stmt.group_by.is_some() || !aggregates.is_empty() {
        let mut builders: Vec<AggregatorBuilder> = aggregates
            .iter()
            .filter_map(AggregatorBuilder::from_function)
            .collect();
        if let Some(group) = &stmt.group_by {
            // A projected expression equal to the GROUP BY key reads the key
            // copied into the aggregated document instead of re-evaluating.
            let key_field = group.to_string();
            let mut projected = false;
            for projection in &mut projections {
                if let Projection::Expr { expr, .. } = projection
                    && expr == group
                {
                    projected = true;
                    *expr = Expr::Path(Path::field(key_field.clone()));
                }
            }
            if projected {
                builders.push(AggregatorBuilder::GroupKey { name: key_field });
            }
        }
        stream = stream.pipe(Op::HashAggregate { builders });
    }

    if let Some((path, direction)) = &stmt.order_by {
        stream = stream.pipe(Op::Sort {
            path: path.clone(),
            reverse: *direction == Direction::Desc,
        });
    }

    stream = stream.pipe(Op::Project {
        fields: projections,
    });

    if stmt.distinct {
        stream = stream.pipe(Op::Distinct);
    }
    if let Some(offset) = &stmt.offset {
        stream = stream.pipe(Op::Skip {
            expr: offset.clone(),
        });
    }
    if let Some(limit) = &stmt.limit {
        stream = stream.pipe(Op::Take { expr: limit.clone() });
    }
    Ok(stream)
}

fn collect_aggregates(projections: &[Projection]) -> Vec<Function> {
    let mut out: Vec<Function> = Vec::new();
    for projection in projections {
        if let Projection::Expr { expr, .. } = projection {
            for func in expr.aggregates() {
                if !out.contains(&func) {
                    out.push(func);
                }
            }
        }
    }
    out
}

pub(crate) fn insert_to_stream<S: Store>(
    stmt: &InsertStmt,
    tx: &Transaction<'_, S>,
) -> Result<Stream, Error> {
    let handle = tx.table(&stmt.table)?;
    let mut stream = match &stmt.source {
        InsertSource::Values(exprs) => Stream::new(Op::Expressions {
            exprs: exprs.clone(),
        }),
        InsertSource::Select(select) => {
            let mut stream = select_to_stream(select, tx)?;
            if !stmt.columns.is_empty() {
                stream = stream.pipe(Op::IterRename {
                    columns: stmt.columns.clone(),
                });
            }
            stream
        }
    };
    stream = stream.pipe(Op::TableInsert { table: handle });
    if !stmt.returning.is_empty() {
        stream = stream.pipe(Op::Project {
            fields: stmt.returning.clone(),
        });
    }
    Ok(stream)
}

pub(crate) fn update_to_stream<S: Store>(
    stmt: &UpdateStmt,
    tx: &Transaction<'_, S>,
) -> Result<Stream, Error> {
    let handle = tx.table(&stmt.table)?;
    let mut stream = Stream::new(Op::SeqScan {
        table: handle.clone(),
    });
    if let Some(filter) = &stmt.filter {
        stream = stream.pipe(Op::Filter {
            expr: filter.clone(),
        });
    }
    match &stmt.action {
        UpdateAction::Set(pairs) => {
            for (path, expr) in pairs {
                stream = stream.pipe(Op::Set {
                    path: path.clone(),
                    expr: expr.clone(),
                });
            }
        }
        UpdateAction::Unset(fields) => {
            for field in fields {
                stream = stream.pipe(Op::Unset {
                    field: field.clone(),
                });
            }
        }
    }
    stream = stream.pipe(Op::TableReplace { table: handle });
    if !stmt.returning.is_empty() {
        stream = stream.pipe(Op::Project {
            fields: stmt.returning.clone(),
        });
    }
    Ok(stream)
}

pub(crate) fn delete_to_stream<S: Store>(
    stmt: &DeleteStmt,
    tx: &Transaction<'_, S>,
) -> Result<Stream, Error> {
    let handle = tx.table(&stmt.table)?;
    let mut stream = Stream::new(Op::SeqScan {
        table: handle.clone(),
    });
    if let Some(filter) = &stmt.filter {
        stream = stream.pipe(Op::Filter {
            expr: filter.clone(),
        });
    }
    stream = stream.pipe(Op::TableDelete { table: handle });
    if !stmt.returning.is_empty() {
        stream = stream.pipe(Op::Project {
            fields: stmt.returning.clone(),
        });
    }
    Ok(stream)
}

//! Rule-based stream rewriting. Rules run in a fixed order; each takes a
//! stream and returns an equivalent one (same output documents, same order
//! when a sort is present).

use basalt_engine::IndexInfo;
use basalt_sql::{BinaryOperator, Environment, Expr, Projection};

use crate::stream::{IndexOperator, Op, Stream};

pub fn optimize(stream: Stream) -> Stream {
    let stream = split_and(stream);
    let stream = precompute_expressions(stream);
    let stream = remove_unnecessary_selections(stream);
    use_index(stream)
}

// ── SplitAND ────────────────────────────────────────────────────

/// `filter(a AND b)` becomes `filter(a) -> filter(b)`. The split descends
/// only through AND; an OR stops the decomposition.
fn split_and(stream: Stream) -> Stream {
    let mut ops = Vec::with_capacity(stream.ops.len());
    for op in stream.ops {
        match op {
            Op::Filter { expr } => {
                let mut parts = Vec::new();
                collect_and(expr, &mut parts);
                for part in parts {
                    ops.push(Op::Filter { expr: part });
                }
            }
            other => ops.push(other),
        }
    }
    Stream { ops }
}

fn collect_and(expr: Expr, out: &mut Vec<Expr>) {
    match expr {
        Expr::Binary {
            op: BinaryOperator::And,
            lhs,
            rhs,
        } => {
            collect_and(*lhs, out);
            collect_and(*rhs, out);
        }
        other => out.push(other),
    }
}

// ── PrecomputeExpr ──────────────────────────────────────────────

/// Fold constant sub-expressions bottom-up. Evaluation failures leave the
/// expression unfolded for the runtime to report.
fn precompute_expressions(stream: Stream) -> Stream {
    let ops = stream
        .ops
        .into_iter()
        .map(|op| match op {
            Op::Filter { expr } => Op::Filter { expr: fold(expr) },
            Op::Map { expr } => Op::Map { expr: fold(expr) },
            Op::Expressions { exprs } => Op::Expressions {
                exprs: exprs.into_iter().map(fold).collect(),
            },
            Op::Project { fields } => Op::Project {
                fields: fields
                    .into_iter()
                    .map(|field| match field {
                        Projection::Expr { expr, name } => Projection::Expr {
                            expr: fold(expr),
                            name,
                        },
                        wildcard => wildcard,
                    })
                    .collect(),
            },
            Op::Set { path, expr } => Op::Set {
                path,
                expr: fold(expr),
            },
            Op::Take { expr } => Op::Take { expr: fold(expr) },
            Op::Skip { expr } => Op::Skip { expr: fold(expr) },
            Op::GroupBy { expr } => Op::GroupBy { expr: fold(expr) },
            other => other,
        })
        .collect();
    Stream { ops }
}

fn fold(expr: Expr) -> Expr {
    // Fold children first, then the node itself.
    let expr = match expr {
        Expr::Unary { op, expr } => Expr::Unary {
            op,
            expr: Box::new(fold(*expr)),
        },
        Expr::Binary { op, lhs, rhs } => Expr::Binary {
            op,
            lhs: Box::new(fold(*lhs)),
            rhs: Box::new(fold(*rhs)),
        },
        Expr::Cast { expr, target } => Expr::Cast {
            expr: Box::new(fold(*expr)),
            target,
        },
        Expr::List(items) => Expr::List(items.into_iter().map(fold).collect()),
        Expr::KVPairs {
            pairs,
            self_referenced,
        } => Expr::KVPairs {
            pairs: pairs.into_iter().map(|(k, e)| (k, fold(e))).collect(),
            self_referenced,
        },
        other => other,
    };

    if matches!(expr, Expr::Literal(_)) || !expr.is_constant() {
        return expr;
    }
    match expr.eval(&Environment::default()) {
        Ok(value) => {
            tracing::trace!(folded = %expr, "precomputed constant expression");
            Expr::Literal(value)
        }
        Err(_) => expr,
    }
}

// ── RemoveUnnecessarySelection ──────────────────────────────────

/// A truthy literal filter is a no-op; a falsy one empties the stream.
fn remove_unnecessary_selections(stream: Stream) -> Stream {
    let mut ops = Vec::with_capacity(stream.ops.len());
    for op in stream.ops {
        match op {
            Op::Filter {
                expr: Expr::Literal(value),
            } => {
                if !value.is_truthy() {
                    tracing::trace!("filter is never true, emptying the stream");
                    return Stream::empty();
                }
            }
            other => ops.push(other),
        }
    }
    Stream { ops }
}

// ── UseIndex ────────────────────────────────────────────────────

struct IndexCandidate {
    filter_pos: usize,
    index: IndexInfo,
    op: IndexOperator,
    pivot: Expr,
    unique: bool,
}

/// Replace a sequential scan with an index scan serving the first filter of
/// the form `path OP constant` over an indexed path. Unique indexes win
/// over list indexes.
fn use_index(stream: Stream) -> Stream {
    let Some(Op::SeqScan { table }) = stream.ops.first() else {
        return stream;
    };
    let table = table.clone();

    let mut best: Option<IndexCandidate> = None;
    for (pos, op) in stream.ops.iter().enumerate().skip(1) {
        let Op::Filter { expr } = op else { continue };
        let Some((path, index_op, pivot)) = indexable_comparison(expr) else {
            continue;
        };
        let Some(index) = table
            .indexes
            .iter()
            .find(|i| i.paths.len() == 1 && i.paths[0] == path)
        else {
            continue;
        };
        let candidate = IndexCandidate {
            filter_pos: pos,
            index: index.clone(),
            op: index_op,
            pivot,
            unique: index.unique,
        };
        match &best {
            Some(existing) if existing.unique || !candidate.unique => {}
            _ => best = Some(candidate),
        }
        if best.as_ref().is_some_and(|b| b.unique) {
            break;
        }
    }

    let Some(chosen) = best else { return stream };
    tracing::trace!(index = chosen.index.name.as_str(), "selected index scan");

    let mut ops = stream.ops;
    ops.remove(chosen.filter_pos);
    ops[0] = Op::IndexScan {
        index: chosen.index,
        table,
        op: chosen.op,
        pivot: chosen.pivot,
    };
    Stream { ops }
}

/// Match `path OP constant` (or its mirror) where OP has an index mapping
/// and the constant is a literal or a parameter.
fn indexable_comparison(
    expr: &Expr,
) -> Option<(basalt_document::Path, IndexOperator, Expr)> {
    let Expr::Binary { op, lhs, rhs } = expr else {
        return None;
    };
    if !op.usable_by_index() {
        return None;
    }
    let (path, pivot, mirrored) = match (&**lhs, &**rhs) {
        (Expr::Path(p), rhs) if is_pivot(rhs) => (p.clone(), rhs.clone(), false),
        (lhs, Expr::Path(p)) if is_pivot(lhs) => (p.clone(), lhs.clone(), true),
        _ => return None,
    };
    let index_op = match (op, mirrored) {
        (BinaryOperator::Eq, _) => IndexOperator::Eq,
        (BinaryOperator::In, false) => IndexOperator::In,
        (BinaryOperator::In, true) => return None,
        (BinaryOperator::Gt, false) | (BinaryOperator::Lt, true) => IndexOperator::Gt,
        (BinaryOperator::Gte, false) | (BinaryOperator::Lte, true) => IndexOperator::Gte,
        (BinaryOperator::Lt, false) | (BinaryOperator::Gt, true) => IndexOperator::Lt,
        (BinaryOperator::Lte, false) | (BinaryOperator::Gte, true) => IndexOperator::Lte,
        _ => return None,
    };
    Some((path, index_op, pivot))
}

fn is_pivot(expr: &Expr) -> bool {
    matches!(
        expr,
        Expr::Literal(_) | Expr::NamedParam(_) | Expr::PositionalParam(_)
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use basalt_document::{Path, Value};
    use basalt_engine::{TableHandle, TableInfo};

    fn lit(v: Value) -> Expr {
        Expr::Literal(v)
    }

    fn path(s: &str) -> Expr {
        Expr::Path(s.parse().unwrap())
    }

    fn handle_with_indexes(indexes: Vec<IndexInfo>) -> TableHandle {
        TableHandle {
            name: "t".into(),
            info: TableInfo::default(),
            indexes,
        }
    }

    fn scan(indexes: Vec<IndexInfo>) -> Stream {
        Stream::new(Op::SeqScan {
            table: handle_with_indexes(indexes),
        })
    }

    #[test]
    fn split_and_decomposes_conjunctions() {
        let filter = Expr::binary(
            BinaryOperator::And,
            Expr::binary(
                BinaryOperator::And,
                Expr::binary(BinaryOperator::Eq, path("a"), lit(Value::Integer(1))),
                Expr::binary(BinaryOperator::Eq, path("b"), lit(Value::Integer(2))),
            ),
            Expr::binary(BinaryOperator::Eq, path("c"), lit(Value::Integer(3))),
        );
        let stream = scan(vec![]).pipe(Op::Filter { expr: filter });
        let out = split_and(stream);
        assert_eq!(
            out.to_string(),
            "seqScan(\"t\") -> filter(a = 1) -> filter(b = 2) -> filter(c = 3)"
        );
    }

    #[test]
    fn split_and_stops_at_or() {
        let filter = Expr::binary(
            BinaryOperator::Or,
            Expr::binary(BinaryOperator::Eq, path("a"), lit(Value::Integer(1))),
            Expr::binary(BinaryOperator::Eq, path("b"), lit(Value::Integer(2))),
        );
        let stream = scan(vec![]).pipe(Op::Filter { expr: filter });
        let out = split_and(stream);
        assert_eq!(out.to_string(), "seqScan(\"t\") -> filter(a = 1 OR b = 2)");
    }

    #[test]
    fn precompute_folds_constants() {
        let expr = Expr::binary(
            BinaryOperator::Eq,
            path("a"),
            Expr::binary(
                BinaryOperator::Add,
                lit(Value::Integer(1)),
                lit(Value::Integer(2)),
            ),
        );
        let stream = scan(vec![]).pipe(Op::Filter { expr });
        let out = precompute_expressions(stream);
        assert_eq!(out.to_string(), "seqScan(\"t\") -> filter(a = 3)");
    }

    #[test]
    fn precompute_folds_lists_and_documents() {
        let expr = Expr::List(vec![
            lit(Value::Integer(1)),
            Expr::binary(
                BinaryOperator::Mul,
                lit(Value::Integer(2)),
                lit(Value::Integer(3)),
            ),
        ]);
        let out = fold(expr);
        assert_eq!(
            out,
            lit(Value::Array(vec![Value::Integer(1), Value::Integer(6)]))
        );

        let expr = Expr::KVPairs {
            pairs: vec![("a".into(), lit(Value::Integer(1)))],
            self_referenced: false,
        };
        let Expr::Literal(Value::Document(doc)) = fold(expr) else {
            panic!("expected a folded document");
        };
        assert_eq!(doc.get("a").unwrap(), Some(Value::Integer(1)));
    }

    #[test]
    fn precompute_leaves_failing_expressions_unfolded() {
        let expr = Expr::binary(
            BinaryOperator::Div,
            lit(Value::Integer(1)),
            lit(Value::Integer(0)),
        );
        assert_eq!(fold(expr.clone()), expr);
    }

    #[test]
    fn truthy_filter_is_dropped_falsy_empties() {
        let stream = scan(vec![]).pipe(Op::Filter {
            expr: lit(Value::Bool(true)),
        });
        let out = remove_unnecessary_selections(stream);
        assert_eq!(out.to_string(), "seqScan(\"t\")");

        let stream = scan(vec![]).pipe(Op::Filter {
            expr: lit(Value::Bool(false)),
        });
        let out = remove_unnecessary_selections(stream);
        assert!(out.is_empty());
    }

    #[test]
    fn use_index_replaces_scan() {
        let ix = IndexInfo {
            name: "ix".into(),
            table: "t".into(),
            paths: vec![Path::field("b")],
            unique: false,
        };
        let stream = scan(vec![ix]).pipe(Op::Filter {
            expr: Expr::binary(
                BinaryOperator::Eq,
                path("b"),
                lit(Value::Text("Q".into())),
            ),
        });
        let out = use_index(stream);
        assert_eq!(out.to_string(), "indexScan(\"ix\", b = \"Q\")");
    }

    #[test]
    fn use_index_prefers_unique() {
        let list_ix = IndexInfo {
            name: "ix_a".into(),
            table: "t".into(),
            paths: vec![Path::field("a")],
            unique: false,
        };
        let unique_ix = IndexInfo {
            name: "ux_b".into(),
            table: "t".into(),
            paths: vec![Path::field("b")],
            unique: true,
        };
        let stream = scan(vec![list_ix, unique_ix])
            .pipe(Op::Filter {
                expr: Expr::binary(BinaryOperator::Eq, path("a"), lit(Value::Integer(1))),
            })
            .pipe(Op::Filter {
                expr: Expr::binary(BinaryOperator::Eq, path("b"), lit(Value::Integer(2))),
            });
        let out = use_index(stream);
        assert_eq!(
            out.to_string(),
            "indexScan(\"ux_b\", b = 2) -> filter(a = 1)"
        );
    }

    #[test]
    fn use_index_handles_mirrored_comparisons() {
        let ix = IndexInfo {
            name: "ix".into(),
            table: "t".into(),
            paths: vec![Path::field("a")],
            unique: false,
        };
        // 5 > a is a < 5.
        let stream = scan(vec![ix]).pipe(Op::Filter {
            expr: Expr::binary(BinaryOperator::Gt, lit(Value::Integer(5)), path("a")),
        });
        let out = use_index(stream);
        assert_eq!(out.to_string(), "indexScan(\"ix\", a < 5)");
    }

    #[test]
    fn use_index_ignores_unindexed_paths() {
        let stream = scan(vec![]).pipe(Op::Filter {
            expr: Expr::binary(BinaryOperator::Eq, path("a"), lit(Value::Integer(1))),
        });
        let out = use_index(stream.clone());
        assert_eq!(out, stream);
    }

    #[test]
    fn rules_are_idempotent() {
        let ix = IndexInfo {
            name: "ix".into(),
            table: "t".into(),
            paths: vec![Path::field("a")],
            unique: false,
        };
        let stream = scan(vec![ix]).pipe(Op::Filter {
            expr: Expr::binary(
                BinaryOperator::And,
                Expr::binary(BinaryOperator::Eq, path("a"), lit(Value::Integer(1))),
                Expr::binary(BinaryOperator::Gt, path("b"), lit(Value::Integer(0))),
            ),
        });
        let once = optimize(stream);
        let twice = optimize(once.clone());
        assert_eq!(once, twice);
    }
}

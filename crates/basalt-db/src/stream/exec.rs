//! Pull-based, single-pass stream execution.
//!
//! The source operator drives documents one at a time through a chain of
//! operator states. Streaming operators transform each environment in
//! place; sort, hashAggregate and reduce are barriers that absorb the
//! whole input and emit on flush. `Error::StreamClosed` signals early
//! success (take) and is swallowed at the top.

use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::rc::Rc;

use basalt_document::{Document, FieldBuffer, Path, Value, ValueMap, ValueSet, key};
use basalt_engine::{TableHandle, Transaction};
use basalt_sql::{
    ACCUMULATOR, Environment, EvalError, Expr, GROUP_KEY, PRIMARY_KEY, Param, Projection,
};
use basalt_store::Store;

use super::aggregate::{Aggregator, AggregatorBuilder};
use super::{IndexOperator, Op, Stream};
use crate::error::Error;

type Sink<'s> = dyn FnMut(&Environment) -> Result<(), Error> + 's;

/// Walk the stream, invoking `sink` on every environment it produces.
pub(crate) fn iterate<S: Store>(
    stream: &Stream,
    tx: &Transaction<'_, S>,
    params: &[Param],
    sink: &mut Sink<'_>,
) -> Result<(), Error> {
    if stream.is_empty() {
        return Ok(());
    }
    let base = Rc::new(Environment::new(params.to_vec()));
    let (source, rest) = stream.ops.split_first().expect("stream is not empty");
    let mut states = build_states(rest, &base)?;

    match run_source(source, tx, &base, &mut states, sink) {
        Ok(()) | Err(Error::StreamClosed) => {}
        Err(e) => return Err(e),
    }
    match flush(&mut states, tx, &base, sink) {
        Ok(()) | Err(Error::StreamClosed) => Ok(()),
        Err(e) => Err(e),
    }
}

// ── Operator states ─────────────────────────────────────────────

enum OpState<'o> {
    Filter(&'o Expr),
    Map(&'o Expr),
    Project(&'o [Projection]),
    Take {
        remaining: i64,
    },
    Skip {
        remaining: i64,
    },
    GroupBy(&'o Expr),
    Distinct(ValueSet),
    SetField(&'o Path, &'o Expr),
    Unset(&'o str),
    IterRename(&'o [String]),
    TableInsert(&'o TableHandle),
    TableReplace(&'o TableHandle),
    TableDelete(&'o TableHandle),
    Sort {
        reverse: bool,
        path: &'o Path,
        heap: BinaryHeap<SortEntry>,
        seq: u64,
    },
    HashAggregate {
        builders: &'o [AggregatorBuilder],
        groups: ValueMap<Vec<Box<dyn Aggregator>>>,
        grouped: bool,
    },
    Reduce {
        seed: &'o Expr,
        acc: &'o Expr,
        groups: ValueMap<Value>,
        grouped: bool,
    },
}

fn build_states<'o>(ops: &'o [Op], base: &Environment) -> Result<Vec<OpState<'o>>, Error> {
    let mut states = Vec::with_capacity(ops.len());
    let mut grouped = false;
    for op in ops {
        let state = match op {
            Op::Filter { expr } => OpState::Filter(expr),
            Op::Map { expr } => OpState::Map(expr),
            Op::Project { fields } => OpState::Project(fields),
            Op::Take { expr } => OpState::Take {
                remaining: eval_count(expr, base, "LIMIT")?,
            },
            Op::Skip { expr } => OpState::Skip {
                remaining: eval_count(expr, base, "OFFSET")?,
            },
            Op::Sort { path, reverse } => OpState::Sort {
                reverse: *reverse,
                path,
                heap: BinaryHeap::new(),
                seq: 0,
            },
            Op::GroupBy { expr } => {
                grouped = true;
                OpState::GroupBy(expr)
            }
            Op::HashAggregate { builders } => OpState::HashAggregate {
                builders,
                groups: ValueMap::new(),
                grouped,
            },
            Op::Reduce { seed, acc } => OpState::Reduce {
                seed,
                acc,
                groups: ValueMap::new(),
                grouped,
            },
            Op::Distinct => OpState::Distinct(ValueSet::new()),
            Op::Set { path, expr } => OpState::SetField(path, expr),
            Op::Unset { field } => OpState::Unset(field),
            Op::IterRename { columns } => OpState::IterRename(columns),
            Op::TableInsert { table } => OpState::TableInsert(table),
            Op::TableReplace { table } => OpState::TableReplace(table),
            Op::TableDelete { table } => OpState::TableDelete(table),
            Op::SeqScan { .. } | Op::IndexScan { .. } | Op::Expressions { .. } => {
                return Err(Error::InvalidStatement(format!(
                    "{op} must start the stream"
                )));
            }
        };
        states.push(state);
    }
    Ok(states)
}

fn eval_count(expr: &Expr, base: &Environment, clause: &str) -> Result<i64, Error> {
    match expr.eval(base)? {
        Value::Integer(n) if n >= 0 => Ok(n),
        Value::Integer(_) => Err(Error::Type(format!("{clause} must not be negative"))),
        other => Err(Error::Type(format!(
            "{clause} expects an integer, got a {}",
            other.type_of()
        ))),
    }
}

// ── Sources ─────────────────────────────────────────────────────

fn run_source<S: Store>(
    op: &Op,
    tx: &Transaction<'_, S>,
    base: &Rc<Environment>,
    states: &mut [OpState<'_>],
    sink: &mut Sink<'_>,
) -> Result<(), Error> {
    match op {
        Op::SeqScan { table } => {
            for entry in tx.scan(table)? {
                let (pk, doc) = entry?;
                let env = scan_env(base, &pk, Document::Encoded(doc))?;
                push(states, tx, base, env, sink)?;
            }
            Ok(())
        }
        Op::IndexScan {
            index,
            table,
            op,
            pivot,
        } => {
            let pivot_value = pivot.eval(base)?;
            match op {
                IndexOperator::Eq => {
                    let entries = tx.scan_index_eq(index, std::slice::from_ref(&pivot_value))?;
                    emit_index_entries(entries, false, table, tx, base, states, sink)
                }
                IndexOperator::In => {
                    let Value::Array(items) = pivot_value else {
                        return Err(Error::Type("right side of IN must be an array".into()));
                    };
                    for item in &items {
                        let entries = tx.scan_index_eq(index, std::slice::from_ref(item))?;
                        emit_index_entries(entries, false, table, tx, base, states, sink)?;
                    }
                    Ok(())
                }
                IndexOperator::Gt | IndexOperator::Gte => {
                    let entries =
                        tx.scan_index(index, Some(std::slice::from_ref(&pivot_value)), false)?;
                    emit_index_entries(
                        entries,
                        *op == IndexOperator::Gt,
                        table,
                        tx,
                        base,
                        states,
                        sink,
                    )
                }
                IndexOperator::Lt | IndexOperator::Lte => {
                    let entries =
                        tx.scan_index(index, Some(std::slice::from_ref(&pivot_value)), true)?;
                    emit_index_entries(
                        entries,
                        *op == IndexOperator::Lt,
                        table,
                        tx,
                        base,
                        states,
                        sink,
                    )
                }
            }
        }
        Op::Expressions { exprs } => {
            for expr in exprs {
                let value = expr.eval(base)?;
                let mut env = Environment::wrap(base.clone());
                env.set_current_value(value);
                push(states, tx, base, env, sink)?;
            }
            Ok(())
        }
        other => Err(Error::InvalidStatement(format!(
            "{other} cannot start a stream"
        ))),
    }
}

fn emit_index_entries<S: Store>(
    entries: basalt_engine::IndexIter<'_>,
    skip_equal: bool,
    table: &TableHandle,
    tx: &Transaction<'_, S>,
    base: &Rc<Environment>,
    states: &mut [OpState<'_>],
    sink: &mut Sink<'_>,
) -> Result<(), Error> {
    for entry in entries {
        let entry = entry?;
        if skip_equal && entry.is_equal {
            continue;
        }
        // Dangling entries (no backing record) are skipped.
        let Some(doc) = tx.get_record(table, &entry.pk)? else {
            continue;
        };
        let env = scan_env(base, &entry.pk, Document::Encoded(doc))?;
        push(states, tx, base, env, sink)?;
    }
    Ok(())
}

fn scan_env(base: &Rc<Environment>, pk: &[u8], doc: Document) -> Result<Environment, Error> {
    let mut env = Environment::wrap(base.clone());
    env.set_current_value(Value::Document(doc));
    env.set(PRIMARY_KEY, Value::Array(key::decode_key_values(pk)?));
    Ok(env)
}

// ── Per-environment push ────────────────────────────────────────

fn push<S: Store>(
    states: &mut [OpState<'_>],
    tx: &Transaction<'_, S>,
    base: &Rc<Environment>,
    env: Environment,
    sink: &mut Sink<'_>,
) -> Result<(), Error> {
    let Some((state, rest)) = states.split_first_mut() else {
        return sink(&env);
    };
    match state {
        OpState::Filter(expr) => {
            if expr.eval(&env)?.is_truthy() {
                push(rest, tx, base, env, sink)
            } else {
                Ok(())
            }
        }
        OpState::Map(expr) => {
            let value = expr.eval(&env)?;
            push(rest, tx, base, with_current(env, value), sink)
        }
        OpState::Project(fields) => {
            let fb = project_fields(fields, &env)?;
            push(
                rest,
                tx,
                base,
                with_current(env, Value::Document(Document::Buf(fb))),
                sink,
            )
        }
        OpState::Take { remaining } => {
            if *remaining <= 0 {
                return Err(Error::StreamClosed);
            }
            *remaining -= 1;
            let closed = *remaining == 0;
            push(rest, tx, base, env, sink)?;
            if closed { Err(Error::StreamClosed) } else { Ok(()) }
        }
        OpState::Skip { remaining } => {
            if *remaining > 0 {
                *remaining -= 1;
                Ok(())
            } else {
                push(rest, tx, base, env, sink)
            }
        }
        OpState::GroupBy(expr) => {
            let group = expr.eval(&env)?;
            let mut env = env;
            env.set(GROUP_KEY, group);
            push(rest, tx, base, env, sink)
        }
        OpState::Distinct(seen) => {
            let value = env.get_current_value().unwrap_or(Value::Null);
            if seen.insert(std::slice::from_ref(&value))? {
                push(rest, tx, base, env, sink)
            } else {
                Ok(())
            }
        }
        OpState::SetField(path, expr) => {
            let value = expr.eval(&env)?;
            let mut fb = current_buffer(&env)?;
            fb.set_path(path.fragments(), value)?;
            push(
                rest,
                tx,
                base,
                with_current(env, Value::Document(Document::Buf(fb))),
                sink,
            )
        }
        OpState::Unset(field) => {
            let mut fb = current_buffer(&env)?;
            fb.delete(field);
            push(
                rest,
                tx,
                base,
                with_current(env, Value::Document(Document::Buf(fb))),
                sink,
            )
        }
        OpState::IterRename(columns) => {
            let mut fb = current_buffer(&env)?;
            if fb.len() < columns.len() {
                return Err(Error::Type(format!(
                    "cannot rename {} fields of a {}-field document",
                    columns.len(),
                    fb.len()
                )));
            }
            for (i, column) in columns.iter().enumerate() {
                fb.rename_at(i, column.clone());
            }
            push(
                rest,
                tx,
                base,
                with_current(env, Value::Document(Document::Buf(fb))),
                sink,
            )
        }
        OpState::TableInsert(table) => {
            let fb = current_buffer(&env)?;
            let (pk, stored) = tx.insert(table, fb)?;
            let mut next = Environment::wrap(Rc::new(env));
            next.set_current_value(Value::Document(Document::Buf(stored)));
            next.set(PRIMARY_KEY, Value::Array(key::decode_key_values(&pk)?));
            push(rest, tx, base, next, sink)
        }
        OpState::TableReplace(table) => {
            let pk = primary_key_bytes(&env)?;
            let fb = current_buffer(&env)?;
            let stored = tx.replace(table, &pk, fb)?;
            push(
                rest,
                tx,
                base,
                with_current(env, Value::Document(Document::Buf(stored))),
                sink,
            )
        }
        OpState::TableDelete(table) => {
            let pk = primary_key_bytes(&env)?;
            tx.delete(table, &pk)?;
            push(rest, tx, base, env, sink)
        }
        OpState::Sort {
            reverse,
            path,
            heap,
            seq,
        } => {
            let sort_value = Expr::Path((*path).clone()).eval(&env)?;
            // Under DESC, Null pins as the greatest value.
            let key_bytes = if *reverse && sort_value.is_null() {
                vec![0xFF]
            } else {
                let mut buf = Vec::new();
                key::encode_key(&sort_value, &mut buf)?;
                buf
            };
            heap.push(SortEntry {
                key: key_bytes,
                seq: *seq,
                reverse: *reverse,
                env,
            });
            *seq += 1;
            Ok(())
        }
        OpState::HashAggregate {
            builders, groups, ..
        } => {
            let group = env.get(GROUP_KEY).unwrap_or(Value::Null);
            let aggs =
                groups.get_or_insert_with(&group, || builders.iter().map(|b| b.build()).collect())?;
            for agg in aggs.iter_mut() {
                agg.add(&env)?;
            }
            Ok(())
        }
        OpState::Reduce {
            seed, acc, groups, ..
        } => {
            let group = env.get(GROUP_KEY).unwrap_or(Value::Null);
            let current = match groups.get_mut(&group)? {
                Some(v) => v.clone(),
                None => {
                    let initial = seed.eval(&env)?;
                    groups.insert(&group, initial.clone())?;
                    initial
                }
            };
            let mut scope = Environment::wrap(Rc::new(env));
            scope.set(ACCUMULATOR, current);
            let next = acc.eval(&scope)?;
            groups.insert(&group, next)?;
            Ok(())
        }
    }
}

/// Drain barrier operators once the source is exhausted.
fn flush<S: Store>(
    states: &mut [OpState<'_>],
    tx: &Transaction<'_, S>,
    base: &Rc<Environment>,
    sink: &mut Sink<'_>,
) -> Result<(), Error> {
    let Some((state, rest)) = states.split_first_mut() else {
        return Ok(());
    };
    match state {
        OpState::Sort { heap, .. } => {
            while let Some(entry) = heap.pop() {
                match push(rest, tx, base, entry.env, sink) {
                    Err(Error::StreamClosed) => break,
                    other => other?,
                }
            }
        }
        OpState::HashAggregate {
            builders,
            groups,
            grouped,
        } => {
            let drained = std::mem::take(groups);
            let mut emitted = false;
            for (group, mut aggs) in drained.into_entries() {
                emitted = true;
                let mut fb = FieldBuffer::new();
                for agg in aggs.iter_mut() {
                    agg.finish(&mut fb)?;
                }
                let env = group_env(base, group, Value::Document(Document::Buf(fb)));
                match push(rest, tx, base, env, sink) {
                    Err(Error::StreamClosed) => break,
                    other => other?,
                }
            }
            // Without GROUP BY, an empty input still aggregates to one row.
            if !emitted && !*grouped {
                let mut fb = FieldBuffer::new();
                for builder in builders.iter() {
                    builder.build().finish(&mut fb)?;
                }
                let env = group_env(base, Value::Null, Value::Document(Document::Buf(fb)));
                match push(rest, tx, base, env, sink) {
                    Err(Error::StreamClosed) => {}
                    other => other?,
                }
            }
        }
        OpState::Reduce {
            seed,
            groups,
            grouped,
            ..
        } => {
            let drained = std::mem::take(groups);
            let mut emitted = false;
            for (group, acc) in drained.into_entries() {
                emitted = true;
                let env = group_env(base, group, acc);
                match push(rest, tx, base, env, sink) {
                    Err(Error::StreamClosed) => break,
                    other => other?,
                }
            }
            if !emitted && !*grouped {
                let initial = seed.eval(base)?;
                let env = group_env(base, Value::Null, initial);
                match push(rest, tx, base, env, sink) {
                    Err(Error::StreamClosed) => {}
                    other => other?,
                }
            }
        }
        _ => {}
    }
    flush(rest, tx, base, sink)
}

fn group_env(base: &Rc<Environment>, group: Value, current: Value) -> Environment {
    let mut env = Environment::wrap(base.clone());
    env.set(GROUP_KEY, group);
    env.set_current_value(current);
    env
}

// ── Helpers ─────────────────────────────────────────────────────

fn with_current(parent: Environment, value: Value) -> Environment {
    let mut env = Environment::wrap(Rc::new(parent));
    env.set_current_value(value);
    env
}

fn current_buffer(env: &Environment) -> Result<FieldBuffer, Error> {
    let current = env
        .get_current_value()
        .ok_or(Error::Eval(EvalError::NoCurrentValue))?;
    match current {
        Value::Document(doc) => Ok(doc.to_field_buffer()?),
        other => Err(Error::Type(format!(
            "expected a document, got a {}",
            other.type_of()
        ))),
    }
}

fn primary_key_bytes(env: &Environment) -> Result<Vec<u8>, Error> {
    match env.get(PRIMARY_KEY) {
        Some(Value::Array(values)) => Ok(key::encode_key_values(&values)?),
        _ => Err(Error::Type(
            "the current document does not carry a primary key".into(),
        )),
    }
}

fn project_fields(fields: &[Projection], env: &Environment) -> Result<FieldBuffer, Error> {
    let mut out = FieldBuffer::new();
    for field in fields {
        match field {
            Projection::Wildcard => {
                let current = env
                    .get_current_value()
                    .ok_or(Error::Eval(EvalError::NoCurrentValue))?;
                let Value::Document(doc) = current else {
                    return Err(Error::Type("* requires a document".into()));
                };
                out.copy_from(&doc)?;
            }
            Projection::Expr { expr, name } => {
                out.add(name.clone(), expr.eval(env)?);
            }
        }
    }
    Ok(out)
}

/// Heap entry ordered so the next environment to emit pops first: smallest
/// key for ascending, largest for descending, with the arrival sequence
/// breaking ties to keep the sort stable.
struct SortEntry {
    key: Vec<u8>,
    seq: u64,
    reverse: bool,
    env: Environment,
}

impl PartialEq for SortEntry {
    fn eq(&self, other: &Self) -> bool {
        self.key == other.key && self.seq == other.seq
    }
}

impl Eq for SortEntry {}

impl PartialOrd for SortEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for SortEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        let key_order = if self.reverse {
            self.key.cmp(&other.key)
        } else {
            other.key.cmp(&self.key)
        };
        key_order.then_with(|| other.seq.cmp(&self.seq))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use basalt_document::Path;
    use basalt_engine::Engine;
    use basalt_sql::BinaryOperator;
    use basalt_store::MemoryStore;

    fn engine() -> Engine<MemoryStore> {
        Engine::new(MemoryStore::new()).unwrap()
    }

    fn lit(n: i64) -> Expr {
        Expr::Literal(Value::Integer(n))
    }

    /// Expressions source emitting the given integers as current values.
    fn ints(values: &[i64]) -> Stream {
        Stream::new(Op::Expressions {
            exprs: values.iter().map(|&n| lit(n)).collect(),
        })
    }

    fn collect_ints(stream: &Stream) -> Vec<i64> {
        let engine = engine();
        let tx = engine.begin(false).unwrap();
        let mut out = Vec::new();
        iterate(stream, &tx, &[], &mut |env| {
            match env.get_current_value() {
                Some(Value::Integer(n)) => out.push(n),
                other => panic!("expected integer, got {other:?}"),
            }
            Ok(())
        })
        .unwrap();
        out
    }

    #[test]
    fn take_then_skip_yields_the_difference() {
        // take(n) -> skip(m) == first max(0, n - m) documents.
        let stream = ints(&[1, 2, 3, 4, 5])
            .pipe(Op::Take { expr: lit(4) })
            .pipe(Op::Skip { expr: lit(2) });
        assert_eq!(collect_ints(&stream), vec![3, 4]);

        let stream = ints(&[1, 2, 3])
            .pipe(Op::Take { expr: lit(1) })
            .pipe(Op::Skip { expr: lit(2) });
        assert_eq!(collect_ints(&stream), Vec::<i64>::new());
    }

    #[test]
    fn filter_true_is_a_no_op() {
        let stream = ints(&[1, 2, 3]).pipe(Op::Filter {
            expr: Expr::Literal(Value::Bool(true)),
        });
        assert_eq!(collect_ints(&stream), vec![1, 2, 3]);
    }

    #[test]
    fn filter_keeps_only_truthy_results() {
        // _v % 2 = 1
        let odd = Expr::binary(
            BinaryOperator::Eq,
            Expr::binary(
                BinaryOperator::Mod,
                Expr::Path(Path::field("_v")),
                lit(2),
            ),
            lit(1),
        );
        let stream = ints(&[1, 2, 3, 4]).pipe(Op::Filter { expr: odd });
        assert_eq!(collect_ints(&stream), vec![1, 3]);
    }

    #[test]
    fn map_replaces_the_current_value() {
        let double = Expr::binary(
            BinaryOperator::Mul,
            Expr::Path(Path::field("_v")),
            lit(2),
        );
        let stream = ints(&[1, 2, 3]).pipe(Op::Map { expr: double });
        assert_eq!(collect_ints(&stream), vec![2, 4, 6]);
    }

    #[test]
    fn sort_is_stable_and_take_closes_early() {
        let engine = engine();
        let tx = engine.begin(false).unwrap();

        let docs: Vec<Expr> = [(1, 20), (2, 10), (3, 20), (4, 5)]
            .iter()
            .map(|&(id, k)| Expr::KVPairs {
                pairs: vec![("id".into(), lit(id)), ("k".into(), lit(k))],
                self_referenced: false,
            })
            .collect();
        let stream = Stream::new(Op::Expressions { exprs: docs })
            .pipe(Op::Sort {
                path: Path::field("k"),
                reverse: false,
            })
            .pipe(Op::Take { expr: lit(3) });

        let mut ids = Vec::new();
        iterate(&stream, &tx, &[], &mut |env| {
            let Some(Value::Document(doc)) = env.get_current_value() else {
                panic!("expected document");
            };
            ids.push(doc.get("id").unwrap().unwrap());
            Ok(())
        })
        .unwrap();
        // k=5 first, then the two k=20 rows keep their input order.
        assert_eq!(
            ids,
            vec![Value::Integer(4), Value::Integer(2), Value::Integer(1)]
        );
    }

    #[test]
    fn distinct_drops_repeats_keeping_first_seen() {
        let stream = ints(&[3, 1, 3, 2, 1]).pipe(Op::Distinct);
        assert_eq!(collect_ints(&stream), vec![3, 1, 2]);
    }

    #[test]
    fn reduce_folds_per_group() {
        // groupBy(_v % 2) then sum via _acc + _v.
        let group = Expr::binary(
            BinaryOperator::Mod,
            Expr::Path(Path::field("_v")),
            lit(2),
        );
        let acc = Expr::binary(
            BinaryOperator::Add,
            Expr::Path(Path::field(ACCUMULATOR)),
            Expr::Path(Path::field("_v")),
        );
        let stream = ints(&[1, 2, 3, 4])
            .pipe(Op::GroupBy { expr: group })
            .pipe(Op::Reduce {
                seed: lit(0),
                acc,
            });
        // Groups in first-seen order: odd (1+3), even (2+4).
        assert_eq!(collect_ints(&stream), vec![4, 6]);
    }

    #[test]
    fn reduce_without_group_emits_one_total() {
        let acc = Expr::binary(
            BinaryOperator::Add,
            Expr::Path(Path::field(ACCUMULATOR)),
            Expr::Path(Path::field("_v")),
        );
        let stream = ints(&[1, 2, 3]).pipe(Op::Reduce {
            seed: lit(0),
            acc: acc.clone(),
        });
        assert_eq!(collect_ints(&stream), vec![6]);

        let empty = ints(&[]).pipe(Op::Reduce { seed: lit(0), acc });
        assert_eq!(collect_ints(&empty), vec![0]);
    }

    #[test]
    fn desc_sort_pins_null_greatest() {
        let exprs = vec![lit(2), Expr::Literal(Value::Null), lit(5)];
        let stream = Stream::new(Op::Expressions { exprs }).pipe(Op::Sort {
            path: Path::field("_v"),
            reverse: true,
        });
        let engine = engine();
        let tx = engine.begin(false).unwrap();
        let mut out = Vec::new();
        iterate(&stream, &tx, &[], &mut |env| {
            out.push(env.get_current_value().unwrap_or(Value::Null));
            Ok(())
        })
        .unwrap();
        assert_eq!(out, vec![Value::Null, Value::Integer(5), Value::Integer(2)]);
    }
}

pub(crate) mod aggregate;
pub(crate) mod exec;

use std::fmt;

use basalt_document::Path;
use basalt_engine::{IndexInfo, TableHandle};
use basalt_sql::{Expr, Projection};

pub use aggregate::AggregatorBuilder;

/// Comparison operators an index scan can serve.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexOperator {
    Eq,
    Gt,
    Gte,
    Lt,
    Lte,
    In,
}

impl fmt::Display for IndexOperator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            IndexOperator::Eq => "=",
            IndexOperator::Gt => ">",
            IndexOperator::Gte => ">=",
            IndexOperator::Lt => "<",
            IndexOperator::Lte => "<=",
            IndexOperator::In => "IN",
        };
        f.write_str(text)
    }
}

/// One node of a stream pipeline. Each operator transforms one environment
/// into at most one environment; sort, reduce and hashAggregate materialize
/// their input before emitting.
#[derive(Debug, Clone, PartialEq)]
pub enum Op {
    SeqScan {
        table: TableHandle,
    },
    /// Index-ordered scan: ascending for `=`, `IN`, `>`, `>=`; descending
    /// for `<`, `<=`.
    IndexScan {
        index: IndexInfo,
        table: TableHandle,
        op: IndexOperator,
        pivot: Expr,
    },
    Expressions {
        exprs: Vec<Expr>,
    },
    Filter {
        expr: Expr,
    },
    Project {
        fields: Vec<Projection>,
    },
    Map {
        expr: Expr,
    },
    Take {
        expr: Expr,
    },
    Skip {
        expr: Expr,
    },
    Sort {
        path: Path,
        reverse: bool,
    },
    GroupBy {
        expr: Expr,
    },
    HashAggregate {
        builders: Vec<AggregatorBuilder>,
    },
    Reduce {
        seed: Expr,
        acc: Expr,
    },
    Distinct,
    Set {
        path: Path,
        expr: Expr,
    },
    Unset {
        field: String,
    },
    IterRename {
        columns: Vec<String>,
    },
    TableInsert {
        table: TableHandle,
    },
    TableReplace {
        table: TableHandle,
    },
    TableDelete {
        table: TableHandle,
    },
}

impl fmt::Display for Op {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Op::SeqScan { table } => write!(f, "seqScan({:?})", table.name),
            Op::IndexScan {
                index, op, pivot, ..
            } => {
                write!(f, "indexScan({:?}, ", index.name)?;
                match index.paths.first() {
                    Some(path) => write!(f, "{path} {op} {pivot})"),
                    None => write!(f, "{op} {pivot})"),
                }
            }
            Op::Expressions { exprs } => write!(f, "expressions({})", join(exprs)),
            Op::Filter { expr } => write!(f, "filter({expr})"),
            Op::Project { fields } => {
                write!(f, "project(")?;
                for (i, field) in fields.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    match field {
                        Projection::Wildcard => write!(f, "*")?,
                        Projection::Expr { expr, .. } => write!(f, "{expr}")?,
                    }
                }
                write!(f, ")")
            }
            Op::Map { expr } => write!(f, "map({expr})"),
            Op::Take { expr } => write!(f, "take({expr})"),
            Op::Skip { expr } => write!(f, "skip({expr})"),
            Op::Sort { path, reverse } => {
                if *reverse {
                    write!(f, "sortReverse({path})")
                } else {
                    write!(f, "sort({path})")
                }
            }
            Op::GroupBy { expr } => write!(f, "groupBy({expr})"),
            Op::HashAggregate { builders } => write!(f, "hashAggregate({})", join(builders)),
            Op::Reduce { seed, acc } => write!(f, "reduce({seed}, {acc})"),
            Op::Distinct => write!(f, "distinct()"),
            Op::Set { path, expr } => write!(f, "set({path}, {expr})"),
            Op::Unset { field } => write!(f, "unset({field})"),
            Op::IterRename { columns } => write!(f, "iterRename({})", columns.join(", ")),
            Op::TableInsert { table } => write!(f, "tableInsert({:?})", table.name),
            Op::TableReplace { table } => write!(f, "tableReplace({:?})", table.name),
            Op::TableDelete { table } => write!(f, "tableDelete({:?})", table.name),
        }
    }
}

fn join<T: fmt::Display>(items: &[T]) -> String {
    items
        .iter()
        .map(|i| i.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

/// A composable pipeline of operators. The first operator is the source;
/// an empty stream produces no environments.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Stream {
    pub ops: Vec<Op>,
}

impl Stream {
    pub fn new(source: Op) -> Self {
        Stream { ops: vec![source] }
    }

    pub fn empty() -> Self {
        Stream { ops: Vec::new() }
    }

    /// Append an operator reading from the current end of the pipeline.
    pub fn pipe(mut self, op: Op) -> Self {
        self.ops.push(op);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }
}

impl fmt::Display for Stream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.ops.is_empty() {
            return write!(f, "empty");
        }
        for (i, op) in self.ops.iter().enumerate() {
            if i > 0 {
                write!(f, " -> ")?;
            }
            write!(f, "{op}")?;
        }
        Ok(())
    }
}

mod env;
mod eval;

use std::fmt;

use basalt_document::{Path, Value, ValueType};

pub use env::{Environment, Param};

/// Reserved environment bindings.
pub const CURRENT_VALUE: &str = "_v";
pub const GROUP_KEY: &str = "_group";
pub const ACCUMULATOR: &str = "_acc";
pub const PRIMARY_KEY: &str = "_key";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOperator {
    Neg,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOperator {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    BitAnd,
    BitOr,
    BitXor,
    Concat,
    Eq,
    Neq,
    Gt,
    Gte,
    Lt,
    Lte,
    And,
    Or,
    In,
    NotIn,
    Is,
    IsNot,
    Like,
    NotLike,
}

impl BinaryOperator {
    /// The operator whose boolean result is the inversion of this one, with
    /// Null propagation preserved. Only comparisons invert.
    pub fn inverted(self) -> Option<BinaryOperator> {
        Some(match self {
            BinaryOperator::Eq => BinaryOperator::Neq,
            BinaryOperator::Neq => BinaryOperator::Eq,
            BinaryOperator::Gt => BinaryOperator::Lte,
            BinaryOperator::Gte => BinaryOperator::Lt,
            BinaryOperator::Lt => BinaryOperator::Gte,
            BinaryOperator::Lte => BinaryOperator::Gt,
            BinaryOperator::In => BinaryOperator::NotIn,
            BinaryOperator::NotIn => BinaryOperator::In,
            BinaryOperator::Is => BinaryOperator::IsNot,
            BinaryOperator::IsNot => BinaryOperator::Is,
            BinaryOperator::Like => BinaryOperator::NotLike,
            BinaryOperator::NotLike => BinaryOperator::Like,
            _ => return None,
        })
    }

    /// Whether an index scan can serve this operator when the left side is
    /// an indexed path and the right side is a constant.
    pub fn usable_by_index(self) -> bool {
        matches!(
            self,
            BinaryOperator::Eq
                | BinaryOperator::Gt
                | BinaryOperator::Gte
                | BinaryOperator::Lt
                | BinaryOperator::Lte
                | BinaryOperator::In
        )
    }
}

impl fmt::Display for BinaryOperator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            BinaryOperator::Add => "+",
            BinaryOperator::Sub => "-",
            BinaryOperator::Mul => "*",
            BinaryOperator::Div => "/",
            BinaryOperator::Mod => "%",
            BinaryOperator::BitAnd => "&",
            BinaryOperator::BitOr => "|",
            BinaryOperator::BitXor => "^",
            BinaryOperator::Concat => "||",
            BinaryOperator::Eq => "=",
            BinaryOperator::Neq => "!=",
            BinaryOperator::Gt => ">",
            BinaryOperator::Gte => ">=",
            BinaryOperator::Lt => "<",
            BinaryOperator::Lte => "<=",
            BinaryOperator::And => "AND",
            BinaryOperator::Or => "OR",
            BinaryOperator::In => "IN",
            BinaryOperator::NotIn => "NOT IN",
            BinaryOperator::Is => "IS",
            BinaryOperator::IsNot => "IS NOT",
            BinaryOperator::Like => "LIKE",
            BinaryOperator::NotLike => "NOT LIKE",
        };
        f.write_str(text)
    }
}

/// Built-in functions. Everything except `pk()` is an aggregate.
#[derive(Debug, Clone, PartialEq)]
pub enum Function {
    Pk,
    Count { wildcard: bool, expr: Option<Box<Expr>> },
    Sum(Box<Expr>),
    Min(Box<Expr>),
    Max(Box<Expr>),
    Avg(Box<Expr>),
}

impl Function {
    pub fn is_aggregate(&self) -> bool {
        !matches!(self, Function::Pk)
    }
}

impl fmt::Display for Function {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Function::Pk => write!(f, "pk()"),
            Function::Count { wildcard: true, .. } => write!(f, "count(*)"),
            Function::Count { expr, .. } => match expr {
                Some(e) => write!(f, "count({e})"),
                None => write!(f, "count(*)"),
            },
            Function::Sum(e) => write!(f, "sum({e})"),
            Function::Min(e) => write!(f, "min({e})"),
            Function::Max(e) => write!(f, "max({e})"),
            Function::Avg(e) => write!(f, "avg({e})"),
        }
    }
}

/// An evaluable expression. Structural equality (`PartialEq`) is used by the
/// optimizer to recognize projected expressions that match the GROUP BY key.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Literal(Value),
    Path(Path),
    NamedParam(String),
    PositionalParam(usize),
    Unary {
        op: UnaryOperator,
        expr: Box<Expr>,
    },
    Binary {
        op: BinaryOperator,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },
    Cast {
        expr: Box<Expr>,
        target: ValueType,
    },
    Function(Function),
    /// A document literal. `self_referenced` marks a literal standing for a
    /// whole inserted document rather than a plain value.
    KVPairs {
        pairs: Vec<(String, Expr)>,
        self_referenced: bool,
    },
    List(Vec<Expr>),
    Wildcard,
}

impl Expr {
    pub fn binary(op: BinaryOperator, lhs: Expr, rhs: Expr) -> Expr {
        Expr::Binary {
            op,
            lhs: Box::new(lhs),
            rhs: Box::new(rhs),
        }
    }

    /// True when evaluation cannot depend on a document, a parameter or an
    /// aggregate, so the result is the same in every environment.
    pub fn is_constant(&self) -> bool {
        match self {
            Expr::Literal(_) => true,
            Expr::Path(_)
            | Expr::NamedParam(_)
            | Expr::PositionalParam(_)
            | Expr::Function(_)
            | Expr::Wildcard => false,
            Expr::Unary { expr, .. } => expr.is_constant(),
            Expr::Binary { lhs, rhs, .. } => lhs.is_constant() && rhs.is_constant(),
            Expr::Cast { expr, .. } => expr.is_constant(),
            Expr::KVPairs { pairs, .. } => pairs.iter().all(|(_, e)| e.is_constant()),
            Expr::List(items) => items.iter().all(Expr::is_constant),
        }
    }

    /// Visit this expression and every sub-expression.
    pub fn walk(&self, f: &mut impl FnMut(&Expr)) {
        f(self);
        match self {
            Expr::Unary { expr, .. } | Expr::Cast { expr, .. } => expr.walk(f),
            Expr::Binary { lhs, rhs, .. } => {
                lhs.walk(f);
                rhs.walk(f);
            }
            Expr::Function(func) => match func {
                Function::Count { expr: Some(e), .. }
                | Function::Sum(e)
                | Function::Min(e)
                | Function::Max(e)
                | Function::Avg(e) => e.walk(f),
                _ => {}
            },
            Expr::KVPairs { pairs, .. } => {
                for (_, e) in pairs {
                    e.walk(f);
                }
            }
            Expr::List(items) => {
                for e in items {
                    e.walk(f);
                }
            }
            _ => {}
        }
    }

    /// Aggregate functions appearing anywhere in this expression.
    pub fn aggregates(&self) -> Vec<Function> {
        let mut out = Vec::new();
        self.walk(&mut |e| {
            if let Expr::Function(func) = e
                && func.is_aggregate()
            {
                out.push(func.clone());
            }
        });
        out
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::Literal(v) => write!(f, "{v}"),
            Expr::Path(p) => write!(f, "{p}"),
            Expr::NamedParam(name) => write!(f, "${name}"),
            Expr::PositionalParam(_) => write!(f, "?"),
            Expr::Unary {
                op: UnaryOperator::Neg,
                expr,
            } => write!(f, "-{expr}"),
            Expr::Binary { op, lhs, rhs } => write!(f, "{lhs} {op} {rhs}"),
            Expr::Cast { expr, target } => write!(f, "CAST({expr} AS {target})"),
            Expr::Function(func) => write!(f, "{func}"),
            Expr::KVPairs { pairs, .. } => {
                write!(f, "{{")?;
                for (i, (name, expr)) in pairs.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{name}: {expr}")?;
                }
                write!(f, "}}")
            }
            Expr::List(items) => {
                write!(f, "[")?;
                for (i, expr) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{expr}")?;
                }
                write!(f, "]")
            }
            Expr::Wildcard => write!(f, "*"),
        }
    }
}

use std::fmt;

use basalt_document::{FieldBuffer, Value};
use basalt_sql::{Environment, Expr, Function, GROUP_KEY};

use crate::error::Error;

/// Blueprint for a per-group accumulator.
#[derive(Debug, Clone, PartialEq)]
pub enum AggregatorBuilder {
    Count { wildcard: bool, expr: Option<Expr> },
    Sum(Expr),
    Min(Expr),
    Max(Expr),
    Avg(Expr),
    /// Copies the GROUP BY key into the output document under `name`.
    GroupKey { name: String },
}

impl AggregatorBuilder {
    pub fn from_function(func: &Function) -> Option<Self> {
        Some(match func {
            Function::Count { wildcard, expr } => AggregatorBuilder::Count {
                wildcard: *wildcard,
                expr: expr.as_deref().cloned(),
            },
            Function::Sum(e) => AggregatorBuilder::Sum((**e).clone()),
            Function::Min(e) => AggregatorBuilder::Min((**e).clone()),
            Function::Max(e) => AggregatorBuilder::Max((**e).clone()),
            Function::Avg(e) => AggregatorBuilder::Avg((**e).clone()),
            Function::Pk => return None,
        })
    }

    /// The output field name, matching the function's canonical text.
    pub fn name(&self) -> String {
        self.to_string()
    }

    pub fn build(&self) -> Box<dyn Aggregator> {
        match self {
            AggregatorBuilder::Count { wildcard, expr } => Box::new(CountAggregator {
                wildcard: *wildcard,
                expr: expr.clone(),
                name: self.name(),
                count: 0,
            }),
            AggregatorBuilder::Sum(expr) => Box::new(SumAggregator {
                expr: expr.clone(),
                name: self.name(),
                sum: None,
            }),
            AggregatorBuilder::Min(expr) => Box::new(ExtremumAggregator {
                expr: expr.clone(),
                name: self.name(),
                min: true,
                best: None,
            }),
            AggregatorBuilder::Max(expr) => Box::new(ExtremumAggregator {
                expr: expr.clone(),
                name: self.name(),
                min: false,
                best: None,
            }),
            AggregatorBuilder::Avg(expr) => Box::new(AvgAggregator {
                expr: expr.clone(),
                name: self.name(),
                sum: 0.0,
                count: 0,
            }),
            AggregatorBuilder::GroupKey { name } => Box::new(GroupKeyAggregator {
                name: name.clone(),
                key: None,
            }),
        }
    }
}

impl fmt::Display for AggregatorBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AggregatorBuilder::Count { wildcard: true, .. } => write!(f, "count(*)"),
            AggregatorBuilder::Count { expr, .. } => match expr {
                Some(e) => write!(f, "count({e})"),
                None => write!(f, "count(*)"),
            },
            AggregatorBuilder::Sum(e) => write!(f, "sum({e})"),
            AggregatorBuilder::Min(e) => write!(f, "min({e})"),
            AggregatorBuilder::Max(e) => write!(f, "max({e})"),
            AggregatorBuilder::Avg(e) => write!(f, "avg({e})"),
            AggregatorBuilder::GroupKey { name } => write!(f, "{name}"),
        }
    }
}

/// A stateful folder: fed one environment per document, emits one field
/// into the group's output document.
pub trait Aggregator {
    fn add(&mut self, env: &Environment) -> Result<(), Error>;
    fn finish(&mut self, out: &mut FieldBuffer) -> Result<(), Error>;
}

struct CountAggregator {
    wildcard: bool,
    expr: Option<Expr>,
    name: String,
    count: i64,
}

impl Aggregator for CountAggregator {
    fn add(&mut self, env: &Environment) -> Result<(), Error> {
        if self.wildcard {
            self.count += 1;
            return Ok(());
        }
        if let Some(expr) = &self.expr
            && !expr.eval(env)?.is_null()
        {
            self.count += 1;
        }
        Ok(())
    }

    fn finish(&mut self, out: &mut FieldBuffer) -> Result<(), Error> {
        out.add(self.name.clone(), Value::Integer(self.count));
        Ok(())
    }
}

struct SumAggregator {
    expr: Expr,
    name: String,
    sum: Option<Value>,
}

impl Aggregator for SumAggregator {
    fn add(&mut self, env: &Environment) -> Result<(), Error> {
        let v = self.expr.eval(env)?;
        if !v.type_of().is_number() {
            return Ok(());
        }
        self.sum = Some(match self.sum.take() {
            None => v,
            Some(acc) => add_numbers(acc, v),
        });
        Ok(())
    }

    fn finish(&mut self, out: &mut FieldBuffer) -> Result<(), Error> {
        out.add(self.name.clone(), self.sum.take().unwrap_or(Value::Null));
        Ok(())
    }
}

struct ExtremumAggregator {
    expr: Expr,
    name: String,
    min: bool,
    best: Option<Value>,
}

impl Aggregator for ExtremumAggregator {
    fn add(&mut self, env: &Environment) -> Result<(), Error> {
        let v = self.expr.eval(env)?;
        if v.is_null() {
            return Ok(());
        }
        self.best = Some(match self.best.take() {
            None => v,
            Some(best) => {
                let keep_new = if self.min {
                    v.cmp_values(&best) == std::cmp::Ordering::Less
                } else {
                    v.cmp_values(&best) == std::cmp::Ordering::Greater
                };
                if keep_new { v } else { best }
            }
        });
        Ok(())
    }

    fn finish(&mut self, out: &mut FieldBuffer) -> Result<(), Error> {
        out.add(self.name.clone(), self.best.take().unwrap_or(Value::Null));
        Ok(())
    }
}

struct AvgAggregator {
    expr: Expr,
    name: String,
    sum: f64,
    count: i64,
}

impl Aggregator for AvgAggregator {
    fn add(&mut self, env: &Environment) -> Result<(), Error> {
        match self.expr.eval(env)? {
            Value::Integer(n) | Value::Duration(n) => {
                self.sum += n as f64;
                self.count += 1;
            }
            Value::Double(d) => {
                self.sum += d;
                self.count += 1;
            }
            _ => {}
        }
        Ok(())
    }

    fn finish(&mut self, out: &mut FieldBuffer) -> Result<(), Error> {
        let avg = if self.count == 0 {
            Value::Null
        } else {
            Value::Double(self.sum / self.count as f64)
        };
        out.add(self.name.clone(), avg);
        Ok(())
    }
}

struct GroupKeyAggregator {
    name: String,
    key: Option<Value>,
}

impl Aggregator for GroupKeyAggregator {
    fn add(&mut self, env: &Environment) -> Result<(), Error> {
        if self.key.is_none() {
            self.key = Some(env.get(GROUP_KEY).unwrap_or(Value::Null));
        }
        Ok(())
    }

    fn finish(&mut self, out: &mut FieldBuffer) -> Result<(), Error> {
        out.add(self.name.clone(), self.key.take().unwrap_or(Value::Null));
        Ok(())
    }
}

/// Integer-preserving addition with double promotion.
fn add_numbers(a: Value, b: Value) -> Value {
    match (a, b) {
        (Value::Integer(x), Value::Integer(y)) => Value::Integer(x.wrapping_add(y)),
        (Value::Duration(x), Value::Duration(y)) => Value::Duration(x.wrapping_add(y)),
        (a, b) => {
            let x = match a {
                Value::Integer(n) | Value::Duration(n) => n as f64,
                Value::Double(d) => d,
                _ => 0.0,
            };
            let y = match b {
                Value::Integer(n) | Value::Duration(n) => n as f64,
                Value::Double(d) => d,
                _ => 0.0,
            };
            Value::Double(x + y)
        }
    }
}

use basalt_document::{Document, FieldBuffer, Fragment, Path, Value};

use crate::error::EvalError;
use crate::glob::like_match;

use super::{BinaryOperator, Environment, Expr, Function, PRIMARY_KEY, UnaryOperator};

impl Expr {
    pub fn eval(&self, env: &Environment) -> Result<Value, EvalError> {
        match self {
            Expr::Literal(v) => Ok(v.clone()),
            Expr::Path(path) => eval_path(path, env),
            Expr::NamedParam(name) => env
                .get_param_by_name(name)
                .ok_or_else(|| EvalError::UnknownParameter(name.clone())),
            Expr::PositionalParam(i) => env
                .get_param_by_index(*i)
                .ok_or(EvalError::ParameterOutOfRange(*i)),
            Expr::Unary {
                op: UnaryOperator::Neg,
                expr,
            } => match expr.eval(env)? {
                Value::Null => Ok(Value::Null),
                Value::Integer(n) => Ok(Value::Integer(n.wrapping_neg())),
                Value::Double(d) => Ok(Value::Double(-d)),
                Value::Duration(n) => Ok(Value::Duration(n.wrapping_neg())),
                other => Err(EvalError::Type(format!(
                    "cannot negate a {}",
                    other.type_of()
                ))),
            },
            Expr::Binary { op, lhs, rhs } => eval_binary(*op, lhs, rhs, env),
            Expr::Cast { expr, target } => Ok(expr.eval(env)?.cast_as(*target)?),
            Expr::Function(func) => eval_function(func, env),
            Expr::KVPairs { pairs, .. } => {
                let mut fb = FieldBuffer::new();
                for (name, expr) in pairs {
                    fb.add(name.clone(), expr.eval(env)?);
                }
                Ok(Value::Document(Document::Buf(fb)))
            }
            Expr::List(items) => {
                let mut out = Vec::with_capacity(items.len());
                for expr in items {
                    out.push(expr.eval(env)?);
                }
                Ok(Value::Array(out))
            }
            Expr::Wildcard => Err(EvalError::Type(
                "wildcard is only valid in a projection".into(),
            )),
        }
    }
}

fn eval_path(path: &Path, env: &Environment) -> Result<Value, EvalError> {
    let fragments = path.fragments();
    // Underscore-prefixed leading fragments address environment bindings:
    // `_v` is the whole current value, `_acc`/`_group`/`_key` the reducer
    // and scan state.
    if let Some(Fragment::Field(name)) = fragments.first()
        && name.starts_with('_')
        && let Some(root) = env.get(name)
    {
        let rest = &fragments[1..];
        if rest.is_empty() {
            return Ok(root);
        }
        let sub = Path::new(rest.to_vec());
        return Ok(sub.get_value(&root)?.unwrap_or(Value::Null));
    }
    let current = env.get_current_value().ok_or(EvalError::NoCurrentValue)?;
    Ok(path.get_value(&current)?.unwrap_or(Value::Null))
}

fn eval_binary(
    op: BinaryOperator,
    lhs: &Expr,
    rhs: &Expr,
    env: &Environment,
) -> Result<Value, EvalError> {
    use BinaryOperator::*;

    match op {
        And => {
            let a = lhs.eval(env)?;
            if !a.is_truthy() {
                return Ok(Value::Bool(false));
            }
            Ok(Value::Bool(rhs.eval(env)?.is_truthy()))
        }
        Or => {
            let a = lhs.eval(env)?;
            if a.is_truthy() {
                return Ok(Value::Bool(true));
            }
            Ok(Value::Bool(rhs.eval(env)?.is_truthy()))
        }
        _ => {
            let a = lhs.eval(env)?;
            let b = rhs.eval(env)?;
            match op {
                Add | Sub | Mul | Div | Mod => eval_arithmetic(op, a, b),
                BitAnd | BitOr | BitXor => eval_bitwise(op, a, b),
                Concat => eval_concat(a, b),
                Eq | Neq | Gt | Gte | Lt | Lte => eval_comparison(op, a, b),
                In => eval_in(a, b),
                NotIn => Ok(invert_bool(eval_in(a, b)?)),
                Is => Ok(Value::Bool(a == b)),
                IsNot => Ok(Value::Bool(a != b)),
                Like => eval_like(a, b),
                NotLike => Ok(invert_bool(eval_like(a, b)?)),
                And | Or => unreachable!(),
            }
        }
    }
}

fn invert_bool(v: Value) -> Value {
    match v {
        Value::Bool(b) => Value::Bool(!b),
        other => other,
    }
}

/// Numeric arithmetic. Mixed Integer/Double promotes to Double; integer
/// addition, subtraction and multiplication wrap with two's-complement
/// semantics; any zero divisor fails. Durations stay durations under
/// integer-class arithmetic.
fn eval_arithmetic(op: BinaryOperator, a: Value, b: Value) -> Result<Value, EvalError> {
    use BinaryOperator::*;

    if a.is_null() || b.is_null() {
        return Ok(Value::Null);
    }
    let (ta, tb) = (a.type_of(), b.type_of());
    if !ta.is_number() || !tb.is_number() {
        return Err(EvalError::Type(format!(
            "cannot apply {op} to {ta} and {tb}"
        )));
    }

    let any_double =
        matches!(a, Value::Double(_)) || matches!(b, Value::Double(_));
    if any_double {
        let (x, y) = (to_f64(&a), to_f64(&b));
        let out = match op {
            Add => x + y,
            Sub => x - y,
            Mul => x * y,
            Div => {
                if y == 0.0 {
                    return Err(EvalError::DivideByZero);
                }
                x / y
            }
            Mod => {
                if y == 0.0 {
                    return Err(EvalError::DivideByZero);
                }
                x % y
            }
            _ => unreachable!(),
        };
        return Ok(Value::Double(out));
    }

    let any_duration =
        matches!(a, Value::Duration(_)) || matches!(b, Value::Duration(_));
    let (x, y) = (to_i64(&a), to_i64(&b));
    let out = match op {
        Add => x.wrapping_add(y),
        Sub => x.wrapping_sub(y),
        Mul => x.wrapping_mul(y),
        Div => {
            if y == 0 {
                return Err(EvalError::DivideByZero);
            }
            x.wrapping_div(y)
        }
        Mod => {
            if y == 0 {
                return Err(EvalError::DivideByZero);
            }
            x.wrapping_rem(y)
        }
        _ => unreachable!(),
    };
    if any_duration {
        Ok(Value::Duration(out))
    } else {
        Ok(Value::Integer(out))
    }
}

fn eval_bitwise(op: BinaryOperator, a: Value, b: Value) -> Result<Value, EvalError> {
    if a.is_null() || b.is_null() {
        return Ok(Value::Null);
    }
    let (Value::Integer(x), Value::Integer(y)) = (&a, &b) else {
        return Err(EvalError::Type(format!(
            "cannot apply {op} to {} and {}",
            a.type_of(),
            b.type_of()
        )));
    };
    Ok(Value::Integer(match op {
        BinaryOperator::BitAnd => x & y,
        BinaryOperator::BitOr => x | y,
        BinaryOperator::BitXor => x ^ y,
        _ => unreachable!(),
    }))
}

fn eval_concat(a: Value, b: Value) -> Result<Value, EvalError> {
    if a.is_null() || b.is_null() {
        return Ok(Value::Null);
    }
    match (a, b) {
        (Value::Text(mut x), Value::Text(y)) => {
            x.push_str(&y);
            Ok(Value::Text(x))
        }
        (a, b) => Err(EvalError::Type(format!(
            "cannot concatenate {} and {}",
            a.type_of(),
            b.type_of()
        ))),
    }
}

/// Comparisons return Bool, except that a Null on either side yields Null
/// (which the filter operator treats as "drop").
fn eval_comparison(op: BinaryOperator, a: Value, b: Value) -> Result<Value, EvalError> {
    use std::cmp::Ordering;

    if a.is_null() || b.is_null() {
        return Ok(Value::Null);
    }
    Ok(Value::Bool(match op {
        BinaryOperator::Eq => a == b,
        BinaryOperator::Neq => a != b,
        BinaryOperator::Gt => a.cmp_values(&b) == Ordering::Greater,
        BinaryOperator::Gte => a.cmp_values(&b) != Ordering::Less,
        BinaryOperator::Lt => a.cmp_values(&b) == Ordering::Less,
        BinaryOperator::Lte => a.cmp_values(&b) != Ordering::Greater,
        _ => unreachable!(),
    }))
}

fn eval_in(a: Value, b: Value) -> Result<Value, EvalError> {
    if a.is_null() || b.is_null() {
        return Ok(Value::Null);
    }
    match b {
        Value::Array(items) => Ok(Value::Bool(items.iter().any(|item| *item == a))),
        other => Err(EvalError::Type(format!(
            "right side of IN must be an array, got {}",
            other.type_of()
        ))),
    }
}

fn eval_like(a: Value, b: Value) -> Result<Value, EvalError> {
    if a.is_null() || b.is_null() {
        return Ok(Value::Null);
    }
    match (a, b) {
        (Value::Text(text), Value::Text(pattern)) => {
            Ok(Value::Bool(like_match(&pattern, &text)?))
        }
        (a, b) => Err(EvalError::Type(format!(
            "LIKE expects text operands, got {} and {}",
            a.type_of(),
            b.type_of()
        ))),
    }
}

fn to_f64(v: &Value) -> f64 {
    match v {
        Value::Integer(n) | Value::Duration(n) => *n as f64,
        Value::Double(d) => *d,
        _ => 0.0,
    }
}

fn to_i64(v: &Value) -> i64 {
    match v {
        Value::Integer(n) | Value::Duration(n) => *n,
        _ => 0,
    }
}

/// `pk()` reads the primary key bound by the scan operators; aggregate
/// functions read their own result field out of the aggregated document.
fn eval_function(func: &Function, env: &Environment) -> Result<Value, EvalError> {
    match func {
        Function::Pk => Ok(env.get(PRIMARY_KEY).unwrap_or(Value::Null)),
        aggregate => {
            let current = env.get_current_value().ok_or(EvalError::NoCurrentValue)?;
            let Value::Document(doc) = current else {
                return Ok(Value::Null);
            };
            Ok(doc.get(&aggregate.to_string())?.unwrap_or(Value::Null))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Param;
    use basalt_document::ValueType;

    fn env_with(doc_json: &str) -> Environment {
        let fb = FieldBuffer::from_json(doc_json).unwrap();
        let mut env = Environment::default();
        env.set_current_value(Value::Document(Document::Buf(fb)));
        env
    }

    fn lit(v: Value) -> Expr {
        Expr::Literal(v)
    }

    #[test]
    fn path_resolves_and_missing_is_null() {
        let env = env_with(r#"{"a": 1, "b": {"c": 2}}"#);
        let expr = Expr::Path("b.c".parse().unwrap());
        assert_eq!(expr.eval(&env).unwrap(), Value::Integer(2));
        let expr = Expr::Path("missing".parse().unwrap());
        assert_eq!(expr.eval(&env).unwrap(), Value::Null);
    }

    #[test]
    fn path_without_current_value_fails() {
        let env = Environment::default();
        let expr = Expr::Path("a".parse().unwrap());
        assert!(matches!(
            expr.eval(&env),
            Err(EvalError::NoCurrentValue)
        ));
    }

    #[test]
    fn leading_underscore_v_is_the_whole_value() {
        let mut env = Environment::default();
        env.set_current_value(Value::Integer(42));
        let expr = Expr::Path(Path::field("_v"));
        assert_eq!(expr.eval(&env).unwrap(), Value::Integer(42));
    }

    #[test]
    fn arithmetic_promotes_and_wraps() {
        let env = Environment::default();
        let add = Expr::binary(
            BinaryOperator::Add,
            lit(Value::Integer(1)),
            lit(Value::Double(2.5)),
        );
        assert_eq!(add.eval(&env).unwrap(), Value::Double(3.5));

        let wrap = Expr::binary(
            BinaryOperator::Add,
            lit(Value::Integer(i64::MAX)),
            lit(Value::Integer(1)),
        );
        assert_eq!(wrap.eval(&env).unwrap(), Value::Integer(i64::MIN));
    }

    #[test]
    fn division_by_zero_fails() {
        let env = Environment::default();
        let div = Expr::binary(
            BinaryOperator::Div,
            lit(Value::Integer(4)),
            lit(Value::Integer(0)),
        );
        assert!(matches!(div.eval(&env), Err(EvalError::DivideByZero)));
    }

    #[test]
    fn arithmetic_with_null_is_null() {
        let env = Environment::default();
        let add = Expr::binary(BinaryOperator::Add, lit(Value::Null), lit(Value::Integer(1)));
        assert_eq!(add.eval(&env).unwrap(), Value::Null);
    }

    #[test]
    fn text_plus_is_an_error_but_concat_works() {
        let env = Environment::default();
        let plus = Expr::binary(
            BinaryOperator::Add,
            lit(Value::Text("a".into())),
            lit(Value::Text("b".into())),
        );
        assert!(matches!(plus.eval(&env), Err(EvalError::Type(_))));

        let concat = Expr::binary(
            BinaryOperator::Concat,
            lit(Value::Text("a".into())),
            lit(Value::Text("b".into())),
        );
        assert_eq!(concat.eval(&env).unwrap(), Value::Text("ab".into()));
    }

    #[test]
    fn comparison_null_propagates() {
        let env = Environment::default();
        let cmp = Expr::binary(BinaryOperator::Eq, lit(Value::Null), lit(Value::Integer(1)));
        assert_eq!(cmp.eval(&env).unwrap(), Value::Null);
        let is = Expr::binary(BinaryOperator::Is, lit(Value::Null), lit(Value::Null));
        assert_eq!(is.eval(&env).unwrap(), Value::Bool(true));
    }

    #[test]
    fn numeric_comparison_crosses_types() {
        let env = Environment::default();
        let cmp = Expr::binary(
            BinaryOperator::Eq,
            lit(Value::Integer(2)),
            lit(Value::Double(2.0)),
        );
        assert_eq!(cmp.eval(&env).unwrap(), Value::Bool(true));
    }

    #[test]
    fn in_checks_membership() {
        let env = Environment::default();
        let list = Expr::List(vec![lit(Value::Integer(1)), lit(Value::Integer(2))]);
        let expr = Expr::binary(BinaryOperator::In, lit(Value::Integer(2)), list.clone());
        assert_eq!(expr.eval(&env).unwrap(), Value::Bool(true));
        let expr = Expr::binary(BinaryOperator::NotIn, lit(Value::Integer(3)), list);
        assert_eq!(expr.eval(&env).unwrap(), Value::Bool(true));

        let bad = Expr::binary(
            BinaryOperator::In,
            lit(Value::Integer(1)),
            lit(Value::Integer(1)),
        );
        assert!(matches!(bad.eval(&env), Err(EvalError::Type(_))));
    }

    #[test]
    fn like_and_not_like() {
        let env = Environment::default();
        let expr = Expr::binary(
            BinaryOperator::Like,
            lit(Value::Text("hello".into())),
            lit(Value::Text("h%o".into())),
        );
        assert_eq!(expr.eval(&env).unwrap(), Value::Bool(true));

        let expr = Expr::binary(
            BinaryOperator::NotLike,
            lit(Value::Null),
            lit(Value::Text("h%o".into())),
        );
        assert_eq!(expr.eval(&env).unwrap(), Value::Null);
    }

    #[test]
    fn cast_delegates_to_value_cast() {
        let env = Environment::default();
        let expr = Expr::Cast {
            expr: Box::new(lit(Value::Text("12".into()))),
            target: ValueType::Integer,
        };
        assert_eq!(expr.eval(&env).unwrap(), Value::Integer(12));
    }

    #[test]
    fn kv_pairs_evaluate_in_order() {
        let env = Environment::default();
        let expr = Expr::KVPairs {
            pairs: vec![
                ("a".into(), lit(Value::Integer(1))),
                (
                    "b".into(),
                    Expr::binary(
                        BinaryOperator::Mul,
                        lit(Value::Integer(2)),
                        lit(Value::Integer(3)),
                    ),
                ),
            ],
            self_referenced: false,
        };
        let Value::Document(doc) = expr.eval(&env).unwrap() else {
            panic!("expected document");
        };
        assert_eq!(doc.get("b").unwrap(), Some(Value::Integer(6)));
    }

    #[test]
    fn aggregate_function_reads_its_field() {
        let mut fb = FieldBuffer::new();
        fb.add("count(*)", Value::Integer(7));
        let mut env = Environment::default();
        env.set_current_value(Value::Document(Document::Buf(fb)));

        let expr = Expr::Function(Function::Count {
            wildcard: true,
            expr: None,
        });
        assert_eq!(expr.eval(&env).unwrap(), Value::Integer(7));
    }

    #[test]
    fn missing_parameter_errors() {
        let env = Environment::new(vec![Param::positional(Value::Integer(1))]);
        assert_eq!(
            Expr::PositionalParam(1).eval(&env).unwrap(),
            Value::Integer(1)
        );
        assert!(matches!(
            Expr::PositionalParam(2).eval(&env),
            Err(EvalError::ParameterOutOfRange(2))
        ));
        assert!(matches!(
            Expr::NamedParam("x".into()).eval(&env),
            Err(EvalError::UnknownParameter(_))
        ));
    }
}

//! Evaluator for compiled filter expressions.
//!
//! Absent propagates as `None`. The only comparison that treats absent as
//! anything but "no" is `absent == null`, which holds; every other
//! comparison touching an absent side is false.

use serde_json::Value;

use crate::error::{JaError, Result};
use crate::expr::{ArithOp, Builtin, CompareOp, Expr};
use crate::value::{compare_values, values_equal, Record};

/// Truthiness: absent and null are false, booleans are themselves, numbers
/// are nonzero, strings/arrays/objects are nonempty.
pub fn truthy(value: Option<&Value>) -> bool {
    match value {
        None | Some(Value::Null) => false,
        Some(Value::Bool(b)) => *b,
        Some(Value::Number(n)) => n.as_f64().map_or(false, |f| f != 0.0),
        Some(Value::String(s)) => !s.is_empty(),
        Some(Value::Array(items)) => !items.is_empty(),
        Some(Value::Object(map)) => !map.is_empty(),
    }
}

pub fn evaluate(expr: &Expr, record: &Record) -> Result<Option<Value>> {
    match expr {
        Expr::Literal(value) => Ok(Some(value.clone())),
        Expr::Path(path) => Ok(path.get(record).cloned()),
        Expr::Not(inner) => {
            let value = evaluate(inner, record)?;
            Ok(Some(Value::Bool(!truthy(value.as_ref()))))
        }
        Expr::And(lhs, rhs) => {
            if !truthy(evaluate(lhs, record)?.as_ref()) {
                return Ok(Some(Value::Bool(false)));
            }
            let rhs = evaluate(rhs, record)?;
            Ok(Some(Value::Bool(truthy(rhs.as_ref()))))
        }
        Expr::Or(lhs, rhs) => {
            if truthy(evaluate(lhs, record)?.as_ref()) {
                return Ok(Some(Value::Bool(true)));
            }
            let rhs = evaluate(rhs, record)?;
            Ok(Some(Value::Bool(truthy(rhs.as_ref()))))
        }
        Expr::Neg(inner) => match evaluate(inner, record)? {
            None => Ok(None),
            Some(Value::Number(n)) => match n.as_i64().and_then(i64::checked_neg) {
                Some(negated) => Ok(Some(Value::from(negated))),
                None => Ok(Some(Value::from(-n.as_f64().unwrap_or(0.0)))),
            },
            Some(other) => Err(JaError::eval(format!("cannot negate {}", type_name(&other)))),
        },
        Expr::Compare { op, lhs, rhs } => {
            let left = evaluate(lhs, record)?;
            let right = evaluate(rhs, record)?;
            Ok(Some(Value::Bool(compare(*op, left.as_ref(), right.as_ref()))))
        }
        Expr::Arith { op, lhs, rhs } => {
            let left = evaluate(lhs, record)?;
            let right = evaluate(rhs, record)?;
            arithmetic(*op, left, right).map(Some)
        }
        Expr::Call { func, args } => call(*func, args, record),
    }
}

fn compare(op: CompareOp, left: Option<&Value>, right: Option<&Value>) -> bool {
    match (left, right) {
        // absent == null (either way round) is the single absent truth.
        (None, Some(Value::Null)) | (Some(Value::Null), None) => op == CompareOp::Eq,
        (None, _) | (_, None) => false,
        (Some(l), Some(r)) => match op {
            CompareOp::Eq => values_equal(l, r),
            CompareOp::NotEq => !values_equal(l, r),
            CompareOp::Lt | CompareOp::LtEq | CompareOp::Gt | CompareOp::GtEq => {
                if !ordered_comparable(l, r) {
                    return false;
                }
                let ord = compare_values(l, r);
                match op {
                    CompareOp::Lt => ord.is_lt(),
                    CompareOp::LtEq => ord.is_le(),
                    CompareOp::Gt => ord.is_gt(),
                    CompareOp::GtEq => ord.is_ge(),
                    _ => unreachable!(),
                }
            }
        },
    }
}

/// Ordered comparisons apply to numbers, strings, and booleans of the same
/// kind; everything else answers false rather than using the sort rank.
fn ordered_comparable(l: &Value, r: &Value) -> bool {
    matches!(
        (l, r),
        (Value::Number(_), Value::Number(_))
            | (Value::String(_), Value::String(_))
            | (Value::Bool(_), Value::Bool(_))
    )
}

fn arithmetic(op: ArithOp, left: Option<Value>, right: Option<Value>) -> Result<Value> {
    let (l, r) = match (left, right) {
        (Some(l), Some(r)) => (l, r),
        _ => return Err(JaError::eval("arithmetic over a missing field")),
    };
    let (ln, rn) = match (&l, &r) {
        (Value::Number(a), Value::Number(b)) => (a.clone(), b.clone()),
        _ => {
            return Err(JaError::eval(format!(
                "cannot apply arithmetic to {} and {}",
                type_name(&l),
                type_name(&r)
            )))
        }
    };

    // Division always yields a float; the other operators stay integral
    // when both operands are integers and the result fits.
    match op {
        ArithOp::Div => {
            let denominator = rn.as_f64().unwrap_or(0.0);
            if denominator == 0.0 {
                return Err(JaError::eval("division by zero"));
            }
            Ok(Value::from(ln.as_f64().unwrap_or(0.0) / denominator))
        }
        ArithOp::Rem => match (ln.as_i64(), rn.as_i64()) {
            (Some(a), Some(b)) => {
                if b == 0 {
                    return Err(JaError::eval("division by zero"));
                }
                Ok(Value::from(a % b))
            }
            _ => {
                let denominator = rn.as_f64().unwrap_or(0.0);
                if denominator == 0.0 {
                    return Err(JaError::eval("division by zero"));
                }
                Ok(Value::from(ln.as_f64().unwrap_or(0.0) % denominator))
            }
        },
        ArithOp::Add | ArithOp::Sub | ArithOp::Mul => match (ln.as_i64(), rn.as_i64()) {
            (Some(a), Some(b)) => {
                let exact = match op {
                    ArithOp::Add => a.checked_add(b),
                    ArithOp::Sub => a.checked_sub(b),
                    ArithOp::Mul => a.checked_mul(b),
                    _ => unreachable!(),
                };
                match exact {
                    Some(v) => Ok(Value::from(v)),
                    None => Ok(float_op(op, a as f64, b as f64)),
                }
            }
            _ => Ok(float_op(
                op,
                ln.as_f64().unwrap_or(0.0),
                rn.as_f64().unwrap_or(0.0),
            )),
        },
    }
}

fn float_op(op: ArithOp, a: f64, b: f64) -> Value {
    let result = match op {
        ArithOp::Add => a + b,
        ArithOp::Sub => a - b,
        ArithOp::Mul => a * b,
        _ => unreachable!(),
    };
    Value::from(result)
}

fn call(func: Builtin, args: &[Expr], record: &Record) -> Result<Option<Value>> {
    // coalesce controls its own evaluation to stop at the first hit.
    if func == Builtin::Coalesce {
        for arg in args {
            match evaluate(arg, record)? {
                Some(Value::Null) | None => continue,
                Some(value) => return Ok(Some(value)),
            }
        }
        return Ok(None);
    }

    let mut values = Vec::with_capacity(args.len());
    for arg in args {
        values.push(evaluate(arg, record)?);
    }
    // Absent propagates through every other builtin.
    if values.iter().any(Option::is_none) {
        return Ok(None);
    }
    let values: Vec<Value> = values.into_iter().map(Option::unwrap).collect();

    match func {
        Builtin::Lower => as_string(&values[0], "lower").map(|s| Some(Value::from(s.to_lowercase()))),
        Builtin::Upper => as_string(&values[0], "upper").map(|s| Some(Value::from(s.to_uppercase()))),
        Builtin::StartsWith => {
            let s = as_string(&values[0], "startswith")?;
            let prefix = as_string(&values[1], "startswith")?;
            Ok(Some(Value::Bool(s.starts_with(prefix))))
        }
        Builtin::EndsWith => {
            let s = as_string(&values[0], "endswith")?;
            let suffix = as_string(&values[1], "endswith")?;
            Ok(Some(Value::Bool(s.ends_with(suffix))))
        }
        Builtin::Contains => match &values[0] {
            Value::String(haystack) => {
                let needle = as_string(&values[1], "contains")?;
                Ok(Some(Value::Bool(haystack.contains(needle))))
            }
            Value::Array(items) => Ok(Some(Value::Bool(
                items.iter().any(|item| values_equal(item, &values[1])),
            ))),
            other => Err(JaError::eval(format!(
                "contains expects a string or array, got {}",
                type_name(other)
            ))),
        },
        Builtin::Length => match &values[0] {
            Value::String(s) => Ok(Some(Value::from(s.chars().count() as i64))),
            Value::Array(items) => Ok(Some(Value::from(items.len() as i64))),
            Value::Object(map) => Ok(Some(Value::from(map.len() as i64))),
            other => Err(JaError::eval(format!(
                "length expects a string, array, or object, got {}",
                type_name(other)
            ))),
        },
        Builtin::Abs => match &values[0] {
            Value::Number(n) => match n.as_i64().and_then(i64::checked_abs) {
                Some(magnitude) => Ok(Some(Value::from(magnitude))),
                None => Ok(Some(Value::from(n.as_f64().unwrap_or(0.0).abs()))),
            },
            other => Err(JaError::eval(format!("abs expects a number, got {}", type_name(other)))),
        },
        Builtin::Round => match &values[0] {
            Value::Number(n) => {
                if n.is_i64() || n.is_u64() {
                    Ok(Some(Value::Number(n.clone())))
                } else {
                    let rounded = n.as_f64().unwrap_or(0.0).round();
                    if rounded.abs() <= i64::MAX as f64 {
                        Ok(Some(Value::from(rounded as i64)))
                    } else {
                        Ok(Some(Value::from(rounded)))
                    }
                }
            }
            other => Err(JaError::eval(format!("round expects a number, got {}", type_name(other)))),
        },
        Builtin::Coalesce => unreachable!("handled above"),
    }
}

fn as_string<'a>(value: &'a Value, func: &str) -> Result<&'a str> {
    value
        .as_str()
        .ok_or_else(|| JaError::eval(format!("{func} expects a string, got {}", type_name(value))))
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::CompiledExpr;
    use serde_json::json;

    fn matches(expr: &str, record: serde_json::Value) -> bool {
        CompiledExpr::compile(expr)
            .unwrap()
            .matches(record.as_object().unwrap())
            .unwrap()
    }

    fn eval(expr: &str, record: serde_json::Value) -> Option<Value> {
        CompiledExpr::compile(expr)
            .unwrap()
            .evaluate(record.as_object().unwrap())
            .unwrap()
    }

    #[test]
    fn test_comparisons() {
        assert!(matches("a > 1", json!({"a": 2})));
        assert!(!matches("a > 1", json!({"a": 1})));
        assert!(matches("name == 'Ada'", json!({"name": "Ada"})));
        assert!(matches("a != 'x'", json!({"a": "y"})));
    }

    #[test]
    fn test_absent_equals_null_only() {
        assert!(matches("missing == null", json!({"a": 1})));
        assert!(!matches("missing == 0", json!({"a": 1})));
        assert!(!matches("missing != 0", json!({"a": 1})));
        assert!(!matches("missing > 0", json!({"a": 1})));
        // Present null also equals null.
        assert!(matches("a == null", json!({"a": null})));
        assert!(!matches("a == null", json!({"a": 0})));
    }

    #[test]
    fn test_boolean_connectives_short_circuit() {
        // The right side would divide by zero; `and` must not reach it.
        assert!(!matches("false and 1 / 0 > 0", json!({})));
        assert!(matches("true or 1 / 0 > 0", json!({})));
        assert!(matches("not missing", json!({})));
    }

    #[test]
    fn test_arithmetic() {
        assert_eq!(eval("a + 2 * 3", json!({"a": 1})), Some(json!(7)));
        assert_eq!(eval("10 / 4", json!({})), Some(json!(2.5)));
        assert_eq!(eval("7 % 3", json!({})), Some(json!(1)));
        assert_eq!(eval("-a", json!({"a": 5})), Some(json!(-5)));
    }

    #[test]
    fn test_division_by_zero_is_eval_error() {
        let expr = CompiledExpr::compile("10 / x").unwrap();
        let err = expr
            .evaluate(json!({"x": 0}).as_object().unwrap())
            .unwrap_err();
        assert!(err.is_per_record());
        assert!(err.to_string().contains("division by zero"));
    }

    #[test]
    fn test_int_float_unified_in_filters() {
        assert!(matches("a == 1.0", json!({"a": 1})));
        assert!(matches("a >= 2", json!({"a": 2.0})));
    }

    #[test]
    fn test_mixed_type_ordering_is_false() {
        assert!(!matches("a < 'x'", json!({"a": 1})));
        assert!(!matches("a > 1", json!({"a": "2"})));
    }

    #[test]
    fn test_builtins() {
        assert_eq!(eval("lower(name)", json!({"name": "ADA"})), Some(json!("ada")));
        assert_eq!(eval("upper(name)", json!({"name": "ada"})), Some(json!("ADA")));
        assert!(matches("startswith(name, 'Ad')", json!({"name": "Ada"})));
        assert!(matches("endswith(name, 'da')", json!({"name": "Ada"})));
        assert!(matches("contains(tags, 'x')", json!({"tags": ["x", "y"]})));
        assert!(matches("contains(name, 'd')", json!({"name": "Ada"})));
        assert_eq!(eval("length(tags)", json!({"tags": [1, 2, 3]})), Some(json!(3)));
        assert_eq!(eval("abs(a)", json!({"a": -4})), Some(json!(4)));
        assert_eq!(eval("round(a)", json!({"a": 2.6})), Some(json!(3)));
    }

    #[test]
    fn test_coalesce_skips_absent_and_null() {
        assert_eq!(
            eval("coalesce(missing, a, b)", json!({"a": null, "b": 9})),
            Some(json!(9))
        );
        assert_eq!(eval("coalesce(missing)", json!({})), None);
    }

    #[test]
    fn test_absent_propagates_through_builtins() {
        assert_eq!(eval("lower(missing)", json!({})), None);
        assert_eq!(eval("length(missing)", json!({})), None);
    }

    #[test]
    fn test_arithmetic_over_missing_field_is_eval_error() {
        let expr = CompiledExpr::compile("a + 1").unwrap();
        let err = expr.evaluate(json!({}).as_object().unwrap()).unwrap_err();
        assert!(err.is_per_record());
    }
}

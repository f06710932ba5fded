// Binary operators

use super::Interpreter;
use crate::ast::{BinaryOp, Node};
use crate::environment::Environment;
use crate::error::{Error, Result};
use crate::sequence;
use crate::value::{format_number, JValue};

/// Largest sequence the range operator will materialize.
const MAX_RANGE: f64 = 1e6;

impl Interpreter {
    pub(super) fn evaluate_binary(
        &mut self,
        node: &Node,
        op: BinaryOp,
        lhs: &Node,
        rhs: &Node,
        input: &JValue,
        env: &Environment,
    ) -> Result<JValue> {
        let left = self.evaluate(lhs, input, env)?;

        // operators that only evaluate the right side when needed
        match op {
            BinaryOp::And => {
                if !sequence::truthy(&left) {
                    return Ok(JValue::Bool(false));
                }
                let right = self.evaluate(rhs, input, env)?;
                return Ok(JValue::Bool(sequence::truthy(&right)));
            }
            BinaryOp::Or => {
                if sequence::truthy(&left) {
                    return Ok(JValue::Bool(true));
                }
                let right = self.evaluate(rhs, input, env)?;
                return Ok(JValue::Bool(sequence::truthy(&right)));
            }
            BinaryOp::Coalesce => {
                return if left.is_undefined() {
                    self.evaluate(rhs, input, env)
                } else {
                    Ok(left)
                };
            }
            BinaryOp::Default => {
                return if sequence::truthy(&left) {
                    Ok(left)
                } else {
                    self.evaluate(rhs, input, env)
                };
            }
            _ => {}
        }

        let right = self.evaluate(rhs, input, env)?;
        let at = |err: Error| err.at(node.position).token(op.symbol());

        match op {
            BinaryOp::Add
            | BinaryOp::Subtract
            | BinaryOp::Multiply
            | BinaryOp::Divide
            | BinaryOp::Modulo => arithmetic(op, &left, &right).map_err(at),
            BinaryOp::Equal => Ok(JValue::Bool(!left.is_undefined() && !right.is_undefined() && left == right)),
            BinaryOp::NotEqual => Ok(JValue::Bool(!left.is_undefined() && !right.is_undefined() && left != right)),
            BinaryOp::LessThan
            | BinaryOp::LessThanOrEqual
            | BinaryOp::GreaterThan
            | BinaryOp::GreaterThanOrEqual => compare(op, &left, &right).map_err(at),
            BinaryOp::Concatenate => {
                let mut text = sequence::stringify(&left).map_err(at)?;
                text.push_str(&sequence::stringify(&right).map_err(at)?);
                Ok(JValue::from(text))
            }
            BinaryOp::Range => range(&left, &right).map_err(at),
            BinaryOp::In => {
                if left.is_undefined() || right.is_undefined() {
                    return Ok(JValue::Bool(false));
                }
                Ok(JValue::Bool(sequence::items(&right).iter().any(|v| *v == left)))
            }
            BinaryOp::And | BinaryOp::Or | BinaryOp::Coalesce | BinaryOp::Default => Ok(JValue::Undefined),
        }
    }
}

fn arithmetic(op: BinaryOp, left: &JValue, right: &JValue) -> Result<JValue> {
    if !left.is_undefined() && !sequence::is_numeric(left)? {
        return Err(Error::new("T2001").value(left));
    }
    if !right.is_undefined() && !sequence::is_numeric(right)? {
        return Err(Error::new("T2002").value(right));
    }
    let (l, r) = match (left.as_f64(), right.as_f64()) {
        (Some(l), Some(r)) => (l, r),
        _ => return Ok(JValue::Undefined),
    };
    let result = match op {
        BinaryOp::Add => l + r,
        BinaryOp::Subtract => l - r,
        BinaryOp::Multiply => l * r,
        BinaryOp::Divide => l / r,
        BinaryOp::Modulo => l % r,
        _ => return Ok(JValue::Undefined),
    };
    if !result.is_finite() {
        return Err(Error::new("D1001").value(format_number(result)));
    }
    Ok(JValue::Number(result))
}

fn comparable(value: &JValue) -> bool {
    matches!(value, JValue::Undefined | JValue::String(_) | JValue::Number(_))
}

fn compare(op: BinaryOp, left: &JValue, right: &JValue) -> Result<JValue> {
    if !comparable(left) {
        return Err(Error::new("T2010").value(left));
    }
    if !comparable(right) {
        return Err(Error::new("T2010").value(right));
    }
    let ordering = match (left, right) {
        (JValue::Undefined, _) | (_, JValue::Undefined) => return Ok(JValue::Undefined),
        (JValue::Number(a), JValue::Number(b)) => a.partial_cmp(b),
        (JValue::String(a), JValue::String(b)) => Some(a.cmp(b)),
        _ => return Err(Error::new("T2009").value(left).expected(right.to_string())),
    };
    let ordering = match ordering {
        Some(ordering) => ordering,
        None => return Ok(JValue::Bool(false)),
    };
    Ok(JValue::Bool(match op {
        BinaryOp::LessThan => ordering.is_lt(),
        BinaryOp::LessThanOrEqual => ordering.is_le(),
        BinaryOp::GreaterThan => ordering.is_gt(),
        _ => ordering.is_ge(),
    }))
}

fn range(left: &JValue, right: &JValue) -> Result<JValue> {
    if !left.is_undefined() && !left.is_integer() {
        return Err(Error::new("T2003").value(left));
    }
    if !right.is_undefined() && !right.is_integer() {
        return Err(Error::new("T2004").value(right));
    }
    let (start, end) = match (left.as_f64(), right.as_f64()) {
        (Some(l), Some(r)) => (l, r),
        _ => return Ok(JValue::Undefined),
    };
    if start > end {
        return Ok(JValue::Undefined);
    }
    let size = end - start + 1.0;
    if size > MAX_RANGE {
        return Err(Error::new("D2014").value(format_number(size)));
    }
    let start = start as i64;
    Ok(JValue::sequence((0..size as i64).map(|i| JValue::from(start + i)).collect()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jvalue;

    #[test]
    fn test_arithmetic_operations() {
        assert_eq!(
            arithmetic(BinaryOp::Add, &jvalue!(1i64), &jvalue!(2i64)).unwrap(),
            jvalue!(3i64)
        );
        assert_eq!(
            arithmetic(BinaryOp::Modulo, &jvalue!(-7i64), &jvalue!(3i64)).unwrap(),
            jvalue!(-1i64)
        );
        assert!(arithmetic(BinaryOp::Add, &JValue::Undefined, &jvalue!(2i64))
            .unwrap()
            .is_undefined());
    }

    #[test]
    fn test_arithmetic_type_errors() {
        let err = arithmetic(BinaryOp::Add, &jvalue!("a"), &jvalue!(1i64)).unwrap_err();
        assert_eq!(err.code(), "T2001");
        let err = arithmetic(BinaryOp::Add, &jvalue!(1i64), &JValue::Null).unwrap_err();
        assert_eq!(err.code(), "T2002");
        let err = arithmetic(BinaryOp::Divide, &jvalue!(1i64), &jvalue!(0i64)).unwrap_err();
        assert_eq!(err.code(), "D1001");
    }

    #[test]
    fn test_comparison_operations() {
        assert_eq!(
            compare(BinaryOp::LessThan, &jvalue!("a"), &jvalue!("b")).unwrap(),
            jvalue!(true)
        );
        assert!(compare(BinaryOp::LessThan, &JValue::Undefined, &jvalue!(1i64))
            .unwrap()
            .is_undefined());
        assert_eq!(
            compare(BinaryOp::LessThan, &jvalue!("a"), &jvalue!(1i64)).unwrap_err().code(),
            "T2009"
        );
        assert_eq!(
            compare(BinaryOp::GreaterThan, &jvalue!(true), &jvalue!(1i64)).unwrap_err().code(),
            "T2010"
        );
    }

    #[test]
    fn test_range_operator() {
        assert_eq!(range(&jvalue!(1i64), &jvalue!(3i64)).unwrap(), jvalue!([1i64, 2i64, 3i64]));
        assert!(range(&jvalue!(3i64), &jvalue!(1i64)).unwrap().is_undefined());
        assert_eq!(range(&jvalue!(1.5), &jvalue!(3i64)).unwrap_err().code(), "T2003");
        assert_eq!(range(&jvalue!(1i64), &jvalue!("x")).unwrap_err().code(), "T2004");
        assert_eq!(range(&jvalue!(0i64), &jvalue!(2000000i64)).unwrap_err().code(), "D2014");
    }
}

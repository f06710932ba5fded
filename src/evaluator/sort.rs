// Order-by steps

use std::cmp::Ordering;

use super::Interpreter;
use crate::ast::{Node, SortTerm};
use crate::environment::Environment;
use crate::error::{Error, Result};
use crate::sequence;
use crate::value::JValue;

impl Interpreter {
    /// Stable sort of `input` by `terms`, later terms breaking ties of
    /// earlier ones. Absent keys sort last.
    pub(super) fn evaluate_sort(
        &mut self,
        step: &Node,
        terms: &[SortTerm],
        input: &JValue,
        env: &Environment,
    ) -> Result<JValue> {
        let stream = input.is_tuple_stream();
        let items = sequence::items(input);
        if items.len() <= 1 {
            return Ok(input.clone());
        }

        let mut keyed = Vec::with_capacity(items.len());
        for item in items {
            let mut keys = Vec::with_capacity(terms.len());
            for term in terms {
                let key = match item {
                    JValue::Tuple(tuple) if stream => {
                        let frame = Interpreter::tuple_frame(env, tuple);
                        self.evaluate(&term.expression, &tuple.context, &frame)?
                    }
                    _ => self.evaluate(&term.expression, item, env)?,
                };
                keys.push(key);
            }
            keyed.push((keys, item.clone()));
        }

        let mut failure: Option<Error> = None;
        keyed.sort_by(|(a, _), (b, _)| {
            if failure.is_some() {
                return Ordering::Equal;
            }
            for (term, (a, b)) in terms.iter().zip(a.iter().zip(b.iter())) {
                // absent keys go last whatever the direction
                match (a, b) {
                    (JValue::Undefined, JValue::Undefined) => continue,
                    (JValue::Undefined, _) => return Ordering::Greater,
                    (_, JValue::Undefined) => return Ordering::Less,
                    _ => {}
                }
                match compare_keys(a, b) {
                    Ok(Ordering::Equal) => continue,
                    Ok(ordering) if term.descending => return ordering.reverse(),
                    Ok(ordering) => return ordering,
                    Err(err) => {
                        failure = Some(err);
                        return Ordering::Equal;
                    }
                }
            }
            Ordering::Equal
        });
        if let Some(err) = failure {
            return Err(err.at(step.position));
        }

        let sorted = keyed.into_iter().map(|(_, item)| item).collect();
        Ok(if stream {
            JValue::array_with(sorted, input.flags())
        } else {
            JValue::array(sorted)
        })
    }
}

/// Compare two present sort keys. Both must be numbers or both strings.
fn compare_keys(a: &JValue, b: &JValue) -> Result<Ordering> {
    for key in [a, b] {
        if !matches!(key, JValue::Number(_) | JValue::String(_)) {
            return Err(Error::new("T2008").value(key));
        }
    }
    match (a, b) {
        (JValue::Number(x), JValue::Number(y)) => Ok(x.partial_cmp(y).unwrap_or(Ordering::Equal)),
        (JValue::String(x), JValue::String(y)) => Ok(x.cmp(y)),
        _ => Err(Error::new("T2007").value(a).expected(b.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jvalue;

    #[test]
    fn test_compare_keys() {
        assert_eq!(compare_keys(&jvalue!(1i64), &jvalue!(2i64)).unwrap(), Ordering::Less);
        assert_eq!(compare_keys(&jvalue!("b"), &jvalue!("a")).unwrap(), Ordering::Greater);
    }

    #[test]
    fn test_compare_keys_errors() {
        assert_eq!(compare_keys(&jvalue!(1i64), &jvalue!("a")).unwrap_err().code(), "T2007");
        assert_eq!(compare_keys(&jvalue!(true), &jvalue!(1i64)).unwrap_err().code(), "T2008");
    }
}

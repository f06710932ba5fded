// Object constructors and group-by

use indexmap::IndexMap;

use super::path::into_tuples;
use super::Interpreter;
use crate::ast::GroupBy;
use crate::environment::Environment;
use crate::error::{Error, Result};
use crate::sequence;
use crate::value::{JValue, Tuple};

/// Members collected under one key, with the pair that produced the key.
struct Bucket {
    data: JValue,
    pair: usize,
}

impl Interpreter {
    /// Group `input` by each pair's key expression, then evaluate the pair's
    /// value expression once per key against everything collected under it.
    pub(super) fn evaluate_group(&mut self, group: &GroupBy, input: JValue, env: &Environment) -> Result<JValue> {
        let reduce = input.is_tuple_stream();
        let mut members = sequence::into_items(input);
        if members.is_empty() {
            members.push(JValue::Undefined);
        }

        let mut buckets: IndexMap<String, Bucket> = IndexMap::new();
        for item in &members {
            for (pair, (key_expr, _)) in group.pairs.iter().enumerate() {
                let key = match item {
                    JValue::Tuple(tuple) if reduce => {
                        let frame = Interpreter::tuple_frame(env, tuple);
                        self.evaluate(key_expr, &tuple.context, &frame)?
                    }
                    _ => self.evaluate(key_expr, item, env)?,
                };
                let key = match key {
                    JValue::String(s) => s.to_string(),
                    JValue::Undefined => continue,
                    other => return Err(Error::new("T1003").at(group.position).value(&other)),
                };
                match buckets.get_mut(&key) {
                    Some(bucket) if bucket.pair != pair => {
                        return Err(Error::new("D1009").at(group.position).value(&key));
                    }
                    Some(bucket) => {
                        let data = std::mem::take(&mut bucket.data);
                        bucket.data = sequence::append(data, item.clone());
                    }
                    None => {
                        buckets.insert(
                            key,
                            Bucket {
                                data: item.clone(),
                                pair,
                            },
                        );
                    }
                }
            }
        }

        let mut result = IndexMap::with_capacity(buckets.len());
        for (key, bucket) in buckets {
            let (_, value_expr) = &group.pairs[bucket.pair];
            let value = if reduce {
                let tuple = reduce_tuples(into_tuples(bucket.data));
                let frame = Interpreter::tuple_frame(env, &tuple);
                self.evaluate(value_expr, &tuple.context, &frame)?
            } else {
                self.evaluate(value_expr, &bucket.data, env)?
            };
            if !value.is_undefined() {
                result.insert(key, value);
            }
        }
        Ok(JValue::object(result))
    }
}

/// Merge the tuples collected under one key: each binding and the context
/// accumulate across members.
fn reduce_tuples(tuples: Vec<Tuple>) -> Tuple {
    let mut iter = tuples.into_iter();
    let mut merged = match iter.next() {
        Some(first) => first,
        None => return Tuple::new(JValue::Undefined),
    };
    for tuple in iter {
        for (name, value) in tuple.bindings {
            match merged.bindings.get_mut(&name) {
                Some(existing) => {
                    let previous = std::mem::take(existing);
                    *existing = sequence::append(previous, value);
                }
                None => {
                    merged.bindings.insert(name, value);
                }
            }
        }
        let context = std::mem::take(&mut merged.context);
        merged.context = sequence::append(context, tuple.context);
    }
    merged
}

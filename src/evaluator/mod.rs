// Expression evaluator
//
// Tree-walking interpreter over the normalized AST. Every node visit goes
// through `Interpreter::evaluate`, which runs the guard hooks, dispatches on
// the node kind, applies any predicate and group attached to the node, and
// finally collapses result sequences.

mod apply;
mod group;
mod operators;
mod path;
mod sort;
mod transform;

use std::rc::Rc;
use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use tracing::debug;

use crate::ast::{Node, NodeKind};
use crate::callable::{Callable, Closure, Transformer};
use crate::environment::Environment;
use crate::error::{Error, Result};
use crate::guard::{EvaluationConfig, EvaluationHooks, Guard};
use crate::sequence::{self, flatten_into};
use crate::value::{JValue, SeqFlags, Tuple};

/// Per-evaluation interpreter state: the guard hooks and the timestamp
/// captured when the evaluation started.
pub struct Interpreter {
    hooks: Box<dyn EvaluationHooks>,
    timestamp: DateTime<Utc>,
}

impl Interpreter {
    pub fn new(config: EvaluationConfig) -> Self {
        Self::with_hooks(Box::new(Guard::new(config)))
    }

    pub fn with_hooks(hooks: Box<dyn EvaluationHooks>) -> Self {
        Interpreter {
            hooks,
            timestamp: Utc::now(),
        }
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    /// Evaluate `node` against `input` in `env`.
    pub fn evaluate(&mut self, node: &Node, input: &JValue, env: &Environment) -> Result<JValue> {
        self.hooks.on_enter(node, input)?;

        let mut result = self.dispatch(node, input, env)?;

        for predicate in &node.predicate {
            result = self.evaluate_filter(predicate, result, env)?;
        }
        if !node.is_path() {
            if let Some(group) = &node.group {
                result = self.evaluate_group(group, result, env)?;
            }
        }

        self.hooks.on_exit(node, input, &result)?;
        Ok(collapse(result, node.keep_array))
    }

    fn dispatch(&mut self, node: &Node, input: &JValue, env: &Environment) -> Result<JValue> {
        match &node.kind {
            NodeKind::Path {
                steps,
                keep_singleton_array,
            } => self.evaluate_path(node, steps, *keep_singleton_array, input, env),
            NodeKind::Binary { op, lhs, rhs } => self.evaluate_binary(node, *op, lhs, rhs, input, env),
            NodeKind::Negate(operand) => {
                let value = self.evaluate(operand, input, env)?;
                match value {
                    JValue::Undefined => Ok(JValue::Undefined),
                    JValue::Number(n) if !n.is_nan() => Ok(JValue::Number(-n)),
                    other => Err(Error::new("D1002").at(node.position).token("-").value(&other)),
                }
            }
            NodeKind::Name(name) => Ok(lookup(input, name)),
            NodeKind::String(s) => Ok(JValue::string(s.as_str())),
            NodeKind::Number(n) => Ok(JValue::Number(*n)),
            NodeKind::Bool(b) => Ok(JValue::Bool(*b)),
            NodeKind::Null => Ok(JValue::Null),
            NodeKind::Regex(re) => Ok(JValue::Regex(re.clone())),
            NodeKind::Wildcard => Ok(wildcard(input)),
            NodeKind::Descendant => Ok(descendants(input)),
            NodeKind::Parent(slot) => Ok(env.lookup(&slot.label)),
            NodeKind::Variable(name) => Ok(if name.is_empty() {
                unwrap_outer(input)
            } else {
                env.lookup(name)
            }),
            NodeKind::Array(items) => self.evaluate_array(node, items, input, env),
            NodeKind::Object(group) => self.evaluate_group(group, input.clone(), env),
            NodeKind::Block(expressions) => {
                let frame = env.child();
                let mut result = JValue::Undefined;
                for expression in expressions {
                    result = self.evaluate(expression, input, &frame)?;
                }
                Ok(result)
            }
            NodeKind::Condition {
                condition,
                then,
                otherwise,
            } => {
                let test = self.evaluate(condition, input, env)?;
                if sequence::truthy(&test) {
                    self.evaluate(then, input, env)
                } else if let Some(otherwise) = otherwise {
                    self.evaluate(otherwise, input, env)
                } else {
                    Ok(JValue::Undefined)
                }
            }
            NodeKind::Bind { name, value } => {
                let value = self.evaluate(value, input, env)?;
                env.bind(name.as_str(), value.clone());
                Ok(value)
            }
            NodeKind::Function { procedure, args } => {
                self.evaluate_function(node, procedure, args, input, env, None)
            }
            NodeKind::Partial { procedure, args } => self.evaluate_partial(node, procedure, args, input, env),
            NodeKind::Lambda {
                params,
                signature,
                body,
                thunk,
            } => Ok(JValue::function(Callable::Lambda(Closure {
                params: params.clone(),
                body: Arc::clone(body),
                signature: signature.clone(),
                env: env.clone(),
                input: input.clone(),
                thunk: *thunk,
            }))),
            NodeKind::Apply { lhs, rhs } => self.evaluate_apply(node, lhs, rhs, input, env),
            NodeKind::Transform {
                pattern,
                update,
                delete,
            } => Ok(JValue::function(Callable::Transformer(Transformer {
                pattern: Arc::clone(pattern),
                update: Arc::clone(update),
                delete: delete.clone(),
                env: env.clone(),
            }))),
            // only reached when a sort step is evaluated outside a path
            NodeKind::Sort(terms) => self.evaluate_sort(node, terms, input, env),
            NodeKind::Placeholder | NodeKind::Error => Ok(JValue::Undefined),
        }
    }

    /// `[a, b, ...]`: nested constructors are kept as single members, every
    /// other item is appended (so sequences and ranges spread).
    fn evaluate_array(&mut self, node: &Node, items: &[Node], input: &JValue, env: &Environment) -> Result<JValue> {
        let mut result = Vec::new();
        for item in items {
            let value = self.evaluate(item, input, env)?;
            if value.is_undefined() {
                continue;
            }
            if item.is_array_constructor() {
                result.push(value);
            } else {
                match value {
                    JValue::Array(arr, _) => result.extend(arr.iter().cloned()),
                    other => result.push(other),
                }
            }
        }
        let flags = if node.cons_array {
            SeqFlags::CONS
        } else {
            SeqFlags::empty()
        };
        Ok(JValue::array_with(result, flags))
    }

    /// Child frame binding every variable a tuple carries.
    pub(crate) fn tuple_frame(env: &Environment, tuple: &Tuple) -> Environment {
        let frame = env.child();
        for (name, value) in &tuple.bindings {
            frame.bind(name.as_str(), value.clone());
        }
        frame
    }
}

/// Sequence collapse applied to every node result: an empty sequence is
/// absent and a singleton unwraps unless it was asked to stay an array.
fn collapse(result: JValue, keep_array: bool) -> JValue {
    match result {
        JValue::Array(items, flags)
            if flags.contains(SeqFlags::SEQUENCE) && !flags.contains(SeqFlags::TUPLE_STREAM) =>
        {
            let flags = if keep_array {
                flags | SeqFlags::KEEP_SINGLETON
            } else {
                flags
            };
            match items.len() {
                0 => JValue::Undefined,
                1 if !flags.contains(SeqFlags::KEEP_SINGLETON) => items[0].clone(),
                _ => JValue::Array(items, flags),
            }
        }
        other => other,
    }
}

/// `$` on an outer-wrapped array input is the array itself.
fn unwrap_outer(input: &JValue) -> JValue {
    match input {
        JValue::Array(items, flags) if flags.contains(SeqFlags::OUTER_WRAPPER) => {
            items.first().cloned().unwrap_or_default()
        }
        other => other.clone(),
    }
}

/// Field lookup, mapped over arrays. Array-valued fields of array members
/// are spread one level.
fn lookup(input: &JValue, key: &str) -> JValue {
    match input {
        JValue::Array(items, _) => {
            let mut result = Vec::new();
            for item in items.iter() {
                match lookup(item, key) {
                    JValue::Undefined => {}
                    JValue::Array(inner, _) => result.extend(inner.iter().cloned()),
                    other => result.push(other),
                }
            }
            JValue::sequence(result)
        }
        JValue::Object(map) => map.get(key).cloned().unwrap_or_default(),
        _ => JValue::Undefined,
    }
}

fn wildcard(input: &JValue) -> JValue {
    let input = match input {
        JValue::Array(items, flags) if flags.contains(SeqFlags::OUTER_WRAPPER) && !items.is_empty() => &items[0],
        other => other,
    };
    let mut results = Vec::new();
    match input {
        JValue::Object(map) => {
            for value in map.values() {
                match value {
                    JValue::Array(..) => flatten_into(value, &mut results),
                    JValue::Undefined => {}
                    other => results.push(other.clone()),
                }
            }
        }
        JValue::Array(items, _) => {
            for value in items.iter() {
                match value {
                    JValue::Array(..) => flatten_into(value, &mut results),
                    other => results.push(other.clone()),
                }
            }
        }
        _ => {}
    }
    JValue::sequence(results)
}

fn descendants(input: &JValue) -> JValue {
    if input.is_undefined() {
        return JValue::Undefined;
    }
    let mut results = Vec::new();
    collect_descendants(input, &mut results);
    if results.len() == 1 {
        results.swap_remove(0)
    } else {
        JValue::sequence(results)
    }
}

fn collect_descendants(input: &JValue, results: &mut Vec<JValue>) {
    match input {
        JValue::Array(items, _) => items.iter().for_each(|v| collect_descendants(v, results)),
        JValue::Object(map) => {
            results.push(input.clone());
            map.values().for_each(|v| collect_descendants(v, results));
        }
        other => results.push(other.clone()),
    }
}

/// A compiled expression's entry point for one thread.
///
/// Holds the shared tree, a frame layered over the thread's built-in
/// bindings, and the limits to evaluate under. Not `Send`: each thread asks
/// its `Expression` for its own instance.
pub struct Evaluator {
    ast: Arc<Node>,
    globals: Environment,
    config: EvaluationConfig,
}

impl Evaluator {
    pub(crate) fn new(ast: Arc<Node>, globals: Environment, config: EvaluationConfig) -> Self {
        Evaluator { ast, globals, config }
    }

    pub fn config(&self) -> &EvaluationConfig {
        &self.config
    }

    /// Evaluate against `input`.
    pub fn evaluate(&self, input: &JValue) -> Result<JValue> {
        self.evaluate_with_bindings(input, &IndexMap::new())
    }

    /// Evaluate with extra variables bound for this call only.
    pub fn evaluate_with_bindings(&self, input: &JValue, bindings: &IndexMap<String, JValue>) -> Result<JValue> {
        let started = Instant::now();
        let env = self.globals.child();
        for (name, value) in bindings {
            env.bind(name.as_str(), value.clone());
        }
        // `$$` is the input as given
        env.bind("$", input.clone());

        let input = match input {
            JValue::Array(items, flags) if !flags.contains(SeqFlags::SEQUENCE) => JValue::array_with(
                vec![JValue::Array(Rc::clone(items), *flags)],
                SeqFlags::SEQUENCE | SeqFlags::OUTER_WRAPPER,
            ),
            other => other.clone(),
        };

        let mut interpreter = Interpreter::new(self.config);
        let result = interpreter.evaluate(&self.ast, &input, &env)?;
        debug!(
            elapsed_us = started.elapsed().as_micros() as u64,
            result = result.type_name(),
            "Evaluated expression"
        );
        Ok(result.into_plain())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jvalue;
    use crate::parser::parse;

    fn eval(expr: &str, data: JValue) -> Result<JValue> {
        let ast = Arc::new(parse(expr)?);
        let globals = crate::functions::base_environment().child();
        Evaluator::new(ast, globals, EvaluationConfig::default()).evaluate(&data)
    }

    #[test]
    fn test_evaluate_literals() {
        assert_eq!(eval("42", JValue::Null).unwrap(), jvalue!(42i64));
        assert_eq!(eval("'hi'", JValue::Null).unwrap(), jvalue!("hi"));
        assert_eq!(eval("true", JValue::Null).unwrap(), jvalue!(true));
        assert_eq!(eval("null", JValue::Null).unwrap(), JValue::Null);
    }

    #[test]
    fn test_evaluate_path() {
        let data = jvalue!({"a": {"b": [{"c": 1i64}, {"c": 2i64}]}});
        assert_eq!(eval("a.b.c", data.clone()).unwrap(), jvalue!([1i64, 2i64]));
        assert_eq!(eval("a.b[0].c", data.clone()).unwrap(), jvalue!(1i64));
        assert!(eval("a.x", data).unwrap().is_undefined());
    }

    #[test]
    fn test_singleton_collapse() {
        let data = jvalue!({"a": [{"b": 1i64}]});
        assert_eq!(eval("a.b", data.clone()).unwrap(), jvalue!(1i64));
        assert_eq!(eval("a[].b", data.clone()).unwrap(), jvalue!([1i64]));
        assert_eq!(eval("a.b[]", data).unwrap(), jvalue!([1i64]));
    }

    #[test]
    fn test_array_input_indexing() {
        let data = jvalue!([1i64, 2i64, 3i64]);
        assert_eq!(eval("$[0]", data.clone()).unwrap(), jvalue!(1i64));
        assert_eq!(eval("$[-1]", data.clone()).unwrap(), jvalue!(3i64));
        assert_eq!(eval("$", data.clone()).unwrap(), data);
    }

    #[test]
    fn test_array_constructor_nesting() {
        assert_eq!(
            eval("[1, [2, 3], 4..5]", JValue::Null).unwrap(),
            jvalue!([1i64, [2i64, 3i64], 4i64, 5i64])
        );
        let data = jvalue!({"a": [{"b": 1i64, "c": 2i64}, {"b": 3i64, "c": 4i64}]});
        assert_eq!(
            eval("a.[b, c]", data).unwrap(),
            jvalue!([[1i64, 2i64], [3i64, 4i64]])
        );
    }

    #[test]
    fn test_wildcard_and_descendants() {
        let data = jvalue!({"a": 1i64, "b": [2i64, 3i64]});
        assert_eq!(eval("*", data.clone()).unwrap(), jvalue!([1i64, 2i64, 3i64]));
        let nested = jvalue!({"x": {"y": 5i64}});
        assert_eq!(eval("**.y", nested).unwrap(), jvalue!(5i64));
    }

    #[test]
    fn test_block_scopes_bindings() {
        assert_eq!(eval("($x := 2; $x * 3)", JValue::Null).unwrap(), jvalue!(6i64));
        assert!(eval("(($x := 2); $x)", JValue::Null).unwrap().is_undefined());
    }

    #[test]
    fn test_conditional() {
        assert_eq!(eval("1 > 0 ? 'yes' : 'no'", JValue::Null).unwrap(), jvalue!("yes"));
        assert!(eval("false ? 1", JValue::Null).unwrap().is_undefined());
    }

    #[test]
    fn test_negate() {
        let data = jvalue!({"n": 4i64, "s": "x"});
        assert_eq!(eval("-n", data.clone()).unwrap(), jvalue!(-4i64));
        assert_eq!(eval("-s", data).unwrap_err().code(), "D1002");
    }

    #[test]
    fn test_root_variable() {
        let data = jvalue!({"a": {"b": 1i64}, "c": 2i64});
        assert_eq!(eval("a.($$.c)", data).unwrap(), jvalue!(2i64));
    }

    #[test]
    fn test_depth_guard() {
        let ast = Arc::new(parse("($f := function($n){ $n = 0 ? 0 : 1 + $f($n - 1) }; $f(1000))").unwrap());
        let config = EvaluationConfig {
            timeout_ms: 0,
            max_depth: 50,
        };
        let globals = crate::functions::base_environment().child();
        let err = Evaluator::new(ast, globals, config).evaluate(&JValue::Null).unwrap_err();
        assert_eq!(err.code(), "U1001");
    }
}

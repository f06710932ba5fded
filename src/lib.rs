// jsonata-core - Query and transformation language for JSON-like documents
// Copyright (c) 2025 jsonata-core contributors
// Licensed under the MIT License

//! # jsonata-core
//!
//! Compile a JSONata expression once, then evaluate it against any number of
//! JSON documents, from any number of threads.
//!
//! ```
//! use jsonata_core::compile;
//! use serde_json::json;
//!
//! let expr = compile("orders[price > 100].product").unwrap();
//! let data = json!({"orders": [{"product": "A", "price": 150}, {"product": "B", "price": 50}]});
//! assert_eq!(expr.evaluate_json(&data).unwrap(), json!("A"));
//! ```
//!
//! ## Architecture
//!
//! - `lexer` - Tokenizer over code points
//! - `parser` - Pratt parser producing the raw tree, with an optional recovery mode
//! - `normalize` - Rewrites the raw tree into the evaluated AST (paths, stages, `%` resolution, tail calls)
//! - `evaluator` - Tree-walking interpreter with sequence semantics and a tail-call trampoline
//! - `environment` - Shared-parent variable frames
//! - `guard` - Depth and timeout limits
//! - `functions`, `datetime` - Built-in natives
//! - `signature` - Function signature validation
//! - `value` - `JValue`, the runtime value model

pub mod ast;
pub mod callable;
mod datetime;
pub mod environment;
pub mod error;
pub mod evaluator;
pub mod functions;
pub mod guard;
pub mod lexer;
pub mod normalize;
pub mod parser;
pub mod sequence;
pub mod signature;
pub mod value;

use std::sync::Arc;

use indexmap::IndexMap;
use tracing::debug;

pub use crate::callable::{Invocation, NativeFunction};
pub use crate::environment::Environment;
pub use crate::error::{Error, ErrorDetails, Result};
pub use crate::evaluator::Evaluator;
pub use crate::guard::EvaluationConfig;
pub use crate::signature::Signature;
pub use crate::value::JValue;

use crate::ast::{Node, NodeKind};

thread_local! {
    /// Built-in natives, created once per thread and shared by every
    /// evaluator on it.
    static BASE_ENV: Environment = functions::base_environment();
}

/// A compiled expression.
///
/// Compile once, then evaluate many times. An `Expression` can be shared
/// across threads (for example behind an `Arc`); each evaluation runs on a
/// per-thread `Evaluator`.
#[derive(Debug)]
pub struct Expression {
    ast: Arc<Node>,
    errors: Vec<Error>,
    config: EvaluationConfig,
    natives: Vec<Arc<NativeFunction>>,
}

/// Compile an expression, failing on the first syntax error.
pub fn compile(source: &str) -> Result<Expression> {
    let ast = parser::parse(source)?;
    Ok(Expression::from_ast(ast, Vec::new()))
}

impl Expression {
    fn from_ast(ast: Node, errors: Vec<Error>) -> Self {
        Expression {
            ast: Arc::new(ast),
            errors,
            config: EvaluationConfig::default(),
            natives: Vec::new(),
        }
    }

    /// Compile in recovery mode. Syntax errors are collected instead of
    /// returned; see [`Expression::errors`]. Evaluating an expression with
    /// errors fails with `S0500`.
    pub fn compile_with_recovery(source: &str) -> Self {
        match parser::parse_with_recovery(source) {
            Ok((ast, errors)) => Self::from_ast(ast, errors),
            Err(err) => {
                debug!(code = err.code(), "Unrecoverable syntax error");
                Self::from_ast(Node::new(NodeKind::Error, 0), vec![err])
            }
        }
    }

    pub fn errors(&self) -> &[Error] {
        &self.errors
    }

    pub fn ast(&self) -> &Node {
        &self.ast
    }

    pub fn config(&self) -> &EvaluationConfig {
        &self.config
    }

    pub fn with_config(mut self, config: EvaluationConfig) -> Self {
        self.config = config;
        self
    }

    pub fn set_config(&mut self, config: EvaluationConfig) {
        self.config = config;
    }

    /// Make a native callable from this expression as `$name`.
    ///
    /// `signature` uses the built-in notation, e.g. `"<n-n?:n>"`; without one
    /// the arguments are passed through unchecked.
    pub fn register_function(
        &mut self,
        name: &str,
        signature: Option<&str>,
        implementation: impl Fn(&[JValue], &mut Invocation<'_>) -> Result<JValue> + Send + Sync + 'static,
    ) -> Result<()> {
        let signature = signature.map(Signature::parse).transpose()?;
        let name = name.trim_start_matches('$');
        self.natives.retain(|native| native.name != name);
        self.natives.push(Arc::new(NativeFunction::new(name, signature, implementation)));
        Ok(())
    }

    /// An evaluator for the calling thread.
    pub fn evaluator(&self) -> Result<Evaluator> {
        if let Some(first) = self.errors.first() {
            let mut err = Error::new("S0500");
            if let Some(position) = first.position() {
                err = err.at(position);
            }
            return Err(err.token(first.code()));
        }
        let globals = BASE_ENV.with(Environment::child);
        for native in &self.natives {
            globals.bind(
                native.name.as_str(),
                JValue::function(callable::Callable::Native(Arc::clone(native))),
            );
        }
        Ok(Evaluator::new(Arc::clone(&self.ast), globals, self.config))
    }

    pub fn evaluate(&self, input: &JValue) -> Result<JValue> {
        self.evaluator()?.evaluate(input)
    }

    /// Evaluate with extra variables, named without the `$`.
    pub fn evaluate_with_bindings(&self, input: &JValue, bindings: &IndexMap<String, JValue>) -> Result<JValue> {
        self.evaluator()?.evaluate_with_bindings(input, bindings)
    }

    /// Evaluate against a `serde_json` document. An absent result is `null`.
    pub fn evaluate_json(&self, input: &serde_json::Value) -> Result<serde_json::Value> {
        let result = self.evaluate(&JValue::from(input.clone()))?;
        Ok(serde_json::Value::from(&result))
    }

    /// Evaluate against JSON text and return the result as JSON text.
    pub fn evaluate_str(&self, json: &str) -> Result<String> {
        let input = JValue::from_json_str(json).map_err(|e| Error::new("D3100").value(e))?;
        let result = self.evaluate(&input)?;
        result.to_json_string().map_err(|e| Error::new("D3100").value(e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn assert_send_sync<T: Send + Sync>() {}

    #[test]
    fn test_expression_is_send_sync() {
        assert_send_sync::<Expression>();
    }

    #[test]
    fn test_compile_and_evaluate() {
        let expr = compile("a + b").unwrap();
        assert_eq!(expr.evaluate_json(&json!({"a": 1, "b": 2})).unwrap(), json!(3));
    }

    #[test]
    fn test_compile_error() {
        let err = compile("a +").unwrap_err();
        assert!(err.is_syntax());
    }

    #[test]
    fn test_recovered_errors_block_evaluation() {
        let expr = Expression::compile_with_recovery("[1, 2");
        assert!(!expr.errors().is_empty());
        assert_eq!(expr.evaluate(&JValue::Null).unwrap_err().code(), "S0500");
    }

    #[test]
    fn test_register_function() {
        let mut expr = compile("$double(21)").unwrap();
        expr.register_function("double", Some("<n:n>"), |args, _| {
            Ok(JValue::from(args[0].as_f64().unwrap_or(0.0) * 2.0))
        })
        .unwrap();
        assert_eq!(expr.evaluate(&JValue::Null).unwrap(), JValue::from(42i64));
    }

    #[test]
    fn test_evaluate_str() {
        let expr = compile("$sum(values)").unwrap();
        assert_eq!(expr.evaluate_str(r#"{"values": [1, 2, 3.5]}"#).unwrap(), "6.5");
        assert_eq!(expr.evaluate_str("{").unwrap_err().code(), "D3100");
    }
}

// Function values
//
// Everything a JValue::Function can hold: user lambdas with their captured
// frame, natives, partial applications, `~>` compositions and the functions
// produced by transform expressions.

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::ast::Node;
use crate::environment::Environment;
use crate::error::Result;
use crate::evaluator::Interpreter;
use crate::signature::Signature;
use crate::value::JValue;

/// Native implementation: validated arguments plus a handle back into the
/// running evaluation.
pub type NativeImpl = dyn Fn(&[JValue], &mut Invocation<'_>) -> Result<JValue> + Send + Sync;

/// A function implemented in Rust.
pub struct NativeFunction {
    pub name: String,
    pub signature: Option<Signature>,
    pub implementation: Arc<NativeImpl>,
}

impl NativeFunction {
    pub fn new(
        name: impl Into<String>,
        signature: Option<Signature>,
        implementation: impl Fn(&[JValue], &mut Invocation<'_>) -> Result<JValue> + Send + Sync + 'static,
    ) -> Self {
        NativeFunction {
            name: name.into(),
            signature,
            implementation: Arc::new(implementation),
        }
    }

    /// Declared parameter count; natives without a signature take one argument.
    pub fn arity(&self) -> usize {
        self.signature.as_ref().map(Signature::arity).unwrap_or(1)
    }
}

impl fmt::Debug for NativeFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NativeFunction")
            .field("name", &self.name)
            .field("signature", &self.signature.as_ref().map(Signature::source))
            .finish()
    }
}

/// A lambda value: its definition plus the frame and input it was created in.
#[derive(Clone)]
pub struct Closure {
    pub params: Vec<String>,
    pub body: Arc<Node>,
    pub signature: Option<Arc<Signature>>,
    pub env: Environment,
    pub input: JValue,
    /// Deferred tail call; `body` is the call to perform.
    pub thunk: bool,
}

/// The function built by `|pattern|update[,delete]|`.
#[derive(Clone)]
pub struct Transformer {
    pub pattern: Arc<Node>,
    pub update: Arc<Node>,
    pub delete: Option<Arc<Node>>,
    pub env: Environment,
}

pub enum Callable {
    Lambda(Closure),
    Native(Arc<NativeFunction>),
    /// `target` applied to `args`, where `None` marks a `?` placeholder.
    Partial {
        target: JValue,
        args: Vec<Option<JValue>>,
    },
    /// `f ~> g` where both sides are functions: `g(f(x))`.
    Chain {
        first: JValue,
        then: JValue,
    },
    Transformer(Transformer),
}

impl Callable {
    /// Number of arguments the function declares. Higher-order natives use
    /// this to decide how many of (value, index, array) to pass.
    pub fn arity(&self) -> usize {
        match self {
            Callable::Lambda(closure) => closure.params.len(),
            Callable::Native(native) => native.arity(),
            Callable::Partial { args, .. } => args.iter().filter(|a| a.is_none()).count(),
            Callable::Chain { .. } | Callable::Transformer(_) => 1,
        }
    }

    pub fn signature(&self) -> Option<&Signature> {
        match self {
            Callable::Lambda(closure) => closure.signature.as_deref(),
            Callable::Native(native) => native.signature.as_ref(),
            _ => None,
        }
    }

    pub fn is_thunk(&self) -> bool {
        matches!(self, Callable::Lambda(Closure { thunk: true, .. }))
    }
}

impl fmt::Debug for Callable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Callable::Lambda(closure) => f
                .debug_struct("Lambda")
                .field("params", &closure.params)
                .field("thunk", &closure.thunk)
                .finish(),
            Callable::Native(native) => write!(f, "Native({})", native.name),
            Callable::Partial { args, .. } => f
                .debug_struct("Partial")
                .field("placeholders", &args.iter().filter(|a| a.is_none()).count())
                .finish(),
            Callable::Chain { .. } => f.write_str("Chain"),
            Callable::Transformer(_) => f.write_str("Transformer"),
        }
    }
}

/// Handle passed to natives: the focus input and frame of the call, and a
/// way to call back into the evaluator.
pub struct Invocation<'a> {
    pub(crate) interpreter: &'a mut Interpreter,
    pub(crate) input: &'a JValue,
    pub(crate) env: &'a Environment,
}

impl Invocation<'_> {
    /// The context value the function was called against.
    pub fn input(&self) -> &JValue {
        self.input
    }

    pub fn environment(&self) -> &Environment {
        self.env
    }

    /// Apply a function value, running any tail calls it returns to completion.
    pub fn apply(&mut self, function: &JValue, args: &[JValue]) -> Result<JValue> {
        self.interpreter.apply(function, args, self.input, self.env)
    }

    /// Timestamp captured when the current top-level evaluation started.
    pub fn now(&self) -> DateTime<Utc> {
        self.interpreter.timestamp()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::NodeKind;

    fn closure(params: &[&str]) -> Callable {
        Callable::Lambda(Closure {
            params: params.iter().map(|p| p.to_string()).collect(),
            body: Arc::new(Node::new(NodeKind::Null, 0)),
            signature: None,
            env: Environment::new(),
            input: JValue::Undefined,
            thunk: false,
        })
    }

    #[test]
    fn test_lambda_arity_from_params() {
        assert_eq!(closure(&["a", "b"]).arity(), 2);
    }

    #[test]
    fn test_lambda_signature_accessor() {
        let mut c = closure(&["a"]);
        if let Callable::Lambda(inner) = &mut c {
            inner.signature = Some(Arc::new(Signature::parse("<n:n>").unwrap()));
        }
        assert_eq!(c.signature().map(Signature::source), Some("<n:n>"));
        assert!(!c.is_thunk());
    }

    #[test]
    fn test_partial_arity_counts_placeholders() {
        let partial = Callable::Partial {
            target: JValue::Undefined,
            args: vec![None, Some(JValue::Null), None],
        };
        assert_eq!(partial.arity(), 2);
    }

    #[test]
    fn test_native_arity() {
        let native = NativeFunction::new("f", Some(Signature::parse("<sn?:s>").unwrap()), |_, _| {
            Ok(JValue::Null)
        });
        assert_eq!(native.arity(), 2);
        assert_eq!(format!("{:?}", Callable::Native(Arc::new(native))), "Native(f)");
    }
}

// Function calls, partial application, `~>` and the tail-call trampoline

use tracing::trace;

use super::Interpreter;
use crate::ast::{Node, NodeKind};
use crate::callable::{Callable, Closure, Invocation};
use crate::environment::Environment;
use crate::error::{Error, Result};
use crate::value::JValue;

impl Interpreter {
    /// `procedure(args)`. With `applyto`, the left side of a `~>` is passed
    /// as the first argument.
    pub(super) fn evaluate_function(
        &mut self,
        node: &Node,
        procedure: &Node,
        args: &[Node],
        input: &JValue,
        env: &Environment,
        applyto: Option<JValue>,
    ) -> Result<JValue> {
        let function = self.evaluate(procedure, input, env)?;
        let name = procedure.procedure_name().unwrap_or_default();
        if function.is_undefined() && procedure.is_path() && env.is_bound(name) {
            // `sum(x)` where `$sum(x)` was meant
            return Err(Error::new("T1005").at(node.position).token(name));
        }

        let mut values = Vec::with_capacity(args.len() + 1);
        values.extend(applyto);
        for arg in args {
            values.push(self.evaluate(arg, input, env)?);
        }

        self.apply(&function, &values, input, env)
            .map_err(|err| err.or_at(node.position).or_token(name))
    }

    /// `procedure(a, ?, c)`: a function of the placeholder arguments.
    pub(super) fn evaluate_partial(
        &mut self,
        node: &Node,
        procedure: &Node,
        args: &[Node],
        input: &JValue,
        env: &Environment,
    ) -> Result<JValue> {
        let function = self.evaluate(procedure, input, env)?;
        let name = procedure.procedure_name().unwrap_or_default();
        if function.is_undefined() && procedure.is_path() && env.is_bound(name) {
            return Err(Error::new("T1007").at(node.position).token(name));
        }
        if !function.is_function() {
            return Err(Error::new("T1008").at(node.position).token(name));
        }

        let mut bound = Vec::with_capacity(args.len());
        for arg in args {
            bound.push(match arg.kind {
                NodeKind::Placeholder => None,
                _ => Some(self.evaluate(arg, input, env)?),
            });
        }
        Ok(JValue::function(Callable::Partial {
            target: function,
            args: bound,
        }))
    }

    /// `lhs ~> rhs`
    pub(super) fn evaluate_apply(
        &mut self,
        node: &Node,
        lhs: &Node,
        rhs: &Node,
        input: &JValue,
        env: &Environment,
    ) -> Result<JValue> {
        let left = self.evaluate(lhs, input, env)?;

        if let NodeKind::Function { procedure, args } = &rhs.kind {
            return self.evaluate_function(rhs, procedure, args, input, env, Some(left));
        }

        let right = self.evaluate(rhs, input, env)?;
        if !right.is_function() {
            return Err(Error::new("T2006").at(node.position).value(&right));
        }
        if left.is_function() {
            return Ok(JValue::function(Callable::Chain {
                first: left,
                then: right,
            }));
        }
        self.apply(&right, &[left], input, env)
    }

    /// Call `function` and keep running the tail calls it hands back until a
    /// real value comes out.
    pub(crate) fn apply(
        &mut self,
        function: &JValue,
        args: &[JValue],
        input: &JValue,
        env: &Environment,
    ) -> Result<JValue> {
        let mut result = self.apply_inner(function, args, input, env)?;
        let mut bounces = 0usize;
        while let Some(thunk) = as_thunk(&result).cloned() {
            let (procedure, call_args) = match &thunk.body.kind {
                NodeKind::Function { procedure, args } => (procedure, args),
                _ => break,
            };
            bounces += 1;
            trace!(bounces, position = thunk.body.position, "Tail call");

            let next = self.evaluate(procedure, &thunk.input, &thunk.env)?;
            let mut values = Vec::with_capacity(call_args.len());
            for arg in call_args {
                values.push(self.evaluate(arg, &thunk.input, &thunk.env)?);
            }
            let name = procedure.procedure_name().unwrap_or_default();
            let position = thunk.body.position;
            result = self
                .apply_inner(&next, &values, input, env)
                .map_err(|err| err.or_at(position).or_token(name))?;
        }
        Ok(result)
    }

    fn apply_inner(&mut self, function: &JValue, args: &[JValue], input: &JValue, env: &Environment) -> Result<JValue> {
        let callable = match function {
            JValue::Function(callable) => callable.clone(),
            _ => return Err(Error::new("T1006")),
        };

        let validated;
        let args = match callable.signature() {
            Some(signature) => {
                let name = match &*callable {
                    Callable::Native(native) => native.name.as_str(),
                    _ => "",
                };
                validated = signature.validate(args, input, name)?;
                validated.as_slice()
            }
            None => args,
        };

        match &*callable {
            Callable::Lambda(closure) => {
                let frame = closure.env.child();
                for (index, param) in closure.params.iter().enumerate() {
                    frame.bind(param.as_str(), args.get(index).cloned().unwrap_or_default());
                }
                self.evaluate(&closure.body, &closure.input, &frame)
            }
            Callable::Native(native) => {
                let mut invocation = Invocation {
                    interpreter: self,
                    input,
                    env,
                };
                (native.implementation)(args, &mut invocation).map_err(|err| err.or_token(&native.name))
            }
            Callable::Partial { target, args: bound } => {
                let mut supplied = args.iter();
                let full: Vec<JValue> = bound
                    .iter()
                    .map(|arg| match arg {
                        Some(value) => value.clone(),
                        None => supplied.next().cloned().unwrap_or_default(),
                    })
                    .collect();
                self.apply_inner(target, &full, input, env)
            }
            Callable::Chain { first, then } => {
                let intermediate = self.apply(first, args, input, env)?;
                self.apply(then, &[intermediate], input, env)
            }
            Callable::Transformer(transformer) => {
                let target = args.first().cloned().unwrap_or_default();
                self.apply_transformer(transformer, &target)
            }
        }
    }
}

fn as_thunk(value: &JValue) -> Option<&Closure> {
    match value {
        JValue::Function(callable) => match &**callable {
            Callable::Lambda(closure) if closure.thunk => Some(closure),
            _ => None,
        },
        _ => None,
    }
}

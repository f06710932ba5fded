// Path stepping, tuple streams and filters

use std::rc::Rc;

use super::Interpreter;
use crate::ast::{Node, NodeKind, Stage};
use crate::environment::Environment;
use crate::error::Result;
use crate::sequence;
use crate::value::{JValue, SeqFlags, Tuple};

/// Unwrap the members of a tuple stream.
pub(super) fn into_tuples(value: JValue) -> Vec<Tuple> {
    sequence::into_items(value)
        .into_iter()
        .map(|item| match item {
            JValue::Tuple(t) => Rc::try_unwrap(t).unwrap_or_else(|shared| (*shared).clone()),
            other => Tuple::new(other),
        })
        .collect()
}

impl Interpreter {
    pub(super) fn evaluate_path(
        &mut self,
        node: &Node,
        steps: &[Node],
        keep_singleton_array: bool,
        input: &JValue,
        env: &Environment,
    ) -> Result<JValue> {
        let first_is_variable = matches!(steps.first().map(|s| &s.kind), Some(NodeKind::Variable(_)));
        let mut input_sequence = if input.is_array() && !first_is_variable {
            input.clone()
        } else {
            JValue::sequence(vec![input.clone()])
        };

        let mut result_sequence = JValue::Undefined;
        let mut tuples: Option<Vec<Tuple>> = None;
        let mut tuple_mode = false;

        for (index, step) in steps.iter().enumerate() {
            if step.tuple {
                tuple_mode = true;
            }

            if index == 0 && step.cons_array {
                result_sequence = self.evaluate(step, &input_sequence, env)?;
            } else if tuple_mode {
                tuples = Some(self.evaluate_tuple_step(step, &input_sequence, tuples.take(), env)?);
            } else {
                result_sequence = self.evaluate_step(step, &input_sequence, env, index == steps.len() - 1)?;
            }

            if !tuple_mode && sequence::items(&result_sequence).is_empty() {
                break;
            }

            if step.focus.is_none() {
                input_sequence = result_sequence.clone();
            }
        }

        let tuples = tuples.unwrap_or_default();
        if tuple_mode {
            result_sequence = if node.tuple {
                JValue::tuple_stream(tuples.clone())
            } else {
                JValue::sequence(tuples.iter().map(|t| t.context.clone()).collect())
            };
        }

        let result = keep_singleton(result_sequence, keep_singleton_array);
        match &node.group {
            Some(group) if tuple_mode => self.evaluate_group(group, JValue::tuple_stream(tuples), env),
            Some(group) => self.evaluate_group(group, result, env),
            None => Ok(result),
        }
    }

    /// One step over every member of `input`, flattening one level except for
    /// explicitly constructed arrays.
    fn evaluate_step(&mut self, step: &Node, input: &JValue, env: &Environment, last: bool) -> Result<JValue> {
        if let NodeKind::Sort(terms) = &step.kind {
            let sorted = self.evaluate_sort(step, terms, input, env)?;
            return self.apply_filter_stages(&step.stages, sorted, env);
        }

        let mut results = Vec::new();
        for item in sequence::items(input) {
            let mut result = self.evaluate(step, item, env)?;
            for stage in &step.stages {
                if let Stage::Filter(predicate) = stage {
                    result = self.evaluate_filter(predicate, result, env)?;
                }
            }
            if !result.is_undefined() {
                results.push(result);
            }
        }

        if last && results.len() == 1 && results[0].is_array() && !results[0].is_sequence() {
            return Ok(results.swap_remove(0));
        }

        let mut flattened = Vec::with_capacity(results.len());
        for result in results {
            match result {
                JValue::Array(items, flags) if !flags.contains(SeqFlags::CONS) => {
                    flattened.extend(items.iter().cloned());
                }
                other => flattened.push(other),
            }
        }
        Ok(JValue::sequence(flattened))
    }

    /// One step in tuple-stream mode: each tuple is evaluated in a frame
    /// holding its bindings and every result becomes a new tuple.
    fn evaluate_tuple_step(
        &mut self,
        step: &Node,
        input: &JValue,
        tuples: Option<Vec<Tuple>>,
        env: &Environment,
    ) -> Result<Vec<Tuple>> {
        if let NodeKind::Sort(terms) = &step.kind {
            let sorted = match tuples {
                Some(tuples) => {
                    let sorted = self.evaluate_sort(step, terms, &JValue::tuple_stream(tuples), env)?;
                    into_tuples(sorted)
                }
                None => {
                    let sorted = self.evaluate_sort(step, terms, input, env)?;
                    sequence::into_items(sorted)
                        .into_iter()
                        .enumerate()
                        .map(|(position, item)| {
                            let mut tuple = Tuple::new(item);
                            if let Some(index) = &step.index {
                                tuple.bindings.insert(index.clone(), JValue::from(position));
                            }
                            tuple
                        })
                        .collect()
                }
            };
            return self.apply_tuple_stages(&step.stages, sorted, env);
        }

        let tuples = match tuples {
            Some(tuples) => tuples,
            None => sequence::items(input).iter().cloned().map(Tuple::new).collect(),
        };

        let mut results = Vec::new();
        for tuple in &tuples {
            let frame = Interpreter::tuple_frame(env, tuple);
            let result = self.evaluate(step, &tuple.context, &frame)?;
            if result.is_undefined() {
                continue;
            }
            let is_stream = result.is_tuple_stream();
            for (position, item) in sequence::items(&result).iter().enumerate() {
                let mut next = tuple.clone();
                if is_stream {
                    if let JValue::Tuple(inner) = item {
                        next.context = inner.context.clone();
                        for (name, value) in &inner.bindings {
                            next.bindings.insert(name.clone(), value.clone());
                        }
                    }
                } else {
                    match &step.focus {
                        Some(focus) => {
                            next.bindings.insert(focus.clone(), item.clone());
                        }
                        None => next.context = item.clone(),
                    }
                    if let Some(index) = &step.index {
                        next.bindings.insert(index.clone(), JValue::from(position));
                    }
                    if let Some(ancestor) = &step.ancestor {
                        next.bindings.insert(ancestor.label.clone(), tuple.context.clone());
                    }
                }
                results.push(next);
            }
        }

        self.apply_tuple_stages(&step.stages, results, env)
    }

    fn apply_filter_stages(&mut self, stages: &[Stage], mut value: JValue, env: &Environment) -> Result<JValue> {
        for stage in stages {
            if let Stage::Filter(predicate) = stage {
                value = self.evaluate_filter(predicate, value, env)?;
            }
        }
        Ok(value)
    }

    fn apply_tuple_stages(&mut self, stages: &[Stage], mut tuples: Vec<Tuple>, env: &Environment) -> Result<Vec<Tuple>> {
        for stage in stages {
            match stage {
                Stage::Filter(predicate) => {
                    let filtered = self.evaluate_filter(predicate, JValue::tuple_stream(tuples), env)?;
                    tuples = into_tuples(filtered);
                }
                Stage::Index(name) => {
                    for (position, tuple) in tuples.iter_mut().enumerate() {
                        tuple.bindings.insert(name.clone(), JValue::from(position));
                    }
                }
            }
        }
        Ok(tuples)
    }

    /// Apply one predicate to `input`.
    ///
    /// A literal number selects by position (negative counts from the end).
    /// Otherwise the predicate runs against each member: numeric results
    /// select by position, anything else by truthiness.
    pub(super) fn evaluate_filter(&mut self, predicate: &Node, input: JValue, env: &Environment) -> Result<JValue> {
        let stream = input.is_tuple_stream();
        let flags = if stream {
            SeqFlags::SEQUENCE | SeqFlags::TUPLE_STREAM
        } else {
            SeqFlags::SEQUENCE
        };
        let members = sequence::items(&input);
        let len = members.len() as i64;

        if let NodeKind::Number(n) = predicate.kind {
            let mut index = n.floor() as i64;
            if index < 0 {
                index += len;
            }
            let item = usize::try_from(index).ok().and_then(|i| members.get(i));
            return Ok(match item {
                Some(JValue::Array(arr, item_flags)) => JValue::Array(Rc::clone(arr), *item_flags),
                Some(item) => JValue::array_with(vec![item.clone()], flags),
                None => JValue::array_with(Vec::new(), flags),
            });
        }

        let mut results = Vec::new();
        for (position, item) in members.iter().enumerate() {
            let result = match (stream, item) {
                (true, JValue::Tuple(tuple)) => {
                    let frame = Interpreter::tuple_frame(env, tuple);
                    self.evaluate(predicate, &tuple.context, &frame)?
                }
                _ => self.evaluate(predicate, item, env)?,
            };
            let result = if sequence::is_numeric(&result)? {
                JValue::array(vec![result])
            } else {
                result
            };
            if sequence::is_array_of_numbers(&result) {
                // one copy per matching index, so `[0, 0]` selects twice
                for v in sequence::items(&result) {
                    let mut index = v.as_f64().unwrap_or(f64::NAN).floor() as i64;
                    if index < 0 {
                        index += len;
                    }
                    if index == position as i64 {
                        results.push(item.clone());
                    }
                }
            } else if sequence::truthy(&result) {
                results.push(item.clone());
            }
        }
        Ok(JValue::array_with(results, flags))
    }
}

/// Mark a path result so a single match stays an array.
fn keep_singleton(result: JValue, keep: bool) -> JValue {
    if !keep {
        return result;
    }
    match result {
        JValue::Array(items, flags) if flags.contains(SeqFlags::CONS) && !flags.contains(SeqFlags::SEQUENCE) => {
            JValue::array_with(vec![JValue::Array(items, flags)], SeqFlags::SEQUENCE | SeqFlags::KEEP_SINGLETON)
        }
        other => other.with_flags(SeqFlags::KEEP_SINGLETON),
    }
}

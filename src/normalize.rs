// Tree normalization
//
// Rewrites the parser's raw tree into the evaluator's node tree:
// - nested `.` binaries become flat paths, string steps become names
// - predicates attach to the node, or to the last step of a path as stages
// - `@`, `#`, `{}` and `^()` annotate steps
// - `%` references are resolved to the step whose input they read
// - calls in tail position of a lambda body are wrapped as thunks
//
// Ancestor slots live in an arena owned by the normalizer. Unresolved slot
// ids travel upward as return values; a slot's label is final once it has
// been resolved, and labels are written into the tree in a last pass.

use std::sync::Arc;

use crate::ast::{AncestorSlot, BinaryOp, GroupBy, Node, NodeKind, SortTerm, Stage};
use crate::error::{Error, Result};
use crate::parser::{RawKind, RawNode};
use crate::value::format_number;

struct Slot {
    label: String,
    /// Steps still to climb before reaching the target.
    level: usize,
}

/// A normalized node plus the ancestor slots it still has to hand upward.
struct Processed {
    node: Node,
    /// Slots carried by the node itself (for a path, by the path as a whole).
    seeking: Vec<usize>,
    /// For a path: slots carried by its last step.
    last_step: Vec<usize>,
}

impl Processed {
    fn new(node: Node) -> Self {
        Processed {
            node,
            seeking: Vec::new(),
            last_step: Vec::new(),
        }
    }

    fn with_seeking(node: Node, seeking: Vec<usize>) -> Self {
        Processed {
            node,
            seeking,
            last_step: Vec::new(),
        }
    }
}

#[derive(Default)]
struct Normalizer {
    slots: Vec<Slot>,
}

/// Normalize a raw tree.
///
/// Fails with `S0217` when a `%` cannot be tied to an enclosing step and with
/// `S0207` when the expression ended where an operand was expected.
pub fn normalize(raw: RawNode) -> Result<Node> {
    let mut normalizer = Normalizer::default();
    let out = normalizer.process(raw)?;
    if matches!(out.node.kind, NodeKind::Parent(_)) || !out.seeking.is_empty() {
        return Err(Error::new("S0217")
            .at(out.node.position)
            .token(out.node.type_name()));
    }
    let mut node = out.node;
    normalizer.assign_labels(&mut node);
    Ok(node)
}

fn variable_name(raw: &RawNode, token: &'static str) -> Result<String> {
    match &raw.kind {
        RawKind::Variable(name) => Ok(name.clone()),
        _ => Err(Error::new("S0214").at(raw.position).token(token)),
    }
}

/// Split a node into the parts of a path: the path node itself, its steps,
/// the path-level slots and the last step's slots. A non-path becomes the
/// single step of a new path.
fn into_path_parts(p: Processed, parent_seeks: bool) -> (Node, Vec<Node>, Vec<usize>, Vec<usize>) {
    let Processed {
        mut node,
        seeking,
        last_step,
    } = p;
    let taken = match &mut node.kind {
        NodeKind::Path { steps, .. } => Some(std::mem::take(steps)),
        _ => None,
    };
    if let Some(steps) = taken {
        return (node, steps, seeking, last_step);
    }
    let path_seeking = if parent_seeks && matches!(node.kind, NodeKind::Parent(_)) {
        seeking.clone()
    } else {
        Vec::new()
    };
    let shell = Node::new(
        NodeKind::Path {
            steps: Vec::new(),
            keep_singleton_array: false,
        },
        node.position,
    );
    (shell, vec![node], path_seeking, seeking)
}

fn predicates_to_stages(node: &mut Node) {
    if node.predicate.is_empty() {
        return;
    }
    let mut stages: Vec<Stage> = std::mem::take(&mut node.predicate)
        .into_iter()
        .map(Stage::Filter)
        .collect();
    stages.append(&mut node.stages);
    node.stages = stages;
}

/// Wrap calls in tail position so the trampoline can run them without
/// growing the native stack.
fn tail_call_optimize(mut node: Node) -> Node {
    match &mut node.kind {
        NodeKind::Function { .. } if node.predicate.is_empty() => {
            let position = node.position;
            Node::new(
                NodeKind::Lambda {
                    params: Vec::new(),
                    signature: None,
                    body: Arc::new(node),
                    thunk: true,
                },
                position,
            )
        }
        NodeKind::Condition {
            then, otherwise, ..
        } => {
            let t = std::mem::replace(then.as_mut(), Node::new(NodeKind::Null, 0));
            **then = tail_call_optimize(t);
            if let Some(e) = otherwise {
                let o = std::mem::replace(e.as_mut(), Node::new(NodeKind::Null, 0));
                **e = tail_call_optimize(o);
            }
            node
        }
        NodeKind::Block(expressions) => {
            if let Some(last) = expressions.pop() {
                expressions.push(tail_call_optimize(last));
            }
            node
        }
        _ => node,
    }
}

/// Direct children that live in this tree (lambda bodies and transform
/// clauses are shared and labelled when they are built).
fn children_mut(node: &mut Node) -> Vec<&mut Node> {
    let Node {
        kind,
        predicate,
        stages,
        group,
        ..
    } = node;
    let mut out: Vec<&mut Node> = predicate.iter_mut().collect();
    for stage in stages.iter_mut() {
        if let Stage::Filter(n) = stage {
            out.push(n);
        }
    }
    if let Some(group) = group {
        for (k, v) in group.pairs.iter_mut() {
            out.push(k);
            out.push(v);
        }
    }
    match kind {
        NodeKind::Path { steps, .. } => out.extend(steps.iter_mut()),
        NodeKind::Binary { lhs, rhs, .. } | NodeKind::Apply { lhs, rhs } => {
            out.push(lhs);
            out.push(rhs);
        }
        NodeKind::Negate(e) => out.push(e),
        NodeKind::Bind { value, .. } => out.push(value),
        NodeKind::Array(items) | NodeKind::Block(items) => out.extend(items.iter_mut()),
        NodeKind::Object(group) => {
            for (k, v) in group.pairs.iter_mut() {
                out.push(k);
                out.push(v);
            }
        }
        NodeKind::Condition {
            condition,
            then,
            otherwise,
        } => {
            out.push(condition);
            out.push(then);
            if let Some(e) = otherwise {
                out.push(e);
            }
        }
        NodeKind::Function { procedure, args } | NodeKind::Partial { procedure, args } => {
            out.push(procedure);
            out.extend(args.iter_mut());
        }
        NodeKind::Sort(terms) => out.extend(terms.iter_mut().map(|t| &mut t.expression)),
        _ => {}
    }
    out
}

impl Normalizer {
    fn new_slot(&mut self) -> usize {
        let id = self.slots.len();
        self.slots.push(Slot {
            label: format!("!{}", id),
            level: 1,
        });
        id
    }

    fn assign_labels(&self, node: &mut Node) {
        if let Some(slot) = &mut node.ancestor {
            slot.label = self.slots[slot.id].label.clone();
        }
        if let NodeKind::Parent(slot) = &mut node.kind {
            slot.label = self.slots[slot.id].label.clone();
        }
        for child in children_mut(node) {
            self.assign_labels(child);
        }
    }

    /// Climb one step towards the target of `slot`, starting at `node`.
    fn seek_parent(&mut self, node: &mut Node, slot: usize) -> Result<()> {
        match &mut node.kind {
            NodeKind::Name(_) | NodeKind::Wildcard => {
                let level = self.slots[slot].level.saturating_sub(1);
                self.slots[slot].level = level;
                if level == 0 {
                    if let Some(existing) = &node.ancestor {
                        // a step records its input under one label
                        let label = self.slots[existing.id].label.clone();
                        self.slots[slot].label = label;
                    }
                    node.ancestor = Some(AncestorSlot {
                        id: slot,
                        label: String::new(),
                    });
                    node.tuple = true;
                }
            }
            NodeKind::Parent(_) => {
                self.slots[slot].level += 1;
            }
            NodeKind::Block(expressions) => {
                if let Some(last) = expressions.last_mut() {
                    self.seek_parent(last, slot)?;
                    node.tuple = true;
                }
            }
            NodeKind::Path { steps, .. } => {
                let mut index = steps.len();
                while index > 0 {
                    index -= 1;
                    self.seek_parent(&mut steps[index], slot)?;
                    if self.slots[slot].level == 0 {
                        break;
                    }
                }
                node.tuple = true;
            }
            _ => {
                return Err(Error::new("S0217")
                    .at(node.position)
                    .token(node.type_name()))
            }
        }
        Ok(())
    }

    /// Resolve the last step's slots against the steps before it. Slots that
    /// climb past the first step become path-level slots.
    fn resolve_ancestry(
        &mut self,
        steps: &mut [Node],
        last_step: &[usize],
        path_seeking: &mut Vec<usize>,
    ) -> Result<()> {
        let last = match steps.len().checked_sub(1) {
            Some(last) => last,
            None => return Ok(()),
        };
        for &slot in last_step {
            let mut index = last;
            while self.slots[slot].level > 0 {
                if index == 0 {
                    path_seeking.push(slot);
                    break;
                }
                index -= 1;
                let mut target = index;
                // contiguous focus-binding steps count as one
                while index > 0 && steps[target].focus.is_some() && steps[index - 1].focus.is_some() {
                    index -= 1;
                    target = index;
                }
                self.seek_parent(&mut steps[target], slot)?;
            }
        }
        Ok(())
    }

    fn process(&mut self, raw: RawNode) -> Result<Processed> {
        let keep_array = raw.keep_array;
        let position = raw.position;
        let mut out = match raw.kind {
            RawKind::Binary { op, lhs, rhs } => self.binary(op, *lhs, *rhs, position, keep_array)?,
            RawKind::Name(name) => {
                let mut step = Node::new(NodeKind::Name(name), position);
                step.keep_array = keep_array;
                Processed::new(Node::new(
                    NodeKind::Path {
                        steps: vec![step],
                        keep_singleton_array: keep_array,
                    },
                    position,
                ))
            }
            RawKind::Variable(name) => Processed::new(Node::new(NodeKind::Variable(name), position)),
            RawKind::String(s) => Processed::new(Node::new(NodeKind::String(s), position)),
            RawKind::Number(n) => Processed::new(Node::new(NodeKind::Number(n), position)),
            RawKind::Bool(b) => Processed::new(Node::new(NodeKind::Bool(b), position)),
            RawKind::Null => Processed::new(Node::new(NodeKind::Null, position)),
            RawKind::Regex(re) => Processed::new(Node::new(NodeKind::Regex(re), position)),
            RawKind::Wildcard => Processed::new(Node::new(NodeKind::Wildcard, position)),
            RawKind::Descendant => Processed::new(Node::new(NodeKind::Descendant, position)),
            RawKind::Parent => {
                let id = self.new_slot();
                let slot = AncestorSlot {
                    id,
                    label: String::new(),
                };
                Processed::with_seeking(Node::new(NodeKind::Parent(slot), position), vec![id])
            }
            RawKind::Negate(operand) => {
                let inner = self.process(*operand)?;
                match inner.node.kind {
                    NodeKind::Number(n) => {
                        let mut node = inner.node;
                        node.kind = NodeKind::Number(-n);
                        Processed::new(node)
                    }
                    _ => Processed::with_seeking(
                        Node::new(NodeKind::Negate(Box::new(inner.node)), position),
                        inner.seeking,
                    ),
                }
            }
            RawKind::Array(items) => {
                let mut seeking = Vec::new();
                let mut nodes = Vec::with_capacity(items.len());
                for item in items {
                    let p = self.process(item)?;
                    seeking.extend(p.seeking);
                    nodes.push(p.node);
                }
                Processed::with_seeking(Node::new(NodeKind::Array(nodes), position), seeking)
            }
            RawKind::Object(pairs) => {
                let mut seeking = Vec::new();
                let mut nodes = Vec::with_capacity(pairs.len());
                for (k, v) in pairs {
                    let key = self.process(k)?;
                    seeking.extend(key.seeking);
                    let value = self.process(v)?;
                    seeking.extend(value.seeking);
                    nodes.push((key.node, value.node));
                }
                let group = GroupBy {
                    pairs: nodes,
                    position,
                };
                Processed::with_seeking(Node::new(NodeKind::Object(group), position), seeking)
            }
            RawKind::Group { lhs, pairs } => self.group(*lhs, pairs, position)?,
            RawKind::Sort { lhs, terms } => self.sort(*lhs, terms, position)?,
            RawKind::Block(expressions) => {
                let mut seeking = Vec::new();
                let mut nodes = Vec::with_capacity(expressions.len());
                let mut cons_array = false;
                for e in expressions {
                    let p = self.process(e)?;
                    seeking.extend(p.seeking);
                    let first_cons = match &p.node.kind {
                        NodeKind::Path { steps, .. } => steps.first().is_some_and(|s| s.cons_array),
                        _ => false,
                    };
                    cons_array |= p.node.cons_array || first_cons;
                    nodes.push(p.node);
                }
                let mut node = Node::new(NodeKind::Block(nodes), position);
                node.cons_array = cons_array;
                Processed::with_seeking(node, seeking)
            }
            RawKind::Condition {
                condition,
                then,
                otherwise,
            } => {
                let condition = self.process(*condition)?;
                let then = self.process(*then)?;
                let mut seeking = condition.seeking;
                seeking.extend(then.seeking);
                let otherwise = match otherwise {
                    Some(e) => {
                        let p = self.process(*e)?;
                        seeking.extend(p.seeking);
                        Some(Box::new(p.node))
                    }
                    None => None,
                };
                Processed::with_seeking(
                    Node::new(
                        NodeKind::Condition {
                            condition: Box::new(condition.node),
                            then: Box::new(then.node),
                            otherwise,
                        },
                        position,
                    ),
                    seeking,
                )
            }
            RawKind::Call {
                procedure,
                args,
                partial,
            } => {
                let mut seeking = Vec::new();
                let mut nodes = Vec::with_capacity(args.len());
                for arg in args {
                    let p = self.process(arg)?;
                    seeking.extend(p.seeking);
                    nodes.push(p.node);
                }
                let procedure = Box::new(self.process(*procedure)?.node);
                let kind = if partial {
                    NodeKind::Partial {
                        procedure,
                        args: nodes,
                    }
                } else {
                    NodeKind::Function {
                        procedure,
                        args: nodes,
                    }
                };
                Processed::with_seeking(Node::new(kind, position), seeking)
            }
            RawKind::Placeholder => Processed::new(Node::new(NodeKind::Placeholder, position)),
            RawKind::Lambda {
                params,
                signature,
                body,
            } => {
                let mut body = self.process(*body)?.node;
                self.assign_labels(&mut body);
                let body = tail_call_optimize(body);
                Processed::new(Node::new(
                    NodeKind::Lambda {
                        params,
                        signature: signature.map(Arc::new),
                        body: Arc::new(body),
                        thunk: false,
                    },
                    position,
                ))
            }
            RawKind::Transform {
                pattern,
                update,
                delete,
            } => {
                let pattern = self.shared(*pattern)?;
                let update = self.shared(*update)?;
                let delete = match delete {
                    Some(d) => Some(self.shared(*d)?),
                    None => None,
                };
                Processed::new(Node::new(
                    NodeKind::Transform {
                        pattern,
                        update,
                        delete,
                    },
                    position,
                ))
            }
            RawKind::End => return Err(Error::new("S0207").at(position)),
            RawKind::Error => Processed::new(Node::new(NodeKind::Error, position)),
        };
        if keep_array {
            out.node.keep_array = true;
        }
        Ok(out)
    }

    /// Normalize a subtree that will be shared by every function value built from it.
    fn shared(&mut self, raw: RawNode) -> Result<Arc<Node>> {
        let mut node = self.process(raw)?.node;
        self.assign_labels(&mut node);
        Ok(Arc::new(node))
    }

    fn binary(
        &mut self,
        op: &'static str,
        lhs: RawNode,
        rhs: RawNode,
        position: usize,
        keep_array: bool,
    ) -> Result<Processed> {
        match op {
            "." => self.path(lhs, rhs, position),
            "[" => self.predicate(lhs, rhs, position),
            "@" => self.focus(lhs, rhs, position, keep_array),
            "#" => self.index(lhs, rhs, position),
            ":=" => {
                let name = match &lhs.kind {
                    RawKind::Variable(name) => name.clone(),
                    _ => return Err(Error::new("S0212").at(lhs.position).token(lhs.token())),
                };
                let value = self.process(rhs)?;
                Ok(Processed::with_seeking(
                    Node::new(
                        NodeKind::Bind {
                            name,
                            value: Box::new(value.node),
                        },
                        position,
                    ),
                    value.seeking,
                ))
            }
            "~>" => {
                let lhs = self.process(lhs)?.node;
                let rhs = self.process(rhs)?.node;
                let keep = lhs.keep_array || rhs.keep_array;
                let mut node = Node::new(
                    NodeKind::Apply {
                        lhs: Box::new(lhs),
                        rhs: Box::new(rhs),
                    },
                    position,
                );
                node.keep_array = keep;
                Ok(Processed::new(node))
            }
            _ => {
                let op = BinaryOp::from_token(op)
                    .ok_or_else(|| Error::new("S0201").at(position).token(op))?;
                let lhs = self.process(lhs)?;
                let rhs = self.process(rhs)?;
                let mut seeking = lhs.seeking;
                seeking.extend(rhs.seeking);
                Ok(Processed::with_seeking(
                    Node::new(
                        NodeKind::Binary {
                            op,
                            lhs: Box::new(lhs.node),
                            rhs: Box::new(rhs.node),
                        },
                        position,
                    ),
                    seeking,
                ))
            }
        }
    }

    fn path(&mut self, lhs: RawNode, rhs: RawNode, position: usize) -> Result<Processed> {
        let left = self.process(lhs)?;
        let (mut path, mut steps, mut path_seeking, mut last_step) = into_path_parts(left, true);

        let rest = self.process(rhs)?;
        let Processed {
            node: mut rest_node,
            seeking: rest_seeking,
            last_step: rest_last,
        } = rest;
        let rest_steps = match &mut rest_node.kind {
            NodeKind::Path { steps, .. } => Some(std::mem::take(steps)),
            _ => None,
        };
        match rest_steps {
            Some(rest_steps) => {
                steps.extend(rest_steps);
                last_step = rest_last;
            }
            None => {
                predicates_to_stages(&mut rest_node);
                steps.push(rest_node);
                last_step = rest_seeking;
            }
        }

        for step in steps.iter_mut() {
            match &mut step.kind {
                NodeKind::Number(n) => {
                    return Err(Error::new("S0213")
                        .at(step.position)
                        .value(format_number(*n)))
                }
                NodeKind::Bool(b) => {
                    return Err(Error::new("S0213").at(step.position).value(*b))
                }
                NodeKind::Null => return Err(Error::new("S0213").at(step.position).value("null")),
                NodeKind::String(s) => {
                    let name = std::mem::take(s);
                    step.kind = NodeKind::Name(name);
                }
                _ => {}
            }
        }

        let keep_singleton = steps.iter().any(|s| s.keep_array)
            || matches!(path.kind, NodeKind::Path { keep_singleton_array: true, .. });

        if let Some(first) = steps.first_mut() {
            if first.is_array_constructor() {
                first.cons_array = true;
            }
        }
        if let Some(last) = steps.last_mut() {
            if last.is_array_constructor() {
                last.cons_array = true;
            }
        }

        self.resolve_ancestry(&mut steps, &last_step, &mut path_seeking)?;

        if path.position == 0 {
            path.position = position;
        }
        path.kind = NodeKind::Path {
            steps,
            keep_singleton_array: keep_singleton,
        };
        Ok(Processed {
            node: path,
            seeking: path_seeking,
            last_step,
        })
    }

    /// Attach a filter to `step` and resolve the filter's single-level slots
    /// against it. Returns every slot the filter carried.
    fn attach_filter(
        &mut self,
        step: &mut Node,
        predicate: Processed,
        as_stage: bool,
        position: usize,
    ) -> Result<Vec<usize>> {
        if step.group.is_some() {
            return Err(Error::new("S0209").at(position));
        }
        for &slot in &predicate.seeking {
            if self.slots[slot].level == 1 {
                self.seek_parent(step, slot)?;
            } else {
                self.slots[slot].level -= 1;
            }
        }
        if as_stage {
            step.stages.push(Stage::Filter(predicate.node));
        } else {
            step.predicate.push(predicate.node);
        }
        Ok(predicate.seeking)
    }

    fn predicate(&mut self, lhs: RawNode, rhs: RawNode, position: usize) -> Result<Processed> {
        let mut result = self.process(lhs)?;
        let predicate = self.process(rhs)?;
        if let NodeKind::Path { steps, .. } = &mut result.node.kind {
            if let Some(step) = steps.last_mut() {
                let pushed = self.attach_filter(step, predicate, true, position)?;
                result.last_step.extend(pushed);
            }
        } else {
            let pushed = self.attach_filter(&mut result.node, predicate, false, position)?;
            result.seeking.extend(pushed);
        }
        Ok(result)
    }

    fn focus(&mut self, lhs: RawNode, rhs: RawNode, position: usize, keep_array: bool) -> Result<Processed> {
        let mut result = self.process(lhs)?;
        let name = variable_name(&rhs, "@")?;
        let bind = |step: &mut Node| -> Result<()> {
            if !step.stages.is_empty() || !step.predicate.is_empty() {
                return Err(Error::new("S0215").at(position));
            }
            if matches!(step.kind, NodeKind::Sort(_)) {
                return Err(Error::new("S0216").at(position));
            }
            if keep_array {
                step.keep_array = true;
            }
            step.focus = Some(name.clone());
            step.tuple = true;
            Ok(())
        };
        if let NodeKind::Path { steps, .. } = &mut result.node.kind {
            if let Some(step) = steps.last_mut() {
                bind(step)?;
            }
        } else {
            bind(&mut result.node)?;
        }
        Ok(result)
    }

    fn index(&mut self, lhs: RawNode, rhs: RawNode, position: usize) -> Result<Processed> {
        let result = self.process(lhs)?;
        let name = variable_name(&rhs, "#")?;
        let mut result = if result.node.is_path() {
            result
        } else {
            let Processed { mut node, seeking, .. } = result;
            predicates_to_stages(&mut node);
            let path = Node::new(
                NodeKind::Path {
                    steps: vec![node],
                    keep_singleton_array: false,
                },
                position,
            );
            Processed {
                node: path,
                seeking: Vec::new(),
                last_step: seeking,
            }
        };
        if let NodeKind::Path { steps, .. } = &mut result.node.kind {
            if let Some(step) = steps.last_mut() {
                if step.stages.is_empty() {
                    step.index = Some(name);
                } else {
                    step.stages.push(Stage::Index(name));
                }
                step.tuple = true;
            }
        }
        Ok(result)
    }

    fn group(&mut self, lhs: RawNode, pairs: Vec<(RawNode, RawNode)>, position: usize) -> Result<Processed> {
        let mut result = self.process(lhs)?;
        if result.node.group.is_some() {
            return Err(Error::new("S0210").at(position));
        }
        let mut nodes = Vec::with_capacity(pairs.len());
        for (k, v) in pairs {
            let key = self.process(k)?.node;
            let value = self.process(v)?.node;
            nodes.push((key, value));
        }
        result.node.group = Some(Box::new(GroupBy {
            pairs: nodes,
            position,
        }));
        Ok(result)
    }

    fn sort(&mut self, lhs: RawNode, terms: Vec<(RawNode, bool)>, position: usize) -> Result<Processed> {
        let left = self.process(lhs)?;
        let (mut path, mut steps, mut path_seeking, _) = into_path_parts(left, false);

        let mut sort_seeking = Vec::new();
        let mut sort_terms = Vec::with_capacity(terms.len());
        for (expr, descending) in terms {
            let p = self.process(expr)?;
            sort_seeking.extend(p.seeking);
            sort_terms.push(SortTerm {
                expression: p.node,
                descending,
            });
        }
        steps.push(Node::new(NodeKind::Sort(sort_terms), position));

        self.resolve_ancestry(&mut steps, &sort_seeking, &mut path_seeking)?;

        let keep_singleton = matches!(path.kind, NodeKind::Path { keep_singleton_array: true, .. });
        path.kind = NodeKind::Path {
            steps,
            keep_singleton_array: keep_singleton,
        };
        Ok(Processed {
            node: path,
            seeking: path_seeking,
            last_step: sort_seeking,
        })
    }
}

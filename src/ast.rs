// Normalized syntax tree
//
// This is the tree the evaluator walks. It is produced from the parser's raw
// tree by `normalize`, which builds paths, attaches predicates and stages to
// steps, resolves `%` references and marks tail calls.

use std::fmt;
use std::sync::Arc;

use regex::Regex;

use crate::signature::Signature;

/// Stage types that can be attached to path steps
///
/// Predicates following a path step become stages, applied as part of that
/// step rather than after the whole path has been walked.
#[derive(Debug, Clone)]
pub enum Stage {
    /// Filter/predicate stage `[expr]`
    Filter(Node),
    /// Positional binding `#$var` following a predicate
    Index(String),
}

/// One `<expr` or `>expr` term of an order-by clause.
#[derive(Debug, Clone)]
pub struct SortTerm {
    pub expression: Node,
    pub descending: bool,
}

/// Key/value pairs of an object constructor or group-by clause.
#[derive(Debug, Clone)]
pub struct GroupBy {
    pub pairs: Vec<(Node, Node)>,
    pub position: usize,
}

/// A resolved ancestor reference.
///
/// `id` is the slot's index in the normalizer's label arena; several slots may
/// end up sharing one label when they resolve to the same step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AncestorSlot {
    pub id: usize,
    pub label: String,
}

/// Binary operators
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    // Arithmetic
    Add,
    Subtract,
    Multiply,
    Divide,
    Modulo,

    // Comparison
    Equal,
    NotEqual,
    LessThan,
    LessThanOrEqual,
    GreaterThan,
    GreaterThanOrEqual,

    // Logical
    And,
    Or,

    // String
    Concatenate,

    // Range (array constructors only)
    Range,

    In,

    // ??
    Coalesce,

    // ?:
    Default,
}

impl BinaryOp {
    pub fn from_token(op: &str) -> Option<Self> {
        Some(match op {
            "+" => BinaryOp::Add,
            "-" => BinaryOp::Subtract,
            "*" => BinaryOp::Multiply,
            "/" => BinaryOp::Divide,
            "%" => BinaryOp::Modulo,
            "=" => BinaryOp::Equal,
            "!=" => BinaryOp::NotEqual,
            "<" => BinaryOp::LessThan,
            "<=" => BinaryOp::LessThanOrEqual,
            ">" => BinaryOp::GreaterThan,
            ">=" => BinaryOp::GreaterThanOrEqual,
            "and" => BinaryOp::And,
            "or" => BinaryOp::Or,
            "&" => BinaryOp::Concatenate,
            ".." => BinaryOp::Range,
            "in" => BinaryOp::In,
            "??" => BinaryOp::Coalesce,
            "?:" => BinaryOp::Default,
            _ => return None,
        })
    }

    pub fn symbol(&self) -> &'static str {
        match self {
            BinaryOp::Add => "+",
            BinaryOp::Subtract => "-",
            BinaryOp::Multiply => "*",
            BinaryOp::Divide => "/",
            BinaryOp::Modulo => "%",
            BinaryOp::Equal => "=",
            BinaryOp::NotEqual => "!=",
            BinaryOp::LessThan => "<",
            BinaryOp::LessThanOrEqual => "<=",
            BinaryOp::GreaterThan => ">",
            BinaryOp::GreaterThanOrEqual => ">=",
            BinaryOp::And => "and",
            BinaryOp::Or => "or",
            BinaryOp::Concatenate => "&",
            BinaryOp::Range => "..",
            BinaryOp::In => "in",
            BinaryOp::Coalesce => "??",
            BinaryOp::Default => "?:",
        }
    }
}

impl fmt::Display for BinaryOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

/// Node kinds of the normalized tree
#[derive(Debug, Clone)]
pub enum NodeKind {
    /// String literal (e.g., "hello", 'world')
    String(String),
    Number(f64),
    Bool(bool),
    Null,
    Regex(Regex),

    /// Field name step
    Name(String),

    /// Variable reference; `""` is the context value `$`.
    Variable(String),

    Wildcard,
    Descendant,

    /// `%`: reads the binding recorded by the step this slot resolved to.
    Parent(AncestorSlot),

    /// A sequence of steps evaluated left to right.
    Path {
        steps: Vec<Node>,
        /// Some step carried `[]`, so singleton results stay arrays.
        keep_singleton_array: bool,
    },

    Binary {
        op: BinaryOp,
        lhs: Box<Node>,
        rhs: Box<Node>,
    },

    /// Unary minus on a non-literal operand.
    Negate(Box<Node>),

    /// Array constructor `[a, b, 1..3]`
    Array(Vec<Node>),

    /// Object constructor `{k: v}`; evaluated like a group-by over the input.
    Object(GroupBy),

    /// Block `(a; b; c)`; each evaluation gets its own frame.
    Block(Vec<Node>),

    Condition {
        condition: Box<Node>,
        then: Box<Node>,
        otherwise: Option<Box<Node>>,
    },

    /// Variable assignment `$name := value`
    Bind {
        name: String,
        value: Box<Node>,
    },

    /// Function call `proc(args)`
    Function {
        procedure: Box<Node>,
        args: Vec<Node>,
    },

    /// Call with `?` placeholders, producing a function of the missing arguments.
    Partial {
        procedure: Box<Node>,
        args: Vec<Node>,
    },

    /// Argument placeholder `?` inside a partial application
    Placeholder,

    /// Function definition. A `thunk` lambda wraps a call in tail position;
    /// its body is always a `Function` node.
    Lambda {
        params: Vec<String>,
        signature: Option<Arc<Signature>>,
        body: Arc<Node>,
        thunk: bool,
    },

    /// `lhs ~> rhs`
    Apply {
        lhs: Box<Node>,
        rhs: Box<Node>,
    },

    /// `|pattern|update[,delete]|`
    Transform {
        pattern: Arc<Node>,
        update: Arc<Node>,
        delete: Option<Arc<Node>>,
    },

    /// Order-by step `^(terms)`; only appears inside a path.
    Sort(Vec<SortTerm>),

    /// Stand-in for a construct that failed to parse in recovery mode.
    Error,
}

/// A node with the annotations path evaluation relies on.
#[derive(Debug, Clone)]
pub struct Node {
    pub kind: NodeKind,
    /// Code-point offset just past the token that produced this node.
    pub position: usize,
    /// `[]` was applied: keep singleton results as arrays.
    pub keep_array: bool,
    /// Filters applied to the result of a non-path expression.
    pub predicate: Vec<Node>,
    /// Filters and index bindings applied as part of a path step.
    pub stages: Vec<Stage>,
    pub group: Option<Box<GroupBy>>,
    /// `@$var`: bind each result to `var` while keeping the context.
    pub focus: Option<String>,
    /// `#$var`: bind each result's position to `var`.
    pub index: Option<String>,
    /// Label under which this step records its input for `%`.
    pub ancestor: Option<AncestorSlot>,
    /// Evaluate the enclosing path as a tuple stream.
    pub tuple: bool,
    /// Explicit array constructor at the start or end of a path.
    pub cons_array: bool,
}

impl Node {
    pub fn new(kind: NodeKind, position: usize) -> Self {
        Node {
            kind,
            position,
            keep_array: false,
            predicate: Vec::new(),
            stages: Vec::new(),
            group: None,
            focus: None,
            index: None,
            ancestor: None,
            tuple: false,
            cons_array: false,
        }
    }

    pub fn is_path(&self) -> bool {
        matches!(self.kind, NodeKind::Path { .. })
    }

    pub fn is_array_constructor(&self) -> bool {
        matches!(self.kind, NodeKind::Array(_))
    }

    /// Name used when reporting a failed call: the variable or field being invoked.
    pub fn procedure_name(&self) -> Option<&str> {
        match &self.kind {
            NodeKind::Variable(name) | NodeKind::Name(name) => Some(name),
            NodeKind::Path { steps, .. } => steps.first().and_then(Node::procedure_name),
            _ => None,
        }
    }

    /// Short kind name used in error tokens.
    pub fn type_name(&self) -> &'static str {
        match &self.kind {
            NodeKind::String(_) => "string",
            NodeKind::Number(_) => "number",
            NodeKind::Bool(_) | NodeKind::Null => "value",
            NodeKind::Regex(_) => "regex",
            NodeKind::Name(_) => "name",
            NodeKind::Variable(_) => "variable",
            NodeKind::Wildcard => "wildcard",
            NodeKind::Descendant => "descendant",
            NodeKind::Parent(_) => "parent",
            NodeKind::Path { .. } => "path",
            NodeKind::Binary { .. } => "binary",
            NodeKind::Negate(_) | NodeKind::Array(_) | NodeKind::Object(_) => "unary",
            NodeKind::Block(_) => "block",
            NodeKind::Condition { .. } => "condition",
            NodeKind::Bind { .. } => "bind",
            NodeKind::Function { .. } => "function",
            NodeKind::Partial { .. } => "partial",
            NodeKind::Placeholder => "operator",
            NodeKind::Lambda { .. } => "lambda",
            NodeKind::Apply { .. } => "apply",
            NodeKind::Transform { .. } => "transform",
            NodeKind::Sort(_) => "sort",
            NodeKind::Error => "error",
        }
    }

    /// Number of nodes in this subtree.
    pub fn count(&self) -> usize {
        let mut total = 1;
        self.visit_children(&mut |child| total += child.count());
        total
    }

    /// Call `f` on every direct child, including predicates, stages and group pairs.
    pub fn visit_children<'a>(&'a self, f: &mut dyn FnMut(&'a Node)) {
        for p in &self.predicate {
            f(p);
        }
        for stage in &self.stages {
            if let Stage::Filter(n) = stage {
                f(n);
            }
        }
        if let Some(group) = &self.group {
            for (k, v) in &group.pairs {
                f(k);
                f(v);
            }
        }
        match &self.kind {
            NodeKind::Path { steps, .. } => steps.iter().for_each(|s| f(s)),
            NodeKind::Binary { lhs, rhs, .. } | NodeKind::Apply { lhs, rhs } => {
                f(lhs);
                f(rhs);
            }
            NodeKind::Negate(e) => f(e),
            NodeKind::Array(items) | NodeKind::Block(items) => items.iter().for_each(|i| f(i)),
            NodeKind::Object(group) => {
                for (k, v) in &group.pairs {
                    f(k);
                    f(v);
                }
            }
            NodeKind::Condition {
                condition,
                then,
                otherwise,
            } => {
                f(condition);
                f(then);
                if let Some(e) = otherwise {
                    f(e);
                }
            }
            NodeKind::Bind { value, .. } => f(value),
            NodeKind::Function { procedure, args } | NodeKind::Partial { procedure, args } => {
                f(procedure);
                args.iter().for_each(|a| f(a));
            }
            NodeKind::Lambda { body, .. } => f(body),
            NodeKind::Transform {
                pattern,
                update,
                delete,
            } => {
                f(pattern);
                f(update);
                if let Some(d) = delete {
                    f(d);
                }
            }
            NodeKind::Sort(terms) => terms.iter().for_each(|t| f(&t.expression)),
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_node_creation() {
        let node = Node::new(NodeKind::Number(42.0), 2);
        assert!(matches!(node.kind, NodeKind::Number(_)));
        assert_eq!(node.position, 2);
        assert!(!node.tuple && node.stages.is_empty());
    }

    #[test]
    fn test_binary_op_tokens() {
        assert_eq!(BinaryOp::from_token("<="), Some(BinaryOp::LessThanOrEqual));
        assert_eq!(BinaryOp::from_token("??"), Some(BinaryOp::Coalesce));
        assert_eq!(BinaryOp::from_token(":="), None);
        assert_eq!(BinaryOp::Concatenate.to_string(), "&");
    }

    #[test]
    fn test_count_includes_stages() {
        let mut step = Node::new(NodeKind::Name("a".into()), 1);
        step.stages.push(Stage::Filter(Node::new(NodeKind::Number(0.0), 3)));
        let path = Node::new(
            NodeKind::Path {
                steps: vec![step],
                keep_singleton_array: false,
            },
            1,
        );
        assert_eq!(path.count(), 3);
        assert_eq!(path.procedure_name(), Some("a"));
    }
}

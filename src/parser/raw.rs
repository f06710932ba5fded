// Parser output before normalization
//
// Mirrors the surface syntax one-to-one. Paths are still nested `.` binaries
// and predicates are still `[` binaries; `normalize` turns this into `ast::Node`.

use regex::Regex;

use crate::signature::Signature;

#[derive(Debug, Clone)]
pub enum RawKind {
    Name(String),
    Variable(String),
    String(String),
    Number(f64),
    Bool(bool),
    Null,
    Regex(Regex),

    /// Infix operator applied to two operands, including `.`, `[`, `@`, `#`,
    /// `:=`, `~>` and the `..` of an array-constructor range.
    Binary {
        op: &'static str,
        lhs: Box<RawNode>,
        rhs: Box<RawNode>,
    },
    Negate(Box<RawNode>),

    Wildcard,
    Descendant,
    Parent,

    Array(Vec<RawNode>),
    Object(Vec<(RawNode, RawNode)>),
    Group {
        lhs: Box<RawNode>,
        pairs: Vec<(RawNode, RawNode)>,
    },
    Sort {
        lhs: Box<RawNode>,
        terms: Vec<(RawNode, bool)>,
    },

    Block(Vec<RawNode>),
    Condition {
        condition: Box<RawNode>,
        then: Box<RawNode>,
        otherwise: Option<Box<RawNode>>,
    },

    /// Call or, when any argument is a placeholder, partial application.
    Call {
        procedure: Box<RawNode>,
        args: Vec<RawNode>,
        partial: bool,
    },
    Placeholder,
    Lambda {
        params: Vec<String>,
        signature: Option<Signature>,
        body: Box<RawNode>,
    },
    Transform {
        pattern: Box<RawNode>,
        update: Box<RawNode>,
        delete: Option<Box<RawNode>>,
    },

    /// End of input reached where an operand was expected.
    End,

    /// Recorded syntax error in recovery mode.
    Error,
}

#[derive(Debug, Clone)]
pub struct RawNode {
    pub kind: RawKind,
    pub position: usize,
    /// Set by an empty `[]` following this node.
    pub keep_array: bool,
}

impl RawNode {
    pub fn new(kind: RawKind, position: usize) -> Self {
        RawNode {
            kind,
            position,
            keep_array: false,
        }
    }

    pub fn binary(op: &'static str, lhs: RawNode, rhs: RawNode, position: usize) -> Self {
        RawNode::new(
            RawKind::Binary {
                op,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
            },
            position,
        )
    }

    pub fn is_variable(&self) -> bool {
        matches!(self.kind, RawKind::Variable(_))
    }

    /// Spelling of the node's own token for error messages.
    pub fn token(&self) -> String {
        match &self.kind {
            RawKind::Name(n) | RawKind::String(n) => n.clone(),
            RawKind::Variable(v) => v.clone(),
            RawKind::Number(n) => crate::value::format_number(*n),
            RawKind::Bool(b) => b.to_string(),
            RawKind::Null => "null".to_string(),
            RawKind::Binary { op, .. } => op.to_string(),
            RawKind::Negate(_) => "-".to_string(),
            RawKind::Wildcard => "*".to_string(),
            RawKind::Descendant => "**".to_string(),
            RawKind::Parent => "%".to_string(),
            RawKind::Array(_) => "[".to_string(),
            RawKind::Object(_) | RawKind::Group { .. } => "{".to_string(),
            RawKind::Sort { .. } => "^".to_string(),
            RawKind::Block(_) => "(".to_string(),
            RawKind::Condition { .. } => "?".to_string(),
            RawKind::Call { .. } => "(".to_string(),
            RawKind::Placeholder => "?".to_string(),
            RawKind::Lambda { .. } => "function".to_string(),
            RawKind::Transform { .. } => "|".to_string(),
            RawKind::Regex(re) => re.as_str().to_string(),
            RawKind::End => "(end)".to_string(),
            RawKind::Error => "(error)".to_string(),
        }
    }
}

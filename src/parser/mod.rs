// Expression parser
//
// Top-down operator precedence parsing driven by the rule table in `rules`.
// Each token id maps to an optional prefix (nud) rule, an optional infix
// (led) rule and a left binding power.

mod raw;
mod rules;

pub use raw::{RawKind, RawNode};

use tracing::debug;

use crate::ast::Node;
use crate::error::{Error, Result};
use crate::lexer::{Lexer, TokenKind};
use crate::normalize::normalize;

/// The token the parser is looking at, tagged with its rule id.
#[derive(Debug, Clone)]
pub(crate) struct Symbol {
    /// Rule key: an operator spelling, or one of `(name)`, `(literal)`,
    /// `(regex)`, `(end)`, `(error)`.
    pub id: &'static str,
    pub kind: Option<TokenKind>,
    pub position: usize,
}

impl Symbol {
    fn end(position: usize) -> Self {
        Symbol {
            id: "(end)",
            kind: None,
            position,
        }
    }

    fn error(position: usize) -> Self {
        Symbol {
            id: "(error)",
            kind: None,
            position,
        }
    }

    /// Spelling used in error messages.
    pub fn value(&self) -> String {
        match &self.kind {
            Some(kind) => crate::lexer::Token {
                kind: kind.clone(),
                position: self.position,
            }
            .describe(),
            None => self.id.to_string(),
        }
    }
}

/// Parser state for one source string.
pub struct Parser {
    lexer: Lexer,
    current: Symbol,
    recover: bool,
    errors: Vec<Error>,
}

impl Parser {
    fn new(source: &str, recover: bool) -> Self {
        Parser {
            lexer: Lexer::new(source),
            current: Symbol::end(0),
            recover,
            errors: Vec::new(),
        }
    }

    /// Record `err` in recovery mode, otherwise fail with it.
    fn record(&mut self, err: Error) -> Result<()> {
        if self.recover {
            self.errors.push(err);
            Ok(())
        } else {
            Err(err)
        }
    }

    /// Record `err` and stand an error node in for the failed construct.
    pub(crate) fn error_node(&mut self, err: Error) -> Result<RawNode> {
        let position = err.position().unwrap_or(self.current.position);
        self.record(err)?;
        Ok(RawNode::new(RawKind::Error, position))
    }

    /// Move to the next token, first checking that the current one is `expected`.
    ///
    /// `infix` tells the lexer the next token follows a complete operand.
    pub(crate) fn advance(&mut self, expected: Option<&'static str>, infix: bool) -> Result<()> {
        if let Some(id) = expected {
            if self.current.id != id {
                let code = if self.current.id == "(end)" {
                    "S0203"
                } else {
                    "S0202"
                };
                let err = Error::new(code)
                    .at(self.current.position)
                    .token(self.current.value())
                    .expected(id);
                self.record(err)?;
                self.current = Symbol::error(self.current.position);
                return Ok(());
            }
        }

        let token = match self.lexer.next_token(infix)? {
            Some(token) => token,
            None => {
                self.current = Symbol::end(self.lexer.len());
                return Ok(());
            }
        };

        let id = match &token.kind {
            TokenKind::Name(_) | TokenKind::Variable(_) => "(name)",
            TokenKind::Str(_) | TokenKind::Number(_) | TokenKind::Bool(_) | TokenKind::Null => {
                "(literal)"
            }
            TokenKind::Regex { .. } => "(regex)",
            TokenKind::Operator(op) => {
                if rules::rule(op).is_none() {
                    let err = Error::new("S0204").at(token.position).token(*op);
                    self.record(err)?;
                    self.current = Symbol::error(token.position);
                    return Ok(());
                }
                *op
            }
        };

        self.current = Symbol {
            id,
            kind: Some(token.kind),
            position: token.position,
        };
        Ok(())
    }

    pub(crate) fn current_id(&self) -> &'static str {
        self.current.id
    }

    /// Parse an expression whose operators all bind tighter than `rbp`.
    pub(crate) fn expression(&mut self, rbp: u32) -> Result<RawNode> {
        let t = self.current.clone();
        self.advance(None, true)?;
        let mut left = self.nud(t)?;
        while rbp < rules::lbp(self.current.id) {
            let t = self.current.clone();
            self.advance(None, false)?;
            left = self.led(t, left)?;
        }
        Ok(left)
    }

    fn nud(&mut self, t: Symbol) -> Result<RawNode> {
        match rules::rule(t.id).and_then(|r| r.nud) {
            Some(nud) => nud(self, t),
            None => {
                let err = Error::new("S0211").at(t.position).token(t.value());
                self.error_node(err)
            }
        }
    }

    fn led(&mut self, t: Symbol, left: RawNode) -> Result<RawNode> {
        match rules::rule(t.id).and_then(|r| r.led) {
            Some(led) => led(self, t, left),
            None => {
                let err = Error::new("S0205").at(t.position).token(t.value());
                self.error_node(err)
            }
        }
    }

    fn parse_top(mut self) -> Result<(RawNode, Vec<Error>)> {
        self.advance(None, false)?;
        let expr = self.expression(0)?;
        if self.current.id != "(end)" {
            let err = Error::new("S0201")
                .at(self.current.position)
                .token(self.current.value());
            self.record(err)?;
        }
        Ok((expr, self.errors))
    }
}

/// Parse without normalizing. In recovery mode recoverable errors are
/// returned alongside the tree instead of failing the parse.
pub fn parse_raw(source: &str, recover: bool) -> Result<(RawNode, Vec<Error>)> {
    Parser::new(source, recover).parse_top()
}

/// Parse and normalize an expression, failing on the first syntax error.
pub fn parse(source: &str) -> Result<Node> {
    let (raw, _) = parse_raw(source, false)?;
    let node = normalize(raw)?;
    debug!(
        source_len = source.len(),
        nodes = node.count(),
        "Parsed expression"
    );
    Ok(node)
}

/// Parse and normalize in recovery mode.
///
/// Ancestor resolution failures and unknown expression types are still
/// returned as errors.
pub fn parse_with_recovery(source: &str) -> Result<(Node, Vec<Error>)> {
    let (raw, errors) = parse_raw(source, true)?;
    let node = normalize(raw)?;
    debug!(
        source_len = source.len(),
        nodes = node.count(),
        errors = errors.len(),
        "Parsed expression in recovery mode"
    );
    Ok((node, errors))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw(src: &str) -> RawNode {
        parse_raw(src, false).unwrap().0
    }

    fn err(src: &str) -> String {
        parse_raw(src, false).unwrap_err().code().to_string()
    }

    #[test]
    fn test_parse_number() {
        assert!(matches!(raw("42").kind, RawKind::Number(n) if n == 42.0));
    }

    #[test]
    fn test_parse_precedence() {
        // 1 + 2 * 3 groups as 1 + (2 * 3)
        match raw("1 + 2 * 3").kind {
            RawKind::Binary { op: "+", rhs, .. } => {
                assert!(matches!(rhs.kind, RawKind::Binary { op: "*", .. }));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_parse_left_associative_path() {
        match raw("a.b.c").kind {
            RawKind::Binary { op: ".", lhs, rhs } => {
                assert!(matches!(lhs.kind, RawKind::Binary { op: ".", .. }));
                assert!(matches!(rhs.kind, RawKind::Name(ref n) if n == "c"));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_parse_bind_is_right_associative() {
        match raw("$a := $b := 1").kind {
            RawKind::Binary { op: ":=", rhs, .. } => {
                assert!(matches!(rhs.kind, RawKind::Binary { op: ":=", .. }));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_parse_conditional_with_optional_else() {
        assert!(matches!(
            raw("a ? b").kind,
            RawKind::Condition { otherwise: None, .. }
        ));
        assert!(matches!(
            raw("a ? b : c").kind,
            RawKind::Condition {
                otherwise: Some(_),
                ..
            }
        ));
    }

    #[test]
    fn test_parse_lambda_with_signature() {
        match raw("function($x, $y)<nn:n>{ $x + $y }").kind {
            RawKind::Lambda {
                params, signature, ..
            } => {
                assert_eq!(params, vec!["x".to_string(), "y".to_string()]);
                assert_eq!(signature.map(|s| s.arity()), Some(2));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_parse_partial_application() {
        assert!(matches!(
            raw("$substring(?, 0, 2)").kind,
            RawKind::Call { partial: true, .. }
        ));
    }

    #[test]
    fn test_parse_empty_predicate_marks_keep_array() {
        match raw("a[]").kind {
            RawKind::Name(_) => {}
            other => panic!("unexpected {:?}", other),
        }
        assert!(raw("a[]").keep_array);
    }

    #[test]
    fn test_parse_sort_terms() {
        match raw("a^(>b, c)").kind {
            RawKind::Sort { terms, .. } => {
                assert_eq!(terms.len(), 2);
                assert!(terms[0].1);
                assert!(!terms[1].1);
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_parse_array_range() {
        match raw("[1..3, 5]").kind {
            RawKind::Array(items) => {
                assert_eq!(items.len(), 2);
                assert!(matches!(items[0].kind, RawKind::Binary { op: "..", .. }));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_parse_keywords_as_names() {
        assert!(matches!(raw("and").kind, RawKind::Name(ref n) if n == "and"));
    }

    #[test]
    fn test_parse_transform() {
        assert!(matches!(
            raw("| a | {'x': 1}, ['y'] |").kind,
            RawKind::Transform { delete: Some(_), .. }
        ));
    }

    #[test]
    fn test_parse_errors() {
        assert_eq!(err("(1"), "S0203");
        assert_eq!(err("[1 2]"), "S0202");
        assert_eq!(err("1 1"), "S0201");
        assert_eq!(err("a ! b"), "S0204");
        assert_eq!(err("function(a){1}"), "S0208");
        assert_eq!(err("a := 1"), "S0212");
        assert_eq!(err("a@b"), "S0214");
        assert_eq!(err(")"), "S0211");
    }

    #[test]
    fn test_recovery_collects_errors() {
        let (tree, errors) = parse_raw("[1, 2", true).unwrap();
        assert!(matches!(tree.kind, RawKind::Array(_)));
        assert_eq!(errors[0].code(), "S0203");
        assert!(errors.iter().all(|e| e.is_syntax()));
    }

    #[test]
    fn test_parse_normalizes() {
        let node = parse("a.b[0]").unwrap();
        assert!(node.is_path());
    }
}

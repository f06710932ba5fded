// Parsing rules keyed by token id

use std::collections::HashMap;
use std::sync::LazyLock;

use regex::Regex;

use super::{Parser, RawKind, RawNode, Symbol};
use crate::error::{Error, Result};
use crate::lexer::{binding_power, TokenKind};
use crate::signature::Signature;

/// Prefix rule: the token starts an operand.
pub(super) type Nud = fn(&mut Parser, Symbol) -> Result<RawNode>;
/// Infix rule: the token follows the already-parsed `left` operand.
pub(super) type Led = fn(&mut Parser, Symbol, RawNode) -> Result<RawNode>;

#[derive(Clone, Copy)]
pub(super) struct Rule {
    pub lbp: u32,
    pub nud: Option<Nud>,
    pub led: Option<Led>,
}

static RULES: LazyLock<HashMap<&'static str, Rule>> = LazyLock::new(build_rules);

pub(super) fn rule(id: &str) -> Option<&'static Rule> {
    RULES.get(id)
}

/// Left binding power of a token id; tokens without a rule bind nothing.
pub(super) fn lbp(id: &str) -> u32 {
    rule(id).map_or(0, |r| r.lbp)
}

struct Table(HashMap<&'static str, Rule>);

impl Table {
    fn symbol(&mut self, id: &'static str, bp: u32) -> &mut Rule {
        let rule = self.0.entry(id).or_insert(Rule {
            lbp: bp,
            nud: None,
            led: None,
        });
        rule.lbp = rule.lbp.max(bp);
        rule
    }

    fn prefix(&mut self, id: &'static str, nud: Nud) {
        self.symbol(id, 0).nud = Some(nud);
    }

    fn infix(&mut self, id: &'static str, led: Led) {
        let bp = binding_power(id).unwrap_or(0);
        self.symbol(id, bp).led = Some(led);
    }
}

fn build_rules() -> HashMap<&'static str, Rule> {
    let mut t = Table(HashMap::new());

    t.prefix("(end)", end_nud);
    t.prefix("(name)", name_nud);
    t.prefix("(literal)", literal_nud);
    t.prefix("(regex)", regex_nud);
    t.prefix("(error)", error_nud);

    for id in [":", ";", ",", ")", "]", "}", ".."] {
        t.symbol(id, 0);
    }

    for id in [
        ".", "+", "-", "*", "/", "%", "=", "<", ">", "!=", "<=", ">=", "&", "and", "or", "in",
        "~>", "??", "?:",
    ] {
        t.infix(id, binary_led);
    }

    // keywords double as field names in operand position
    for id in ["and", "or", "in"] {
        t.prefix(id, keyword_nud);
    }

    t.infix(":=", bind_led);
    t.infix("@", focus_led);
    t.infix("#", index_led);
    t.infix("?", condition_led);
    t.infix("^", sort_led);
    t.infix("(", call_led);
    t.infix("[", predicate_led);
    t.infix("{", group_led);

    t.prefix("-", negate_nud);
    t.prefix("*", wildcard_nud);
    t.prefix("**", descendant_nud);
    t.prefix("%", parent_nud);
    t.prefix("(", block_nud);
    t.prefix("[", array_nud);
    t.prefix("{", object_nud);
    t.prefix("|", transform_nud);

    t.0
}

// ── Terminals ───────────────────────────────────────────────────────────────

fn end_nud(_p: &mut Parser, t: Symbol) -> Result<RawNode> {
    Ok(RawNode::new(RawKind::End, t.position))
}

fn error_nud(_p: &mut Parser, t: Symbol) -> Result<RawNode> {
    Ok(RawNode::new(RawKind::Error, t.position))
}

fn name_nud(p: &mut Parser, t: Symbol) -> Result<RawNode> {
    let kind = match t.kind {
        Some(TokenKind::Name(name)) => RawKind::Name(name),
        Some(TokenKind::Variable(name)) => RawKind::Variable(name),
        _ => return p.error_node(Error::new("S0206").at(t.position).token(t.id)),
    };
    Ok(RawNode::new(kind, t.position))
}

fn literal_nud(p: &mut Parser, t: Symbol) -> Result<RawNode> {
    let kind = match t.kind {
        Some(TokenKind::Str(s)) => RawKind::String(s),
        Some(TokenKind::Number(n)) => RawKind::Number(n),
        Some(TokenKind::Bool(b)) => RawKind::Bool(b),
        Some(TokenKind::Null) => RawKind::Null,
        _ => return p.error_node(Error::new("S0206").at(t.position).token(t.id)),
    };
    Ok(RawNode::new(kind, t.position))
}

fn regex_nud(p: &mut Parser, t: Symbol) -> Result<RawNode> {
    let (pattern, flags) = match t.kind {
        Some(TokenKind::Regex { pattern, flags }) => (pattern, flags),
        _ => return p.error_node(Error::new("S0206").at(t.position).token(t.id)),
    };
    let source = if flags.is_empty() {
        pattern.clone()
    } else {
        format!("(?{}){}", flags, pattern)
    };
    match Regex::new(&source) {
        Ok(re) => Ok(RawNode::new(RawKind::Regex(re), t.position)),
        Err(_) => p.error_node(Error::new("S0303").at(t.position).value(pattern)),
    }
}

fn keyword_nud(_p: &mut Parser, t: Symbol) -> Result<RawNode> {
    Ok(RawNode::new(RawKind::Name(t.id.to_string()), t.position))
}

// ── Prefix operators ────────────────────────────────────────────────────────

fn negate_nud(p: &mut Parser, t: Symbol) -> Result<RawNode> {
    let operand = p.expression(70)?;
    Ok(RawNode::new(RawKind::Negate(Box::new(operand)), t.position))
}

fn wildcard_nud(_p: &mut Parser, t: Symbol) -> Result<RawNode> {
    Ok(RawNode::new(RawKind::Wildcard, t.position))
}

fn descendant_nud(_p: &mut Parser, t: Symbol) -> Result<RawNode> {
    Ok(RawNode::new(RawKind::Descendant, t.position))
}

fn parent_nud(_p: &mut Parser, t: Symbol) -> Result<RawNode> {
    Ok(RawNode::new(RawKind::Parent, t.position))
}

fn block_nud(p: &mut Parser, t: Symbol) -> Result<RawNode> {
    let mut expressions = Vec::new();
    while p.current_id() != ")" {
        expressions.push(p.expression(0)?);
        if p.current_id() != ";" {
            break;
        }
        p.advance(Some(";"), false)?;
    }
    p.advance(Some(")"), true)?;
    Ok(RawNode::new(RawKind::Block(expressions), t.position))
}

fn array_nud(p: &mut Parser, t: Symbol) -> Result<RawNode> {
    let mut items = Vec::new();
    if p.current_id() != "]" {
        loop {
            let mut item = p.expression(0)?;
            if p.current_id() == ".." {
                let position = p.current.position;
                p.advance(Some(".."), false)?;
                let end = p.expression(0)?;
                item = RawNode::binary("..", item, end, position);
            }
            items.push(item);
            if p.current_id() != "," {
                break;
            }
            p.advance(Some(","), false)?;
        }
    }
    p.advance(Some("]"), true)?;
    Ok(RawNode::new(RawKind::Array(items), t.position))
}

fn object_pairs(p: &mut Parser) -> Result<Vec<(RawNode, RawNode)>> {
    let mut pairs = Vec::new();
    if p.current_id() != "}" {
        loop {
            let key = p.expression(0)?;
            p.advance(Some(":"), false)?;
            let value = p.expression(0)?;
            pairs.push((key, value));
            if p.current_id() != "," {
                break;
            }
            p.advance(Some(","), false)?;
        }
    }
    p.advance(Some("}"), true)?;
    Ok(pairs)
}

fn object_nud(p: &mut Parser, t: Symbol) -> Result<RawNode> {
    let pairs = object_pairs(p)?;
    Ok(RawNode::new(RawKind::Object(pairs), t.position))
}

fn transform_nud(p: &mut Parser, t: Symbol) -> Result<RawNode> {
    let pattern = p.expression(0)?;
    p.advance(Some("|"), false)?;
    let update = p.expression(0)?;
    let delete = if p.current_id() == "," {
        p.advance(Some(","), false)?;
        Some(Box::new(p.expression(0)?))
    } else {
        None
    };
    p.advance(Some("|"), true)?;
    Ok(RawNode::new(
        RawKind::Transform {
            pattern: Box::new(pattern),
            update: Box::new(update),
            delete,
        },
        t.position,
    ))
}

// ── Infix operators ─────────────────────────────────────────────────────────

fn binary_led(p: &mut Parser, t: Symbol, left: RawNode) -> Result<RawNode> {
    let rhs = p.expression(lbp(t.id))?;
    Ok(RawNode::binary(t.id, left, rhs, t.position))
}

fn bind_led(p: &mut Parser, t: Symbol, left: RawNode) -> Result<RawNode> {
    if !left.is_variable() {
        let err = Error::new("S0212").at(left.position).token(left.token());
        return p.error_node(err);
    }
    // right associative
    let rhs = p.expression(lbp(t.id) - 1)?;
    Ok(RawNode::binary(t.id, left, rhs, t.position))
}

fn variable_binding_led(p: &mut Parser, t: Symbol, left: RawNode) -> Result<RawNode> {
    let rhs = p.expression(lbp(t.id))?;
    if !rhs.is_variable() {
        let err = Error::new("S0214").at(rhs.position).token(t.id);
        return p.error_node(err);
    }
    Ok(RawNode::binary(t.id, left, rhs, t.position))
}

fn focus_led(p: &mut Parser, t: Symbol, left: RawNode) -> Result<RawNode> {
    variable_binding_led(p, t, left)
}

fn index_led(p: &mut Parser, t: Symbol, left: RawNode) -> Result<RawNode> {
    variable_binding_led(p, t, left)
}

fn condition_led(p: &mut Parser, t: Symbol, left: RawNode) -> Result<RawNode> {
    let then = p.expression(0)?;
    let otherwise = if p.current_id() == ":" {
        p.advance(Some(":"), false)?;
        Some(Box::new(p.expression(0)?))
    } else {
        None
    };
    Ok(RawNode::new(
        RawKind::Condition {
            condition: Box::new(left),
            then: Box::new(then),
            otherwise,
        },
        t.position,
    ))
}

fn sort_led(p: &mut Parser, t: Symbol, left: RawNode) -> Result<RawNode> {
    p.advance(Some("("), false)?;
    let mut terms = Vec::new();
    loop {
        let mut descending = false;
        if p.current_id() == "<" {
            p.advance(Some("<"), false)?;
        } else if p.current_id() == ">" {
            descending = true;
            p.advance(Some(">"), false)?;
        }
        terms.push((p.expression(0)?, descending));
        if p.current_id() != "," {
            break;
        }
        p.advance(Some(","), false)?;
    }
    p.advance(Some(")"), true)?;
    Ok(RawNode::new(
        RawKind::Sort {
            lhs: Box::new(left),
            terms,
        },
        t.position,
    ))
}

fn group_led(p: &mut Parser, t: Symbol, left: RawNode) -> Result<RawNode> {
    let pairs = object_pairs(p)?;
    Ok(RawNode::new(
        RawKind::Group {
            lhs: Box::new(left),
            pairs,
        },
        t.position,
    ))
}

fn predicate_led(p: &mut Parser, t: Symbol, left: RawNode) -> Result<RawNode> {
    if p.current_id() == "]" {
        // `[]` keeps singleton results as arrays
        let mut left = left;
        mark_keep_array(&mut left);
        p.advance(Some("]"), true)?;
        return Ok(left);
    }
    let rhs = p.expression(lbp("]"))?;
    p.advance(Some("]"), true)?;
    Ok(RawNode::binary("[", left, rhs, t.position))
}

/// Flag the innermost step under any chain of predicates.
fn mark_keep_array(node: &mut RawNode) {
    match &mut node.kind {
        RawKind::Binary { op: "[", lhs, .. } => mark_keep_array(lhs),
        _ => node.keep_array = true,
    }
}

fn call_led(p: &mut Parser, t: Symbol, left: RawNode) -> Result<RawNode> {
    let mut args = Vec::new();
    let mut partial = false;
    if p.current_id() != ")" {
        loop {
            if p.current_id() == "?" {
                partial = true;
                args.push(RawNode::new(RawKind::Placeholder, p.current.position));
                p.advance(Some("?"), false)?;
            } else {
                args.push(p.expression(0)?);
            }
            if p.current_id() != "," {
                break;
            }
            p.advance(Some(","), false)?;
        }
    }
    p.advance(Some(")"), true)?;

    let is_lambda = matches!(&left.kind, RawKind::Name(n) if n == "function" || n == "\u{03BB}");
    if !is_lambda {
        return Ok(RawNode::new(
            RawKind::Call {
                procedure: Box::new(left),
                args,
                partial,
            },
            t.position,
        ));
    }

    let mut params = Vec::with_capacity(args.len());
    for (index, arg) in args.into_iter().enumerate() {
        match arg.kind {
            RawKind::Variable(name) => params.push(name),
            _ => {
                let err = Error::new("S0208")
                    .at(arg.position)
                    .token(arg.token())
                    .index(index + 1);
                p.record(err)?;
            }
        }
    }

    let mut signature = None;
    if p.current_id() == "<" {
        let start = p.current.position;
        let mut depth = 1;
        let mut text = String::from("<");
        while depth > 0 && p.current_id() != "{" && p.current_id() != "(end)" {
            p.advance(None, false)?;
            match p.current_id() {
                ">" => depth -= 1,
                "<" => depth += 1,
                _ => {}
            }
            text.push_str(&p.current.value());
        }
        p.advance(Some(">"), false)?;
        match Signature::parse(&text) {
            Ok(sig) => signature = Some(sig),
            Err(err) => {
                let offset = err.position().unwrap_or(0);
                p.record(err.at(start + offset))?;
            }
        }
    }

    p.advance(Some("{"), false)?;
    let body = p.expression(0)?;
    p.advance(Some("}"), true)?;

    Ok(RawNode::new(
        RawKind::Lambda {
            params,
            signature,
            body: Box::new(body),
        },
        t.position,
    ))
}

// Expression tokenizer
//
// Scans the source one code point at a time. Positions are code-point
// offsets, and each token records the offset just past its last character.

use crate::error::{Error, Result};

/// Operator tokens and their binding powers.
///
/// The lexer treats every single character listed here as a token boundary.
/// The parser's rule table takes its left binding powers from this table for
/// the tokens that have an infix rule.
pub const OPERATORS: &[(&str, u32)] = &[
    (".", 75),
    ("[", 80),
    ("]", 0),
    ("{", 70),
    ("}", 0),
    ("(", 80),
    (")", 0),
    (",", 0),
    ("@", 80),
    ("#", 80),
    (";", 80),
    (":", 80),
    ("?", 20),
    ("+", 50),
    ("-", 50),
    ("*", 60),
    ("/", 60),
    ("%", 60),
    ("|", 20),
    ("=", 40),
    ("<", 40),
    (">", 40),
    ("^", 40),
    ("**", 60),
    ("..", 20),
    (":=", 10),
    ("!=", 40),
    ("<=", 40),
    (">=", 40),
    ("~>", 40),
    ("?:", 40),
    ("??", 40),
    ("and", 30),
    ("or", 25),
    ("in", 40),
    ("&", 50),
    ("!", 0),
    ("~", 0),
];

/// Two-character operators, matched before any single-character operator.
const DOUBLE_OPERATORS: &[&str] = &["..", ":=", "!=", ">=", "<=", "**", "~>", "?:", "??"];

/// Binding power of an operator, if it is one.
pub fn binding_power(op: &str) -> Option<u32> {
    OPERATORS.iter().find(|(id, _)| *id == op).map(|(_, bp)| *bp)
}

fn operator_id(op: &str) -> Option<&'static str> {
    OPERATORS.iter().find(|(id, _)| *id == op).map(|(id, _)| *id)
}

fn is_operator_char(ch: char) -> bool {
    let mut buf = [0u8; 4];
    let s = ch.encode_utf8(&mut buf);
    operator_id(s).is_some()
}

fn is_whitespace(ch: char) -> bool {
    matches!(ch, ' ' | '\t' | '\n' | '\r' | '\u{000B}')
}

#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind {
    /// Field name, bare or backtick-quoted.
    Name(String),
    /// `$name`; the leading `$` is stripped, so `$` is `""` and `$$` is `"$"`.
    Variable(String),
    Number(f64),
    Str(String),
    Bool(bool),
    Null,
    Regex { pattern: String, flags: String },
    Operator(&'static str),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub position: usize,
}

impl Token {
    /// The source-level spelling used in error messages.
    pub fn describe(&self) -> String {
        match &self.kind {
            TokenKind::Name(n) => n.clone(),
            TokenKind::Variable(v) => format!("${}", v),
            TokenKind::Number(n) => crate::value::format_number(*n),
            TokenKind::Str(s) => s.clone(),
            TokenKind::Bool(b) => b.to_string(),
            TokenKind::Null => "null".to_string(),
            TokenKind::Regex { pattern, flags } => format!("/{}/{}", pattern, flags),
            TokenKind::Operator(op) => op.to_string(),
        }
    }
}

/// Lexer for tokenizing expressions
pub struct Lexer {
    input: Vec<char>,
    position: usize,
}

impl Lexer {
    pub fn new(input: &str) -> Self {
        Lexer {
            input: input.chars().collect(),
            position: 0,
        }
    }

    /// Length of the source in code points.
    pub fn len(&self) -> usize {
        self.input.len()
    }

    pub fn is_empty(&self) -> bool {
        self.input.is_empty()
    }

    fn current(&self) -> Option<char> {
        self.input.get(self.position).copied()
    }

    fn peek(&self, offset: usize) -> Option<char> {
        self.input.get(self.position + offset).copied()
    }

    fn char_at(&self, index: usize) -> Option<char> {
        self.input.get(index).copied()
    }

    fn token(&self, kind: TokenKind) -> Token {
        Token {
            kind,
            position: self.position,
        }
    }

    fn skip_whitespace_and_comments(&mut self) -> Result<()> {
        loop {
            while self.current().is_some_and(is_whitespace) {
                self.position += 1;
            }
            if self.current() == Some('/') && self.peek(1) == Some('*') {
                let start = self.position;
                self.position += 2;
                loop {
                    match self.current() {
                        None => return Err(Error::new("S0106").at(start)),
                        Some('*') if self.peek(1) == Some('/') => {
                            self.position += 2;
                            break;
                        }
                        Some(_) => self.position += 1,
                    }
                }
                continue;
            }
            return Ok(());
        }
    }

    /// Read the next token.
    ///
    /// `infix` is true when the token follows a complete operand. In that
    /// position a `/` is the division operator; anywhere else it opens a
    /// regex literal.
    pub fn next_token(&mut self, infix: bool) -> Result<Option<Token>> {
        self.skip_whitespace_and_comments()?;
        let ch = match self.current() {
            Some(ch) => ch,
            None => return Ok(None),
        };

        if !infix && ch == '/' {
            self.position += 1;
            let (pattern, flags) = self.scan_regex()?;
            return Ok(Some(self.token(TokenKind::Regex { pattern, flags })));
        }

        if let Some(next) = self.peek(1) {
            let pair: String = [ch, next].iter().collect();
            if let Some(op) = DOUBLE_OPERATORS.iter().find(|op| **op == pair) {
                self.position += 2;
                let id = operator_id(op).unwrap_or(op);
                return Ok(Some(self.token(TokenKind::Operator(id))));
            }
        }

        if is_operator_char(ch) {
            self.position += 1;
            let mut buf = [0u8; 4];
            let id = operator_id(ch.encode_utf8(&mut buf)).unwrap_or("?");
            return Ok(Some(self.token(TokenKind::Operator(id))));
        }

        if ch == '"' || ch == '\'' {
            let s = self.read_string(ch)?;
            return Ok(Some(self.token(TokenKind::Str(s))));
        }

        if ch.is_ascii_digit() {
            let n = self.read_number()?;
            return Ok(Some(self.token(TokenKind::Number(n))));
        }

        if ch == '`' {
            let name = self.read_backtick_name()?;
            return Ok(Some(self.token(TokenKind::Name(name))));
        }

        let name = self.read_name();
        if let Some(var) = name.strip_prefix('$') {
            return Ok(Some(self.token(TokenKind::Variable(var.to_string()))));
        }
        let kind = match name.as_str() {
            "and" => TokenKind::Operator("and"),
            "or" => TokenKind::Operator("or"),
            "in" => TokenKind::Operator("in"),
            "true" => TokenKind::Bool(true),
            "false" => TokenKind::Bool(false),
            "null" => TokenKind::Null,
            _ => TokenKind::Name(name),
        };
        Ok(Some(self.token(kind)))
    }

    /// Tokenize everything left in the input, stopping at the first lexical error.
    pub fn remaining(&mut self) -> Vec<Token> {
        let mut tokens = Vec::new();
        while let Ok(Some(token)) = self.next_token(true) {
            tokens.push(token);
        }
        tokens
    }

    fn scan_regex(&mut self) -> Result<(String, String)> {
        let start = self.position;
        let mut depth: i32 = 0;
        while let Some(ch) = self.current() {
            if ch == '/' && depth == 0 && self.preceding_backslashes() % 2 == 0 {
                let pattern: String = self.input[start..self.position].iter().collect();
                if pattern.is_empty() {
                    return Err(Error::new("S0301").at(self.position));
                }
                self.position += 1;
                let flag_start = self.position;
                while matches!(self.current(), Some('i') | Some('m')) {
                    self.position += 1;
                }
                let flags: String = self.input[flag_start..self.position].iter().collect();
                return Ok((pattern, flags));
            }
            let escaped = self.position > 0 && self.char_at(self.position - 1) == Some('\\');
            if !escaped {
                match ch {
                    '(' | '[' | '{' => depth += 1,
                    ')' | ']' | '}' => depth -= 1,
                    _ => {}
                }
            }
            self.position += 1;
        }
        Err(Error::new("S0302").at(self.position))
    }

    fn preceding_backslashes(&self) -> usize {
        self.input[..self.position]
            .iter()
            .rev()
            .take_while(|c| **c == '\\')
            .count()
    }

    fn read_string(&mut self, quote_char: char) -> Result<String> {
        let mut result = String::new();
        self.position += 1; // opening quote

        while let Some(ch) = self.current() {
            match ch {
                '\\' => {
                    self.position += 1;
                    match self.current() {
                        Some('"') => result.push('"'),
                        Some('\\') => result.push('\\'),
                        Some('/') => result.push('/'),
                        Some('b') => result.push('\u{0008}'),
                        Some('f') => result.push('\u{000C}'),
                        Some('n') => result.push('\n'),
                        Some('r') => result.push('\r'),
                        Some('t') => result.push('\t'),
                        Some('u') => {
                            let ch = self.read_unicode_escape()?;
                            result.push(ch);
                        }
                        Some(other) => {
                            return Err(Error::new("S0103")
                                .at(self.position)
                                .token(other.to_string()))
                        }
                        None => break,
                    }
                    self.position += 1;
                }
                c if c == quote_char => {
                    self.position += 1;
                    return Ok(result);
                }
                c => {
                    result.push(c);
                    self.position += 1;
                }
            }
        }
        Err(Error::new("S0101").at(self.position))
    }

    /// Decode `\uXXXX`, joining a high/low surrogate pair into one code point.
    /// On entry the cursor is on the `u`; on exit it is on the last hex digit.
    fn read_unicode_escape(&mut self) -> Result<char> {
        let unit = self.hex4(self.position + 1)?;
        self.position += 4;
        if (0xD800..0xDC00).contains(&unit) {
            let has_low = self.char_at(self.position + 1) == Some('\\')
                && self.char_at(self.position + 2) == Some('u');
            if has_low {
                let low = self.hex4(self.position + 3)?;
                if (0xDC00..0xE000).contains(&low) {
                    self.position += 6;
                    let code = 0x10000 + ((unit - 0xD800) << 10) + (low - 0xDC00);
                    return char::from_u32(code)
                        .ok_or_else(|| Error::new("S0104").at(self.position));
                }
            }
            return Err(Error::new("S0104").at(self.position));
        }
        char::from_u32(unit).ok_or_else(|| Error::new("S0104").at(self.position))
    }

    fn hex4(&self, from: usize) -> Result<u32> {
        let digits: String = (from..from + 4).filter_map(|i| self.char_at(i)).collect();
        if digits.len() != 4 || !digits.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(Error::new("S0104").at(self.position));
        }
        u32::from_str_radix(&digits, 16).map_err(|_| Error::new("S0104").at(self.position))
    }

    /// `(0|[1-9][0-9]*)(\.[0-9]+)?([Ee][-+]?[0-9]+)?`, backtracking to the
    /// longest prefix that fits the grammar.
    fn read_number(&mut self) -> Result<f64> {
        let start = self.position;
        let mut end = start;
        let digits_from = |lexer: &Self, mut i: usize| {
            while lexer.char_at(i).is_some_and(|c| c.is_ascii_digit()) {
                i += 1;
            }
            i
        };

        if self.char_at(end) == Some('0') {
            end += 1;
        } else {
            end = digits_from(self, end);
        }

        if self.char_at(end) == Some('.') && self.char_at(end + 1).is_some_and(|c| c.is_ascii_digit()) {
            end = digits_from(self, end + 1);
        }

        if matches!(self.char_at(end), Some('e') | Some('E')) {
            let mut exp = end + 1;
            if matches!(self.char_at(exp), Some('+') | Some('-')) {
                exp += 1;
            }
            if self.char_at(exp).is_some_and(|c| c.is_ascii_digit()) {
                end = digits_from(self, exp);
            }
        }

        let text: String = self.input[start..end].iter().collect();
        self.position = end;
        match text.parse::<f64>() {
            Ok(n) if n.is_finite() => Ok(n),
            _ => Err(Error::new("S0102").at(start).token(text)),
        }
    }

    fn read_name(&mut self) -> String {
        let start = self.position;
        while let Some(ch) = self.current() {
            if is_whitespace(ch) || is_operator_char(ch) {
                break;
            }
            self.position += 1;
        }
        self.input[start..self.position].iter().collect()
    }

    fn read_backtick_name(&mut self) -> Result<String> {
        self.position += 1; // opening backtick
        let start = self.position;

        while let Some(ch) = self.current() {
            if ch == '`' {
                let name: String = self.input[start..self.position].iter().collect();
                self.position += 1;
                return Ok(name);
            }
            self.position += 1;
        }

        Err(Error::new("S0105").at(self.position))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(src: &str) -> Vec<TokenKind> {
        let mut lexer = Lexer::new(src);
        let mut out = Vec::new();
        let mut infix = false;
        while let Some(tok) = lexer.next_token(infix).unwrap() {
            infix = !matches!(tok.kind, TokenKind::Operator(_));
            out.push(tok.kind);
        }
        out
    }

    #[test]
    fn test_lexer_names_and_operators() {
        assert_eq!(
            kinds("foo.bar[0]"),
            vec![
                TokenKind::Name("foo".into()),
                TokenKind::Operator("."),
                TokenKind::Name("bar".into()),
                TokenKind::Operator("["),
                TokenKind::Number(0.0),
                TokenKind::Operator("]"),
            ]
        );
    }

    #[test]
    fn test_lexer_double_char_operators_win() {
        assert_eq!(
            kinds("$a := 1..2"),
            vec![
                TokenKind::Variable("a".into()),
                TokenKind::Operator(":="),
                TokenKind::Number(1.0),
                TokenKind::Operator(".."),
                TokenKind::Number(2.0),
            ]
        );
        assert_eq!(kinds("a ?: b")[1], TokenKind::Operator("?:"));
        assert_eq!(kinds("a ?? b")[1], TokenKind::Operator("??"));
        assert_eq!(kinds("a ~> $f")[1], TokenKind::Operator("~>"));
        assert_eq!(kinds("**")[0], TokenKind::Operator("**"));
    }

    #[test]
    fn test_lexer_keywords_and_values() {
        assert_eq!(
            kinds("true and null or x in y"),
            vec![
                TokenKind::Bool(true),
                TokenKind::Operator("and"),
                TokenKind::Null,
                TokenKind::Operator("or"),
                TokenKind::Name("x".into()),
                TokenKind::Operator("in"),
                TokenKind::Name("y".into()),
            ]
        );
    }

    #[test]
    fn test_lexer_variables() {
        assert_eq!(kinds("$")[0], TokenKind::Variable("".into()));
        assert_eq!(kinds("$$")[0], TokenKind::Variable("$".into()));
        assert_eq!(kinds("$total")[0], TokenKind::Variable("total".into()));
    }

    #[test]
    fn test_lexer_strings_and_escapes() {
        assert_eq!(kinds(r#""a\"b\n""#)[0], TokenKind::Str("a\"b\n".into()));
        assert_eq!(kinds("'it'")[0], TokenKind::Str("it".into()));
        assert_eq!(kinds(r#""é""#)[0], TokenKind::Str("é".into()));
        assert_eq!(kinds(r#""😀""#)[0], TokenKind::Str("😀".into()));
    }

    #[test]
    fn test_lexer_string_errors() {
        let err = Lexer::new("\"abc").next_token(false).unwrap_err();
        assert_eq!(err.code(), "S0101");
        let err = Lexer::new(r#""\q""#).next_token(false).unwrap_err();
        assert_eq!(err.code(), "S0103");
        let err = Lexer::new(r#""\u12""#).next_token(false).unwrap_err();
        assert_eq!(err.code(), "S0104");
        let err = Lexer::new(r#""\ud83d""#).next_token(false).unwrap_err();
        assert_eq!(err.code(), "S0104");
    }

    #[test]
    fn test_lexer_numbers() {
        assert_eq!(kinds("42")[0], TokenKind::Number(42.0));
        assert_eq!(kinds("3.25")[0], TokenKind::Number(3.25));
        assert_eq!(kinds("1e3")[0], TokenKind::Number(1000.0));
        assert_eq!(kinds("2.5E-1")[0], TokenKind::Number(0.25));
        let err = Lexer::new("1e999").next_token(false).unwrap_err();
        assert_eq!(err.code(), "S0102");
    }

    #[test]
    fn test_lexer_comments() {
        assert_eq!(kinds("/* note */ a /* more */"), vec![TokenKind::Name("a".into())]);
        let err = Lexer::new("a /* open").next_token(true).and_then(|_| {
            let mut l = Lexer::new("/* open");
            l.next_token(false)
        });
        assert_eq!(err.unwrap_err().code(), "S0106");
    }

    #[test]
    fn test_lexer_regex_only_in_operand_position() {
        let mut lexer = Lexer::new("/ab+c/i");
        let tok = lexer.next_token(false).unwrap().unwrap();
        assert_eq!(
            tok.kind,
            TokenKind::Regex {
                pattern: "ab+c".into(),
                flags: "i".into()
            }
        );

        assert_eq!(
            kinds("a / b"),
            vec![
                TokenKind::Name("a".into()),
                TokenKind::Operator("/"),
                TokenKind::Name("b".into()),
            ]
        );
    }

    #[test]
    fn test_lexer_regex_closing_slash_rules() {
        let mut lexer = Lexer::new(r"/a\/b[/]c/");
        let tok = lexer.next_token(false).unwrap().unwrap();
        assert_eq!(
            tok.kind,
            TokenKind::Regex {
                pattern: r"a\/b[/]c".into(),
                flags: "".into()
            }
        );
        assert_eq!(Lexer::new("//").next_token(false).unwrap_err().code(), "S0301");
        assert_eq!(Lexer::new("/abc").next_token(false).unwrap_err().code(), "S0302");
    }

    #[test]
    fn test_lexer_backtick_names() {
        assert_eq!(kinds("`first name`")[0], TokenKind::Name("first name".into()));
        assert_eq!(Lexer::new("`open").next_token(false).unwrap_err().code(), "S0105");
    }

    #[test]
    fn test_lexer_positions_are_code_points() {
        let mut lexer = Lexer::new("\"é\" & x");
        let first = lexer.next_token(false).unwrap().unwrap();
        assert_eq!(first.position, 3);
        let amp = lexer.next_token(true).unwrap().unwrap();
        assert_eq!(amp.position, 5);
    }

    #[test]
    fn test_binding_power_table() {
        assert_eq!(binding_power("."), Some(75));
        assert_eq!(binding_power(":="), Some(10));
        assert_eq!(binding_power("or"), Some(25));
        assert_eq!(binding_power("and"), Some(30));
        assert_eq!(binding_power("*"), Some(60));
        assert_eq!(binding_power("nope"), None);
    }
}

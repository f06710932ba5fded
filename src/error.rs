// Typed errors shared by the lexer, parser, normalizer and evaluator

use std::fmt;

use thiserror::Error;

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// The fields every error carries, regardless of family.
///
/// `position` is a code-point offset into the source expression, pointing just
/// past the offending token. `token` is the operator or name involved, `value`
/// the offending value rendered as JSON, and `expected` the token the parser
/// was waiting for.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ErrorDetails {
    pub code: &'static str,
    pub position: Option<usize>,
    pub token: Option<String>,
    pub value: Option<String>,
    pub expected: Option<String>,
    pub index: Option<usize>,
}

/// Errors raised while compiling or evaluating an expression.
///
/// The variant is derived from the first letter of the code:
/// `S` syntax, `T` type, `D` dynamic, `U` guard (depth or timeout).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    #[error("{0}")]
    Syntax(ErrorDetails),

    #[error("{0}")]
    Type(ErrorDetails),

    #[error("{0}")]
    Dynamic(ErrorDetails),

    #[error("{0}")]
    Guard(ErrorDetails),
}

impl Error {
    pub fn new(code: &'static str) -> Self {
        let details = ErrorDetails {
            code,
            ..ErrorDetails::default()
        };
        match code.as_bytes().first() {
            Some(b'S') => Error::Syntax(details),
            Some(b'T') => Error::Type(details),
            Some(b'U') => Error::Guard(details),
            _ => Error::Dynamic(details),
        }
    }

    pub fn details(&self) -> &ErrorDetails {
        match self {
            Error::Syntax(d) | Error::Type(d) | Error::Dynamic(d) | Error::Guard(d) => d,
        }
    }

    fn details_mut(&mut self) -> &mut ErrorDetails {
        match self {
            Error::Syntax(d) | Error::Type(d) | Error::Dynamic(d) | Error::Guard(d) => d,
        }
    }

    pub fn code(&self) -> &'static str {
        self.details().code
    }

    pub fn position(&self) -> Option<usize> {
        self.details().position
    }

    pub fn is_syntax(&self) -> bool {
        matches!(self, Error::Syntax(_))
    }

    pub fn is_guard(&self) -> bool {
        matches!(self, Error::Guard(_))
    }

    pub fn at(mut self, position: usize) -> Self {
        self.details_mut().position = Some(position);
        self
    }

    pub fn token(mut self, token: impl Into<String>) -> Self {
        self.details_mut().token = Some(token.into());
        self
    }

    pub fn value(mut self, value: impl fmt::Display) -> Self {
        self.details_mut().value = Some(value.to_string());
        self
    }

    pub fn expected(mut self, expected: impl Into<String>) -> Self {
        self.details_mut().expected = Some(expected.into());
        self
    }

    pub fn index(mut self, index: usize) -> Self {
        self.details_mut().index = Some(index);
        self
    }

    /// Fill in the position only if an inner frame did not already set one.
    pub fn or_at(mut self, position: usize) -> Self {
        let d = self.details_mut();
        if d.position.is_none() {
            d.position = Some(position);
        }
        self
    }

    /// Fill in the token only if an inner frame did not already set one.
    pub fn or_token(mut self, token: &str) -> Self {
        let d = self.details_mut();
        if d.token.is_none() {
            d.token = Some(token.to_string());
        }
        self
    }
}

impl fmt::Display for ErrorDetails {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code, self.message())?;
        if let Some(position) = self.position {
            write!(f, " (position {})", position)?;
        }
        Ok(())
    }
}

impl ErrorDetails {
    /// Render the catalog message for this code with the details substituted.
    pub fn message(&self) -> String {
        let template = message_template(self.code);
        let mut out = String::with_capacity(template.len() + 16);
        let mut rest = template;
        while let Some(start) = rest.find("{{") {
            out.push_str(&rest[..start]);
            let after = &rest[start + 2..];
            match after.find("}}") {
                Some(end) => {
                    let field = match &after[..end] {
                        "token" => self.token.clone(),
                        "value" => self.value.clone(),
                        "expected" => self.expected.clone(),
                        "index" => self.index.map(|i| i.to_string()),
                        _ => None,
                    };
                    out.push_str(field.as_deref().unwrap_or(""));
                    rest = &after[end + 2..];
                }
                None => {
                    out.push_str(&rest[start..]);
                    rest = "";
                }
            }
        }
        out.push_str(rest);
        out
    }
}

fn message_template(code: &str) -> &'static str {
    match code {
        "S0101" => "String literal must be terminated by a matching quote",
        "S0102" => "Number out of range: {{token}}",
        "S0103" => "Unsupported escape sequence: \\{{token}}",
        "S0104" => "The escape sequence \\u must be followed by 4 hex digits forming a valid code point",
        "S0105" => "Quoted property name must be terminated with a backquote (`)",
        "S0106" => "Comment has no closing tag",
        "S0201" => "Syntax error: {{token}}",
        "S0202" => "Expected {{expected}}, got {{token}}",
        "S0203" => "Expected {{expected}} before end of expression",
        "S0204" => "Unknown operator: {{token}}",
        "S0205" => "Unexpected token: {{token}}",
        "S0206" => "Unknown expression type: {{token}}",
        "S0207" => "Unexpected end of expression",
        "S0208" => "Parameter {{index}} of function definition must be a variable name (start with $)",
        "S0209" => "A predicate cannot follow a grouping expression in a step",
        "S0210" => "Each step can only have one grouping expression",
        "S0211" => "The symbol {{token}} cannot be used as a unary operator",
        "S0212" => "The left side of := must be a variable name (start with $)",
        "S0213" => "The literal value {{value}} cannot be used as a step within a path expression",
        "S0214" => "The right side of {{token}} must be a variable name (start with $)",
        "S0215" => "A context variable binding must precede any predicates on a step",
        "S0216" => "A context variable binding must precede the 'order-by' clause on a step",
        "S0217" => "The object representing the 'parent' cannot be derived from this expression",
        "S0301" => "Empty regular expressions are not allowed",
        "S0302" => "No terminating / in regular expression",
        "S0303" => "Invalid regular expression: {{value}}",
        "S0401" => "Type parameters can only be applied to functions and arrays",
        "S0402" => "Choice groups containing parameterized types are not supported",
        "S0403" => "Invalid function signature: {{value}}",
        "S0500" => "Attempted to evaluate an expression containing syntax error(s)",
        "T0410" => "Argument {{index}} of function {{token}} does not match function signature",
        "T0411" => "Context value is not a compatible type with argument {{index}} of function {{token}}",
        "T0412" => "Argument {{index}} of function {{token}} must be an array of {{expected}}",
        "T1003" => "Key in object structure must evaluate to a string; got: {{value}}",
        "T1005" => "Attempted to invoke a non-function. Did you mean ${{token}}?",
        "T1006" => "Attempted to invoke a non-function",
        "T1007" => "Attempted to partially apply a non-function. Did you mean ${{token}}?",
        "T1008" => "Attempted to partially apply a non-function",
        "T2001" => "The left side of the {{token}} operator must evaluate to a number",
        "T2002" => "The right side of the {{token}} operator must evaluate to a number",
        "T2003" => "The left side of the range operator (..) must evaluate to an integer",
        "T2004" => "The right side of the range operator (..) must evaluate to an integer",
        "T2006" => "The right side of the function application operator ~> must be a function",
        "T2007" => "Type mismatch when comparing values {{value}} and {{expected}} in order-by clause",
        "T2008" => "The expressions within an order-by clause must evaluate to numeric or string values",
        "T2009" => "The values {{value}} and {{expected}} either side of operator {{token}} must be of the same data type",
        "T2010" => "The expressions either side of operator {{token}} must evaluate to numeric or string values",
        "T2011" => "The insert/update clause of the transform expression must evaluate to an object: {{value}}",
        "T2012" => "The delete clause of the transform expression must evaluate to a string or array of strings: {{value}}",
        "D1001" => "Number out of range: {{value}}",
        "D1002" => "Cannot negate a non-numeric value: {{value}}",
        "D1009" => "Multiple key definitions evaluate to same key: {{value}}",
        "D2014" => "The size of the sequence allocated by the range operator (..) must not exceed 1e6. Attempted to allocate {{value}}",
        "D3001" => "Attempting to invoke string function on Infinity or NaN",
        "D3030" => "Unable to cast value to a number: {{value}}",
        "D3050" => "The second argument of reduce function must be a function with at least two arguments",
        "D3100" => "Input JSON could not be parsed: {{value}}",
        "U1001" => "Stack overflow error: check for non-terminating recursive function, or rewrite it as tail-recursive",
        "U1002" => "Expression evaluation timeout: check for infinite loop",
        _ => "Unknown error",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_family_from_code() {
        assert!(matches!(Error::new("S0201"), Error::Syntax(_)));
        assert!(matches!(Error::new("T2001"), Error::Type(_)));
        assert!(matches!(Error::new("D1009"), Error::Dynamic(_)));
        assert!(matches!(Error::new("U1001"), Error::Guard(_)));
    }

    #[test]
    fn test_message_substitution() {
        let err = Error::new("S0202").at(7).token("]").expected(")");
        assert_eq!(err.to_string(), "S0202: Expected ), got ] (position 7)");
    }

    #[test]
    fn test_or_at_keeps_inner_position() {
        let err = Error::new("T2001").at(3).or_at(10).or_token("+");
        assert_eq!(err.position(), Some(3));
        assert_eq!(err.details().token.as_deref(), Some("+"));
    }
}

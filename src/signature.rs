// Function signature parsing and argument validation
//
// A signature such as `<s-n?:s>` lists one type symbol per parameter,
// optionally followed by a modifier. Validation renders the supplied
// arguments as a string of type symbols and matches it against a regex
// assembled from the parameters.

use regex::Regex;

use crate::error::{Error, Result};
use crate::value::JValue;

/// One declared parameter.
#[derive(Debug, Clone)]
pub struct Parameter {
    /// Type symbol (`s`, `n`, `a`, ...) or a `(..)` choice group.
    pub param_type: String,
    /// Regex fragment matching the argument symbols this parameter accepts.
    pattern: String,
    /// `-` modifier: take the focus value when the argument is omitted.
    pub context: bool,
    context_regex: Option<Regex>,
    /// Array element type from `a<n>`; function subtypes are parsed and ignored.
    pub subtype: Option<String>,
}

impl Parameter {
    fn new(param_type: impl Into<String>, pattern: impl Into<String>) -> Self {
        Parameter {
            param_type: param_type.into(),
            pattern: pattern.into(),
            context: false,
            context_regex: None,
            subtype: None,
        }
    }

    pub fn is_array(&self) -> bool {
        self.param_type == "a"
    }
}

/// A parsed function signature
#[derive(Debug, Clone)]
pub struct Signature {
    pub params: Vec<Parameter>,
    source: String,
    matcher: Regex,
}

/// Type symbol of a runtime value; `m` stands for a missing argument.
fn symbol(value: &JValue) -> char {
    match value {
        JValue::Function(_) | JValue::Regex(_) => 'f',
        JValue::String(_) => 's',
        JValue::Number(_) => 'n',
        JValue::Bool(_) => 'b',
        JValue::Null => 'l',
        JValue::Array(..) => 'a',
        JValue::Object(_) | JValue::Tuple(_) => 'o',
        JValue::Undefined => 'm',
    }
}

fn closing_bracket(chars: &[char], start: usize, open: char, close: char) -> Option<usize> {
    let mut depth = 1;
    let mut position = start;
    while position + 1 < chars.len() {
        position += 1;
        let ch = chars[position];
        if ch == close {
            depth -= 1;
            if depth == 0 {
                return Some(position);
            }
        } else if ch == open {
            depth += 1;
        }
    }
    None
}

fn compile(pattern: &str, source: &str) -> Result<Regex> {
    Regex::new(pattern).map_err(|_| Error::new("S0403").value(source))
}

impl Signature {
    /// Parse a signature including its angle brackets, e.g. `<n-n:n>`.
    pub fn parse(source: &str) -> Result<Self> {
        let chars: Vec<char> = source.chars().collect();
        let mut params: Vec<Parameter> = Vec::new();
        let mut position = 1;

        while position < chars.len() {
            let ch = chars[position];
            if ch == ':' {
                // return type is not checked
                break;
            }
            match ch {
                's' | 'n' | 'b' | 'l' | 'o' => {
                    params.push(Parameter::new(ch, format!("[{}m]", ch)));
                }
                'a' => params.push(Parameter::new('a', "[asnblfom]")),
                'f' => params.push(Parameter::new('f', "f")),
                'j' => params.push(Parameter::new('j', "[asnblom]")),
                'x' => params.push(Parameter::new('x', "[asnblfom]")),
                'u' => params.push(Parameter::new('u', "[snblm]")),
                '-' => {
                    let prev = last_param(&mut params, source, position)?;
                    prev.context = true;
                    prev.context_regex = Some(compile(&format!("^{}$", prev.pattern), source)?);
                    prev.pattern.push('?');
                }
                '?' | '+' => {
                    let prev = last_param(&mut params, source, position)?;
                    prev.pattern.push(ch);
                }
                '(' => {
                    let end = closing_bracket(&chars, position, '(', ')')
                        .ok_or_else(|| Error::new("S0403").value(source))?;
                    let choice: String = chars[position + 1..end].iter().collect();
                    if choice.contains('<') {
                        return Err(Error::new("S0402").value(source).at(position));
                    }
                    params.push(Parameter::new(format!("({})", choice), format!("[{}m]", choice)));
                    position = end;
                }
                '<' => {
                    let prev = last_param(&mut params, source, position)?;
                    if prev.param_type != "a" && prev.param_type != "f" {
                        return Err(Error::new("S0401").value(source).at(position));
                    }
                    let end = closing_bracket(&chars, position, '<', '>')
                        .ok_or_else(|| Error::new("S0403").value(source))?;
                    prev.subtype = Some(chars[position + 1..end].iter().collect());
                    position = end;
                }
                _ => {}
            }
            position += 1;
        }

        let pattern = params
            .iter()
            .map(|p| format!("({})", p.pattern))
            .collect::<String>();
        let matcher = compile(&format!("^{}$", pattern), source)?;

        Ok(Signature {
            params,
            source: source.to_string(),
            matcher,
        })
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    /// Number of declared parameters.
    pub fn arity(&self) -> usize {
        self.params.len()
    }

    /// Check `args` against the signature and return the argument list the
    /// function should receive.
    ///
    /// Omitted `-` parameters are filled from `context`. Non-array values
    /// passed to an array parameter with a subtype are wrapped in an array.
    pub fn validate(&self, args: &[JValue], context: &JValue, name: &str) -> Result<Vec<JValue>> {
        let supplied: String = args.iter().map(symbol).collect();
        let captures = match self.matcher.captures(&supplied) {
            Some(c) => c,
            None => return Err(self.validation_error(args, &supplied, name)),
        };

        let mut validated = Vec::with_capacity(self.params.len());
        let mut arg_index = 0;
        for (index, param) in self.params.iter().enumerate() {
            let matched = captures.get(index + 1).map(|m| m.as_str()).unwrap_or("");
            if matched.is_empty() {
                match (&param.context_regex, param.context) {
                    (Some(context_regex), true) => {
                        let context_symbol = symbol(context).to_string();
                        if context_regex.is_match(&context_symbol) {
                            validated.push(context.clone());
                        } else {
                            return Err(named(Error::new("T0411"), name)
                                .index(arg_index + 1)
                                .value(context));
                        }
                    }
                    _ => {
                        validated.push(args.get(arg_index).cloned().unwrap_or_default());
                        arg_index += 1;
                    }
                }
                continue;
            }

            for single in matched.chars() {
                let arg = args.get(arg_index).cloned().unwrap_or_default();
                if param.is_array() && single != 'm' {
                    validated.push(self.check_array(param, single, matched, arg, arg_index, name)?);
                } else if param.is_array() {
                    validated.push(JValue::Undefined);
                } else {
                    validated.push(arg);
                }
                arg_index += 1;
            }
        }
        Ok(validated)
    }

    fn check_array(
        &self,
        param: &Parameter,
        single: char,
        matched: &str,
        arg: JValue,
        arg_index: usize,
        name: &str,
    ) -> Result<JValue> {
        let subtype = match &param.subtype {
            Some(s) => s,
            None => return Ok(arg),
        };
        let ok = if single != 'a' {
            matched == subtype
        } else {
            match arg.as_array() {
                Some(items) if !items.is_empty() => {
                    let first = symbol(&items[0]);
                    subtype.starts_with(first) && items.iter().all(|v| symbol(v) == first)
                }
                _ => true,
            }
        };
        if !ok {
            return Err(named(Error::new("T0412"), name)
                .index(arg_index + 1)
                .value(&arg)
                .expected(array_type_name(subtype)));
        }
        if single == 'a' {
            Ok(arg)
        } else {
            Ok(JValue::array(vec![arg]))
        }
    }

    /// Locate the first argument that stops matching and report it.
    fn validation_error(&self, args: &[JValue], supplied: &str, name: &str) -> Error {
        let mut partial = String::from("^");
        let mut good_to = 0;
        for param in &self.params {
            partial.push('(');
            partial.push_str(&param.pattern);
            partial.push(')');
            match Regex::new(&partial).ok().and_then(|re| re.find(supplied)) {
                Some(m) => good_to = m.end(),
                None => break,
            }
        }
        let mut err = named(Error::new("T0410"), name).index(good_to + 1);
        if let Some(arg) = args.get(good_to) {
            err = err.value(arg);
        }
        err
    }
}

/// Attach the function name when the caller knows it; otherwise the call
/// site fills it in.
fn named(err: Error, name: &str) -> Error {
    if name.is_empty() {
        err
    } else {
        err.token(name)
    }
}

fn last_param<'a>(params: &'a mut [Parameter], source: &str, position: usize) -> Result<&'a mut Parameter> {
    params
        .last_mut()
        .ok_or_else(|| Error::new("S0403").value(source).at(position))
}

fn array_type_name(subtype: &str) -> &'static str {
    match subtype {
        "a" => "arrays",
        "b" => "booleans",
        "f" => "functions",
        "n" => "numbers",
        "o" => "objects",
        "s" => "strings",
        _ => "values",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jvalue;

    #[test]
    fn test_parse_params_and_modifiers() {
        let sig = Signature::parse("<s-n?:s>").unwrap();
        assert_eq!(sig.arity(), 2);
        assert!(sig.params[0].context);
        assert_eq!(sig.params[1].param_type, "n");
        assert_eq!(sig.source(), "<s-n?:s>");
    }

    #[test]
    fn test_context_substitution() {
        let sig = Signature::parse("<s-:s>").unwrap();
        let args = sig.validate(&[], &jvalue!("focus"), "uppercase").unwrap();
        assert_eq!(args, vec![jvalue!("focus")]);

        let err = sig.validate(&[], &jvalue!({"a": 1}), "uppercase").unwrap_err();
        assert_eq!(err.code(), "T0411");
    }

    #[test]
    fn test_missing_argument_matches_simple_types() {
        let sig = Signature::parse("<s-:s>").unwrap();
        let args = sig.validate(&[JValue::Undefined], &JValue::Null, "uppercase").unwrap();
        assert_eq!(args, vec![JValue::Undefined]);
    }

    #[test]
    fn test_mismatch_reports_argument_index() {
        let sig = Signature::parse("<sn:s>").unwrap();
        let err = sig
            .validate(&[jvalue!("x"), jvalue!("y")], &JValue::Undefined, "substring")
            .unwrap_err();
        assert_eq!(err.code(), "T0410");
        assert_eq!(err.details().index, Some(2));
    }

    #[test]
    fn test_array_subtype() {
        let sig = Signature::parse("<a<n>:n>").unwrap();
        let args = sig.validate(&[jvalue!(5)], &JValue::Undefined, "sum").unwrap();
        assert_eq!(args, vec![jvalue!([5])]);

        let err = sig
            .validate(&[jvalue!([1, "two"])], &JValue::Undefined, "sum")
            .unwrap_err();
        assert_eq!(err.code(), "T0412");
    }

    #[test]
    fn test_one_or_more() {
        let sig = Signature::parse("<s+:s>").unwrap();
        let args = sig
            .validate(&[jvalue!("a"), jvalue!("b")], &JValue::Undefined, "concat")
            .unwrap();
        assert_eq!(args.len(), 2);
    }

    #[test]
    fn test_signature_syntax_errors() {
        assert_eq!(Signature::parse("<n<s>>").unwrap_err().code(), "S0401");
        assert_eq!(Signature::parse("<(sa<n>)>").unwrap_err().code(), "S0402");
    }

    #[test]
    fn test_function_subtype_is_accepted() {
        let sig = Signature::parse("<af<x:b>:a>").unwrap();
        assert_eq!(sig.arity(), 2);
        assert_eq!(sig.params[1].subtype.as_deref(), Some("x:b"));
    }
}

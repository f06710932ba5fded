// Built-in function implementations
//
// Each native is registered with a signature; arguments reach the
// implementation already validated, with omitted context arguments filled
// in from the focus value.

use std::sync::Arc;

use tracing::warn;

use crate::callable::{Callable, Invocation, NativeFunction};
use crate::datetime;
use crate::environment::Environment;
use crate::error::Result;
use crate::signature::Signature;
use crate::value::JValue;

fn arg(args: &[JValue], index: usize) -> JValue {
    args.get(index).cloned().unwrap_or_default()
}

/// Built-in string functions
pub mod string {
    use super::*;
    use crate::error::Error;
    use crate::sequence;
    use crate::value::format_number;

    /// $string() - Cast value to string
    pub fn string(value: &JValue, prettify: bool) -> Result<JValue> {
        match value {
            JValue::Undefined => Ok(JValue::Undefined),
            JValue::String(_) => Ok(value.clone()),
            JValue::Number(n) if !n.is_finite() => Err(Error::new("D3001").value(format_number(*n))),
            _ if prettify => value
                .to_json_string_pretty()
                .map(JValue::from)
                .map_err(|e| Error::new("D3001").value(e)),
            _ => Ok(JValue::from(sequence::stringify(value)?)),
        }
    }

    /// $length() - Number of characters
    pub fn length(value: &JValue) -> JValue {
        match value.as_str() {
            Some(s) => JValue::from(s.chars().count()),
            None => JValue::Undefined,
        }
    }

    /// $substring() - Characters from `start` (negative counts from the
    /// end), optionally limited to `length` characters.
    pub fn substring(value: &JValue, start: &JValue, length: &JValue) -> JValue {
        let Some(s) = value.as_str() else {
            return JValue::Undefined;
        };
        let chars: Vec<char> = s.chars().collect();
        let len = chars.len() as i64;
        let mut start = start.as_f64().unwrap_or(0.0) as i64;
        if len + start < 0 {
            start = 0;
        }
        let begin = if start < 0 { len + start } else { start.min(len) };
        let end = match length.as_f64() {
            Some(count) if count <= 0.0 => return JValue::from(""),
            Some(count) => (begin + count as i64).min(len),
            None => len,
        };
        if begin >= end {
            return JValue::from("");
        }
        JValue::from(chars[begin as usize..end as usize].iter().collect::<String>())
    }

    /// $uppercase() - Convert to uppercase
    pub fn uppercase(value: &JValue) -> JValue {
        match value.as_str() {
            Some(s) => JValue::from(s.to_uppercase()),
            None => JValue::Undefined,
        }
    }

    /// $lowercase() - Convert to lowercase
    pub fn lowercase(value: &JValue) -> JValue {
        match value.as_str() {
            Some(s) => JValue::from(s.to_lowercase()),
            None => JValue::Undefined,
        }
    }

    pub fn join(strings: &JValue, separator: &JValue) -> JValue {
        if strings.is_undefined() {
            return JValue::Undefined;
        }
        let separator = separator.as_str().unwrap_or("");
        let parts: Vec<&str> = sequence::items(strings).iter().filter_map(JValue::as_str).collect();
        JValue::from(parts.join(separator))
    }

    /// $contains() - Substring or regex match
    pub fn contains(value: &JValue, pattern: &JValue) -> JValue {
        let Some(s) = value.as_str() else {
            return JValue::Undefined;
        };
        match pattern {
            JValue::String(p) => JValue::Bool(s.contains(&**p)),
            JValue::Regex(re) => JValue::Bool(re.is_match(s)),
            _ => JValue::Bool(false),
        }
    }
}

/// Built-in numeric functions
pub mod numeric {
    use super::*;
    use crate::error::Error;
    use crate::sequence;

    /// $number() - Cast value to number
    pub fn number(value: &JValue) -> Result<JValue> {
        match value {
            JValue::Undefined => Ok(JValue::Undefined),
            JValue::Number(_) => Ok(value.clone()),
            JValue::Bool(b) => Ok(JValue::from(if *b { 1i64 } else { 0i64 })),
            JValue::String(s) => parse_number(s)
                .map(JValue::Number)
                .ok_or_else(|| Error::new("D3030").value(value)),
            other => Err(Error::new("D3030").value(other)),
        }
    }

    /// JSON number syntax, plus `0x`, `0o` and `0b` integer prefixes.
    fn parse_number(s: &str) -> Option<f64> {
        let radix = |prefix: &str, base: u32| {
            s.strip_prefix(prefix)
                .and_then(|digits| i64::from_str_radix(digits, base).ok())
                .map(|n| n as f64)
        };
        if let Some(n) = radix("0x", 16).or_else(|| radix("0o", 8)).or_else(|| radix("0b", 2)) {
            return Some(n);
        }
        match serde_json::from_str::<serde_json::Value>(s.trim()) {
            Ok(serde_json::Value::Number(n)) => n.as_f64().filter(|n| n.is_finite()),
            _ => None,
        }
    }

    fn numbers(values: &JValue) -> impl Iterator<Item = f64> + '_ {
        sequence::items(values).iter().filter_map(JValue::as_f64)
    }

    /// $sum() - Sum array of numbers
    pub fn sum(values: &JValue) -> JValue {
        if values.is_undefined() {
            return JValue::Undefined;
        }
        JValue::Number(numbers(values).sum())
    }

    pub fn max(values: &JValue) -> JValue {
        numbers(values).reduce(f64::max).map(JValue::Number).unwrap_or_default()
    }

    pub fn min(values: &JValue) -> JValue {
        numbers(values).reduce(f64::min).map(JValue::Number).unwrap_or_default()
    }

    pub fn average(values: &JValue) -> JValue {
        let (total, count) = numbers(values).fold((0.0, 0usize), |(t, c), n| (t + n, c + 1));
        if count == 0 {
            return JValue::Undefined;
        }
        JValue::Number(total / count as f64)
    }
}

/// Built-in array functions
pub mod array {
    use super::*;
    use crate::sequence;

    /// $count() - Count array elements
    pub fn count(values: &JValue) -> JValue {
        JValue::from(sequence::items(values).len())
    }

    /// $append() - Concatenate two values as arrays
    pub fn append(a: &JValue, b: &JValue) -> JValue {
        sequence::append(a.clone(), b.clone())
    }

    pub fn reverse(values: &JValue) -> JValue {
        match values {
            JValue::Array(items, _) if items.len() > 1 => {
                JValue::array(items.iter().rev().cloned().collect())
            }
            other => other.clone(),
        }
    }
}

/// Built-in object functions
pub mod object {
    use super::*;
    use indexmap::IndexSet;

    /// $keys() - Keys of an object, or the union of keys over an array of objects
    pub fn keys(value: &JValue) -> JValue {
        let mut keys: IndexSet<&str> = IndexSet::new();
        match value {
            JValue::Object(map) => keys.extend(map.keys().map(String::as_str)),
            JValue::Array(items, _) => {
                for item in items.iter() {
                    if let Some(map) = item.as_object() {
                        keys.extend(map.keys().map(String::as_str));
                    }
                }
            }
            _ => {}
        }
        JValue::sequence(keys.into_iter().map(JValue::from).collect())
    }

    /// $lookup() - Value of `key`, mapped over arrays
    pub fn lookup(value: &JValue, key: &str) -> JValue {
        match value {
            JValue::Array(items, _) => {
                let mut results = Vec::new();
                for item in items.iter() {
                    match lookup(item, key) {
                        JValue::Undefined => {}
                        JValue::Array(inner, _) => results.extend(inner.iter().cloned()),
                        other => results.push(other),
                    }
                }
                JValue::sequence(results)
            }
            JValue::Object(map) => map.get(key).cloned().unwrap_or_default(),
            _ => JValue::Undefined,
        }
    }
}

/// Built-in boolean functions
pub mod boolean {
    use super::*;
    use crate::sequence;

    pub fn boolean(value: &JValue) -> JValue {
        sequence::boolean(value).map(JValue::Bool).unwrap_or_default()
    }

    pub fn not(value: &JValue) -> JValue {
        sequence::boolean(value).map(|b| JValue::Bool(!b)).unwrap_or_default()
    }

    pub fn exists(value: &JValue) -> JValue {
        JValue::Bool(!value.is_undefined())
    }
}

/// Functions that call back into the evaluator
pub mod higher_order {
    use super::*;
    use crate::error::Error;
    use crate::sequence;

    fn arity(function: &JValue) -> usize {
        function.as_function().map(|f| f.arity()).unwrap_or(1)
    }

    /// Arguments for a per-member callback: the member, then its index and
    /// the whole array if the function declares room for them.
    fn member_args(function: &JValue, item: &JValue, index: usize, all: &JValue) -> Vec<JValue> {
        let arity = arity(function);
        let mut args = vec![item.clone()];
        if arity >= 2 {
            args.push(JValue::from(index));
        }
        if arity >= 3 {
            args.push(all.clone());
        }
        args
    }

    pub fn map(values: &JValue, function: &JValue, inv: &mut Invocation<'_>) -> Result<JValue> {
        if values.is_undefined() {
            return Ok(JValue::Undefined);
        }
        let mut results = Vec::new();
        for (index, item) in sequence::items(values).iter().enumerate() {
            let result = inv.apply(function, &member_args(function, item, index, values))?;
            if !result.is_undefined() {
                results.push(result);
            }
        }
        Ok(JValue::sequence(results))
    }

    pub fn filter(values: &JValue, function: &JValue, inv: &mut Invocation<'_>) -> Result<JValue> {
        if values.is_undefined() {
            return Ok(JValue::Undefined);
        }
        let mut results = Vec::new();
        for (index, item) in sequence::items(values).iter().enumerate() {
            let keep = inv.apply(function, &member_args(function, item, index, values))?;
            if sequence::truthy(&keep) {
                results.push(item.clone());
            }
        }
        Ok(JValue::sequence(results))
    }

    /// $reduce() - Fold left; without `init` the first member seeds the
    /// accumulator.
    pub fn reduce(values: &JValue, function: &JValue, init: &JValue, inv: &mut Invocation<'_>) -> Result<JValue> {
        if values.is_undefined() {
            return Ok(JValue::Undefined);
        }
        let arity = arity(function);
        if arity < 2 {
            return Err(Error::new("D3050").index(1));
        }
        let items = sequence::items(values);
        let (mut accumulator, start) = match (init, items.first()) {
            (JValue::Undefined, Some(first)) => (first.clone(), 1),
            _ => (init.clone(), 0),
        };
        for (index, item) in items.iter().enumerate().skip(start) {
            let mut args = vec![accumulator, item.clone()];
            if arity >= 3 {
                args.push(JValue::from(index));
            }
            if arity >= 4 {
                args.push(values.clone());
            }
            accumulator = inv.apply(function, &args)?;
        }
        Ok(accumulator)
    }
}

type Implementation = fn(&[JValue], &mut Invocation<'_>) -> Result<JValue>;

/// The built-in catalog: name, signature and implementation.
const NATIVES: &[(&str, &str, Implementation)] = &[
    ("sum", "<a<n>:n>", |args, _| Ok(numeric::sum(&arg(args, 0)))),
    ("count", "<a:n>", |args, _| Ok(array::count(&arg(args, 0)))),
    ("max", "<a<n>:n>", |args, _| Ok(numeric::max(&arg(args, 0)))),
    ("min", "<a<n>:n>", |args, _| Ok(numeric::min(&arg(args, 0)))),
    ("average", "<a<n>:n>", |args, _| Ok(numeric::average(&arg(args, 0)))),
    ("string", "<x-b?:s>", |args, _| {
        let prettify = arg(args, 1).as_bool().unwrap_or(false);
        string::string(&arg(args, 0), prettify)
    }),
    ("length", "<s-:n>", |args, _| Ok(string::length(&arg(args, 0)))),
    ("substring", "<s-nn?:s>", |args, _| {
        Ok(string::substring(&arg(args, 0), &arg(args, 1), &arg(args, 2)))
    }),
    ("uppercase", "<s-:s>", |args, _| Ok(string::uppercase(&arg(args, 0)))),
    ("lowercase", "<s-:s>", |args, _| Ok(string::lowercase(&arg(args, 0)))),
    ("join", "<a<s>s?:s>", |args, _| Ok(string::join(&arg(args, 0), &arg(args, 1)))),
    ("contains", "<s-(sf):b>", |args, _| Ok(string::contains(&arg(args, 0), &arg(args, 1)))),
    ("append", "<xx:a>", |args, _| Ok(array::append(&arg(args, 0), &arg(args, 1)))),
    ("reverse", "<a:a>", |args, _| Ok(array::reverse(&arg(args, 0)))),
    ("keys", "<x-:a<s>>", |args, _| Ok(object::keys(&arg(args, 0)))),
    ("lookup", "<x-s:x>", |args, _| {
        let key = arg(args, 1);
        Ok(object::lookup(&arg(args, 0), key.as_str().unwrap_or_default()))
    }),
    ("exists", "<x:b>", |args, _| Ok(boolean::exists(&arg(args, 0)))),
    ("not", "<x-:b>", |args, _| Ok(boolean::not(&arg(args, 0)))),
    ("boolean", "<x-:b>", |args, _| Ok(boolean::boolean(&arg(args, 0)))),
    ("number", "<(nsb)-:n>", |args, _| numeric::number(&arg(args, 0))),
    ("map", "<af>", |args, inv| higher_order::map(&arg(args, 0), &arg(args, 1), inv)),
    ("filter", "<af>", |args, inv| higher_order::filter(&arg(args, 0), &arg(args, 1), inv)),
    ("reduce", "<afj?:j>", |args, inv| {
        higher_order::reduce(&arg(args, 0), &arg(args, 1), &arg(args, 2), inv)
    }),
    ("now", "<s?s?:s>", |_, inv| Ok(datetime::now(inv.now()))),
    ("millis", "<:n>", |_, inv| Ok(datetime::millis(inv.now()))),
];

/// A root frame holding every built-in function, bound under its name
/// without the leading `$`.
pub fn base_environment() -> Environment {
    let env = Environment::new();
    for &(name, signature, implementation) in NATIVES {
        let signature = match Signature::parse(signature) {
            Ok(signature) => Some(signature),
            Err(err) => {
                warn!(name, %err, "Skipping signature of built-in function");
                None
            }
        };
        bind_native(&env, NativeFunction::new(name, signature, implementation));
    }
    env
}

/// Bind a native in `env` under its own name.
pub(crate) fn bind_native(env: &Environment, native: NativeFunction) {
    let name = native.name.clone();
    env.bind(name, JValue::function(Callable::Native(Arc::new(native))));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jvalue;

    #[test]
    fn test_string_functions() {
        assert_eq!(string::uppercase(&jvalue!("hello")), jvalue!("HELLO"));
        assert_eq!(string::lowercase(&jvalue!("HELLO")), jvalue!("hello"));
        assert_eq!(string::length(&jvalue!("héllo")), jvalue!(5i64));
        assert!(string::length(&JValue::Undefined).is_undefined());
    }

    #[test]
    fn test_substring() {
        let s = jvalue!("hello world");
        assert_eq!(string::substring(&s, &jvalue!(6i64), &JValue::Undefined), jvalue!("world"));
        assert_eq!(string::substring(&s, &jvalue!(0i64), &jvalue!(5i64)), jvalue!("hello"));
        assert_eq!(string::substring(&s, &jvalue!(-5i64), &jvalue!(2i64)), jvalue!("wo"));
        assert_eq!(string::substring(&s, &jvalue!(-20i64), &jvalue!(2i64)), jvalue!("he"));
        assert_eq!(string::substring(&s, &jvalue!(3i64), &jvalue!(-1i64)), jvalue!(""));
    }

    #[test]
    fn test_string_cast() {
        assert_eq!(string::string(&jvalue!(1.5), false).unwrap(), jvalue!("1.5"));
        assert_eq!(string::string(&jvalue!([1i64, "a"]), false).unwrap(), jvalue!(r#"[1,"a"]"#));
        assert_eq!(
            string::string(&jvalue!(f64::NAN), false).unwrap_err().code(),
            "D3001"
        );
    }

    #[test]
    fn test_number_cast() {
        assert_eq!(numeric::number(&jvalue!("42")).unwrap(), jvalue!(42i64));
        assert_eq!(numeric::number(&jvalue!("0x10")).unwrap(), jvalue!(16i64));
        assert_eq!(numeric::number(&jvalue!(true)).unwrap(), jvalue!(1i64));
        assert_eq!(numeric::number(&jvalue!("abc")).unwrap_err().code(), "D3030");
    }

    #[test]
    fn test_aggregates() {
        let values = jvalue!([1i64, 5i64, 3i64]);
        assert_eq!(numeric::sum(&values), jvalue!(9i64));
        assert_eq!(numeric::max(&values), jvalue!(5i64));
        assert_eq!(numeric::min(&values), jvalue!(1i64));
        assert_eq!(numeric::average(&values), jvalue!(3i64));
        assert!(numeric::max(&jvalue!([])).is_undefined());
        assert_eq!(array::count(&JValue::Undefined), jvalue!(0i64));
    }

    #[test]
    fn test_object_functions() {
        let data = jvalue!([{"a": 1i64, "b": 2i64}, {"b": 3i64, "c": 4i64}]);
        assert_eq!(object::keys(&data), jvalue!(["a", "b", "c"]));
        assert_eq!(object::lookup(&data, "b"), jvalue!([2i64, 3i64]));
    }

    #[test]
    fn test_base_environment_signatures_parse() {
        let env = base_environment();
        for (name, _, _) in NATIVES {
            let value = env.lookup(name);
            let native = match value.as_function().map(|f| &**f) {
                Some(Callable::Native(native)) => Arc::clone(native),
                other => panic!("{} not bound as a native: {:?}", name, other),
            };
            assert!(native.signature.is_some(), "{} has no signature", name);
        }
    }
}

// JValue: Rc-wrapped dynamic value with sequence flags, tuples and functions

use std::fmt;
use std::rc::Rc;

use bitflags::bitflags;
use indexmap::IndexMap;
use serde::de::{self, Deserializer, MapAccess, SeqAccess, Visitor};
use serde::ser::{Serialize, SerializeMap, SerializeSeq, Serializer};

use crate::callable::Callable;

bitflags! {
    /// Semantic markers carried by an array value.
    ///
    /// Plain JSON arrays carry no flags. Path and filter results are
    /// `SEQUENCE`s, which collapse to their single element (or to absent
    /// when empty) as they leave an evaluation step.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct SeqFlags: u8 {
        /// Result of path or filter stepping, eligible for auto-unwrap.
        const SEQUENCE = 0b0000_0001;
        /// Synthetic wrapper placed around a top-level array input.
        const OUTER_WRAPPER = 0b0000_0010;
        /// Elements are `JValue::Tuple` records.
        const TUPLE_STREAM = 0b0000_0100;
        /// Suppress auto-unwrap of a singleton.
        const KEEP_SINGLETON = 0b0000_1000;
        /// Explicitly constructed with `[...]`; not flattened by path steps.
        const CONS = 0b0001_0000;
    }
}

/// A per-element correlation record threaded through a tuple-stream path.
///
/// `context` is the `@` value; `bindings` hold focus, index and ancestor
/// variables accumulated by earlier steps.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Tuple {
    pub context: JValue,
    pub bindings: IndexMap<String, JValue>,
}

impl Tuple {
    pub fn new(context: JValue) -> Self {
        Tuple {
            context,
            bindings: IndexMap::new(),
        }
    }
}

/// A JSON-like value with O(1) clone semantics via Rc-wrapping.
///
/// `Undefined` is the absent value and is distinct from `Null`.
#[derive(Clone, Debug, Default)]
pub enum JValue {
    Null,
    Bool(bool),
    Number(f64),
    String(Rc<str>),
    Array(Rc<Vec<JValue>>, SeqFlags),
    Object(Rc<IndexMap<String, JValue>>),

    #[default]
    Undefined,
    Tuple(Rc<Tuple>),
    Function(Rc<Callable>),
    Regex(regex::Regex),
}

// ── Type checks ──────────────────────────────────────────────────────────────

impl JValue {
    #[inline]
    pub fn is_undefined(&self) -> bool {
        matches!(self, JValue::Undefined)
    }

    #[inline]
    pub fn is_number(&self) -> bool {
        matches!(self, JValue::Number(_))
    }

    #[inline]
    pub fn is_string(&self) -> bool {
        matches!(self, JValue::String(_))
    }

    #[inline]
    pub fn is_array(&self) -> bool {
        matches!(self, JValue::Array(..))
    }

    #[inline]
    pub fn is_object(&self) -> bool {
        matches!(self, JValue::Object(_))
    }

    #[inline]
    pub fn is_function(&self) -> bool {
        matches!(self, JValue::Function(_))
    }

    /// True for integral numbers.
    pub fn is_integer(&self) -> bool {
        matches!(self, JValue::Number(n) if n.is_finite() && n.fract() == 0.0)
    }

    #[inline]
    pub fn flags(&self) -> SeqFlags {
        match self {
            JValue::Array(_, flags) => *flags,
            _ => SeqFlags::empty(),
        }
    }

    #[inline]
    pub fn is_sequence(&self) -> bool {
        self.flags().contains(SeqFlags::SEQUENCE)
    }

    #[inline]
    pub fn is_tuple_stream(&self) -> bool {
        self.flags().contains(SeqFlags::TUPLE_STREAM)
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            JValue::Null => "null",
            JValue::Bool(_) => "boolean",
            JValue::Number(_) => "number",
            JValue::String(_) => "string",
            JValue::Array(..) => "array",
            JValue::Object(_) | JValue::Tuple(_) => "object",
            JValue::Undefined => "undefined",
            JValue::Function(_) | JValue::Regex(_) => "function",
        }
    }
}

// ── Extraction ───────────────────────────────────────────────────────────────

impl JValue {
    #[inline]
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            JValue::Number(n) => Some(*n),
            _ => None,
        }
    }

    #[inline]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            JValue::String(s) => Some(s),
            _ => None,
        }
    }

    #[inline]
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            JValue::Bool(b) => Some(*b),
            _ => None,
        }
    }

    #[inline]
    pub fn as_array(&self) -> Option<&Vec<JValue>> {
        match self {
            JValue::Array(arr, _) => Some(arr),
            _ => None,
        }
    }

    #[inline]
    pub fn as_object(&self) -> Option<&IndexMap<String, JValue>> {
        match self {
            JValue::Object(map) => Some(map),
            _ => None,
        }
    }

    #[inline]
    pub fn as_function(&self) -> Option<&Rc<Callable>> {
        match self {
            JValue::Function(f) => Some(f),
            _ => None,
        }
    }

    /// Copy-on-write access to the members; a shared array is cloned first.
    #[inline]
    pub fn as_array_mut(&mut self) -> Option<&mut Vec<JValue>> {
        match self {
            JValue::Array(arr, _) => Some(Rc::make_mut(arr)),
            _ => None,
        }
    }

    /// Copy-on-write access to the entries; a shared object is cloned first.
    #[inline]
    pub fn as_object_mut(&mut self) -> Option<&mut IndexMap<String, JValue>> {
        match self {
            JValue::Object(map) => Some(Rc::make_mut(map)),
            _ => None,
        }
    }

    /// Index into an object by key.
    #[inline]
    pub fn get(&self, key: &str) -> Option<&JValue> {
        match self {
            JValue::Object(map) => map.get(key),
            _ => None,
        }
    }

    /// Index into an array by position.
    #[inline]
    pub fn get_index(&self, index: usize) -> Option<&JValue> {
        match self {
            JValue::Array(arr, _) => arr.get(index),
            _ => None,
        }
    }
}

// ── Constructors ─────────────────────────────────────────────────────────────

impl JValue {
    #[inline]
    pub fn string(s: impl Into<Rc<str>>) -> Self {
        JValue::String(s.into())
    }

    #[inline]
    pub fn array(v: Vec<JValue>) -> Self {
        JValue::Array(Rc::new(v), SeqFlags::empty())
    }

    #[inline]
    pub fn array_with(v: Vec<JValue>, flags: SeqFlags) -> Self {
        JValue::Array(Rc::new(v), flags)
    }

    /// A flagged sequence, the container produced by path and filter steps.
    #[inline]
    pub fn sequence(v: Vec<JValue>) -> Self {
        JValue::Array(Rc::new(v), SeqFlags::SEQUENCE)
    }

    /// A tuple stream: a sequence whose members are tuples.
    #[inline]
    pub fn tuple_stream(tuples: Vec<Tuple>) -> Self {
        JValue::Array(
            Rc::new(tuples.into_iter().map(|t| JValue::Tuple(Rc::new(t))).collect()),
            SeqFlags::SEQUENCE | SeqFlags::TUPLE_STREAM,
        )
    }

    #[inline]
    pub fn object(m: IndexMap<String, JValue>) -> Self {
        JValue::Object(Rc::new(m))
    }

    #[inline]
    pub fn function(callable: Callable) -> Self {
        JValue::Function(Rc::new(callable))
    }

    /// Return the same array with extra flags set; non-arrays are unchanged.
    pub fn with_flags(self, extra: SeqFlags) -> Self {
        match self {
            JValue::Array(arr, flags) => JValue::Array(arr, flags | extra),
            other => other,
        }
    }

    /// Drop every sequence marker, recursively, so the value is plain JSON-shaped.
    pub fn into_plain(self) -> Self {
        match self {
            JValue::Array(arr, flags) => {
                if flags.is_empty() && !arr.iter().any(|v| v.is_array() || v.is_object()) {
                    return JValue::Array(arr, flags);
                }
                let items = Rc::try_unwrap(arr).unwrap_or_else(|shared| (*shared).clone());
                JValue::array(items.into_iter().map(JValue::into_plain).collect())
            }
            JValue::Tuple(t) => t.context.clone().into_plain(),
            other => other,
        }
    }
}

// ── From impls ───────────────────────────────────────────────────────────────

impl From<bool> for JValue {
    #[inline]
    fn from(b: bool) -> Self {
        JValue::Bool(b)
    }
}

impl From<i64> for JValue {
    #[inline]
    fn from(n: i64) -> Self {
        JValue::Number(n as f64)
    }
}

impl From<i32> for JValue {
    #[inline]
    fn from(n: i32) -> Self {
        JValue::Number(n as f64)
    }
}

impl From<usize> for JValue {
    #[inline]
    fn from(n: usize) -> Self {
        JValue::Number(n as f64)
    }
}

impl From<f64> for JValue {
    #[inline]
    fn from(n: f64) -> Self {
        JValue::Number(n)
    }
}

impl From<&str> for JValue {
    #[inline]
    fn from(s: &str) -> Self {
        JValue::String(s.into())
    }
}

impl From<String> for JValue {
    #[inline]
    fn from(s: String) -> Self {
        JValue::String(s.into())
    }
}

impl From<Rc<str>> for JValue {
    #[inline]
    fn from(s: Rc<str>) -> Self {
        JValue::String(s)
    }
}

impl From<Vec<JValue>> for JValue {
    #[inline]
    fn from(v: Vec<JValue>) -> Self {
        JValue::array(v)
    }
}

impl From<IndexMap<String, JValue>> for JValue {
    #[inline]
    fn from(m: IndexMap<String, JValue>) -> Self {
        JValue::Object(Rc::new(m))
    }
}

// ── PartialEq ────────────────────────────────────────────────────────────────

/// Deep, type-aware structural equality. Sequence flags are ignored; functions
/// compare by identity.
impl PartialEq for JValue {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (JValue::Null, JValue::Null) => true,
            (JValue::Undefined, JValue::Undefined) => true,
            (JValue::Bool(a), JValue::Bool(b)) => a == b,
            // NaN != NaN falls out of f64 comparison
            (JValue::Number(a), JValue::Number(b)) => a == b,
            (JValue::String(a), JValue::String(b)) => a == b,
            (JValue::Array(a, _), JValue::Array(b, _)) => Rc::ptr_eq(a, b) || a == b,
            (JValue::Object(a), JValue::Object(b)) => Rc::ptr_eq(a, b) || a == b,
            (JValue::Tuple(a), JValue::Tuple(b)) => a == b,
            (JValue::Function(a), JValue::Function(b)) => Rc::ptr_eq(a, b),
            (JValue::Regex(a), JValue::Regex(b)) => a.as_str() == b.as_str(),
            _ => false,
        }
    }
}

// ── Display ──────────────────────────────────────────────────────────────────

/// Compact JSON rendering. Absent object members are skipped, functions render
/// as `""` and numbers use 15 significant digits.
impl fmt::Display for JValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JValue::Null => write!(f, "null"),
            JValue::Undefined => write!(f, "undefined"),
            JValue::Bool(b) => write!(f, "{}", b),
            JValue::Number(n) => f.write_str(&format_number(*n)),
            JValue::String(s) => write!(f, "\"{}\"", escape_json_string(s)),
            JValue::Array(arr, _) => {
                write!(f, "[")?;
                let mut first = true;
                for v in arr.iter().filter(|v| !v.is_undefined()) {
                    if !first {
                        write!(f, ",")?;
                    }
                    first = false;
                    write!(f, "{}", v)?;
                }
                write!(f, "]")
            }
            JValue::Object(map) => {
                write!(f, "{{")?;
                let mut first = true;
                for (k, v) in map.iter().filter(|(_, v)| !v.is_undefined()) {
                    if !first {
                        write!(f, ",")?;
                    }
                    first = false;
                    write!(f, "\"{}\":{}", escape_json_string(k), v)?;
                }
                write!(f, "}}")
            }
            JValue::Tuple(t) => write!(f, "{}", t.context),
            JValue::Function(_) | JValue::Regex(_) => write!(f, "\"\""),
        }
    }
}

fn escape_json_string(s: &str) -> String {
    let mut result = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '"' => result.push_str("\\\""),
            '\\' => result.push_str("\\\\"),
            '\n' => result.push_str("\\n"),
            '\r' => result.push_str("\\r"),
            '\t' => result.push_str("\\t"),
            c if c < '\x20' => {
                result.push_str(&format!("\\u{:04x}", c as u32));
            }
            c => result.push(c),
        }
    }
    result
}

/// Render a number the way the language prints it: integers without a
/// fraction, everything else rounded to 15 significant digits.
pub fn format_number(n: f64) -> String {
    if !n.is_finite() {
        "null".to_string()
    } else if n == 0.0 {
        "0".to_string()
    } else if n.fract() == 0.0 && n.abs() < 1e21 {
        format!("{:.0}", n)
    } else {
        let rounded: f64 = format!("{:.14e}", n).parse().unwrap_or(n);
        format!("{}", rounded)
    }
}

// ── Serialization ────────────────────────────────────────────────────────────

impl Serialize for JValue {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match self {
            JValue::Null | JValue::Undefined => serializer.serialize_none(),
            JValue::Bool(b) => serializer.serialize_bool(*b),
            JValue::Number(n) => {
                if n.is_nan() || n.is_infinite() {
                    serializer.serialize_none()
                } else if n.fract() == 0.0 && *n >= i64::MIN as f64 && *n <= i64::MAX as f64 {
                    serializer.serialize_i64(*n as i64)
                } else {
                    serializer.serialize_f64(*n)
                }
            }
            JValue::String(s) => serializer.serialize_str(s),
            JValue::Array(arr, _) => {
                let mut seq = serializer.serialize_seq(None)?;
                for v in arr.iter().filter(|v| !v.is_undefined()) {
                    seq.serialize_element(v)?;
                }
                seq.end()
            }
            JValue::Object(map) => {
                let mut m = serializer.serialize_map(None)?;
                for (k, v) in map.iter().filter(|(_, v)| !v.is_undefined()) {
                    m.serialize_entry(k, v)?;
                }
                m.end()
            }
            JValue::Tuple(t) => t.context.serialize(serializer),
            JValue::Function(_) => serializer.serialize_str(""),
            JValue::Regex(re) => serializer.serialize_str(re.as_str()),
        }
    }
}

// ── Deserialization (single-pass JSON→JValue) ────────────────────────────────

impl<'de> serde::Deserialize<'de> for JValue {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        deserializer.deserialize_any(JValueVisitor)
    }
}

struct JValueVisitor;

impl<'de> Visitor<'de> for JValueVisitor {
    type Value = JValue;

    fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "any valid JSON value")
    }

    fn visit_bool<E: de::Error>(self, v: bool) -> Result<JValue, E> {
        Ok(JValue::Bool(v))
    }

    fn visit_i64<E: de::Error>(self, v: i64) -> Result<JValue, E> {
        Ok(JValue::Number(v as f64))
    }

    fn visit_u64<E: de::Error>(self, v: u64) -> Result<JValue, E> {
        Ok(JValue::Number(v as f64))
    }

    fn visit_f64<E: de::Error>(self, v: f64) -> Result<JValue, E> {
        Ok(JValue::Number(v))
    }

    fn visit_str<E: de::Error>(self, v: &str) -> Result<JValue, E> {
        Ok(JValue::string(v))
    }

    fn visit_string<E: de::Error>(self, v: String) -> Result<JValue, E> {
        Ok(JValue::String(v.into()))
    }

    fn visit_none<E: de::Error>(self) -> Result<JValue, E> {
        Ok(JValue::Null)
    }

    fn visit_unit<E: de::Error>(self) -> Result<JValue, E> {
        Ok(JValue::Null)
    }

    fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> Result<JValue, A::Error> {
        let mut vec = Vec::with_capacity(seq.size_hint().unwrap_or(0));
        while let Some(elem) = seq.next_element()? {
            vec.push(elem);
        }
        Ok(JValue::array(vec))
    }

    fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<JValue, A::Error> {
        let mut m = IndexMap::with_capacity(map.size_hint().unwrap_or(0));
        while let Some((k, v)) = map.next_entry()? {
            m.insert(k, v);
        }
        Ok(JValue::object(m))
    }
}

// ── JSON string I/O ──────────────────────────────────────────────────────────

impl JValue {
    /// Serialize to a JSON string.
    pub fn to_json_string(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Serialize to a pretty-printed JSON string.
    pub fn to_json_string_pretty(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Parse a JSON string into a JValue (single-pass, no intermediate serde_json::Value).
    ///
    /// With the `simd` feature, simd-json is tried first and serde_json is the fallback.
    pub fn from_json_str(s: &str) -> Result<JValue, serde_json::Error> {
        #[cfg(feature = "simd")]
        {
            let mut bytes = s.as_bytes().to_vec();
            if let Ok(value) = simd_json::serde::from_slice::<JValue>(&mut bytes) {
                return Ok(value);
            }
        }
        serde_json::from_str(s)
    }
}

// ── Conversion from serde_json::Value ────────────────────────────────────────

impl From<serde_json::Value> for JValue {
    fn from(v: serde_json::Value) -> Self {
        match v {
            serde_json::Value::Null => JValue::Null,
            serde_json::Value::Bool(b) => JValue::Bool(b),
            serde_json::Value::Number(n) => JValue::Number(n.as_f64().unwrap_or(0.0)),
            serde_json::Value::String(s) => JValue::String(s.into()),
            serde_json::Value::Array(arr) => {
                JValue::array(arr.into_iter().map(JValue::from).collect())
            }
            serde_json::Value::Object(map) => {
                let m: IndexMap<String, JValue> =
                    map.into_iter().map(|(k, v)| (k, JValue::from(v))).collect();
                JValue::Object(Rc::new(m))
            }
        }
    }
}

// ── Conversion to serde_json::Value ──────────────────────────────────────────

impl From<&JValue> for serde_json::Value {
    fn from(v: &JValue) -> Self {
        match v {
            JValue::Null | JValue::Undefined => serde_json::Value::Null,
            JValue::Bool(b) => serde_json::Value::Bool(*b),
            JValue::Number(n) => {
                if n.is_nan() || n.is_infinite() {
                    serde_json::Value::Null
                } else if n.fract() == 0.0 && n.abs() < 9.0e15 {
                    serde_json::Value::from(*n as i64)
                } else {
                    serde_json::json!(*n)
                }
            }
            JValue::String(s) => serde_json::Value::String(s.to_string()),
            JValue::Array(arr, _) => serde_json::Value::Array(
                arr.iter()
                    .filter(|v| !v.is_undefined())
                    .map(serde_json::Value::from)
                    .collect(),
            ),
            JValue::Object(map) => {
                let m: serde_json::Map<String, serde_json::Value> = map
                    .iter()
                    .filter(|(_, v)| !v.is_undefined())
                    .map(|(k, v)| (k.clone(), serde_json::Value::from(v)))
                    .collect();
                serde_json::Value::Object(m)
            }
            JValue::Tuple(t) => serde_json::Value::from(&t.context),
            JValue::Function(_) => serde_json::Value::String(String::new()),
            JValue::Regex(re) => serde_json::Value::String(re.as_str().to_string()),
        }
    }
}

// ── jvalue! macro ────────────────────────────────────────────────────────────

/// Macro for constructing JValue literals, similar to serde_json::json!
///
/// Usage:
///   jvalue!(null)           → JValue::Null
///   jvalue!(true)           → JValue::Bool(true)
///   jvalue!(42)             → JValue::Number(42.0)
///   jvalue!("hello")        → JValue::String(Rc::from("hello"))
///   jvalue!([1, 2, 3])      → plain (unflagged) array
///   jvalue!({"k": v, ...})  → JValue::Object(Rc::new(IndexMap from pairs))
///   jvalue!(expr)           → JValue::from(expr)
#[macro_export]
macro_rules! jvalue {
    (null) => {
        $crate::value::JValue::Null
    };

    (true) => {
        $crate::value::JValue::Bool(true)
    };

    (false) => {
        $crate::value::JValue::Bool(false)
    };

    ([ $($elem:tt),* $(,)? ]) => {
        $crate::value::JValue::array(vec![ $( $crate::jvalue!($elem) ),* ])
    };

    ({ $($key:tt : $val:tt),* $(,)? }) => {
        {
            let mut map = indexmap::IndexMap::new();
            $(
                map.insert(($key).to_string(), $crate::jvalue!($val));
            )*
            $crate::value::JValue::object(map)
        }
    };

    ($other:expr) => {
        $crate::value::JValue::from($other)
    };
}

// ── Tests ────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clone_is_cheap() {
        let arr = JValue::array(vec![
            JValue::from(1i64),
            JValue::from(2i64),
            JValue::from(3i64),
        ]);
        let arr2 = arr.clone();
        if let (JValue::Array(a, _), JValue::Array(b, _)) = (&arr, &arr2) {
            assert!(Rc::ptr_eq(a, b));
        } else {
            panic!("expected arrays");
        }

        let s = JValue::string("hello");
        let s2 = s.clone();
        if let (JValue::String(a), JValue::String(b)) = (&s, &s2) {
            assert!(Rc::ptr_eq(a, b));
        } else {
            panic!("expected strings");
        }
    }

    #[test]
    fn test_type_checks() {
        assert!(JValue::Undefined.is_undefined());
        assert!(JValue::Number(42.0).is_number());
        assert!(JValue::Number(42.0).is_integer());
        assert!(!JValue::Number(42.5).is_integer());
        assert!(JValue::string("hello").is_string());
        assert!(JValue::array(vec![]).is_array());
        assert!(JValue::object(IndexMap::new()).is_object());
        assert!(JValue::sequence(vec![]).is_sequence());
        assert!(!JValue::array(vec![]).is_sequence());
        assert!(JValue::tuple_stream(vec![]).is_tuple_stream());
    }

    #[test]
    fn test_equality_ignores_flags() {
        let plain = jvalue!([1i64, 2i64]);
        let seq = JValue::sequence(vec![JValue::from(1i64), JValue::from(2i64)]);
        assert_eq!(plain, seq);
        assert_ne!(JValue::Null, JValue::Undefined);
        assert_ne!(JValue::Number(f64::NAN), JValue::Number(f64::NAN));
        assert_eq!(jvalue!({"a": [1i64, {"b": null}]}), jvalue!({"a": [1i64, {"b": null}]}));
        assert_ne!(jvalue!({"a": 1i64}), jvalue!({"a": 1i64, "b": 2i64}));
    }

    #[test]
    fn test_display_and_numbers() {
        assert_eq!(format_number(3.0), "3");
        assert_eq!(format_number(0.1 + 0.2), "0.3");
        assert_eq!(format_number(-2.5), "-2.5");
        let v = jvalue!({"name": "Alice", "tags": ["x", "y"], "n": 1.5});
        assert_eq!(v.to_string(), r#"{"name":"Alice","tags":["x","y"],"n":1.5}"#);
    }

    #[test]
    fn test_serde_roundtrip() {
        let v = jvalue!({"name": "Alice", "scores": [1i64, 2i64, 3i64], "active": true});
        let json_str = v.to_json_string().unwrap();
        assert_eq!(json_str, r#"{"name":"Alice","scores":[1,2,3],"active":true}"#);
        let parsed = JValue::from_json_str(&json_str).unwrap();
        assert_eq!(v, parsed);
    }

    #[test]
    fn test_into_plain_strips_flags() {
        let inner = JValue::sequence(vec![JValue::from(1i64)]);
        let outer = JValue::array_with(vec![inner], SeqFlags::SEQUENCE | SeqFlags::KEEP_SINGLETON);
        let plain = outer.into_plain();
        assert!(plain.flags().is_empty());
        assert!(plain.get_index(0).map(|v| v.flags().is_empty()).unwrap_or(false));
    }

    #[test]
    fn test_from_serde_json() {
        let sv = serde_json::json!({"name": "Alice", "age": 30, "scores": [1, 2, 3]});
        let jv = JValue::from(sv.clone());
        assert_eq!(jv.get("name").and_then(|v| v.as_str()), Some("Alice"));
        assert_eq!(jv.get("age").and_then(|v| v.as_f64()), Some(30.0));
        assert_eq!(serde_json::Value::from(&jv), sv);
    }

    #[test]
    fn test_make_mut() {
        let mut arr = JValue::array(vec![JValue::from(1i64), JValue::from(2i64)]);
        let arr2 = arr.clone();
        arr.as_array_mut().unwrap().push(JValue::from(3i64));
        assert_eq!(arr.as_array().unwrap().len(), 3);
        assert_eq!(arr2.as_array().unwrap().len(), 2);
    }
}

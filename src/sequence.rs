// Sequence helpers and value coercions shared by the evaluator and natives

use std::rc::Rc;

use crate::error::{Error, Result};
use crate::value::{format_number, JValue};

/// Concatenate two values. Absent on either side yields the other side
/// unchanged; scalars are treated as one-element arrays. The result is a
/// plain array.
pub fn append(a: JValue, b: JValue) -> JValue {
    if a.is_undefined() {
        return b;
    }
    if b.is_undefined() {
        return a;
    }
    let mut items = into_items(a);
    match b {
        JValue::Array(arr, _) => items.extend(arr.iter().cloned()),
        other => items.push(other),
    }
    JValue::array(items)
}

/// Take the members of an array (copying only if shared), or wrap a scalar.
pub fn into_items(value: JValue) -> Vec<JValue> {
    match value {
        JValue::Array(arr, _) => Rc::try_unwrap(arr).unwrap_or_else(|shared| (*shared).clone()),
        JValue::Undefined => Vec::new(),
        other => vec![other],
    }
}

/// Borrow the members of an array, or view a scalar as a one-element slice.
pub fn items(value: &JValue) -> &[JValue] {
    match value {
        JValue::Array(arr, _) => arr.as_slice(),
        JValue::Undefined => &[],
        other => std::slice::from_ref(other),
    }
}

/// Recursively flatten nested arrays into `out`.
pub fn flatten_into(value: &JValue, out: &mut Vec<JValue>) {
    match value {
        JValue::Array(arr, _) => arr.iter().for_each(|v| flatten_into(v, out)),
        other => out.push(other.clone()),
    }
}

/// Wrap in a one-element sequence unless already an array.
pub fn to_sequence(value: JValue) -> JValue {
    match value {
        JValue::Array(..) => value,
        JValue::Undefined => JValue::sequence(Vec::new()),
        other => JValue::sequence(vec![other]),
    }
}

/// Truthiness. `None` for absent.
///
/// A one-element array takes the truthiness of its member; longer arrays are
/// true if any member is.
pub fn boolean(value: &JValue) -> Option<bool> {
    Some(match value {
        JValue::Undefined => return None,
        JValue::Null => false,
        JValue::Bool(b) => *b,
        JValue::Number(n) => *n != 0.0,
        JValue::String(s) => !s.is_empty(),
        JValue::Array(arr, _) => match arr.len() {
            0 => false,
            1 => boolean(&arr[0]).unwrap_or(false),
            _ => arr.iter().any(|v| boolean(v).unwrap_or(false)),
        },
        JValue::Object(map) => !map.is_empty(),
        JValue::Tuple(_) => true,
        JValue::Function(_) | JValue::Regex(_) => false,
    })
}

/// Truthiness with absent treated as false.
pub fn truthy(value: &JValue) -> bool {
    boolean(value).unwrap_or(false)
}

/// A number that is not NaN. Infinite numbers are out of range.
pub fn is_numeric(value: &JValue) -> Result<bool> {
    match value {
        JValue::Number(n) if n.is_nan() => Ok(false),
        JValue::Number(n) if !n.is_finite() => Err(Error::new("D1001").value(format_number(*n))),
        JValue::Number(_) => Ok(true),
        _ => Ok(false),
    }
}

pub fn is_array_of_numbers(value: &JValue) -> bool {
    matches!(value, JValue::Array(arr, _) if arr.iter().all(JValue::is_number))
}

pub fn is_array_of_strings(value: &JValue) -> bool {
    matches!(value, JValue::Array(arr, _) if arr.iter().all(JValue::is_string))
}

/// Render a value as text: strings as-is, functions as empty, numbers with
/// 15 significant digits, everything else as compact JSON.
pub fn stringify(value: &JValue) -> Result<String> {
    Ok(match value {
        JValue::Undefined => String::new(),
        JValue::String(s) => s.to_string(),
        JValue::Function(_) | JValue::Regex(_) => String::new(),
        JValue::Number(n) if !n.is_finite() => {
            return Err(Error::new("D3001").value(format_number(*n)));
        }
        other => other.to_string(),
    })
}

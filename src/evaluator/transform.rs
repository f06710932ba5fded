// Copy-and-update transforms `|pattern|update[,delete]|`

use std::rc::Rc;

use super::Interpreter;
use crate::callable::Transformer;
use crate::error::{Error, Result};
use crate::sequence;
use crate::value::JValue;

/// One step from the root of the copied value to a matched object.
#[derive(Debug, Clone, PartialEq)]
enum Segment {
    Key(String),
    Index(usize),
}

impl Interpreter {
    /// Apply a transformer to `target`, returning a modified copy. The
    /// target itself is never changed.
    pub(super) fn apply_transformer(&mut self, transformer: &Transformer, target: &JValue) -> Result<JValue> {
        let mut result = match target {
            JValue::Undefined => return Ok(JValue::Undefined),
            JValue::Object(_) | JValue::Array(..) => target.clone(),
            other => return Err(Error::new("T0410").index(1).value(other)),
        };

        let matches = self.evaluate(&transformer.pattern, &result, &transformer.env)?;
        let mut sites = Vec::new();
        for matched in sequence::items(&matches) {
            if !matched.is_object() {
                continue;
            }
            if let Some(path) = locate(&result, matched) {
                sites.push(path);
            }
        }

        for path in sites {
            let Some(current) = resolve(&result, &path).cloned() else {
                continue;
            };

            let update = self.evaluate(&transformer.update, &current, &transformer.env)?;
            let mut updated = current;
            match update {
                JValue::Undefined => {}
                JValue::Object(fields) => {
                    if let Some(map) = updated.as_object_mut() {
                        for (key, value) in fields.iter() {
                            map.insert(key.clone(), value.clone());
                        }
                    }
                }
                other => {
                    return Err(Error::new("T2011").at(transformer.update.position).value(&other));
                }
            }

            if let Some(delete) = &transformer.delete {
                let removals = self.evaluate(delete, &updated, &transformer.env)?;
                if !removals.is_undefined() {
                    let keys = sequence::to_sequence(removals);
                    if !sequence::is_array_of_strings(&keys) {
                        return Err(Error::new("T2012").at(delete.position).value(&keys));
                    }
                    if let Some(map) = updated.as_object_mut() {
                        for key in sequence::items(&keys) {
                            if let Some(key) = key.as_str() {
                                map.shift_remove(key);
                            }
                        }
                    }
                }
            }

            if let Some(slot) = resolve_mut(&mut result, &path) {
                *slot = updated;
            }
        }

        Ok(result)
    }
}

/// Find where `needle` sits inside `root`: by identity first, then by the
/// first structurally equal object in document order.
fn locate(root: &JValue, needle: &JValue) -> Option<Vec<Segment>> {
    let mut path = Vec::new();
    if search(root, &mut path, &|candidate| same_object(candidate, needle)) {
        return Some(path);
    }
    path.clear();
    if search(root, &mut path, &|candidate| candidate.is_object() && candidate == needle) {
        return Some(path);
    }
    None
}

fn same_object(a: &JValue, b: &JValue) -> bool {
    match (a, b) {
        (JValue::Object(x), JValue::Object(y)) => Rc::ptr_eq(x, y),
        _ => false,
    }
}

fn search(value: &JValue, path: &mut Vec<Segment>, found: &dyn Fn(&JValue) -> bool) -> bool {
    if found(value) {
        return true;
    }
    match value {
        JValue::Object(map) => {
            for (key, child) in map.iter() {
                path.push(Segment::Key(key.clone()));
                if search(child, path, found) {
                    return true;
                }
                path.pop();
            }
        }
        JValue::Array(items, _) => {
            for (index, child) in items.iter().enumerate() {
                path.push(Segment::Index(index));
                if search(child, path, found) {
                    return true;
                }
                path.pop();
            }
        }
        _ => {}
    }
    false
}

fn resolve<'a>(root: &'a JValue, path: &[Segment]) -> Option<&'a JValue> {
    path.iter().try_fold(root, |value, segment| match segment {
        Segment::Key(key) => value.get(key),
        Segment::Index(index) => value.get_index(*index),
    })
}

/// Walk `path` with copy-on-write, so only the spine to the site is copied.
fn resolve_mut<'a>(root: &'a mut JValue, path: &[Segment]) -> Option<&'a mut JValue> {
    let mut value = root;
    for segment in path {
        value = match segment {
            Segment::Key(key) => value.as_object_mut()?.get_mut(key)?,
            Segment::Index(index) => value.as_array_mut()?.get_mut(*index)?,
        };
    }
    Some(value)
}

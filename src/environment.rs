// Variable scopes
//
// Frames form a chain through shared parent pointers. A closure keeps its
// defining frame alive by holding a clone of the `Environment`.

use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

use crate::value::JValue;

struct Frame {
    bindings: RefCell<HashMap<String, JValue>>,
    parent: Option<Environment>,
}

/// A handle to one frame in a scope chain. Cloning shares the frame.
#[derive(Clone)]
pub struct Environment(Rc<Frame>);

impl Environment {
    /// A root frame with no parent.
    pub fn new() -> Self {
        Environment(Rc::new(Frame {
            bindings: RefCell::new(HashMap::new()),
            parent: None,
        }))
    }

    /// A fresh frame whose lookups fall back to `self`.
    pub fn child(&self) -> Self {
        Environment(Rc::new(Frame {
            bindings: RefCell::new(HashMap::new()),
            parent: Some(self.clone()),
        }))
    }

    /// Bind in this frame, shadowing any binding in an ancestor.
    pub fn bind(&self, name: impl Into<String>, value: JValue) {
        self.0.bindings.borrow_mut().insert(name.into(), value);
    }

    /// Resolve a name through the chain. Unbound names are `Undefined`.
    pub fn lookup(&self, name: &str) -> JValue {
        let mut frame = Some(self);
        while let Some(env) = frame {
            if let Some(value) = env.0.bindings.borrow().get(name) {
                return value.clone();
            }
            frame = env.0.parent.as_ref();
        }
        JValue::Undefined
    }

    /// Whether a binding exists anywhere in the chain, even if its value is absent.
    pub fn is_bound(&self, name: &str) -> bool {
        let mut frame = Some(self);
        while let Some(env) = frame {
            if env.0.bindings.borrow().contains_key(name) {
                return true;
            }
            frame = env.0.parent.as_ref();
        }
        false
    }

    pub fn parent(&self) -> Option<&Environment> {
        self.0.parent.as_ref()
    }

    pub fn same_frame(&self, other: &Environment) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}

impl Default for Environment {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // bindings may hold closures that point back at this frame
        let mut names: Vec<String> = self.0.bindings.borrow().keys().cloned().collect();
        names.sort();
        f.debug_struct("Environment")
            .field("names", &names)
            .field("has_parent", &self.0.parent.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup_walks_parents() {
        let root = Environment::new();
        root.bind("x", JValue::from(1i64));
        let child = root.child();
        assert_eq!(child.lookup("x"), JValue::from(1i64));
        assert!(child.lookup("missing").is_undefined());
    }

    #[test]
    fn test_child_shadows_without_touching_parent() {
        let root = Environment::new();
        root.bind("x", JValue::from(1i64));
        let child = root.child();
        child.bind("x", JValue::from(2i64));
        assert_eq!(child.lookup("x"), JValue::from(2i64));
        assert_eq!(root.lookup("x"), JValue::from(1i64));
    }

    #[test]
    fn test_bindings_after_capture_are_visible() {
        let root = Environment::new();
        let captured = root.child();
        root.bind("late", JValue::from("here"));
        assert_eq!(captured.lookup("late"), JValue::from("here"));
    }

    #[test]
    fn test_is_bound_sees_undefined_values() {
        let env = Environment::new();
        env.bind("nothing", JValue::Undefined);
        assert!(env.is_bound("nothing"));
        assert!(!env.is_bound("other"));
        assert!(env.child().parent().is_some_and(|p| p.same_frame(&env)));
    }
}

//! Lexical environments.
//!
//! Environments form a parent chain. The root environment of a plugin
//! program is *sealed*: it starts empty and only the host's capability
//! broker defines names in it. There is no ambient global object to fall
//! back to, so a name the host did not inject simply does not exist.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use crate::value::Value;

/// A scope in the environment chain. Cloning is cheap and shares storage.
#[derive(Clone, Debug)]
pub struct Env {
    inner: Arc<EnvInner>,
}

#[derive(Debug)]
struct EnvInner {
    vars: Mutex<HashMap<String, Value>>,
    parent: Option<Env>,
}

impl Env {
    /// A root environment with no bindings and no parent.
    #[must_use]
    pub fn sealed() -> Self {
        Self {
            inner: Arc::new(EnvInner {
                vars: Mutex::new(HashMap::new()),
                parent: None,
            }),
        }
    }

    /// A child scope of `parent`.
    #[must_use]
    pub fn child(parent: &Env) -> Self {
        Self {
            inner: Arc::new(EnvInner {
                vars: Mutex::new(HashMap::new()),
                parent: Some(parent.clone()),
            }),
        }
    }

    /// Define (or redefine) a name in this scope.
    pub fn define(&self, name: impl Into<String>, value: Value) {
        self.inner
            .vars
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(name.into(), value);
    }

    /// Look a name up through the scope chain.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<Value> {
        let mut scope = Some(self);
        while let Some(env) = scope {
            let vars = env
                .inner
                .vars
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            if let Some(value) = vars.get(name) {
                return Some(value.clone());
            }
            drop(vars);
            scope = env.inner.parent.as_ref();
        }
        None
    }

    /// Assign to an existing name, walking the scope chain. Returns false if
    /// the name is not defined anywhere; the sandbox never auto-creates
    /// bindings on assignment.
    pub fn assign(&self, name: &str, value: Value) -> bool {
        let mut scope = Some(self);
        while let Some(env) = scope {
            let mut vars = env
                .inner
                .vars
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            if let Some(slot) = vars.get_mut(name) {
                *slot = value;
                return true;
            }
            drop(vars);
            scope = env.inner.parent.as_ref();
        }
        false
    }

    /// Whether a name is defined in this scope or any ancestor.
    #[must_use]
    pub fn is_defined(&self, name: &str) -> bool {
        self.get(name).is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sealed_root_has_no_bindings() {
        let env = Env::sealed();
        assert!(env.get("window").is_none());
        assert!(env.get("document").is_none());
        assert!(env.get("anything").is_none());
    }

    #[test]
    fn child_sees_parent_bindings_and_shadows_them() {
        let root = Env::sealed();
        root.define("x", Value::Num(1.0));
        let child = Env::child(&root);
        assert_eq!(child.get("x"), Some(Value::Num(1.0)));

        child.define("x", Value::Num(2.0));
        assert_eq!(child.get("x"), Some(Value::Num(2.0)));
        assert_eq!(root.get("x"), Some(Value::Num(1.0)));
    }

    #[test]
    fn assign_writes_through_to_defining_scope() {
        let root = Env::sealed();
        root.define("count", Value::Num(0.0));
        let child = Env::child(&root);
        assert!(child.assign("count", Value::Num(5.0)));
        assert_eq!(root.get("count"), Some(Value::Num(5.0)));
    }

    #[test]
    fn assign_to_undefined_name_fails() {
        let env = Env::sealed();
        assert!(!env.assign("ghost", Value::Null));
        assert!(!env.is_defined("ghost"));
    }

    #[test]
    fn clones_share_storage() {
        let env = Env::sealed();
        let alias = env.clone();
        env.define("shared", Value::Bool(true));
        assert_eq!(alias.get("shared"), Some(Value::Bool(true)));
    }
}

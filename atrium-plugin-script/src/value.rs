//! Runtime values.
//!
//! Values are cheap to clone: lists and maps are shared behind `Arc<Mutex<…>>`
//! (reference semantics, as plugin authors expect), functions are shared ASTs
//! with a captured environment, and everything is `Send + Sync` so compiled
//! components can live in a cross-thread cache.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use atrium_plugin_api::UiNode;

use crate::ast::Stmt;
use crate::env::Env;
use crate::error::ScriptError;
use crate::interp::Interpreter;

/// Signature of host-provided capability functions.
pub type NativeFn = dyn Fn(&mut Interpreter, &[Value]) -> Result<Value, ScriptError> + Send + Sync;

/// A host-provided function exposed inside the sandbox.
pub struct NativeFunction {
    pub name: String,
    pub(crate) func: Box<NativeFn>,
}

/// A function defined in plugin source, with its captured environment.
pub struct ScriptFunction {
    pub(crate) name: Option<String>,
    pub(crate) params: Vec<String>,
    pub(crate) body: Vec<Stmt>,
    pub(crate) env: Env,
}

/// Any value a plugin program can produce or observe.
#[derive(Clone, Default)]
pub enum Value {
    /// Both `null` and `undefined`.
    #[default]
    Null,
    Bool(bool),
    Num(f64),
    Str(String),
    List(Arc<Mutex<Vec<Value>>>),
    Map(Arc<Mutex<BTreeMap<String, Value>>>),
    Function(Arc<ScriptFunction>),
    Native(Arc<NativeFunction>),
    /// A finished UI tree node, produced by presentation capabilities.
    Node(UiNode),
}

/// Lock a shared list, recovering the data if a previous holder panicked.
pub(crate) fn lock_list(list: &Arc<Mutex<Vec<Value>>>) -> MutexGuard<'_, Vec<Value>> {
    list.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Lock a shared map, recovering the data if a previous holder panicked.
pub(crate) fn lock_map(
    map: &Arc<Mutex<BTreeMap<String, Value>>>,
) -> MutexGuard<'_, BTreeMap<String, Value>> {
    map.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Depth cap when converting script values to JSON; cyclic structures
/// degrade to null past this point instead of recursing forever.
const MAX_JSON_DEPTH: usize = 64;

impl Value {
    pub fn str(s: impl Into<String>) -> Value {
        Value::Str(s.into())
    }

    pub fn list(items: Vec<Value>) -> Value {
        Value::List(Arc::new(Mutex::new(items)))
    }

    pub fn map(entries: BTreeMap<String, Value>) -> Value {
        Value::Map(Arc::new(Mutex::new(entries)))
    }

    /// Build a map value from key/value pairs.
    pub fn map_of(entries: impl IntoIterator<Item = (String, Value)>) -> Value {
        Value::map(entries.into_iter().collect())
    }

    /// Wrap a host function as a callable sandbox value.
    pub fn native<F>(name: impl Into<String>, func: F) -> Value
    where
        F: Fn(&mut Interpreter, &[Value]) -> Result<Value, ScriptError> + Send + Sync + 'static,
    {
        Value::Native(Arc::new(NativeFunction {
            name: name.into(),
            func: Box::new(func),
        }))
    }

    /// The `typeof` string. As in JavaScript, null reports `"object"`.
    #[must_use]
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "object",
            Value::Bool(_) => "boolean",
            Value::Num(_) => "number",
            Value::Str(_) => "string",
            Value::List(_) | Value::Map(_) | Value::Node(_) => "object",
            Value::Function(_) | Value::Native(_) => "function",
        }
    }

    #[must_use]
    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Null => false,
            Value::Bool(b) => *b,
            Value::Num(n) => *n != 0.0 && !n.is_nan(),
            Value::Str(s) => !s.is_empty(),
            _ => true,
        }
    }

    #[must_use]
    pub fn is_callable(&self) -> bool {
        matches!(self, Value::Function(_) | Value::Native(_))
    }

    /// Numeric coercion: null → 0, booleans → 0/1, numeric strings parse,
    /// everything else → NaN.
    #[must_use]
    pub fn to_number(&self) -> f64 {
        match self {
            Value::Null => 0.0,
            Value::Bool(b) => {
                if *b {
                    1.0
                } else {
                    0.0
                }
            }
            Value::Num(n) => *n,
            Value::Str(s) => {
                let trimmed = s.trim();
                if trimmed.is_empty() {
                    0.0
                } else {
                    trimmed.parse::<f64>().unwrap_or(f64::NAN)
                }
            }
            _ => f64::NAN,
        }
    }

    /// String coercion used by `+` concatenation and text children.
    #[must_use]
    pub fn to_display_string(&self) -> String {
        match self {
            Value::Null => "null".to_string(),
            Value::Bool(b) => b.to_string(),
            Value::Num(n) => format_number(*n),
            Value::Str(s) => s.clone(),
            Value::List(items) => {
                let items = lock_list(items);
                items
                    .iter()
                    .map(Value::to_display_string)
                    .collect::<Vec<_>>()
                    .join(",")
            }
            Value::Map(_) => "[object Object]".to_string(),
            Value::Function(func) => match &func.name {
                Some(name) => format!("[function {name}]"),
                None => "[function]".to_string(),
            },
            Value::Native(func) => format!("[function {}]", func.name),
            Value::Node(node) => format!("<{}/>", node.component),
        }
    }

    /// Strict equality (`===`): value equality for primitives, reference
    /// equality for lists, maps, and functions.
    #[must_use]
    pub fn strict_eq(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Num(a), Value::Num(b)) => a == b,
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::List(a), Value::List(b)) => Arc::ptr_eq(a, b),
            (Value::Map(a), Value::Map(b)) => Arc::ptr_eq(a, b),
            (Value::Function(a), Value::Function(b)) => Arc::ptr_eq(a, b),
            (Value::Native(a), Value::Native(b)) => Arc::ptr_eq(a, b),
            (Value::Node(a), Value::Node(b)) => a == b,
            _ => false,
        }
    }

    /// Loose equality (`==`): strict equality, plus numeric coercion across
    /// numbers, strings, and booleans.
    #[must_use]
    pub fn loose_eq(&self, other: &Value) -> bool {
        if self.strict_eq(other) {
            return true;
        }
        let coercible = |v: &Value| matches!(v, Value::Num(_) | Value::Str(_) | Value::Bool(_));
        if coercible(self) && coercible(other) {
            let a = self.to_number();
            let b = other.to_number();
            return a == b;
        }
        false
    }

    /// Bridge a JSON value into the sandbox.
    #[must_use]
    pub fn from_json(json: &serde_json::Value) -> Value {
        match json {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(*b),
            serde_json::Value::Number(n) => Value::Num(n.as_f64().unwrap_or(f64::NAN)),
            serde_json::Value::String(s) => Value::Str(s.clone()),
            serde_json::Value::Array(items) => {
                Value::list(items.iter().map(Value::from_json).collect())
            }
            serde_json::Value::Object(entries) => Value::map(
                entries
                    .iter()
                    .map(|(k, v)| (k.clone(), Value::from_json(v)))
                    .collect(),
            ),
        }
    }

    /// Bridge a sandbox value out to JSON. Functions become null; NaN and
    /// infinities become null; cycles degrade to null at a depth cap.
    #[must_use]
    pub fn to_json(&self) -> serde_json::Value {
        self.to_json_at_depth(0)
    }

    fn to_json_at_depth(&self, depth: usize) -> serde_json::Value {
        if depth > MAX_JSON_DEPTH {
            return serde_json::Value::Null;
        }
        match self {
            Value::Null => serde_json::Value::Null,
            Value::Bool(b) => serde_json::Value::Bool(*b),
            Value::Num(n) => serde_json::Number::from_f64(*n)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
            Value::Str(s) => serde_json::Value::String(s.clone()),
            Value::List(items) => {
                let items = lock_list(items);
                serde_json::Value::Array(
                    items.iter().map(|v| v.to_json_at_depth(depth + 1)).collect(),
                )
            }
            Value::Map(entries) => {
                let entries = lock_map(entries);
                serde_json::Value::Object(
                    entries
                        .iter()
                        .map(|(k, v)| (k.clone(), v.to_json_at_depth(depth + 1)))
                        .collect(),
                )
            }
            Value::Function(_) | Value::Native(_) => serde_json::Value::Null,
            Value::Node(node) => serde_json::to_value(node).unwrap_or(serde_json::Value::Null),
        }
    }

    /// Extract a string slice if this is a string value.
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s.as_str()),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_num(&self) -> Option<f64> {
        match self {
            Value::Num(n) => Some(*n),
            _ => None,
        }
    }

    /// Read a key from a map value.
    #[must_use]
    pub fn map_get(&self, key: &str) -> Option<Value> {
        match self {
            Value::Map(entries) => lock_map(entries).get(key).cloned(),
            _ => None,
        }
    }

    /// Snapshot of a map value's entries, in key order.
    #[must_use]
    pub fn map_entries(&self) -> Option<Vec<(String, Value)>> {
        match self {
            Value::Map(entries) => Some(
                lock_map(entries)
                    .iter()
                    .map(|(k, v)| (k.clone(), v.clone()))
                    .collect(),
            ),
            _ => None,
        }
    }

    /// Snapshot of a list value's items.
    #[must_use]
    pub fn list_items(&self) -> Option<Vec<Value>> {
        match self {
            Value::List(items) => Some(lock_list(items).clone()),
            _ => None,
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        self.strict_eq(other)
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "Null"),
            Value::Bool(b) => write!(f, "Bool({b})"),
            Value::Num(n) => write!(f, "Num({n})"),
            Value::Str(s) => write!(f, "Str({s:?})"),
            Value::List(items) => write!(f, "List(len={})", lock_list(items).len()),
            Value::Map(entries) => write!(f, "Map(len={})", lock_map(entries).len()),
            Value::Function(func) => {
                write!(f, "Function({})", func.name.as_deref().unwrap_or("<anon>"))
            }
            Value::Native(func) => write!(f, "Native({})", func.name),
            Value::Node(node) => write!(f, "Node({})", node.component),
        }
    }
}

/// JavaScript-style number formatting: integers print without a decimal
/// point, non-finite values print as NaN/Infinity.
fn format_number(n: f64) -> String {
    if n.is_nan() {
        "NaN".to_string()
    } else if n.is_infinite() {
        if n > 0.0 { "Infinity" } else { "-Infinity" }.to_string()
    } else if n == n.trunc() && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        format!("{n}")
    }
}

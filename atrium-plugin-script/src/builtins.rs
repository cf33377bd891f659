//! Built-in methods on primitive values.
//!
//! These are the only methods untrusted code can call on strings, lists,
//! and numbers. They are value-level conveniences, not capabilities: none
//! of them reach outside the value they are invoked on.

use std::sync::{Arc, Mutex};

use crate::error::ScriptError;
use crate::interp::Interpreter;
use crate::value::{Value, lock_list};

fn not_a_function(method: &str, type_name: &str) -> ScriptError {
    ScriptError::Runtime {
        message: format!("'{method}' is not a function on {type_name}"),
    }
}

/// Normalize a JavaScript-style slice index: negatives count from the end,
/// and the result is clamped to `0..=len`.
fn slice_index(raw: f64, len: usize) -> usize {
    if raw.is_nan() {
        return 0;
    }
    if raw < 0.0 {
        let back = (-raw) as usize;
        len.saturating_sub(back)
    } else {
        (raw as usize).min(len)
    }
}

// ================================================================
// Strings
// ================================================================

pub(crate) fn str_method(s: &str, method: &str, args: &[Value]) -> Result<Value, ScriptError> {
    let arg_str = |i: usize| -> String {
        args.get(i)
            .map(Value::to_display_string)
            .unwrap_or_default()
    };
    match method {
        "toUpperCase" => Ok(Value::Str(s.to_uppercase())),
        "toLowerCase" => Ok(Value::Str(s.to_lowercase())),
        "trim" => Ok(Value::str(s.trim())),
        "includes" => Ok(Value::Bool(s.contains(&arg_str(0)))),
        "startsWith" => Ok(Value::Bool(s.starts_with(&arg_str(0)))),
        "endsWith" => Ok(Value::Bool(s.ends_with(&arg_str(0)))),
        "split" => {
            let parts = match args.first() {
                None | Some(Value::Null) => vec![Value::str(s)],
                Some(sep) => {
                    let sep = sep.to_display_string();
                    if sep.is_empty() {
                        s.chars().map(|c| Value::Str(c.to_string())).collect()
                    } else {
                        s.split(sep.as_str()).map(Value::str).collect()
                    }
                }
            };
            Ok(Value::list(parts))
        }
        "slice" => {
            let chars: Vec<char> = s.chars().collect();
            let start = slice_index(
                args.first().map(Value::to_number).unwrap_or(0.0),
                chars.len(),
            );
            let end = slice_index(
                args.get(1).map(Value::to_number).unwrap_or(chars.len() as f64),
                chars.len(),
            );
            let out: String = if start < end {
                chars[start..end].iter().collect()
            } else {
                String::new()
            };
            Ok(Value::Str(out))
        }
        _ => Err(not_a_function(method, "string")),
    }
}

// ================================================================
// Lists
// ================================================================

pub(crate) fn list_method(
    interp: &mut Interpreter,
    items: &Arc<Mutex<Vec<Value>>>,
    method: &str,
    args: &[Value],
) -> Result<Value, ScriptError> {
    match method {
        "push" => {
            let mut items = lock_list(items);
            for arg in args {
                items.push(arg.clone());
            }
            Ok(Value::Num(items.len() as f64))
        }
        "map" => {
            let func = callback(args, "map")?;
            // Snapshot first: the callback may mutate the receiver.
            let snapshot: Vec<Value> = lock_list(items).clone();
            let mut out = Vec::with_capacity(snapshot.len());
            for (i, item) in snapshot.into_iter().enumerate() {
                out.push(interp.call(&func, &[item, Value::Num(i as f64)])?);
            }
            Ok(Value::list(out))
        }
        "filter" => {
            let func = callback(args, "filter")?;
            let snapshot: Vec<Value> = lock_list(items).clone();
            let mut out = Vec::new();
            for (i, item) in snapshot.into_iter().enumerate() {
                if interp
                    .call(&func, &[item.clone(), Value::Num(i as f64)])?
                    .is_truthy()
                {
                    out.push(item);
                }
            }
            Ok(Value::list(out))
        }
        "join" => {
            let sep = match args.first() {
                None | Some(Value::Null) => ",".to_string(),
                Some(sep) => sep.to_display_string(),
            };
            let items = lock_list(items);
            let joined = items
                .iter()
                .map(|item| match item {
                    Value::Null => String::new(),
                    other => other.to_display_string(),
                })
                .collect::<Vec<_>>()
                .join(&sep);
            Ok(Value::Str(joined))
        }
        "includes" => {
            let target = args.first().cloned().unwrap_or_default();
            let items = lock_list(items);
            Ok(Value::Bool(items.iter().any(|item| item.strict_eq(&target))))
        }
        "indexOf" => {
            let target = args.first().cloned().unwrap_or_default();
            let items = lock_list(items);
            let idx = items
                .iter()
                .position(|item| item.strict_eq(&target))
                .map(|i| i as f64)
                .unwrap_or(-1.0);
            Ok(Value::Num(idx))
        }
        "slice" => {
            let items = lock_list(items);
            let start = slice_index(args.first().map(Value::to_number).unwrap_or(0.0), items.len());
            let end = slice_index(
                args.get(1)
                    .map(Value::to_number)
                    .unwrap_or(items.len() as f64),
                items.len(),
            );
            let out = if start < end {
                items[start..end].to_vec()
            } else {
                Vec::new()
            };
            Ok(Value::list(out))
        }
        "concat" => {
            let mut out = lock_list(items).clone();
            for arg in args {
                match arg {
                    Value::List(other) => out.extend(lock_list(other).iter().cloned()),
                    other => out.push(other.clone()),
                }
            }
            Ok(Value::list(out))
        }
        _ => Err(not_a_function(method, "list")),
    }
}

fn callback(args: &[Value], method: &str) -> Result<Value, ScriptError> {
    match args.first() {
        Some(func) if func.is_callable() => Ok(func.clone()),
        _ => Err(ScriptError::Runtime {
            message: format!("{method} expects a function argument"),
        }),
    }
}

// ================================================================
// Numbers
// ================================================================

pub(crate) fn num_method(n: f64, method: &str, args: &[Value]) -> Result<Value, ScriptError> {
    match method {
        "toFixed" => {
            let digits = args.first().map(Value::to_number).unwrap_or(0.0);
            let digits = if digits.is_nan() {
                0
            } else {
                (digits.max(0.0) as usize).min(20)
            };
            Ok(Value::Str(format!("{n:.digits$}")))
        }
        _ => Err(not_a_function(method, "number")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn interp() -> Interpreter {
        Interpreter::new(10_000, 16)
    }

    #[test]
    fn string_methods_cover_the_documented_set() {
        assert_eq!(
            str_method("Hello", "toUpperCase", &[]).unwrap(),
            Value::str("HELLO")
        );
        assert_eq!(
            str_method("  pad  ", "trim", &[]).unwrap(),
            Value::str("pad")
        );
        assert_eq!(
            str_method("abcdef", "slice", &[Value::Num(1.0), Value::Num(-2.0)]).unwrap(),
            Value::str("bcd")
        );
        let Value::List(parts) = str_method("a,b,c", "split", &[Value::str(",")]).unwrap() else {
            panic!("expected list");
        };
        assert_eq!(
            lock_list(&parts).as_slice(),
            [Value::str("a"), Value::str("b"), Value::str("c")]
        );
        assert_eq!(
            str_method("plugin", "startsWith", &[Value::str("plug")]).unwrap(),
            Value::Bool(true)
        );
    }

    #[test]
    fn split_with_empty_separator_yields_characters() {
        let result = str_method("abc", "split", &[Value::str("")]).unwrap();
        let Value::List(items) = result else {
            panic!("expected list");
        };
        assert_eq!(lock_list(&items).len(), 3);
    }

    #[test]
    fn unknown_string_method_errors() {
        let err = str_method("x", "padStart", &[]).unwrap_err();
        assert!(err.to_string().contains("not a function on string"));
    }

    #[test]
    fn list_push_returns_new_length() {
        let list = Arc::new(Mutex::new(vec![Value::Num(1.0)]));
        let result = list_method(&mut interp(), &list, "push", &[Value::Num(2.0)]).unwrap();
        assert_eq!(result, Value::Num(2.0));
        assert_eq!(lock_list(&list).len(), 2);
    }

    #[test]
    fn list_map_passes_value_and_index() {
        let list = Arc::new(Mutex::new(vec![Value::str("a"), Value::str("b")]));
        let func = Value::native("label", |_, args| {
            let item = args.first().cloned().unwrap_or_default();
            let idx = args.get(1).cloned().unwrap_or_default();
            Ok(Value::Str(format!(
                "{}:{}",
                idx.to_display_string(),
                item.to_display_string()
            )))
        });
        let result = list_method(&mut interp(), &list, "map", &[func]).unwrap();
        let Value::List(out) = result else {
            panic!("expected list");
        };
        let out = lock_list(&out);
        assert_eq!(out[0], Value::str("0:a"));
        assert_eq!(out[1], Value::str("1:b"));
    }

    #[test]
    fn list_filter_keeps_truthy_results() {
        let list = Arc::new(Mutex::new(vec![
            Value::Num(1.0),
            Value::Num(0.0),
            Value::Num(3.0),
        ]));
        let keep = Value::native("keep", |_, args| {
            Ok(args.first().cloned().unwrap_or_default())
        });
        let result = list_method(&mut interp(), &list, "filter", &[keep]).unwrap();
        let Value::List(out) = result else {
            panic!("expected list");
        };
        assert_eq!(lock_list(&out).len(), 2);
    }

    #[test]
    fn list_join_renders_nulls_empty() {
        let list = Arc::new(Mutex::new(vec![
            Value::Num(1.0),
            Value::Null,
            Value::Num(2.0),
        ]));
        let result = list_method(&mut interp(), &list, "join", &[]).unwrap();
        assert_eq!(result, Value::str("1,,2"));
    }

    #[test]
    fn list_index_of_uses_strict_equality() {
        let list = Arc::new(Mutex::new(vec![Value::str("5"), Value::Num(5.0)]));
        let result = list_method(&mut interp(), &list, "indexOf", &[Value::Num(5.0)]).unwrap();
        assert_eq!(result, Value::Num(1.0));
    }

    #[test]
    fn list_concat_flattens_list_arguments() {
        let list = Arc::new(Mutex::new(vec![Value::Num(1.0)]));
        let other = Value::list(vec![Value::Num(2.0), Value::Num(3.0)]);
        let result =
            list_method(&mut interp(), &list, "concat", &[other, Value::Num(4.0)]).unwrap();
        let Value::List(out) = result else {
            panic!("expected list");
        };
        assert_eq!(lock_list(&out).len(), 4);
    }

    #[test]
    fn map_requires_a_callable() {
        let list = Arc::new(Mutex::new(vec![Value::Num(1.0)]));
        let err = list_method(&mut interp(), &list, "map", &[Value::Num(1.0)]).unwrap_err();
        assert!(err.to_string().contains("expects a function"));
    }

    #[test]
    fn to_fixed_formats_numbers() {
        assert_eq!(
            num_method(3.14159, "toFixed", &[Value::Num(2.0)]).unwrap(),
            Value::str("3.14")
        );
        assert_eq!(num_method(5.0, "toFixed", &[]).unwrap(), Value::str("5"));
    }
}

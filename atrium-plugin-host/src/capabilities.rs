//! Capability broker: everything sandboxed code is allowed to touch.
//!
//! `CapabilityBroker::issue` builds a fresh [`CapabilitySet`] for every
//! instantiation. The set seeds a sealed script environment with:
//!
//! - `api` — scoped request client, confined to the plugin API namespace
//! - `context` — config / data / updateData for this instantiation
//! - `Button`, `Card`, `TextInput`, `Text`, `Stack` — presentation
//!   primitives building [`UiNode`] trees
//! - `utils` — pure helpers (`formatDate`, `debounce`, `clamp`)
//! - the denied marker, bound to a function that always errors
//!
//! Nothing issued here is shared between two instantiations; a plugin can
//! never observe another plugin's capabilities or context.

use std::fmt::Write as _;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use chrono::{DateTime, TimeZone, Utc};
use tracing::{debug, warn};
use uuid::Uuid;

use atrium_plugin_api::UiNode;
use atrium_plugin_script::{Env, ScriptError, Value};

use crate::context::PluginContext;
use crate::error::SandboxError;
use crate::limits::SandboxLimits;
use crate::sanitizer::DENIED_MARKER;
use crate::transport::{ApiRequest, ApiTransport, HttpMethod};

/// Namespace every scoped request must stay inside.
pub const API_PREFIX: &str = "/api/plugins";

/// Issues per-instantiation capability sets over shared host plumbing.
pub struct CapabilityBroker {
    transport: Arc<dyn ApiTransport>,
    limits: SandboxLimits,
}

impl CapabilityBroker {
    pub fn new(transport: Arc<dyn ApiTransport>, limits: SandboxLimits) -> Self {
        Self { transport, limits }
    }

    #[must_use]
    pub fn limits(&self) -> &SandboxLimits {
        &self.limits
    }

    /// Fresh capabilities for one instantiation of one plugin component.
    #[must_use]
    pub fn issue(&self, plugin_id: u64, context: PluginContext) -> CapabilitySet {
        CapabilitySet {
            instance_id: Uuid::now_v7(),
            plugin_id,
            transport: Arc::clone(&self.transport),
            limits: self.limits.clone(),
            context,
        }
    }
}

/// The complete set of names one instantiation may see.
pub struct CapabilitySet {
    instance_id: Uuid,
    plugin_id: u64,
    transport: Arc<dyn ApiTransport>,
    limits: SandboxLimits,
    context: PluginContext,
}

impl CapabilitySet {
    #[must_use]
    pub fn instance_id(&self) -> Uuid {
        self.instance_id
    }

    #[must_use]
    pub fn plugin_id(&self) -> u64 {
        self.plugin_id
    }

    #[must_use]
    pub fn context(&self) -> &PluginContext {
        &self.context
    }

    /// Bind every capability into `env`. The environment starts sealed, so
    /// after seeding these names are the entire reachable world.
    pub fn seed(&self, env: &Env) {
        env.define("api", self.api_client());
        for component in ["Button", "Card", "TextInput", "Stack"] {
            env.define(component, self.ui_primitive(component));
        }
        env.define("Text", self.text_primitive());
        env.define("utils", self.utils_object());
        env.define(DENIED_MARKER, denied_native());
        self.bind_context(env);
        debug!(
            plugin_id = self.plugin_id,
            instance_id = %self.instance_id,
            "capability environment seeded"
        );
    }

    /// Rebind `context` with a fresh data snapshot. Called before every
    /// render so `context.data` reflects updates while staying a snapshot:
    /// mutating it directly changes nothing durable, only `updateData` does.
    pub fn bind_context(&self, env: &Env) {
        env.define("context", self.context_object());
    }

    // ================================================================
    // api
    // ================================================================

    fn api_client(&self) -> Value {
        Value::map_of([
            ("get".to_string(), self.request_native(HttpMethod::Get)),
            ("post".to_string(), self.request_native(HttpMethod::Post)),
            ("put".to_string(), self.request_native(HttpMethod::Put)),
            ("delete".to_string(), self.request_native(HttpMethod::Delete)),
        ])
    }

    fn request_native(&self, method: HttpMethod) -> Value {
        let transport = Arc::clone(&self.transport);
        let plugin_id = self.plugin_id;
        let instance_id = self.instance_id;
        let name = format!("api.{}", method.as_str().to_lowercase());
        Value::native(name, move |_, args| {
            let Some(path) = args.first().and_then(Value::as_str) else {
                return Ok(error_response("request path must be a string"));
            };
            let path = match validate_scoped_path(plugin_id, path) {
                Ok(path) => path,
                Err(err) => {
                    warn!(
                        plugin_id,
                        instance_id = %instance_id,
                        error = %err,
                        "scoped request rejected"
                    );
                    return Ok(error_response(err.detail()));
                }
            };

            let mut request = ApiRequest::new(method, path);
            if matches!(method, HttpMethod::Post | HttpMethod::Put)
                && let Some(body) = args.get(1)
            {
                request = request.with_body(body.to_json());
            }

            match transport.execute(&request) {
                Ok(response) => Ok(Value::map_of([
                    ("ok".to_string(), Value::Bool(response.is_success())),
                    ("status".to_string(), Value::Num(f64::from(response.status))),
                    ("body".to_string(), Value::from_json(&response.body)),
                ])),
                Err(err) => {
                    warn!(
                        plugin_id,
                        instance_id = %instance_id,
                        error = %err,
                        "scoped request failed"
                    );
                    Ok(error_response(err.detail()))
                }
            }
        })
    }

    // ================================================================
    // context
    // ================================================================

    fn context_object(&self) -> Value {
        let config_json = serde_json::Value::Object(self.context.config().as_map().clone());
        let data = Value::map_of(
            self.context
                .data_snapshot()
                .into_iter()
                .map(|(key, value)| (key, Value::from_json(&value))),
        );
        Value::map_of([
            ("config".to_string(), Value::from_json(&config_json)),
            ("data".to_string(), data),
            ("updateData".to_string(), self.update_data_native()),
        ])
    }

    fn update_data_native(&self) -> Value {
        let context = self.context.clone();
        Value::native("context.updateData", move |_, args| {
            let Some(key) = args.first().and_then(Value::as_str) else {
                return Err(ScriptError::Runtime {
                    message: "updateData requires a string key".to_string(),
                });
            };
            let value = args.get(1).cloned().unwrap_or_default();
            context.update_data(key, value.to_json());
            Ok(Value::Null)
        })
    }

    // ================================================================
    // presentation primitives
    // ================================================================

    /// Generic node builder: optional leading props map, then children.
    fn ui_primitive(&self, component: &'static str) -> Value {
        let max_nodes = self.limits.max_tree_nodes;
        Value::native(component, move |_, args| {
            let mut node = UiNode::new(component);
            let mut total = 1usize;

            let mut rest = args;
            if let Some(first @ Value::Map(_)) = args.first() {
                apply_props(&mut node, first, &mut total, max_nodes)?;
                rest = &args[1..];
            }
            for child in rest {
                append_child(&mut node, child, &mut total, max_nodes)?;
            }
            Ok(Value::Node(node))
        })
    }

    /// `Text(content)` or `Text({ text, ...props })`.
    fn text_primitive(&self) -> Value {
        let max_nodes = self.limits.max_tree_nodes;
        Value::native("Text", move |_, args| {
            match args.first() {
                Some(props @ Value::Map(_)) => {
                    let mut node = UiNode::new("Text");
                    let mut total = 1usize;
                    apply_props(&mut node, props, &mut total, max_nodes)?;
                    Ok(Value::Node(node))
                }
                Some(Value::Null) | None => Ok(Value::Node(UiNode::text(""))),
                Some(content) => Ok(Value::Node(UiNode::text(content.to_display_string()))),
            }
        })
    }

    // ================================================================
    // utils
    // ================================================================

    fn utils_object(&self) -> Value {
        Value::map_of([
            ("formatDate".to_string(), format_date_native()),
            ("debounce".to_string(), debounce_native()),
            ("clamp".to_string(), clamp_native()),
        ])
    }
}

fn error_response(message: impl Into<String>) -> Value {
    Value::map_of([
        ("ok".to_string(), Value::Bool(false)),
        ("status".to_string(), Value::Num(0.0)),
        ("error".to_string(), Value::Str(message.into())),
    ])
}

fn denied_native() -> Value {
    Value::native(DENIED_MARKER, |_, _| {
        Err(ScriptError::Runtime {
            message: "blocked construct invoked".to_string(),
        })
    })
}

// ================================================================
// Scoped path validation
// ================================================================

/// Canonicalize `raw` and require it to stay inside [`API_PREFIX`].
///
/// Segment-aware: `.` and `..` are resolved before the prefix check, one
/// round of percent-decoding is applied first, and scheme/backslash forms
/// are rejected outright. Queries and fragments are carried through
/// untouched. Returns the canonical path on success.
pub fn validate_scoped_path(plugin_id: u64, raw: &str) -> Result<String, SandboxError> {
    let violation = |message: String| SandboxError::CapabilityViolation {
        plugin_id,
        capability: "api.request".to_string(),
        message,
    };

    let decoded = percent_decode_once(raw);
    if decoded.contains("://") {
        return Err(violation("absolute URLs are not allowed".to_string()));
    }
    if decoded.contains('\\') {
        return Err(violation("backslashes are not allowed".to_string()));
    }
    if !decoded.starts_with('/') {
        return Err(violation("path must start with '/'".to_string()));
    }

    let (path_part, suffix) = match decoded.find(['?', '#']) {
        Some(idx) => decoded.split_at(idx),
        None => (decoded.as_str(), ""),
    };

    let mut segments: Vec<&str> = Vec::new();
    for segment in path_part.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                if segments.pop().is_none() {
                    return Err(violation(
                        "path escapes the plugin API namespace".to_string(),
                    ));
                }
            }
            other => segments.push(other),
        }
    }

    let canonical = format!("/{}", segments.join("/"));
    let in_namespace = canonical
        .strip_prefix(API_PREFIX)
        .is_some_and(|rest| rest.is_empty() || rest.starts_with('/'));
    if !in_namespace {
        return Err(violation(format!("path must stay under '{API_PREFIX}'")));
    }

    Ok(format!("{canonical}{suffix}"))
}

/// Decode `%XX` escapes once. Malformed escapes pass through literally;
/// decoded bytes that do not form UTF-8 are replaced, never trusted.
fn percent_decode_once(input: &str) -> String {
    let bytes = input.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' && i + 2 < bytes.len() {
            let hi = (bytes[i + 1] as char).to_digit(16);
            let lo = (bytes[i + 2] as char).to_digit(16);
            if let (Some(hi), Some(lo)) = (hi, lo) {
                out.push((hi * 16 + lo) as u8);
                i += 3;
                continue;
            }
        }
        out.push(bytes[i]);
        i += 1;
    }
    String::from_utf8_lossy(&out).into_owned()
}

// ================================================================
// Node construction
// ================================================================

fn budget_error(max_nodes: usize) -> ScriptError {
    ScriptError::Runtime {
        message: format!("ui tree exceeds {max_nodes} nodes"),
    }
}

fn apply_props(
    node: &mut UiNode,
    props: &Value,
    total: &mut usize,
    max_nodes: usize,
) -> Result<(), ScriptError> {
    for (key, value) in props.map_entries().unwrap_or_default() {
        if key == "children" {
            append_child(node, &value, total, max_nodes)?;
        } else if value.is_callable() {
            // Handlers cannot cross the render boundary; the host wires
            // interactivity separately.
            debug!(prop = %key, "dropping function-valued prop");
        } else {
            node.props.insert(key, value.to_json());
        }
    }
    Ok(())
}

pub(crate) fn append_child(
    node: &mut UiNode,
    child: &Value,
    total: &mut usize,
    max_nodes: usize,
) -> Result<(), ScriptError> {
    match child {
        // Conditional rendering: `cond && Card(...)` yields a bool to skip.
        Value::Null | Value::Bool(_) => Ok(()),
        Value::Node(child) => {
            *total += child.node_count();
            if *total > max_nodes {
                return Err(budget_error(max_nodes));
            }
            node.children.push(child.clone());
            Ok(())
        }
        Value::Str(_) | Value::Num(_) => {
            *total += 1;
            if *total > max_nodes {
                return Err(budget_error(max_nodes));
            }
            node.children.push(UiNode::text(child.to_display_string()));
            Ok(())
        }
        Value::List(_) => {
            for item in child.list_items().unwrap_or_default() {
                append_child(node, &item, total, max_nodes)?;
            }
            Ok(())
        }
        other => Err(ScriptError::Runtime {
            message: format!("{} is not a valid ui child", other.type_name()),
        }),
    }
}

// ================================================================
// Pure utils
// ================================================================

fn format_date_native() -> Value {
    Value::native("utils.formatDate", |_, args| {
        let instant: Option<DateTime<Utc>> = match args.first() {
            Some(Value::Num(ms)) if ms.is_finite() => {
                Utc.timestamp_millis_opt(*ms as i64).single()
            }
            Some(Value::Str(s)) => DateTime::parse_from_rfc3339(s)
                .ok()
                .map(|dt| dt.with_timezone(&Utc)),
            _ => None,
        };
        let Some(instant) = instant else {
            return Ok(Value::str("Invalid Date"));
        };

        let pattern = args
            .get(1)
            .and_then(Value::as_str)
            .unwrap_or("%Y-%m-%d");
        // An invalid pattern fails the write, never panics the host.
        let mut formatted = String::new();
        match write!(formatted, "{}", instant.format(pattern)) {
            Ok(()) => Ok(Value::Str(formatted)),
            Err(_) => Ok(Value::str("Invalid Date")),
        }
    })
}

fn debounce_native() -> Value {
    Value::native("utils.debounce", |_, args| {
        let Some(func) = args.first().filter(|v| v.is_callable()).cloned() else {
            return Err(ScriptError::Runtime {
                message: "debounce requires a function".to_string(),
            });
        };
        let wait_ms = args.get(1).map_or(0.0, Value::to_number);
        let wait = if wait_ms.is_finite() && wait_ms > 0.0 {
            Duration::from_millis(wait_ms as u64)
        } else {
            Duration::ZERO
        };

        // Leading edge with a wall-clock gate: the sandbox has no timers,
        // so there is nothing to schedule and no trailing call. A gated
        // call returns null.
        let last_fired: Mutex<Option<Instant>> = Mutex::new(None);
        Ok(Value::native("debounced", move |interp, call_args| {
            let now = Instant::now();
            {
                let mut last = last_fired.lock().unwrap_or_else(PoisonError::into_inner);
                if let Some(at) = *last
                    && now.duration_since(at) < wait
                {
                    return Ok(Value::Null);
                }
                *last = Some(now);
            }
            interp.call(&func, call_args)
        }))
    })
}

fn clamp_native() -> Value {
    Value::native("utils.clamp", |_, args| {
        let number = |idx: usize| args.get(idx).map_or(f64::NAN, Value::to_number);
        let value = number(0);
        let min = number(1);
        let max = number(2);
        // NaN comparisons are false, so NaN input passes through as NaN.
        let clamped = if value < min {
            min
        } else if value > max {
            max
        } else {
            value
        };
        Ok(Value::Num(clamped))
    })
}

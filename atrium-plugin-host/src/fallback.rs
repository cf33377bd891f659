//! Deterministic placeholder UI for failed components.
//!
//! Fallbacks are built fresh on every failure and never cached, so a fixed
//! plugin recovers on the next load. The rendered tree always names the
//! failing component and a sanitized error, nothing else.

use atrium_plugin_api::UiNode;
use serde_json::json;

use crate::error::SandboxError;

/// Longest error detail shown in fallback UI, in characters.
const MAX_MESSAGE_CHARS: usize = 200;

/// Reduce an error message to something safe to render: first non-empty
/// line, length-capped, never blank. Host-internal stack detail stays in
/// the logs.
#[must_use]
pub fn sanitize_error_message(raw: &str) -> String {
    let Some(first_line) = raw.lines().map(str::trim).find(|line| !line.is_empty()) else {
        return "unknown error".to_string();
    };
    if first_line.chars().count() <= MAX_MESSAGE_CHARS {
        return first_line.to_string();
    }
    let mut capped: String = first_line.chars().take(MAX_MESSAGE_CHARS).collect();
    capped.push_str("...");
    capped
}

/// Placeholder tree rendered in place of a failed component.
#[must_use]
pub fn fallback_node(component_name: &str, error: &SandboxError) -> UiNode {
    let message = sanitize_error_message(error.detail());
    UiNode::new("PluginErrorFallback")
        .with_prop("componentName", json!(component_name))
        .with_prop("message", json!(message))
        .with_child(UiNode::text(format!(
            "Plugin component '{component_name}' failed to load"
        )))
        .with_child(UiNode::text(message))
}

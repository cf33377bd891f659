//! Error types for the component sandbox.
//!
//! Every variant carries enough identity to log and to build a fallback
//! placeholder without consulting other state. None of these errors escape
//! [`crate::ComponentRegistry::get_or_load`] or a component render as a
//! panic; the public surface converts them into fallback UI.

use thiserror::Error;

#[derive(Debug, Clone, Error)]
pub enum SandboxError {
    #[error("compile failure: {plugin_id}:{component_name}: {message}")]
    CompileFailure {
        plugin_id: u64,
        component_name: String,
        message: String,
    },

    #[error("capability violation: plugin '{plugin_id}' misused '{capability}': {message}")]
    CapabilityViolation {
        plugin_id: u64,
        capability: String,
        message: String,
    },

    #[error("runtime failure: {plugin_id}:{component_name}: {message}")]
    RuntimeFailure {
        plugin_id: u64,
        component_name: String,
        message: String,
    },

    #[error("policy denied: plugin '{plugin_id}' is not allowed to load components")]
    PolicyDenied { plugin_id: u64 },

    #[error("transport error: {message}")]
    Transport { message: String },
}

impl SandboxError {
    /// Short stable label used in logs and metrics.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            SandboxError::CompileFailure { .. } => "compile_failure",
            SandboxError::CapabilityViolation { .. } => "capability_violation",
            SandboxError::RuntimeFailure { .. } => "runtime_failure",
            SandboxError::PolicyDenied { .. } => "policy_denied",
            SandboxError::Transport { .. } => "transport",
        }
    }

    /// The failure detail shown (after sanitization) inside fallback UI.
    #[must_use]
    pub fn detail(&self) -> &str {
        match self {
            SandboxError::CompileFailure { message, .. }
            | SandboxError::CapabilityViolation { message, .. }
            | SandboxError::RuntimeFailure { message, .. }
            | SandboxError::Transport { message } => message,
            SandboxError::PolicyDenied { .. } => "plugin disabled by policy",
        }
    }
}

//! Dynamic component sandbox for Atrium plugins.
//!
//! Compiles plugin-supplied component source into isolated script
//! environments, brokers the capabilities those components may touch, and
//! caches the compiled artifacts under `(plugin_id, component_name)` keys.
//!
//! The pipeline for one component is sanitize, parse, evaluate, resolve:
//! blocked constructs are neutralized before parsing, top-level code runs in
//! a sealed scope that sees only its issued [`CapabilitySet`], and the
//! resolved component function becomes a cached [`CompiledComponent`].
//! Failures never propagate to the host renderer; every failure path ends in
//! a deterministic fallback tree.

mod capabilities;
mod compiler;
mod context;
mod error;
mod fallback;
mod limits;
mod policy;
mod registry;
mod sanitizer;
mod transport;

pub use capabilities::{API_PREFIX, CapabilityBroker, CapabilitySet};
pub use compiler::{CompiledComponent, compile_component, source_fingerprint};
pub use context::PluginContext;
pub use error::SandboxError;
pub use fallback::fallback_node;
pub use limits::SandboxLimits;
pub use policy::{PolicyConfig, PolicyMode, SandboxPolicy};
pub use registry::{ComponentRegistry, PluginComponent, RegistryMetricsSnapshot};
pub use sanitizer::{DENIED_MARKER, SanitizationNotice, SanitizedSource, sanitize};
pub use transport::{ApiRequest, ApiResponse, ApiTransport, HttpApiTransport, HttpMethod};

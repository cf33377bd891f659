//! Shared plugin data model for Atrium.
//!
//! This crate defines the engine-agnostic types exchanged between the plugin
//! registry, the component sandbox, and the host renderer:
//! - Component descriptors and their `(plugin_id, component_name)` keys
//! - Per-instantiation plugin configuration
//! - The `UiNode` render tree that compiled components produce
//!
//! Everything here is plain data. Compilation, capability brokering, and
//! caching live in `atrium-plugin-host`; script execution lives in
//! `atrium-plugin-script`.

mod descriptor;
mod node;

pub use descriptor::{ComponentKey, ComponentType, PluginComponentDescriptor, PluginConfig};
pub use node::UiNode;

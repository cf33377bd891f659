//! Component descriptors supplied by the plugin registry.
//!
//! A [`PluginComponentDescriptor`] is the unit the registry hands to the
//! sandbox: identity, placement type, raw source text, and an opaque props
//! schema. Descriptors are immutable once handed over; the sandbox never
//! writes them back.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Where in the host shell a plugin component is mounted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ComponentType {
    /// Full page, mounted under its own route.
    Page,
    /// Embeddable dashboard widget.
    Widget,
    /// Overlay dialog.
    Modal,
    /// Left-rail panel.
    Sidebar,
    /// Top-bar extension.
    Navbar,
}

impl ComponentType {
    /// Stable lowercase name as it appears on the wire.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            ComponentType::Page => "page",
            ComponentType::Widget => "widget",
            ComponentType::Modal => "modal",
            ComponentType::Sidebar => "sidebar",
            ComponentType::Navbar => "navbar",
        }
    }

    /// Whether the host router expects a `route_path` for this type.
    #[must_use]
    pub fn requires_route(&self) -> bool {
        matches!(self, ComponentType::Page)
    }
}

impl fmt::Display for ComponentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Cache identity of one plugin component: `(plugin_id, component_name)`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComponentKey {
    pub plugin_id: u64,
    pub component_name: String,
}

impl ComponentKey {
    pub fn new(plugin_id: u64, component_name: impl Into<String>) -> Self {
        Self {
            plugin_id,
            component_name: component_name.into(),
        }
    }
}

impl fmt::Display for ComponentKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.plugin_id, self.component_name)
    }
}

/// One UI component as declared by an installed plugin.
///
/// `props_schema` maps prop names to schema descriptors. The sandbox treats
/// the schema as opaque JSON; only the host-side editor tooling interprets it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PluginComponentDescriptor {
    pub plugin_id: u64,
    pub component_name: String,
    pub component_type: ComponentType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub route_path: Option<String>,
    pub source_code: String,
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub props_schema: Map<String, Value>,
}

impl PluginComponentDescriptor {
    pub fn new(
        plugin_id: u64,
        component_name: impl Into<String>,
        component_type: ComponentType,
        source_code: impl Into<String>,
    ) -> Self {
        Self {
            plugin_id,
            component_name: component_name.into(),
            component_type,
            route_path: None,
            source_code: source_code.into(),
            props_schema: Map::new(),
        }
    }

    /// Attach the route this component mounts under (pages only).
    #[must_use]
    pub fn with_route_path(mut self, route_path: impl Into<String>) -> Self {
        self.route_path = Some(route_path.into());
        self
    }

    /// Attach the opaque props schema supplied by the plugin manifest.
    #[must_use]
    pub fn with_props_schema(mut self, props_schema: Map<String, Value>) -> Self {
        self.props_schema = props_schema;
        self
    }

    /// Cache key for this descriptor.
    #[must_use]
    pub fn key(&self) -> ComponentKey {
        ComponentKey::new(self.plugin_id, self.component_name.clone())
    }
}

/// Opaque per-instantiation configuration passed unchanged into the sandbox.
///
/// Immutable for the lifetime of one instantiation. The host builds it from
/// the plugin's stored settings; sandboxed code sees it as `context.config`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PluginConfig(Map<String, Value>);

impl PluginConfig {
    #[must_use]
    pub fn new() -> Self {
        Self(Map::new())
    }

    /// Host-side builder step; sandboxed code has no mutation path.
    #[must_use]
    pub fn with(mut self, key: impl Into<String>, value: Value) -> Self {
        self.0.insert(key.into(), value);
        self
    }

    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.0.iter()
    }

    /// The underlying JSON map, for bridging into the script engine.
    #[must_use]
    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }
}

impl From<Map<String, Value>> for PluginConfig {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}

//! The render tree produced by sandboxed components.
//!
//! A component invocation returns a [`UiNode`]: a named primitive, a JSON
//! props bag, and child nodes. The host renderer maps primitive names onto
//! its own widget set; the sandbox only guarantees the shape.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// One node of a component's rendered output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UiNode {
    /// Primitive name, e.g. `"Button"`, `"Card"`, `"Text"`.
    pub component: String,
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub props: Map<String, Value>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<UiNode>,
}

impl UiNode {
    pub fn new(component: impl Into<String>) -> Self {
        Self {
            component: component.into(),
            props: Map::new(),
            children: Vec::new(),
        }
    }

    /// Shorthand for a `Text` node carrying a literal string.
    pub fn text(content: impl Into<String>) -> Self {
        Self::new("Text").with_prop("text", Value::String(content.into()))
    }

    #[must_use]
    pub fn with_prop(mut self, key: impl Into<String>, value: Value) -> Self {
        self.props.insert(key.into(), value);
        self
    }

    #[must_use]
    pub fn with_child(mut self, child: UiNode) -> Self {
        self.children.push(child);
        self
    }

    #[must_use]
    pub fn with_children(mut self, children: Vec<UiNode>) -> Self {
        self.children = children;
        self
    }

    #[must_use]
    pub fn prop(&self, key: &str) -> Option<&Value> {
        self.props.get(key)
    }

    /// Total node count of this subtree, including self.
    ///
    /// The sandbox uses this to enforce output-size limits on untrusted
    /// components.
    #[must_use]
    pub fn node_count(&self) -> usize {
        1 + self.children.iter().map(UiNode::node_count).sum::<usize>()
    }

    /// Depth-first search for the first descendant (or self) with the given
    /// primitive name.
    #[must_use]
    pub fn find(&self, component: &str) -> Option<&UiNode> {
        if self.component == component {
            return Some(self);
        }
        self.children.iter().find_map(|child| child.find(component))
    }
}

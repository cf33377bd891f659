//! Per-instantiation plugin context: immutable config, mutable data store.
//!
//! One context belongs to exactly one plugin instantiation. The host seeds
//! it, sandboxed code reads `config`/`data` and mutates only through
//! `update_data`. Nothing here is shared across plugins or across two
//! instantiations of the same plugin.

use std::collections::BTreeMap;
use std::sync::{Arc, PoisonError, RwLock};

use serde_json::Value;

use atrium_plugin_api::PluginConfig;

/// Shared handle to one instantiation's context. Clones are cheap and refer
/// to the same data store, so the host and the capability set observe each
/// other's updates within the instantiation.
#[derive(Debug, Clone)]
pub struct PluginContext {
    config: PluginConfig,
    data: Arc<RwLock<BTreeMap<String, Value>>>,
}

impl PluginContext {
    #[must_use]
    pub fn new(config: PluginConfig) -> Self {
        Self {
            config,
            data: Arc::new(RwLock::new(BTreeMap::new())),
        }
    }

    /// Seed initial data entries (host-side, before first render).
    #[must_use]
    pub fn with_data(self, entries: impl IntoIterator<Item = (String, Value)>) -> Self {
        {
            let mut data = self
                .data
                .write()
                .unwrap_or_else(PoisonError::into_inner);
            data.extend(entries);
        }
        self
    }

    #[must_use]
    pub fn config(&self) -> &PluginConfig {
        &self.config
    }

    #[must_use]
    pub fn get(&self, key: &str) -> Option<Value> {
        self.data
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned()
    }

    /// The only mutation path for plugin data. Sandboxed code reaches this
    /// through the `context.updateData` capability.
    pub fn update_data(&self, key: impl Into<String>, value: Value) {
        let mut data = self
            .data
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        data.insert(key.into(), value);
    }

    /// Point-in-time copy of the data store. Renders read from a snapshot,
    /// so direct mutation of the snapshot never reaches the store.
    #[must_use]
    pub fn data_snapshot(&self) -> BTreeMap<String, Value> {
        self.data
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

//! Compiler/loader: turns sanitized plugin source into an invocable
//! component.
//!
//! Evaluation happens in a sealed environment whose only bindings come from
//! the instantiation's [`CapabilitySet`]. Resolution order for "the
//! component": an explicit default export first, otherwise the first
//! top-level uppercase-named callable in declaration order. Every failure
//! mode, from lexing through top-level execution, is reported as
//! [`SandboxError::CompileFailure`]; nothing is re-thrown past this
//! boundary.

use serde_json::{Map, Value as JsonValue};
use sha2::{Digest, Sha256};
use tracing::{debug, error, info, warn};

use atrium_plugin_api::{ComponentKey, PluginComponentDescriptor, UiNode};
use atrium_plugin_script::{Env, Interpreter, Value, parse};

use crate::capabilities::{CapabilitySet, append_child};
use crate::error::SandboxError;
use crate::limits::SandboxLimits;
use crate::sanitizer::{SanitizationNotice, sanitize};

/// An evaluated component: the callable, its sealed environment, and the
/// capabilities it was bound to. Lives in the registry behind an `Arc`.
pub struct CompiledComponent {
    key: ComponentKey,
    component: Value,
    env: Env,
    capabilities: CapabilitySet,
    limits: SandboxLimits,
    fingerprint: String,
    notices: Vec<SanitizationNotice>,
    props_schema: Map<String, JsonValue>,
}

impl std::fmt::Debug for CompiledComponent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompiledComponent")
            .field("key", &self.key)
            .field("fingerprint", &self.fingerprint)
            .field("notices", &self.notices)
            .finish_non_exhaustive()
    }
}

impl CompiledComponent {
    #[must_use]
    pub fn key(&self) -> &ComponentKey {
        &self.key
    }

    /// Hex sha-256 of the descriptor source this component was built from.
    #[must_use]
    pub fn fingerprint(&self) -> &str {
        &self.fingerprint
    }

    #[must_use]
    pub fn notices(&self) -> &[SanitizationNotice] {
        &self.notices
    }

    #[must_use]
    pub fn capabilities(&self) -> &CapabilitySet {
        &self.capabilities
    }

    /// One render: fresh interpreter, fresh context snapshot, full budget.
    ///
    /// Component state lives in the captured environment, so it survives
    /// across invocations; fuel does not.
    pub fn invoke(&self, props: &JsonValue) -> Result<UiNode, SandboxError> {
        self.check_props_against_schema(props);
        self.capabilities.bind_context(&self.env);

        let mut interp = Interpreter::new(
            self.limits.fuel_per_render,
            self.limits.max_call_depth,
        );
        let props_value = Value::from_json(props);
        let rendered = interp
            .call(&self.component, std::slice::from_ref(&props_value))
            .map_err(|e| self.runtime_failure(e.to_string()))?;

        self.to_node(rendered)
    }

    /// Convert a render result into a `UiNode`. Mirrors what hosts accept
    /// from components: nodes, nothing, text, or a list of children.
    fn to_node(&self, rendered: Value) -> Result<UiNode, SandboxError> {
        match rendered {
            Value::Node(node) => Ok(node),
            Value::Null | Value::Bool(_) => Ok(UiNode::new("Fragment")),
            Value::Str(_) | Value::Num(_) => Ok(UiNode::text(rendered.to_display_string())),
            Value::List(_) => {
                let mut fragment = UiNode::new("Fragment");
                let mut total = 1usize;
                for item in rendered.list_items().unwrap_or_default() {
                    append_child(
                        &mut fragment,
                        &item,
                        &mut total,
                        self.limits.max_tree_nodes,
                    )
                    .map_err(|e| self.runtime_failure(e.to_string()))?;
                }
                Ok(fragment)
            }
            other => Err(self.runtime_failure(format!(
                "component returned {}, expected a ui node",
                other.type_name()
            ))),
        }
    }

    /// The schema is opaque to the sandbox; the only check is advisory.
    fn check_props_against_schema(&self, props: &JsonValue) {
        if self.props_schema.is_empty() {
            return;
        }
        if let JsonValue::Object(entries) = props {
            for key in entries.keys() {
                if !self.props_schema.contains_key(key) {
                    debug!(
                        plugin_id = self.key.plugin_id,
                        component = %self.key.component_name,
                        prop = %key,
                        "prop not declared in schema"
                    );
                }
            }
        }
    }

    fn runtime_failure(&self, message: String) -> SandboxError {
        SandboxError::RuntimeFailure {
            plugin_id: self.key.plugin_id,
            component_name: self.key.component_name.clone(),
            message,
        }
    }
}

/// Sanitize, parse, and evaluate a descriptor into a component.
///
/// The capability set becomes the entire world visible to the source; the
/// top level runs under the same fuel and depth budgets as a render.
pub fn compile_component(
    descriptor: &PluginComponentDescriptor,
    capabilities: CapabilitySet,
    limits: SandboxLimits,
) -> Result<CompiledComponent, SandboxError> {
    let key = descriptor.key();
    let compile_failure = |message: String| SandboxError::CompileFailure {
        plugin_id: key.plugin_id,
        component_name: key.component_name.clone(),
        message,
    };

    let sanitized = sanitize(&descriptor.source_code);
    for notice in &sanitized.notices {
        warn!(
            plugin_id = key.plugin_id,
            component = %key.component_name,
            construct = notice.construct,
            occurrences = notice.occurrences,
            "neutralized disallowed construct"
        );
    }

    let program = match parse(&sanitized.source) {
        Ok(program) => program,
        Err(e) => {
            error!(
                plugin_id = key.plugin_id,
                component = %key.component_name,
                error = %e,
                "component source failed to parse"
            );
            return Err(compile_failure(e.to_string()));
        }
    };

    let env = Env::sealed();
    capabilities.seed(&env);

    let mut interp = Interpreter::new(limits.fuel_per_render, limits.max_call_depth);
    if let Err(e) = interp.run_program(&program, &env) {
        error!(
            plugin_id = key.plugin_id,
            component = %key.component_name,
            error = %e,
            "component source failed to evaluate"
        );
        return Err(compile_failure(e.to_string()));
    }

    let component = match interp.take_default_export() {
        Some(export) if export.is_callable() => export,
        Some(_) => return Err(compile_failure("No valid component found".to_string())),
        None => match resolve_named_component(program.declared_names(), &env) {
            Some(component) => component,
            None => return Err(compile_failure("No valid component found".to_string())),
        },
    };

    let fingerprint = hex::encode(Sha256::digest(descriptor.source_code.as_bytes()));
    info!(
        plugin_id = key.plugin_id,
        component = %key.component_name,
        fingerprint = %&fingerprint[..12],
        fuel_used = interp.fuel_used(),
        "component compiled"
    );

    Ok(CompiledComponent {
        key,
        component,
        env,
        capabilities,
        limits,
        fingerprint,
        notices: sanitized.notices,
        props_schema: descriptor.props_schema.clone(),
    })
}

/// First top-level callable whose name starts uppercase, in declaration
/// order.
fn resolve_named_component<'a>(
    declared: impl IntoIterator<Item = &'a str>,
    env: &Env,
) -> Option<Value> {
    declared
        .into_iter()
        .filter(|name| name.starts_with(char::is_uppercase))
        .filter_map(|name| env.get(name))
        .find(Value::is_callable)
}

/// Hex sha-256 over raw descriptor source, for staleness diagnostics.
#[must_use]
pub fn source_fingerprint(source: &str) -> String {
    hex::encode(Sha256::digest(source.as_bytes()))
}

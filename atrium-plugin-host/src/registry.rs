//! Component registry: the process-wide cache of compiled components.
//!
//! An explicit, injectable value; hosts construct one and pass it where
//! needed, tests construct as many as they like. Guarantees:
//!
//! - `get_or_load` and `PluginComponent::render` never return errors and
//!   never panic; failures come back as fallback-rendering handles.
//! - Concurrent `get_or_load` calls for the same key collapse into one
//!   compile (single-flight); different keys proceed independently.
//! - Failures are never cached. A failed compile, a policy denial, or a
//!   failed first render leaves the key vacant so the next call retries.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError, Weak};

use serde::Serialize;
use serde_json::Value as JsonValue;
use tracing::{debug, info, warn};

use atrium_plugin_api::{ComponentKey, PluginComponentDescriptor, PluginConfig, UiNode};

use crate::capabilities::CapabilityBroker;
use crate::compiler::{CompiledComponent, compile_component, source_fingerprint};
use crate::context::PluginContext;
use crate::error::SandboxError;
use crate::fallback::fallback_node;
use crate::limits::SandboxLimits;
use crate::policy::SandboxPolicy;
use crate::transport::{ApiTransport, HttpApiTransport};

/// Shared handle to one registry. Clones refer to the same cache.
#[derive(Clone)]
pub struct ComponentRegistry {
    inner: Arc<RegistryInner>,
}

struct RegistryInner {
    entries: Mutex<HashMap<ComponentKey, Slot>>,
    broker: CapabilityBroker,
    policy: SandboxPolicy,
    metrics: RegistryMetrics,
}

/// State of one key. `Compiling` carries the flight every concurrent caller
/// parks on; `Ready` is the cached artifact.
enum Slot {
    Compiling(Arc<Flight>),
    Ready(Arc<CompiledComponent>),
}

/// Single-flight rendezvous: the compiling thread publishes exactly once,
/// every waiter clones the shared outcome.
struct Flight {
    result: Mutex<Option<CompileOutcome>>,
    done: Condvar,
}

type CompileOutcome = Result<Arc<CompiledComponent>, Arc<SandboxError>>;

impl Flight {
    fn new() -> Self {
        Self {
            result: Mutex::new(None),
            done: Condvar::new(),
        }
    }

    fn publish(&self, outcome: CompileOutcome) {
        let mut guard = self.result.lock().unwrap_or_else(PoisonError::into_inner);
        *guard = Some(outcome);
        self.done.notify_all();
    }

    fn wait(&self) -> CompileOutcome {
        let mut guard = self.result.lock().unwrap_or_else(PoisonError::into_inner);
        loop {
            if let Some(outcome) = guard.as_ref() {
                return outcome.clone();
            }
            guard = self.done.wait(guard).unwrap_or_else(PoisonError::into_inner);
        }
    }
}

impl ComponentRegistry {
    pub fn new(
        transport: Arc<dyn ApiTransport>,
        policy: SandboxPolicy,
        limits: SandboxLimits,
    ) -> Self {
        Self {
            inner: Arc::new(RegistryInner {
                entries: Mutex::new(HashMap::new()),
                broker: CapabilityBroker::new(transport, limits),
                policy,
                metrics: RegistryMetrics::default(),
            }),
        }
    }

    /// Registry wired to the host's own API server over HTTP, with the
    /// request timeout taken from the limits tier.
    pub fn with_http_transport(
        base_url: impl Into<String>,
        policy: SandboxPolicy,
        limits: SandboxLimits,
    ) -> Self {
        let transport = Arc::new(HttpApiTransport::new(base_url, limits.request_timeout_ms));
        Self::new(transport, policy, limits)
    }

    /// Resolve a component for this descriptor, compiling on a miss.
    ///
    /// Infallible: the returned handle either renders the real component or
    /// a fallback. The cache is only ever mutated on success.
    pub fn get_or_load(
        &self,
        descriptor: &PluginComponentDescriptor,
        config: PluginConfig,
    ) -> PluginComponent {
        let key = descriptor.key();

        if !self.inner.policy.is_allowed(key.plugin_id) {
            warn!(
                plugin_id = key.plugin_id,
                component = %key.component_name,
                "plugin blocked by execution policy"
            );
            return self.failed_handle(key, SandboxError::PolicyDenied {
                plugin_id: descriptor.plugin_id,
            });
        }

        let flight = {
            let mut entries = self.inner.lock_entries();
            match entries.get(&key) {
                Some(Slot::Ready(compiled)) => {
                    self.inner.metrics.cache_hits.fetch_add(1, Ordering::Relaxed);
                    debug!(
                        plugin_id = key.plugin_id,
                        component = %key.component_name,
                        "component cache hit"
                    );
                    if compiled.fingerprint() != source_fingerprint(&descriptor.source_code) {
                        debug!(
                            plugin_id = key.plugin_id,
                            component = %key.component_name,
                            "descriptor source changed since compile, invalidate to refresh"
                        );
                    }
                    return self.ready_handle(key, Arc::clone(compiled));
                }
                Some(Slot::Compiling(flight)) => Arc::clone(flight),
                None => {
                    self.inner.metrics.cache_misses.fetch_add(1, Ordering::Relaxed);
                    let flight = Arc::new(Flight::new());
                    entries.insert(key.clone(), Slot::Compiling(Arc::clone(&flight)));
                    drop(entries);
                    return self.compile_and_publish(descriptor, config, key, flight);
                }
            }
        };

        // Another caller owns the compile; park until it publishes.
        match flight.wait() {
            Ok(compiled) => {
                self.inner.metrics.cache_hits.fetch_add(1, Ordering::Relaxed);
                self.ready_handle(key, compiled)
            }
            Err(err) => PluginComponent {
                key,
                state: ComponentState::Failed(err),
                registry: Arc::downgrade(&self.inner),
            },
        }
    }

    fn compile_and_publish(
        &self,
        descriptor: &PluginComponentDescriptor,
        config: PluginConfig,
        key: ComponentKey,
        flight: Arc<Flight>,
    ) -> PluginComponent {
        self.inner.metrics.compiles.fetch_add(1, Ordering::Relaxed);

        let context = PluginContext::new(config);
        let capabilities = self.inner.broker.issue(key.plugin_id, context);
        let limits = self.inner.broker.limits().clone();

        match compile_component(descriptor, capabilities, limits) {
            Ok(compiled) => {
                let compiled = Arc::new(compiled);
                {
                    let mut entries = self.inner.lock_entries();
                    // Publish into the slot only if this flight still owns
                    // it; an invalidate during compile wins.
                    if let Some(Slot::Compiling(current)) = entries.get(&key)
                        && Arc::ptr_eq(current, &flight)
                    {
                        entries.insert(key.clone(), Slot::Ready(Arc::clone(&compiled)));
                    }
                }
                flight.publish(Ok(Arc::clone(&compiled)));
                self.ready_handle(key, compiled)
            }
            Err(err) => {
                let err = Arc::new(err);
                {
                    let mut entries = self.inner.lock_entries();
                    if let Some(Slot::Compiling(current)) = entries.get(&key)
                        && Arc::ptr_eq(current, &flight)
                    {
                        entries.remove(&key);
                    }
                }
                flight.publish(Err(Arc::clone(&err)));
                PluginComponent {
                    key,
                    state: ComponentState::Failed(err),
                    registry: Arc::downgrade(&self.inner),
                }
            }
        }
    }

    fn ready_handle(&self, key: ComponentKey, compiled: Arc<CompiledComponent>) -> PluginComponent {
        PluginComponent {
            key,
            state: ComponentState::Ready {
                compiled,
                first_rendered: AtomicBool::new(false),
            },
            registry: Arc::downgrade(&self.inner),
        }
    }

    fn failed_handle(&self, key: ComponentKey, err: SandboxError) -> PluginComponent {
        PluginComponent {
            key,
            state: ComponentState::Failed(Arc::new(err)),
            registry: Arc::downgrade(&self.inner),
        }
    }

    /// Remove one entry. The next `get_or_load` for the key recompiles.
    pub fn invalidate(&self, plugin_id: u64, component_name: &str) -> bool {
        let key = ComponentKey::new(plugin_id, component_name);
        let removed = self.inner.lock_entries().remove(&key).is_some();
        if removed {
            self.inner.metrics.evictions.fetch_add(1, Ordering::Relaxed);
            info!(plugin_id, component = %component_name, "component invalidated");
        }
        removed
    }

    /// Drop every entry, returning how many were removed.
    pub fn clear_all(&self) -> usize {
        let mut entries = self.inner.lock_entries();
        let removed = entries.len();
        entries.clear();
        drop(entries);
        if removed > 0 {
            self.inner
                .metrics
                .evictions
                .fetch_add(removed as u64, Ordering::Relaxed);
            info!(removed, "component cache cleared");
        }
        removed
    }

    /// Number of cached (ready) components.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner
            .lock_entries()
            .values()
            .filter(|slot| matches!(slot, Slot::Ready(_)))
            .count()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[must_use]
    pub fn contains(&self, plugin_id: u64, component_name: &str) -> bool {
        let key = ComponentKey::new(plugin_id, component_name);
        matches!(self.inner.lock_entries().get(&key), Some(Slot::Ready(_)))
    }

    /// Point-in-time counters for operators and tests.
    #[must_use]
    pub fn metrics(&self) -> RegistryMetricsSnapshot {
        self.inner.metrics.snapshot()
    }
}

impl RegistryInner {
    fn lock_entries(&self) -> MutexGuard<'_, HashMap<ComponentKey, Slot>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

// ================================================================
// Render handles
// ================================================================

/// What the host renderer holds: an invocable that always yields a tree.
pub struct PluginComponent {
    key: ComponentKey,
    state: ComponentState,
    registry: Weak<RegistryInner>,
}

enum ComponentState {
    Ready {
        compiled: Arc<CompiledComponent>,
        first_rendered: AtomicBool,
    },
    Failed(Arc<SandboxError>),
}

impl PluginComponent {
    #[must_use]
    pub fn key(&self) -> &ComponentKey {
        &self.key
    }

    /// Whether this handle can only render the fallback placeholder.
    #[must_use]
    pub fn is_fallback(&self) -> bool {
        matches!(self.state, ComponentState::Failed(_))
    }

    /// The load failure behind a fallback handle, if any.
    #[must_use]
    pub fn error(&self) -> Option<&SandboxError> {
        match &self.state {
            ComponentState::Failed(err) => Some(err),
            ComponentState::Ready { .. } => None,
        }
    }

    /// The shared compiled artifact, when the load succeeded.
    #[must_use]
    pub fn compiled(&self) -> Option<&Arc<CompiledComponent>> {
        match &self.state {
            ComponentState::Ready { compiled, .. } => Some(compiled),
            ComponentState::Failed(_) => None,
        }
    }

    /// Render one frame. Never panics, never returns an error: any failure
    /// yields the fallback placeholder for this component.
    ///
    /// A failure on the *first* invocation additionally evicts the cache
    /// entry, so the next `get_or_load` retries from source; failures after
    /// a successful render keep the entry (transient errors should not
    /// throw away a working component).
    pub fn render(&self, props: &JsonValue) -> UiNode {
        match &self.state {
            ComponentState::Failed(err) => self.fallback(err),
            ComponentState::Ready {
                compiled,
                first_rendered,
            } => match compiled.invoke(props) {
                Ok(node) => {
                    first_rendered.store(true, Ordering::Relaxed);
                    node
                }
                Err(err) => {
                    warn!(
                        plugin_id = self.key.plugin_id,
                        component = %self.key.component_name,
                        error = %err,
                        "render failed"
                    );
                    if !first_rendered.load(Ordering::Relaxed) {
                        self.evict_if_current(compiled);
                    }
                    self.fallback(&err)
                }
            },
        }
    }

    fn fallback(&self, err: &SandboxError) -> UiNode {
        if let Some(inner) = self.registry.upgrade() {
            inner.metrics.fallbacks.fetch_add(1, Ordering::Relaxed);
        }
        debug!(
            plugin_id = self.key.plugin_id,
            component = %self.key.component_name,
            kind = err.kind(),
            "rendering fallback"
        );
        fallback_node(&self.key.component_name, err)
    }

    /// Remove the cache entry only while it still holds this exact
    /// artifact; a recompile that happened in between stays cached.
    fn evict_if_current(&self, compiled: &Arc<CompiledComponent>) {
        let Some(inner) = self.registry.upgrade() else {
            return;
        };
        let mut entries = inner.lock_entries();
        if let Some(Slot::Ready(current)) = entries.get(&self.key)
            && Arc::ptr_eq(current, compiled)
        {
            entries.remove(&self.key);
            inner.metrics.evictions.fetch_add(1, Ordering::Relaxed);
        }
    }
}

// ================================================================
// Metrics
// ================================================================

#[derive(Default)]
struct RegistryMetrics {
    compiles: AtomicU64,
    cache_hits: AtomicU64,
    cache_misses: AtomicU64,
    fallbacks: AtomicU64,
    evictions: AtomicU64,
}

impl RegistryMetrics {
    fn snapshot(&self) -> RegistryMetricsSnapshot {
        RegistryMetricsSnapshot {
            compiles: self.compiles.load(Ordering::Relaxed),
            cache_hits: self.cache_hits.load(Ordering::Relaxed),
            cache_misses: self.cache_misses.load(Ordering::Relaxed),
            fallbacks: self.fallbacks.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
        }
    }
}

/// Counter snapshot exposed to operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RegistryMetricsSnapshot {
    pub compiles: u64,
    pub cache_hits: u64,
    pub cache_misses: u64,
    pub fallbacks: u64,
    pub evictions: u64,
}

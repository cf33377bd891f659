//! End-to-end lifecycle tests at the registry boundary: load, cache,
//! render, fail, invalidate. Everything here goes through the public
//! crate surface the host renderer uses.

use std::sync::Arc;

use serde_json::{Value as JsonValue, json};

use atrium_plugin_api::{ComponentType, PluginComponentDescriptor, PluginConfig, UiNode};
use atrium_plugin_host::*;

struct NullTransport;

impl ApiTransport for NullTransport {
    fn execute(&self, _request: &ApiRequest) -> Result<ApiResponse, SandboxError> {
        Ok(ApiResponse {
            status: 200,
            body: JsonValue::Null,
        })
    }
}

fn registry() -> ComponentRegistry {
    ComponentRegistry::new(
        Arc::new(NullTransport),
        SandboxPolicy::unrestricted(),
        SandboxLimits::first_party(),
    )
}

fn descriptor(plugin_id: u64, name: &str, source: &str) -> PluginComponentDescriptor {
    PluginComponentDescriptor::new(plugin_id, name, ComponentType::Widget, source)
}

fn rendered_json(node: &UiNode) -> String {
    serde_json::to_string(node).unwrap()
}

// ================================================================
// Loading and caching
// ================================================================

#[test]
fn a_widget_loads_once_and_is_shared_afterwards() {
    let registry = registry();
    let descriptor = descriptor(
        7,
        "Widget",
        "function Widget(){ return null } export default Widget",
    );

    let first = registry.get_or_load(&descriptor, PluginConfig::new());
    assert!(!first.is_fallback());
    assert_eq!(first.render(&json!({})).component, "Fragment");

    let second = registry.get_or_load(&descriptor, PluginConfig::new());
    assert!(Arc::ptr_eq(
        first.compiled().unwrap(),
        second.compiled().unwrap()
    ));
    assert_eq!(registry.metrics().compiles, 1);
}

#[test]
fn render_passes_props_into_the_component() {
    let registry = registry();
    let descriptor = descriptor(
        3,
        "PollWidget",
        "function PollWidget(props) {
             return Card({ title: props.title }, [
                 Text('votes: ' + props.votes),
                 Button({ label: 'Vote' })
             ])
         }
         export default PollWidget",
    );

    let handle = registry.get_or_load(&descriptor, PluginConfig::new());
    let node = handle.render(&json!({ "title": "Lunch poll", "votes": 12 }));

    assert_eq!(node.component, "Card");
    assert_eq!(node.prop("title"), Some(&json!("Lunch poll")));
    assert_eq!(node.children.len(), 2);
    assert_eq!(node.children[0].prop("text"), Some(&json!("votes: 12")));
    assert_eq!(node.children[1].component, "Button");
}

#[test]
fn invalidate_then_load_compiles_exactly_once_more() {
    let registry = registry();
    let descriptor = descriptor(
        7,
        "Widget",
        "export default function Widget() { return Text('v1') }",
    );

    let first = registry.get_or_load(&descriptor, PluginConfig::new());
    assert!(registry.invalidate(7, "Widget"));
    let second = registry.get_or_load(&descriptor, PluginConfig::new());

    assert!(!Arc::ptr_eq(
        first.compiled().unwrap(),
        second.compiled().unwrap()
    ));
    assert_eq!(registry.metrics().compiles, 2);
}

#[test]
fn clear_all_resets_every_plugin() {
    let registry = registry();
    let source = "export default function Widget() { return null }";
    registry.get_or_load(&descriptor(1, "Widget", source), PluginConfig::new());
    registry.get_or_load(&descriptor(2, "Widget", source), PluginConfig::new());

    assert_eq!(registry.len(), 2);
    assert_eq!(registry.clear_all(), 2);
    assert!(registry.is_empty());

    registry.get_or_load(&descriptor(1, "Widget", source), PluginConfig::new());
    assert_eq!(registry.metrics().compiles, 3);
}

// ================================================================
// Sanitized sources
// ================================================================

#[test]
fn neutralized_sources_cannot_reach_dynamic_evaluation() {
    let source = "export default function Widget(props) {
                      return Text(eval(props.userInput))
                  }";
    assert!(!sanitize(source).source.contains("eval("));

    let registry = registry();
    let handle = registry.get_or_load(&descriptor(9, "Widget", source), PluginConfig::new());
    assert!(!handle.is_fallback());

    // The blocked call is reachable only as the denied marker, which errors.
    let node = handle.render(&json!({ "userInput": "2 + 2" }));
    assert_eq!(node.component, "PluginErrorFallback");
    assert!(rendered_json(&node).contains("blocked construct"));
}

// ================================================================
// Failure containment
// ================================================================

#[test]
fn top_level_throw_yields_an_uncached_fallback() {
    let registry = registry();
    let descriptor = descriptor(5, "NewsFeed", "throw new Error('boom')");

    let handle = registry.get_or_load(&descriptor, PluginConfig::new());
    assert!(handle.is_fallback());

    let node = handle.render(&json!({}));
    let rendered = rendered_json(&node);
    assert!(rendered.contains("boom"));
    assert!(rendered.contains("NewsFeed"));

    assert!(!registry.contains(5, "NewsFeed"));
    registry.get_or_load(&descriptor, PluginConfig::new());
    assert_eq!(registry.metrics().compiles, 2);
}

#[test]
fn throwing_first_render_never_surfaces_an_exception() {
    let registry = registry();
    let descriptor = descriptor(
        6,
        "Crashy",
        "export default function Crashy() { throw new Error('sync crash') }",
    );

    let handle = registry.get_or_load(&descriptor, PluginConfig::new());
    assert!(!handle.is_fallback());

    let node = handle.render(&json!({}));
    assert_eq!(node.component, "PluginErrorFallback");
    assert!(rendered_json(&node).contains("sync crash"));

    // First-render failure drops the entry so the next load retries.
    assert!(!registry.contains(6, "Crashy"));
}

#[test]
fn policy_denylisted_plugins_never_compile() {
    let registry = ComponentRegistry::new(
        Arc::new(NullTransport),
        SandboxPolicy::with_config(PolicyConfig {
            mode: PolicyMode::Denylist,
            plugins: vec![13],
        }),
        SandboxLimits::first_party(),
    );
    let handle = registry.get_or_load(
        &descriptor(13, "Widget", "export default function Widget() { return null }"),
        PluginConfig::new(),
    );

    assert!(handle.is_fallback());
    assert_eq!(handle.error().map(SandboxError::kind), Some("policy_denied"));
    assert_eq!(registry.metrics().compiles, 0);
    assert!(registry.is_empty());
}

// ================================================================
// Concurrency
// ================================================================

#[test]
fn concurrent_loads_of_one_key_compile_once() {
    let registry = registry();
    let descriptor = descriptor(
        7,
        "Widget",
        "let warm = 0
         while (warm < 20000) { warm = warm + 1 }
         export default function Widget() { return Text(warm) }",
    );

    std::thread::scope(|scope| {
        for _ in 0..8 {
            let registry = registry.clone();
            let descriptor = descriptor.clone();
            scope.spawn(move || {
                let handle = registry.get_or_load(&descriptor, PluginConfig::new());
                assert!(!handle.is_fallback());
                assert_eq!(handle.render(&json!({})).prop("text"), Some(&json!("20000")));
            });
        }
    });

    assert_eq!(registry.metrics().compiles, 1);
}

// ================================================================
// Context plumbing
// ================================================================

#[test]
fn config_rides_into_the_component_context() {
    let registry = registry();
    let descriptor = descriptor(
        11,
        "Greeter",
        "export default function Greeter() { return Text(context.config.greeting) }",
    );
    let config = PluginConfig::new().with("greeting", json!("hello from config"));

    let handle = registry.get_or_load(&descriptor, config);
    let node = handle.render(&json!({}));
    assert_eq!(node.prop("text"), Some(&json!("hello from config")));
}

#[test]
fn update_data_persists_across_renders_of_one_instantiation() {
    let registry = registry();
    let descriptor = descriptor(
        12,
        "Counter",
        "export default function Counter() {
             let seen = context.data.renders
             if (seen == null) { seen = 0 }
             context.updateData('renders', seen + 1)
             return Text('seen ' + seen)
         }",
    );

    let handle = registry.get_or_load(&descriptor, PluginConfig::new());
    assert_eq!(handle.render(&json!({})).prop("text"), Some(&json!("seen 0")));
    assert_eq!(handle.render(&json!({})).prop("text"), Some(&json!("seen 1")));
    assert_eq!(handle.render(&json!({})).prop("text"), Some(&json!("seen 2")));
}

mod robustness {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(64))]

        // Whatever the registry is fed, the host-facing calls never panic
        // and never surface an error.
        #[test]
        fn arbitrary_source_never_panics_the_host(source in ".{0,200}") {
            let registry = registry();
            let handle =
                registry.get_or_load(&descriptor(1, "Fuzz", &source), PluginConfig::new());
            let node = handle.render(&json!({}));
            prop_assert!(!node.component.is_empty());
        }
    }
}

#[test]
fn metrics_track_the_whole_session() {
    let registry = registry();
    let good = descriptor(1, "Good", "export default function Good() { return null }");
    let bad = descriptor(2, "Bad", "throw new Error('no')");

    registry.get_or_load(&good, PluginConfig::new());
    registry.get_or_load(&good, PluginConfig::new());
    let failed = registry.get_or_load(&bad, PluginConfig::new());
    failed.render(&json!({}));

    let metrics = registry.metrics();
    assert_eq!(metrics.compiles, 2);
    assert_eq!(metrics.cache_hits, 1);
    assert_eq!(metrics.cache_misses, 2);
    assert_eq!(metrics.fallbacks, 1);
}

//! End-to-end tests for the script engine: realistic plugin programs run
//! against a sealed environment with hand-built capability functions.

use atrium_plugin_api::UiNode;
use atrium_plugin_script::{Env, Interpreter, ScriptError, Value, parse};

const FUEL: u64 = 250_000;
const DEPTH: usize = 32;

/// A minimal presentation capability: `Text(content)` builds a text node.
fn text_capability() -> Value {
    Value::native("Text", |_, args| {
        let content = args
            .first()
            .map(Value::to_display_string)
            .unwrap_or_default();
        Ok(Value::Node(UiNode::text(content)))
    })
}

/// `Stack(children)` builds a container node from a list of nodes.
fn stack_capability() -> Value {
    Value::native("Stack", |_, args| {
        let mut node = UiNode::new("Stack");
        if let Some(Value::List(items)) = args.first() {
            let items = items.lock().unwrap();
            for item in items.iter() {
                if let Value::Node(child) = item {
                    node = node.with_child(child.clone());
                }
            }
        }
        Ok(Value::Node(node))
    })
}

fn compile(source: &str) -> Result<(Interpreter, Value), ScriptError> {
    let program = parse(source)?;
    let env = Env::sealed();
    env.define("Text", text_capability());
    env.define("Stack", stack_capability());
    let mut interp = Interpreter::new(FUEL, DEPTH);
    interp.run_program(&program, &env)?;
    let export = interp
        .take_default_export()
        .ok_or_else(|| ScriptError::Runtime {
            message: "no default export".into(),
        })?;
    Ok((interp, export))
}

fn render(source: &str, props: Value) -> Result<UiNode, ScriptError> {
    let (mut interp, export) = compile(source)?;
    match interp.call(&export, &[props])? {
        Value::Node(node) => Ok(node),
        other => Err(ScriptError::Runtime {
            message: format!("component returned {}", other.type_name()),
        }),
    }
}

#[test]
fn widget_renders_props_into_a_tree() {
    let source = "
        function ItemList(props) {
            let rows = props.items.map(item => Text(item))
            return Stack(rows)
        }
        export default ItemList
    ";
    let props = Value::map_of([(
        "items".to_string(),
        Value::list(vec![Value::str("alpha"), Value::str("beta")]),
    )]);
    let node = render(source, props).unwrap();
    assert_eq!(node.component, "Stack");
    assert_eq!(node.children.len(), 2);
    assert_eq!(
        node.children[0].prop("text"),
        Some(&serde_json::json!("alpha"))
    );
}

#[test]
fn component_logic_uses_conditionals_and_builtins() {
    let source = "
        function Summary(props) {
            let names = props.names.filter(n => n.length > 3)
            let label = names.length > 0 ? names.join(', ').toUpperCase() : 'none'
            return Text(label)
        }
        export default Summary
    ";
    let props = Value::map_of([(
        "names".to_string(),
        Value::list(vec![Value::str("bob"), Value::str("alice"), Value::str("carol")]),
    )]);
    let node = render(source, props).unwrap();
    assert_eq!(node.prop("text"), Some(&serde_json::json!("ALICE, CAROL")));
}

#[test]
fn helpers_compose_across_declarations() {
    let source = "
        function formatCount(n) {
            return n === 1 ? '1 item' : n + ' items'
        }
        function Counter(props) {
            return Text(formatCount(props.count))
        }
        export default Counter
    ";
    let props = Value::map_of([("count".to_string(), Value::Num(3.0))]);
    let node = render(source, props).unwrap();
    assert_eq!(node.prop("text"), Some(&serde_json::json!("3 items")));
}

#[test]
fn state_survives_between_calls_through_closures() {
    let source = "
        let renders = 0
        function Badge() {
            renders = renders + 1
            return Text('render #' + renders)
        }
        export default Badge
    ";
    let (mut interp, export) = compile(source).unwrap();
    let first = interp.call(&export, &[Value::Null]).unwrap();
    interp.set_fuel(FUEL);
    let second = interp.call(&export, &[Value::Null]).unwrap();
    let Value::Node(first) = first else {
        panic!("expected node");
    };
    let Value::Node(second) = second else {
        panic!("expected node");
    };
    assert_eq!(first.prop("text"), Some(&serde_json::json!("render #1")));
    assert_eq!(second.prop("text"), Some(&serde_json::json!("render #2")));
}

#[test]
fn throw_inside_render_is_an_error_not_a_panic() {
    let source = "
        function Fragile(props) {
            if (!props.ready) { throw new Error('not ready') }
            return Text('ok')
        }
        export default Fragile
    ";
    let err = render(source, Value::map_of([])).unwrap_err();
    assert!(err.to_string().contains("not ready"));
}

#[test]
fn top_level_infinite_loop_cannot_hang_compilation() {
    let program = parse("let i = 0\nwhile (true) { i = i + 1 }").unwrap();
    let env = Env::sealed();
    let mut interp = Interpreter::new(2_000, DEPTH);
    let err = interp.run_program(&program, &env).unwrap_err();
    assert!(matches!(err, ScriptError::FuelExhausted { .. }));
}

#[test]
fn capability_objects_are_reachable_only_if_injected() {
    // Same program, two environments: with and without the capability.
    let source = "export default () => Text('hi')";
    assert!(render(source, Value::Null).is_ok());

    let program = parse(source).unwrap();
    let bare = Env::sealed();
    let mut interp = Interpreter::new(FUEL, DEPTH);
    interp.run_program(&program, &bare).unwrap();
    let export = interp.take_default_export().unwrap();
    let err = interp.call(&export, &[]).unwrap_err();
    assert!(err.to_string().contains("'Text' is not defined"));
}

// ================================================================
// Robustness properties
// ================================================================

mod properties {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        /// The parser must reject or accept arbitrary text, never panic.
        #[test]
        fn parse_never_panics(source in ".{0,400}") {
            let _ = parse(&source);
        }

        /// Well-formed arithmetic over integers matches f64 semantics.
        #[test]
        fn integer_arithmetic_matches_f64(a in -10_000i32..10_000, b in 1i32..10_000) {
            let source = format!("export default () => ({a} + {b}) * 2 - {a} / {b}");
            let program = parse(&source).unwrap();
            let env = Env::sealed();
            let mut interp = Interpreter::new(FUEL, DEPTH);
            interp.run_program(&program, &env).unwrap();
            let export = interp.take_default_export().unwrap();
            let value = interp.call(&export, &[]).unwrap();
            let expected =
                (f64::from(a) + f64::from(b)) * 2.0 - f64::from(a) / f64::from(b);
            prop_assert_eq!(value, Value::Num(expected));
        }

        /// Deeply nested expressions are bounded by fuel, not the stack.
        #[test]
        fn nested_arrays_never_overflow(depth in 1usize..60) {
            let source = format!(
                "export default () => {}1{}",
                "[".repeat(depth),
                "]".repeat(depth)
            );
            let _ = parse(&source).map(|program| {
                let env = Env::sealed();
                let mut interp = Interpreter::new(FUEL, DEPTH);
                interp.run_program(&program, &env)
            });
        }
    }
}

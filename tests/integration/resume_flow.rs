//! Full server-render to client-resume round trips

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use resumable::{
    create_context, inject_into_page, serialize_context, CellKind, ClientRuntime, DispatchOutcome,
    DomEvent, ModuleLoader, RegisterOptions, Registries, StateOptions, StateRegistry,
    StateSnapshot,
};
use serde_json::json;

use super::common::dom::{TestDocument, TestElement};
use super::common::loader::StaticLoader;
use super::common::init_tracing;

/// Render a page on "the server": one counter cell, one deferred click
/// handler, one component boundary. Returns the final HTML.
fn render_page(registries: &Registries) -> String {
    let persisted = resumable::PersistedState::new();
    registries.state.declare_value(
        &persisted,
        || json!(7),
        StateOptions::with_id("counter"),
    );
    registries.lazy.register(
        Arc::new(|_, _| Ok(json!(null))),
        RegisterOptions::deferred("counter-chunk", "increment")
            .with_symbol("increment-qrl")
            .with_event("click")
            .with_captured(json!({"step": 2})),
    );
    registries.boundaries.declare_boundary(
        "counter-widget",
        "Counter",
        serde_json::Map::new(),
        vec![],
    );

    let html = "<html><body>\
        <div data-qrl-click=\"increment-qrl\"><button>+1</button></div>\
        </body></html>";
    let mut import_map = BTreeMap::new();
    import_map.insert(
        "counter-chunk".to_string(),
        "/assets/counter-chunk.js".to_string(),
    );
    let context = create_context(registries, import_map);
    inject_into_page(html, &context).unwrap()
}

#[tokio::test]
async fn click_after_resume_invokes_the_lazily_imported_handler_once() {
    init_tracing();

    // Server side.
    let server = Registries::new();
    let page = render_page(&server);

    // Client side: fresh registries, resume from the embedded payload.
    let client = Registries::new();
    let runtime = ClientRuntime::new();
    let document = TestDocument::new();
    let report = runtime.resume_from_page(&page, &client, &document);

    assert!(report.payload_ok);
    assert_eq!(report.lazy_references, 1);
    assert_eq!(report.event_types_installed, 1);
    assert_eq!(document.installs(), vec![("click".to_string(), true)]);
    assert_eq!(
        runtime.import_map().get("counter-chunk").map(String::as_str),
        Some("/assets/counter-chunk.js")
    );

    // The chunk serves the handler; record every invocation's arguments.
    let invocations = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&invocations);
    let loader: Arc<dyn ModuleLoader> = Arc::new(StaticLoader::new().with_export(
        "counter-chunk",
        "increment",
        Arc::new(move |event, captured| {
            sink.lock()
                .push((event.event_type().to_string(), captured.cloned()));
            Ok(json!(null))
        }),
    ));

    let body = TestElement::body();
    let wrapper = TestElement::child(&body, &[("data-qrl-click", "increment-qrl")]);
    let button = TestElement::child(&wrapper, &[]);
    let event = DomEvent::new("click", button);

    let outcome = runtime.dispatch(&client, &loader, &event).await;
    assert_eq!(
        outcome,
        DispatchOutcome::Invoked {
            handler: "increment-qrl".into()
        }
    );

    let calls = invocations.lock();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].0, "click");
    assert_eq!(calls[0].1, Some(json!({"step": 2})));
}

#[test]
fn persisted_counter_seeds_the_redeclared_cell() {
    init_tracing();

    // First environment: declare and serialize.
    let server = Registries::new();
    let persisted = resumable::PersistedState::new();
    server
        .state
        .declare_value(&persisted, || json!(0), StateOptions::with_id("counter"));
    let mut snapshot = server.state.snapshot();
    snapshot[0].1.data = json!(7);

    // Fresh environment seeded with the persisted snapshot.
    let client = Registries::new();
    let table = resumable::PersistedState::new();
    table.insert(
        "counter".to_string(),
        StateSnapshot {
            id: "counter".to_string(),
            kind: CellKind::Value,
            data: json!(7),
            dependency_symbols: vec![],
            timestamp: snapshot[0].1.timestamp,
        },
    );

    let initializer_calls = AtomicUsize::new(0);
    let cell = client.state.declare_value(
        &table,
        || {
            initializer_calls.fetch_add(1, Ordering::SeqCst);
            json!(0)
        },
        StateOptions::with_id("counter"),
    );

    assert_eq!(cell.get(), json!(7));
    assert_eq!(initializer_calls.load(Ordering::SeqCst), 0);
}

#[test]
fn serialized_state_installs_through_deserialize_state() {
    init_tracing();

    let server = Registries::new();
    let empty = resumable::PersistedState::new();
    server
        .state
        .declare_value(&empty, || json!([1, 2, 3]), StateOptions::with_id("items"));
    let text = server
        .state
        .serialize_state(&resumable::SerializeOptions::default())
        .unwrap();

    let table = resumable::PersistedState::new();
    assert_eq!(StateRegistry::deserialize_state(&text, &table), 1);
    assert_eq!(table.get("items").unwrap().data, json!([1, 2, 3]));
}

#[test]
fn reset_empties_every_registry_and_restarts_counters() {
    init_tracing();

    let registries = Registries::new();
    let runtime = ClientRuntime::new();
    let document = TestDocument::new();
    let page = render_page(&registries);
    runtime.resume_from_page(&page, &registries, &document);
    assert!(!registries.lazy.is_empty());

    runtime.reset(&registries);

    assert_eq!(registries.lazy.len(), 0);
    assert_eq!(registries.state.len(), 0);
    assert_eq!(registries.listeners.len(), 0);
    assert_eq!(registries.boundaries.len(), 0);
    assert!(runtime.persisted().is_empty());

    // Counters restart from their initial values.
    let symbol = registries
        .lazy
        .register(Arc::new(|_, _| Ok(json!(null))), RegisterOptions::default());
    assert_eq!(symbol.symbol(), "lazy-0");
    let persisted = resumable::PersistedState::new();
    let cell = registries
        .state
        .declare_value(&persisted, || json!(0), StateOptions::default());
    assert_eq!(cell.id(), "state-0");
    let listener = registries.listeners.declare(
        "click",
        None,
        resumable::DeclareOptions::new("app", "onClick"),
    );
    assert_eq!(listener, "listener-0");
}

#[test]
fn component_boundaries_survive_the_round_trip() {
    init_tracing();

    let server = Registries::new();
    let mut props = serde_json::Map::new();
    props.insert("title".to_string(), json!("Cart"));
    server
        .boundaries
        .declare_boundary("cart", "CartWidget", props, vec!["cart-item-1".into()]);
    let text = serialize_context(&create_context(&server, BTreeMap::new())).unwrap();

    let client = Registries::new();
    let runtime = ClientRuntime::new();
    runtime.resume_from_snapshot(&text, &client, &TestDocument::new());

    let boundary = client.boundaries.get_boundary("cart").unwrap();
    assert_eq!(boundary.component_type, "CartWidget");
    assert_eq!(boundary.props["title"], json!("Cart"));
    assert_eq!(boundary.children, ["cart-item-1"]);
}

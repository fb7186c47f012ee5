//! Deferred resolution across the serialization boundary

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use resumable::{DomEvent, LazyRegistry, ModuleLoader, RegisterOptions, ResumeError};
use serde_json::json;
use tokio_test::assert_ok;

use super::common::dom::TestElement;
use super::common::init_tracing;
use super::common::loader::StaticLoader;

fn counting_handler(calls: &Arc<AtomicUsize>) -> resumable::HandlerFn {
    let calls = Arc::clone(calls);
    Arc::new(move |_, captured| {
        calls.fetch_add(1, Ordering::SeqCst);
        Ok(captured.cloned().unwrap_or(json!(null)))
    })
}

#[tokio::test]
async fn restored_deferred_reference_resolves_to_the_module_export() {
    init_tracing();

    let server = LazyRegistry::new();
    server.register(
        Arc::new(|_, _| Ok(json!(null))),
        RegisterOptions::deferred("cart-chunk", "addToCart")
            .with_symbol("add-to-cart")
            .with_captured(json!({"sku": "A-1"})),
    );
    let records = server.serialize();

    let client = LazyRegistry::new();
    assert_eq!(client.restore(records), 1);
    let restored = client.get("add-to-cart").unwrap();
    assert!(!restored.is_resolved());
    assert_eq!(restored.captured(), Some(&json!({"sku": "A-1"})));

    let calls = Arc::new(AtomicUsize::new(0));
    let loader: Arc<dyn ModuleLoader> = Arc::new(StaticLoader::new().with_export(
        "cart-chunk",
        "addToCart",
        counting_handler(&calls),
    ));

    let handler = client.resolve(&restored, &loader).await.unwrap();
    let event = DomEvent::new("click", TestElement::body());
    let result = handler(&event, restored.captured()).unwrap();

    assert_eq!(result, json!({"sku": "A-1"}));
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert!(restored.is_resolved());
}

#[tokio::test]
async fn references_sharing_a_chunk_trigger_one_import_under_concurrency() {
    init_tracing();

    let server = LazyRegistry::new();
    for export in ["alpha", "beta", "gamma"] {
        server.register(
            Arc::new(|_, _| Ok(json!(null))),
            RegisterOptions::deferred("shared-chunk", export).with_symbol(export),
        );
    }

    let client = LazyRegistry::new();
    client.restore(server.serialize());

    let calls = Arc::new(AtomicUsize::new(0));
    let module = resumable::ModuleExports::new()
        .with_export("alpha", counting_handler(&calls))
        .with_export("beta", counting_handler(&calls))
        .with_export("gamma", counting_handler(&calls));
    let static_loader = Arc::new(
        StaticLoader::new()
            .with_module("shared-chunk", module)
            .with_delay(Duration::from_millis(10)),
    );
    let loader: Arc<dyn ModuleLoader> = Arc::clone(&static_loader) as Arc<dyn ModuleLoader>;

    let (alpha, beta, gamma) = tokio::join!(
        client.resolve_symbol("alpha", &loader),
        client.resolve_symbol("beta", &loader),
        client.resolve_symbol("gamma", &loader),
    );
    assert_ok!(alpha);
    assert_ok!(beta);
    assert_ok!(gamma);

    assert_eq!(static_loader.import_count("shared-chunk"), 1);
    assert_eq!(static_loader.total_imports(), 1);
}

#[tokio::test]
async fn repeated_resolution_reuses_the_cached_function_identity() {
    init_tracing();

    let registry = LazyRegistry::new();
    registry.register(
        Arc::new(|_, _| Ok(json!(null))),
        RegisterOptions::deferred("menu-chunk", "toggle").with_symbol("toggle"),
    );
    let client = LazyRegistry::new();
    client.restore(registry.serialize());

    let static_loader = Arc::new(StaticLoader::new().with_export(
        "menu-chunk",
        "toggle",
        Arc::new(|_, _| Ok(json!(true))),
    ));
    let loader: Arc<dyn ModuleLoader> = Arc::clone(&static_loader) as Arc<dyn ModuleLoader>;

    let first = client.resolve_symbol("toggle", &loader).await.unwrap();
    let second = client.resolve_symbol("toggle", &loader).await.unwrap();

    assert!(Arc::ptr_eq(&first, &second));
    assert_eq!(static_loader.import_count("menu-chunk"), 1);
}

#[tokio::test]
async fn missing_chunk_and_missing_export_fail_with_distinct_errors() {
    init_tracing();

    let server = LazyRegistry::new();
    server.register(
        Arc::new(|_, _| Ok(json!(null))),
        RegisterOptions::deferred("gone-chunk", "handler").with_symbol("gone"),
    );
    server.register(
        Arc::new(|_, _| Ok(json!(null))),
        RegisterOptions::deferred("real-chunk", "missingExport").with_symbol("partial"),
    );
    let client = LazyRegistry::new();
    client.restore(server.serialize());

    let loader: Arc<dyn ModuleLoader> = Arc::new(StaticLoader::new().with_export(
        "real-chunk",
        "other",
        Arc::new(|_, _| Ok(json!(null))),
    ));

    let gone = client.resolve_symbol("gone", &loader).await.err().unwrap();
    assert!(matches!(gone, ResumeError::Load(_)));

    let partial = client.resolve_symbol("partial", &loader).await.err().unwrap();
    assert!(matches!(
        partial,
        ResumeError::MissingExport { ref chunk, ref export }
            if chunk == "real-chunk" && export == "missingExport"
    ));
}

#[tokio::test]
async fn identity_hash_survives_the_round_trip() {
    init_tracing();

    let server = LazyRegistry::new();
    let original = server.register(
        Arc::new(|_, _| Ok(json!(null))),
        RegisterOptions::deferred("chunk-a", "run").with_symbol("task"),
    );

    let client = LazyRegistry::new();
    client.restore(server.serialize());
    let restored = client.get("task").unwrap();

    assert_eq!(restored.hash(), original.hash());
    assert_eq!(restored.hash().len(), 16);
}

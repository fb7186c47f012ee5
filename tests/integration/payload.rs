//! Payload robustness: arbitrary input never breaks the resume path

use std::collections::BTreeMap;
use std::sync::Arc;

use proptest::prelude::*;
use resumable::{
    create_context, extract_from_page, inject_into_page, serialize_context, ClientRuntime, Phase,
    RegisterOptions, Registries, ResumableContext, StateOptions,
};
use serde_json::json;

use super::common::dom::TestDocument;
use super::common::init_tracing;

fn populated_registries() -> Registries {
    let registries = Registries::new();
    let persisted = resumable::PersistedState::new();
    registries
        .state
        .declare_value(&persisted, || json!({"open": true}), StateOptions::with_id("menu"));
    registries.lazy.register(
        Arc::new(|_, _| Ok(json!(null))),
        RegisterOptions::deferred("menu-chunk", "toggle")
            .with_symbol("toggle")
            .with_event("click"),
    );
    registries
}

proptest! {
    #[test]
    fn arbitrary_text_never_panics_and_degrades_to_fresh(text in ".{0,256}") {
        let runtime = ClientRuntime::new();
        let registries = Registries::new();
        let document = TestDocument::new();

        let report = runtime.resume_from_snapshot(&text, &registries, &document);

        // Garbage that happens to parse as a valid current-version payload is
        // astronomically unlikely; everything else must land here.
        if !report.payload_ok {
            prop_assert_eq!(runtime.phase(), Phase::Resumed);
            prop_assert!(runtime.persisted().is_empty());
            prop_assert_eq!(document.installed_count(), 0);
        }
    }

    #[test]
    fn arbitrary_page_markup_never_panics_extraction(html in ".{0,256}") {
        let _ = extract_from_page(&html);
    }

    #[test]
    fn state_values_survive_embedding_in_arbitrary_pages(
        html in "<html><body>[a-zA-Z0-9 <>/]{0,64}</body></html>",
        value in "[\\PC]{0,64}",
    ) {
        let registries = Registries::new();
        let persisted = resumable::PersistedState::new();
        let cell_value = json!(value);
        let expected = cell_value.clone();
        registries.state.declare_value(
            &persisted,
            move || cell_value,
            StateOptions::with_id("cell"),
        );
        let context = create_context(&registries, BTreeMap::new());

        let page = inject_into_page(&html, &context).unwrap();
        let text = extract_from_page(&page).unwrap();
        let decoded: ResumableContext = serde_json::from_str(&text).unwrap();
        prop_assert_eq!(&decoded.state[0].1.data, &expected);
    }
}

#[test]
fn payload_text_is_stable_for_a_fixed_context() {
    init_tracing();

    let context = create_context(&populated_registries(), BTreeMap::new());
    let first = serialize_context(&context).unwrap();
    let second = serialize_context(&context).unwrap();
    assert_eq!(first, second);
}

#[test]
fn resume_accepts_a_payload_with_unknown_extra_fields_rejected_by_version_only() {
    init_tracing();

    // Future-proofing contract: only the schema version gates acceptance.
    let text = serialize_context(&create_context(&populated_registries(), BTreeMap::new()))
        .unwrap()
        .replacen('{', "{\"futureField\":42,", 1);

    let runtime = ClientRuntime::new();
    let registries = Registries::new();
    let report = runtime.resume_from_snapshot(&text, &registries, &TestDocument::new());
    assert!(report.payload_ok);
    assert_eq!(report.lazy_references, 1);
}

#[test]
fn empty_registries_produce_a_resumable_payload() {
    init_tracing();

    let text =
        serialize_context(&create_context(&Registries::new(), BTreeMap::new())).unwrap();
    let runtime = ClientRuntime::new();
    let registries = Registries::new();
    let document = TestDocument::new();

    let report = runtime.resume_from_snapshot(&text, &registries, &document);
    assert!(report.payload_ok);
    assert_eq!(report.state_entries, 0);
    assert_eq!(report.event_types_installed, 0);
    assert!(runtime.is_resumed());
}

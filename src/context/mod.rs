//! Resumable context: one immutable snapshot of all four registries

pub mod page;

use std::collections::BTreeMap;

use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::boundary::ComponentBoundary;
use crate::lazy::LazyRefRecord;
use crate::listener::ListenerDescriptor;
use crate::registries::Registries;
use crate::state::StateSnapshot;

pub use page::{extract_from_page, inject_into_page, STATE_BLOCK_ID};

/// Version of the embedded payload, checked on parse
pub const PAYLOAD_SCHEMA_VERSION: u32 = 1;

/// Everything a client needs to resume one page, built fresh on each
/// serialization call. Entries are ordered lists rather than maps, keeping
/// output byte-stable across runs.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ResumableContext {
    pub schema_version: u32,
    pub state: Vec<(String, StateSnapshot)>,
    pub listeners: Vec<ListenerDescriptor>,
    pub components: Vec<(String, ComponentBoundary)>,
    pub lazy_references: Vec<LazyRefRecord>,
    /// Chunk name to URL, consumed by the client's import step
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub import_map: BTreeMap<String, String>,
    pub timestamp: i64,
}

/// Snapshot all four registries into one immutable context
pub fn create_context(
    registries: &Registries,
    import_map: BTreeMap<String, String>,
) -> ResumableContext {
    ResumableContext {
        schema_version: PAYLOAD_SCHEMA_VERSION,
        state: registries.state.snapshot(),
        listeners: registries.listeners.descriptors(),
        components: registries.boundaries.serialize_boundaries(),
        lazy_references: registries.lazy.serialize(),
        import_map,
        timestamp: Utc::now().timestamp_millis(),
    }
}

pub fn serialize_context(context: &ResumableContext) -> Result<String, serde_json::Error> {
    serde_json::to_string(context)
}

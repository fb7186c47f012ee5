//! Component-boundary bookkeeping
//!
//! Pure metadata about resumable subtree roots, kept for serialization and
//! partial-resume tooling. No executable behavior.

use std::collections::BTreeMap;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::Json;

/// Identity, props, and children of one resumable subtree root
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ComponentBoundary {
    pub id: String,
    #[serde(rename = "type")]
    pub component_type: String,
    pub props: serde_json::Map<String, Json>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<String>,
}

/// Registry of component boundaries for one page, keyed by id
#[derive(Default)]
pub struct BoundaryRegistry {
    boundaries: Mutex<BTreeMap<String, ComponentBoundary>>,
}

impl BoundaryRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register or overwrite the boundary for a subtree root. It persists
    /// until removed explicitly.
    pub fn declare_boundary(
        &self,
        id: impl Into<String>,
        component_type: impl Into<String>,
        props: serde_json::Map<String, Json>,
        children: Vec<String>,
    ) {
        let id = id.into();
        self.boundaries.lock().insert(
            id.clone(),
            ComponentBoundary {
                id,
                component_type: component_type.into(),
                props,
                children,
            },
        );
    }

    pub fn get_boundary(&self, id: &str) -> Option<ComponentBoundary> {
        self.boundaries.lock().get(id).cloned()
    }

    /// Explicit disposal of a subtree's metadata
    pub fn remove_boundary(&self, id: &str) -> Option<ComponentBoundary> {
        self.boundaries.lock().remove(id)
    }

    /// Every boundary as ordered pairs, stable across runs
    pub fn serialize_boundaries(&self) -> Vec<(String, ComponentBoundary)> {
        self.boundaries
            .lock()
            .iter()
            .map(|(id, boundary)| (id.clone(), boundary.clone()))
            .collect()
    }

    pub fn restore(&self, entries: Vec<(String, ComponentBoundary)>) -> usize {
        let count = entries.len();
        self.boundaries.lock().extend(entries);
        count
    }

    pub fn len(&self) -> usize {
        self.boundaries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.boundaries.lock().is_empty()
    }

    pub fn reset(&self) {
        self.boundaries.lock().clear();
    }
}

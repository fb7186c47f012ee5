//! State registry: reactive value cells with a persisted-seed fast path
//!
//! Declaring a cell whose id already has a persisted snapshot seeds the cell
//! from that snapshot and skips the initializer entirely. This is what makes
//! resumption cheaper than hydration: component logic that only ran to
//! produce state does not run again on the client.

pub mod cell;

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::Utc;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::runtime::PersistedState;
use crate::Json;

pub use cell::{CellKind, StateCell, Subscriber};

const STATE_ID_PREFIX: &str = "state-";

/// Advisory limit on serialized state size; exceeding it is a performance
/// smell flagged to the caller, never a failure.
pub const DEFAULT_MAX_STATE_BYTES: usize = 1024 * 1024;

/// Snapshot of one cell at serialization time
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct StateSnapshot {
    pub id: String,
    pub kind: CellKind,
    pub data: Json,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub dependency_symbols: Vec<String>,
    pub timestamp: i64,
}

/// Options for declaring a cell
#[derive(Debug, Clone, Default)]
pub struct StateOptions {
    /// Defaults to an auto-generated id
    pub id: Option<String>,
}

impl StateOptions {
    pub fn with_id(id: impl Into<String>) -> Self {
        Self {
            id: Some(id.into()),
        }
    }
}

/// Options for [`StateRegistry::serialize_state`]
#[derive(Debug, Clone)]
pub struct SerializeOptions {
    pub max_state_bytes: usize,
}

impl Default for SerializeOptions {
    fn default() -> Self {
        Self {
            max_state_bytes: DEFAULT_MAX_STATE_BYTES,
        }
    }
}

/// Recomputation function of a derived cell, applied to the current values
/// of its dependencies in declaration order
pub type DeriveFn = Arc<dyn Fn(&[Json]) -> Json + Send + Sync>;

/// Registry of reactive cells for one page, keyed by id
#[derive(Default)]
pub struct StateRegistry {
    cells: Mutex<BTreeMap<String, StateCell>>,
    next_id: AtomicU64,
}

impl StateRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn next_auto_id(&self) -> String {
        format!("{STATE_ID_PREFIX}{}", self.next_id.fetch_add(1, Ordering::SeqCst))
    }

    /// Declare a directly-set value cell.
    ///
    /// A persisted snapshot for the id seeds the cell and the initializer is
    /// never invoked; absent a snapshot the initializer runs normally.
    pub fn declare_value<F>(
        &self,
        persisted: &PersistedState,
        init: F,
        opts: StateOptions,
    ) -> StateCell
    where
        F: FnOnce() -> Json,
    {
        let id = opts.id.unwrap_or_else(|| self.next_auto_id());
        let value = match persisted.get(&id) {
            Some(snapshot) => snapshot.data,
            None => init(),
        };
        let cell = StateCell::new(id.clone(), CellKind::Value, value, Vec::new());
        self.cells.lock().insert(id, cell.clone());
        cell
    }

    /// Declare a derived cell recomputed from `deps`.
    ///
    /// A persisted value is only the cell's first observable value; the
    /// dependency subscriptions installed here take over on the next
    /// dependency change, so persisted state never freezes future behavior.
    pub fn declare_derived(
        &self,
        persisted: &PersistedState,
        derive: DeriveFn,
        deps: &[StateCell],
        opts: StateOptions,
    ) -> StateCell {
        let id = opts.id.unwrap_or_else(|| self.next_auto_id());
        let dependency_symbols: Vec<String> =
            deps.iter().map(|dep| dep.id().to_string()).collect();
        let initial = match persisted.get(&id) {
            Some(snapshot) => snapshot.data,
            None => derive(&current_values(deps)),
        };
        let cell = StateCell::new(id.clone(), CellKind::Derived, initial, dependency_symbols);

        // Weak references in the recompute closures: a dependency's
        // subscriber list must not keep the whole cell graph alive after
        // reset.
        let weak_target = cell.downgrade();
        let weak_deps: Vec<_> = deps.iter().map(StateCell::downgrade).collect();
        for dep in deps {
            let weak_target = weak_target.clone();
            let weak_deps = weak_deps.clone();
            let derive = Arc::clone(&derive);
            dep.subscribe(Box::new(move |_| {
                let Some(target) = weak_target.upgrade() else {
                    return;
                };
                let mut values = Vec::with_capacity(weak_deps.len());
                for weak in &weak_deps {
                    match weak.upgrade() {
                        Some(inner) => values.push(StateCell::from_inner(inner).get()),
                        None => return,
                    }
                }
                StateCell::from_inner(target).set(derive(&values));
            }));
        }

        self.cells.lock().insert(id, cell.clone());
        cell
    }

    pub fn get(&self, id: &str) -> Option<StateCell> {
        self.cells.lock().get(id).cloned()
    }

    /// Ensure `cell` is registered under its id. Used by the closure
    /// serializer when a captured cell reaches it from another scope.
    pub fn adopt(&self, cell: &StateCell) {
        self.cells
            .lock()
            .entry(cell.id().to_string())
            .or_insert_with(|| cell.clone());
    }

    /// Current snapshots of every registered cell, ordered by id
    pub fn snapshot(&self) -> Vec<(String, StateSnapshot)> {
        let now = Utc::now().timestamp_millis();
        self.cells
            .lock()
            .iter()
            .map(|(id, cell)| {
                (
                    id.clone(),
                    StateSnapshot {
                        id: id.clone(),
                        kind: cell.kind(),
                        data: cell.get(),
                        dependency_symbols: cell.dependency_symbols().to_vec(),
                        timestamp: now,
                    },
                )
            })
            .collect()
    }

    /// Encode every registered entry to text. Oversized output is reported
    /// with an advisory warning and still returned in full.
    pub fn serialize_state(&self, opts: &SerializeOptions) -> Result<String, serde_json::Error> {
        let encoded = serde_json::to_string(&self.snapshot())?;
        if encoded.len() > opts.max_state_bytes {
            warn!(
                bytes = encoded.len(),
                limit = opts.max_state_bytes,
                "serialized state exceeds the advisory size limit"
            );
        }
        Ok(encoded)
    }

    /// Parse serialized state and install it into the persisted lookup table
    /// consulted at cell construction. Unparseable text degrades to "no
    /// persisted state". Returns the number of entries installed.
    pub fn deserialize_state(text: &str, persisted: &PersistedState) -> usize {
        match serde_json::from_str::<Vec<(String, StateSnapshot)>>(text) {
            Ok(entries) => persisted.install(entries),
            Err(err) => {
                warn!(%err, "discarding unreadable persisted state");
                0
            }
        }
    }

    pub fn len(&self) -> usize {
        self.cells.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.lock().is_empty()
    }

    pub fn reset(&self) {
        self.cells.lock().clear();
        self.next_id.store(0, Ordering::SeqCst);
    }
}

fn current_values(deps: &[StateCell]) -> Vec<Json> {
    deps.iter().map(StateCell::get).collect()
}

//! Listener registry: declarative event bindings discovered lazily at resume

pub mod delegate;

use std::collections::{BTreeSet, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::dom::{HandlerFn, LISTENER_ATTR};
use crate::registries::bump_counter_past;

pub use delegate::{Delegator, DispatchOutcome};

const LISTENER_ID_PREFIX: &str = "listener-";

/// Declarative binding of an event type to a module export
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ListenerDescriptor {
    pub id: String,
    pub event: String,
    pub module: String,
    pub export_name: String,
    /// Selector matching the renderer's attribute scheme for this binding
    pub selector: String,
    #[serde(default, skip_serializing_if = "is_false")]
    pub capture: bool,
}

fn is_false(value: &bool) -> bool {
    !*value
}

/// Options for [`ListenerRegistry::declare`]
#[derive(Debug, Clone, Default)]
pub struct DeclareOptions {
    pub module: String,
    pub export_name: String,
    pub capture: bool,
}

impl DeclareOptions {
    pub fn new(module: impl Into<String>, export_name: impl Into<String>) -> Self {
        Self {
            module: module.into(),
            export_name: export_name.into(),
            capture: false,
        }
    }
}

/// Registry of listener declarations for one page, in declaration order
#[derive(Default)]
pub struct ListenerRegistry {
    descriptors: Mutex<Vec<ListenerDescriptor>>,
    live_handlers: Mutex<HashMap<String, HandlerFn>>,
    next_id: AtomicU64,
}

impl ListenerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a binding. A provided handler is kept for direct dispatch in
    /// live-development mode; in resuming mode nothing is attached eagerly
    /// and discovery happens through delegation at resume time.
    pub fn declare(
        &self,
        event: impl Into<String>,
        handler: Option<HandlerFn>,
        opts: DeclareOptions,
    ) -> String {
        let id = format!(
            "{LISTENER_ID_PREFIX}{}",
            self.next_id.fetch_add(1, Ordering::SeqCst)
        );
        let descriptor = ListenerDescriptor {
            id: id.clone(),
            event: event.into(),
            module: opts.module,
            export_name: opts.export_name,
            selector: format!("[{LISTENER_ATTR}=\"{id}\"]"),
            capture: opts.capture,
        };
        self.descriptors.lock().push(descriptor);
        if let Some(handler) = handler {
            self.live_handlers.lock().insert(id.clone(), handler);
        }
        id
    }

    pub fn get(&self, id: &str) -> Option<ListenerDescriptor> {
        self.descriptors
            .lock()
            .iter()
            .find(|descriptor| descriptor.id == id)
            .cloned()
    }

    /// Handler attached directly at declaration time, if any. Never present
    /// after a restore: live handlers do not cross the serialization
    /// boundary.
    pub fn live_handler(&self, id: &str) -> Option<HandlerFn> {
        self.live_handlers.lock().get(id).cloned()
    }

    /// Every descriptor in declaration order
    pub fn descriptors(&self) -> Vec<ListenerDescriptor> {
        self.descriptors.lock().clone()
    }

    /// Distinct event types across all declared bindings
    pub fn event_types(&self) -> BTreeSet<String> {
        self.descriptors
            .lock()
            .iter()
            .map(|descriptor| descriptor.event.clone())
            .collect()
    }

    pub fn restore(&self, descriptors: Vec<ListenerDescriptor>) -> usize {
        let count = descriptors.len();
        let mut stored = self.descriptors.lock();
        for descriptor in descriptors {
            bump_counter_past(&self.next_id, &descriptor.id, LISTENER_ID_PREFIX);
            stored.retain(|existing| existing.id != descriptor.id);
            stored.push(descriptor);
        }
        count
    }

    pub fn len(&self) -> usize {
        self.descriptors.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.descriptors.lock().is_empty()
    }

    pub fn reset(&self) {
        self.descriptors.lock().clear();
        self.live_handlers.lock().clear();
        self.next_id.store(0, Ordering::SeqCst);
    }
}

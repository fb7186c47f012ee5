//! DOM contract consumed from the external renderer
//!
//! The renderer tags interactive elements with `data-qrl-<event>="<symbol>"`
//! for lazy-reference handlers and `data-listener="<id>"` for declarative
//! listener bindings. This module defines what the delegation layer needs
//! from a document implementation, wasm-backed or otherwise.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::Json;

/// Attribute prefix naming the lazy-reference symbol per event type,
/// e.g. `data-qrl-click`.
pub const QRL_ATTR_PREFIX: &str = "data-qrl-";

/// Attribute naming a declared listener id.
pub const LISTENER_ATTR: &str = "data-listener";

/// Handler invoked with the originating event and its captured state.
pub type HandlerFn = Arc<dyn Fn(&DomEvent, Option<&Json>) -> anyhow::Result<Json> + Send + Sync>;

/// An element in the host document tree
pub trait ElementNode: Send + Sync {
    /// Attribute value, if present
    fn attribute(&self, name: &str) -> Option<String>;

    /// Parent element; `None` at the tree root
    fn parent(&self) -> Option<Arc<dyn ElementNode>>;

    /// Whether this element is the document body. The delegation walk stops
    /// here without inspecting it.
    fn is_body(&self) -> bool;
}

/// Document root that delegated listeners are installed on
pub trait DocumentHost: Send + Sync {
    /// Install a root-level listener for `event_type`. Called at most once
    /// per event type per lifecycle; `capture` is always true for delegation.
    fn install_root_listener(&self, event_type: &str, capture: bool);
}

/// An event flowing through the delegation layer
pub struct DomEvent {
    event_type: String,
    target: Arc<dyn ElementNode>,
    default_prevented: AtomicBool,
    handler_pending: AtomicBool,
}

impl DomEvent {
    pub fn new(event_type: impl Into<String>, target: Arc<dyn ElementNode>) -> Self {
        Self {
            event_type: event_type.into(),
            target,
            default_prevented: AtomicBool::new(false),
            handler_pending: AtomicBool::new(false),
        }
    }

    pub fn event_type(&self) -> &str {
        &self.event_type
    }

    /// Element the event originated on
    pub fn target(&self) -> Arc<dyn ElementNode> {
        Arc::clone(&self.target)
    }

    pub fn prevent_default(&self) {
        self.default_prevented.store(true, Ordering::SeqCst);
    }

    pub fn default_prevented(&self) -> bool {
        self.default_prevented.load(Ordering::SeqCst)
    }

    /// True once dispatch has matched a handler for this event. Set
    /// synchronously, before the handler's chunk import is awaited, so the
    /// host can decide default-action suppression while the browser's window
    /// for intercepting default behavior is still open.
    pub fn handler_pending(&self) -> bool {
        self.handler_pending.load(Ordering::SeqCst)
    }

    pub(crate) fn mark_handler_pending(&self) {
        self.handler_pending.store(true, Ordering::SeqCst);
    }
}

impl fmt::Debug for DomEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DomEvent")
            .field("event_type", &self.event_type)
            .field("default_prevented", &self.default_prevented())
            .field("handler_pending", &self.handler_pending())
            .finish()
    }
}

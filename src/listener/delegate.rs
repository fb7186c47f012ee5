//! Resume-time event delegation
//!
//! One capture-phase listener per distinct event type is installed at the
//! document root. Each event walks from its origin toward the body looking
//! for the first element declaring a handler for that event type, resolves
//! the handler strictly on demand, and invokes it with the event and its
//! captured state. First match wins; native bubbling outside this synthetic
//! dispatch is unaffected.

use std::collections::BTreeSet;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::dom::{DocumentHost, DomEvent, ElementNode, HandlerFn, LISTENER_ATTR, QRL_ATTR_PREFIX};
use crate::lazy::ModuleLoader;
use crate::registries::Registries;
use crate::Json;

/// Result of routing one event through the delegation layer
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// No element between the origin and the body declared a handler
    NoMatch,
    Invoked { handler: String },
    /// Resolution or invocation failed; the delegated listener stays alive
    Failed { handler: String },
}

enum HandlerMatch {
    Lazy { symbol: String },
    Listener { id: String },
}

/// Tracks which event types already have a delegated listener, so repeated
/// resume passes never double-attach
#[derive(Default)]
pub struct Delegator {
    installed: Mutex<BTreeSet<String>>,
}

impl Delegator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Install one delegated listener per event type not already covered.
    /// Returns the number newly installed. Safe to call repeatedly.
    pub fn install(
        &self,
        document: &dyn DocumentHost,
        event_types: impl IntoIterator<Item = String>,
    ) -> usize {
        let mut installed = self.installed.lock();
        let mut added = 0;
        for event_type in event_types {
            if installed.insert(event_type.clone()) {
                document.install_root_listener(&event_type, true);
                added += 1;
            }
        }
        added
    }

    pub fn installed_types(&self) -> Vec<String> {
        self.installed.lock().iter().cloned().collect()
    }

    pub fn is_installed(&self, event_type: &str) -> bool {
        self.installed.lock().contains(event_type)
    }

    pub fn reset(&self) {
        self.installed.lock().clear();
    }

    /// Route one event to its declared handler, if any.
    ///
    /// The ancestor walk and the has-handler decision run synchronously
    /// before the first await, so the host can still suppress the event's
    /// default action while the handler's chunk import is pending. Handler
    /// errors are contained here and logged; they never disable the shared
    /// delegated listener.
    pub async fn dispatch(
        &self,
        registries: &Registries,
        loader: &Arc<dyn ModuleLoader>,
        event: &DomEvent,
    ) -> DispatchOutcome {
        let Some(matched) = find_handler(registries, event) else {
            return DispatchOutcome::NoMatch;
        };
        event.mark_handler_pending();

        match matched {
            HandlerMatch::Lazy { symbol } => {
                let Some(reference) = registries.lazy.get(&symbol) else {
                    warn!(%symbol, "event matched an unregistered lazy reference");
                    return DispatchOutcome::Failed { handler: symbol };
                };
                match registries.lazy.resolve(&reference, loader).await {
                    Ok(handler) => invoke(handler, event, reference.captured(), &symbol),
                    Err(err) => {
                        warn!(%symbol, %err, "lazy handler resolution failed");
                        DispatchOutcome::Failed { handler: symbol }
                    }
                }
            }
            HandlerMatch::Listener { id } => {
                let Some(descriptor) = registries.listeners.get(&id) else {
                    warn!(%id, "event matched an undeclared listener id");
                    return DispatchOutcome::Failed { handler: id };
                };
                if let Some(handler) = registries.listeners.live_handler(&id) {
                    return invoke(handler, event, None, &id);
                }
                let module = match registries.lazy.import_chunk(loader, &descriptor.module).await
                {
                    Ok(module) => module,
                    Err(err) => {
                        warn!(%id, %err, "listener module import failed");
                        return DispatchOutcome::Failed { handler: id };
                    }
                };
                let Some(handler) = module.get(&descriptor.export_name) else {
                    warn!(
                        %id,
                        module = %descriptor.module,
                        export = %descriptor.export_name,
                        "listener export missing from module"
                    );
                    return DispatchOutcome::Failed { handler: id };
                };
                invoke(handler, event, None, &id)
            }
        }
    }
}

fn find_handler(registries: &Registries, event: &DomEvent) -> Option<HandlerMatch> {
    let qrl_attr = format!("{QRL_ATTR_PREFIX}{}", event.event_type());
    let mut node: Option<Arc<dyn ElementNode>> = Some(event.target());
    while let Some(element) = node {
        if element.is_body() {
            break;
        }
        if let Some(symbol) = element.attribute(&qrl_attr) {
            return Some(HandlerMatch::Lazy { symbol });
        }
        if let Some(id) = element.attribute(LISTENER_ATTR) {
            // The id attribute is event-agnostic; only a listener declared
            // for this event type may claim the dispatch.
            if registries
                .listeners
                .get(&id)
                .is_some_and(|descriptor| descriptor.event == event.event_type())
            {
                return Some(HandlerMatch::Listener { id });
            }
        }
        node = element.parent();
    }
    None
}

fn invoke(
    handler: HandlerFn,
    event: &DomEvent,
    captured: Option<&Json>,
    name: &str,
) -> DispatchOutcome {
    match handler(event, captured) {
        Ok(_) => {
            debug!(handler = %name, "delegated handler invoked");
            DispatchOutcome::Invoked {
                handler: name.to_string(),
            }
        }
        Err(err) => {
            warn!(handler = %name, %err, "delegated handler failed");
            DispatchOutcome::Failed {
                handler: name.to_string(),
            }
        }
    }
}

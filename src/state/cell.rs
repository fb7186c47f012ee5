//! Reactive cell boundary: get / set / subscribe
//!
//! The cell primitive is deliberately small; outer framework layers provide
//! richer reactive types on top of it. Values are JSON-safe so a cell can
//! cross the serialization boundary.

use std::fmt;
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::Json;

/// Callback invoked with the new value after each set
pub type Subscriber = Box<dyn Fn(&Json) + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CellKind {
    Value,
    Derived,
}

pub(crate) struct CellInner {
    id: String,
    kind: CellKind,
    dependency_symbols: Vec<String>,
    value: Mutex<Json>,
    subscribers: Mutex<Vec<Subscriber>>,
}

/// A reactive value cell. Clones share the underlying cell.
#[derive(Clone)]
pub struct StateCell {
    inner: Arc<CellInner>,
}

impl StateCell {
    pub(crate) fn new(
        id: String,
        kind: CellKind,
        initial: Json,
        dependency_symbols: Vec<String>,
    ) -> Self {
        Self {
            inner: Arc::new(CellInner {
                id,
                kind,
                dependency_symbols,
                value: Mutex::new(initial),
                subscribers: Mutex::new(Vec::new()),
            }),
        }
    }

    pub(crate) fn from_inner(inner: Arc<CellInner>) -> Self {
        Self { inner }
    }

    pub(crate) fn downgrade(&self) -> Weak<CellInner> {
        Arc::downgrade(&self.inner)
    }

    pub fn id(&self) -> &str {
        &self.inner.id
    }

    pub fn kind(&self) -> CellKind {
        self.inner.kind
    }

    /// Ids of the cells this derived cell recomputes from, in declaration
    /// order. Empty for plain value cells.
    pub fn dependency_symbols(&self) -> &[String] {
        &self.inner.dependency_symbols
    }

    pub fn get(&self) -> Json {
        self.inner.value.lock().clone()
    }

    pub fn set(&self, value: Json) {
        *self.inner.value.lock() = value.clone();
        // Value lock is released before notification so subscribers can read.
        for subscriber in self.inner.subscribers.lock().iter() {
            subscriber(&value);
        }
    }

    pub fn subscribe(&self, subscriber: Subscriber) {
        self.inner.subscribers.lock().push(subscriber);
    }
}

impl fmt::Debug for StateCell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StateCell")
            .field("id", &self.inner.id)
            .field("kind", &self.inner.kind)
            .field("value", &*self.inner.value.lock())
            .finish()
    }
}

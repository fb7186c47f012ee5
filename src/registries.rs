//! Per-render registry arena
//!
//! One `Registries` value is constructed per render pass on the server, or
//! per page on the client, and passed through the call chain. Nothing in
//! this crate is a process-wide singleton, so concurrent render passes in
//! one process cannot observe each other's registrations.

use std::sync::atomic::{AtomicU64, Ordering};

use crate::boundary::BoundaryRegistry;
use crate::lazy::LazyRegistry;
use crate::listener::ListenerRegistry;
use crate::state::StateRegistry;

/// The four registries backing one resumable page
#[derive(Default)]
pub struct Registries {
    pub lazy: LazyRegistry,
    pub state: StateRegistry,
    pub listeners: ListenerRegistry,
    pub boundaries: BoundaryRegistry,
}

impl Registries {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop every registration and return all id counters to their initial
    /// values, as for a soft navigation rebuilding the page from scratch.
    pub fn reset(&self) {
        self.lazy.reset();
        self.state.reset();
        self.listeners.reset();
        self.boundaries.reset();
    }
}

/// Advance `counter` past a restored auto-generated id so that later
/// registrations cannot collide with ids present in the snapshot.
pub(crate) fn bump_counter_past(counter: &AtomicU64, id: &str, prefix: &str) {
    if let Some(n) = id.strip_prefix(prefix).and_then(|rest| rest.parse::<u64>().ok()) {
        counter.fetch_max(n + 1, Ordering::SeqCst);
    }
}

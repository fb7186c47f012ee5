//! Client runtime: persisted state table, lifecycle, and the resume protocol
//!
//! One `ClientRuntime` per page replaces ambient globals. Outer framework
//! layers read its lifecycle flags to decide whether to re-run component
//! logic; the persisted table is consulted by the state registry at cell
//! construction time.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tracing::warn;

use crate::context::{extract_from_page, ResumableContext, PAYLOAD_SCHEMA_VERSION};
use crate::dom::{DocumentHost, DomEvent};
use crate::lazy::ModuleLoader;
use crate::listener::{Delegator, DispatchOutcome};
use crate::registries::Registries;
use crate::state::StateSnapshot;

/// Page lifecycle. `Resumed` is terminal until an explicit reset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Phase {
    #[default]
    Initial,
    Resuming,
    Resumed,
}

/// Lookup table of persisted cell snapshots consulted at cell construction
#[derive(Default)]
pub struct PersistedState {
    entries: Mutex<HashMap<String, StateSnapshot>>,
}

impl PersistedState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, id: &str) -> Option<StateSnapshot> {
        self.entries.lock().get(id).cloned()
    }

    pub fn insert(&self, id: String, snapshot: StateSnapshot) {
        self.entries.lock().insert(id, snapshot);
    }

    pub fn install(
        &self,
        entries: impl IntoIterator<Item = (String, StateSnapshot)>,
    ) -> usize {
        let mut stored = self.entries.lock();
        let mut count = 0;
        for (id, snapshot) in entries {
            stored.insert(id, snapshot);
            count += 1;
        }
        count
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    pub fn clear(&self) {
        self.entries.lock().clear();
    }
}

/// What one resume pass accomplished
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResumeReport {
    /// False when the payload was malformed or unrecognized and the page
    /// fell back to fresh behavior
    pub payload_ok: bool,
    pub state_entries: usize,
    pub lazy_references: usize,
    pub listeners: usize,
    pub components: usize,
    /// Event types newly wired by this pass; zero on a repeated resume
    pub event_types_installed: usize,
}

/// Bounds for [`ClientRuntime::wait_for_resumed`]
#[derive(Debug, Clone)]
pub struct WaitOptions {
    pub timeout: Duration,
    pub poll_interval: Duration,
}

impl Default for WaitOptions {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(5),
            poll_interval: Duration::from_millis(20),
        }
    }
}

/// Per-page client runtime
#[derive(Default)]
pub struct ClientRuntime {
    persisted: PersistedState,
    phase: Mutex<Phase>,
    delegator: Delegator,
    import_map: Mutex<BTreeMap<String, String>>,
}

impl ClientRuntime {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn persisted(&self) -> &PersistedState {
        &self.persisted
    }

    pub fn delegator(&self) -> &Delegator {
        &self.delegator
    }

    pub fn phase(&self) -> Phase {
        *self.phase.lock()
    }

    pub fn is_resuming(&self) -> bool {
        self.phase() == Phase::Resuming
    }

    pub fn is_resumed(&self) -> bool {
        self.phase() == Phase::Resumed
    }

    pub fn import_map(&self) -> BTreeMap<String, String> {
        self.import_map.lock().clone()
    }

    /// Resume from serialized context text: seed the persisted table,
    /// restore lazy references and boundaries, and wire delegated listeners.
    /// Malformed payloads degrade to fresh behavior. Safe to call twice;
    /// listeners are never double-attached.
    pub fn resume_from_snapshot(
        &self,
        text: &str,
        registries: &Registries,
        document: &dyn DocumentHost,
    ) -> ResumeReport {
        *self.phase.lock() = Phase::Resuming;
        match self.parse(text) {
            Some(context) => self.resume_parsed(context, registries, document),
            None => self.finish_fresh(),
        }
    }

    /// Like [`resume_from_snapshot`](Self::resume_from_snapshot), but also
    /// adopts the payload's import map for the module loader to consult
    pub fn resume_context(
        &self,
        text: &str,
        registries: &Registries,
        document: &dyn DocumentHost,
    ) -> ResumeReport {
        *self.phase.lock() = Phase::Resuming;
        match self.parse(text) {
            Some(context) => {
                *self.import_map.lock() = context.import_map.clone();
                self.resume_parsed(context, registries, document)
            }
            None => self.finish_fresh(),
        }
    }

    /// Locate the embedded payload in page markup and resume from it
    pub fn resume_from_page(
        &self,
        html: &str,
        registries: &Registries,
        document: &dyn DocumentHost,
    ) -> ResumeReport {
        match extract_from_page(html) {
            Some(text) => self.resume_context(&text, registries, document),
            None => {
                warn!("no embedded resumable payload found in page");
                *self.phase.lock() = Phase::Resuming;
                self.finish_fresh()
            }
        }
    }

    fn parse(&self, text: &str) -> Option<ResumableContext> {
        match serde_json::from_str::<ResumableContext>(text) {
            Ok(context) if context.schema_version == PAYLOAD_SCHEMA_VERSION => Some(context),
            Ok(context) => {
                warn!(
                    version = context.schema_version,
                    "unrecognized payload schema version; starting fresh"
                );
                None
            }
            Err(err) => {
                warn!(%err, "malformed resumable payload; starting fresh");
                None
            }
        }
    }

    fn finish_fresh(&self) -> ResumeReport {
        *self.phase.lock() = Phase::Resumed;
        ResumeReport {
            payload_ok: false,
            ..ResumeReport::default()
        }
    }

    fn resume_parsed(
        &self,
        context: ResumableContext,
        registries: &Registries,
        document: &dyn DocumentHost,
    ) -> ResumeReport {
        let state_entries = self.persisted.install(context.state);
        let lazy_references = registries.lazy.restore(context.lazy_references);
        let components = registries.boundaries.restore(context.components);
        let listeners = registries.listeners.restore(context.listeners);

        let mut event_types: BTreeSet<String> = registries.listeners.event_types();
        event_types.extend(registries.lazy.used_event_types());
        let event_types_installed = self.delegator.install(document, event_types);

        *self.phase.lock() = Phase::Resumed;
        ResumeReport {
            payload_ok: true,
            state_entries,
            lazy_references,
            listeners,
            components,
            event_types_installed,
        }
    }

    /// Route one event through the delegation layer
    pub async fn dispatch(
        &self,
        registries: &Registries,
        loader: &Arc<dyn ModuleLoader>,
        event: &DomEvent,
    ) -> DispatchOutcome {
        self.delegator.dispatch(registries, loader, event).await
    }

    /// Bounded poll against the resumed flag. Returns false on timeout; the
    /// caller decides whether a page that never resumed is fatal.
    pub async fn wait_for_resumed(&self, opts: WaitOptions) -> bool {
        let deadline = tokio::time::Instant::now() + opts.timeout;
        loop {
            if self.is_resumed() {
                return true;
            }
            if tokio::time::Instant::now() >= deadline {
                return false;
            }
            tokio::time::sleep(opts.poll_interval).await;
        }
    }

    /// Return the runtime and every registry to the initial lifecycle state
    pub fn reset(&self, registries: &Registries) {
        registries.reset();
        self.persisted.clear();
        self.delegator.reset();
        self.import_map.lock().clear();
        *self.phase.lock() = Phase::Initial;
    }
}

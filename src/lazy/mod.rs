//! Lazy-reference registry
//!
//! A lazy reference is a serializable handle to a function: inline (the
//! function itself, zero-latency) or deferred behind a module chunk that is
//! imported on demand. References survive the serialization round trip by
//! symbol; only a fresh resolution call can repopulate the callable.

pub mod loader;

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::dom::HandlerFn;
use crate::error::{LoadError, ResumeError};
use crate::registries::bump_counter_past;
use crate::Json;

pub use loader::{ModuleExports, ModuleLoader};
use loader::ChunkCache;

/// Chunk marker for references whose function is available in-process.
pub const INLINE_CHUNK: &str = "inline";

const DEFAULT_EXPORT: &str = "default";
const SYMBOL_PREFIX: &str = "lazy-";

/// What a reference points at
#[derive(Clone)]
pub enum LazyTarget {
    /// Function registered in-process; calls need no import.
    Inline(HandlerFn),
    /// Function living in a module chunk, imported on first resolution.
    /// Restoring from serialized data only ever produces this variant,
    /// because executable code cannot be reconstructed from JSON.
    Deferred { chunk: String, export: String },
}

impl fmt::Debug for LazyTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LazyTarget::Inline(_) => f.write_str("Inline"),
            LazyTarget::Deferred { chunk, export } => f
                .debug_struct("Deferred")
                .field("chunk", chunk)
                .field("export", export)
                .finish(),
        }
    }
}

struct LazyRefInner {
    symbol: String,
    target: LazyTarget,
    captured: Option<Json>,
    event: Option<String>,
    hash: String,
    resolved: Mutex<Option<HandlerFn>>,
}

/// Serializable handle to a function. Cheap to clone; clones share the
/// resolution cache.
#[derive(Clone)]
pub struct LazyRef {
    inner: Arc<LazyRefInner>,
}

impl LazyRef {
    pub fn symbol(&self) -> &str {
        &self.inner.symbol
    }

    /// Stable identity hash of `(symbol, chunk)` for cross-serialization
    /// identification
    pub fn hash(&self) -> &str {
        &self.inner.hash
    }

    pub fn captured(&self) -> Option<&Json> {
        self.inner.captured.as_ref()
    }

    /// Event type this reference is bound to through the renderer's
    /// `data-qrl-<event>` attribute, if any
    pub fn event(&self) -> Option<&str> {
        self.inner.event.as_deref()
    }

    pub fn target(&self) -> &LazyTarget {
        &self.inner.target
    }

    pub fn is_inline(&self) -> bool {
        match &self.inner.target {
            LazyTarget::Inline(_) => true,
            LazyTarget::Deferred { chunk, .. } => chunk == INLINE_CHUNK,
        }
    }

    pub fn is_resolved(&self) -> bool {
        self.inner.resolved.lock().is_some()
    }

    /// Plain serializable record; never carries the live function
    pub fn record(&self) -> LazyRefRecord {
        let (chunk, export_name) = match &self.inner.target {
            LazyTarget::Inline(_) => (INLINE_CHUNK.to_string(), DEFAULT_EXPORT.to_string()),
            LazyTarget::Deferred { chunk, export } => (chunk.clone(), export.clone()),
        };
        LazyRefRecord {
            symbol: self.inner.symbol.clone(),
            chunk,
            export_name,
            captured_state: self.inner.captured.clone(),
            event: self.inner.event.clone(),
            hash: self.inner.hash.clone(),
        }
    }
}

impl fmt::Debug for LazyRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LazyRef")
            .field("symbol", &self.inner.symbol)
            .field("target", &self.inner.target)
            .field("hash", &self.inner.hash)
            .field("resolved", &self.is_resolved())
            .finish()
    }
}

/// Wire form of one reference
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct LazyRefRecord {
    pub symbol: String,
    /// `"inline"` for references registered without a chunk
    pub chunk: String,
    pub export_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub captured_state: Option<Json>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event: Option<String>,
    pub hash: String,
}

/// Options for [`LazyRegistry::register`]
#[derive(Debug, Clone, Default)]
pub struct RegisterOptions {
    /// Defaults to an auto-generated process-unique symbol
    pub symbol: Option<String>,
    /// Omitted means inline
    pub chunk: Option<String>,
    /// Defaults to `"default"`
    pub export_name: Option<String>,
    pub captured: Option<Json>,
    /// Event type the renderer will bind this reference to
    pub event: Option<String>,
}

impl RegisterOptions {
    pub fn deferred(chunk: impl Into<String>, export_name: impl Into<String>) -> Self {
        Self {
            chunk: Some(chunk.into()),
            export_name: Some(export_name.into()),
            ..Self::default()
        }
    }

    pub fn with_symbol(mut self, symbol: impl Into<String>) -> Self {
        self.symbol = Some(symbol.into());
        self
    }

    pub fn with_captured(mut self, captured: Json) -> Self {
        self.captured = Some(captured);
        self
    }

    pub fn with_event(mut self, event: impl Into<String>) -> Self {
        self.event = Some(event.into());
        self
    }
}

/// Registry of lazy references for one page, keyed by symbol
#[derive(Default)]
pub struct LazyRegistry {
    refs: Mutex<BTreeMap<String, LazyRef>>,
    chunks: ChunkCache,
    next_symbol: AtomicU64,
}

impl LazyRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a function under a fresh (or caller-chosen) symbol.
    ///
    /// The handler is cached as resolved for inline and deferred targets
    /// alike: the registering side already holds the function, so resolution
    /// before any serialization round trip never touches the loader. Only a
    /// restored reference pays the import cost.
    pub fn register(&self, handler: HandlerFn, opts: RegisterOptions) -> LazyRef {
        let symbol = opts.symbol.unwrap_or_else(|| {
            format!(
                "{SYMBOL_PREFIX}{}",
                self.next_symbol.fetch_add(1, Ordering::SeqCst)
            )
        });
        let target = match opts.chunk {
            None => LazyTarget::Inline(Arc::clone(&handler)),
            Some(chunk) => LazyTarget::Deferred {
                chunk,
                export: opts.export_name.unwrap_or_else(|| DEFAULT_EXPORT.to_string()),
            },
        };
        let chunk_name = match &target {
            LazyTarget::Inline(_) => INLINE_CHUNK,
            LazyTarget::Deferred { chunk, .. } => chunk.as_str(),
        };
        let hash = identity_hash(&symbol, chunk_name);
        let reference = LazyRef {
            inner: Arc::new(LazyRefInner {
                symbol: symbol.clone(),
                target,
                captured: opts.captured,
                event: opts.event,
                hash,
                resolved: Mutex::new(Some(handler)),
            }),
        };
        self.refs.lock().insert(symbol, reference.clone());
        reference
    }

    pub fn get(&self, symbol: &str) -> Option<LazyRef> {
        self.refs.lock().get(symbol).cloned()
    }

    /// Resolve a reference to its function.
    ///
    /// Already-resolved references return the cached function without any
    /// work; resolving twice always yields the same function identity.
    /// Deferred references go through the per-chunk import cache, so
    /// references sharing a chunk trigger exactly one import even under
    /// concurrent resolution.
    pub async fn resolve(
        &self,
        reference: &LazyRef,
        loader: &Arc<dyn ModuleLoader>,
    ) -> Result<HandlerFn, ResumeError> {
        if let Some(handler) = reference.inner.resolved.lock().clone() {
            return Ok(handler);
        }
        match &reference.inner.target {
            LazyTarget::Inline(handler) => Ok(Arc::clone(handler)),
            LazyTarget::Deferred { chunk, export } => {
                if chunk == INLINE_CHUNK {
                    return Err(ResumeError::UnresolvableInline(
                        reference.symbol().to_string(),
                    ));
                }
                let module = self.chunks.import(loader, chunk).await?;
                let handler = module.get(export).ok_or_else(|| ResumeError::MissingExport {
                    chunk: chunk.clone(),
                    export: export.clone(),
                })?;
                // First resolution wins so racing callers observe one identity.
                let mut resolved = reference.inner.resolved.lock();
                Ok(Arc::clone(resolved.get_or_insert(handler)))
            }
        }
    }

    pub async fn resolve_symbol(
        &self,
        symbol: &str,
        loader: &Arc<dyn ModuleLoader>,
    ) -> Result<HandlerFn, ResumeError> {
        let reference = self
            .get(symbol)
            .ok_or_else(|| ResumeError::UnknownReference(symbol.to_string()))?;
        self.resolve(&reference, loader).await
    }

    /// Import a chunk through the shared per-chunk cache. Also used by the
    /// delegation layer for listener bindings that name a module directly.
    pub async fn import_chunk(
        &self,
        loader: &Arc<dyn ModuleLoader>,
        chunk: &str,
    ) -> Result<Arc<ModuleExports>, LoadError> {
        self.chunks.import(loader, chunk).await
    }

    /// Ordered wire records for every registered reference
    pub fn serialize(&self) -> Vec<LazyRefRecord> {
        self.refs.lock().values().map(LazyRef::record).collect()
    }

    /// Repopulate the symbol map from wire records.
    ///
    /// Restored references never carry a callable; inline records become
    /// deferred entries whose invocation fails loudly until the running
    /// program re-registers them.
    pub fn restore(&self, records: Vec<LazyRefRecord>) -> usize {
        let mut refs = self.refs.lock();
        let count = records.len();
        for record in records {
            bump_counter_past(&self.next_symbol, &record.symbol, SYMBOL_PREFIX);
            let reference = LazyRef {
                inner: Arc::new(LazyRefInner {
                    symbol: record.symbol.clone(),
                    target: LazyTarget::Deferred {
                        chunk: record.chunk,
                        export: record.export_name,
                    },
                    captured: record.captured_state,
                    event: record.event,
                    hash: record.hash,
                    resolved: Mutex::new(None),
                }),
            };
            refs.insert(record.symbol, reference);
        }
        count
    }

    /// Distinct event types referenced through registered lazy references
    pub fn used_event_types(&self) -> BTreeSet<String> {
        self.refs
            .lock()
            .values()
            .filter_map(|r| r.event().map(str::to_string))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.refs.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.refs.lock().is_empty()
    }

    pub fn reset(&self) {
        self.refs.lock().clear();
        self.chunks.reset();
        self.next_symbol.store(0, Ordering::SeqCst);
    }
}

fn identity_hash(symbol: &str, chunk: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(symbol.as_bytes());
    hasher.update(b":");
    hasher.update(chunk.as_bytes());
    let digest = hasher.finalize();
    digest.iter().take(8).map(|b| format!("{b:02x}")).collect()
}

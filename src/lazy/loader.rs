//! Module-loader boundary and the per-chunk import cache

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use futures::future::{BoxFuture, FutureExt, Shared};
use parking_lot::Mutex;

use crate::dom::HandlerFn;
use crate::error::LoadError;

/// Exports of one loaded module chunk
#[derive(Clone, Default)]
pub struct ModuleExports {
    exports: HashMap<String, HandlerFn>,
}

impl ModuleExports {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, handler: HandlerFn) {
        self.exports.insert(name.into(), handler);
    }

    pub fn with_export(mut self, name: impl Into<String>, handler: HandlerFn) -> Self {
        self.insert(name, handler);
        self
    }

    pub fn get(&self, name: &str) -> Option<HandlerFn> {
        self.exports.get(name).cloned()
    }

    pub fn len(&self) -> usize {
        self.exports.len()
    }

    pub fn is_empty(&self) -> bool {
        self.exports.is_empty()
    }
}

impl fmt::Debug for ModuleExports {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<_> = self.exports.keys().collect();
        names.sort();
        f.debug_struct("ModuleExports").field("exports", &names).finish()
    }
}

/// Resolves a chunk identifier to an importable module at runtime.
///
/// Implemented by the bundler integration; tests use a static table.
#[async_trait]
pub trait ModuleLoader: Send + Sync {
    async fn import(&self, chunk: &str) -> Result<ModuleExports, LoadError>;
}

type SharedImport = Shared<BoxFuture<'static, Result<Arc<ModuleExports>, LoadError>>>;

/// In-flight and completed imports, keyed by chunk.
///
/// Concurrent resolution requests for references sharing a chunk coalesce
/// onto one import future, so each chunk is fetched and evaluated once per
/// lifecycle. Failed imports are evicted so a later resolution can retry.
#[derive(Default)]
pub(crate) struct ChunkCache {
    imports: Mutex<HashMap<String, SharedImport>>,
}

impl ChunkCache {
    pub(crate) async fn import(
        &self,
        loader: &Arc<dyn ModuleLoader>,
        chunk: &str,
    ) -> Result<Arc<ModuleExports>, LoadError> {
        let fut = {
            let mut imports = self.imports.lock();
            match imports.get(chunk) {
                Some(fut) => fut.clone(),
                None => {
                    let loader = Arc::clone(loader);
                    let chunk_key = chunk.to_string();
                    let fut = async move { loader.import(&chunk_key).await.map(Arc::new) }
                        .boxed()
                        .shared();
                    imports.insert(chunk.to_string(), fut.clone());
                    fut
                }
            }
        };
        let result = fut.clone().await;
        if result.is_err() {
            let mut imports = self.imports.lock();
            if imports.get(chunk).is_some_and(|cached| cached.ptr_eq(&fut)) {
                imports.remove(chunk);
            }
        }
        result
    }

    pub(crate) fn reset(&self) {
        self.imports.lock().clear();
    }
}

//! Static module loader with per-chunk import accounting

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use resumable::{HandlerFn, LoadError, ModuleExports, ModuleLoader};

/// Serves modules from a fixed table, counting imports per chunk. An
/// optional delay widens the window in which concurrent resolutions can
/// race.
pub struct StaticLoader {
    modules: HashMap<String, ModuleExports>,
    imports: Mutex<HashMap<String, usize>>,
    delay: Option<Duration>,
}

impl StaticLoader {
    pub fn new() -> Self {
        Self {
            modules: HashMap::new(),
            imports: Mutex::new(HashMap::new()),
            delay: None,
        }
    }

    pub fn with_module(mut self, chunk: impl Into<String>, module: ModuleExports) -> Self {
        self.modules.insert(chunk.into(), module);
        self
    }

    pub fn with_export(
        self,
        chunk: impl Into<String>,
        export: impl Into<String>,
        handler: HandlerFn,
    ) -> Self {
        self.with_module(chunk, ModuleExports::new().with_export(export, handler))
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn import_count(&self, chunk: &str) -> usize {
        self.imports.lock().get(chunk).copied().unwrap_or(0)
    }

    pub fn total_imports(&self) -> usize {
        self.imports.lock().values().sum()
    }
}

impl Default for StaticLoader {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ModuleLoader for StaticLoader {
    async fn import(&self, chunk: &str) -> Result<ModuleExports, LoadError> {
        *self.imports.lock().entry(chunk.to_string()).or_insert(0) += 1;
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.modules
            .get(chunk)
            .cloned()
            .ok_or_else(|| LoadError::ChunkNotFound(chunk.to_string()))
    }
}

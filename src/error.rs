//! Error types for the resumability engine

use thiserror::Error;

/// Failure to load a module chunk through a
/// [`ModuleLoader`](crate::lazy::ModuleLoader).
///
/// Clone-able so one in-flight import future can be shared between
/// concurrent resolution requests for the same chunk.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LoadError {
    #[error("Chunk not found: {0}")]
    ChunkNotFound(String),
    #[error("Import failed for chunk {chunk}: {reason}")]
    ImportFailed { chunk: String, reason: String },
}

/// Errors surfaced by registries and the resume protocol
#[derive(Error, Debug)]
pub enum ResumeError {
    #[error("Unknown lazy reference: {0}")]
    UnknownReference(String),
    /// Restored inline references carry no callable; the running program must
    /// re-register them before they can be invoked. Hitting this is a caller
    /// defect, not a transient runtime condition.
    #[error("Inline reference {0} has no callable after restore; re-register it before invoking")]
    UnresolvableInline(String),
    #[error("Export {export} not found in chunk {chunk}")]
    MissingExport { chunk: String, export: String },
    #[error("Module load failed: {0}")]
    Load(#[from] LoadError),
    #[error("Serialization failed: {0}")]
    Serialize(#[from] serde_json::Error),
}

pub mod boundary;
pub mod closure;
pub mod context;
pub mod dom;
pub mod error;
pub mod lazy;
pub mod listener;
pub mod registries;
pub mod runtime;
pub mod state;

/// JSON-safe value crossing the serialization boundary
pub type Json = serde_json::Value;

pub use boundary::{BoundaryRegistry, ComponentBoundary};
pub use closure::{
    deserialize_closure_vars, serialize_closure, Capture, CapturedVar, ResolvedVar,
    SerializedClosure,
};
pub use context::{
    create_context, extract_from_page, inject_into_page, serialize_context, ResumableContext,
    PAYLOAD_SCHEMA_VERSION, STATE_BLOCK_ID,
};
pub use dom::{DocumentHost, DomEvent, ElementNode, HandlerFn, LISTENER_ATTR, QRL_ATTR_PREFIX};
pub use error::{LoadError, ResumeError};
pub use lazy::{
    LazyRef, LazyRefRecord, LazyRegistry, LazyTarget, ModuleExports, ModuleLoader,
    RegisterOptions, INLINE_CHUNK,
};
pub use listener::{
    DeclareOptions, Delegator, DispatchOutcome, ListenerDescriptor, ListenerRegistry,
};
pub use registries::Registries;
pub use runtime::{ClientRuntime, PersistedState, Phase, ResumeReport, WaitOptions};
pub use state::{
    CellKind, DeriveFn, SerializeOptions, StateCell, StateOptions, StateRegistry, StateSnapshot,
    DEFAULT_MAX_STATE_BYTES,
};

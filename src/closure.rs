//! Closure serializer
//!
//! Functions cannot cross a text-serialization boundary, so a closure is
//! split into its textual source and a converted capture set: nested
//! functions become lazy references, reactive cells become live links into
//! the state registry, JSON-representable values are deep-copied, and
//! everything else falls back to a string coercion with an explicit
//! fidelity-loss caveat.

use serde::{Deserialize, Serialize};

use crate::dom::HandlerFn;
use crate::lazy::{LazyRef, RegisterOptions};
use crate::registries::Registries;
use crate::state::StateCell;
use crate::Json;

/// A captured variable as the caller sees it before serialization
pub enum Capture {
    Function(HandlerFn),
    Cell(StateCell),
    Json(Json),
    /// Not representable as JSON; carried as its string coercion
    Opaque(String),
}

/// A captured variable in serialized form
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CapturedVar {
    /// Link to a registered lazy reference
    LazyRef { symbol: String },
    /// Live link into the state registry, never a frozen value copy
    StateLink { id: String },
    Value { value: Json },
    /// String coercion of a non-representable value; `lossy` records the
    /// fidelity loss for the caller
    Coerced { text: String, lossy: bool },
}

/// Serialization-safe form of one closure
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SerializedClosure {
    /// Textual source of the function
    pub code: String,
    /// Converted captures in declaration order
    pub captured: Vec<(String, CapturedVar)>,
}

/// Convert a function's captured variables into a serialization-safe
/// structure, registering nested functions and linking cells on the fly
pub fn serialize_closure(
    code: impl Into<String>,
    vars: Vec<(String, Capture)>,
    registries: &Registries,
) -> SerializedClosure {
    let captured = vars
        .into_iter()
        .map(|(name, capture)| {
            let converted = match capture {
                Capture::Function(handler) => {
                    let reference = registries.lazy.register(handler, RegisterOptions::default());
                    CapturedVar::LazyRef {
                        symbol: reference.symbol().to_string(),
                    }
                }
                Capture::Cell(cell) => {
                    registries.state.adopt(&cell);
                    CapturedVar::StateLink {
                        id: cell.id().to_string(),
                    }
                }
                Capture::Json(value) => CapturedVar::Value { value },
                Capture::Opaque(text) => CapturedVar::Coerced { text, lossy: true },
            };
            (name, converted)
        })
        .collect();
    SerializedClosure {
        code: code.into(),
        captured,
    }
}

/// A captured variable resolved back through the registries
#[derive(Debug)]
pub enum ResolvedVar {
    /// `None` when the reference was never restored; callers must tolerate
    /// this and treat invocation of such a capture as their own defect
    Function(Option<LazyRef>),
    Cell(Option<StateCell>),
    Value(Json),
    Coerced(String),
}

/// Inverse of [`serialize_closure`]: map serialized captures back to live
/// registry entries
pub fn deserialize_closure_vars(
    captured: &[(String, CapturedVar)],
    registries: &Registries,
) -> Vec<(String, ResolvedVar)> {
    captured
        .iter()
        .map(|(name, var)| {
            let resolved = match var {
                CapturedVar::LazyRef { symbol } => {
                    ResolvedVar::Function(registries.lazy.get(symbol))
                }
                CapturedVar::StateLink { id } => ResolvedVar::Cell(registries.state.get(id)),
                CapturedVar::Value { value } => ResolvedVar::Value(value.clone()),
                CapturedVar::Coerced { text, .. } => ResolvedVar::Coerced(text.clone()),
            };
            (name.clone(), resolved)
        })
        .collect()
}

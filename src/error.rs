use thiserror::Error;

use crate::ids::SubscriptionId;

/// Crate-wide result alias. Every fallible public operation returns this.
pub type Result<T> = std::result::Result<T, EngineError>;

/// Stable error taxonomy shared across every component of the engine.
///
/// Some variants (`AlreadyActive`, `NotActive`, `Suppressed`) are not failures from the
/// caller's perspective; they are surfaced as `Ok` states by the APIs that can produce them
/// and only appear here when a lower-level caller wants to report them explicitly.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EngineError {
    #[error("target is immune to {type_tag}")]
    Immune { type_tag: String },

    #[error("condition {id} is not active")]
    NotActive { id: u64 },

    #[error("no spell slot of level {level} available")]
    ResourceExhausted { level: u32 },

    #[error("validation failed: {reason}")]
    ValidationError { reason: String },

    #[error("no implementation registered for ref {0}")]
    UnknownRef(String),

    #[error("invalid json: {0}")]
    InvalidJson(String),

    #[error("json payload is missing a top-level `ref` field")]
    MissingRef,

    #[error("ref `{0}` could not be parsed (expected module:type:id)")]
    UnparseableRef(String),

    #[error("subscription {0:?} was not found")]
    NotFound(SubscriptionId),

    #[error("handler {source_id:?} failed: {cause}")]
    HandlerError { source_id: SubscriptionId, cause: String },
}

impl EngineError {
    pub fn validation(reason: impl Into<String>) -> Self {
        EngineError::ValidationError { reason: reason.into() }
    }
}

/// A result carrying a primary outcome plus any errors collected during a best-effort,
/// continue-on-failure sweep (breaking a relationship, tearing down included conditions, ...).
///
/// The operation never aborts partway through because one element failed; failures are
/// gathered here instead, per the propagation policy in the spec's error handling section.
#[derive(Debug, Clone)]
pub struct Aggregated<T> {
    pub value: T,
    pub errors: Vec<EngineError>,
}

impl<T> Aggregated<T> {
    pub fn ok(value: T) -> Self {
        Self { value, errors: Vec::new() }
    }

    pub fn is_clean(&self) -> bool {
        self.errors.is_empty()
    }
}

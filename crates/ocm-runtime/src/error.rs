//! Scheme and payload error types.

use thiserror::Error;

use crate::types::Type;

/// Errors raised while parsing type identifiers or working with a [`Scheme`](crate::Scheme).
#[derive(Debug, Error)]
pub enum SchemeError {
    /// A type identifier string could not be parsed.
    #[error("invalid type identifier {input:?}: {reason}")]
    InvalidType {
        /// The rejected input.
        input: String,
        /// Why it was rejected.
        reason: String,
    },

    /// The identifier is already bound to a different prototype kind.
    #[error("type {typ} is already registered for {existing}, cannot register it for {requested}")]
    AlreadyRegistered {
        /// The contested identifier.
        typ: Type,
        /// Kind the identifier is bound to.
        existing: &'static str,
        /// Kind that tried to claim it.
        requested: &'static str,
    },

    /// The prototype kind has no identifier in the scheme.
    #[error("prototype {kind} is not registered in the scheme")]
    NotRegistered {
        /// Rust type name of the prototype.
        kind: &'static str,
    },

    /// The payload's type tag is not known to the scheme.
    #[error("type {0} is not known to the scheme")]
    UnknownType(Type),

    /// The payload carries no type tag.
    #[error("payload has no type")]
    MissingType,

    /// The type tag belongs to another prototype kind than the destination.
    #[error("type {typ} decodes into {registered}, not {requested}")]
    KindMismatch {
        /// The payload's type tag.
        typ: Type,
        /// Kind the tag is registered for.
        registered: &'static str,
        /// Kind the caller asked for.
        requested: &'static str,
    },

    /// The payload is not a JSON object or is otherwise malformed.
    #[error("invalid payload: {0}")]
    InvalidPayload(String),

    /// JSON (de)serialization failed.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type for runtime operations.
pub type RuntimeResult<T> = Result<T, SchemeError>;

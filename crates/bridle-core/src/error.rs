//! Error types shared by the modeling layer and its storage backends

use indexmap::IndexMap;
use thiserror::Error;

/// Errors surfaced by models, caches and stores
#[derive(Debug, Error)]
pub enum Error {
    /// A field name not present in the model's schema
    #[error("unknown field '{0}'")]
    Schema(String),

    /// Missing store, missing model name, missing primary key and similar
    /// setup problems
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Server-reported per-field validation failures
    #[error("validation failed: {message}")]
    Validation {
        /// The server's top-level error message
        message: String,
        /// Per-field messages, exactly as reported
        fields: IndexMap<String, String>,
    },

    /// No record for the requested identity
    #[error("not found: {0}")]
    NotFound(String),

    /// Transport failure or a non-2xx response without a structured body
    #[error("request failed: {0}")]
    Request(String),

    /// Malformed response body
    #[error("malformed response: {0}")]
    Parse(String),

    /// Local storage backend failure
    #[error("storage error: {0}")]
    Storage(String),
}

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

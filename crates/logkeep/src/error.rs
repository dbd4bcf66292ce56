//! Error types for the log persistence engine.

use thiserror::Error;

/// Errors surfaced by stores, the schema resolver and configuration.
///
/// Housekeeping failures (rotation, cleanup, pruning) are logged where they
/// happen and never reach callers through this type.
#[derive(Debug, Error)]
pub enum LogError {
    /// A required field was not provided.
    #[error("missing required field: {0}")]
    MissingField(&'static str),

    /// A serialized level code does not name a known level.
    #[error("unknown log level: {0}")]
    UnknownLevel(String),

    /// Serialization or deserialization failed.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The indexed store reported an error.
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// Invalid filter or search request.
    #[error("invalid filter: {0}")]
    InvalidFilter(String),

    /// Invalid configuration.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// No schema resource matched any candidate.
    #[error("no schema resource found (attempted: {})", attempted.join(", "))]
    SchemaNotFound {
        /// Every candidate kind and location that was tried, in priority order.
        attempted: Vec<String>,
    },

    /// The on-disk store was written by a schema this build does not understand.
    #[error("schema version {found} is newer than supported version {supported}")]
    SchemaMismatch {
        /// Version recorded in the store.
        found: u32,
        /// Highest version this build can open.
        supported: u32,
    },

    /// A background task running a blocking store call failed.
    #[error("background task failed: {0}")]
    TaskFailed(String),
}

/// Result type alias for log operations.
pub type Result<T> = std::result::Result<T, LogError>;

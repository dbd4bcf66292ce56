//! CLI error types.

use thiserror::Error;

use logkeep::LogError;

/// CLI-specific errors.
#[derive(Debug, Error)]
pub enum CliError {
    /// The store or its configuration reported an error.
    #[error(transparent)]
    Store(#[from] LogError),

    /// The command does not apply to the configured backend.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Output formatting error.
    #[error("format error: {0}")]
    Format(String),

    /// The export was interrupted before it finished.
    #[error("export cancelled after {fetched} event(s)")]
    Cancelled {
        /// Events fetched before cancellation.
        fetched: usize,
    },

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

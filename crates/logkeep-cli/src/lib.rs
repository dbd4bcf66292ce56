//! # logkeep-cli
//!
//! Operator command-line interface for a `logkeep` store.
//!
//! Provides commands for:
//! - Inspecting the backend, its containers or database
//! - Querying, searching and exporting events
//! - Statistics and distinct field values
//! - Rotation and retention on demand
//!
//! The store is opened in-process from an [`logkeep::EngineConfig`], loaded
//! from `--config` (or `LOGKEEP_CONFIG`) with `--dir` applied on top.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod cli;
pub mod commands;
pub mod error;
pub mod output;

pub use cli::{Cli, Commands, ExportArgs, FilterArgs, Format, QueryArgs, SearchArgs};
pub use error::CliError;
pub use output::OutputFormat;

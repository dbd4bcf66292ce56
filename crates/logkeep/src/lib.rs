//! # logkeep
//!
//! Embedded log persistence for a single process with many writer threads.
//!
//! This crate provides:
//!
//! - [`LogEvent`] — Immutable structured log records
//! - [`RotationPolicy`] / [`GenerationPolicy`] — When containers roll over and
//!   which one receives writes
//! - [`RotationManager`] / [`SelectionManager`] — Container rotation, retention and selection
//! - [`EventStore`] — Abstract trait over storage backends
//! - [`FileEventStore`] — Rotated JSON-lines containers
//! - [`IndexedEventStore`] — SQLite store with indexed filtering, paging and aggregation
//! - [`ConcurrentCache`] — Read-mostly cache fronting expensive lookups
//! - [`LogEngine`] — Cheap-clone handle with async wrappers
//!
//! ## Example
//!
//! ```rust,no_run
//! use logkeep::{EngineConfig, EventStore, LogEngine, LogEvent, LogFilter, LogLevel};
//!
//! # fn main() -> logkeep::Result<()> {
//! let engine = LogEngine::open(EngineConfig::new("/var/log/app"))?;
//! engine.store().insert(&LogEvent::new(LogLevel::Info, "Application started"))?;
//!
//! let errors = LogFilter::new().with_min_level(LogLevel::Warning);
//! let page = engine.store().fetch_page(&errors, 0, engine.page_size())?;
//! # let _ = page;
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod cache;
pub mod config;
pub mod container;
pub mod engine;
pub mod error;
pub mod file_store;
pub mod indexed_store;
pub mod policy;
pub mod rotation;
pub mod schema;
pub mod selection;
pub mod traits;
pub mod types;

// Re-export main types
pub use cache::ConcurrentCache;
pub use config::{Backend, EngineConfig, MIN_STORE_BYTES};
pub use container::{list_containers, Container};
pub use engine::{LogEngine, SharedEventStore};
pub use error::{LogError, Result};
pub use file_store::FileEventStore;
pub use indexed_store::{IndexedEventStore, PruneReport};
pub use policy::{should_rotate, ContainerMeta, GenerationPolicy, RotationPolicy};
pub use rotation::{cleanup, RotationManager};
pub use schema::{Schema, SchemaRequest, SchemaSource, CURRENT_SCHEMA_VERSION};
pub use selection::SelectionManager;
pub use traits::{EventStore, ExportOutcome, QueryLimits};
pub use types::{
    DistinctField, FunctionCount, LogEvent, LogEventBuilder, LogFilter, LogLevel, Page,
    SearchField, SessionId, Statistics, TimeRange,
};

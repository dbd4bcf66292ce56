//! CLI command implementations.
//!
//! Each submodule implements a specific CLI command:
//! - [`inspect`] - Backend overview
//! - [`query`] - Filtered paging and keyword search
//! - [`stats`] - Statistics and distinct field values
//! - [`maintenance`] - Rotation and retention
//! - [`export`] - Cancellable JSON-lines export

pub mod export;
pub mod inspect;
pub mod maintenance;
pub mod query;
pub mod stats;

pub use export::ExportCommand;
pub use inspect::InspectCommand;
pub use maintenance::{PruneCommand, RotateCommand};
pub use query::{QueryCommand, SearchCommand};
pub use stats::{DistinctCommand, StatsCommand};

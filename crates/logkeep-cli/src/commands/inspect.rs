//! Inspect command implementation.
//!
//! Opens the configured backend directly and reports what is on disk:
//! containers for the file backend, database details for the indexed one.

use std::io::Write;

use logkeep::{Backend, EngineConfig, EventStore, FileEventStore, IndexedEventStore, LogFilter};

use crate::error::CliError;
use crate::output::{ContainerRow, DatabaseInfo, OutputFormat, StoreSummary};

/// Inspect command executor.
pub struct InspectCommand<'a> {
    config: &'a EngineConfig,
}

impl<'a> InspectCommand<'a> {
    /// Create a new inspect command.
    #[must_use]
    pub const fn new(config: &'a EngineConfig) -> Self {
        Self { config }
    }

    /// Execute the inspect command.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be opened or output fails.
    pub async fn execute<W: Write>(
        &self,
        writer: &mut W,
        format: &OutputFormat,
    ) -> Result<(), CliError> {
        let summary = self.summarize()?;
        format.write(writer, &summary)
    }

    /// Build the store summary.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be opened or counted.
    pub fn summarize(&self) -> Result<StoreSummary, CliError> {
        let everything = LogFilter::new();
        let summary = match self.config.backend {
            Backend::File => {
                let store = FileEventStore::open(self.config)?;
                StoreSummary {
                    backend: store.name().to_string(),
                    directory: self.config.directory.clone(),
                    event_count: store.count(&everything)?,
                    containers: store.containers().iter().map(ContainerRow::from).collect(),
                    database: None,
                }
            }
            Backend::Indexed => {
                let store = IndexedEventStore::open(self.config)?;
                StoreSummary {
                    backend: store.name().to_string(),
                    directory: self.config.directory.clone(),
                    event_count: store.count(&everything)?,
                    containers: Vec::new(),
                    database: Some(DatabaseInfo {
                        path: store.path().to_path_buf(),
                        schema_version: store.schema_version(),
                        live_bytes: store.live_bytes()?,
                    }),
                }
            }
        };
        Ok(summary)
    }
}

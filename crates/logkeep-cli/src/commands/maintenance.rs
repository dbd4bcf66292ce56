//! Rotation and retention commands.

use std::io::Write;

use logkeep::{Backend, EngineConfig, FileEventStore, LogEngine};
use tracing::info;

use crate::error::CliError;
use crate::output::{Message, OutputFormat};

/// Handler for the rotate command.
pub struct RotateCommand<'a> {
    config: &'a EngineConfig,
}

impl<'a> RotateCommand<'a> {
    /// Creates a new rotate command handler.
    #[must_use]
    pub const fn new(config: &'a EngineConfig) -> Self {
        Self { config }
    }

    /// Seals the current container.
    ///
    /// # Errors
    ///
    /// Returns an error for the indexed backend, or if the store cannot be opened.
    pub async fn execute<W: Write>(
        &self,
        out: &mut W,
        format: &OutputFormat,
    ) -> Result<(), CliError> {
        if self.config.backend != Backend::File {
            return Err(CliError::InvalidArgument(
                "rotate applies to the file backend only".into(),
            ));
        }

        let store = FileEventStore::open(self.config)?;
        let message = match store.rotate_now() {
            Some(sealed) => {
                info!(container = %sealed.name(), "sealed container on request");
                Message::success(format!("sealed {}", sealed.name()))
            }
            None => Message::info("no open container to rotate"),
        };
        format.write(out, &message)
    }
}

/// Handler for the prune command.
pub struct PruneCommand<'a> {
    engine: &'a LogEngine,
}

impl<'a> PruneCommand<'a> {
    /// Creates a new prune command handler.
    #[must_use]
    pub const fn new(engine: &'a LogEngine) -> Self {
        Self { engine }
    }

    /// Applies the configured retention limits.
    ///
    /// # Errors
    ///
    /// Returns an error if retention fails or output fails.
    pub async fn execute<W: Write>(
        &self,
        out: &mut W,
        format: &OutputFormat,
    ) -> Result<(), CliError> {
        let removed = self.engine.enforce_retention_async().await?;
        let unit = match self.engine.config().backend {
            Backend::File => "container(s)",
            Backend::Indexed => "event(s)",
        };
        format.write(out, &Message::success(format!("removed {removed} {unit}")))
    }
}

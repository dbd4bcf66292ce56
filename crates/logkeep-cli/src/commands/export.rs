//! Export command implementation.
//!
//! Streams every matching event as one JSON object per line, either to a
//! file or to the command's output. Ctrl-C stops the export before its
//! next batch.

use std::fs::File;
use std::io::{BufWriter, Write};

use logkeep::{ExportOutcome, LogEngine, LogEvent};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::cli::ExportArgs;
use crate::error::CliError;
use crate::output::{Message, OutputFormat};

/// Handler for the export command.
pub struct ExportCommand<'a> {
    engine: &'a LogEngine,
}

impl<'a> ExportCommand<'a> {
    /// Creates a new export command handler.
    #[must_use]
    pub const fn new(engine: &'a LogEngine) -> Self {
        Self { engine }
    }

    /// Executes the export, cancelling it on Ctrl-C.
    ///
    /// # Errors
    ///
    /// Returns [`CliError::Cancelled`] if interrupted, or an error if the
    /// query or writing fails.
    pub async fn execute<W: Write>(
        &self,
        out: &mut W,
        format: &OutputFormat,
        args: &ExportArgs,
    ) -> Result<(), CliError> {
        let cancel = CancellationToken::new();
        let watcher = tokio::spawn({
            let cancel = cancel.clone();
            async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    warn!("interrupt received, cancelling export");
                    cancel.cancel();
                }
            }
        });

        let result = self.execute_with(out, format, args, cancel).await;
        watcher.abort();
        result
    }

    /// Executes the export under an externally owned cancellation token.
    ///
    /// # Errors
    ///
    /// Same as [`execute`](Self::execute).
    pub async fn execute_with<W: Write>(
        &self,
        out: &mut W,
        format: &OutputFormat,
        args: &ExportArgs,
        cancel: CancellationToken,
    ) -> Result<(), CliError> {
        let outcome = self
            .engine
            .export_async(args.filter.to_filter(), cancel)
            .await?;
        let events = match outcome {
            ExportOutcome::Completed { events } => events,
            ExportOutcome::Cancelled { fetched } => return Err(CliError::Cancelled { fetched }),
        };

        match &args.out {
            Some(path) => {
                let mut file = BufWriter::new(File::create(path)?);
                write_lines(&mut file, &events)?;
                file.flush()?;
                info!(path = %path.display(), count = events.len(), "export written");
                let message = Message::success(format!(
                    "exported {} event(s) to {}",
                    events.len(),
                    path.display()
                ));
                format.write(out, &message)
            }
            None => write_lines(out, &events),
        }
    }
}

fn write_lines<W: Write>(writer: &mut W, events: &[LogEvent]) -> Result<(), CliError> {
    for event in events {
        serde_json::to_writer(&mut *writer, event)
            .map_err(|e| CliError::Format(format!("JSON serialization failed: {e}")))?;
        writeln!(writer)?;
    }
    Ok(())
}

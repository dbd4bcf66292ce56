//! Statistics and distinct-value command implementations.

use std::io::Write;

use logkeep::{DistinctField, LogEngine};

use crate::error::CliError;
use crate::output::{DistinctValues, OutputFormat};

/// Handler for the stats command.
pub struct StatsCommand<'a> {
    engine: &'a LogEngine,
}

impl<'a> StatsCommand<'a> {
    /// Creates a new stats command handler.
    #[must_use]
    pub const fn new(engine: &'a LogEngine) -> Self {
        Self { engine }
    }

    /// Executes the stats command.
    ///
    /// # Errors
    ///
    /// Returns an error if the aggregation or output fails.
    pub async fn execute<W: Write>(
        &self,
        out: &mut W,
        format: &OutputFormat,
    ) -> Result<(), CliError> {
        let stats = self.engine.statistics_async().await?;
        format.write(out, &stats)
    }
}

/// Handler for the distinct command.
pub struct DistinctCommand<'a> {
    engine: &'a LogEngine,
}

impl<'a> DistinctCommand<'a> {
    /// Creates a new distinct command handler.
    #[must_use]
    pub const fn new(engine: &'a LogEngine) -> Self {
        Self { engine }
    }

    /// Executes the distinct command.
    ///
    /// # Errors
    ///
    /// Returns an error if the lookup or output fails.
    pub async fn execute<W: Write>(
        &self,
        out: &mut W,
        format: &OutputFormat,
        field: DistinctField,
    ) -> Result<(), CliError> {
        let values = self.engine.distinct_values_async(field).await?;
        format.write(out, &DistinctValues { field, values })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::Format;
    use logkeep::{EngineConfig, LogEvent, LogLevel};
    use tempfile::TempDir;

    async fn engine(dir: &TempDir) -> LogEngine {
        let engine = LogEngine::open(EngineConfig::new(dir.path())).expect("open");
        let events = ["alpha", "beta", "alpha"]
            .into_iter()
            .map(|function| {
                LogEvent::builder()
                    .level(LogLevel::Debug)
                    .message("tick")
                    .function(function)
                    .thread("main")
                    .build()
                    .expect("event")
            })
            .collect();
        engine.insert_batch_async(events).await.expect("insert");
        engine
    }

    #[tokio::test]
    async fn stats_json_output() {
        let dir = TempDir::new().expect("temp dir");
        let engine = engine(&dir).await;
        let mut out = Vec::new();

        StatsCommand::new(&engine)
            .execute(&mut out, &OutputFormat::new(Format::Json))
            .await
            .expect("stats");

        let parsed: serde_json::Value = serde_json::from_slice(&out).expect("JSON");
        assert_eq!(parsed["total_count"], 3);
        assert_eq!(parsed["top_functions"][0]["function"], "alpha");
        assert_eq!(parsed["top_functions"][0]["count"], 2);
    }

    #[tokio::test]
    async fn distinct_table_output() {
        let dir = TempDir::new().expect("temp dir");
        let engine = engine(&dir).await;
        let mut out = Vec::new();

        DistinctCommand::new(&engine)
            .execute(&mut out, &OutputFormat::default(), DistinctField::Function)
            .await
            .expect("distinct");

        let text = String::from_utf8(out).expect("utf8");
        assert!(text.starts_with("FUNCTION\n"));
        assert!(text.contains("alpha\nbeta\n"));
    }
}

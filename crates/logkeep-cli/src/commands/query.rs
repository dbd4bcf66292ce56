//! Query and search command implementations.

use std::io::Write;

use logkeep::{LogEngine, SessionId};
use tracing::debug;

use crate::cli::{QueryArgs, SearchArgs};
use crate::error::CliError;
use crate::output::{OutputFormat, SearchResults};

/// Handler for the query command.
pub struct QueryCommand<'a> {
    engine: &'a LogEngine,
}

impl<'a> QueryCommand<'a> {
    /// Creates a new query command handler.
    #[must_use]
    pub const fn new(engine: &'a LogEngine) -> Self {
        Self { engine }
    }

    /// Executes the query command.
    ///
    /// # Errors
    ///
    /// Returns an error if the filter is invalid, the query fails or output fails.
    pub async fn execute<W: Write>(
        &self,
        out: &mut W,
        format: &OutputFormat,
        args: &QueryArgs,
    ) -> Result<(), CliError> {
        let limit = args.limit.unwrap_or_else(|| self.engine.page_size());
        if limit == 0 {
            return Err(CliError::InvalidArgument("--limit must be positive".into()));
        }

        let filter = args.filter.to_filter();
        let page = self
            .engine
            .fetch_range_async(filter, args.offset, limit)
            .await?;
        debug!(
            offset = page.offset,
            returned = page.events.len(),
            has_more = page.has_more,
            "query page"
        );
        format.write(out, &page)
    }
}

/// Handler for the search command.
pub struct SearchCommand<'a> {
    engine: &'a LogEngine,
}

impl<'a> SearchCommand<'a> {
    /// Creates a new search command handler.
    #[must_use]
    pub const fn new(engine: &'a LogEngine) -> Self {
        Self { engine }
    }

    /// Executes the search command.
    ///
    /// # Errors
    ///
    /// Returns an error if the keyword is too short, the search fails or output fails.
    pub async fn execute<W: Write>(
        &self,
        out: &mut W,
        format: &OutputFormat,
        args: &SearchArgs,
    ) -> Result<(), CliError> {
        let sessions: Vec<SessionId> = args
            .session
            .iter()
            .map(|s| SessionId::from(s.as_str()))
            .collect();
        let events = self
            .engine
            .search_async(sessions, args.keyword.clone(), args.fields.clone(), args.limit)
            .await?;
        let results = SearchResults {
            keyword: args.keyword.clone(),
            events,
        };
        format.write(out, &results)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::{FilterArgs, Format};
    use logkeep::{EngineConfig, LogError, LogEvent, LogLevel, SearchField};
    use tempfile::TempDir;

    async fn engine_with_events(dir: &TempDir) -> LogEngine {
        let engine = LogEngine::open(
            EngineConfig::new(dir.path())
                .with_retention_days(0)
                .with_page_size(2),
        )
        .expect("open");
        let events = (0..5)
            .map(|i| {
                LogEvent::builder()
                    .timestamp(1_700_000_000.0 + f64::from(i))
                    .level(if i % 2 == 0 { LogLevel::Error } else { LogLevel::Info })
                    .message(format!("request {i} finished"))
                    .location("server.rs", "handle", 10)
                    .context("http")
                    .build()
                    .expect("event")
            })
            .collect();
        engine.insert_batch_async(events).await.expect("insert");
        engine
    }

    fn query_args(filter: FilterArgs, offset: usize, limit: Option<usize>) -> QueryArgs {
        QueryArgs {
            filter,
            offset,
            limit,
        }
    }

    #[tokio::test]
    async fn query_uses_configured_page_size() {
        let dir = TempDir::new().expect("temp dir");
        let engine = engine_with_events(&dir).await;
        let mut out = Vec::new();
        let format = OutputFormat::new(Format::Json);

        QueryCommand::new(&engine)
            .execute(&mut out, &format, &query_args(FilterArgs::default(), 0, None))
            .await
            .expect("query");

        let parsed: serde_json::Value = serde_json::from_slice(&out).expect("JSON");
        assert_eq!(parsed["events"].as_array().map(Vec::len), Some(2));
        assert_eq!(parsed["has_more"], true);
        assert_eq!(parsed["events"][0]["message"], "request 4 finished");
    }

    #[tokio::test]
    async fn query_filters_by_level() {
        let dir = TempDir::new().expect("temp dir");
        let engine = engine_with_events(&dir).await;
        let mut out = Vec::new();
        let format = OutputFormat::new(Format::Json);
        let filter = FilterArgs {
            level: vec![LogLevel::Error],
            ..FilterArgs::default()
        };

        QueryCommand::new(&engine)
            .execute(&mut out, &format, &query_args(filter, 0, Some(10)))
            .await
            .expect("query");

        let parsed: serde_json::Value = serde_json::from_slice(&out).expect("JSON");
        assert_eq!(parsed["events"].as_array().map(Vec::len), Some(3));
        assert_eq!(parsed["has_more"], false);
    }

    #[tokio::test]
    async fn query_rejects_zero_limit() {
        let dir = TempDir::new().expect("temp dir");
        let engine = engine_with_events(&dir).await;
        let result = QueryCommand::new(&engine)
            .execute(
                &mut Vec::new(),
                &OutputFormat::default(),
                &query_args(FilterArgs::default(), 0, Some(0)),
            )
            .await;
        assert!(matches!(result, Err(CliError::InvalidArgument(_))));
    }

    #[tokio::test]
    async fn search_table_output() {
        let dir = TempDir::new().expect("temp dir");
        let engine = engine_with_events(&dir).await;
        let mut out = Vec::new();
        let args = SearchArgs {
            keyword: "request 3".to_string(),
            fields: Vec::new(),
            session: Vec::new(),
            limit: 10,
        };

        SearchCommand::new(&engine)
            .execute(&mut out, &OutputFormat::default(), &args)
            .await
            .expect("search");

        let text = String::from_utf8(out).expect("utf8");
        assert!(text.contains("request 3 finished"));
        assert!(text.contains("1 match(es)"));
    }

    #[tokio::test]
    async fn search_other_fields() {
        let dir = TempDir::new().expect("temp dir");
        let engine = engine_with_events(&dir).await;
        let mut out = Vec::new();
        let args = SearchArgs {
            keyword: "http".to_string(),
            fields: vec![SearchField::Context],
            session: Vec::new(),
            limit: 10,
        };

        SearchCommand::new(&engine)
            .execute(&mut out, &OutputFormat::new(Format::Json), &args)
            .await
            .expect("search");

        let parsed: serde_json::Value = serde_json::from_slice(&out).expect("JSON");
        assert_eq!(parsed["events"].as_array().map(Vec::len), Some(5));
    }

    #[tokio::test]
    async fn search_rejects_short_keyword() {
        let dir = TempDir::new().expect("temp dir");
        let engine = engine_with_events(&dir).await;
        let args = SearchArgs {
            keyword: "ab".to_string(),
            fields: Vec::new(),
            session: Vec::new(),
            limit: 10,
        };

        let result = SearchCommand::new(&engine)
            .execute(&mut Vec::new(), &OutputFormat::default(), &args)
            .await;
        assert!(matches!(result, Err(CliError::Store(LogError::InvalidFilter(_)))));
    }
}

//! Command-line argument parsing with clap.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use clap::{Args, Parser, Subcommand, ValueEnum};
use logkeep::{
    DistinctField, EngineConfig, LogError, LogFilter, LogLevel, SearchField, TimeRange,
};

/// logkeep - inspect, query and maintain a log store.
#[derive(Parser, Debug, Clone)]
#[command(name = "logkeep")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// JSON engine configuration file.
    #[arg(short, long, env = "LOGKEEP_CONFIG")]
    pub config: Option<PathBuf>,

    /// Store directory; overrides the configured one.
    #[arg(short, long, env = "LOGKEEP_DIR")]
    pub dir: Option<PathBuf>,

    /// Output format.
    #[arg(short, long, value_enum, default_value_t = Format::Table)]
    pub format: Format,

    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,
}

impl Cli {
    /// Loads the engine configuration: the `--config` file if given,
    /// defaults otherwise, with `--dir` applied on top.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or fails validation.
    pub fn engine_config(&self) -> Result<EngineConfig, LogError> {
        let mut config = match &self.config {
            Some(path) => EngineConfig::from_json_file(path)?,
            None => EngineConfig::default(),
        };
        if let Some(dir) = &self.dir {
            config.directory.clone_from(dir);
        }
        config.validate()?;
        Ok(config)
    }
}

/// Output format options.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum Format {
    /// Human-readable table format.
    #[default]
    Table,
    /// JSON output for scripting.
    Json,
}

/// Top-level subcommands.
#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Show the backend, its containers or database, and the event count.
    Inspect,

    /// List events matching a filter, newest first.
    Query(QueryArgs),

    /// Search event text for a keyword.
    Search(SearchArgs),

    /// Show per-level counts and the busiest functions.
    Stats,

    /// List the distinct values of an indexed field.
    Distinct {
        /// Field to list (function, file, context or thread).
        field: DistinctField,
    },

    /// Seal the current container (file backend only).
    Rotate,

    /// Apply retention now.
    Prune,

    /// Export every matching event as JSON lines.
    Export(ExportArgs),
}

/// Predicates shared by `query` and `export`.
#[derive(Args, Debug, Clone, Default)]
pub struct FilterArgs {
    /// Exact level to include (repeatable).
    #[arg(short, long)]
    pub level: Vec<LogLevel>,

    /// Include this level and everything more severe.
    #[arg(long, conflicts_with = "level")]
    pub min_level: Option<LogLevel>,

    /// Session id to include (repeatable).
    #[arg(short, long)]
    pub session: Vec<String>,

    /// Keyword the message must contain (repeatable, all must match).
    #[arg(short, long)]
    pub keyword: Vec<String>,

    /// Function name to include (repeatable).
    #[arg(long)]
    pub function: Vec<String>,

    /// Source file to include (repeatable).
    #[arg(long)]
    pub file: Vec<String>,

    /// Context tag to include (repeatable).
    #[arg(long)]
    pub context: Vec<String>,

    /// Thread name to include (repeatable).
    #[arg(long)]
    pub thread: Vec<String>,

    /// Only events at or after this RFC 3339 instant.
    #[arg(long)]
    pub since: Option<DateTime<Utc>>,

    /// Only events before this RFC 3339 instant.
    #[arg(long)]
    pub until: Option<DateTime<Utc>>,
}

impl FilterArgs {
    /// Builds the store filter these arguments describe.
    #[must_use]
    pub fn to_filter(&self) -> LogFilter {
        let mut filter = LogFilter::new();
        for level in &self.level {
            filter = filter.with_level(*level);
        }
        if let Some(min) = self.min_level {
            filter = filter.with_min_level(min);
        }
        for session in &self.session {
            filter = filter.with_session(session.as_str());
        }
        for keyword in &self.keyword {
            filter = filter.with_keyword(keyword.as_str());
        }
        for function in &self.function {
            filter = filter.with_function(function.as_str());
        }
        for file in &self.file {
            filter = filter.with_file(file.as_str());
        }
        for context in &self.context {
            filter = filter.with_context(context.as_str());
        }
        for thread in &self.thread {
            filter = filter.with_thread(thread.as_str());
        }
        let range = TimeRange::new(self.since, self.until);
        if !range.is_unbounded() {
            filter = filter.with_time_range(range);
        }
        filter
    }
}

/// Arguments for the query command.
#[derive(Args, Debug, Clone)]
pub struct QueryArgs {
    /// Filter predicates.
    #[command(flatten)]
    pub filter: FilterArgs,

    /// Number of matching events to skip.
    #[arg(long, default_value_t = 0)]
    pub offset: usize,

    /// Page size; defaults to the configured page size.
    #[arg(short = 'n', long)]
    pub limit: Option<usize>,
}

/// Arguments for the search command.
#[derive(Args, Debug, Clone)]
pub struct SearchArgs {
    /// Keyword to look for.
    pub keyword: String,

    /// Field to search (repeatable; defaults to message).
    #[arg(long = "field")]
    pub fields: Vec<SearchField>,

    /// Restrict to these session ids (repeatable).
    #[arg(short, long)]
    pub session: Vec<String>,

    /// Maximum number of hits.
    #[arg(short = 'n', long, default_value_t = 100)]
    pub limit: usize,
}

/// Arguments for the export command.
#[derive(Args, Debug, Clone)]
pub struct ExportArgs {
    /// Filter predicates.
    #[command(flatten)]
    pub filter: FilterArgs,

    /// Destination file; JSON lines go to stdout when omitted.
    #[arg(short, long)]
    pub out: Option<PathBuf>,
}

//! Output formatting for CLI commands.
//!
//! Supports table (human-readable) and JSON output formats.

use std::io::Write;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::Serialize;

use logkeep::{Container, DistinctField, LogEvent, Page, Statistics};

use crate::cli::Format;
use crate::error::CliError;

/// Output formatter that handles both table and JSON output.
#[derive(Debug, Clone)]
pub struct OutputFormat {
    format: Format,
}

impl OutputFormat {
    /// Create a new output formatter.
    #[must_use]
    pub const fn new(format: Format) -> Self {
        Self { format }
    }

    /// Get the current format.
    #[must_use]
    pub const fn format(&self) -> Format {
        self.format
    }

    /// Check if JSON format is selected.
    #[must_use]
    pub const fn is_json(&self) -> bool {
        matches!(self.format, Format::Json)
    }

    /// Write a serializable value to the output.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization or writing fails.
    pub fn write<W, T>(&self, writer: &mut W, value: &T) -> Result<(), CliError>
    where
        W: Write,
        T: Serialize + TableDisplay,
    {
        match self.format {
            Format::Json => {
                serde_json::to_writer_pretty(&mut *writer, value)
                    .map_err(|e| CliError::Format(format!("JSON serialization failed: {e}")))?;
                writeln!(writer)?;
            }
            Format::Table => {
                value.write_table(writer)?;
            }
        }
        Ok(())
    }

    /// Write a serializable value to a string.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_string<T>(&self, value: &T) -> Result<String, CliError>
    where
        T: Serialize + TableDisplay,
    {
        let mut buf = Vec::new();
        self.write(&mut buf, value)?;
        String::from_utf8(buf).map_err(|e| CliError::Format(format!("UTF-8 error: {e}")))
    }
}

impl Default for OutputFormat {
    fn default() -> Self {
        Self::new(Format::Table)
    }
}

/// Trait for types that can be displayed as a table.
pub trait TableDisplay {
    /// Write the value as a human-readable table.
    ///
    /// # Errors
    ///
    /// Returns an error if writing fails.
    fn write_table<W: Write>(&self, writer: &mut W) -> Result<(), CliError>;
}

/// Overview of a store, as printed by `inspect`.
#[derive(Debug, Clone, Serialize)]
pub struct StoreSummary {
    /// Backend name.
    pub backend: String,
    /// Configured store directory.
    pub directory: PathBuf,
    /// Number of stored events.
    pub event_count: u64,
    /// Containers, newest first (file backend).
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub containers: Vec<ContainerRow>,
    /// Database details (indexed backend).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub database: Option<DatabaseInfo>,
}

/// One container in the inventory.
#[derive(Debug, Clone, Serialize)]
pub struct ContainerRow {
    /// File name.
    pub name: String,
    /// Creation instant encoded in the name.
    pub created: DateTime<Utc>,
    /// Seal instant, if rotated.
    pub sealed_at: Option<DateTime<Utc>>,
    /// Size on disk, if the file is still present.
    pub size_bytes: Option<u64>,
}

impl From<&Container> for ContainerRow {
    fn from(container: &Container) -> Self {
        Self {
            name: container.name(),
            created: container.created(),
            sealed_at: container.sealed_at(),
            size_bytes: container.meta().map(|m| m.size),
        }
    }
}

/// Indexed store details.
#[derive(Debug, Clone, Serialize)]
pub struct DatabaseInfo {
    /// Database file.
    pub path: PathBuf,
    /// Schema version recorded in the database.
    pub schema_version: u32,
    /// Bytes held by live pages.
    pub live_bytes: u64,
}

impl TableDisplay for StoreSummary {
    fn write_table<W: Write>(&self, writer: &mut W) -> Result<(), CliError> {
        writeln!(writer, "Log Store")?;
        writeln!(writer, "══════════════════════════════════")?;
        writeln!(writer, "Backend:          {}", self.backend)?;
        writeln!(writer, "Directory:        {}", self.directory.display())?;
        writeln!(writer, "Events:           {}", self.event_count)?;

        if let Some(db) = &self.database {
            writeln!(writer)?;
            writeln!(writer, "Database")?;
            writeln!(writer, "  Path:           {}", db.path.display())?;
            writeln!(writer, "  Schema:         v{}", db.schema_version)?;
            writeln!(writer, "  Live bytes:     {}", db.live_bytes)?;
        }

        if !self.containers.is_empty() {
            writeln!(writer)?;
            writeln!(writer, "{:<48}  {:<8}  {:>10}", "CONTAINER", "STATE", "BYTES")?;
            writeln!(writer, "{}", "─".repeat(70))?;
            for row in &self.containers {
                let state = if row.sealed_at.is_some() { "sealed" } else { "open" };
                let size = row
                    .size_bytes
                    .map_or_else(|| "-".to_string(), |s| s.to_string());
                writeln!(
                    writer,
                    "{:<48}  {:<8}  {:>10}",
                    truncate(&row.name, 48),
                    state,
                    size
                )?;
            }
            writeln!(writer)?;
            writeln!(writer, "Total: {} container(s)", self.containers.len())?;
        }
        Ok(())
    }
}

impl TableDisplay for Page {
    fn write_table<W: Write>(&self, writer: &mut W) -> Result<(), CliError> {
        write_events(writer, &self.events)?;
        if !self.events.is_empty() {
            writeln!(writer)?;
            let last = self.offset + self.events.len();
            if self.has_more {
                writeln!(
                    writer,
                    "Showing {}-{last}; more available (--offset {last})",
                    self.offset + 1
                )?;
            } else {
                writeln!(writer, "Showing {}-{last}", self.offset + 1)?;
            }
        }
        Ok(())
    }
}

/// Keyword search hits.
#[derive(Debug, Clone, Serialize)]
pub struct SearchResults {
    /// Keyword searched for.
    pub keyword: String,
    /// Matching events, newest first.
    pub events: Vec<LogEvent>,
}

impl TableDisplay for SearchResults {
    fn write_table<W: Write>(&self, writer: &mut W) -> Result<(), CliError> {
        write_events(writer, &self.events)?;
        writeln!(writer)?;
        writeln!(writer, "{} match(es) for \"{}\"", self.events.len(), self.keyword)?;
        Ok(())
    }
}

impl TableDisplay for Statistics {
    fn write_table<W: Write>(&self, writer: &mut W) -> Result<(), CliError> {
        writeln!(writer, "Statistics")?;
        writeln!(writer, "══════════════════════════════════")?;
        writeln!(writer, "Total:            {}", self.total_count)?;
        writeln!(writer)?;
        writeln!(writer, "Levels")?;
        for (level, count) in &self.per_level {
            writeln!(writer, "  {:<16}{count}", format!("{level}:"))?;
        }
        if !self.top_functions.is_empty() {
            writeln!(writer)?;
            writeln!(writer, "{:<40}  {:>10}", "FUNCTION", "EVENTS")?;
            writeln!(writer, "{}", "─".repeat(52))?;
            for entry in &self.top_functions {
                writeln!(writer, "{:<40}  {:>10}", truncate(&entry.function, 40), entry.count)?;
            }
        }
        Ok(())
    }
}

/// Distinct values of one field.
#[derive(Debug, Clone, Serialize)]
pub struct DistinctValues {
    /// Field the values belong to.
    pub field: DistinctField,
    /// Values in ascending order.
    pub values: Vec<String>,
}

impl TableDisplay for DistinctValues {
    fn write_table<W: Write>(&self, writer: &mut W) -> Result<(), CliError> {
        if self.values.is_empty() {
            writeln!(writer, "No values recorded for {}", self.field.column())?;
            return Ok(());
        }
        writeln!(writer, "{}", self.field.column().to_uppercase())?;
        writeln!(writer, "{}", "─".repeat(40))?;
        for value in &self.values {
            writeln!(writer, "{value}")?;
        }
        Ok(())
    }
}

/// Simple message output.
#[derive(Debug, Clone, Serialize)]
pub struct Message {
    /// Message text.
    pub message: String,
    /// Whether this is a success message.
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub success: bool,
}

impl Message {
    /// Create a success message.
    #[must_use]
    pub fn success(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            success: true,
        }
    }

    /// Create an informational message.
    #[must_use]
    pub fn info(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            success: false,
        }
    }
}

impl TableDisplay for Message {
    fn write_table<W: Write>(&self, writer: &mut W) -> Result<(), CliError> {
        if self.success {
            writeln!(writer, "✓ {}", self.message)?;
        } else {
            writeln!(writer, "{}", self.message)?;
        }
        Ok(())
    }
}

fn write_events<W: Write>(writer: &mut W, events: &[LogEvent]) -> Result<(), CliError> {
    if events.is_empty() {
        writeln!(writer, "No matching events")?;
        return Ok(());
    }

    writeln!(
        writer,
        "{:<23}  {:<7}  {:<24}  {}",
        "TIME", "LEVEL", "FUNCTION", "MESSAGE"
    )?;
    writeln!(writer, "{}", "─".repeat(100))?;
    for event in events {
        writeln!(
            writer,
            "{:<23}  {:<7}  {:<24}  {}",
            event.datetime().format("%Y-%m-%d %H:%M:%S%.3f"),
            event.level.as_str(),
            truncate(&event.function, 24),
            truncate(&event.message, 60)
        )?;
    }
    Ok(())
}

/// Truncate a string to at most `max_len` characters.
fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else if max_len > 3 {
        let head: String = s.chars().take(max_len - 3).collect();
        format!("{head}...")
    } else {
        s.chars().take(max_len).collect()
    }
}

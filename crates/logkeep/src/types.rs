//! Core types for the log persistence engine.
//!
//! This module provides:
//! - [`LogLevel`] — Ordered severity levels, serialized as small integers
//! - [`LogEvent`] — Immutable structured log record
//! - [`SessionId`] — Identifier of one process lifetime
//! - [`LogFilter`] — Conjunction of optional query predicates
//! - [`TimeRange`] — Time-based filtering
//! - [`Statistics`] — Derived per-level and per-function counts
//! - [`Page`] — One page of a paginated fetch

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, TimeZone, Utc};
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::LogError;

/// Log severity levels, ordered from most to least verbose.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(into = "u8", try_from = "u8")]
pub enum LogLevel {
    /// Most verbose tracing output
    Verbose = 0,
    /// Debugging information
    Debug = 1,
    /// General information
    Info = 2,
    /// Warning conditions
    Warning = 3,
    /// Error conditions
    Error = 4,
}

impl LogLevel {
    /// Every level, least severe first.
    pub const ALL: [Self; 5] = [
        Self::Verbose,
        Self::Debug,
        Self::Info,
        Self::Warning,
        Self::Error,
    ];

    /// Returns true if this level is at least as severe as the given level.
    #[must_use]
    pub fn is_at_least(&self, level: Self) -> bool {
        *self >= level
    }

    /// Returns the string representation of this level.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Verbose => "verbose",
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warning => "warning",
            Self::Error => "error",
        }
    }

    /// Returns the numeric code used in storage.
    #[must_use]
    pub const fn code(self) -> u8 {
        self as u8
    }
}

impl From<LogLevel> for u8 {
    fn from(level: LogLevel) -> Self {
        level.code()
    }
}

impl TryFrom<u8> for LogLevel {
    type Error = LogError;

    fn try_from(code: u8) -> Result<Self, LogError> {
        Self::ALL
            .get(usize::from(code))
            .copied()
            .ok_or_else(|| LogError::UnknownLevel(code.to_string()))
    }
}

impl FromStr for LogLevel {
    type Err = LogError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "verbose" | "trace" => Ok(Self::Verbose),
            "debug" => Ok(Self::Debug),
            "info" => Ok(Self::Info),
            "warning" | "warn" => Ok(Self::Warning),
            "error" => Ok(Self::Error),
            other => Err(LogError::UnknownLevel(other.to_string())),
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

static CURRENT_SESSION: Lazy<SessionId> = Lazy::new(SessionId::generate);

/// Identifies one process lifetime.
///
/// The default value is the empty id, used for records written without one.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(pub String);

impl SessionId {
    /// Generates a fresh random session id.
    #[must_use]
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// The session id of the running process, generated on first use.
    #[must_use]
    pub fn current() -> Self {
        CURRENT_SESSION.clone()
    }

    /// Returns the id as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for SessionId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Current wall-clock time as fractional seconds since the Unix epoch.
#[must_use]
pub fn now_secs() -> f64 {
    Utc::now().timestamp_micros() as f64 / 1_000_000.0
}

fn secs_of(dt: DateTime<Utc>) -> f64 {
    dt.timestamp_micros() as f64 / 1_000_000.0
}

/// An immutable structured log record.
///
/// Serialized as one JSON object per line in file containers. Unknown fields
/// are ignored when reading, so newer writers stay readable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEvent {
    /// Seconds since the Unix epoch, with a fractional part
    pub timestamp: f64,
    /// Severity level
    pub level: LogLevel,
    /// The log message
    pub message: String,
    /// Source file of the call site
    #[serde(default)]
    pub file: String,
    /// Function of the call site
    #[serde(default)]
    pub function: String,
    /// Source line of the call site
    #[serde(default)]
    pub line: u32,
    /// Module or category tag
    #[serde(default)]
    pub context: String,
    /// Name of the emitting thread
    #[serde(default)]
    pub thread: String,
    /// Process lifetime that produced the event
    #[serde(default)]
    pub session_id: SessionId,
}

impl LogEvent {
    /// Creates an event stamped with the current time, thread and session.
    #[must_use]
    pub fn new(level: LogLevel, message: impl Into<String>) -> Self {
        Self {
            timestamp: now_secs(),
            level,
            message: message.into(),
            file: String::new(),
            function: String::new(),
            line: 0,
            context: String::new(),
            thread: current_thread_name(),
            session_id: SessionId::current(),
        }
    }

    /// Creates a new log event builder.
    #[must_use]
    pub fn builder() -> LogEventBuilder {
        LogEventBuilder::default()
    }

    /// The event timestamp as a UTC date-time.
    #[must_use]
    pub fn datetime(&self) -> DateTime<Utc> {
        let micros = (self.timestamp * 1_000_000.0).round() as i64;
        Utc.timestamp_micros(micros)
            .single()
            .unwrap_or(DateTime::<Utc>::MIN_UTC)
    }

    /// Returns the value of one of the indexed text fields.
    #[must_use]
    pub fn field(&self, field: DistinctField) -> &str {
        match field {
            DistinctField::Function => &self.function,
            DistinctField::File => &self.file,
            DistinctField::Context => &self.context,
            DistinctField::Thread => &self.thread,
        }
    }

    /// Returns the value of a searchable text field.
    #[must_use]
    pub fn search_field(&self, field: SearchField) -> &str {
        match field {
            SearchField::Message => &self.message,
            SearchField::Function => &self.function,
            SearchField::File => &self.file,
            SearchField::Context => &self.context,
            SearchField::Thread => &self.thread,
        }
    }

    /// Checks if this event matches the given filter.
    ///
    /// Keyword predicates are case-insensitive literal substring matches
    /// against the message.
    #[must_use]
    pub fn matches(&self, filter: &LogFilter) -> bool {
        if !filter.levels.is_empty() && !filter.levels.contains(&self.level) {
            return false;
        }
        if !filter.functions.is_empty() && !filter.functions.contains(&self.function) {
            return false;
        }
        if !filter.files.is_empty() && !filter.files.contains(&self.file) {
            return false;
        }
        if !filter.contexts.is_empty() && !filter.contexts.contains(&self.context) {
            return false;
        }
        if !filter.threads.is_empty() && !filter.threads.contains(&self.thread) {
            return false;
        }
        if !filter.session_ids.is_empty() && !filter.session_ids.contains(&self.session_id) {
            return false;
        }
        if !filter.time_range.contains_secs(self.timestamp) {
            return false;
        }

        let message = self.message.to_lowercase();
        filter
            .keywords()
            .all(|keyword| message.contains(&keyword.to_lowercase()))
    }
}

fn current_thread_name() -> String {
    let thread = std::thread::current();
    thread
        .name()
        .map_or_else(|| format!("{:?}", thread.id()), str::to_string)
}

/// Builder for constructing log events.
#[derive(Debug, Default)]
pub struct LogEventBuilder {
    timestamp: Option<f64>,
    level: Option<LogLevel>,
    message: Option<String>,
    file: String,
    function: String,
    line: u32,
    context: String,
    thread: Option<String>,
    session_id: Option<SessionId>,
}

impl LogEventBuilder {
    /// Sets the timestamp in fractional seconds since the epoch.
    #[must_use]
    pub const fn timestamp(mut self, timestamp: f64) -> Self {
        self.timestamp = Some(timestamp);
        self
    }

    /// Sets the timestamp from a date-time.
    #[must_use]
    pub fn at(mut self, at: DateTime<Utc>) -> Self {
        self.timestamp = Some(secs_of(at));
        self
    }

    /// Sets the log level.
    #[must_use]
    pub const fn level(mut self, level: LogLevel) -> Self {
        self.level = Some(level);
        self
    }

    /// Sets the message.
    #[must_use]
    pub fn message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    /// Sets the source location.
    #[must_use]
    pub fn location(
        mut self,
        file: impl Into<String>,
        function: impl Into<String>,
        line: u32,
    ) -> Self {
        self.file = file.into();
        self.function = function.into();
        self.line = line;
        self
    }

    /// Sets the source file.
    #[must_use]
    pub fn file(mut self, file: impl Into<String>) -> Self {
        self.file = file.into();
        self
    }

    /// Sets the function name.
    #[must_use]
    pub fn function(mut self, function: impl Into<String>) -> Self {
        self.function = function.into();
        self
    }

    /// Sets the context tag.
    #[must_use]
    pub fn context(mut self, context: impl Into<String>) -> Self {
        self.context = context.into();
        self
    }

    /// Sets the thread name.
    #[must_use]
    pub fn thread(mut self, thread: impl Into<String>) -> Self {
        self.thread = Some(thread.into());
        self
    }

    /// Sets the session id.
    #[must_use]
    pub fn session(mut self, session_id: impl Into<SessionId>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }

    /// Builds the event, returning an error if level or message is missing.
    ///
    /// Timestamp, thread and session default to the current values.
    ///
    /// # Errors
    ///
    /// Returns [`LogError::MissingField`] if a required field is not set.
    pub fn build(self) -> Result<LogEvent, LogError> {
        let level = self.level.ok_or(LogError::MissingField("level"))?;
        let message = self.message.ok_or(LogError::MissingField("message"))?;

        Ok(LogEvent {
            timestamp: self.timestamp.unwrap_or_else(now_secs),
            level,
            message,
            file: self.file,
            function: self.function,
            line: self.line,
            context: self.context,
            thread: self.thread.unwrap_or_else(current_thread_name),
            session_id: self.session_id.unwrap_or_else(SessionId::current),
        })
    }
}

/// Time range for filtering events.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeRange {
    /// Start of the time range (inclusive)
    pub start: Option<DateTime<Utc>>,
    /// End of the time range (exclusive)
    pub end: Option<DateTime<Utc>>,
}

impl TimeRange {
    /// Creates a new time range with the given bounds.
    #[must_use]
    pub const fn new(start: Option<DateTime<Utc>>, end: Option<DateTime<Utc>>) -> Self {
        Self { start, end }
    }

    /// Creates a time range from a start time to now.
    #[must_use]
    pub const fn since(start: DateTime<Utc>) -> Self {
        Self {
            start: Some(start),
            end: None,
        }
    }

    /// Returns true if neither bound is set.
    #[must_use]
    pub const fn is_unbounded(&self) -> bool {
        self.start.is_none() && self.end.is_none()
    }

    /// Start bound in epoch seconds.
    #[must_use]
    pub fn start_secs(&self) -> Option<f64> {
        self.start.map(secs_of)
    }

    /// End bound in epoch seconds.
    #[must_use]
    pub fn end_secs(&self) -> Option<f64> {
        self.end.map(secs_of)
    }

    /// Checks if an epoch-seconds timestamp falls within this range.
    #[must_use]
    pub fn contains_secs(&self, timestamp: f64) -> bool {
        if let Some(start) = self.start_secs() {
            if timestamp < start {
                return false;
            }
        }
        if let Some(end) = self.end_secs() {
            if timestamp >= end {
                return false;
            }
        }
        true
    }
}

/// Filter criteria for querying events.
///
/// Every predicate is optional; an empty set means "no restriction on that
/// field", never "matches nothing". Predicates combine as a conjunction.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogFilter {
    /// Allowed levels
    #[serde(default)]
    pub levels: Vec<LogLevel>,
    /// Allowed function names
    #[serde(default)]
    pub functions: Vec<String>,
    /// Allowed source files
    #[serde(default)]
    pub files: Vec<String>,
    /// Allowed context tags
    #[serde(default)]
    pub contexts: Vec<String>,
    /// Allowed thread names
    #[serde(default)]
    pub threads: Vec<String>,
    /// Allowed sessions
    #[serde(default)]
    pub session_ids: Vec<SessionId>,
    /// Literal substrings that must all appear in the message
    #[serde(default)]
    pub keywords: Vec<String>,
    /// Time range filter
    #[serde(default)]
    pub time_range: TimeRange,
}

impl LogFilter {
    /// Creates a new empty filter that matches all events.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a level filter.
    #[must_use]
    pub fn with_level(mut self, level: LogLevel) -> Self {
        self.levels.push(level);
        self
    }

    /// Allows every level at least as severe as `min`.
    #[must_use]
    pub fn with_min_level(mut self, min: LogLevel) -> Self {
        self.levels
            .extend(LogLevel::ALL.into_iter().filter(|l| l.is_at_least(min)));
        self
    }

    /// Adds a function filter.
    #[must_use]
    pub fn with_function(mut self, function: impl Into<String>) -> Self {
        self.functions.push(function.into());
        self
    }

    /// Adds a file filter.
    #[must_use]
    pub fn with_file(mut self, file: impl Into<String>) -> Self {
        self.files.push(file.into());
        self
    }

    /// Adds a context filter.
    #[must_use]
    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.contexts.push(context.into());
        self
    }

    /// Adds a thread filter.
    #[must_use]
    pub fn with_thread(mut self, thread: impl Into<String>) -> Self {
        self.threads.push(thread.into());
        self
    }

    /// Adds a session filter.
    #[must_use]
    pub fn with_session(mut self, session_id: impl Into<SessionId>) -> Self {
        self.session_ids.push(session_id.into());
        self
    }

    /// Adds a keyword that must appear in the message.
    #[must_use]
    pub fn with_keyword(mut self, keyword: impl Into<String>) -> Self {
        self.keywords.push(keyword.into());
        self
    }

    /// Adds a time range filter.
    #[must_use]
    pub fn with_time_range(mut self, time_range: TimeRange) -> Self {
        self.time_range = time_range;
        self
    }

    /// Non-blank keywords, trimmed.
    pub fn keywords(&self) -> impl Iterator<Item = &str> {
        self.keywords
            .iter()
            .map(|k| k.trim())
            .filter(|k| !k.is_empty())
    }

    /// Rejects keywords shorter than `min_keyword_len` characters.
    ///
    /// Blank keywords are ignored rather than rejected.
    ///
    /// # Errors
    ///
    /// Returns [`LogError::InvalidFilter`] naming the offending keyword.
    pub fn validate(&self, min_keyword_len: usize) -> Result<(), LogError> {
        for keyword in self.keywords() {
            check_keyword(keyword, min_keyword_len)?;
        }
        if let (Some(start), Some(end)) = (self.time_range.start, self.time_range.end) {
            if start > end {
                return Err(LogError::InvalidFilter(
                    "time range start is after its end".to_string(),
                ));
            }
        }
        Ok(())
    }
}

/// Rejects a search keyword shorter than `min_len` characters.
///
/// # Errors
///
/// Returns [`LogError::InvalidFilter`] if the keyword is too short.
pub fn check_keyword(keyword: &str, min_len: usize) -> Result<(), LogError> {
    if keyword.chars().count() < min_len {
        return Err(LogError::InvalidFilter(format!(
            "keyword {keyword:?} is shorter than {min_len} characters"
        )));
    }
    Ok(())
}

/// Indexed text fields that support distinct-value lookups.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DistinctField {
    /// Function name
    Function,
    /// Source file
    File,
    /// Context tag
    Context,
    /// Thread name
    Thread,
}

impl DistinctField {
    /// Every distinct-value field.
    pub const ALL: [Self; 4] = [Self::Function, Self::File, Self::Context, Self::Thread];

    /// Storage column holding this field.
    #[must_use]
    pub const fn column(self) -> &'static str {
        match self {
            Self::Function => "function",
            Self::File => "file",
            Self::Context => "context",
            Self::Thread => "thread",
        }
    }
}

impl FromStr for DistinctField {
    type Err = LogError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|f| f.column() == s.trim().to_ascii_lowercase())
            .ok_or_else(|| LogError::InvalidFilter(format!("unknown field: {s}")))
    }
}

/// Text fields a keyword search can target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SearchField {
    /// Message text
    Message,
    /// Function name
    Function,
    /// Source file
    File,
    /// Context tag
    Context,
    /// Thread name
    Thread,
}

impl SearchField {
    /// Every searchable field.
    pub const ALL: [Self; 5] = [
        Self::Message,
        Self::Function,
        Self::File,
        Self::Context,
        Self::Thread,
    ];

    /// Storage column holding this field.
    #[must_use]
    pub const fn column(self) -> &'static str {
        match self {
            Self::Message => "message",
            Self::Function => "function",
            Self::File => "file",
            Self::Context => "context",
            Self::Thread => "thread",
        }
    }
}

impl FromStr for SearchField {
    type Err = LogError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|f| f.column() == s.trim().to_ascii_lowercase())
            .ok_or_else(|| LogError::InvalidFilter(format!("unknown field: {s}")))
    }
}

/// Number of calls recorded for one function.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FunctionCount {
    /// Function name
    pub function: String,
    /// Number of events emitted from it
    pub count: u64,
}

/// Aggregate counts derived from the store.
///
/// Always recomputed; `total_count` is the sum of `per_level` by construction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Statistics {
    /// Total number of events
    pub total_count: u64,
    /// Count per level; every level is present, zero if unused
    pub per_level: BTreeMap<LogLevel, u64>,
    /// Most frequent functions, by count descending
    pub top_functions: Vec<FunctionCount>,
}

impl Statistics {
    /// Builds statistics from per-level counts, deriving the total.
    #[must_use]
    pub fn from_counts(
        level_counts: impl IntoIterator<Item = (LogLevel, u64)>,
        top_functions: Vec<FunctionCount>,
    ) -> Self {
        let mut per_level: BTreeMap<LogLevel, u64> =
            LogLevel::ALL.into_iter().map(|l| (l, 0)).collect();
        for (level, count) in level_counts {
            *per_level.entry(level).or_insert(0) += count;
        }
        let total_count = per_level.values().sum();
        Self {
            total_count,
            per_level,
            top_functions,
        }
    }

    /// Statistics of an empty store.
    #[must_use]
    pub fn empty() -> Self {
        Self::from_counts([], Vec::new())
    }

    /// Count for a single level.
    #[must_use]
    pub fn count_for(&self, level: LogLevel) -> u64 {
        self.per_level.get(&level).copied().unwrap_or(0)
    }
}

/// One page of a paginated fetch.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Page {
    /// Events on this page, newest first
    pub events: Vec<LogEvent>,
    /// Offset the page starts at
    pub offset: usize,
    /// Whether at least one more matching event exists past this page
    pub has_more: bool,
}

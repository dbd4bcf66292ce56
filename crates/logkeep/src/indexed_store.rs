//! Indexed event storage on SQLite.
//!
//! This module provides:
//! - [`IndexedEventStore`] — durable, indexed store answering filtered,
//!   paginated and aggregate queries
//! - [`PruneReport`] — what a retention pass removed
//!
//! The database runs in WAL mode: one writer connection serializes inserts
//! while a small pool of reader connections serves queries in parallel.
//! Rows are ordered newest first by `(timestamp DESC, id DESC)`, so events
//! sharing a timestamp come back in reverse insertion order.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, Connection, OpenFlags, Row};
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::cache::ConcurrentCache;
use crate::config::EngineConfig;
use crate::error::{LogError, Result};
use crate::schema::{self, Schema, SchemaRequest};
use crate::traits::{check_search, search_fields, EventStore, ExportOutcome, QueryLimits};
use crate::types::{
    now_secs, DistinctField, FunctionCount, LogEvent, LogFilter, LogLevel, SearchField, SessionId,
    Statistics,
};

const COLUMNS: &str =
    "timestamp, level, message, file, function, line, context, thread, session_id";

const INSERT_SQL: &str = "INSERT INTO log_events \
     (timestamp, level, message, file, function, line, context, thread, session_id) \
     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)";

const ORDER_NEWEST_FIRST: &str = " ORDER BY timestamp DESC, id DESC";

/// Rows deleted per statement when shrinking the store to its size cap.
const PRUNE_CHUNK: i64 = 500;

/// Idle reader connections kept for reuse.
const MAX_IDLE_READERS: usize = 4;

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

const SECS_PER_DAY: f64 = 86_400.0;

/// Rows removed by one [`IndexedEventStore::prune`] pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PruneReport {
    /// Rows older than the retention window
    pub expired: usize,
    /// Oldest rows removed to fit the size cap
    pub evicted: usize,
}

impl PruneReport {
    /// Total rows removed.
    #[must_use]
    pub const fn total(&self) -> usize {
        self.expired + self.evicted
    }
}

#[derive(Debug, Clone, Copy)]
struct Retention {
    max_store_bytes: u64,
    retention_days: u32,
    prune_interval: u64,
}

/// Indexed, durable event store.
pub struct IndexedEventStore {
    path: PathBuf,
    schema_version: u32,
    writer: Mutex<Connection>,
    readers: Mutex<Vec<Connection>>,
    limits: QueryLimits,
    retention: Retention,
    inserts_since_prune: AtomicU64,
    distinct: ConcurrentCache<DistinctField, Arc<Vec<String>>>,
    /// Bumped by every write that may change distinct values; guards cache fills.
    distinct_epoch: Mutex<u64>,
}

impl std::fmt::Debug for IndexedEventStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IndexedEventStore")
            .field("path", &self.path)
            .field("schema_version", &self.schema_version)
            .field("limits", &self.limits)
            .finish_non_exhaustive()
    }
}

impl IndexedEventStore {
    /// Opens (creating if needed) the database named by `config`.
    ///
    /// Resolves the schema, migrates an older database, and runs one
    /// retention pass.
    ///
    /// # Errors
    ///
    /// Returns [`LogError::Config`] for an invalid config,
    /// [`LogError::SchemaNotFound`] if no schema matches the requested
    /// version, [`LogError::SchemaMismatch`] if the database was written by a
    /// newer schema, or a storage error.
    pub fn open(config: &EngineConfig) -> Result<Self> {
        config.validate()?;
        fs::create_dir_all(&config.directory)?;

        let mut request = SchemaRequest::new(config.schema_version);
        request.override_dir.clone_from(&config.schema_dir);
        let schema = schema::init(&request)?;

        let path = config.database_path();
        let mut writer = Connection::open(&path)?;
        configure(&writer)?;
        migrate(&mut writer, &schema)?;

        let store = Self {
            path,
            schema_version: schema.version,
            writer: Mutex::new(writer),
            readers: Mutex::new(Vec::new()),
            limits: config.query_limits(),
            retention: Retention {
                max_store_bytes: config.max_store_bytes,
                retention_days: config.retention_days,
                prune_interval: config.prune_interval,
            },
            inserts_since_prune: AtomicU64::new(0),
            distinct: ConcurrentCache::new(),
            distinct_epoch: Mutex::new(0),
        };
        info!(
            path = %store.path.display(),
            schema_version = store.schema_version,
            "opened indexed event store"
        );

        if let Err(e) = store.prune() {
            warn!(error = %e, "initial prune of event store failed");
        }
        Ok(store)
    }

    /// Path of the database file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Schema version of the open database.
    #[must_use]
    pub const fn schema_version(&self) -> u32 {
        self.schema_version
    }

    /// Bytes occupied by live pages (excluding the free list).
    ///
    /// # Errors
    ///
    /// Returns a storage error.
    pub fn live_bytes(&self) -> Result<u64> {
        live_bytes(&self.writer.lock())
    }

    /// Deletes rows older than the retention window, then the oldest rows
    /// until the live size fits the size cap.
    ///
    /// # Errors
    ///
    /// Returns a storage error; rows deleted before the failure stay deleted.
    pub fn prune(&self) -> Result<PruneReport> {
        let mut report = PruneReport::default();
        {
            let conn = self.writer.lock();

            if self.retention.retention_days > 0 {
                let cutoff = now_secs() - f64::from(self.retention.retention_days) * SECS_PER_DAY;
                report.expired = conn.execute(
                    "DELETE FROM log_events WHERE timestamp < ?1",
                    params![cutoff],
                )?;
            }

            let cap = self.retention.max_store_bytes;
            if cap > 0 {
                let mut live = live_bytes(&conn)?;
                while live > cap {
                    let deleted = conn.execute(
                        "DELETE FROM log_events WHERE id IN \
                         (SELECT id FROM log_events ORDER BY timestamp ASC, id ASC LIMIT ?1)",
                        params![PRUNE_CHUNK],
                    )?;
                    if deleted == 0 {
                        break;
                    }
                    report.evicted += deleted;

                    let after = live_bytes(&conn)?;
                    if after >= live {
                        warn!(
                            live = after,
                            cap,
                            "event store stopped shrinking; size cap not reached"
                        );
                        break;
                    }
                    live = after;
                }
            }
        }

        if report.total() > 0 {
            self.invalidate_all_distinct();
            debug!(expired = report.expired, evicted = report.evicted, "pruned event store");
        }
        Ok(report)
    }

    /// Runs `f` on a pooled reader connection.
    fn with_reader<T>(&self, f: impl FnOnce(&Connection) -> Result<T>) -> Result<T> {
        let idle = self.readers.lock().pop();
        let conn = match idle {
            Some(conn) => conn,
            None => open_reader(&self.path)?,
        };
        let result = f(&conn);
        let mut idle = self.readers.lock();
        if idle.len() < MAX_IDLE_READERS {
            idle.push(conn);
        }
        result
    }

    fn after_insert(&self, events: &[LogEvent]) {
        self.invalidate_distinct(events);

        let interval = self.retention.prune_interval;
        if interval == 0 {
            return;
        }
        let added = events.len() as u64;
        let pending = self.inserts_since_prune.fetch_add(added, Ordering::Relaxed) + added;
        if pending >= interval {
            self.inserts_since_prune.store(0, Ordering::Relaxed);
            if let Err(e) = self.prune() {
                warn!(error = %e, "opportunistic prune of event store failed");
            }
        }
    }

    /// Evicts memoized distinct values that `events` add to.
    fn invalidate_distinct(&self, events: &[LogEvent]) {
        let mut epoch = self.distinct_epoch.lock();
        *epoch += 1;
        for field in DistinctField::ALL {
            let Some(known) = self.distinct.get(&field) else {
                continue;
            };
            let adds_value = events.iter().any(|event| {
                let value = event.field(field);
                !value.is_empty() && known.binary_search_by(|v| v.as_str().cmp(value)).is_err()
            });
            if adds_value {
                self.distinct.remove(&field);
            }
        }
    }

    fn invalidate_all_distinct(&self) {
        let mut epoch = self.distinct_epoch.lock();
        *epoch += 1;
        self.distinct.clear();
    }
}

// ===== Trait Implementations =====

impl EventStore for IndexedEventStore {
    fn name(&self) -> &'static str {
        "indexed"
    }

    fn limits(&self) -> &QueryLimits {
        &self.limits
    }

    fn insert(&self, event: &LogEvent) -> Result<()> {
        self.insert_batch(std::slice::from_ref(event))
    }

    fn insert_batch(&self, events: &[LogEvent]) -> Result<()> {
        if events.is_empty() {
            return Ok(());
        }
        {
            let mut conn = self.writer.lock();
            let tx = conn.transaction()?;
            {
                let mut stmt = tx.prepare_cached(INSERT_SQL)?;
                for event in events {
                    stmt.execute(params![
                        event.timestamp,
                        event.level.code(),
                        event.message,
                        event.file,
                        event.function,
                        event.line,
                        event.context,
                        event.thread,
                        event.session_id.as_str(),
                    ])?;
                }
            }
            tx.commit()?;
        }
        self.after_insert(events);
        Ok(())
    }

    fn fetch(&self, filter: &LogFilter, offset: usize, limit: usize) -> Result<Vec<LogEvent>> {
        filter.validate(self.limits.min_keyword_len)?;
        if limit == 0 {
            return Ok(Vec::new());
        }
        self.with_reader(|conn| fetch_with(conn, filter, offset, limit))
    }

    fn count(&self, filter: &LogFilter) -> Result<u64> {
        filter.validate(self.limits.min_keyword_len)?;
        let conditions = Conditions::from_filter(filter);
        let sql = format!("SELECT COUNT(*) FROM log_events{}", conditions.where_sql());
        self.with_reader(|conn| {
            let mut stmt = conn.prepare_cached(&sql)?;
            let count: i64 =
                stmt.query_row(params_from_iter(conditions.params.iter()), |row| row.get(0))?;
            Ok(to_u64(count))
        })
    }

    fn statistics(&self) -> Result<Statistics> {
        let top_n = to_i64(self.limits.top_functions);
        self.with_reader(|conn| {
            // One snapshot for both aggregates.
            let tx = conn.unchecked_transaction()?;

            let levels = {
                let mut stmt =
                    tx.prepare_cached("SELECT level, COUNT(*) FROM log_events GROUP BY level")?;
                let rows = stmt.query_map([], |row| {
                    let level = level_from_code(row.get(0)?)?;
                    Ok((level, to_u64(row.get(1)?)))
                })?;
                rows.collect::<rusqlite::Result<Vec<_>>>()?
            };

            let top_functions = {
                let mut stmt = tx.prepare_cached(
                    "SELECT function, COUNT(*) AS calls FROM log_events WHERE function <> '' \
                     GROUP BY function ORDER BY calls DESC, function ASC LIMIT ?1",
                )?;
                let rows = stmt.query_map(params![top_n], |row| {
                    Ok(FunctionCount {
                        function: row.get(0)?,
                        count: to_u64(row.get(1)?),
                    })
                })?;
                rows.collect::<rusqlite::Result<Vec<_>>>()?
            };

            tx.finish()?;
            Ok(Statistics::from_counts(levels, top_functions))
        })
    }

    fn distinct_values(&self, field: DistinctField) -> Result<Vec<String>> {
        if let Some(values) = self.distinct.get(&field) {
            return Ok(values.as_ref().clone());
        }

        let epoch = *self.distinct_epoch.lock();
        let column = field.column();
        let sql = format!(
            "SELECT DISTINCT {column} FROM log_events WHERE {column} <> '' ORDER BY {column}"
        );
        let values = self.with_reader(|conn| {
            let mut stmt = conn.prepare_cached(&sql)?;
            let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;
            Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
        })?;

        let current = self.distinct_epoch.lock();
        if *current == epoch {
            self.distinct.set(field, Arc::new(values.clone()));
        }
        Ok(values)
    }

    fn search(
        &self,
        session_ids: &[SessionId],
        keyword: &str,
        fields: &[SearchField],
        limit: usize,
    ) -> Result<Vec<LogEvent>> {
        let keyword = check_search(keyword, &self.limits)?;
        if limit == 0 {
            return Ok(Vec::new());
        }

        let mut conditions = Conditions::default();
        conditions.any_of(
            "session_id",
            session_ids.iter().map(|s| Value::Text(s.as_str().to_string())),
        );
        let columns: Vec<&str> = search_fields(fields)
            .into_iter()
            .map(SearchField::column)
            .collect();
        conditions.like(&columns, &keyword);
        conditions.params.push(Value::Integer(to_i64(limit)));

        let sql = format!(
            "SELECT {COLUMNS} FROM log_events{}{ORDER_NEWEST_FIRST} LIMIT ?",
            conditions.where_sql()
        );
        self.with_reader(|conn| query_events(conn, &sql, &conditions.params))
    }

    fn enforce_retention(&self) -> Result<usize> {
        Ok(self.prune()?.total())
    }

    fn export(&self, filter: &LogFilter, cancel: &CancellationToken) -> Result<ExportOutcome> {
        filter.validate(self.limits.min_keyword_len)?;
        let batch = self.limits.export_batch_size.max(1);
        let ceiling = self.limits.fetch_all_ceiling;

        self.with_reader(|conn| {
            // Every batch reads the same snapshot.
            let tx = conn.unchecked_transaction()?;
            let mut events = Vec::new();
            let mut cursor = None;
            let outcome = loop {
                if cancel.is_cancelled() {
                    debug!(fetched = events.len(), "export cancelled");
                    break ExportOutcome::Cancelled {
                        fetched: events.len(),
                    };
                }
                let remaining = ceiling.saturating_sub(events.len());
                let chunk = fetch_after(&tx, filter, cursor, batch.min(remaining))?;
                let done = chunk.len() < batch || chunk.len() >= remaining;
                if let Some((id, last)) = chunk.last() {
                    cursor = Some((last.timestamp, *id));
                }
                events.extend(chunk.into_iter().map(|(_, event)| event));
                if done {
                    break ExportOutcome::Completed { events };
                }
            };
            tx.finish()?;
            Ok(outcome)
        })
    }
}

// ===== SQL Helpers =====

/// WHERE-clause fragments with their bound parameters.
#[derive(Debug, Default)]
struct Conditions {
    clauses: Vec<String>,
    params: Vec<Value>,
}

impl Conditions {
    fn from_filter(filter: &LogFilter) -> Self {
        let mut conditions = Self::default();
        conditions.any_of(
            "level",
            filter.levels.iter().map(|l| Value::Integer(i64::from(l.code()))),
        );
        conditions.any_of("function", filter.functions.iter().cloned().map(Value::Text));
        conditions.any_of("file", filter.files.iter().cloned().map(Value::Text));
        conditions.any_of("context", filter.contexts.iter().cloned().map(Value::Text));
        conditions.any_of("thread", filter.threads.iter().cloned().map(Value::Text));
        conditions.any_of(
            "session_id",
            filter.session_ids.iter().map(|s| Value::Text(s.as_str().to_string())),
        );
        for keyword in filter.keywords() {
            conditions.like(&["message"], keyword);
        }
        if let Some(start) = filter.time_range.start_secs() {
            conditions.clauses.push("timestamp >= ?".to_string());
            conditions.params.push(Value::Real(start));
        }
        if let Some(end) = filter.time_range.end_secs() {
            conditions.clauses.push("timestamp < ?".to_string());
            conditions.params.push(Value::Real(end));
        }
        conditions
    }

    /// `column IN (...)`; an empty set adds no restriction.
    fn any_of(&mut self, column: &str, values: impl IntoIterator<Item = Value>) {
        let values: Vec<Value> = values.into_iter().collect();
        if values.is_empty() {
            return;
        }
        let placeholders = vec!["?"; values.len()].join(", ");
        self.clauses.push(format!("{column} IN ({placeholders})"));
        self.params.extend(values);
    }

    /// Literal substring match of `keyword` in any of `columns`.
    fn like(&mut self, columns: &[&str], keyword: &str) {
        let pattern = format!("%{}%", escape_like(keyword));
        let parts: Vec<String> = columns
            .iter()
            .map(|column| format!("{column} LIKE ? ESCAPE '\\'"))
            .collect();
        self.clauses.push(format!("({})", parts.join(" OR ")));
        self.params
            .extend(columns.iter().map(|_| Value::Text(pattern.clone())));
    }

    fn where_sql(&self) -> String {
        if self.clauses.is_empty() {
            String::new()
        } else {
            format!(" WHERE {}", self.clauses.join(" AND "))
        }
    }
}

/// Escapes LIKE wildcards so `keyword` matches literally under `ESCAPE '\'`.
fn escape_like(keyword: &str) -> String {
    let mut escaped = String::with_capacity(keyword.len());
    for c in keyword.chars() {
        if matches!(c, '\\' | '%' | '_') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

fn fetch_with(
    conn: &Connection,
    filter: &LogFilter,
    offset: usize,
    limit: usize,
) -> Result<Vec<LogEvent>> {
    if limit == 0 {
        return Ok(Vec::new());
    }
    let mut conditions = Conditions::from_filter(filter);
    conditions.params.push(Value::Integer(to_i64(limit)));
    conditions.params.push(Value::Integer(to_i64(offset)));
    let sql = format!(
        "SELECT {COLUMNS} FROM log_events{}{ORDER_NEWEST_FIRST} LIMIT ? OFFSET ?",
        conditions.where_sql()
    );
    query_events(conn, &sql, &conditions.params)
}

/// Up to `limit` matching rows strictly after the `(timestamp, id)` cursor in
/// newest-first order, each paired with its row id.
fn fetch_after(
    conn: &Connection,
    filter: &LogFilter,
    cursor: Option<(f64, i64)>,
    limit: usize,
) -> Result<Vec<(i64, LogEvent)>> {
    if limit == 0 {
        return Ok(Vec::new());
    }
    let mut conditions = Conditions::from_filter(filter);
    if let Some((timestamp, id)) = cursor {
        conditions.clauses.push("(timestamp, id) < (?, ?)".to_string());
        conditions.params.push(Value::Real(timestamp));
        conditions.params.push(Value::Integer(id));
    }
    conditions.params.push(Value::Integer(to_i64(limit)));
    let sql = format!(
        "SELECT {COLUMNS}, id FROM log_events{}{ORDER_NEWEST_FIRST} LIMIT ?",
        conditions.where_sql()
    );

    let mut stmt = conn.prepare_cached(&sql)?;
    let rows = stmt.query_map(params_from_iter(conditions.params.iter()), |row| {
        Ok((row.get(9)?, event_from_row(row)?))
    })?;
    let events = rows.collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(events)
}

fn query_events(conn: &Connection, sql: &str, params: &[Value]) -> Result<Vec<LogEvent>> {
    let mut stmt = conn.prepare_cached(sql)?;
    let rows = stmt.query_map(params_from_iter(params.iter()), event_from_row)?;
    let events = rows.collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(events)
}

fn event_from_row(row: &Row<'_>) -> rusqlite::Result<LogEvent> {
    Ok(LogEvent {
        timestamp: row.get(0)?,
        level: level_from_code(row.get(1)?)?,
        message: row.get(2)?,
        file: row.get(3)?,
        function: row.get(4)?,
        line: row.get(5)?,
        context: row.get(6)?,
        thread: row.get(7)?,
        session_id: SessionId(row.get(8)?),
    })
}

fn level_from_code(code: i64) -> rusqlite::Result<LogLevel> {
    u8::try_from(code)
        .ok()
        .and_then(|c| LogLevel::try_from(c).ok())
        .ok_or(rusqlite::Error::IntegralValueOutOfRange(1, code))
}

fn to_i64(n: usize) -> i64 {
    i64::try_from(n).unwrap_or(i64::MAX)
}

fn to_u64(n: i64) -> u64 {
    u64::try_from(n).unwrap_or(0)
}

// ===== Connection Setup =====

fn configure(conn: &Connection) -> Result<()> {
    conn.busy_timeout(BUSY_TIMEOUT)?;
    let mode: String = conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get(0))?;
    if !mode.eq_ignore_ascii_case("wal") {
        warn!(journal_mode = %mode, "event store is not in WAL mode; readers may block on writes");
    }
    conn.pragma_update(None, "synchronous", "NORMAL")?;
    Ok(())
}

fn open_reader(path: &Path) -> Result<Connection> {
    let conn = Connection::open_with_flags(
        path,
        OpenFlags::SQLITE_OPEN_READ_WRITE
            | OpenFlags::SQLITE_OPEN_NO_MUTEX
            | OpenFlags::SQLITE_OPEN_URI,
    )?;
    conn.busy_timeout(BUSY_TIMEOUT)?;
    conn.pragma_update(None, "query_only", true)?;
    Ok(conn)
}

fn migrate(conn: &mut Connection, schema: &Schema) -> Result<()> {
    let found: u32 = conn.pragma_query_value(None, "user_version", |row| row.get(0))?;
    if found > schema.version {
        return Err(LogError::SchemaMismatch {
            found,
            supported: schema.version,
        });
    }
    if found == schema.version {
        return Ok(());
    }

    let tx = conn.transaction()?;
    tx.execute_batch(&schema.sql)?;
    tx.pragma_update(None, "user_version", schema.version)?;
    tx.commit()?;
    info!(
        from = found,
        to = schema.version,
        source = %schema.source,
        "migrated event store schema"
    );
    Ok(())
}

fn live_bytes(conn: &Connection) -> Result<u64> {
    let pragma = |name: &str| -> Result<u64> {
        let value: i64 = conn.pragma_query_value(None, name, |row| row.get(0))?;
        Ok(to_u64(value))
    };
    let pages = pragma("page_count")?.saturating_sub(pragma("freelist_count")?);
    Ok(pages.saturating_mul(pragma("page_size")?))
}

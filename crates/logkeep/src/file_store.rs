//! File-based event storage with rotation support.
//!
//! This module provides:
//! - [`FileEventStore`] — append-only JSON-lines containers
//! - Container selection through [`SelectionManager`] before every write
//! - Count-based retention through [`RotationManager`]
//! - Implementation of [`EventStore`]
//!
//! Queries scan containers newest first and read each one back to front, so
//! results come out in reverse insertion order without sorting.

use std::collections::{BTreeSet, HashMap};
use std::fs::{self, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::ops::ControlFlow;
use std::path::Path;
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::{info, warn};

use crate::config::EngineConfig;
use crate::container::Container;
use crate::error::Result;
use crate::rotation::RotationManager;
use crate::selection::SelectionManager;
use crate::traits::{check_search, search_fields, EventStore, QueryLimits};
use crate::types::{
    DistinctField, FunctionCount, LogEvent, LogFilter, SearchField, SessionId, Statistics,
};

/// File-based event storage with rotation.
///
/// Writers are serialized by an internal lock; readers share it, so a query
/// never sees a container mid-rename.
pub struct FileEventStore {
    selection: SelectionManager,
    rotation: Arc<RotationManager>,
    limits: QueryLimits,
    io: RwLock<()>,
}

impl std::fmt::Debug for FileEventStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileEventStore")
            .field("directory", &self.rotation.directory())
            .field("generation", &self.selection.generation())
            .field("rotation", &self.rotation.policy())
            .finish_non_exhaustive()
    }
}

impl FileEventStore {
    /// Opens the container directory named by `config`.
    ///
    /// No container is created until the first write.
    ///
    /// # Errors
    ///
    /// Returns an error if the config is invalid or the directory cannot be
    /// created.
    pub fn open(config: &EngineConfig) -> Result<Self> {
        config.validate()?;
        fs::create_dir_all(&config.directory)?;

        let rotation = Arc::new(RotationManager::from_config(config));
        let selection = SelectionManager::new(config.generation, Arc::clone(&rotation));
        info!(
            dir = %config.directory.display(),
            generation = ?config.generation,
            rotation = ?config.rotation,
            "opened file event store"
        );

        Ok(Self {
            selection,
            rotation,
            limits: config.query_limits(),
            io: RwLock::new(()),
        })
    }

    /// The rotation manager for this store's directory.
    #[must_use]
    pub fn rotation(&self) -> &RotationManager {
        &self.rotation
    }

    /// Containers on disk, newest first.
    #[must_use]
    pub fn containers(&self) -> Vec<Container> {
        let _guard = self.io.read();
        self.rotation.containers()
    }

    /// Seals the current container now, regardless of policy.
    ///
    /// Returns the sealed container, or `None` if nothing was open.
    pub fn rotate_now(&self) -> Option<Container> {
        let _guard = self.io.write();
        self.selection.rotate_current()
    }

    /// Appends encoded lines to the current container, recreating it once if
    /// the write fails.
    fn append(&self, lines: &[u8]) -> Result<()> {
        let container = self.selection.current_container()?;
        if let Err(e) = append_to(container.path(), lines) {
            warn!(
                path = %container.path().display(),
                error = %e,
                "failed to append to log container, recreating"
            );
            self.selection.reset();
            fs::create_dir_all(self.rotation.directory())?;
            let container = self.selection.current_container()?;
            append_to(container.path(), lines)?;
        }
        Ok(())
    }

    /// Visits stored events newest first until `visit` breaks.
    fn scan(&self, mut visit: impl FnMut(LogEvent) -> ControlFlow<()>) -> Result<()> {
        let _guard = self.io.read();
        for container in self.rotation.containers() {
            let raw = match fs::read(container.path()) {
                Ok(raw) => raw,
                Err(e) if e.kind() == io::ErrorKind::NotFound => continue,
                Err(e) => return Err(e.into()),
            };
            let lines = raw
                .split(|b| *b == b'\n')
                .rev()
                .filter(|l| !l.iter().all(u8::is_ascii_whitespace));
            for line in lines {
                let event = match serde_json::from_slice::<LogEvent>(line) {
                    Ok(event) => event,
                    Err(e) => {
                        warn!(
                            path = %container.path().display(),
                            error = %e,
                            "skipping unreadable log record"
                        );
                        continue;
                    }
                };
                if visit(event).is_break() {
                    return Ok(());
                }
            }
        }
        Ok(())
    }
}

fn append_to(path: &Path, lines: &[u8]) -> io::Result<()> {
    let file = OpenOptions::new().append(true).open(path)?;
    let mut writer = BufWriter::new(file);
    writer.write_all(lines)?;
    writer.flush()
}

fn encode(events: &[LogEvent]) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    for event in events {
        serde_json::to_writer(&mut buf, event)?;
        buf.push(b'\n');
    }
    Ok(buf)
}

// ===== Trait Implementations =====

impl EventStore for FileEventStore {
    fn name(&self) -> &'static str {
        "file"
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
        let lines = encode(events)?;
        let _guard = self.io.write();
        self.append(&lines)
    }

    fn fetch(&self, filter: &LogFilter, offset: usize, limit: usize) -> Result<Vec<LogEvent>> {
        filter.validate(self.limits.min_keyword_len)?;
        let mut events = Vec::new();
        if limit == 0 {
            return Ok(events);
        }

        let mut skipped = 0;
        self.scan(|event| {
            if !event.matches(filter) {
                return ControlFlow::Continue(());
            }
            if skipped < offset {
                skipped += 1;
                return ControlFlow::Continue(());
            }
            events.push(event);
            if events.len() >= limit {
                ControlFlow::Break(())
            } else {
                ControlFlow::Continue(())
            }
        })?;
        Ok(events)
    }

    fn count(&self, filter: &LogFilter) -> Result<u64> {
        filter.validate(self.limits.min_keyword_len)?;
        let mut count = 0u64;
        self.scan(|event| {
            if event.matches(filter) {
                count += 1;
            }
            ControlFlow::Continue(())
        })?;
        Ok(count)
    }

    fn statistics(&self) -> Result<Statistics> {
        let mut levels = HashMap::new();
        let mut functions: HashMap<String, u64> = HashMap::new();
        self.scan(|event| {
            *levels.entry(event.level).or_insert(0u64) += 1;
            if !event.function.is_empty() {
                *functions.entry(event.function).or_insert(0) += 1;
            }
            ControlFlow::Continue(())
        })?;

        let mut top: Vec<FunctionCount> = functions
            .into_iter()
            .map(|(function, count)| FunctionCount { function, count })
            .collect();
        top.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.function.cmp(&b.function)));
        top.truncate(self.limits.top_functions);

        Ok(Statistics::from_counts(levels, top))
    }

    fn distinct_values(&self, field: DistinctField) -> Result<Vec<String>> {
        let mut values = BTreeSet::new();
        self.scan(|event| {
            let value = event.field(field);
            if !value.is_empty() && !values.contains(value) {
                values.insert(value.to_string());
            }
            ControlFlow::Continue(())
        })?;
        Ok(values.into_iter().collect())
    }

    fn search(
        &self,
        session_ids: &[SessionId],
        keyword: &str,
        fields: &[SearchField],
        limit: usize,
    ) -> Result<Vec<LogEvent>> {
        let needle = check_search(keyword, &self.limits)?.to_lowercase();
        let fields = search_fields(fields);
        let mut events = Vec::new();
        if limit == 0 {
            return Ok(events);
        }

        self.scan(|event| {
            let in_session = session_ids.is_empty() || session_ids.contains(&event.session_id);
            let hit = in_session
                && fields
                    .iter()
                    .any(|f| event.search_field(*f).to_lowercase().contains(&needle));
            if hit {
                events.push(event);
                if events.len() >= limit {
                    return ControlFlow::Break(());
                }
            }
            ControlFlow::Continue(())
        })?;
        Ok(events)
    }

    fn enforce_retention(&self) -> Result<usize> {
        let _guard = self.io.write();
        Ok(self.rotation.cleanup())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Backend;
    use crate::error::LogError;
    use crate::policy::{GenerationPolicy, RotationPolicy};
    use crate::types::LogLevel;
    use tempfile::TempDir;

    fn config(dir: &TempDir) -> EngineConfig {
        EngineConfig::new(dir.path())
            .with_backend(Backend::File)
            .with_generation(GenerationPolicy::ReuseUntilRotation)
            .with_rotation(RotationPolicy::Size {
                max_bytes: 1024 * 1024,
            })
            .with_max_files(0)
    }

    fn event(level: LogLevel, message: &str) -> LogEvent {
        LogEvent::builder()
            .level(level)
            .message(message)
            .location("main.rs", "run", 10)
            .context("app")
            .thread("main")
            .session("s1")
            .build()
            .expect("event")
    }

    // ===========================================
    // Write Path Tests
    // ===========================================

    #[test]
    fn open_does_not_create_containers() {
        let dir = TempDir::new().expect("temp dir");
        let store = FileEventStore::open(&config(&dir)).expect("open");
        assert!(store.containers().is_empty());
    }

    #[test]
    fn insert_appends_json_lines() {
        let dir = TempDir::new().expect("temp dir");
        let store = FileEventStore::open(&config(&dir)).expect("open");

        store.insert(&event(LogLevel::Info, "one")).expect("insert");
        store.insert(&event(LogLevel::Error, "two")).expect("insert");

        let containers = store.containers();
        assert_eq!(containers.len(), 1);
        let raw = fs::read_to_string(containers[0].path()).expect("read");
        let lines: Vec<&str> = raw.lines().collect();
        assert_eq!(lines.len(), 2);
        let first: serde_json::Value = serde_json::from_str(lines[0]).expect("json");
        assert_eq!(first["message"], "one");
        assert_eq!(first["level"], 2);
    }

    #[test]
    fn deleted_container_is_recreated() {
        let dir = TempDir::new().expect("temp dir");
        let store = FileEventStore::open(&config(&dir)).expect("open");
        store.insert(&event(LogLevel::Info, "before")).expect("insert");

        for container in store.containers() {
            fs::remove_file(container.path()).expect("remove");
        }

        store.insert(&event(LogLevel::Info, "after")).expect("insert");
        let all = store.fetch_all(&LogFilter::new()).expect("fetch");
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].message, "after");
    }

    #[test]
    fn size_rotation_keeps_every_event() {
        let dir = TempDir::new().expect("temp dir");
        let config = config(&dir).with_rotation(RotationPolicy::Size { max_bytes: 200 });
        let store = FileEventStore::open(&config).expect("open");

        for i in 0..20 {
            store
                .insert(&event(LogLevel::Info, &format!("message {i}")))
                .expect("insert");
        }

        assert!(store.containers().len() > 1);
        let all = store.fetch_all(&LogFilter::new()).expect("fetch");
        let messages: Vec<String> = all.into_iter().map(|e| e.message).collect();
        let expected: Vec<String> = (0..20).rev().map(|i| format!("message {i}")).collect();
        assert_eq!(messages, expected);
    }

    #[test]
    fn rotate_now_seals_current_container() {
        let dir = TempDir::new().expect("temp dir");
        let store = FileEventStore::open(&config(&dir)).expect("open");
        store.insert(&event(LogLevel::Info, "sealed soon")).expect("insert");

        let sealed = store.rotate_now().expect("rotated");
        assert!(sealed.is_sealed());

        store.insert(&event(LogLevel::Info, "fresh")).expect("insert");
        let containers = store.containers();
        assert_eq!(containers.len(), 2);
        assert_eq!(containers.iter().filter(|c| c.is_sealed()).count(), 1);
    }

    #[test]
    fn enforce_retention_applies_max_files() {
        let dir = TempDir::new().expect("temp dir");
        let store = FileEventStore::open(&config(&dir).with_max_files(2)).expect("open");
        for i in 0..4 {
            store.insert(&event(LogLevel::Info, &format!("m{i}"))).expect("insert");
            store.rotate_now();
        }
        store.enforce_retention().expect("retention");
        assert!(store.containers().len() <= 2);
    }

    // ===========================================
    // Query Tests
    // ===========================================

    #[test]
    fn empty_store_queries() {
        let dir = TempDir::new().expect("temp dir");
        let store = FileEventStore::open(&config(&dir)).expect("open");
        assert!(store.fetch(&LogFilter::new(), 0, 10).expect("fetch").is_empty());
        assert_eq!(store.count(&LogFilter::new()).expect("count"), 0);
        assert_eq!(store.statistics().expect("stats"), Statistics::empty());
    }

    #[test]
    fn fetch_filters_and_pages() {
        let dir = TempDir::new().expect("temp dir");
        let store = FileEventStore::open(&config(&dir)).expect("open");
        for i in 0..10 {
            let level = if i % 2 == 0 { LogLevel::Info } else { LogLevel::Error };
            store.insert(&event(level, &format!("m{i}"))).expect("insert");
        }

        let errors = LogFilter::new().with_level(LogLevel::Error);
        assert_eq!(store.count(&errors).expect("count"), 5);

        let page = store.fetch(&errors, 1, 2).expect("fetch");
        let messages: Vec<&str> = page.iter().map(|e| e.message.as_str()).collect();
        assert_eq!(messages, vec!["m7", "m5"]);

        assert!(store.fetch(&errors, 5, 10).expect("fetch").is_empty());
    }

    #[test]
    fn unreadable_lines_are_skipped() {
        let dir = TempDir::new().expect("temp dir");
        let store = FileEventStore::open(&config(&dir)).expect("open");
        store.insert(&event(LogLevel::Info, "good")).expect("insert");

        let path = store.containers()[0].path().to_path_buf();
        let mut file = OpenOptions::new().append(true).open(&path).expect("open");
        file.write_all(b"{\"timestamp\": 1.0, \"lev").expect("write");

        assert_eq!(store.count(&LogFilter::new()).expect("count"), 1);
    }

    #[test]
    fn unknown_fields_are_ignored() {
        let dir = TempDir::new().expect("temp dir");
        let store = FileEventStore::open(&config(&dir)).expect("open");
        store.insert(&event(LogLevel::Info, "seed")).expect("insert");

        let path = store.containers()[0].path().to_path_buf();
        let mut file = OpenOptions::new().append(true).open(&path).expect("open");
        let record = br#"{"timestamp":2.5,"level":3,"message":"newer writer","extra":true}"#;
        file.write_all(record).expect("write");
        file.write_all(b"\n").expect("write");

        let all = store.fetch_all(&LogFilter::new()).expect("fetch");
        assert_eq!(all[0].message, "newer writer");
        assert_eq!(all[0].level, LogLevel::Warning);
    }

    #[test]
    fn statistics_and_distinct_values() {
        let dir = TempDir::new().expect("temp dir");
        let store = FileEventStore::open(&config(&dir)).expect("open");
        let a = LogEvent::builder()
            .level(LogLevel::Info)
            .message("a")
            .function("alpha")
            .build()
            .expect("event");
        let b = LogEvent::builder()
            .level(LogLevel::Error)
            .message("b")
            .function("beta")
            .build()
            .expect("event");
        store.insert_batch(&[a.clone(), a, b]).expect("insert");

        let stats = store.statistics().expect("stats");
        assert_eq!(stats.total_count, 3);
        assert_eq!(stats.count_for(LogLevel::Info), 2);
        assert_eq!(stats.top_functions[0].function, "alpha");
        assert_eq!(stats.top_functions[0].count, 2);

        let functions = store.distinct_values(DistinctField::Function).expect("distinct");
        assert_eq!(functions, vec!["alpha".to_string(), "beta".to_string()]);
    }

    #[test]
    fn search_is_literal() {
        let dir = TempDir::new().expect("temp dir");
        let store = FileEventStore::open(&config(&dir)).expect("open");
        store.insert(&event(LogLevel::Info, "100% done_now")).expect("insert");
        store.insert(&event(LogLevel::Info, "1000 done")).expect("insert");

        let hits = store.search(&[], "0% d", &[], 10).expect("search");
        assert_eq!(hits.len(), 1);
        let hits = store.search(&[], "e_n", &[], 10).expect("search");
        assert_eq!(hits.len(), 1);

        assert!(matches!(
            store.search(&[], "%", &[], 10),
            Err(LogError::InvalidFilter(_))
        ));
    }

    #[test]
    fn search_restricts_sessions_and_fields() {
        let dir = TempDir::new().expect("temp dir");
        let store = FileEventStore::open(&config(&dir)).expect("open");
        store.insert(&event(LogLevel::Info, "hello")).expect("insert");

        let other = [SessionId::from("s2")];
        assert!(store.search(&other, "hello", &[], 10).expect("search").is_empty());
        assert!(store
            .search(&[], "main.rs", &[], 10)
            .expect("search")
            .is_empty());
        assert_eq!(
            store
                .search(&[], "main.rs", &[SearchField::File], 10)
                .expect("search")
                .len(),
            1
        );
    }
}

//! Integration tests for query behaviour shared by both backends.

use std::fs::OpenOptions;
use std::io::Write;
use std::sync::Arc;

use logkeep::{
    Backend, EngineConfig, EventStore, FileEventStore, GenerationPolicy, IndexedEventStore,
    LogEvent, LogFilter, LogLevel, RotationPolicy,
};
use proptest::prelude::*;
use tempfile::TempDir;

fn indexed_config(dir: &TempDir) -> EngineConfig {
    EngineConfig::new(dir.path())
        .with_backend(Backend::Indexed)
        .with_retention_days(0)
        .with_max_store_bytes(0)
}

fn file_config(dir: &TempDir) -> EngineConfig {
    EngineConfig::new(dir.path())
        .with_backend(Backend::File)
        .with_generation(GenerationPolicy::ReuseUntilRotation)
        .with_rotation(RotationPolicy::Size { max_bytes: 4096 })
        .with_max_files(0)
}

fn stores(dir_a: &TempDir, dir_b: &TempDir) -> Vec<Arc<dyn EventStore>> {
    vec![
        Arc::new(IndexedEventStore::open(&indexed_config(dir_a)).expect("indexed store")),
        Arc::new(FileEventStore::open(&file_config(dir_b)).expect("file store")),
    ]
}

fn event(i: usize, level: LogLevel) -> LogEvent {
    LogEvent::builder()
        .timestamp(1_700_000_000.0 + i as f64)
        .level(level)
        .message(format!("event number {i}"))
        .location("worker.rs", if i % 3 == 0 { "poll" } else { "drain" }, 7)
        .context("queue")
        .thread("worker")
        .session(if i % 2 == 0 { "even" } else { "odd" })
        .build()
        .expect("event")
}

#[test]
fn test_page_boundary_501_of_500() {
    let (a, b) = (TempDir::new().expect("dir"), TempDir::new().expect("dir"));
    for store in stores(&a, &b) {
        let events: Vec<LogEvent> = (0..501).map(|i| event(i, LogLevel::Info)).collect();
        store.insert_batch(&events).expect("insert");

        let filter = LogFilter::new().with_level(LogLevel::Info);
        let first = store.fetch_page(&filter, 0, 500).expect("first page");
        assert_eq!(first.events.len(), 500, "{}", store.name());
        assert!(first.has_more);

        let second = store.fetch_page(&filter, 500, 500).expect("second page");
        assert_eq!(second.events.len(), 1, "{}", store.name());
        assert!(!second.has_more);
        assert_eq!(second.events[0].message, "event number 0");
    }
}

#[test]
fn test_empty_store() {
    let (a, b) = (TempDir::new().expect("dir"), TempDir::new().expect("dir"));
    for store in stores(&a, &b) {
        assert!(store.fetch(&LogFilter::new(), 0, 100).expect("fetch").is_empty());
        assert_eq!(store.count(&LogFilter::new()).expect("count"), 0);

        let stats = store.statistics().expect("stats");
        assert_eq!(stats.total_count, 0);
        assert_eq!(stats.per_level.len(), LogLevel::ALL.len());
        assert_eq!(stats.per_level.values().sum::<u64>(), 0);
    }
}

#[test]
fn test_search_special_characters() {
    let (a, b) = (TempDir::new().expect("dir"), TempDir::new().expect("dir"));
    let tricky = r#"progress 100% of file_name 'quoted' and "double""#;
    for store in stores(&a, &b) {
        store
            .insert_batch(&[
                LogEvent::new(LogLevel::Info, tricky),
                LogEvent::new(LogLevel::Info, "progress 1000 of fileXname quoted and double"),
            ])
            .expect("insert");

        for keyword in ["100%", "file_name", "'quoted'", "\"double\""] {
            let hits = store.search(&[], keyword, &[], 10).expect("search");
            assert_eq!(hits.len(), 1, "{} / {keyword}", store.name());
            assert_eq!(hits[0].message, tricky);
        }
    }
}

#[test]
fn test_statistics_total_matches_levels() {
    let (a, b) = (TempDir::new().expect("dir"), TempDir::new().expect("dir"));
    for store in stores(&a, &b) {
        let events: Vec<LogEvent> = (0..40)
            .map(|i| event(i, LogLevel::ALL[i % LogLevel::ALL.len()]))
            .collect();
        store.insert_batch(&events).expect("insert");

        let stats = store.statistics().expect("stats");
        assert_eq!(stats.total_count, 40);
        assert_eq!(stats.total_count, stats.per_level.values().sum::<u64>());
        assert!(LogLevel::ALL.iter().all(|l| stats.count_for(*l) == 8));
        assert_eq!(stats.top_functions[0].function, "drain");
    }
}

#[test]
fn test_backends_agree() {
    let (a, b) = (TempDir::new().expect("dir"), TempDir::new().expect("dir"));
    let stores = stores(&a, &b);
    let events: Vec<LogEvent> = (0..120)
        .map(|i| event(i, if i % 4 == 0 { LogLevel::Error } else { LogLevel::Debug }))
        .collect();
    for store in &stores {
        store.insert_batch(&events).expect("insert");
    }

    let filter = LogFilter::new()
        .with_level(LogLevel::Error)
        .with_session("even")
        .with_keyword("number");
    let indexed = stores[0].fetch_all(&filter).expect("indexed");
    let file = stores[1].fetch_all(&filter).expect("file");
    assert_eq!(indexed, file);
    assert_eq!(indexed.len(), 30);
}

#[test]
fn test_file_store_skips_corrupt_bytes() {
    let dir = TempDir::new().expect("dir");
    let store = FileEventStore::open(&file_config(&dir)).expect("file store");
    store
        .insert(&LogEvent::new(LogLevel::Info, "good one"))
        .expect("insert");

    let path = store.containers()[0].path().to_path_buf();
    let mut file = OpenOptions::new().append(true).open(&path).expect("open");
    file.write_all(b"\xff\xfe garbage\n").expect("write");
    drop(file);

    store
        .insert(&LogEvent::new(LogLevel::Info, "good two"))
        .expect("insert");

    assert_eq!(store.count(&LogFilter::new()).expect("count"), 2);
    let messages: Vec<String> = store
        .fetch(&LogFilter::new(), 0, 10)
        .expect("fetch")
        .into_iter()
        .map(|e| e.message)
        .collect();
    assert_eq!(messages, vec!["good two", "good one"]);
    assert_eq!(store.statistics().expect("stats").total_count, 2);
}

fn filter_strategy() -> impl Strategy<Value = LogFilter> {
    (
        prop::option::of(prop::sample::select(LogLevel::ALL.to_vec())),
        prop::option::of(prop::sample::select(vec!["poll", "drain"])),
        prop::option::of(prop::sample::select(vec!["even", "odd"])),
    )
        .prop_map(|(level, function, session)| {
            let mut filter = LogFilter::new();
            if let Some(level) = level {
                filter = filter.with_min_level(level);
            }
            if let Some(function) = function {
                filter = filter.with_function(function);
            }
            if let Some(session) = session {
                filter = filter.with_session(session);
            }
            filter
        })
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(16))]

    #[test]
    fn pages_reconstruct_fetch_all(
        levels in prop::collection::vec(0usize..5, 0..60),
        filter in filter_strategy(),
        page_size in 1usize..17,
    ) {
        let (a, b) = (TempDir::new().expect("dir"), TempDir::new().expect("dir"));
        for store in stores(&a, &b) {
            let events: Vec<LogEvent> = levels
                .iter()
                .enumerate()
                .map(|(i, l)| event(i, LogLevel::ALL[*l]))
                .collect();
            store.insert_batch(&events).expect("insert");

            let all = store.fetch_all(&filter).expect("fetch all");
            prop_assert_eq!(store.count(&filter).expect("count"), all.len() as u64);

            let mut paged = Vec::new();
            let mut offset = 0;
            loop {
                let page = store.fetch(&filter, offset, page_size).expect("page");
                if page.is_empty() {
                    break;
                }
                prop_assert!(page.len() <= page_size);
                offset += page.len();
                paged.extend(page);
            }
            prop_assert_eq!(paged, all);
        }
    }
}

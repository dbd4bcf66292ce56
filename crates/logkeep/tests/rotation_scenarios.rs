//! Integration tests for container rotation, selection and the cache.

use std::fs;
use std::sync::Arc;
use std::thread;

use chrono::{Duration, Local, TimeZone};
use logkeep::{
    list_containers, ConcurrentCache, Container, GenerationPolicy, RotationManager,
    RotationPolicy, SelectionManager,
};
use tempfile::TempDir;

fn today_at(hour: u32) -> chrono::DateTime<Local> {
    let naive = Local::now()
        .date_naive()
        .and_hms_opt(hour, 0, 0)
        .expect("valid time");
    Local
        .from_local_datetime(&naive)
        .earliest()
        .expect("representable local time")
}

#[test]
fn test_rotation_preserves_content() {
    let dir = TempDir::new().expect("temp dir");
    let manager = RotationManager::new(dir.path(), RotationPolicy::Size { max_bytes: 16 }, 0);
    let container = Container::create_in(dir.path(), Local::now()).expect("create");

    let content = b"line one\nline two\nline three\n";
    fs::write(container.path(), content).expect("write");

    let sealed = manager.check_and_rotate(&container).expect("rotated");
    assert_eq!(fs::read(sealed.path()).expect("read sealed"), content);
    assert!(!container.path().exists());
}

#[test]
fn test_cleanup_keeps_max_files_most_recent() {
    let dir = TempDir::new().expect("temp dir");
    let base = Local::now() - Duration::days(30);
    let created: Vec<Container> = (0..10)
        .map(|day| Container::create_in(dir.path(), base + Duration::days(day)).expect("create"))
        .collect();

    let removed = logkeep::cleanup(dir.path(), 3);
    assert_eq!(removed, 7);

    let remaining: Vec<String> = list_containers(dir.path())
        .expect("list")
        .iter()
        .map(Container::name)
        .collect();
    let expected: Vec<String> = created.iter().rev().take(3).map(Container::name).collect();
    assert_eq!(remaining, expected);
}

#[test]
fn test_cleanup_tolerates_missing_files() {
    let dir = TempDir::new().expect("temp dir");
    let base = Local::now() - Duration::days(5);
    for day in 0..4 {
        Container::create_in(dir.path(), base + Duration::days(day)).expect("create");
    }
    let oldest = list_containers(dir.path()).expect("list").pop().expect("oldest");
    fs::remove_file(oldest.path()).expect("remove");

    assert_eq!(logkeep::cleanup(dir.path(), 1), 2);
    assert_eq!(list_containers(dir.path()).expect("list").len(), 1);
}

#[test]
fn test_daily_generation_reuses_today_and_replaces_yesterday() {
    let dir = TempDir::new().expect("temp dir");
    let rotation = Arc::new(RotationManager::new(
        dir.path(),
        RotationPolicy::Size { max_bytes: 1 << 20 },
        0,
    ));
    let yesterday =
        Container::create_in(dir.path(), today_at(12) - Duration::days(1)).expect("yesterday");

    let selection = SelectionManager::new(GenerationPolicy::Daily, Arc::clone(&rotation));
    let fresh = selection.current_container_at(today_at(13)).expect("select");
    assert_ne!(fresh, yesterday);
    assert!(yesterday.path().exists(), "yesterday's container is not rotated away");

    let again = SelectionManager::new(GenerationPolicy::Daily, rotation);
    assert_eq!(again.current_container_at(today_at(14)).expect("select"), fresh);
}

#[test]
fn test_selection_never_returns_container_due_for_rotation() {
    let dir = TempDir::new().expect("temp dir");
    let rotation = Arc::new(RotationManager::new(
        dir.path(),
        RotationPolicy::Size { max_bytes: 10 },
        0,
    ));
    let selection =
        SelectionManager::new(GenerationPolicy::ReuseUntilRotation, Arc::clone(&rotation));

    for _ in 0..5 {
        let current = selection.current_container().expect("select");
        assert!(!rotation.is_due(&current, &Local::now()));
        fs::write(current.path(), b"0123456789ab").expect("fill");
    }
    let sealed = rotation.containers().iter().filter(|c| c.is_sealed()).count();
    assert_eq!(sealed, 4);
}

#[test]
fn test_concurrent_cache_sets_never_mix() {
    let cache: Arc<ConcurrentCache<&str, String>> = Arc::new(ConcurrentCache::new());
    let first = "a".repeat(10_000);
    let second = "b".repeat(10_000);

    let writers: Vec<_> = [first.clone(), second.clone()]
        .into_iter()
        .map(|value| {
            let cache = Arc::clone(&cache);
            thread::spawn(move || cache.set("key", value))
        })
        .collect();
    for writer in writers {
        writer.join().expect("join");
    }

    let stored = cache.get(&"key").expect("value");
    assert!(stored == first || stored == second);
}

#[test]
fn test_cache_clear_during_reads() {
    let cache: Arc<ConcurrentCache<u32, u32>> = Arc::new(ConcurrentCache::new());
    for i in 0..100 {
        cache.set(i, i);
    }

    let reader = {
        let cache = Arc::clone(&cache);
        thread::spawn(move || {
            for i in 0..10_000 {
                if let Some(v) = cache.get(&(i % 100)) {
                    assert_eq!(v, i % 100);
                }
            }
        })
    };
    cache.clear();
    reader.join().expect("reader");

    assert!(cache.is_empty());
}

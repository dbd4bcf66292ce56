//! Traits for event storage backends.
//!
//! This module provides the [`EventStore`] trait for abstracting over the
//! file-backed and indexed stores, plus the types shared by every backend:
//! - [`QueryLimits`] — bounds applied to unpaged fetches and search
//! - [`ExportOutcome`] — result of a cancellable export

use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::error::Result;
use crate::types::{
    check_keyword, DistinctField, LogEvent, LogFilter, Page, SearchField, SessionId, Statistics,
};

/// Bounds a store applies to potentially large reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueryLimits {
    /// Rows fetched per export batch
    pub export_batch_size: usize,
    /// Maximum rows returned by [`EventStore::fetch_all`]
    pub fetch_all_ceiling: usize,
    /// Minimum keyword length for substring search
    pub min_keyword_len: usize,
    /// Number of functions reported by [`EventStore::statistics`]
    pub top_functions: usize,
}

impl Default for QueryLimits {
    fn default() -> Self {
        Self {
            export_batch_size: 1000,
            fetch_all_ceiling: 1_000_000,
            min_keyword_len: 3,
            top_functions: 100,
        }
    }
}

/// Result of [`EventStore::export`].
///
/// Cancellation is an outcome, not an error.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ExportOutcome {
    /// Every matching event, newest first.
    Completed {
        /// Exported events
        events: Vec<LogEvent>,
    },
    /// The export was cancelled between batches.
    Cancelled {
        /// Events fetched before cancellation was observed
        fetched: usize,
    },
}

impl ExportOutcome {
    /// Returns true if the export ran to completion.
    #[must_use]
    pub const fn is_completed(&self) -> bool {
        matches!(self, Self::Completed { .. })
    }

    /// The exported events, if the export completed.
    #[must_use]
    pub fn into_events(self) -> Option<Vec<LogEvent>> {
        match self {
            Self::Completed { events } => Some(events),
            Self::Cancelled { .. } => None,
        }
    }
}

/// Trait for event storage backends.
///
/// Every query returns events newest first; events with identical timestamps
/// come back in reverse insertion order. All methods block and should be run
/// off latency-sensitive threads (see [`LogEngine`](crate::engine::LogEngine)).
pub trait EventStore: Send + Sync {
    /// Short backend name, for diagnostics.
    fn name(&self) -> &'static str;

    /// Bounds applied by this store.
    fn limits(&self) -> &QueryLimits;

    /// Appends one event.
    ///
    /// # Errors
    ///
    /// Returns an error if the event cannot be persisted.
    fn insert(&self, event: &LogEvent) -> Result<()>;

    /// Appends several events in order.
    ///
    /// # Errors
    ///
    /// Returns the first insertion error.
    fn insert_batch(&self, events: &[LogEvent]) -> Result<()> {
        events.iter().try_for_each(|event| self.insert(event))
    }

    /// Returns at most `limit` matching events after skipping `offset`.
    ///
    /// An `offset` at or past the match count yields an empty result.
    ///
    /// # Errors
    ///
    /// Returns [`LogError::InvalidFilter`](crate::LogError::InvalidFilter)
    /// for a malformed filter, or a storage error.
    fn fetch(&self, filter: &LogFilter, offset: usize, limit: usize) -> Result<Vec<LogEvent>>;

    /// Exact number of matching events.
    ///
    /// # Errors
    ///
    /// Same as [`fetch`](Self::fetch).
    fn count(&self, filter: &LogFilter) -> Result<u64>;

    /// Total, per-level and top-function counts over the whole store.
    ///
    /// An empty store yields all-zero statistics.
    ///
    /// # Errors
    ///
    /// Returns a storage error.
    fn statistics(&self) -> Result<Statistics>;

    /// Distinct non-empty values of `field`, sorted ascending.
    ///
    /// # Errors
    ///
    /// Returns a storage error.
    fn distinct_values(&self, field: DistinctField) -> Result<Vec<String>>;

    /// Literal, case-insensitive substring search over `fields`.
    ///
    /// Empty `fields` searches the message only; empty `session_ids` searches
    /// every session.
    ///
    /// # Errors
    ///
    /// Returns [`LogError::InvalidFilter`](crate::LogError::InvalidFilter)
    /// if the keyword is shorter than the configured minimum.
    fn search(
        &self,
        session_ids: &[SessionId],
        keyword: &str,
        fields: &[SearchField],
        limit: usize,
    ) -> Result<Vec<LogEvent>>;

    /// Applies the store's retention limits, returning how much was removed.
    ///
    /// # Errors
    ///
    /// Returns a storage error.
    fn enforce_retention(&self) -> Result<usize>;

    /// Every matching event, capped at [`QueryLimits::fetch_all_ceiling`].
    ///
    /// # Errors
    ///
    /// Same as [`fetch`](Self::fetch).
    fn fetch_all(&self, filter: &LogFilter) -> Result<Vec<LogEvent>> {
        self.fetch(filter, 0, self.limits().fetch_all_ceiling)
    }

    /// One page of results with a `has_more` flag.
    ///
    /// Requests one extra row to decide `has_more`; the page itself is never
    /// padded.
    ///
    /// # Errors
    ///
    /// Same as [`fetch`](Self::fetch).
    fn fetch_page(&self, filter: &LogFilter, offset: usize, limit: usize) -> Result<Page> {
        let mut events = self.fetch(filter, offset, limit.saturating_add(1))?;
        let has_more = events.len() > limit;
        events.truncate(limit);
        Ok(Page {
            events,
            offset,
            has_more,
        })
    }

    /// Exports every matching event in batches, checking `cancel` before
    /// each batch.
    ///
    /// # Errors
    ///
    /// Same as [`fetch`](Self::fetch).
    fn export(&self, filter: &LogFilter, cancel: &CancellationToken) -> Result<ExportOutcome> {
        let limits = *self.limits();
        let batch = limits.export_batch_size.max(1);
        let mut events = Vec::new();

        loop {
            if cancel.is_cancelled() {
                debug!(fetched = events.len(), "export cancelled");
                return Ok(ExportOutcome::Cancelled {
                    fetched: events.len(),
                });
            }
            let remaining = limits.fetch_all_ceiling.saturating_sub(events.len());
            let chunk = self.fetch(filter, events.len(), batch.min(remaining))?;
            let done = chunk.len() < batch || chunk.len() >= remaining;
            events.extend(chunk);
            if done {
                return Ok(ExportOutcome::Completed { events });
            }
        }
    }
}

/// Validates a search request against `limits`.
///
/// # Errors
///
/// Returns [`LogError::InvalidFilter`](crate::LogError::InvalidFilter) for a
/// short keyword.
pub fn check_search(keyword: &str, limits: &QueryLimits) -> Result<String> {
    let keyword = keyword.trim();
    check_keyword(keyword, limits.min_keyword_len)?;
    Ok(keyword.to_string())
}

/// Fields a search covers; the message when none are given.
#[must_use]
pub fn search_fields(fields: &[SearchField]) -> Vec<SearchField> {
    if fields.is_empty() {
        vec![SearchField::Message]
    } else {
        fields.to_vec()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::LogError;
    use crate::types::LogLevel;
    use parking_lot::Mutex;

    /// A simple in-memory store for testing the provided methods.
    struct MockStore {
        events: Mutex<Vec<LogEvent>>,
        limits: QueryLimits,
        fetches: Mutex<usize>,
        cancel_after_first_fetch: Option<CancellationToken>,
    }

    impl MockStore {
        fn new(limits: QueryLimits) -> Self {
            Self {
                events: Mutex::new(Vec::new()),
                limits,
                fetches: Mutex::new(0),
                cancel_after_first_fetch: None,
            }
        }
    }

    impl EventStore for MockStore {
        fn name(&self) -> &'static str {
            "mock"
        }

        fn limits(&self) -> &QueryLimits {
            &self.limits
        }

        fn insert(&self, event: &LogEvent) -> Result<()> {
            self.events.lock().push(event.clone());
            Ok(())
        }

        fn fetch(&self, filter: &LogFilter, offset: usize, limit: usize) -> Result<Vec<LogEvent>> {
            *self.fetches.lock() += 1;
            if let Some(token) = &self.cancel_after_first_fetch {
                token.cancel();
            }
            Ok(self
                .events
                .lock()
                .iter()
                .rev()
                .filter(|e| e.matches(filter))
                .skip(offset)
                .take(limit)
                .cloned()
                .collect())
        }

        fn count(&self, filter: &LogFilter) -> Result<u64> {
            Ok(self.events.lock().iter().filter(|e| e.matches(filter)).count() as u64)
        }

        fn statistics(&self) -> Result<Statistics> {
            Ok(Statistics::empty())
        }

        fn distinct_values(&self, _field: DistinctField) -> Result<Vec<String>> {
            Ok(Vec::new())
        }

        fn search(
            &self,
            _session_ids: &[SessionId],
            keyword: &str,
            _fields: &[SearchField],
            _limit: usize,
        ) -> Result<Vec<LogEvent>> {
            check_search(keyword, &self.limits)?;
            Ok(Vec::new())
        }

        fn enforce_retention(&self) -> Result<usize> {
            Ok(0)
        }
    }

    fn store_with(n: usize, limits: QueryLimits) -> MockStore {
        let store = MockStore::new(limits);
        let events: Vec<LogEvent> = (0..n)
            .map(|i| LogEvent::new(LogLevel::Info, format!("event {i}")))
            .collect();
        store.insert_batch(&events).expect("insert");
        store
    }

    // ===========================================
    // Paging Tests
    // ===========================================

    #[test]
    fn fetch_page_reports_has_more() {
        let store = store_with(501, QueryLimits::default());
        let filter = LogFilter::new();

        let first = store.fetch_page(&filter, 0, 500).expect("page");
        assert_eq!(first.events.len(), 500);
        assert!(first.has_more);

        let second = store.fetch_page(&filter, 500, 500).expect("page");
        assert_eq!(second.events.len(), 1);
        assert!(!second.has_more);
        assert_eq!(second.events[0].message, "event 0");
    }

    #[test]
    fn exact_page_has_no_more() {
        let store = store_with(10, QueryLimits::default());
        let page = store.fetch_page(&LogFilter::new(), 0, 10).expect("page");
        assert_eq!(page.events.len(), 10);
        assert!(!page.has_more);
    }

    #[test]
    fn fetch_all_respects_ceiling() {
        let limits = QueryLimits {
            fetch_all_ceiling: 5,
            ..QueryLimits::default()
        };
        let store = store_with(20, limits);
        assert_eq!(store.fetch_all(&LogFilter::new()).expect("fetch").len(), 5);
    }

    // ===========================================
    // Export Tests
    // ===========================================

    #[test]
    fn export_collects_every_batch() {
        let limits = QueryLimits {
            export_batch_size: 7,
            ..QueryLimits::default()
        };
        let store = store_with(30, limits);
        let outcome = store
            .export(&LogFilter::new(), &CancellationToken::new())
            .expect("export");

        let events = outcome.into_events().expect("completed");
        assert_eq!(events, store.fetch_all(&LogFilter::new()).expect("fetch"));
        // 4 full batches and one short batch, plus the fetch_all above
        assert_eq!(*store.fetches.lock(), 6);
    }

    #[test]
    fn export_precancelled_fetches_nothing() {
        let store = store_with(10, QueryLimits::default());
        let token = CancellationToken::new();
        token.cancel();

        let outcome = store.export(&LogFilter::new(), &token).expect("export");
        assert_eq!(outcome, ExportOutcome::Cancelled { fetched: 0 });
        assert_eq!(*store.fetches.lock(), 0);
    }

    #[test]
    fn export_stops_between_batches() {
        let limits = QueryLimits {
            export_batch_size: 4,
            ..QueryLimits::default()
        };
        let token = CancellationToken::new();
        let mut store = store_with(20, limits);
        store.cancel_after_first_fetch = Some(token.clone());

        let outcome = store.export(&LogFilter::new(), &token).expect("export");
        assert_eq!(outcome, ExportOutcome::Cancelled { fetched: 4 });
        assert_eq!(*store.fetches.lock(), 1);
    }

    #[test]
    fn export_respects_ceiling() {
        let limits = QueryLimits {
            export_batch_size: 3,
            fetch_all_ceiling: 8,
            ..QueryLimits::default()
        };
        let store = store_with(20, limits);
        let outcome = store
            .export(&LogFilter::new(), &CancellationToken::new())
            .expect("export");
        assert_eq!(outcome.into_events().map(|e| e.len()), Some(8));
    }

    // ===========================================
    // Search Helper Tests
    // ===========================================

    #[test]
    fn short_keyword_is_rejected() {
        let store = store_with(1, QueryLimits::default());
        let result = store.search(&[], "ab", &[], 10);
        assert!(matches!(result, Err(LogError::InvalidFilter(_))));
    }

    #[test]
    fn search_fields_default_to_message() {
        assert_eq!(search_fields(&[]), vec![SearchField::Message]);
        assert_eq!(
            search_fields(&[SearchField::File, SearchField::Thread]),
            vec![SearchField::File, SearchField::Thread]
        );
    }
}

//! Shared engine handle.
//!
//! [`LogEngine`] is a cheap-to-clone handle over one [`EventStore`]. Every
//! clone refers to the same store; the store lives as long as its longest
//! holder. The `*_async` methods run the blocking store call on Tokio's
//! blocking pool so callers on async tasks never stall their executor.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::config::{Backend, EngineConfig};
use crate::error::{LogError, Result};
use crate::file_store::FileEventStore;
use crate::indexed_store::IndexedEventStore;
use crate::traits::{EventStore, ExportOutcome};
use crate::types::{DistinctField, LogEvent, LogFilter, Page, SearchField, SessionId, Statistics};

/// Shared event store handle.
pub type SharedEventStore = Arc<dyn EventStore>;

/// Handle to an open log store.
#[derive(Clone)]
pub struct LogEngine {
    store: SharedEventStore,
    config: Arc<EngineConfig>,
}

impl std::fmt::Debug for LogEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LogEngine")
            .field("backend", &self.store.name())
            .field("directory", &self.config.directory)
            .finish()
    }
}

impl LogEngine {
    /// Opens the backend named by `config.backend`.
    ///
    /// # Errors
    ///
    /// Returns a configuration, schema or storage error; the engine is not
    /// usable in that case.
    pub fn open(config: EngineConfig) -> Result<Self> {
        let store: SharedEventStore = match config.backend {
            Backend::File => Arc::new(FileEventStore::open(&config)?),
            Backend::Indexed => Arc::new(IndexedEventStore::open(&config)?),
        };
        info!(backend = store.name(), dir = %config.directory.display(), "log engine ready");
        Ok(Self::with_store(store, config))
    }

    /// Wraps an already-open store.
    #[must_use]
    pub fn with_store(store: SharedEventStore, config: EngineConfig) -> Self {
        Self {
            store,
            config: Arc::new(config),
        }
    }

    /// The underlying store.
    #[must_use]
    pub fn store(&self) -> &dyn EventStore {
        self.store.as_ref()
    }

    /// The configuration the engine was opened with.
    #[must_use]
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Default page size.
    #[must_use]
    pub fn page_size(&self) -> usize {
        self.config.page_size
    }

    /// Inserts one event on the blocking pool.
    ///
    /// # Errors
    ///
    /// Returns the store error, or [`LogError::TaskFailed`] if the task panicked.
    pub async fn insert_async(&self, event: LogEvent) -> Result<()> {
        self.run_blocking(move |store| store.insert(&event)).await
    }

    /// Inserts several events on the blocking pool.
    ///
    /// # Errors
    ///
    /// Same as [`insert_async`](Self::insert_async).
    pub async fn insert_batch_async(&self, events: Vec<LogEvent>) -> Result<()> {
        self.run_blocking(move |store| store.insert_batch(&events)).await
    }

    /// Fetches page `page` (zero-based) of the default page size.
    ///
    /// # Errors
    ///
    /// Returns the query error, or [`LogError::TaskFailed`].
    pub async fn fetch_page_async(&self, filter: LogFilter, page: usize) -> Result<Page> {
        let size = self.page_size();
        self.fetch_range_async(filter, page.saturating_mul(size), size)
            .await
    }

    /// Fetches up to `limit` events starting at `offset`.
    ///
    /// # Errors
    ///
    /// Returns the query error, or [`LogError::TaskFailed`].
    pub async fn fetch_range_async(
        &self,
        filter: LogFilter,
        offset: usize,
        limit: usize,
    ) -> Result<Page> {
        self.run_blocking(move |store| store.fetch_page(&filter, offset, limit))
            .await
    }

    /// Counts matching events on the blocking pool.
    ///
    /// # Errors
    ///
    /// Returns the query error, or [`LogError::TaskFailed`].
    pub async fn count_async(&self, filter: LogFilter) -> Result<u64> {
        self.run_blocking(move |store| store.count(&filter)).await
    }

    /// Computes statistics on the blocking pool.
    ///
    /// # Errors
    ///
    /// Returns the query error, or [`LogError::TaskFailed`].
    pub async fn statistics_async(&self) -> Result<Statistics> {
        self.run_blocking(|store| store.statistics()).await
    }

    /// Looks up distinct values on the blocking pool.
    ///
    /// # Errors
    ///
    /// Returns the query error, or [`LogError::TaskFailed`].
    pub async fn distinct_values_async(&self, field: DistinctField) -> Result<Vec<String>> {
        self.run_blocking(move |store| store.distinct_values(field))
            .await
    }

    /// Runs a keyword search on the blocking pool.
    ///
    /// # Errors
    ///
    /// Returns the query error, or [`LogError::TaskFailed`].
    pub async fn search_async(
        &self,
        session_ids: Vec<SessionId>,
        keyword: String,
        fields: Vec<SearchField>,
        limit: usize,
    ) -> Result<Vec<LogEvent>> {
        self.run_blocking(move |store| store.search(&session_ids, &keyword, &fields, limit))
            .await
    }

    /// Exports matching events on the blocking pool; cancelling `cancel`
    /// stops the export before its next batch.
    ///
    /// # Errors
    ///
    /// Returns the query error, or [`LogError::TaskFailed`].
    pub async fn export_async(
        &self,
        filter: LogFilter,
        cancel: CancellationToken,
    ) -> Result<ExportOutcome> {
        self.run_blocking(move |store| store.export(&filter, &cancel))
            .await
    }

    /// Applies retention on the blocking pool.
    ///
    /// # Errors
    ///
    /// Returns the storage error, or [`LogError::TaskFailed`].
    pub async fn enforce_retention_async(&self) -> Result<usize> {
        self.run_blocking(|store| store.enforce_retention()).await
    }

    async fn run_blocking<T, F>(&self, f: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&dyn EventStore) -> Result<T> + Send + 'static,
    {
        let store = Arc::clone(&self.store);
        tokio::task::spawn_blocking(move || f(store.as_ref()))
            .await
            .map_err(|e| LogError::TaskFailed(e.to_string()))?
    }
}

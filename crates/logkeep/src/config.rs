//! Engine configuration.
//!
//! This module provides:
//! - [`EngineConfig`] — every knob consumed by the stores, loadable from JSON
//! - [`Backend`] — which [`EventStore`](crate::traits::EventStore) implementation to open

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{LogError, Result};
use crate::policy::{GenerationPolicy, RotationPolicy};
use crate::schema::CURRENT_SCHEMA_VERSION;
use crate::traits::QueryLimits;

/// Smallest non-zero `max_store_bytes` accepted.
///
/// An empty database with its indexes already occupies tens of kilobytes;
/// a cap below that would evict every row on each prune pass.
pub const MIN_STORE_BYTES: u64 = 256 * 1024;

/// Storage backend selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Backend {
    /// Rotated JSON-lines containers.
    File,
    /// SQLite database with indexes.
    #[default]
    Indexed,
}

/// Configuration for a log engine.
///
/// `rotation`, `generation` and `max_files` govern the file backend;
/// `max_store_bytes` and `retention_days` govern the indexed backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Container directory, or the parent directory of the database.
    pub directory: PathBuf,
    /// Storage backend.
    pub backend: Backend,
    /// When an open container is sealed.
    pub rotation: RotationPolicy,
    /// How the container for new writes is chosen.
    pub generation: GenerationPolicy,
    /// Maximum number of containers kept (0 = unlimited).
    pub max_files: usize,
    /// Live size cap of the database in bytes (0 = unlimited, otherwise at
    /// least [`MIN_STORE_BYTES`]).
    pub max_store_bytes: u64,
    /// Age cap of stored events in days (0 = unlimited).
    pub retention_days: u32,
    /// Default page size for paged queries.
    pub page_size: usize,
    /// Minimum keyword length accepted for substring search.
    pub min_keyword_len: usize,
    /// Number of functions reported in statistics.
    pub top_functions: usize,
    /// Inserts between opportunistic prune passes (0 = prune on open only).
    pub prune_interval: u64,
    /// Rows fetched per export batch.
    pub export_batch_size: usize,
    /// Upper bound on rows returned by an unpaged fetch.
    pub fetch_all_ceiling: usize,
    /// Database schema version to open.
    pub schema_version: u32,
    /// Directory searched for schema overrides before the embedded schema.
    pub schema_dir: Option<PathBuf>,
    /// Database file name inside `directory`.
    pub database_name: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            directory: PathBuf::from("logs"),
            backend: Backend::default(),
            rotation: RotationPolicy::default(),
            generation: GenerationPolicy::default(),
            max_files: 7,
            max_store_bytes: 100 * 1024 * 1024, // 100 MB
            retention_days: 7,
            page_size: 500,
            min_keyword_len: 3,
            top_functions: 100,
            prune_interval: 1000,
            export_batch_size: 1000,
            fetch_all_ceiling: 1_000_000,
            schema_version: CURRENT_SCHEMA_VERSION,
            schema_dir: None,
            database_name: "logkeep.sqlite3".to_string(),
        }
    }
}

impl EngineConfig {
    /// Creates a default config rooted at `directory`.
    #[must_use]
    pub fn new(directory: impl Into<PathBuf>) -> Self {
        Self {
            directory: directory.into(),
            ..Default::default()
        }
    }

    /// Loads a config from a JSON file. Missing fields take their defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, is not valid JSON, or
    /// fails [`validate`](Self::validate).
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Sets the backend.
    #[must_use]
    pub const fn with_backend(mut self, backend: Backend) -> Self {
        self.backend = backend;
        self
    }

    /// Sets the rotation policy.
    #[must_use]
    pub const fn with_rotation(mut self, rotation: RotationPolicy) -> Self {
        self.rotation = rotation;
        self
    }

    /// Sets the generation policy.
    #[must_use]
    pub const fn with_generation(mut self, generation: GenerationPolicy) -> Self {
        self.generation = generation;
        self
    }

    /// Sets the container count cap.
    #[must_use]
    pub const fn with_max_files(mut self, max_files: usize) -> Self {
        self.max_files = max_files;
        self
    }

    /// Sets the database size cap.
    #[must_use]
    pub const fn with_max_store_bytes(mut self, bytes: u64) -> Self {
        self.max_store_bytes = bytes;
        self
    }

    /// Sets the retention window.
    #[must_use]
    pub const fn with_retention_days(mut self, days: u32) -> Self {
        self.retention_days = days;
        self
    }

    /// Sets the default page size.
    #[must_use]
    pub const fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size;
        self
    }

    /// Sets the prune interval.
    #[must_use]
    pub const fn with_prune_interval(mut self, inserts: u64) -> Self {
        self.prune_interval = inserts;
        self
    }

    /// Sets the export batch size.
    #[must_use]
    pub const fn with_export_batch_size(mut self, size: usize) -> Self {
        self.export_batch_size = size;
        self
    }

    /// Sets the ceiling on unpaged fetches and exports.
    #[must_use]
    pub const fn with_fetch_all_ceiling(mut self, ceiling: usize) -> Self {
        self.fetch_all_ceiling = ceiling;
        self
    }

    /// Sets the schema override directory.
    #[must_use]
    pub fn with_schema_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.schema_dir = Some(dir.into());
        self
    }

    /// Path of the database file for the indexed backend.
    #[must_use]
    pub fn database_path(&self) -> PathBuf {
        self.directory.join(&self.database_name)
    }

    /// Query limits derived from this config.
    #[must_use]
    pub const fn query_limits(&self) -> QueryLimits {
        QueryLimits {
            export_batch_size: self.export_batch_size,
            fetch_all_ceiling: self.fetch_all_ceiling,
            min_keyword_len: self.min_keyword_len,
            top_functions: self.top_functions,
        }
    }

    /// Rejects invalid values and policy combinations.
    ///
    /// # Errors
    ///
    /// Returns [`LogError::Config`] describing the first problem found.
    pub fn validate(&self) -> Result<()> {
        match self.rotation {
            RotationPolicy::Size { max_bytes: 0 } => {
                return Err(config_error("size rotation threshold must be positive"));
            }
            RotationPolicy::Time { max_age_secs: 0 } => {
                return Err(config_error("time rotation threshold must be positive"));
            }
            _ => {}
        }
        if matches!(self.generation, GenerationPolicy::Session { max_age_secs: 0 }) {
            return Err(config_error("session max age must be positive"));
        }
        if self.page_size == 0 {
            return Err(config_error("page_size must be positive"));
        }
        if self.export_batch_size == 0 {
            return Err(config_error("export_batch_size must be positive"));
        }
        if self.fetch_all_ceiling == 0 {
            return Err(config_error("fetch_all_ceiling must be positive"));
        }
        if self.max_store_bytes > 0 && self.max_store_bytes < MIN_STORE_BYTES {
            return Err(LogError::Config(format!(
                "max_store_bytes must be 0 or at least {MIN_STORE_BYTES}"
            )));
        }
        if self.min_keyword_len == 0 {
            return Err(config_error("min_keyword_len must be positive"));
        }
        if self.database_name.trim().is_empty() {
            return Err(config_error("database_name must not be empty"));
        }
        if self.backend == Backend::File
            && self.generation == GenerationPolicy::ReuseUntilRotation
            && self.rotation == RotationPolicy::Never
            && self.max_files > 0
        {
            return Err(config_error(
                "reuse_until_rotation with rotation never keeps one container forever; \
                 max_files cannot apply",
            ));
        }
        Ok(())
    }
}

fn config_error(message: &str) -> LogError {
    LogError::Config(message.to_string())
}

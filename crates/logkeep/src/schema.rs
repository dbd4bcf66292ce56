//! Versioned database schema resolution.
//!
//! Schemas are looked up in a fixed priority order:
//!
//! 1. an override file `logkeep.v{N}.sql` in the configured schema directory
//! 2. the schema embedded in the build for version `N`
//!
//! [`init`] runs that lookup once per request and records the first match in
//! a process-wide registry for the rest of the process lifetime. [`resolve`]
//! only reads the registry. When nothing matches, [`LogError::SchemaNotFound`]
//! lists every candidate tried.

use std::fmt;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use once_cell::sync::OnceCell;
use tracing::info;

use crate::cache::ConcurrentCache;
use crate::error::{LogError, Result};

/// Newest schema version this build knows.
pub const CURRENT_SCHEMA_VERSION: u32 = 1;

const EMBEDDED: &[(u32, &str)] = &[(1, include_str!("../schema/v1.sql"))];

static REGISTRY: OnceCell<ConcurrentCache<SchemaRequest, Arc<Schema>>> = OnceCell::new();

/// What a store asks for when it opens.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SchemaRequest {
    /// Schema version wanted.
    pub version: u32,
    /// Directory searched before the embedded schemas.
    pub override_dir: Option<PathBuf>,
}

impl SchemaRequest {
    /// Requests `version` with no override directory.
    #[must_use]
    pub const fn new(version: u32) -> Self {
        Self {
            version,
            override_dir: None,
        }
    }

    /// Adds an override directory.
    #[must_use]
    pub fn with_override_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.override_dir = Some(dir.into());
        self
    }
}

/// Where a schema was found.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SchemaSource {
    /// An override file on disk.
    OverrideFile(PathBuf),
    /// The schema compiled into the build.
    Embedded,
}

impl fmt::Display for SchemaSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::OverrideFile(path) => write!(f, "override file {}", path.display()),
            Self::Embedded => write!(f, "embedded"),
        }
    }
}

/// A resolved schema definition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Schema {
    /// Schema version.
    pub version: u32,
    /// Where it came from.
    pub source: SchemaSource,
    /// SQL applied to create the tables and indexes.
    pub sql: String,
}

/// Locates the schema for `request` and records it in the process-wide
/// registry. Later calls for the same request return the recorded schema.
///
/// # Errors
///
/// Returns [`LogError::SchemaNotFound`] if no candidate matches, or an I/O
/// error if an override file exists but cannot be read. Failures are not
/// recorded, so a later call may still succeed.
pub fn init(request: &SchemaRequest) -> Result<Arc<Schema>> {
    let registry = REGISTRY.get_or_init(ConcurrentCache::new);
    registry.get_or_try_insert_with(request.clone(), || {
        let schema = locate(request)?;
        info!(version = schema.version, source = %schema.source, "resolved log store schema");
        Ok(Arc::new(schema))
    })
}

/// Returns the schema [`init`] recorded for `request`.
///
/// # Errors
///
/// Returns [`LogError::Config`] if `init` has not succeeded for `request`.
pub fn resolve(request: &SchemaRequest) -> Result<Arc<Schema>> {
    REGISTRY
        .get()
        .and_then(|registry| registry.get(request))
        .ok_or_else(|| {
            LogError::Config(format!(
                "schema v{} has not been initialized",
                request.version
            ))
        })
}

/// Looks up `request` without consulting or filling the registry.
///
/// # Errors
///
/// Same as [`init`].
pub fn locate(request: &SchemaRequest) -> Result<Schema> {
    let mut attempted = Vec::new();

    if let Some(dir) = &request.override_dir {
        let path = override_path(dir, request.version);
        match std::fs::read_to_string(&path) {
            Ok(sql) => {
                return Ok(Schema {
                    version: request.version,
                    source: SchemaSource::OverrideFile(path),
                    sql,
                });
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                attempted.push(SchemaSource::OverrideFile(path).to_string());
            }
            Err(e) => return Err(e.into()),
        }
    }

    if let Some((_, sql)) = EMBEDDED.iter().find(|(v, _)| *v == request.version) {
        return Ok(Schema {
            version: request.version,
            source: SchemaSource::Embedded,
            sql: (*sql).to_string(),
        });
    }
    attempted.push(format!("{} v{}", SchemaSource::Embedded, request.version));

    Err(LogError::SchemaNotFound { attempted })
}

fn override_path(dir: &Path, version: u32) -> PathBuf {
    dir.join(format!("logkeep.v{version}.sql"))
}

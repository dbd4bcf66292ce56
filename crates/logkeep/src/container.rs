//! Log containers: naming, parsing and directory listing.
//!
//! An open container is named `<created>.log`; a sealed one is
//! `<created>_<sealed>.log`. Both timestamps are written in UTC with the
//! fixed-width format `yyyyMMdd-HHmmss.SSS±hhmm`, so names sort
//! chronologically even across local offset changes.

use std::fs::{self, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Duration, FixedOffset, Local, SubsecRound, Utc};
use tracing::debug;

use crate::policy::ContainerMeta;

/// File extension marking a log container.
pub const CONTAINER_EXTENSION: &str = "log";

const TIMESTAMP_FORMAT: &str = "%Y%m%d-%H%M%S%.3f%z";

/// Attempts made to find a free name before giving up.
const NAME_ATTEMPTS: u32 = 1000;

/// Formats a container timestamp in UTC.
#[must_use]
pub fn format_timestamp<Tz: chrono::TimeZone>(at: &DateTime<Tz>) -> String {
    at.with_timezone(&Utc).format(TIMESTAMP_FORMAT).to_string()
}

/// Parses a container timestamp.
#[must_use]
pub fn parse_timestamp(s: &str) -> Option<DateTime<FixedOffset>> {
    DateTime::parse_from_str(s, TIMESTAMP_FORMAT).ok()
}

/// One rotatable unit of log storage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Container {
    path: PathBuf,
    created: DateTime<FixedOffset>,
    sealed_at: Option<DateTime<FixedOffset>>,
}

impl Container {
    /// Interprets `path` as a container, if its name follows the naming scheme.
    #[must_use]
    pub fn parse(path: &Path) -> Option<Self> {
        let name = path.file_name()?.to_str()?;
        let stem = name.strip_suffix(CONTAINER_EXTENSION)?.strip_suffix('.')?;

        let (created, sealed_at) = match stem.split_once('_') {
            Some((base, sealed)) => (parse_timestamp(base)?, Some(parse_timestamp(sealed)?)),
            None => (parse_timestamp(stem)?, None),
        };

        Some(Self {
            path: path.to_path_buf(),
            created,
            sealed_at,
        })
    }

    /// Creates a new, empty open container in `dir` named after `now`.
    ///
    /// If the name is taken the timestamp is advanced one millisecond at a
    /// time, so two containers created in the same millisecond never collide.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory or file cannot be created.
    pub fn create_in(dir: &Path, now: DateTime<Local>) -> io::Result<Self> {
        fs::create_dir_all(dir)?;

        // Names carry millisecond precision; keep `created` equal to what parsing yields.
        let now = now.with_timezone(&Utc).fixed_offset().trunc_subsecs(3);
        for attempt in 0..NAME_ATTEMPTS {
            let created = now + Duration::milliseconds(i64::from(attempt));
            let path = dir.join(format!(
                "{}.{CONTAINER_EXTENSION}",
                format_timestamp(&created)
            ));
            match OpenOptions::new().write(true).create_new(true).open(&path) {
                Ok(_) => {
                    debug!(path = %path.display(), "created log container");
                    return Ok(Self {
                        path,
                        created,
                        sealed_at: None,
                    });
                }
                Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {}
                Err(e) => return Err(e),
            }
        }

        Err(io::Error::new(
            io::ErrorKind::AlreadyExists,
            format!("no free container name near {}", format_timestamp(&now)),
        ))
    }

    /// Path of the container file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// File name of the container.
    #[must_use]
    pub fn name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    }

    /// Creation time encoded in the name.
    #[must_use]
    pub fn created(&self) -> DateTime<Utc> {
        self.created.with_timezone(&Utc)
    }

    /// Rotation time, for sealed containers.
    #[must_use]
    pub fn sealed_at(&self) -> Option<DateTime<Utc>> {
        self.sealed_at.map(|t| t.with_timezone(&Utc))
    }

    /// Whether the container was sealed by rotation.
    #[must_use]
    pub const fn is_sealed(&self) -> bool {
        self.sealed_at.is_some()
    }

    /// Whether the container file is still present.
    #[must_use]
    pub fn exists(&self) -> bool {
        self.path.is_file()
    }

    /// Reads size and modification time; `None` if the file is unreadable.
    #[must_use]
    pub fn meta(&self) -> Option<ContainerMeta> {
        let metadata = fs::metadata(&self.path).ok()?;
        let modified = metadata.modified().ok()?;
        Some(ContainerMeta {
            size: metadata.len(),
            created: self.created(),
            modified: DateTime::<Utc>::from(modified),
        })
    }

    /// The sealed form of this container, stamped with `at`.
    ///
    /// Returns `None` for containers that are already sealed.
    #[must_use]
    pub fn sealed(&self, at: DateTime<FixedOffset>) -> Option<Self> {
        if self.is_sealed() {
            return None;
        }
        let dir = self.path.parent().unwrap_or_else(|| Path::new("."));
        let path = dir.join(format!(
            "{}_{}.{CONTAINER_EXTENSION}",
            format_timestamp(&self.created),
            format_timestamp(&at)
        ));
        Some(Self {
            path,
            created: self.created,
            sealed_at: Some(at),
        })
    }
}

/// Lists every container in `dir`, newest first.
///
/// Files that do not follow the naming scheme are ignored. A missing
/// directory lists as empty.
///
/// # Errors
///
/// Returns an error if the directory exists but cannot be read.
pub fn list_containers(dir: &Path) -> io::Result<Vec<Container>> {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e),
    };

    let mut containers: Vec<Container> = entries
        .filter_map(std::result::Result::ok)
        .filter(|e| e.file_type().is_ok_and(|t| t.is_file()))
        .filter_map(|e| Container::parse(&e.path()))
        .collect();
    sort_newest_first(&mut containers);
    Ok(containers)
}

/// Orders containers by creation time descending; an open container sorts
/// before a sealed one created at the same instant.
pub fn sort_newest_first(containers: &mut [Container]) {
    containers.sort_by(|a, b| {
        b.created
            .cmp(&a.created)
            .then_with(|| a.sealed_at.is_some().cmp(&b.sealed_at.is_some()))
            .then_with(|| b.sealed_at.cmp(&a.sealed_at))
    });
}

//! Container rotation and count-based retention.
//!
//! Every operation here is housekeeping: failures are logged and reported
//! through the return value, never as errors, so a failed rename or delete
//! can never stop log writing.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Duration, Local, SubsecRound};
use tracing::{debug, warn};

use crate::config::EngineConfig;
use crate::container::{list_containers, Container};
use crate::policy::{should_rotate, RotationPolicy};

/// Attempts made to find a free sealed name before giving up.
const SEAL_ATTEMPTS: i64 = 1000;

/// Applies a [`RotationPolicy`] to the containers of one directory and
/// enforces the `max_files` cap.
#[derive(Debug, Clone)]
pub struct RotationManager {
    directory: PathBuf,
    policy: RotationPolicy,
    max_files: usize,
}

impl RotationManager {
    /// Creates a manager for `directory`. `max_files == 0` disables cleanup.
    #[must_use]
    pub fn new(directory: impl Into<PathBuf>, policy: RotationPolicy, max_files: usize) -> Self {
        Self {
            directory: directory.into(),
            policy,
            max_files,
        }
    }

    /// Creates a manager from engine configuration.
    #[must_use]
    pub fn from_config(config: &EngineConfig) -> Self {
        Self::new(config.directory.clone(), config.rotation, config.max_files)
    }

    /// The managed directory.
    #[must_use]
    pub fn directory(&self) -> &Path {
        &self.directory
    }

    /// The active rotation policy.
    #[must_use]
    pub const fn policy(&self) -> RotationPolicy {
        self.policy
    }

    /// Maximum number of containers kept, `0` for no limit.
    #[must_use]
    pub const fn max_files(&self) -> usize {
        self.max_files
    }

    /// Whether `container` is due for rotation at `now`.
    #[must_use]
    pub fn is_due(&self, container: &Container, now: &DateTime<Local>) -> bool {
        !container.is_sealed() && should_rotate(container.meta().as_ref(), &self.policy, now)
    }

    /// Rotates `container` if its policy says so.
    ///
    /// Returns the sealed container when a rotation happened.
    pub fn check_and_rotate(&self, container: &Container) -> Option<Container> {
        self.check_and_rotate_at(container, &Local::now())
    }

    /// [`check_and_rotate`](Self::check_and_rotate) evaluated at `now`.
    pub fn check_and_rotate_at(
        &self,
        container: &Container,
        now: &DateTime<Local>,
    ) -> Option<Container> {
        if self.is_due(container, now) {
            self.rotate_at(container, now)
        } else {
            None
        }
    }

    /// Seals `container` under a rotation-stamped name, then runs cleanup.
    ///
    /// The rename keeps the file's bytes untouched, and the open name is free
    /// again afterwards. Returns `None` if the rename failed or the container
    /// was already sealed.
    pub fn rotate(&self, container: &Container) -> Option<Container> {
        self.rotate_at(container, &Local::now())
    }

    /// [`rotate`](Self::rotate) stamped with `now`.
    pub fn rotate_at(&self, container: &Container, now: &DateTime<Local>) -> Option<Container> {
        let sealed = self.seal(container, now)?;
        debug!(
            from = %container.path().display(),
            to = %sealed.path().display(),
            "rotated log container"
        );
        self.cleanup();
        Some(sealed)
    }

    fn seal(&self, container: &Container, now: &DateTime<Local>) -> Option<Container> {
        for attempt in 0..SEAL_ATTEMPTS {
            let at = now.fixed_offset().trunc_subsecs(3) + Duration::milliseconds(attempt);
            let sealed = container.sealed(at)?;
            if sealed.path().exists() {
                continue;
            }
            return match fs::rename(container.path(), sealed.path()) {
                Ok(()) => Some(sealed),
                Err(e) => {
                    warn!(
                        path = %container.path().display(),
                        error = %e,
                        "failed to rotate log container"
                    );
                    None
                }
            };
        }
        warn!(path = %container.path().display(), "no free name to seal log container");
        None
    }

    /// Deletes every container beyond the `max_files` most recent.
    ///
    /// Returns the number of containers removed.
    pub fn cleanup(&self) -> usize {
        cleanup(&self.directory, self.max_files)
    }

    /// Lists the managed containers, newest first; empty if unreadable.
    #[must_use]
    pub fn containers(&self) -> Vec<Container> {
        list_containers(&self.directory).unwrap_or_else(|e| {
            warn!(dir = %self.directory.display(), error = %e, "failed to list log containers");
            Vec::new()
        })
    }
}

/// Deletes every container in `directory` beyond the `max_files` most
/// recently created. `max_files == 0` keeps everything.
///
/// Works on a snapshot of the listing taken at the start; a file that is
/// already gone counts as removed by someone else and is not an error.
/// Returns the number of containers this call removed.
pub fn cleanup(directory: &Path, max_files: usize) -> usize {
    if max_files == 0 {
        return 0;
    }

    let snapshot = match list_containers(directory) {
        Ok(containers) => containers,
        Err(e) => {
            warn!(dir = %directory.display(), error = %e, "failed to list log containers");
            return 0;
        }
    };

    let mut removed = 0;
    for container in snapshot.iter().skip(max_files) {
        match fs::remove_file(container.path()) {
            Ok(()) => removed += 1,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => warn!(
                path = %container.path().display(),
                error = %e,
                "failed to delete old log container"
            ),
        }
    }

    if removed > 0 {
        debug!(dir = %directory.display(), removed, "removed old log containers");
    }
    removed
}

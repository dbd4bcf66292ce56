//! Rotation and generation policies.
//!
//! [`RotationPolicy::should_rotate`] is a pure decision over container
//! metadata and the current time; it never touches the filesystem.
//! [`GenerationPolicy`] governs which container receives new writes and is
//! applied by [`SelectionManager`](crate::selection::SelectionManager).

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

/// When an open container should be sealed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RotationPolicy {
    /// Rotate once the container reaches `max_bytes`.
    Size {
        /// Size threshold in bytes
        max_bytes: u64,
    },
    /// Rotate once the container was last modified `max_age_secs` ago.
    Time {
        /// Age threshold in seconds
        max_age_secs: u64,
    },
    /// Rotate when the last modification is not on today's calendar date.
    Daily,
    /// Never rotate.
    Never,
}

impl Default for RotationPolicy {
    fn default() -> Self {
        Self::Size {
            max_bytes: 10 * 1024 * 1024,
        }
    }
}

/// Size and timestamps of one container.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContainerMeta {
    /// Current size in bytes
    pub size: u64,
    /// Creation time encoded in the container name
    pub created: DateTime<Utc>,
    /// Last modification time reported by the filesystem
    pub modified: DateTime<Utc>,
}

impl RotationPolicy {
    /// Decides whether a container with `meta` is due for rotation at `now`.
    ///
    /// The calendar day used by [`RotationPolicy::Daily`] is taken in the time
    /// zone of `now`; callers pass `Local::now()` in production.
    #[must_use]
    pub fn should_rotate<Tz: TimeZone>(&self, meta: &ContainerMeta, now: &DateTime<Tz>) -> bool {
        match *self {
            Self::Size { max_bytes } => meta.size >= max_bytes,
            Self::Time { max_age_secs } => {
                let age = now.with_timezone(&Utc) - meta.modified;
                age.num_seconds() >= 0 && age.num_seconds().unsigned_abs() >= max_age_secs
            }
            Self::Daily => {
                let modified = meta.modified.with_timezone(&now.timezone());
                modified.date_naive() != now.date_naive()
            }
            Self::Never => false,
        }
    }
}

/// Evaluates `policy` against possibly-missing metadata.
///
/// Unreadable metadata means "do not rotate": rotation is housekeeping and
/// must not fail the caller.
#[must_use]
pub fn should_rotate<Tz: TimeZone>(
    meta: Option<&ContainerMeta>,
    policy: &RotationPolicy,
    now: &DateTime<Tz>,
) -> bool {
    meta.is_some_and(|m| policy.should_rotate(m, now))
}

/// How the current container is chosen for new writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum GenerationPolicy {
    /// A new container for every process launch.
    PerLaunch,
    /// Reuse the container created today, if any.
    Daily,
    /// Reuse the newest container not yet due for rotation.
    #[default]
    ReuseUntilRotation,
    /// Reuse the newest container if it is younger than `max_age_secs`.
    Session {
        /// Maximum age of a reusable container in seconds
        max_age_secs: u64,
    },
}

impl GenerationPolicy {
    /// Whether a container created at `created` may be reused at `now`,
    /// before rotation is considered.
    #[must_use]
    pub fn accepts<Tz: TimeZone>(&self, created: DateTime<Utc>, now: &DateTime<Tz>) -> bool {
        match *self {
            Self::PerLaunch | Self::ReuseUntilRotation => true,
            Self::Daily => created.with_timezone(&now.timezone()).date_naive() == now.date_naive(),
            Self::Session { max_age_secs } => {
                let age = now.with_timezone(&Utc) - created;
                age.num_seconds() >= 0 && age.num_seconds().unsigned_abs() < max_age_secs
            }
        }
    }
}

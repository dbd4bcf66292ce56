//! Selection of the container that receives new writes.

use std::io;
use std::sync::Arc;

use chrono::{DateTime, Local};
use parking_lot::Mutex;
use tracing::debug;

use crate::container::Container;
use crate::policy::GenerationPolicy;
use crate::rotation::RotationManager;

/// Chooses the current container under a [`GenerationPolicy`].
///
/// The current-container pointer is the only mutable state; it is guarded by
/// a mutex so that the read, decide and create steps run as one unit and two
/// threads never both create a container.
#[derive(Debug)]
pub struct SelectionManager {
    generation: GenerationPolicy,
    rotation: Arc<RotationManager>,
    current: Mutex<Option<Container>>,
}

impl SelectionManager {
    /// Creates a selection manager over the rotation manager's directory.
    #[must_use]
    pub fn new(generation: GenerationPolicy, rotation: Arc<RotationManager>) -> Self {
        Self {
            generation,
            rotation,
            current: Mutex::new(None),
        }
    }

    /// The generation policy in force.
    #[must_use]
    pub const fn generation(&self) -> GenerationPolicy {
        self.generation
    }

    /// The rotation manager consulted before reuse.
    #[must_use]
    pub fn rotation(&self) -> &RotationManager {
        &self.rotation
    }

    /// Returns the container new events should be appended to.
    ///
    /// A reused container is always rotation-checked first, so the result is
    /// never a container that is already due for rotation.
    ///
    /// # Errors
    ///
    /// Returns an error only if a new container has to be created and that fails.
    pub fn current_container(&self) -> io::Result<Container> {
        self.current_container_at(Local::now())
    }

    /// [`current_container`](Self::current_container) evaluated at `now`.
    ///
    /// # Errors
    ///
    /// Returns an error only if a new container has to be created and that fails.
    pub fn current_container_at(&self, now: DateTime<Local>) -> io::Result<Container> {
        let mut current = self.current.lock();

        if let Some(container) = current.take() {
            if self.reusable(&container, &now) {
                *current = Some(container.clone());
                return Ok(container);
            }
        }

        if let Some(container) = self.find_reusable(&now) {
            debug!(path = %container.path().display(), "reusing log container");
            *current = Some(container.clone());
            return Ok(container);
        }

        let container = Container::create_in(self.rotation.directory(), now)?;
        self.rotation.cleanup();
        *current = Some(container.clone());
        Ok(container)
    }

    /// Forgets the current container, forcing the next call to re-select.
    pub fn reset(&self) {
        *self.current.lock() = None;
    }

    /// Forces rotation of the current container, if there is one.
    ///
    /// Returns the sealed container.
    pub fn rotate_current(&self) -> Option<Container> {
        let mut current = self.current.lock();
        let container = current.take().or_else(|| {
            self.rotation
                .containers()
                .into_iter()
                .find(|c| !c.is_sealed())
        })?;
        self.rotation.rotate(&container)
    }

    fn reusable(&self, container: &Container, now: &DateTime<Local>) -> bool {
        container.exists()
            && !container.is_sealed()
            && self.generation.accepts(container.created(), now)
            && self.rotation.check_and_rotate_at(container, now).is_none()
    }

    fn find_reusable(&self, now: &DateTime<Local>) -> Option<Container> {
        let mut open = self
            .rotation
            .containers()
            .into_iter()
            .filter(|c| !c.is_sealed());

        match self.generation {
            // One container per process lifetime: only the pointer is reused.
            GenerationPolicy::PerLaunch => None,
            GenerationPolicy::Session { .. } => {
                let newest = open.next()?;
                self.reusable(&newest, now).then_some(newest)
            }
            GenerationPolicy::Daily | GenerationPolicy::ReuseUntilRotation => {
                open.find(|c| self.reusable(c, now))
            }
        }
    }
}

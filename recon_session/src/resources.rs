//! Tracks local handles (image previews, cached model files) so they are released exactly once.

use std::path::PathBuf;
use std::sync::Arc;

use error_printer::ErrorPrinter;
use parking_lot::Mutex;
use tracing::debug;
use ulid::{Generator, Ulid};

/// Handle returned by [`ResourceLifecycleManager::track`].
pub type ResourceId = Ulid;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Resource {
    /// Preview of a staged image.
    Preview { name: String, size: u64 },
    /// A result file downloaded to local disk.
    Blob { path: PathBuf },
}

/// Performs the actual release of a resource.
pub trait ResourceReleaser: Send + Sync {
    fn release(&self, id: ResourceId, resource: Resource);
}

/// Previews are in-memory and only need dropping; blobs are deleted from disk.
#[derive(Debug, Default)]
pub struct FsResourceReleaser;

impl ResourceReleaser for FsResourceReleaser {
    fn release(&self, id: ResourceId, resource: Resource) {
        match resource {
            Resource::Preview { name, .. } => debug!(%id, name, "released preview"),
            Resource::Blob { path } => match std::fs::remove_file(&path) {
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {},
                result => {
                    let _ = result.warn_error(format!("failed to remove cached blob {path:?}"));
                    debug!(%id, ?path, "released blob");
                },
            },
        }
    }
}

/// Owns every tracked handle until it is released.
///
/// `release` of an unknown id is a no-op, and `release_all` is idempotent, so a handle
/// can never be released twice.
///
/// Cloning is cheap and every clone shares the same set of handles.
#[derive(Clone)]
pub struct ResourceLifecycleManager {
    inner: Arc<ManagerInner>,
}

struct ManagerInner {
    tracked: Mutex<Vec<(ResourceId, Resource)>>,
    ids: Mutex<Generator>,
    releaser: Arc<dyn ResourceReleaser>,
}

impl Default for ResourceLifecycleManager {
    fn default() -> Self {
        Self::new(Arc::new(FsResourceReleaser))
    }
}

impl ResourceLifecycleManager {
    pub fn new(releaser: Arc<dyn ResourceReleaser>) -> Self {
        Self {
            inner: Arc::new(ManagerInner {
                tracked: Mutex::new(Vec::new()),
                ids: Mutex::new(Generator::new()),
                releaser,
            }),
        }
    }

    /// Starts tracking `resource`; every call returns a fresh id.
    pub fn track(&self, resource: Resource) -> ResourceId {
        // The generator is monotonic within a millisecond; it only errors on overflow.
        let id = self.inner.ids.lock().generate().unwrap_or_else(|_| Ulid::new());
        self.inner.tracked.lock().push((id, resource));
        id
    }

    /// Releases one handle.  Returns false when it was not tracked.
    pub fn release(&self, id: ResourceId) -> bool {
        let removed = {
            let mut tracked = self.inner.tracked.lock();
            tracked
                .iter()
                .position(|(i, _)| *i == id)
                .map(|pos| tracked.remove(pos))
        };

        match removed {
            Some((id, resource)) => {
                self.release_one(id, resource);
                true
            },
            None => false,
        }
    }

    /// Releases every tracked handle, returning how many were released.
    pub fn release_all(&self) -> usize {
        let drained = std::mem::take(&mut *self.inner.tracked.lock());
        let n = drained.len();
        for (id, resource) in drained {
            self.release_one(id, resource);
        }
        if n > 0 {
            debug!(n, "released all tracked resources");
        }
        n
    }

    pub fn is_tracked(&self, id: ResourceId) -> bool {
        self.inner.tracked.lock().iter().any(|(i, _)| *i == id)
    }

    pub fn tracked_count(&self) -> usize {
        self.inner.tracked.lock().len()
    }

    fn release_one(&self, id: ResourceId, resource: Resource) {
        self.inner.releaser.release(id, resource);
    }
}

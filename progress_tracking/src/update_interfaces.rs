use std::fmt::Debug;
use std::sync::Arc;

use crate::UploadProgress;

/// Receives upload progress.  Called from inside the request body stream, so
/// implementations must not block.
pub trait UploadProgressUpdater: Debug + Send + Sync {
    fn register_update(&self, update: UploadProgress);
}

/// Adapts a closure into an [`UploadProgressUpdater`].
pub struct FnProgressUpdater<F>(F)
where
    F: Fn(UploadProgress) + Send + Sync;

impl<F> FnProgressUpdater<F>
where
    F: Fn(UploadProgress) + Send + Sync + 'static,
{
    pub fn new(f: F) -> Arc<Self> {
        Arc::new(Self(f))
    }
}

impl<F> Debug for FnProgressUpdater<F>
where
    F: Fn(UploadProgress) + Send + Sync,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("FnProgressUpdater")
    }
}

impl<F> UploadProgressUpdater for FnProgressUpdater<F>
where
    F: Fn(UploadProgress) + Send + Sync,
{
    fn register_update(&self, update: UploadProgress) {
        (self.0)(update)
    }
}

#[derive(Debug, Default)]
pub struct NoOpProgressUpdater;

impl NoOpProgressUpdater {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {})
    }
}

impl UploadProgressUpdater for NoOpProgressUpdater {
    fn register_update(&self, _update: UploadProgress) {}
}

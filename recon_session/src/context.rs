use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use error_printer::ErrorPrinter;
use parking_lot::Mutex;
use recon_client::ReconstructionClient;
use recon_config::ReconConfig;
use recon_types::SessionId;
use tempfile::TempDir;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info};

use crate::errors::{Result, SessionError};
use crate::render_handoff::RenderHandoff;
use crate::resources::{FsResourceReleaser, Resource, ResourceId, ResourceLifecycleManager, ResourceReleaser};
use crate::state_machine::SessionStateMachine;
use crate::upload::UploadCoordinator;

/// A model file downloaded into the context's cache directory.
#[derive(Clone, Debug)]
pub struct CachedModel {
    pub id: ResourceId,
    pub path: PathBuf,
    pub handoff: RenderHandoff,
}

/// Everything one view of a reconstruction session owns.
///
/// Dropping the context (or calling [`SessionContext::teardown`]) closes the state machine,
/// which stops polling and invalidates in-flight calls, and releases every staged preview
/// and cached file.
pub struct SessionContext {
    machine: SessionStateMachine,
    uploads: UploadCoordinator,
    resources: ResourceLifecycleManager,
    cache_dir: Mutex<Option<TempDir>>,
    torn_down: AtomicBool,
}

impl SessionContext {
    pub fn new(client: Arc<dyn ReconstructionClient>, config: &ReconConfig) -> Self {
        Self::with_releaser(client, config, Arc::new(FsResourceReleaser))
    }

    pub fn with_releaser(
        client: Arc<dyn ReconstructionClient>,
        config: &ReconConfig,
        releaser: Arc<dyn ResourceReleaser>,
    ) -> Self {
        let resources = ResourceLifecycleManager::new(releaser);
        Self {
            machine: SessionStateMachine::from_config(client, config),
            uploads: UploadCoordinator::new(resources.clone(), config.session.min_images),
            resources,
            cache_dir: Mutex::new(None),
            torn_down: AtomicBool::new(false),
        }
    }

    pub fn machine(&self) -> &SessionStateMachine {
        &self.machine
    }

    pub fn uploads(&self) -> &UploadCoordinator {
        &self.uploads
    }

    pub fn resources(&self) -> &ResourceLifecycleManager {
        &self.resources
    }

    /// Uploads the staged batch.
    pub async fn upload(&self) -> Result<SessionId> {
        self.ensure_live()?;
        self.machine.upload(&self.uploads).await
    }

    /// Downloads the completed model into the cache directory and tracks it for release.
    pub async fn cache_model(&self) -> Result<CachedModel> {
        self.ensure_live()?;

        let handoff = self.machine.render_handoff().await?;
        let file_name = handoff
            .file_name()
            .and_then(|n| Path::new(n).file_name())
            .map(|n| n.to_string_lossy().into_owned())
            .ok_or_else(|| SessionError::Resource(format!("cannot derive a file name from {}", handoff.model_url())))?;

        let path = self.cache_path(&file_name)?;
        let mut file = tokio::fs::File::create(&path).await?;

        let written = match self.machine.download_file(&file_name, &mut file).await {
            Ok(n) => n,
            Err(e) => {
                drop(file);
                let _ = tokio::fs::remove_file(&path)
                    .await
                    .debug_error(format!("removing partial download {path:?}"));
                return Err(e);
            },
        };
        file.flush().await?;

        let id = self.resources.track(Resource::Blob { path: path.clone() });
        info!(?path, written, "cached model");
        Ok(CachedModel { id, path, handoff })
    }

    /// Closes the machine and releases every local resource.  Idempotent.
    pub fn teardown(&self) {
        if self.torn_down.swap(true, Ordering::SeqCst) {
            return;
        }

        self.machine.close();
        let unstaged = self.uploads.clear();
        let released = self.resources.release_all();
        if let Some(dir) = self.cache_dir.lock().take() {
            let _ = dir.close().warn_error("failed to remove model cache directory");
        }
        debug!(unstaged, released, "session context torn down");
    }

    pub fn is_torn_down(&self) -> bool {
        self.torn_down.load(Ordering::SeqCst)
    }

    fn ensure_live(&self) -> Result<()> {
        if self.is_torn_down() {
            return Err(SessionError::InvalidTransition("session context was torn down".to_owned()));
        }
        Ok(())
    }

    fn cache_path(&self, file_name: &str) -> Result<PathBuf> {
        let mut dir = self.cache_dir.lock();
        if dir.is_none() {
            *dir = Some(tempfile::Builder::new().prefix("recon-models-").tempdir()?);
        }
        let dir = dir
            .as_ref()
            .ok_or_else(|| SessionError::Resource("model cache directory unavailable".to_owned()))?;
        Ok(dir.path().join(file_name))
    }
}

impl Drop for SessionContext {
    fn drop(&mut self) {
        self.teardown();
    }
}

//! Staging and uploading of an image batch.

use std::fmt::{Display, Formatter};
use std::path::Path;
use std::sync::Arc;

use bytes::Bytes;
use parking_lot::Mutex;
use progress_tracking::UploadProgressUpdater;
use recon_client::{ReconstructionClient, UploadPart};
use recon_types::SessionId;
use tracing::{info, warn};

use crate::errors::{Result, SessionError};
use crate::resources::{Resource, ResourceId, ResourceLifecycleManager};

/// Extensions the service accepts, with their content types.
const IMAGE_TYPES: &[(&str, &str)] = &[
    ("jpg", "image/jpeg"),
    ("jpeg", "image/jpeg"),
    ("png", "image/png"),
    ("tif", "image/tiff"),
    ("tiff", "image/tiff"),
];

const OCTET_STREAM: &str = "application/octet-stream";

/// A file picked by the user, not yet staged.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InputFile {
    pub name: String,
    pub content_type: String,
    pub data: Bytes,
}

impl InputFile {
    pub fn new(name: impl Into<String>, content_type: impl Into<String>, data: impl Into<Bytes>) -> Self {
        Self {
            name: name.into(),
            content_type: content_type.into(),
            data: data.into(),
        }
    }

    /// Reads a file from disk, inferring the content type from its extension.
    pub async fn from_path(path: impl AsRef<Path>) -> std::io::Result<Self> {
        let path = path.as_ref();
        let data = tokio::fs::read(path).await?;
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.to_string_lossy().into_owned());

        Ok(Self::new(name, content_type_for_path(path), data))
    }

    pub fn is_image(&self) -> bool {
        self.content_type.trim().to_ascii_lowercase().starts_with("image/")
    }

    pub fn len(&self) -> u64 {
        self.data.len() as u64
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

pub fn content_type_for_path(path: &Path) -> &'static str {
    let Some(ext) = path.extension().and_then(|e| e.to_str()) else {
        return OCTET_STREAM;
    };
    IMAGE_TYPES
        .iter()
        .find(|(e, _)| e.eq_ignore_ascii_case(ext))
        .map(|(_, ct)| *ct)
        .unwrap_or(OCTET_STREAM)
}

/// A staged image and the preview handle created for it.
#[derive(Clone, Debug)]
pub struct StagedFile {
    pub preview: ResourceId,
    pub file: InputFile,
}

/// Raised when `stage` dropped inputs that are not images.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StageWarning {
    pub skipped: Vec<String>,
}

impl Display for StageWarning {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} file(s) skipped, only images are accepted: {}", self.skipped.len(), self.skipped.join(", "))
    }
}

#[derive(Clone, Debug, Default)]
pub struct StageReport {
    /// Preview handles of the newly staged files, in input order.
    pub staged: Vec<ResourceId>,
    pub warning: Option<StageWarning>,
}

/// Holds the batch of images for one upload.
///
/// Staging appends to the batch; identical inputs are kept as separate entries, each
/// with its own preview handle.  Previews are released through the
/// [`ResourceLifecycleManager`] on `remove` and `clear`.
pub struct UploadCoordinator {
    staged: Mutex<Vec<StagedFile>>,
    resources: ResourceLifecycleManager,
    min_images: usize,
}

impl UploadCoordinator {
    pub const DEFAULT_MIN_IMAGES: usize = 3;

    pub fn new(resources: ResourceLifecycleManager, min_images: usize) -> Self {
        Self {
            staged: Mutex::new(Vec::new()),
            resources,
            min_images,
        }
    }

    pub fn stage(&self, files: impl IntoIterator<Item = InputFile>) -> StageReport {
        let mut report = StageReport::default();
        let mut skipped = Vec::new();
        let mut new_files = Vec::new();

        for file in files {
            if !file.is_image() {
                skipped.push(file.name);
                continue;
            }

            let preview = self.resources.track(Resource::Preview {
                name: file.name.clone(),
                size: file.len(),
            });
            report.staged.push(preview);
            new_files.push(StagedFile { preview, file });
        }

        self.staged.lock().extend(new_files);

        if !skipped.is_empty() {
            let warning = StageWarning { skipped };
            warn!("{warning}");
            report.warning = Some(warning);
        }

        report
    }

    /// Unstages one file and releases its preview.  Returns false for an unknown handle.
    pub fn remove(&self, preview: ResourceId) -> bool {
        let removed = {
            let mut staged = self.staged.lock();
            let before = staged.len();
            staged.retain(|f| f.preview != preview);
            before != staged.len()
        };

        if removed {
            self.resources.release(preview);
        }
        removed
    }

    /// Unstages everything, releasing each preview.  Returns the number of files removed.
    pub fn clear(&self) -> usize {
        let drained = std::mem::take(&mut *self.staged.lock());
        for f in &drained {
            self.resources.release(f.preview);
        }
        drained.len()
    }

    pub fn staged(&self) -> Vec<StagedFile> {
        self.staged.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.staged.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn total_bytes(&self) -> u64 {
        self.staged.lock().iter().map(|f| f.file.len()).sum()
    }

    pub fn min_images(&self) -> usize {
        self.min_images
    }

    pub fn validate(&self) -> Result<()> {
        let n = self.len();
        if n < self.min_images {
            return Err(SessionError::Validation(format!(
                "At least {} images are required for 3D reconstruction, {n} staged",
                self.min_images
            )));
        }
        Ok(())
    }

    /// Sends the staged batch as a single request and returns the new session id.
    pub async fn upload(
        &self,
        client: &dyn ReconstructionClient,
        progress: Arc<dyn UploadProgressUpdater>,
    ) -> Result<SessionId> {
        self.validate()?;

        let parts: Vec<UploadPart> = self
            .staged()
            .into_iter()
            .map(|f| UploadPart::new(f.file.name, f.file.content_type, f.file.data))
            .collect();
        let n_files = parts.len();

        let response = client.upload_images(parts, progress).await.map_err(SessionError::Upload)?;

        info!(session_id = %response.session_id, n_files, "batch uploaded");
        Ok(response.session_id)
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use super::*;

    #[test]
    fn test_content_type_from_extension() {
        assert_eq!(content_type_for_path(&PathBuf::from("a/IMG_001.JPG")), "image/jpeg");
        assert_eq!(content_type_for_path(&PathBuf::from("scan.tiff")), "image/tiff");
        assert_eq!(content_type_for_path(&PathBuf::from("scan.png")), "image/png");
        assert_eq!(content_type_for_path(&PathBuf::from("notes.txt")), OCTET_STREAM);
        assert_eq!(content_type_for_path(&PathBuf::from("Makefile")), OCTET_STREAM);
    }

    #[tokio::test]
    async fn test_from_path_reads_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("view.png");
        std::fs::write(&path, b"\x89PNG").unwrap();

        let file = InputFile::from_path(&path).await.unwrap();
        assert_eq!(file.name, "view.png");
        assert_eq!(file.content_type, "image/png");
        assert_eq!(file.len(), 4);
        assert!(file.is_image());

        assert!(InputFile::from_path(dir.path().join("missing.png")).await.is_err());
    }

    #[test]
    fn test_warning_lists_skipped_files() {
        let w = StageWarning {
            skipped: vec!["a.txt".to_owned(), "b.pdf".to_owned()],
        };
        assert_eq!(w.to_string(), "2 file(s) skipped, only images are accepted: a.txt, b.pdf");
    }
}

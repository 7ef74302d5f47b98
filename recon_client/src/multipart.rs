use std::sync::Arc;

use progress_tracking::upload_tracking::UploadProgressTracker;
use reqwest::multipart::{Form, Part};
use reqwest::Body;

use crate::error::Result;
use crate::interface::UploadPart;
use crate::progress_tracked_streams::{StreamProgressReporter, UploadProgressStream};

/// Form field the service reads the images from.
pub(crate) const UPLOAD_FIELD_NAME: &str = "files";

/// Builds the upload form.  Every part streams its bytes and reports them to `tracker`.
pub(crate) fn build_upload_form(parts: Vec<UploadPart>, tracker: &Arc<UploadProgressTracker>) -> Result<Form> {
    let mut form = Form::new();

    for upload_part in parts {
        let len = upload_part.len();

        let callback = {
            let tracker = tracker.clone();
            move |delta: u64, _completed: u64, _total: u64| tracker.register_bytes_sent(delta)
        };
        let reporter = StreamProgressReporter::new(len).with_progress_callback(Arc::new(callback));
        let stream =
            UploadProgressStream::wrap_bytes_as_stream(upload_part.data, UploadProgressStream::DEFAULT_BLOCK_SIZE, reporter);

        let part = Part::stream_with_length(Body::wrap_stream(stream), len)
            .file_name(upload_part.file_name)
            .mime_str(&upload_part.content_type)?;

        form = form.part(UPLOAD_FIELD_NAME, part);
    }

    Ok(form)
}

/// Total bytes of the batch, for progress accounting.
pub(crate) fn total_upload_bytes(parts: &[UploadPart]) -> u64 {
    parts.iter().map(UploadPart::len).sum()
}

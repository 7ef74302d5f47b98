use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};

use bytes::Bytes;
use futures::Stream;
use more_asserts::debug_assert_le;

/// Progress callback receiving (delta, completed, total) in bytes.
pub type ProgressCallback = Arc<dyn Fn(u64, u64, u64) + Send + Sync + 'static>;

/// Reports stream progress against a high-water mark, so a body that is rebuilt and
/// sent again only reports bytes beyond what was already reported.
#[derive(Clone)]
pub struct StreamProgressReporter {
    total: u64,
    bytes_reported: Arc<AtomicU64>,
    progress_callback: Option<ProgressCallback>,
}

impl StreamProgressReporter {
    pub fn new(total: u64) -> Self {
        Self {
            total,
            bytes_reported: Arc::new(AtomicU64::new(0)),
            progress_callback: None,
        }
    }

    pub fn with_progress_callback(mut self, callback: ProgressCallback) -> Self {
        self.progress_callback = Some(callback);
        self
    }

    pub fn report_progress(&self, new_completed: u64) {
        let old_completed = self.bytes_reported.fetch_max(new_completed, Ordering::Relaxed);

        if old_completed >= new_completed {
            return;
        }

        if let Some(cb) = self.progress_callback.as_ref() {
            cb(new_completed - old_completed, new_completed, self.total.max(new_completed));
        }
    }
}

/// Yields `data` in blocks of at most `block_size` bytes.
///
/// A block is counted as sent once the transport asks for the next one; the last block
/// is counted when the transport polls past the end, so a fully consumed stream always
/// reports its whole length.
pub struct UploadProgressStream {
    data: Bytes,
    block_size: usize,
    bytes_sent: usize,
    reporter: StreamProgressReporter,
}

impl Stream for UploadProgressStream {
    type Item = std::result::Result<Bytes, std::io::Error>;

    fn poll_next(mut self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        debug_assert_le!(self.bytes_sent, self.data.len());

        if self.bytes_sent != 0 {
            self.reporter.report_progress(self.bytes_sent as u64);
        }

        if self.bytes_sent == self.data.len() {
            return Poll::Ready(None);
        }

        let slice_start = self.bytes_sent;
        let slice_end = (self.bytes_sent + self.block_size).min(self.data.len());

        self.bytes_sent = slice_end;

        Poll::Ready(Some(Ok(self.data.slice(slice_start..slice_end))))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = (self.data.len() - self.bytes_sent).div_ceil(self.block_size);
        (remaining, Some(remaining))
    }
}

impl UploadProgressStream {
    pub const DEFAULT_BLOCK_SIZE: usize = 64 * 1024;

    pub fn wrap_bytes_as_stream(data: impl Into<Bytes>, block_size: usize, reporter: StreamProgressReporter) -> Self {
        Self {
            data: data.into(),
            block_size: block_size.max(1),
            bytes_sent: 0,
            reporter,
        }
    }

    pub fn len(&self) -> u64 {
        self.data.len() as u64
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

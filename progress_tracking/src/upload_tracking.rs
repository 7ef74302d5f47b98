use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use std::sync::Arc;

use more_asserts::debug_assert_le;
use tracing::debug;

use crate::{UploadProgress, UploadProgressUpdater};

/// Aggregates byte counts from every part of an upload batch into a single percentage.
///
/// Updates are forwarded only when the whole-number percentage goes up, so a consumer
/// never sees the value decrease or repeat, even if a body stream is restarted and
/// re-reports bytes it already sent.
#[derive(Debug)]
pub struct UploadProgressTracker {
    total_bytes: u64,
    bytes_completed: AtomicU64,
    last_reported_percent: AtomicU8,
    updater: Arc<dyn UploadProgressUpdater>,
}

impl UploadProgressTracker {
    pub fn new(total_bytes: u64, updater: Arc<dyn UploadProgressUpdater>) -> Arc<Self> {
        Arc::new(Self {
            total_bytes,
            bytes_completed: AtomicU64::new(0),
            last_reported_percent: AtomicU8::new(0),
            updater,
        })
    }

    pub fn total_bytes(&self) -> u64 {
        self.total_bytes
    }

    pub fn bytes_completed(&self) -> u64 {
        self.bytes_completed.load(Ordering::Relaxed)
    }

    /// Adds `increment` sent bytes.  The running count saturates at the batch total.
    pub fn register_bytes_sent(&self, increment: u64) {
        if increment == 0 {
            return;
        }

        let total = self.total_bytes;
        let previous = self
            .bytes_completed
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |v| Some(v.saturating_add(increment).min(total)))
            .unwrap_or(total);
        let completed = previous.saturating_add(increment).min(total);
        debug_assert_le!(completed, total);

        self.report(UploadProgress {
            bytes_completed: completed,
            total_bytes: total,
            bytes_completion_increment: completed - previous,
        });
    }

    /// Marks the batch fully sent, e.g. once the server has acknowledged the request.
    pub fn complete(&self) {
        let previous = self.bytes_completed.swap(self.total_bytes, Ordering::Relaxed);
        self.report(UploadProgress {
            bytes_completed: self.total_bytes,
            total_bytes: self.total_bytes,
            bytes_completion_increment: self.total_bytes.saturating_sub(previous),
        });
    }

    fn report(&self, update: UploadProgress) {
        let percent = update.percent();
        let old = self.last_reported_percent.fetch_max(percent, Ordering::Relaxed);

        if percent > old {
            debug!(percent, bytes = update.bytes_completed, total = update.total_bytes, "upload progress");
            self.updater.register_update(update);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use tracing_test::traced_test;

    use super::*;
    use crate::FnProgressUpdater;

    fn recording_tracker(total: u64) -> (Arc<UploadProgressTracker>, Arc<Mutex<Vec<u8>>>) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let updater = {
            let seen = seen.clone();
            FnProgressUpdater::new(move |u: UploadProgress| seen.lock().unwrap().push(u.percent()))
        };
        (UploadProgressTracker::new(total, updater), seen)
    }

    #[test]
    #[traced_test]
    fn test_reports_only_increasing_percentages() {
        let (tracker, seen) = recording_tracker(1000);

        tracker.register_bytes_sent(1); // 0%, nothing to report
        tracker.register_bytes_sent(250);
        tracker.register_bytes_sent(4); // still 25%
        tracker.register_bytes_sent(500);

        assert_eq!(*seen.lock().unwrap(), vec![25, 75]);
        assert_eq!(tracker.bytes_completed(), 755);
        assert!(logs_contain("percent=75"));
        assert!(!logs_contain("percent=0"));
    }

    #[test]
    fn test_overshoot_saturates_at_total() {
        let (tracker, seen) = recording_tracker(10);

        tracker.register_bytes_sent(8);
        tracker.register_bytes_sent(8);
        tracker.register_bytes_sent(8);

        assert_eq!(tracker.bytes_completed(), 10);
        assert_eq!(*seen.lock().unwrap(), vec![80, 100]);
    }

    #[test]
    fn test_complete_reaches_one_hundred_once() {
        let (tracker, seen) = recording_tracker(300);

        tracker.register_bytes_sent(100);
        tracker.complete();
        tracker.complete();

        assert_eq!(*seen.lock().unwrap(), vec![33, 100]);
    }

    #[test]
    fn test_empty_batch_reports_completion() {
        let (tracker, seen) = recording_tracker(0);
        tracker.complete();
        tracker.complete();
        assert_eq!(*seen.lock().unwrap(), vec![100]);
    }
}

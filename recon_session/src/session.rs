use std::fmt::{Display, Formatter};

use recon_types::{Method, Quality, RemoteStatus, ResultFile, ResultsResponse, SessionId, StatusResponse};

/// Where a session is in its lifecycle.  Only moves forward, except that a failed
/// upload drops back to `Uninitialized`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum SessionStatus {
    #[default]
    Uninitialized,
    Uploading,
    Uploaded,
    Processing,
    Completed,
    Failed,
}

impl SessionStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, SessionStatus::Completed | SessionStatus::Failed)
    }

    fn rank(&self) -> u8 {
        match self {
            SessionStatus::Uninitialized => 0,
            SessionStatus::Uploading => 1,
            SessionStatus::Uploaded => 2,
            SessionStatus::Processing => 3,
            SessionStatus::Completed | SessionStatus::Failed => 4,
        }
    }

    /// `None` for statuses the service could not determine.
    pub fn from_remote(status: RemoteStatus) -> Option<Self> {
        match status {
            RemoteStatus::Uploaded => Some(SessionStatus::Uploaded),
            RemoteStatus::Processing => Some(SessionStatus::Processing),
            RemoteStatus::Completed => Some(SessionStatus::Completed),
            RemoteStatus::Failed => Some(SessionStatus::Failed),
            RemoteStatus::Unknown => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SessionStatus::Uninitialized => "uninitialized",
            SessionStatus::Uploading => "uploading",
            SessionStatus::Uploaded => "uploaded",
            SessionStatus::Processing => "processing",
            SessionStatus::Completed => "completed",
            SessionStatus::Failed => "failed",
        }
    }
}

impl Display for SessionStatus {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Client-side view of one reconstruction job.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Session {
    pub session_id: Option<SessionId>,
    pub status: SessionStatus,
    pub quality: Quality,
    pub method: Method,
    /// Percentage in `[0, 100]`; never decreases while processing.
    pub progress: u8,
    pub elapsed_seconds: u64,
    /// Only non-empty once completed.
    pub result_files: Vec<ResultFile>,
    /// Only set once failed.
    pub error: Option<String>,
    pub num_images: Option<u32>,
    /// Server timestamp, seconds since the epoch.
    pub completed_at: Option<f64>,
}

impl Session {
    pub(crate) fn with_id(session_id: SessionId, status: SessionStatus) -> Self {
        Self {
            session_id: Some(session_id),
            status,
            ..Default::default()
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Moves to `next` unless that would go backwards.  Returns whether the status changed.
    pub(crate) fn advance(&mut self, next: SessionStatus) -> bool {
        if self.status.is_terminal() || next.rank() < self.status.rank() || next == self.status {
            return false;
        }

        self.status = next;
        match next {
            SessionStatus::Completed => {
                self.progress = 100;
                self.error = None;
            },
            SessionStatus::Failed => self.result_files.clear(),
            _ => {},
        }
        true
    }

    pub(crate) fn fail(&mut self, message: Option<String>) {
        if self.advance(SessionStatus::Failed) {
            self.error = Some(message.unwrap_or_else(|| "Reconstruction failed".to_owned()));
        }
    }

    /// Merges a poll response.  A still-running job reported as `uploaded` counts as processing.
    pub(crate) fn apply_status(&mut self, response: &StatusResponse) {
        if self.is_terminal() {
            return;
        }

        if let Some(elapsed) = response.elapsed_seconds() {
            self.elapsed_seconds = elapsed;
        }

        match SessionStatus::from_remote(response.status) {
            Some(SessionStatus::Failed) => self.fail(response.error.clone()),
            Some(SessionStatus::Completed) => {
                self.advance(SessionStatus::Completed);
                if let Some(files) = &response.files {
                    self.result_files = files.clone();
                }
            },
            Some(_) => {
                self.advance(SessionStatus::Processing);
                if let Some(progress) = response.clamped_progress() {
                    self.progress = self.progress.max(progress);
                }
            },
            None => {},
        }
    }

    /// Merges the results endpoint's view of the job.
    pub(crate) fn apply_results(&mut self, response: &ResultsResponse) {
        if let Some(quality) = response.quality {
            self.quality = quality;
        }
        if let Some(method) = response.method {
            self.method = method;
        }
        if response.num_images.is_some() {
            self.num_images = response.num_images;
        }
        if response.completed_at.is_some() {
            self.completed_at = response.completed_at;
        }

        match SessionStatus::from_remote(response.status) {
            Some(SessionStatus::Completed) => {
                self.advance(SessionStatus::Completed);
                if self.status == SessionStatus::Completed {
                    self.result_files = response.files.clone();
                }
            },
            Some(SessionStatus::Failed) => self.fail(response.error.clone()),
            Some(status) => {
                self.advance(status);
            },
            None => {},
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn status(status: RemoteStatus, progress: Option<f64>) -> StatusResponse {
        StatusResponse {
            status,
            progress,
            elapsed_time: None,
            error: None,
            files: None,
        }
    }

    fn processing() -> Session {
        Session::with_id(SessionId::from("abc"), SessionStatus::Processing)
    }

    #[test]
    fn test_progress_never_decreases() {
        let mut s = processing();
        s.apply_status(&status(RemoteStatus::Processing, Some(40.0)));
        assert_eq!(s.progress, 40);
        s.apply_status(&status(RemoteStatus::Processing, Some(25.0)));
        assert_eq!(s.progress, 40);
        s.apply_status(&status(RemoteStatus::Processing, None));
        assert_eq!(s.progress, 40);
        s.apply_status(&status(RemoteStatus::Processing, Some(250.0)));
        assert_eq!(s.progress, 100);
    }

    #[test]
    fn test_terminal_states_stick() {
        let mut s = processing();
        s.apply_status(&StatusResponse {
            error: Some("COLMAP crashed".to_owned()),
            ..status(RemoteStatus::Failed, None)
        });
        assert_eq!(s.status, SessionStatus::Failed);
        assert_eq!(s.error.as_deref(), Some("COLMAP crashed"));

        s.apply_status(&status(RemoteStatus::Processing, Some(90.0)));
        assert_eq!(s.status, SessionStatus::Failed);
        assert!(!s.advance(SessionStatus::Completed));
    }

    #[test]
    fn test_status_never_moves_backwards() {
        let mut s = processing();
        assert!(!s.advance(SessionStatus::Uploaded));
        s.apply_status(&status(RemoteStatus::Uploaded, None));
        assert_eq!(s.status, SessionStatus::Processing);
        s.apply_status(&status(RemoteStatus::Unknown, None));
        assert_eq!(s.status, SessionStatus::Processing);
    }

    #[test]
    fn test_completion_fills_files_and_progress() {
        let mut s = processing();
        s.apply_status(&StatusResponse {
            files: Some(vec![ResultFile {
                filename: "model.obj".to_owned(),
                download_url: "/api/download/abc/model.obj".to_owned(),
            }]),
            ..status(RemoteStatus::Completed, None)
        });
        assert_eq!(s.status, SessionStatus::Completed);
        assert_eq!(s.progress, 100);
        assert_eq!(s.result_files.len(), 1);
        assert!(s.error.is_none());
    }

    #[test]
    fn test_failed_without_message() {
        let mut s = processing();
        s.fail(None);
        assert_eq!(s.error.as_deref(), Some("Reconstruction failed"));
        assert!(s.result_files.is_empty());
    }
}

//! Wire types for the reconstruction service's HTTP API.

use std::fmt::{Display, Formatter};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Opaque identifier the service assigns on upload.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(String);

impl SessionId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for SessionId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for SessionId {
    fn from(value: &str) -> Self {
        Self(value.to_owned())
    }
}

impl From<String> for SessionId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("invalid {kind} {value:?}, expected one of: {expected}")]
pub struct ParseEnumError {
    kind: &'static str,
    value: String,
    expected: &'static str,
}

/// Job status as reported by the service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RemoteStatus {
    Uploaded,
    Processing,
    Completed,
    Failed,
    /// Anything else, including the service's own `"unknown"` for unreadable metadata.
    #[serde(other)]
    Unknown,
}

impl RemoteStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, RemoteStatus::Completed | RemoteStatus::Failed)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RemoteStatus::Uploaded => "uploaded",
            RemoteStatus::Processing => "processing",
            RemoteStatus::Completed => "completed",
            RemoteStatus::Failed => "failed",
            RemoteStatus::Unknown => "unknown",
        }
    }
}

impl Display for RemoteStatus {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Quality {
    Low,
    #[default]
    Medium,
    High,
}

impl Quality {
    pub fn as_str(&self) -> &'static str {
        match self {
            Quality::Low => "low",
            Quality::Medium => "medium",
            Quality::High => "high",
        }
    }
}

impl Display for Quality {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Quality {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "low" => Ok(Quality::Low),
            "medium" => Ok(Quality::Medium),
            "high" => Ok(Quality::High),
            _ => Err(ParseEnumError {
                kind: "quality",
                value: s.to_owned(),
                expected: "low, medium, high",
            }),
        }
    }
}

/// Reconstruction pipeline.  The service calls the neural pipeline `custom`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Method {
    #[default]
    #[serde(rename = "colmap")]
    Colmap,
    #[serde(rename = "openmvs")]
    OpenMvs,
    #[serde(rename = "custom", alias = "neural")]
    Neural,
}

impl Method {
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Colmap => "colmap",
            Method::OpenMvs => "openmvs",
            Method::Neural => "neural",
        }
    }
}

impl Display for Method {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Method {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "colmap" => Ok(Method::Colmap),
            "openmvs" => Ok(Method::OpenMvs),
            "neural" | "custom" => Ok(Method::Neural),
            _ => Err(ParseEnumError {
                kind: "method",
                value: s.to_owned(),
                expected: "colmap, openmvs, neural",
            }),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StartRequest {
    pub quality: Quality,
    pub method: Method,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UploadResponse {
    pub session_id: SessionId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StartResponse {
    pub status: RemoteStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<SessionId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// A downloadable artifact of a completed job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResultFile {
    pub filename: String,
    #[serde(rename = "url")]
    pub download_url: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusResponse {
    pub status: RemoteStatus,
    /// Percentage; the service does not promise a range or monotonicity.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub progress: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub elapsed_time: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub files: Option<Vec<ResultFile>>,
}

impl StatusResponse {
    /// Progress clamped to `[0, 100]` and rounded down.
    pub fn clamped_progress(&self) -> Option<u8> {
        self.progress
            .filter(|p| p.is_finite())
            .map(|p| p.clamp(0.0, 100.0).floor() as u8)
    }

    pub fn elapsed_seconds(&self) -> Option<u64> {
        self.elapsed_time.filter(|t| t.is_finite()).map(|t| t.max(0.0) as u64)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultsResponse {
    pub status: RemoteStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quality: Option<Quality>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub method: Option<Method>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub num_images: Option<u32>,
    #[serde(default)]
    pub files: Vec<ResultFile>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelInfo {
    pub model_url: String,
    pub model_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_name: Option<String>,
}

/// Answer of the service's liveness endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<f64>,
}

impl HealthResponse {
    pub fn is_ok(&self) -> bool {
        self.status.eq_ignore_ascii_case("ok")
    }
}

/// Body the service sends with non-2xx responses.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct ErrorBody {
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub details: Option<String>,
}

impl ErrorBody {
    pub fn message(&self) -> Option<String> {
        match (&self.error, &self.details) {
            (Some(e), Some(d)) => Some(format!("{e}: {d}")),
            (Some(e), None) => Some(e.clone()),
            (None, Some(d)) => Some(d.clone()),
            (None, None) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_health_response() {
        let health: HealthResponse = serde_json::from_value(json!({"status": "ok", "timestamp": 1.5})).unwrap();
        assert!(health.is_ok());
        let health: HealthResponse = serde_json::from_value(json!({"status": "degraded"})).unwrap();
        assert!(!health.is_ok());
        assert_eq!(health.timestamp, None);
    }

    #[test]
    fn test_neural_method_uses_service_name() {
        let req = StartRequest {
            quality: Quality::High,
            method: Method::Neural,
        };
        assert_eq!(serde_json::to_value(req).unwrap(), json!({"quality": "high", "method": "custom"}));

        let m: Method = serde_json::from_value(json!("neural")).unwrap();
        assert_eq!(m, Method::Neural);
        let m: Method = serde_json::from_value(json!("custom")).unwrap();
        assert_eq!(m, Method::Neural);
        assert_eq!("OpenMVS".parse::<Method>().unwrap(), Method::OpenMvs);
        assert!("poisson".parse::<Method>().is_err());
    }

    #[test]
    fn test_unknown_status_decodes() {
        let s: StatusResponse =
            serde_json::from_value(json!({"session_id": "x", "status": "unknown", "error": "Metadata not found"}))
                .unwrap();
        assert_eq!(s.status, RemoteStatus::Unknown);
        assert!(!s.status.is_terminal());
        assert_eq!(s.error.as_deref(), Some("Metadata not found"));
    }

    #[test]
    fn test_status_progress_is_clamped() {
        let s: StatusResponse =
            serde_json::from_value(json!({"status": "processing", "progress": 140.7, "elapsed_time": 12.9})).unwrap();
        assert_eq!(s.clamped_progress(), Some(100));
        assert_eq!(s.elapsed_seconds(), Some(12));

        let s: StatusResponse = serde_json::from_value(json!({"status": "processing", "progress": -3})).unwrap();
        assert_eq!(s.clamped_progress(), Some(0));
        assert_eq!(s.elapsed_seconds(), None);
    }

    #[test]
    fn test_results_with_files() {
        let r: ResultsResponse = serde_json::from_value(json!({
            "session_id": "abc",
            "status": "completed",
            "quality": "medium",
            "method": "custom",
            "num_images": 12,
            "timestamp": 1700000000.25,
            "completed_at": 1700000300.5,
            "files": [{"filename": "model.obj", "url": "/api/download/abc/model.obj"}]
        }))
        .unwrap();

        assert_eq!(r.status, RemoteStatus::Completed);
        assert_eq!(r.method, Some(Method::Neural));
        assert_eq!(r.num_images, Some(12));
        assert_eq!(r.files.len(), 1);
        assert_eq!(r.files[0].download_url, "/api/download/abc/model.obj");
    }

    #[test]
    fn test_error_body_message() {
        let body: ErrorBody =
            serde_json::from_value(json!({"error": "Internal server error", "details": "disk full"})).unwrap();
        assert_eq!(body.message().as_deref(), Some("Internal server error: disk full"));
        assert_eq!(ErrorBody::default().message(), None);
    }
}

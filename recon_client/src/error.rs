use thiserror::Error;

#[non_exhaustive]
#[derive(Error, Debug)]
pub enum ReconClientError {
    #[error("Reqwest Error: {0}")]
    Reqwest(#[from] reqwest::Error),

    #[error("ReqwestMiddleware Error: {0}")]
    ReqwestMiddleware(#[from] reqwest_middleware::Error),

    /// The service answered with a non-2xx status.
    #[error("Service returned {status}: {message}")]
    Status { status: u16, message: String },

    #[error("Invalid JSON in response: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid URL: {0}")]
    Url(#[from] url::ParseError),

    #[error("IO Error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Unexpected response: {0}")]
    UnexpectedResponse(String),
}

impl ReconClientError {
    pub fn is_timeout(&self) -> bool {
        match self {
            ReconClientError::Reqwest(e) => e.is_timeout(),
            ReconClientError::ReqwestMiddleware(reqwest_middleware::Error::Reqwest(e)) => e.is_timeout(),
            _ => false,
        }
    }

    /// HTTP status code, when the service answered at all.
    pub fn status_code(&self) -> Option<u16> {
        match self {
            ReconClientError::Status { status, .. } => Some(*status),
            ReconClientError::Reqwest(e) => e.status().map(|s| s.as_u16()),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, ReconClientError>;

impl PartialEq for ReconClientError {
    fn eq(&self, other: &ReconClientError) -> bool {
        match (self, other) {
            (
                ReconClientError::Status { status: a, message: m1 },
                ReconClientError::Status { status: b, message: m2 },
            ) => a == b && m1 == m2,
            (ReconClientError::UnexpectedResponse(a), ReconClientError::UnexpectedResponse(b)) => a == b,
            (e1, e2) => std::mem::discriminant(e1) == std::mem::discriminant(e2),
        }
    }
}

use recon_client::ReconClientError;
use thiserror::Error;

/// Errors surfaced by session operations.  Poll failures never reach callers; they are
/// recorded on the [`crate::PollCycle`] instead.
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum SessionError {
    /// Bad local input; nothing was sent.
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Upload failed: {0}")]
    Upload(#[source] ReconClientError),

    #[error("Failed to start reconstruction: {0}")]
    Start(#[source] ReconClientError),

    #[error("Status check failed: {0}")]
    Poll(#[source] ReconClientError),

    /// The service reported the job itself as failed.
    #[error("Reconstruction failed: {0}")]
    RemoteFailure(String),

    /// A model or result was requested before it exists.
    #[error("Resource not available: {0}")]
    Resource(String),

    #[error("{0} is already in flight")]
    AlreadyInFlight(&'static str),

    #[error("Invalid transition: {0}")]
    InvalidTransition(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Client error: {0}")]
    Client(#[from] ReconClientError),
}

pub type Result<T> = std::result::Result<T, SessionError>;

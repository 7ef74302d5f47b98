mod error;
mod http_client;
pub mod interface;
mod multipart;
mod progress_tracked_streams;
mod remote_client;
pub mod testing_utils;

pub use error::{ReconClientError, Result};
pub use http_client::build_http_client;
pub use interface::{ReconstructionClient, UploadPart};
pub use progress_tracked_streams::{ProgressCallback, StreamProgressReporter, UploadProgressStream};
pub use remote_client::RemoteClient;

mod progress_info;
mod update_interfaces;
pub mod upload_tracking;

pub use progress_info::UploadProgress;
pub use update_interfaces::{FnProgressUpdater, NoOpProgressUpdater, UploadProgressUpdater};

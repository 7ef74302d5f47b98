//! Session lifecycle orchestration for the reconstruction service.
//!
//! A [`SessionContext`] bundles the pieces one view needs: an [`UploadCoordinator`] that stages
//! images, a [`SessionStateMachine`] that drives the remote job and polls it, and a
//! [`ResourceLifecycleManager`] that releases every local handle when the view goes away.

mod context;
mod errors;
mod events;
pub mod polling;
mod render_handoff;
pub mod resources;
mod session;
mod state_machine;
pub mod upload;

pub use context::{CachedModel, SessionContext};
pub use errors::{Result, SessionError};
pub use events::{Listener, Notice, NoticeLevel, SessionEvent, Subscription};
pub use polling::{PollControl, PollCycle, PollSchedule, PollingScheduler};
pub use render_handoff::{resolve_model_url, RenderHandoff};
pub use resources::{FsResourceReleaser, Resource, ResourceId, ResourceLifecycleManager, ResourceReleaser};
pub use session::{Session, SessionStatus};
pub use state_machine::SessionStateMachine;
pub use upload::{InputFile, StageReport, StageWarning, StagedFile, UploadCoordinator};

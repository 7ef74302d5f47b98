use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use error_printer::ErrorPrinter;
use parking_lot::Mutex;
use progress_tracking::{FnProgressUpdater, UploadProgress};
use recon_client::ReconstructionClient;
use recon_config::ReconConfig;
use recon_types::{Method, Quality, RemoteStatus, SessionId, StartRequest};
use tokio::io::AsyncWrite;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::errors::{Result, SessionError};
use crate::events::{Listener, ListenerRegistry, Notice, NoticeLevel, SessionEvent, Subscription};
use crate::polling::{PollControl, PollCycle, PollSchedule, PollingScheduler};
use crate::render_handoff::RenderHandoff;
use crate::session::{Session, SessionStatus};
use crate::upload::UploadCoordinator;

/// Drives one reconstruction session from upload to a terminal status.
///
/// All changes to the [`Session`] happen here, under the listener dispatch lock, and each
/// change is delivered to every subscriber before the next one is applied.  An epoch
/// counter is bumped whenever the session is discarded or replaced; results of calls that
/// were started under an older epoch are dropped.
///
/// # Cloning
///
/// Cloning is cheap and every clone drives the same session.
#[derive(Clone)]
pub struct SessionStateMachine {
    inner: Arc<MachineInner>,
}

struct MachineInner {
    client: Arc<dyn ReconstructionClient>,
    schedule: PollSchedule,
    state: Mutex<Session>,
    epoch: AtomicU64,
    upload_in_flight: AtomicBool,
    start_in_flight: AtomicBool,
    closed: AtomicBool,
    listeners: Arc<ListenerRegistry>,
    scheduler: PollingScheduler,
    watch_tx: watch::Sender<Session>,
    /// Epoch whose terminal handling (results fetch, notices) has finished.
    settled_tx: watch::Sender<u64>,
}

/// Clears a single-flight flag when dropped.
struct InFlightGuard<'a>(&'a AtomicBool);

impl<'a> InFlightGuard<'a> {
    fn acquire(flag: &'a AtomicBool, what: &'static str) -> Result<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map_err(|_| SessionError::AlreadyInFlight(what))?;
        Ok(Self(flag))
    }
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl SessionStateMachine {
    pub fn new(client: Arc<dyn ReconstructionClient>, schedule: PollSchedule) -> Self {
        let (watch_tx, _) = watch::channel(Session::default());
        let (settled_tx, _) = watch::channel(0);
        Self {
            inner: Arc::new(MachineInner {
                client,
                schedule,
                state: Mutex::new(Session::default()),
                epoch: AtomicU64::new(0),
                upload_in_flight: AtomicBool::new(false),
                start_in_flight: AtomicBool::new(false),
                closed: AtomicBool::new(false),
                listeners: Arc::new(ListenerRegistry::default()),
                scheduler: PollingScheduler::new(),
                watch_tx,
                settled_tx,
            }),
        }
    }

    pub fn from_config(client: Arc<dyn ReconstructionClient>, config: &ReconConfig) -> Self {
        Self::new(client, PollSchedule::from_config(&config.session))
    }

    pub fn client(&self) -> &Arc<dyn ReconstructionClient> {
        &self.inner.client
    }

    pub fn snapshot(&self) -> Session {
        self.inner.state.lock().clone()
    }

    /// Registers `listener` for every subsequent event.
    pub fn subscribe(&self, listener: impl Fn(&SessionEvent) + Send + Sync + 'static) -> Subscription {
        let listener: Listener = Arc::new(listener);
        self.inner.listeners.subscribe(listener)
    }

    /// Latest snapshot as a watch channel, for async consumers that only need the current state.
    pub fn watch(&self) -> watch::Receiver<Session> {
        self.inner.watch_tx.subscribe()
    }

    /// Uploads the coordinator's staged batch as a new session.
    ///
    /// Validation failures leave the state untouched.  A transport failure returns
    /// [`SessionError::Upload`] and drops the session back to `Uninitialized`.
    pub async fn upload(&self, coordinator: &UploadCoordinator) -> Result<SessionId> {
        self.ensure_open()?;
        let _guard = InFlightGuard::acquire(&self.inner.upload_in_flight, "an upload")?;
        coordinator.validate()?;

        let epoch = self.inner.replace_session(Session {
            status: SessionStatus::Uploading,
            ..Default::default()
        });

        let progress = {
            let weak = Arc::downgrade(&self.inner);
            FnProgressUpdater::new(move |update: UploadProgress| {
                if let Some(inner) = weak.upgrade() {
                    inner.emit_upload_progress(epoch, update.percent());
                }
            })
        };

        let result = coordinator.upload(self.inner.client.as_ref(), progress).await;

        match result {
            Ok(session_id) => {
                let n_images = coordinator.len() as u32;
                let applied = self.inner.transition_if(epoch, |s| {
                    s.session_id = Some(session_id.clone());
                    s.num_images = Some(n_images);
                    s.advance(SessionStatus::Uploaded);
                });
                if applied.is_none() {
                    // Nobody else knows this id, so the remote session would be orphaned.
                    self.inner.spawn_remote_delete(session_id);
                    return Err(SessionError::InvalidTransition("session was discarded during upload".to_owned()));
                }
                self.inner
                    .notify(NoticeLevel::Success, format!("Uploaded {n_images} images, session {session_id}"));
                Ok(session_id)
            },
            Err(e) => {
                warn!("{e}");
                let reverted = self.inner.transition_if(epoch, |s| *s = Session::default());
                if reverted.is_some() {
                    self.inner.notify(NoticeLevel::Error, e.to_string());
                }
                Err(e)
            },
        }
    }

    /// Starts the reconstruction job for `session_id` and returns the status it reports.
    ///
    /// A different id than the current one replaces the current session.  Quality and
    /// method are fixed from here on.  Immediate `processing` (or queued `uploaded`) starts
    /// polling; an immediate terminal status is applied without polling.  A transport
    /// failure leaves the session `uploaded` so the call can be retried.
    pub async fn start(&self, session_id: SessionId, quality: Quality, method: Method) -> Result<SessionStatus> {
        self.ensure_open()?;
        let _guard = InFlightGuard::acquire(&self.inner.start_in_flight, "a start request")?;

        let epoch = {
            let _dispatch = self.inner.listeners.dispatch_lock();
            let current = self.snapshot();

            if current.session_id.as_ref() == Some(&session_id) {
                if current.status != SessionStatus::Uploaded {
                    return Err(SessionError::InvalidTransition(format!(
                        "cannot start session {session_id} while {}",
                        current.status
                    )));
                }
                self.inner.transition(|s| {
                    s.quality = quality;
                    s.method = method;
                });
                self.inner.epoch()
            } else {
                if current.status == SessionStatus::Uploading {
                    return Err(SessionError::AlreadyInFlight("an upload"));
                }
                self.inner.replace_session(Session {
                    quality,
                    method,
                    ..Session::with_id(session_id.clone(), SessionStatus::Uploaded)
                })
            }
        };

        info!(%session_id, %quality, %method, "starting reconstruction");
        let response = self
            .inner
            .client
            .start_reconstruction(&session_id, StartRequest { quality, method })
            .await;

        if self.inner.epoch() != epoch {
            return Err(SessionError::InvalidTransition(format!("session {session_id} was discarded while starting")));
        }

        let response = match response {
            Ok(r) => r,
            Err(e) => {
                warn!(%session_id, "start failed: {e}");
                self.inner
                    .notify(NoticeLevel::Error, format!("Failed to start reconstruction: {e}"));
                return Err(SessionError::Start(e));
            },
        };

        let status = match response.status {
            RemoteStatus::Completed => {
                self.inner.transition_if(epoch, |s| s.advance(SessionStatus::Completed));
                self.inner.fetch_results_once(epoch, &session_id).await;
                SessionStatus::Completed
            },
            RemoteStatus::Failed => {
                let message = response.error.or(response.message);
                self.inner.transition_if(epoch, |s| s.fail(message));
                self.inner.fetch_results_once(epoch, &session_id).await;
                SessionStatus::Failed
            },
            RemoteStatus::Processing | RemoteStatus::Uploaded | RemoteStatus::Unknown => {
                self.inner.transition_if(epoch, |s| s.advance(SessionStatus::Processing));
                if !MachineInner::start_polling(&self.inner, epoch, session_id.clone()) {
                    return Err(SessionError::InvalidTransition(format!(
                        "session {session_id} was discarded while starting"
                    )));
                }
                self.inner.notify(NoticeLevel::Info, "Reconstruction started");
                SessionStatus::Processing
            },
        };

        Ok(status)
    }

    /// Re-attaches to an existing server-side session and resumes polling if it is still running.
    pub async fn resume(&self, session_id: SessionId) -> Result<SessionStatus> {
        self.ensure_open()?;
        let epoch = self
            .inner
            .replace_session(Session::with_id(session_id.clone(), SessionStatus::Uninitialized));

        let results = match self.inner.client.get_results(&session_id).await {
            Ok(r) => r,
            Err(e) => {
                self.inner.transition_if(epoch, |s| *s = Session::default());
                return Err(SessionError::Client(e));
            },
        };

        let status = self
            .inner
            .transition_if(epoch, |s| {
                s.apply_results(&results);
                if s.status == SessionStatus::Uninitialized {
                    // The service knows the id but not what happened to it yet.
                    s.advance(SessionStatus::Uploaded);
                }
                s.status
            })
            .ok_or_else(|| SessionError::InvalidTransition(format!("session {session_id} was discarded while resuming")))?;

        info!(%session_id, %status, "resumed session");
        if status == SessionStatus::Processing {
            if !MachineInner::start_polling(&self.inner, epoch, session_id.clone()) {
                return Err(SessionError::InvalidTransition(format!("session {session_id} was discarded while resuming")));
            }
        } else if status.is_terminal() {
            self.inner.mark_settled(epoch);
        }
        Ok(status)
    }

    /// Stops polling.  Safe to call at any time, including from a listener.
    pub fn stop_polling(&self) {
        self.inner.scheduler.stop_polling();
    }

    pub fn is_polling(&self) -> bool {
        self.inner.scheduler.is_running()
    }

    pub fn last_poll_cycle(&self) -> Option<PollCycle> {
        self.inner.scheduler.last_cycle()
    }

    /// Discards the session locally right away and asks the service to delete it in the
    /// background.  The remote outcome is only logged.  Returns the background task, if one
    /// was spawned.
    pub fn delete(&self) -> Option<JoinHandle<()>> {
        let previous = {
            let _dispatch = self.inner.listeners.dispatch_lock();
            let previous = self.snapshot().session_id;
            self.inner.replace_session(Session::default());
            previous
        };

        self.inner.spawn_remote_delete(previous?)
    }

    /// Discards the session for good, without contacting the service.  Polling stops,
    /// in-flight calls are invalidated and every later operation fails.  Idempotent.
    pub fn close(&self) {
        if self.inner.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        self.inner.replace_session(Session::default());
        debug!("session machine closed");
    }

    pub fn is_closed(&self) -> bool {
        self.inner.is_closed()
    }

    /// Resolves once the session reaches a terminal status and its results have been
    /// fetched.  Fails with [`SessionError::RemoteFailure`] when the job failed, and with
    /// [`SessionError::InvalidTransition`] when the session is discarded while waiting.
    pub async fn wait_for_terminal(&self) -> Result<Session> {
        let mut state = self.watch();
        let mut settled = self.inner.settled_tx.subscribe();

        let epoch = loop {
            if self.inner.is_closed() {
                return Err(discarded());
            }
            let epoch = self.inner.epoch();
            if state.borrow_and_update().is_terminal() {
                break epoch;
            }
            state.changed().await.map_err(|_| discarded())?;
        };

        while *settled.borrow_and_update() != epoch {
            if self.inner.epoch() != epoch {
                return Err(discarded());
            }
            settled.changed().await.map_err(|_| discarded())?;
        }

        let session = self.snapshot();
        match session.status {
            SessionStatus::Completed => Ok(session),
            SessionStatus::Failed => Err(SessionError::RemoteFailure(
                session.error.unwrap_or_else(|| "Reconstruction failed".to_owned()),
            )),
            _ => Err(discarded()),
        }
    }

    /// Fetches model info and builds the handoff for the renderer.  Only valid once completed.
    pub async fn render_handoff(&self) -> Result<RenderHandoff> {
        let session_id = self.completed_session_id()?;
        let info = self.inner.client.get_model_info(&session_id).await?;
        let handoff = RenderHandoff::resolve(self.inner.client.endpoint(), &info)?;
        debug!(%session_id, model_url = %handoff.model_url(), "render handoff ready");
        Ok(handoff)
    }

    /// Streams the zip bundle of all result files into `writer`.
    pub async fn download_bundle(&self, writer: &mut (dyn AsyncWrite + Unpin + Send)) -> Result<u64> {
        let session_id = self.completed_session_id()?;
        Ok(self.inner.client.download_zip(&session_id, writer).await?)
    }

    /// Streams one result file into `writer`.
    pub async fn download_file(&self, filename: &str, writer: &mut (dyn AsyncWrite + Unpin + Send)) -> Result<u64> {
        let session_id = self.completed_session_id()?;
        Ok(self.inner.client.download_file(&session_id, filename, writer).await?)
    }

    fn ensure_open(&self) -> Result<()> {
        if self.inner.is_closed() {
            return Err(SessionError::InvalidTransition("session machine was closed".to_owned()));
        }
        Ok(())
    }

    fn completed_session_id(&self) -> Result<SessionId> {
        let s = self.snapshot();
        match (s.status, s.session_id) {
            (SessionStatus::Completed, Some(id)) => Ok(id),
            (status, _) => Err(SessionError::Resource(format!("session is {status}, results are not ready"))),
        }
    }
}

fn discarded() -> SessionError {
    SessionError::InvalidTransition("session was discarded".to_owned())
}

impl MachineInner {
    fn epoch(&self) -> u64 {
        self.epoch.load(Ordering::SeqCst)
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Applies `f` and notifies subscribers, all under the dispatch lock.
    fn transition<R>(&self, f: impl FnOnce(&mut Session) -> R) -> R {
        let _dispatch = self.listeners.dispatch_lock();
        let (r, snapshot) = {
            let mut state = self.state.lock();
            let r = f(&mut state);
            (r, state.clone())
        };
        self.watch_tx.send_replace(snapshot.clone());
        self.listeners.emit(&SessionEvent::Changed(snapshot));
        r
    }

    /// Like [`Self::transition`], but only while `epoch` is current.
    fn transition_if<R>(&self, epoch: u64, f: impl FnOnce(&mut Session) -> R) -> Option<R> {
        let _dispatch = self.listeners.dispatch_lock();
        (self.epoch() == epoch).then(|| self.transition(f))
    }

    /// Stops polling, invalidates in-flight calls and installs `session`.  Returns the new epoch.
    fn replace_session(&self, session: Session) -> u64 {
        let _dispatch = self.listeners.dispatch_lock();
        self.scheduler.stop_polling();
        let epoch = self.epoch.fetch_add(1, Ordering::SeqCst) + 1;
        self.transition(|s| *s = session);
        // Wakes anyone waiting on the previous session.
        self.settled_tx.send_replace(0);
        epoch
    }

    fn mark_settled(&self, epoch: u64) {
        let _dispatch = self.listeners.dispatch_lock();
        if self.epoch() == epoch {
            self.settled_tx.send_replace(epoch);
        }
    }

    fn notify(&self, level: NoticeLevel, message: impl Into<String>) {
        self.listeners.emit(&SessionEvent::Notice(Notice::new(level, message)));
    }

    fn notify_failure(&self) {
        let message = self.state.lock().error.clone().unwrap_or_default();
        self.notify(NoticeLevel::Error, format!("Reconstruction failed: {message}"));
    }

    fn emit_upload_progress(&self, epoch: u64, percent: u8) {
        let _dispatch = self.listeners.dispatch_lock();
        if self.epoch() == epoch && self.state.lock().status == SessionStatus::Uploading {
            self.listeners.emit(&SessionEvent::UploadProgress(percent));
        }
    }

    fn spawn_remote_delete(&self, session_id: SessionId) -> Option<JoinHandle<()>> {
        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            warn!(%session_id, "no runtime available, skipping remote delete");
            return None;
        };

        let client = self.client.clone();
        Some(handle.spawn(async move {
            let _ = client
                .delete_session(&session_id)
                .await
                .info_error(format!("remote delete of session {session_id} failed"));
        }))
    }

    /// Arms polling for `session_id` unless `epoch` is stale or the machine is closed.
    /// Returns whether a run was started.
    fn start_polling(this: &Arc<Self>, epoch: u64, session_id: SessionId) -> bool {
        let _dispatch = this.listeners.dispatch_lock();
        if this.is_closed() || this.epoch() != epoch {
            return false;
        }

        let weak: Weak<Self> = Arc::downgrade(this);
        let id = session_id.clone();
        this.scheduler.start_polling(session_id, this.schedule, move |control| {
            let weak = weak.clone();
            let id = id.clone();
            async move {
                match weak.upgrade() {
                    Some(inner) => inner.poll_once(control, epoch, id).await,
                    None => {
                        control.stop();
                        Ok(())
                    },
                }
            }
        });
        true
    }

    /// One poll cycle: fetch, merge, notify, and on a terminal status stop and fetch results.
    ///
    /// The results fetch runs on its own task so that stopping the poll loop (which aborts
    /// the loop's task) cannot cancel it.
    async fn poll_once(
        self: Arc<Self>,
        control: PollControl,
        epoch: u64,
        session_id: SessionId,
    ) -> std::result::Result<(), String> {
        let response = self.client.get_status(&session_id).await;

        if !control.is_alive() || self.epoch() != epoch {
            return Ok(());
        }

        let status = match response {
            Ok(status) => status,
            Err(e) => {
                let error = SessionError::Poll(e);
                warn!(%session_id, "{error}");
                self.notify(NoticeLevel::Warning, "Failed to check status, retrying");
                return Err(error.to_string());
            },
        };

        let terminal = {
            let _dispatch = self.listeners.dispatch_lock();
            if !control.is_alive() || self.epoch() != epoch {
                return Ok(());
            }
            self.transition(|s| {
                s.apply_status(&status);
                s.status.is_terminal()
            })
        };

        if terminal {
            control.stop();
            tokio::spawn(async move { self.fetch_results_once(epoch, &session_id).await });
        }
        Ok(())
    }

    /// Populates result files and metadata after a terminal status, and raises the matching notice.
    async fn fetch_results_once(&self, epoch: u64, session_id: &SessionId) {
        let status = self.state.lock().status;
        if !status.is_terminal() {
            return;
        }

        match self.client.get_results(session_id).await {
            Ok(results) => {
                self.transition_if(epoch, |s| s.apply_results(&results));
            },
            Err(e) => warn!(%session_id, "failed to fetch results: {e}"),
        }

        if self.epoch() != epoch {
            return;
        }
        match status {
            SessionStatus::Completed => self.notify(NoticeLevel::Success, "3D model is ready"),
            SessionStatus::Failed => self.notify_failure(),
            _ => {},
        }
        self.mark_settled(epoch);
    }
}

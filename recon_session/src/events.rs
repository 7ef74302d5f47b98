use std::fmt::{Display, Formatter};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::{Mutex, ReentrantMutex, ReentrantMutexGuard};

use crate::session::Session;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NoticeLevel {
    Info,
    Success,
    Warning,
    Error,
}

/// A user-facing message.  The presentation layer decides how to show it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Notice {
    pub level: NoticeLevel,
    pub message: String,
}

impl Notice {
    pub fn new(level: NoticeLevel, message: impl Into<String>) -> Self {
        Self {
            level,
            message: message.into(),
        }
    }
}

impl Display for Notice {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.message)
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum SessionEvent {
    /// The session changed; carries the snapshot after the change.
    Changed(Session),
    /// Upload percentage of the batch in flight.
    UploadProgress(u8),
    Notice(Notice),
}

/// Called synchronously for every event.  Listeners may call back into the state machine.
pub type Listener = Arc<dyn Fn(&SessionEvent) + Send + Sync>;

/// Keeps a listener registered.  Dropping it (or calling [`Subscription::unsubscribe`])
/// removes the listener.
#[must_use = "dropping a Subscription unsubscribes the listener"]
pub struct Subscription {
    id: u64,
    registry: Weak<ListenerRegistry>,
}

impl Subscription {
    pub fn unsubscribe(self) {}
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(registry) = self.registry.upgrade() {
            registry.remove(self.id);
        }
    }
}

/// Listener list plus the dispatch lock that serializes every state change and its
/// delivery.  The lock is re-entrant so a listener running on the dispatching thread can
/// call back into the state machine.
#[derive(Default)]
pub(crate) struct ListenerRegistry {
    next_id: AtomicU64,
    listeners: Mutex<Vec<(u64, Listener)>>,
    dispatch: ReentrantMutex<()>,
}

impl ListenerRegistry {
    pub(crate) fn subscribe(self: &Arc<Self>, listener: Listener) -> Subscription {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.listeners.lock().push((id, listener));
        Subscription {
            id,
            registry: Arc::downgrade(self),
        }
    }

    fn remove(&self, id: u64) {
        self.listeners.lock().retain(|(i, _)| *i != id);
    }

    pub(crate) fn dispatch_lock(&self) -> ReentrantMutexGuard<'_, ()> {
        self.dispatch.lock()
    }

    /// Delivers `event` to every listener registered when delivery starts.
    pub(crate) fn emit(&self, event: &SessionEvent) {
        let _dispatch = self.dispatch.lock();
        let listeners: Vec<Listener> = self.listeners.lock().iter().map(|(_, l)| l.clone()).collect();
        for listener in listeners {
            listener(event);
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.listeners.lock().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn recorder(registry: &Arc<ListenerRegistry>) -> (Subscription, Arc<Mutex<Vec<SessionEvent>>>) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sub = {
            let seen = seen.clone();
            registry.subscribe(Arc::new(move |e: &SessionEvent| seen.lock().push(e.clone())))
        };
        (sub, seen)
    }

    #[test]
    fn test_drop_unsubscribes() {
        let registry = Arc::new(ListenerRegistry::default());
        let (sub, seen) = recorder(&registry);

        registry.emit(&SessionEvent::UploadProgress(10));
        drop(sub);
        registry.emit(&SessionEvent::UploadProgress(20));

        assert_eq!(*seen.lock(), vec![SessionEvent::UploadProgress(10)]);
        assert_eq!(registry.len(), 0);
    }

    #[test]
    fn test_listener_can_emit_reentrantly() {
        let registry = Arc::new(ListenerRegistry::default());
        let (_sub, seen) = recorder(&registry);

        let _nested = {
            let weak = Arc::downgrade(&registry);
            registry.subscribe(Arc::new(move |e: &SessionEvent| {
                if let (SessionEvent::UploadProgress(1), Some(r)) = (e, weak.upgrade()) {
                    r.emit(&SessionEvent::UploadProgress(2));
                }
            }))
        };

        registry.emit(&SessionEvent::UploadProgress(1));
        assert_eq!(*seen.lock(), vec![SessionEvent::UploadProgress(1), SessionEvent::UploadProgress(2)]);
    }

    #[test]
    fn test_subscription_outliving_registry() {
        let registry = Arc::new(ListenerRegistry::default());
        let (sub, _seen) = recorder(&registry);
        drop(registry);
        sub.unsubscribe();
    }
}

//! Synchronous service manager listeners.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use switchboard_core::{Identity, Pid};
use tracing::{debug, trace, warn};
use uuid::Uuid;

use crate::event::BrokerEvent;
use crate::info::RunningServiceInfo;

/// Observer of instance lifecycle transitions.
///
/// Callbacks run on the broker task and must return quickly. Every method
/// has an empty default.
pub trait ServiceManagerListener: Send + Sync {
    /// Called once on registration with every instance alive at that point.
    fn on_init(&self, _running: &[RunningServiceInfo]) {}

    /// An instance was created.
    fn on_service_created(&self, _service: &RunningServiceInfo) {}

    /// An instance acknowledged start.
    fn on_service_started(&self, _identity: &Identity, _pid: Option<Pid>) {}

    /// A runner reported the process id of an instance.
    fn on_service_pid_received(&self, _identity: &Identity, _pid: Pid) {}

    /// An instance could not be started.
    fn on_service_failed_to_start(&self, _identity: &Identity) {}

    /// An instance was destroyed.
    fn on_service_stopped(&self, _identity: &Identity) {}

    /// Optional name for debugging.
    #[allow(clippy::unnecessary_literal_bound)]
    fn name(&self) -> &str {
        "anonymous"
    }
}

/// Registration handle for a listener.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(Uuid);

impl ListenerId {
    fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

/// Registry of synchronous listeners.
#[derive(Default)]
pub struct ListenerRegistry {
    listeners: RwLock<HashMap<ListenerId, Arc<dyn ServiceManagerListener>>>,
}

impl std::fmt::Debug for ListenerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ListenerRegistry")
            .field("listener_count", &self.len())
            .finish()
    }
}

impl ListenerRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a listener. [`ServiceManagerListener::on_init`] is not
    /// called here; the broker calls it with its snapshot first.
    pub fn register(&self, listener: Arc<dyn ServiceManagerListener>) -> ListenerId {
        let id = ListenerId::new();
        let name = listener.name().to_string();
        self.listeners
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(id, listener);
        debug!(listener_name = %name, "Listener registered");
        id
    }

    /// Unregister a listener. Returns `true` if it was registered.
    pub fn unregister(&self, id: ListenerId) -> bool {
        let removed = self
            .listeners
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&id)
            .is_some();
        if removed {
            debug!("Listener unregistered");
        }
        removed
    }

    /// Dispatch an event to every listener.
    ///
    /// A panicking listener is logged and does not affect the others.
    pub fn notify(&self, event: &BrokerEvent) {
        let listeners = self
            .listeners
            .read()
            .unwrap_or_else(PoisonError::into_inner);

        for (id, listener) in listeners.iter() {
            trace!(
                listener_name = %listener.name(),
                event_type = %event.event_type(),
                "Notifying listener"
            );

            let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
                dispatch(listener.as_ref(), event);
            }));

            if let Err(e) = result {
                warn!(
                    listener_id = ?id,
                    listener_name = %listener.name(),
                    error = ?e,
                    "Listener panicked"
                );
            }
        }
    }

    /// Number of registered listeners.
    #[must_use]
    pub fn len(&self) -> usize {
        self.listeners
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Whether no listener is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Remove every listener.
    pub fn clear(&self) {
        self.listeners
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
        debug!("All listeners cleared");
    }
}

fn dispatch(listener: &dyn ServiceManagerListener, event: &BrokerEvent) {
    match event {
        BrokerEvent::ServiceCreated { service, .. } => listener.on_service_created(service),
        BrokerEvent::ServiceStarted { identity, pid, .. } => {
            listener.on_service_started(identity, *pid);
        },
        BrokerEvent::ServicePidReceived { identity, pid, .. } => {
            listener.on_service_pid_received(identity, *pid);
        },
        BrokerEvent::ServiceFailedToStart { identity, .. } => {
            listener.on_service_failed_to_start(identity);
        },
        BrokerEvent::ServiceStopped { identity, .. } => listener.on_service_stopped(identity),
        BrokerEvent::BrokerStarted { .. }
        | BrokerEvent::BrokerStopped { .. }
        | BrokerEvent::ConnectionRefused { .. } => {},
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use switchboard_core::ROOT_USER_GUID;

    use super::*;
    use crate::event::EventMetadata;

    #[derive(Default)]
    struct Recorder {
        calls: Mutex<Vec<String>>,
    }

    impl ServiceManagerListener for Recorder {
        fn on_service_started(&self, identity: &Identity, pid: Option<Pid>) {
            self.calls
                .lock()
                .unwrap()
                .push(format!("started {} {pid:?}", identity.name()));
        }

        fn on_service_stopped(&self, identity: &Identity) {
            self.calls
                .lock()
                .unwrap()
                .push(format!("stopped {}", identity.name()));
        }
    }

    struct Panicker;

    impl ServiceManagerListener for Panicker {
        fn on_service_stopped(&self, _identity: &Identity) {
            panic!("listener failure");
        }
    }

    fn stopped(name: &str) -> BrokerEvent {
        BrokerEvent::ServiceStopped {
            metadata: EventMetadata::new("test"),
            identity: Identity::new(name, ROOT_USER_GUID),
        }
    }

    #[test]
    fn test_dispatches_to_methods() {
        let registry = ListenerRegistry::new();
        let recorder = Arc::new(Recorder::default());
        registry.register(recorder.clone());

        registry.notify(&BrokerEvent::ServiceStarted {
            metadata: EventMetadata::new("test"),
            identity: Identity::new("a", ROOT_USER_GUID),
            pid: Some(7),
        });
        registry.notify(&stopped("a"));

        let calls = recorder.calls.lock().unwrap();
        assert_eq!(*calls, vec!["started a Some(7)", "stopped a"]);
    }

    #[test]
    fn test_panicking_listener_is_isolated() {
        let registry = ListenerRegistry::new();
        let recorder = Arc::new(Recorder::default());
        registry.register(Arc::new(Panicker));
        registry.register(recorder.clone());

        registry.notify(&stopped("b"));
        assert_eq!(recorder.calls.lock().unwrap().len(), 1);
    }

    #[test]
    fn test_default_callbacks_do_nothing() {
        let registry = ListenerRegistry::new();
        let recorder = Arc::new(Recorder::default());
        registry.register(recorder.clone());
        let identity = Identity::new("c", ROOT_USER_GUID);

        registry.notify(&BrokerEvent::ServicePidReceived {
            metadata: EventMetadata::new("test"),
            identity: identity.clone(),
            pid: 9,
        });
        registry.notify(&BrokerEvent::ServiceFailedToStart {
            metadata: EventMetadata::new("test"),
            identity,
        });
        recorder.on_init(&[]);

        assert!(recorder.calls.lock().unwrap().is_empty());
        assert_eq!(recorder.name(), "anonymous");
    }

    #[test]
    fn test_unregister() {
        let registry = ListenerRegistry::new();
        let id = registry.register(Arc::new(Recorder::default()));
        assert_eq!(registry.len(), 1);
        assert!(registry.unregister(id));
        assert!(!registry.unregister(id));
        assert!(registry.is_empty());
    }
}

//! The broker loop and its handle.

use std::fmt;
use std::ops::ControlFlow;
use std::sync::Arc;
use std::time::Duration;

use switchboard_catalog::ServiceResolver;
use switchboard_config::BrokerSection;
use switchboard_core::{Identity, InstanceId};
use switchboard_events::{
    BrokerEvent, EventBus, EventMetadata, EventReceiver, ListenerId, RunningServiceInfo,
    ServiceManagerListener,
};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info};

use crate::error::{BrokerError, BrokerResult};
use crate::manager::{ManagerOptions, ServiceManager};
use crate::params::{ConnectOutcome, ConnectParams};
use crate::pipe::ServicePipe;
use crate::runner::NativeRunner;
use crate::task::{BrokerTask, ChannelTaskRunner, TaskRunner};

/// Configures and spawns a broker.
pub struct BrokerBuilder {
    resolver: Arc<dyn ServiceResolver>,
    runner: Arc<dyn NativeRunner>,
    events: Option<EventBus>,
    options: ManagerOptions,
}

impl BrokerBuilder {
    /// A broker resolving names through `resolver` and launching through
    /// `runner`.
    #[must_use]
    pub fn new(resolver: Arc<dyn ServiceResolver>, runner: Arc<dyn NativeRunner>) -> Self {
        Self {
            resolver,
            runner,
            events: None,
            options: ManagerOptions::default(),
        }
    }

    /// Apply the `[broker]` configuration section.
    #[must_use]
    pub fn with_config(mut self, config: &BrokerSection) -> Self {
        self.options.start_timeout = config.start_timeout();
        self.events = Some(EventBus::with_capacity(config.event_channel_capacity));
        self
    }

    /// Fail instances that do not acknowledge start within `timeout`.
    #[must_use]
    pub fn with_start_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.options.start_timeout = timeout;
        self
    }

    /// First instance id handed out. The broker's own instance takes it.
    #[must_use]
    pub fn with_first_instance_id(mut self, id: InstanceId) -> Self {
        self.options.first_instance_id = id.get();
        self
    }

    /// Publish on `events` instead of a private bus.
    #[must_use]
    pub fn with_event_bus(mut self, events: EventBus) -> Self {
        self.events = Some(events);
        self
    }

    /// Start the broker loop on the current tokio runtime.
    #[must_use]
    pub fn spawn(self) -> BrokerHandle {
        let (tx, rx) = mpsc::unbounded_channel();
        let events = self.events.unwrap_or_default();
        let tasks: Arc<dyn TaskRunner> = Arc::new(ChannelTaskRunner::new(&tx));
        let manager = ServiceManager::new(
            self.resolver,
            self.runner,
            tasks,
            events.clone(),
            self.options,
        );

        events.publish(BrokerEvent::BrokerStarted {
            metadata: EventMetadata::new("switchboard-broker"),
            version: env!("CARGO_PKG_VERSION").to_string(),
        });
        tokio::spawn(run_broker(manager, rx));
        info!("Broker started");

        BrokerHandle { tx, events }
    }
}

impl fmt::Debug for BrokerBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BrokerBuilder")
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

/// Drain tasks until shutdown or until every handle is gone.
async fn run_broker(mut manager: ServiceManager, mut rx: mpsc::UnboundedReceiver<BrokerTask>) {
    while let Some(task) = rx.recv().await {
        if let ControlFlow::Break(()) = manager.handle(task) {
            info!("Broker loop stopped");
            return;
        }
    }
    debug!("All broker handles dropped");
    manager.shutdown();
    info!("Broker loop stopped");
}

/// Cheap, cloneable access to a running broker.
#[derive(Clone)]
pub struct BrokerHandle {
    tx: mpsc::UnboundedSender<BrokerTask>,
    events: EventBus,
}

impl BrokerHandle {
    fn post(&self, task: BrokerTask) -> BrokerResult<()> {
        self.tx.send(task).map_err(|_| BrokerError::NotRunning)
    }

    /// Connect and wait for the result. Any callback already set on
    /// `params` is replaced.
    ///
    /// # Errors
    ///
    /// Returns [`BrokerError::NotRunning`] if the loop is gone, or
    /// [`BrokerError::Dropped`] if the request was discarded unanswered.
    pub async fn connect(&self, params: ConnectParams) -> BrokerResult<ConnectOutcome> {
        let (reply, outcome) = oneshot::channel();
        let params = params.with_callback(move |result, user_id| {
            let _ = reply.send(ConnectOutcome {
                result,
                user_id: user_id.to_string(),
            });
        });
        self.connect_with_callback(params)?;
        outcome.await.map_err(|_| BrokerError::Dropped)
    }

    /// Connect without waiting; the result goes to the callback on
    /// `params`, if any.
    ///
    /// # Errors
    ///
    /// Returns [`BrokerError::NotRunning`] if the loop is gone.
    pub fn connect_with_callback(&self, params: ConnectParams) -> BrokerResult<()> {
        self.post(BrokerTask::Connect {
            params,
            source: None,
        })
    }

    /// Bind an in-process service to `identity`.
    ///
    /// # Errors
    ///
    /// Returns [`BrokerError::InvalidIdentity`] for an unusable identity and
    /// the errors of [`connect`](Self::connect).
    pub async fn register_service(
        &self,
        identity: Identity,
        service: ServicePipe,
    ) -> BrokerResult<ConnectOutcome> {
        identity.validate()?;
        self.connect(ConnectParams::new(Identity::broker(), identity).with_service(service))
            .await
    }

    /// Snapshot of every live instance, ordered by id.
    ///
    /// # Errors
    ///
    /// Returns [`BrokerError::NotRunning`] if the loop is gone.
    pub async fn running_services(&self) -> BrokerResult<Vec<RunningServiceInfo>> {
        let (reply, running) = oneshot::channel();
        self.post(BrokerTask::Query(reply))?;
        running.await.map_err(|_| BrokerError::NotRunning)
    }

    /// Add a listener. It is handed the current instances before any
    /// further notification.
    ///
    /// # Errors
    ///
    /// Returns [`BrokerError::NotRunning`] if the loop is gone.
    pub async fn add_listener(
        &self,
        listener: Arc<dyn ServiceManagerListener>,
    ) -> BrokerResult<ListenerId> {
        let (reply, id) = oneshot::channel();
        self.post(BrokerTask::AddListener(listener, reply))?;
        id.await.map_err(|_| BrokerError::NotRunning)
    }

    /// Remove a listener. Returns whether it was registered.
    pub fn remove_listener(&self, id: ListenerId) -> bool {
        self.events.listeners().unregister(id)
    }

    /// Receive every broker event from now on.
    #[must_use]
    pub fn subscribe(&self) -> EventReceiver {
        self.events.subscribe()
    }

    /// The broker's event bus.
    #[must_use]
    pub fn events(&self) -> &EventBus {
        &self.events
    }

    /// Whether the loop is still accepting work.
    #[must_use]
    pub fn is_running(&self) -> bool {
        !self.tx.is_closed()
    }

    /// Destroy every instance and stop the loop.
    ///
    /// # Errors
    ///
    /// Returns [`BrokerError::NotRunning`] if the loop is already gone.
    pub async fn shutdown(&self) -> BrokerResult<()> {
        let (reply, done) = oneshot::channel();
        self.post(BrokerTask::Shutdown(reply))?;
        done.await.map_err(|_| BrokerError::NotRunning)
    }
}

impl fmt::Debug for BrokerHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BrokerHandle")
            .field("running", &self.is_running())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use std::path::Path;

    use switchboard_catalog::{Entry, ResolveCallback};
    use switchboard_core::{ConnectResult, ROOT_USER_GUID};

    use super::*;
    use crate::runner::InProcessRunner;

    struct Placeholders;

    impl ServiceResolver for Placeholders {
        fn resolve(&self, name: &str, callback: ResolveCallback) {
            callback(Entry::placeholder(name, Path::new("/nowhere")));
        }
    }

    fn broker() -> BrokerHandle {
        BrokerBuilder::new(Arc::new(Placeholders), Arc::new(InProcessRunner::new())).spawn()
    }

    #[tokio::test]
    async fn test_invalid_target_is_invalid_argument() {
        let broker = broker();
        let outcome = broker
            .connect(ConnectParams::new(Identity::broker(), Identity::new("b", "bob")))
            .await
            .unwrap();
        assert_eq!(outcome.result, ConnectResult::InvalidArgument);
    }

    #[tokio::test]
    async fn test_register_rejects_bad_identity() {
        let broker = broker();
        let (pipe, _endpoint) = ServicePipe::channel();
        let err = broker
            .register_service(Identity::new("", ROOT_USER_GUID), pipe)
            .await
            .unwrap_err();
        assert!(matches!(err, BrokerError::InvalidIdentity(_)));
    }

    #[tokio::test]
    async fn test_shutdown_stops_loop() {
        let broker = broker();
        let mut events = broker.subscribe();
        broker.shutdown().await.unwrap();
        assert!(broker.running_services().await.is_err());

        let mut saw_stopped = false;
        while let Some(event) = events.try_recv() {
            saw_stopped |= event.event_type() == "broker_stopped";
        }
        assert!(saw_stopped);
    }

    #[tokio::test]
    async fn test_config_sets_capacity_and_timeout() {
        let section = BrokerSection {
            start_timeout_ms: 250,
            event_channel_capacity: 8,
        };
        let builder = BrokerBuilder::new(Arc::new(Placeholders), Arc::new(InProcessRunner::new()))
            .with_config(&section);
        assert_eq!(builder.options.start_timeout, Some(Duration::from_millis(250)));
        let broker = builder.spawn();
        assert_eq!(broker.events().capacity(), 8);
    }
}

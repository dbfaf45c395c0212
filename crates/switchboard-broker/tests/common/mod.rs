//! Shared harness for broker integration tests.

use std::sync::Arc;
use std::time::Duration;

use switchboard_broker::{BrokerBuilder, BrokerHandle, ConnectOutcome, ConnectParams, Connector};
use switchboard_core::Identity;
use switchboard_events::{BrokerEvent, EventReceiver};
use switchboard_test::{MockResolver, MockRunner, eventually, within};
use tokio::sync::oneshot;

/// A running broker wired to mocks.
#[allow(dead_code)]
pub struct TestBroker {
    /// Handle to the broker loop.
    pub broker: BrokerHandle,
    /// Resolver the broker consults.
    pub resolver: Arc<MockResolver>,
    /// Runner the broker launches through.
    pub runner: Arc<MockRunner>,
    /// Events since spawn.
    pub events: EventReceiver,
}

#[allow(dead_code)]
impl TestBroker {
    /// Spawn a broker with no start timeout.
    pub fn spawn(resolver: MockResolver, runner: MockRunner) -> Self {
        Self::spawn_with(resolver, runner, None)
    }

    /// Spawn a broker that fails instances not started within `timeout`.
    pub fn spawn_with(
        resolver: MockResolver,
        runner: MockRunner,
        timeout: Option<Duration>,
    ) -> Self {
        let resolver = Arc::new(resolver);
        let runner = Arc::new(runner);
        let broker = BrokerBuilder::new(resolver.clone(), runner.clone())
            .with_start_timeout(timeout)
            .spawn();
        let events = broker.subscribe();
        Self {
            broker,
            resolver,
            runner,
            events,
        }
    }

    /// Connect to `target` on behalf of the embedder, without an
    /// interface request.
    pub async fn start(&self, target: Identity) -> ConnectOutcome {
        within(
            "embedder connect",
            self.broker
                .connect(ConnectParams::new(Identity::broker(), target)),
        )
        .await
        .expect("broker is running")
    }

    /// Start `target` and take the connector its mock service captured.
    /// The runner must capture connectors for the target's name.
    pub async fn start_with_connector(&self, target: Identity) -> Connector {
        let name = target.name().to_string();
        assert!(self.start(target).await.is_success());
        eventually("service start", || {
            self.runner
                .service(&name)
                .is_some_and(|service| service.is_started())
        })
        .await;
        self.runner
            .service(&name)
            .and_then(|service| service.take_connector())
            .expect("runner does not capture this service's connector")
    }

    /// Round-trip through the broker loop so every task posted so far has
    /// been handled.
    pub async fn sync(&self) -> usize {
        self.broker
            .running_services()
            .await
            .expect("broker is running")
            .len()
    }

    /// Wait for an event of `kind` about `identity`.
    pub async fn wait_for(&mut self, kind: &str, identity: &Identity) -> Arc<BrokerEvent> {
        let what = format!("{kind} for {identity}");
        within(&what, async {
            loop {
                let event = self.events.recv().await.expect("event bus closed");
                if event.event_type() == kind && event.identity() == Some(identity) {
                    return event;
                }
            }
        })
        .await
    }

    /// Every queued event type, without waiting.
    pub fn drain_event_types(&mut self) -> Vec<&'static str> {
        let mut kinds = Vec::new();
        while let Some(event) = self.events.try_recv() {
            kinds.push(event.event_type());
        }
        kinds
    }
}

/// Connect through `connector` and wait for the result callback.
#[allow(dead_code)]
pub async fn connect_via(connector: &Connector, params: ConnectParams) -> ConnectOutcome {
    let (tx, rx) = oneshot::channel();
    connector.connect(params.with_callback(move |result, user_id| {
        let _ = tx.send(ConnectOutcome {
            result,
            user_id: user_id.to_string(),
        });
    }));
    within("connector connect", rx)
        .await
        .expect("connect dropped without a result")
}

//! Integration tests for instance lifecycle: start, quit, failure and
//! shutdown.

mod common;

use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use common::{TestBroker, connect_via};
use switchboard_broker::{
    BrokerBuilder, BrokerError, ClientProcessConnection, CompletionCallback, ConnectParams,
    LaunchedService, NativeRunner, PidCallback, RunnerHandle, Service, ServiceContext,
    ServiceFactory, ServicePackage, ServicePipe,
};
use switchboard_capabilities::{ALL_USERS_CAPABILITY, InterfaceProviderSpec, SINGLETON_CAPABILITY};
use switchboard_core::{ConnectResult, Identity, ROOT_USER_GUID};
use switchboard_events::{BrokerEvent, InstanceState};
use switchboard_test::prelude::*;
use tokio::sync::oneshot;

/// A service that never finishes starting.
struct Stalled;

#[async_trait]
impl Service for Stalled {
    async fn on_start(&mut self, _context: &ServiceContext) {
        std::future::pending::<()>().await;
    }
}

#[tokio::test]
async fn test_launch_reports_lifecycle_in_order() {
    let mut t = TestBroker::spawn(
        MockResolver::new().with_manifest(test_manifest("b")),
        MockRunner::new().with_pid(Some(31)),
    );
    let b = alice("b").normalized();

    assert!(t.start(alice("b")).await.is_success());
    t.wait_for("service_started", &b).await;

    let running = t.broker.running_services().await.unwrap();
    assert_eq!(running.len(), 2);
    assert_eq!(running[0].identity, Identity::broker());
    assert_eq!(running[1].identity, b);
    assert_eq!(running[1].pid, Some(31));
    assert_eq!(running[1].state, InstanceState::Started);

    let launch = &t.runner.launches()[0];
    assert_eq!(launch.package_path, Path::new(MOCK_PACKAGE_ROOT).join("b"));
    assert!(!launch.sandboxed);
}

#[tokio::test]
async fn test_failed_launch_reports_failed_to_start() {
    let mut t = TestBroker::spawn(MockResolver::new(), MockRunner::new().failing("ghost"));
    let listener = Arc::new(RecordingListener::new());
    t.broker.add_listener(listener.clone()).await.unwrap();
    let ghost = alice("ghost").normalized();

    // The connect is routed before the launch failure is known.
    assert!(t.start(alice("ghost")).await.is_success());
    t.wait_for("service_failed_to_start", &ghost).await;

    assert_eq!(t.sync().await, 1);
    assert!(listener.saw(&ListenerCall::FailedToStart(ghost.clone())));
    assert!(listener.stopped().is_empty());

    // A later connect starts over.
    assert!(t.start(alice("ghost")).await.is_success());
    t.wait_for("service_failed_to_start", &ghost).await;
    assert_eq!(t.runner.launch_count_for("ghost"), 2);
    assert_eq!(t.resolver.call_count("ghost"), 2);
}

#[tokio::test]
async fn test_quit_is_ignored_while_connects_are_pending() {
    let mut t = TestBroker::spawn(
        MockResolver::new().with_manifest(test_manifest("b")),
        MockRunner::new().gating("b").capturing_connector("b"),
    );
    let b = alice("b").normalized();

    assert!(t.start(alice("b")).await.is_success());
    eventually("b started", || {
        t.runner.service("b").is_some_and(|s| s.is_started())
    })
    .await;
    let service = t.runner.service("b").unwrap();
    let connector = service.take_connector().unwrap();
    within("gated connect", service.wait_for_connects(1)).await;

    connector.request_quit();
    let running = t.broker.running_services().await.unwrap();
    assert!(running.iter().any(|info| info.identity == b));

    service.release(1);
    eventually("connect handled", || service.completed_connects() == 1).await;

    connector.request_quit();
    drop(connector);
    t.wait_for("service_stopped", &b).await;
    within("hang up", service.wait_for_stop()).await;
    assert_eq!(t.sync().await, 1);
}

/// Once its pipe is gone, an instance still used through its connector
/// is no longer routed to. The next connect starts a fresh instance and the
/// old one goes away when its connector does.
#[tokio::test]
async fn test_unreachable_instance_is_replaced_then_destroyed() {
    let mut t = TestBroker::spawn(
        MockResolver::new().with_manifest(test_manifest("b")),
        MockRunner::new().capturing_connector("b"),
    );
    let b = alice("b").normalized();

    let connector = t.start_with_connector(alice("b")).await;
    let old = t.runner.service("b").unwrap();
    eventually("first connect handled", || old.completed_connects() == 1).await;
    let old_id = t
        .broker
        .running_services()
        .await
        .unwrap()
        .into_iter()
        .find(|info| info.identity == b)
        .unwrap()
        .id;

    connector.request_quit();
    within("old pipe closed", old.wait_for_stop()).await;
    let running = t.broker.running_services().await.unwrap();
    assert!(running.iter().any(|info| info.id == old_id));

    assert!(t.start(alice("b")).await.is_success());
    assert_eq!(t.runner.launch_count_for("b"), 2);
    let fresh = t.runner.service("b").unwrap();
    within("fresh instance connect", fresh.wait_for_connects(1)).await;
    assert_eq!(old.connect_count(), 1);

    let ids: Vec<_> = t
        .broker
        .running_services()
        .await
        .unwrap()
        .into_iter()
        .filter(|info| info.identity == b)
        .map(|info| info.id)
        .collect();
    assert_eq!(ids.len(), 2);
    assert!(ids.contains(&old_id));

    drop(connector);
    t.wait_for("service_stopped", &b).await;
    let running = t.broker.running_services().await.unwrap();
    assert_eq!(running.len(), 2);
    assert!(running.iter().all(|info| info.id != old_id));
    assert!(!fresh.is_stopped());
}

/// Reports its pid only when the test says so.
#[derive(Default)]
struct LatePidRunner {
    pid_callback: Mutex<Option<PidCallback>>,
}

impl NativeRunner for LatePidRunner {
    fn start(
        &self,
        _package_path: &Path,
        _identity: &Identity,
        _sandboxed: bool,
        pid_callback: PidCallback,
        _completion_callback: CompletionCallback,
    ) -> LaunchedService {
        *self.pid_callback.lock().unwrap() = Some(pid_callback);
        LaunchedService {
            service: MockService::new().spawn(),
            handle: RunnerHandle::detached(),
        }
    }
}

#[tokio::test]
async fn test_missing_pid_after_start_is_failed_to_start() {
    let runner = Arc::new(LatePidRunner::default());
    let broker = BrokerBuilder::new(
        Arc::new(MockResolver::new().with_manifest(test_manifest("b"))),
        runner.clone(),
    )
    .spawn();
    let mut events = broker.subscribe();
    let listener = Arc::new(RecordingListener::new());
    broker.add_listener(listener.clone()).await.unwrap();
    let b = alice("b").normalized();

    let outcome = broker
        .connect(ConnectParams::new(Identity::broker(), alice("b")))
        .await
        .unwrap();
    assert!(outcome.is_success());
    eventually("start acknowledged", || {
        listener.saw(&ListenerCall::Started(b.clone(), None))
    })
    .await;

    let report_pid = runner.pid_callback.lock().unwrap().take().unwrap();
    report_pid(None);
    within("failure event", async {
        loop {
            let event = events.recv().await.unwrap();
            if event.event_type() == "service_failed_to_start" && event.identity() == Some(&b) {
                return;
            }
        }
    })
    .await;

    assert!(listener.stopped().is_empty());
    assert!(listener.saw(&ListenerCall::FailedToStart(b)));
    assert_eq!(broker.running_services().await.unwrap().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_start_timeout_fails_instance() {
    let stalled: ServiceFactory = Arc::new(|_: &Identity| -> Box<dyn Service> { Box::new(Stalled) });
    let mut t = TestBroker::spawn_with(
        MockResolver::new().with_manifest(test_manifest("slow")),
        MockRunner::new().with_factory("slow", stalled),
        Some(Duration::from_secs(1)),
    );
    let slow = alice("slow").normalized();

    assert!(t.start(alice("slow")).await.is_success());
    t.wait_for("service_failed_to_start", &slow).await;
    assert_eq!(t.sync().await, 1);
}

#[tokio::test]
async fn test_all_users_service_is_shared_across_users() {
    let t = TestBroker::spawn(
        MockResolver::new()
            .with_manifest(manifest_with_broker_capabilities("shared", &[ALL_USERS_CAPABILITY])),
        MockRunner::new(),
    );

    let for_alice = t.start(alice("shared")).await;
    let for_bob = t.start(bob("shared")).await;
    assert!(for_alice.is_success());
    assert!(for_bob.is_success());
    assert_eq!(for_alice.user_id, for_bob.user_id);
    assert_ne!(for_alice.user_id, ALICE_USER_ID);
    assert_ne!(for_alice.user_id, BOB_USER_ID);
    assert_eq!(t.runner.launch_count_for("shared"), 1);

    let service = t.runner.service("shared").unwrap();
    within("both connects", service.wait_for_connects(2)).await;
}

#[tokio::test]
async fn test_singleton_runs_as_root() {
    let t = TestBroker::spawn(
        MockResolver::new()
            .with_manifest(manifest_with_broker_capabilities("single", &[SINGLETON_CAPABILITY])),
        MockRunner::new(),
    );

    assert_eq!(t.start(alice("single")).await.user_id, ROOT_USER_GUID);
    assert_eq!(t.start(bob("single")).await.user_id, ROOT_USER_GUID);
    assert_eq!(t.runner.launch_count_for("single"), 1);
    assert_eq!(
        t.runner.launches()[0].identity,
        root_identity("single").normalized()
    );
}

#[tokio::test]
async fn test_packaged_service_is_hosted_by_its_package() {
    let mut t = TestBroker::spawn(
        MockResolver::new().with_manifest(package_manifest("pkg", vec![test_manifest("member")])),
        MockRunner::new(),
    );
    let member = alice("member").normalized();

    assert!(t.start(alice("member")).await.is_success());
    t.wait_for("service_started", &member).await;

    assert_eq!(t.runner.launch_count(), 1);
    assert_eq!(t.runner.launches()[0].identity, alice("pkg").normalized());
    let package = t.runner.service("pkg").unwrap();
    assert_eq!(package.created_services(), vec!["member".to_string()]);
    // Hosting requests are not ordinary connects.
    assert_eq!(package.connect_count(), 0);
}

#[tokio::test]
async fn test_service_package_hosts_members() {
    let hosted: Arc<Mutex<Vec<MockServiceHandle>>> = Arc::default();
    let members = Arc::clone(&hosted);
    let package: ServiceFactory = Arc::new(move |_: &Identity| -> Box<dyn Service> {
        let members = Arc::clone(&members);
        let factory: ServiceFactory = Arc::new(move |_: &Identity| -> Box<dyn Service> {
            let service = MockService::new();
            members.lock().unwrap().push(service.handle());
            Box::new(service)
        });
        Box::new(ServicePackage::new().with_member("member", factory))
    });
    let mut t = TestBroker::spawn(
        MockResolver::new().with_manifest(package_manifest("pkg", vec![test_manifest("member")])),
        MockRunner::new().with_factory("pkg", package),
    );
    let member = alice("member").normalized();

    assert!(t.start(alice("member")).await.is_success());
    t.wait_for("service_started", &member).await;

    let handle = hosted.lock().unwrap().first().cloned().unwrap();
    within("member connect", handle.wait_for_connects(1)).await;
    assert_eq!(handle.identity(), Some(member));
    assert_eq!(handle.connects()[0].source, Identity::broker());
}

#[tokio::test]
async fn test_client_process_binding() {
    let mut t = TestBroker::spawn(MockResolver::new(), MockRunner::new());
    let process = alice("proc").normalized();

    let service = MockService::new();
    let handle = service.handle();
    let (pid_tx, pid_rx) = oneshot::channel();
    let params = ConnectParams::new(Identity::broker(), alice("proc"))
        .with_client_process(ClientProcessConnection::new(service.spawn(), pid_rx));
    let outcome = t.broker.connect(params).await.unwrap();
    assert_eq!(outcome.result, ConnectResult::Succeeded);

    eventually("client start", || handle.is_started()).await;
    assert_eq!(handle.identity(), Some(process.clone()));
    assert_eq!(handle.connect_count(), 0);
    assert_eq!(t.runner.launch_count(), 0);

    pid_tx.send(77).unwrap();
    let event = t.wait_for("service_pid_received", &process).await;
    assert!(matches!(
        event.as_ref(),
        BrokerEvent::ServicePidReceived { pid: 77, .. }
    ));

    // The identity is taken now.
    let (again_tx, again_rx) = oneshot::channel::<u32>();
    let params = ConnectParams::new(Identity::broker(), alice("proc")).with_client_process(
        ClientProcessConnection::new(MockService::new().spawn(), again_rx),
    );
    let outcome = t.broker.connect(params).await.unwrap();
    assert_eq!(outcome.result, ConnectResult::InvalidArgument);
    drop(again_tx);
}

#[tokio::test]
async fn test_client_process_requires_pid_receiver() {
    let t = TestBroker::spawn(MockResolver::new(), MockRunner::new());
    let connection = ClientProcessConnection {
        service: MockService::new().spawn(),
        pid_receiver: None,
    };
    let params = ConnectParams::new(Identity::broker(), alice("proc")).with_client_process(connection);
    let outcome = t.broker.connect(params).await.unwrap();
    assert_eq!(outcome.result, ConnectResult::InvalidArgument);
    assert_eq!(t.sync().await, 1);
}

#[tokio::test]
async fn test_client_process_requires_capability() {
    let t = TestBroker::spawn(
        MockResolver::new().with_manifest(manifest_with_spec(
            "a",
            InterfaceProviderSpec::default().requiring("proc", &["x"]),
        )),
        MockRunner::new().capturing_connector("a"),
    );
    let connector = t.start_with_connector(alice("a")).await;

    let (_pid_tx, pid_rx) = oneshot::channel();
    let params = ConnectParams::new(alice("a"), alice("proc"))
        .with_client_process(ClientProcessConnection::new(MockService::new().spawn(), pid_rx));
    let outcome = connect_via(&connector, params).await;
    assert_eq!(outcome.result, ConnectResult::AccessDenied);
}

#[tokio::test]
async fn test_client_process_hang_up_cleans_up() {
    let mut t = TestBroker::spawn(MockResolver::new(), MockRunner::new());
    let process = alice("proc").normalized();

    let (pipe, endpoint) = ServicePipe::channel();
    let (_pid_tx, pid_rx) = oneshot::channel();
    let params = ConnectParams::new(Identity::broker(), alice("proc"))
        .with_client_process(ClientProcessConnection::new(pipe, pid_rx));
    assert!(t.broker.connect(params).await.unwrap().is_success());

    drop(endpoint);
    t.wait_for("service_failed_to_start", &process).await;
    assert_eq!(t.sync().await, 1);
}

#[tokio::test]
async fn test_registered_service_is_bound_directly() {
    let mut t = TestBroker::spawn(MockResolver::new(), MockRunner::new());
    let service = MockService::new();
    let handle = service.handle();

    let outcome = t
        .broker
        .register_service(root_identity("embedded"), service.spawn())
        .await
        .unwrap();
    assert!(outcome.is_success());
    t.wait_for("service_started", &root_identity("embedded").normalized())
        .await;
    within("registration connect", handle.wait_for_connects(1)).await;
    assert_eq!(t.runner.launch_count(), 0);

    let again = t
        .broker
        .register_service(root_identity("embedded"), MockService::new().spawn())
        .await
        .unwrap();
    assert_eq!(again.result, ConnectResult::InvalidArgument);
}

#[tokio::test]
async fn test_listener_sees_snapshot_first() {
    let mut t = TestBroker::spawn(
        MockResolver::new()
            .with_manifest(test_manifest("b"))
            .with_manifest(test_manifest("c")),
        MockRunner::new(),
    );
    assert!(t.start(alice("b")).await.is_success());
    t.wait_for("service_started", &alice("b").normalized()).await;

    let listener = Arc::new(RecordingListener::new());
    t.broker.add_listener(listener.clone()).await.unwrap();
    assert!(t.start(alice("c")).await.is_success());

    let c = alice("c").normalized();
    eventually("c started", || {
        listener.calls().iter().any(|call| matches!(call, ListenerCall::Started(id, _) if *id == c))
    })
    .await;

    let calls = listener.calls();
    assert_eq!(
        calls[0],
        ListenerCall::Init(vec![Identity::broker(), alice("b").normalized()])
    );
    assert_eq!(calls[1], ListenerCall::Created(c.clone()));
    assert!(listener.saw(&ListenerCall::PidReceived(c.clone(), 4242)));
    assert!(listener.saw(&ListenerCall::Started(c, Some(4242))));
}

#[tokio::test]
async fn test_removed_listener_stops_receiving() {
    let t = TestBroker::spawn(MockResolver::new(), MockRunner::new());
    let listener = Arc::new(RecordingListener::new());
    let id = t.broker.add_listener(listener.clone()).await.unwrap();
    assert!(t.broker.remove_listener(id));

    assert!(t.start(alice("b")).await.is_success());
    t.sync().await;
    assert_eq!(listener.calls().len(), 1);
}

#[tokio::test]
async fn test_shutdown_stops_every_instance() {
    let mut t = TestBroker::spawn(
        MockResolver::new()
            .with_manifest(test_manifest("b"))
            .with_manifest(test_manifest("c")),
        MockRunner::new(),
    );
    assert!(t.start(alice("b")).await.is_success());
    t.wait_for("service_started", &alice("b").normalized()).await;
    assert!(t.start(alice("c")).await.is_success());
    t.wait_for("service_started", &alice("c").normalized()).await;

    t.broker.shutdown().await.unwrap();
    for name in ["b", "c"] {
        let service = t.runner.service(name).unwrap();
        within("hang up", service.wait_for_stop()).await;
    }

    let kinds = t.drain_event_types();
    assert!(kinds.contains(&"broker_stopped"));
    assert_eq!(kinds.iter().filter(|k| **k == "service_stopped").count(), 2);

    // Either refused at the channel or dropped with the loop's queue.
    let late = t
        .broker
        .connect(ConnectParams::new(Identity::broker(), alice("b")))
        .await;
    assert!(matches!(
        late,
        Err(BrokerError::NotRunning | BrokerError::Dropped)
    ));
}

#[tokio::test]
async fn test_dropping_every_handle_shuts_down() {
    let t = TestBroker::spawn(
        MockResolver::new().with_manifest(test_manifest("b")),
        MockRunner::new(),
    );
    assert!(t.start(alice("b")).await.is_success());
    let service = t.runner.service("b").unwrap();

    let TestBroker { broker, .. } = t;
    drop(broker);
    within("hang up", service.wait_for_stop()).await;
}

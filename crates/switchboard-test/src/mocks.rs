//! Mock implementations for testing.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use switchboard_broker::{
    CompletionCallback, Connector, InterfaceRequest, LaunchedService, NativeRunner, PidCallback,
    RunnerHandle, Service, ServiceContext, ServiceEndpoint, ServiceFactory, ServicePipe,
    SourceInfo, run_service,
};
use switchboard_capabilities::CapabilityRequest;
use switchboard_catalog::{Entry, Manifest, ResolveCallback, ServiceResolver};
use switchboard_core::{Identity, MessagePipe, Pid};
use switchboard_events::{RunningServiceInfo, ServiceManagerListener};
use tokio::sync::{Notify, Semaphore};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

// ---------------------------------------------------------------------------
// MockService
// ---------------------------------------------------------------------------

/// One connect delivered to a [`MockService`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedConnect {
    /// Who connected.
    pub source: Identity,
    /// The requested interface, if any.
    pub interface: Option<String>,
    /// What the source was granted.
    pub capabilities: CapabilityRequest,
}

#[derive(Default)]
struct ServiceRecord {
    identity: Option<Identity>,
    connects: Vec<RecordedConnect>,
    completed: usize,
    created: Vec<String>,
    stopped: bool,
    connector: Option<Connector>,
    pipes: Vec<(String, MessagePipe)>,
}

/// Observer side of a [`MockService`].
#[derive(Clone)]
pub struct MockServiceHandle {
    record: Arc<Mutex<ServiceRecord>>,
    gate: Arc<Semaphore>,
    changed: Arc<Notify>,
}

impl MockServiceHandle {
    fn new() -> Self {
        Self {
            record: Arc::new(Mutex::new(ServiceRecord::default())),
            gate: Arc::new(Semaphore::new(0)),
            changed: Arc::new(Notify::new()),
        }
    }

    /// Identity received with the start request.
    #[must_use]
    pub fn identity(&self) -> Option<Identity> {
        lock(&self.record).identity.clone()
    }

    /// Whether the service has been started.
    #[must_use]
    pub fn is_started(&self) -> bool {
        lock(&self.record).identity.is_some()
    }

    /// Every connect received so far, in order.
    #[must_use]
    pub fn connects(&self) -> Vec<RecordedConnect> {
        lock(&self.record).connects.clone()
    }

    /// Number of connects received.
    #[must_use]
    pub fn connect_count(&self) -> usize {
        lock(&self.record).connects.len()
    }

    /// Number of connect handlers that have returned.
    #[must_use]
    pub fn completed_connects(&self) -> usize {
        lock(&self.record).completed
    }

    /// Names the broker asked this service to host.
    #[must_use]
    pub fn created_services(&self) -> Vec<String> {
        lock(&self.record).created.clone()
    }

    /// Whether the broker hung up.
    #[must_use]
    pub fn is_stopped(&self) -> bool {
        lock(&self.record).stopped
    }

    /// Take the captured connector. Only services built with
    /// [`MockService::capturing_connector`] keep one.
    #[must_use]
    pub fn take_connector(&self) -> Option<Connector> {
        lock(&self.record).connector.take()
    }

    /// Take the service end of the first received pipe for `interface`.
    #[must_use]
    pub fn take_interface_pipe(&self, interface: &str) -> Option<MessagePipe> {
        let mut record = lock(&self.record);
        let index = record.pipes.iter().position(|(name, _)| name == interface)?;
        Some(record.pipes.remove(index).1)
    }

    /// Let `n` gated connects proceed.
    pub fn release(&self, n: usize) {
        self.gate.add_permits(n);
    }

    /// Wait until at least `n` connects have been received.
    pub async fn wait_for_connects(&self, n: usize) {
        self.wait_until(|record| record.connects.len() >= n).await;
    }

    /// Wait until the broker hangs up.
    pub async fn wait_for_stop(&self) {
        self.wait_until(|record| record.stopped).await;
    }

    async fn wait_until(&self, check: impl Fn(&ServiceRecord) -> bool) {
        loop {
            let notified = self.changed.notified();
            if check(&lock(&self.record)) {
                return;
            }
            // Bounded wait covers a notification racing the check.
            let _ = tokio::time::timeout(Duration::from_millis(10), notified).await;
        }
    }

    fn update(&self, f: impl FnOnce(&mut ServiceRecord)) {
        f(&mut lock(&self.record));
        self.changed.notify_waiters();
    }
}

impl fmt::Debug for MockServiceHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let record = lock(&self.record);
        f.debug_struct("MockServiceHandle")
            .field("identity", &record.identity)
            .field("connects", &record.connects.len())
            .field("stopped", &record.stopped)
            .finish()
    }
}

/// A recording [`Service`].
#[derive(Debug)]
pub struct MockService {
    handle: MockServiceHandle,
    gated: bool,
    capture_connector: bool,
}

impl Default for MockService {
    fn default() -> Self {
        Self::new()
    }
}

impl MockService {
    /// A service that accepts everything immediately.
    #[must_use]
    pub fn new() -> Self {
        Self {
            handle: MockServiceHandle::new(),
            gated: false,
            capture_connector: false,
        }
    }

    /// Hold every connect handler until [`MockServiceHandle::release`].
    #[must_use]
    pub fn gated(mut self) -> Self {
        self.gated = true;
        self
    }

    /// Keep a clone of the connector from the start request.
    ///
    /// A held connector keeps the instance bound; drop it to let the
    /// broker destroy an unused instance.
    #[must_use]
    pub fn capturing_connector(mut self) -> Self {
        self.capture_connector = true;
        self
    }

    /// Observer for this service.
    #[must_use]
    pub fn handle(&self) -> MockServiceHandle {
        self.handle.clone()
    }

    /// Run the service on a new task and return the broker end.
    #[must_use]
    pub fn spawn(self) -> ServicePipe {
        let (pipe, endpoint) = ServicePipe::channel();
        tokio::spawn(run_service(endpoint, Box::new(self)));
        pipe
    }
}

#[async_trait]
impl Service for MockService {
    async fn on_start(&mut self, context: &ServiceContext) {
        let connector = self.capture_connector.then(|| context.connector().clone());
        let identity = context.identity().clone();
        self.handle.update(|record| {
            record.identity = Some(identity);
            record.connector = connector;
        });
    }

    async fn on_connect(
        &mut self,
        _context: &ServiceContext,
        source: SourceInfo,
        request: Option<InterfaceRequest>,
    ) {
        let connect = RecordedConnect {
            source: source.identity,
            interface: request.as_ref().map(|r| r.interface_name.clone()),
            capabilities: source.capabilities,
        };
        self.handle.update(|record| {
            record.connects.push(connect);
            if let Some(request) = request {
                record.pipes.push((request.interface_name, request.pipe));
            }
        });

        if self.gated
            && let Ok(permit) = self.handle.gate.acquire().await
        {
            permit.forget();
        }

        self.handle
            .update(|record| record.completed = record.completed.saturating_add(1));
    }

    async fn on_create_service(
        &mut self,
        _context: &ServiceContext,
        name: String,
        endpoint: ServiceEndpoint,
    ) {
        self.handle.update(|record| record.created.push(name));
        tokio::spawn(run_service(endpoint, Box::new(MockService::new())));
    }

    async fn on_stop(&mut self) {
        self.handle.update(|record| {
            record.stopped = true;
            record.connector = None;
        });
    }
}

// ---------------------------------------------------------------------------
// MockResolver
// ---------------------------------------------------------------------------

/// Package root used for entries built by [`MockResolver`].
pub const MOCK_PACKAGE_ROOT: &str = "/packages";

/// A [`ServiceResolver`] backed by an in-memory map.
///
/// Unknown names resolve to placeholder entries. A manual resolver holds
/// every callback until [`complete`](Self::complete) is called.
pub struct MockResolver {
    entries: Mutex<HashMap<String, Arc<Entry>>>,
    manual: bool,
    held: Mutex<Vec<(String, ResolveCallback)>>,
    calls: Mutex<Vec<String>>,
}

impl Default for MockResolver {
    fn default() -> Self {
        Self::new()
    }
}

impl MockResolver {
    /// A resolver that answers immediately.
    #[must_use]
    pub fn new() -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            manual: false,
            held: Mutex::new(Vec::new()),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// A resolver that answers only when told to.
    #[must_use]
    pub fn manual() -> Self {
        Self {
            manual: true,
            ..Self::new()
        }
    }

    /// Add a manifest, builder style.
    ///
    /// # Panics
    ///
    /// Panics if the manifest is invalid.
    #[must_use]
    pub fn with_manifest(self, manifest: Manifest) -> Self {
        self.add_manifest(&manifest);
        self
    }

    /// Add a manifest and its packaged members.
    ///
    /// # Panics
    ///
    /// Panics if the manifest is invalid.
    pub fn add_manifest(&self, manifest: &Manifest) {
        let path = Path::new(MOCK_PACKAGE_ROOT).join(&manifest.name);
        let entry = Entry::from_manifest(manifest, &path).expect("invalid test manifest");
        let mut entries = lock(&self.entries);
        insert_tree(&mut entries, entry);
    }

    /// The entry known for `name`.
    #[must_use]
    pub fn entry(&self, name: &str) -> Option<Arc<Entry>> {
        lock(&self.entries).get(name).cloned()
    }

    /// Answer every held resolution for `name`. Returns how many were held.
    pub fn complete(&self, name: &str) -> usize {
        let ready: Vec<_> = {
            let mut held = lock(&self.held);
            let (ready, rest): (Vec<_>, Vec<_>) =
                held.drain(..).partition(|(n, _)| n == name);
            *held = rest;
            ready
        };
        self.answer(ready)
    }

    /// Answer every held resolution.
    pub fn complete_all(&self) -> usize {
        let ready: Vec<_> = lock(&self.held).drain(..).collect();
        self.answer(ready)
    }

    /// Number of held resolutions.
    #[must_use]
    pub fn pending(&self) -> usize {
        lock(&self.held).len()
    }

    /// Every name passed to `resolve`, in order.
    #[must_use]
    pub fn calls(&self) -> Vec<String> {
        lock(&self.calls).clone()
    }

    /// How often `name` was resolved.
    #[must_use]
    pub fn call_count(&self, name: &str) -> usize {
        lock(&self.calls).iter().filter(|n| *n == name).count()
    }

    fn lookup(&self, name: &str) -> Arc<Entry> {
        let mut entries = lock(&self.entries);
        entries
            .entry(name.to_string())
            .or_insert_with(|| {
                let path = Path::new(MOCK_PACKAGE_ROOT).join(name);
                Entry::placeholder(name, path)
            })
            .clone()
    }

    fn answer(&self, ready: Vec<(String, ResolveCallback)>) -> usize {
        let count = ready.len();
        for (name, callback) in ready {
            callback(self.lookup(&name));
        }
        count
    }
}

fn insert_tree(entries: &mut HashMap<String, Arc<Entry>>, entry: Arc<Entry>) {
    for child in entry.children() {
        insert_tree(entries, Arc::clone(child));
    }
    entries.insert(entry.name().to_string(), entry);
}

impl fmt::Debug for MockResolver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MockResolver")
            .field("entries", &lock(&self.entries).len())
            .field("manual", &self.manual)
            .field("held", &lock(&self.held).len())
            .finish()
    }
}

impl ServiceResolver for MockResolver {
    fn resolve(&self, name: &str, callback: ResolveCallback) {
        lock(&self.calls).push(name.to_string());
        if self.manual {
            lock(&self.held).push((name.to_string(), callback));
            return;
        }
        callback(self.lookup(name));
    }
}

// ---------------------------------------------------------------------------
// MockRunner
// ---------------------------------------------------------------------------

/// One call to [`MockRunner::start`](NativeRunner::start).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Launch {
    /// Package directory passed by the broker.
    pub package_path: PathBuf,
    /// Identity being launched.
    pub identity: Identity,
    /// Whether the manifest asked for a sandbox.
    pub sandboxed: bool,
}

#[derive(Default)]
struct RunnerState {
    launches: Vec<Launch>,
    services: HashMap<String, Vec<MockServiceHandle>>,
    failing: HashSet<String>,
    gated: HashSet<String>,
    capturing: HashSet<String>,
    factories: HashMap<String, ServiceFactory>,
}

/// A [`NativeRunner`] that hosts [`MockService`]s in this process.
///
/// Services are keyed by identity name.
pub struct MockRunner {
    state: Mutex<RunnerState>,
    pid: Option<Pid>,
}

impl Default for MockRunner {
    fn default() -> Self {
        Self::new()
    }
}

impl MockRunner {
    /// A runner that launches everything and reports pid 4242.
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: Mutex::new(RunnerState::default()),
            pid: Some(4242),
        }
    }

    /// Report `pid` for every launch.
    #[must_use]
    pub fn with_pid(mut self, pid: Option<Pid>) -> Self {
        self.pid = pid;
        self
    }

    /// Make launches of `name` fail.
    #[must_use]
    pub fn failing(self, name: &str) -> Self {
        lock(&self.state).failing.insert(name.to_string());
        self
    }

    /// Gate connects to `name` (see [`MockService::gated`]).
    #[must_use]
    pub fn gating(self, name: &str) -> Self {
        lock(&self.state).gated.insert(name.to_string());
        self
    }

    /// Capture connectors of `name` (see [`MockService::capturing_connector`]).
    #[must_use]
    pub fn capturing_connector(self, name: &str) -> Self {
        lock(&self.state).capturing.insert(name.to_string());
        self
    }

    /// Host `name` with `factory` instead of a [`MockService`].
    #[must_use]
    pub fn with_factory(self, name: &str, factory: ServiceFactory) -> Self {
        lock(&self.state)
            .factories
            .insert(name.to_string(), factory);
        self
    }

    /// Every launch so far.
    #[must_use]
    pub fn launches(&self) -> Vec<Launch> {
        lock(&self.state).launches.clone()
    }

    /// Number of launches.
    #[must_use]
    pub fn launch_count(&self) -> usize {
        lock(&self.state).launches.len()
    }

    /// Number of launches of `name`.
    #[must_use]
    pub fn launch_count_for(&self, name: &str) -> usize {
        lock(&self.state)
            .launches
            .iter()
            .filter(|l| l.identity.name() == name)
            .count()
    }

    /// Most recently launched mock service named `name`.
    #[must_use]
    pub fn service(&self, name: &str) -> Option<MockServiceHandle> {
        lock(&self.state)
            .services
            .get(name)
            .and_then(|handles| handles.last().cloned())
    }

    /// Every mock service launched under `name`.
    #[must_use]
    pub fn services(&self, name: &str) -> Vec<MockServiceHandle> {
        lock(&self.state)
            .services
            .get(name)
            .cloned()
            .unwrap_or_default()
    }

    fn build(&self, identity: &Identity) -> Option<Box<dyn Service>> {
        let name = identity.name();
        let mut state = lock(&self.state);
        state.launches.push(Launch {
            package_path: PathBuf::new(),
            identity: identity.clone(),
            sandboxed: false,
        });
        if state.failing.contains(name) {
            return None;
        }
        if let Some(factory) = state.factories.get(name) {
            return Some(factory(identity));
        }

        let mut service = MockService::new();
        if state.gated.contains(name) {
            service = service.gated();
        }
        if state.capturing.contains(name) {
            service = service.capturing_connector();
        }
        state
            .services
            .entry(name.to_string())
            .or_default()
            .push(service.handle());
        Some(Box::new(service))
    }

    fn record_launch_details(&self, package_path: &Path, sandboxed: bool) {
        if let Some(launch) = lock(&self.state).launches.last_mut() {
            launch.package_path = package_path.to_path_buf();
            launch.sandboxed = sandboxed;
        }
    }
}

impl fmt::Debug for MockRunner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MockRunner")
            .field("launches", &self.launch_count())
            .field("pid", &self.pid)
            .finish()
    }
}

impl NativeRunner for MockRunner {
    fn start(
        &self,
        package_path: &Path,
        identity: &Identity,
        sandboxed: bool,
        pid_callback: PidCallback,
        completion_callback: CompletionCallback,
    ) -> LaunchedService {
        let built = self.build(identity);
        self.record_launch_details(package_path, sandboxed);
        let (service, endpoint) = ServicePipe::channel();

        let Some(hosted) = built else {
            drop(endpoint);
            pid_callback(None);
            completion_callback();
            return LaunchedService {
                service,
                handle: RunnerHandle::detached(),
            };
        };

        let task = tokio::spawn(run_service(endpoint, hosted));
        let handle = RunnerHandle::new(task.abort_handle());
        pid_callback(self.pid);
        tokio::spawn(async move {
            let _ = task.await;
            completion_callback();
        });

        LaunchedService { service, handle }
    }
}

// ---------------------------------------------------------------------------
// RecordingListener
// ---------------------------------------------------------------------------

/// One callback received by a [`RecordingListener`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ListenerCall {
    /// `on_init` with the identities alive at registration.
    Init(Vec<Identity>),
    /// `on_service_created`.
    Created(Identity),
    /// `on_service_started`.
    Started(Identity, Option<Pid>),
    /// `on_service_pid_received`.
    PidReceived(Identity, Pid),
    /// `on_service_failed_to_start`.
    FailedToStart(Identity),
    /// `on_service_stopped`.
    Stopped(Identity),
}

/// A [`ServiceManagerListener`] that records every callback.
#[derive(Debug, Default)]
pub struct RecordingListener {
    calls: Mutex<Vec<ListenerCall>>,
}

impl RecordingListener {
    /// An empty recorder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Every call so far, in order.
    #[must_use]
    pub fn calls(&self) -> Vec<ListenerCall> {
        lock(&self.calls).clone()
    }

    /// Whether `call` was recorded.
    #[must_use]
    pub fn saw(&self, call: &ListenerCall) -> bool {
        lock(&self.calls).contains(call)
    }

    /// Identities reported stopped.
    #[must_use]
    pub fn stopped(&self) -> Vec<Identity> {
        lock(&self.calls)
            .iter()
            .filter_map(|call| match call {
                ListenerCall::Stopped(identity) => Some(identity.clone()),
                _ => None,
            })
            .collect()
    }

    fn record(&self, call: ListenerCall) {
        lock(&self.calls).push(call);
    }
}

impl ServiceManagerListener for RecordingListener {
    fn on_init(&self, running: &[RunningServiceInfo]) {
        let identities = running.iter().map(|info| info.identity.clone()).collect();
        self.record(ListenerCall::Init(identities));
    }

    fn on_service_created(&self, service: &RunningServiceInfo) {
        self.record(ListenerCall::Created(service.identity.clone()));
    }

    fn on_service_started(&self, identity: &Identity, pid: Option<Pid>) {
        self.record(ListenerCall::Started(identity.clone(), pid));
    }

    fn on_service_pid_received(&self, identity: &Identity, pid: Pid) {
        self.record(ListenerCall::PidReceived(identity.clone(), pid));
    }

    fn on_service_failed_to_start(&self, identity: &Identity) {
        self.record(ListenerCall::FailedToStart(identity.clone()));
    }

    fn on_service_stopped(&self, identity: &Identity) {
        self.record(ListenerCall::Stopped(identity.clone()));
    }

    #[allow(clippy::unnecessary_literal_bound)]
    fn name(&self) -> &str {
        "recording"
    }
}

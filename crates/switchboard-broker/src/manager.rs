//! The service manager: instance registry and the connect algorithm.
//!
//! Owned by the broker loop and only ever touched from it, so nothing here
//! locks. Work that finishes elsewhere comes back as a [`BrokerTask`].

use std::collections::{HashMap, HashSet};
use std::ops::ControlFlow;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use switchboard_capabilities::{
    ALL_USERS_CAPABILITY, CLIENT_PROCESS_CAPABILITY, CONNECTOR_SPEC, INSTANCE_NAME_CAPABILITY,
    InterfaceProviderSpec, InterfaceProviderSpecMap, SERVICE_FACTORY_CAPABILITY,
    SERVICE_FACTORY_INTERFACE, SINGLETON_CAPABILITY, USER_ID_CAPABILITY, WILDCARD,
    effective_capability_request, has_capability,
};
use switchboard_catalog::{Entry, ServiceResolver};
use switchboard_core::{
    BROKER_NAME, CATALOG_NAME, ConnectResult, Identity, InstanceId, Pid, ROOT_USER_GUID,
    generate_user_id, resolve_user_id,
};
use switchboard_events::{
    BrokerEvent, EventBus, EventMetadata, InstanceState, ListenerId, RunningServiceInfo,
    ServiceManagerListener,
};
use tracing::{debug, error, info, trace, warn};

use crate::arena::{Arena, InstanceHandle};
use crate::instance::Instance;
use crate::params::ConnectParams;
use crate::pipe::{ConnectAck, ServicePipe, ServiceRequest, SourceInfo};
use crate::runner::{CompletionCallback, NativeRunner, PidCallback};
use crate::service::{Service, run_service};
use crate::task::{BrokerTask, TaskRunner};

const EVENT_SOURCE: &str = "switchboard-broker";

type Refusal = (ConnectResult, &'static str);

/// The broker's own service. It exposes no interfaces.
struct BrokerService;

#[async_trait]
impl Service for BrokerService {}

/// Connection spec of the broker's own instance: it may reach any
/// package's service factory, on behalf of any user and instance.
fn broker_specs() -> InterfaceProviderSpecMap {
    let spec = InterfaceProviderSpec::default()
        .requiring(WILDCARD, &[SERVICE_FACTORY_CAPABILITY])
        .requiring(
            BROKER_NAME,
            &[
                USER_ID_CAPABILITY,
                INSTANCE_NAME_CAPABILITY,
                CLIENT_PROCESS_CAPABILITY,
            ],
        );
    InterfaceProviderSpecMap::from([(CONNECTOR_SPEC.to_string(), spec)])
}

struct PendingConnect {
    params: ConnectParams,
    source: Option<InstanceHandle>,
}

/// Tunables for [`ServiceManager`].
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct ManagerOptions {
    pub(crate) start_timeout: Option<Duration>,
    pub(crate) first_instance_id: u32,
}

pub(crate) struct ServiceManager {
    instances: Arena<Instance>,
    index: HashMap<Identity, InstanceHandle>,
    singletons: HashSet<String>,
    pending_resolutions: HashMap<String, Vec<PendingConnect>>,
    resolver: Arc<dyn ServiceResolver>,
    runner: Arc<dyn NativeRunner>,
    tasks: Arc<dyn TaskRunner>,
    events: EventBus,
    next_instance_id: u32,
    start_timeout: Option<Duration>,
    broker_instance: Option<InstanceHandle>,
    stopped: bool,
}

impl ServiceManager {
    /// Create the manager and its own instance. Must run inside a tokio
    /// runtime.
    pub(crate) fn new(
        resolver: Arc<dyn ServiceResolver>,
        runner: Arc<dyn NativeRunner>,
        tasks: Arc<dyn TaskRunner>,
        events: EventBus,
        options: ManagerOptions,
    ) -> Self {
        let mut manager = Self {
            instances: Arena::new(),
            index: HashMap::new(),
            singletons: HashSet::from([BROKER_NAME.to_string(), CATALOG_NAME.to_string()]),
            pending_resolutions: HashMap::new(),
            resolver,
            runner,
            tasks,
            events,
            next_instance_id: options.first_instance_id,
            start_timeout: options.start_timeout,
            broker_instance: None,
            stopped: false,
        };

        let handle = manager.create_instance(Identity::broker(), broker_specs(), None);
        let (pipe, endpoint) = ServicePipe::channel();
        tokio::spawn(run_service(endpoint, Box::new(BrokerService)));
        manager.bind(handle, pipe);
        if let Some(instance) = manager.instances.get_mut(handle) {
            instance.pid = Some(std::process::id());
        }
        manager.broker_instance = Some(handle);
        manager
    }

    /// Handle one task. Breaks once the manager has shut down.
    pub(crate) fn handle(&mut self, task: BrokerTask) -> ControlFlow<()> {
        trace!(task = task.kind(), "Broker task");
        match task {
            BrokerTask::Connect { params, source } => self.connect(params, source),
            BrokerTask::Resolved { name, entry } => self.on_resolved(&name, &entry),
            BrokerTask::StartAcked(handle) => self.on_start_acked(handle),
            BrokerTask::ConnectComplete(handle) => self.on_connect_complete(handle),
            BrokerTask::ServiceLost(handle) => self.on_service_lost(handle),
            BrokerTask::ConnectorLost(handle) => self.on_connector_lost(handle),
            BrokerTask::RequestQuit(handle) => self.on_request_quit(handle),
            BrokerTask::PidReceived(handle, pid) => self.on_pid_received(handle, pid),
            BrokerTask::RunnerCompleted(handle) => self.on_runner_completed(handle),
            BrokerTask::StartTimeout(handle) => self.on_start_timeout(handle),
            BrokerTask::AddListener(listener, reply) => {
                let _ = reply.send(self.add_listener(listener));
            },
            BrokerTask::Query(reply) => {
                let _ = reply.send(self.running_services());
            },
            BrokerTask::Shutdown(reply) => {
                self.shutdown();
                let _ = reply.send(());
                return ControlFlow::Break(());
            },
        }
        ControlFlow::Continue(())
    }

    // -----------------------------------------------------------------------
    // Connect
    // -----------------------------------------------------------------------

    /// Route `params`. `source` is the issuing instance for connects that
    /// came through a connector; those are held to its connection spec.
    pub(crate) fn connect(&mut self, mut params: ConnectParams, source: Option<InstanceHandle>) {
        if let Some(handle) = source
            && !self.instances.contains(handle)
        {
            debug!(target = %params.target(), "Connector outlived its instance, dropping connect");
            return;
        }

        let caller = params.source().clone().normalized();
        let target = match resolve_user_id(params.target(), caller.user_id()) {
            Ok(target) => target,
            Err(err) => {
                warn!(target = %params.target(), error = %err, "Invalid target identity");
                self.refuse(params, ConnectResult::from(&err), "invalid target identity");
                return;
            },
        };
        params.set_source(caller);
        params.set_target(target);

        let checked = match source {
            Some(handle) => self.validate_connector_request(handle, &params),
            None => self.validate_process_binding(&params),
        };
        if let Err((result, reason)) = checked {
            self.refuse(params, result, reason);
            return;
        }

        if let Some(params) = self.connect_to_existing_instance(params, source) {
            self.queue_resolution(params, source);
        }
    }

    fn validate_connector_request(
        &self,
        source: InstanceHandle,
        params: &ConnectParams,
    ) -> Result<(), Refusal> {
        let Some(instance) = self.instances.get(source) else {
            return Err((ConnectResult::InvalidArgument, "source instance is gone"));
        };
        let spec = &instance.connection_spec;
        let target = params.target();

        if params.has_client_process() && !has_capability(spec, CLIENT_PROCESS_CAPABILITY) {
            return Err((
                ConnectResult::AccessDenied,
                "client process registration requires the client_process capability",
            ));
        }
        self.validate_process_binding(params)?;

        if target.user_id() != instance.identity.user_id()
            && target.user_id() != ROOT_USER_GUID
            && !has_capability(spec, USER_ID_CAPABILITY)
        {
            return Err((
                ConnectResult::AccessDenied,
                "connecting to another user requires the user_id capability",
            ));
        }
        if !target.has_default_instance() && !has_capability(spec, INSTANCE_NAME_CAPABILITY) {
            return Err((
                ConnectResult::AccessDenied,
                "naming an instance requires the instance_name capability",
            ));
        }
        if !spec.may_connect_to(target.name()) {
            return Err((
                ConnectResult::AccessDenied,
                "connection spec does not allow this target",
            ));
        }
        Ok(())
    }

    /// Checks for requests that bring their own service process.
    fn validate_process_binding(&self, params: &ConnectParams) -> Result<(), Refusal> {
        if let Some(client) = params.client_process()
            && client.pid_receiver.is_none()
        {
            return Err((
                ConnectResult::InvalidArgument,
                "client process registration without a pid receiver",
            ));
        }
        if (params.has_client_process() || params.has_service())
            && self.existing_instance(params.target()).is_some()
        {
            return Err((ConnectResult::InvalidArgument, "target is already running"));
        }
        Ok(())
    }

    /// Forward to a live instance if one matches. Hands `params` back when
    /// there is none.
    fn connect_to_existing_instance(
        &mut self,
        params: ConnectParams,
        source: Option<InstanceHandle>,
    ) -> Option<ConnectParams> {
        let Some(handle) = self.existing_instance(params.target()) else {
            return Some(params);
        };
        if params.has_client_process() || params.has_service() {
            self.refuse(params, ConnectResult::InvalidArgument, "target is already running");
            return None;
        }
        self.connect_to_service(handle, params, source);
        None
    }

    fn existing_instance(&self, identity: &Identity) -> Option<InstanceHandle> {
        if let Some(handle) = self.index.get(identity) {
            return Some(*handle);
        }
        if self.singletons.contains(identity.name()) {
            return self
                .index
                .iter()
                .find(|(key, _)| key.same_service_instance(identity))
                .map(|(_, handle)| *handle);
        }
        None
    }

    fn queue_resolution(&mut self, params: ConnectParams, source: Option<InstanceHandle>) {
        let name = params.target().name().to_string();
        let waiters = self.pending_resolutions.entry(name.clone()).or_default();
        waiters.push(PendingConnect { params, source });
        if waiters.len() > 1 {
            debug!(service = %name, waiting = waiters.len(), "Joined pending resolution");
            return;
        }

        debug!(service = %name, "Resolving service");
        let tasks = Arc::clone(&self.tasks);
        let resolved = name.clone();
        self.resolver.resolve(
            &name,
            Box::new(move |entry| {
                tasks.post_task(BrokerTask::Resolved {
                    name: resolved,
                    entry,
                });
            }),
        );
    }

    fn on_resolved(&mut self, name: &str, entry: &Arc<Entry>) {
        let Some(waiters) = self.pending_resolutions.remove(name) else {
            warn!(service = %name, "Resolution with nobody waiting");
            return;
        };
        debug!(service = %name, waiting = waiters.len(), "Service resolved");
        for PendingConnect { params, source } in waiters {
            self.connect_resolved(params, source, entry);
        }
    }

    fn connect_resolved(
        &mut self,
        mut params: ConnectParams,
        source: Option<InstanceHandle>,
        entry: &Arc<Entry>,
    ) {
        if let Some(handle) = source
            && !self.instances.contains(handle)
        {
            debug!(target = %params.target(), "Source destroyed during resolution, dropping connect");
            return;
        }

        let spec = entry.connection_spec();
        let mut target = params.target().clone();
        let mut broker_owned = false;
        if has_capability(&spec, ALL_USERS_CAPABILITY) {
            target.set_user_id(generate_user_id());
            self.singletons.insert(target.name().to_string());
            broker_owned = true;
        } else if has_capability(&spec, SINGLETON_CAPABILITY) {
            target.set_user_id(ROOT_USER_GUID);
            self.singletons.insert(target.name().to_string());
            broker_owned = true;
        }
        params.set_target(target);

        // Another waiter on the same resolution may have created it.
        let Some(mut params) = self.connect_to_existing_instance(params, source) else {
            return;
        };

        let parent = if broker_owned {
            self.broker_instance
        } else {
            source.or(self.broker_instance)
        };
        let handle = self.create_instance(params.target().clone(), entry.specs().clone(), parent);

        if let Some(service) = params.take_service() {
            self.bind(handle, service);
        } else if let Some(client) = params.take_client_process() {
            self.bind(handle, client.service);
            if let Some(pid_receiver) = client.pid_receiver {
                let tasks = Arc::clone(&self.tasks);
                tokio::spawn(async move {
                    if let Ok(pid) = pid_receiver.await {
                        tasks.post_task(BrokerTask::PidReceived(handle, Some(pid)));
                    } else {
                        trace!("Client process never reported a pid");
                    }
                });
            }
            params.complete(ConnectResult::Succeeded);
            return;
        } else if let Some(package) = entry.parent() {
            self.start_packaged(handle, &package);
        } else {
            self.launch(handle, entry);
        }

        self.connect_to_service(handle, params, source);
    }

    /// Deliver `params` to a live instance, checking the requested
    /// interface against what the source is granted there. Embedder
    /// connects (no source instance) are granted what the broker is.
    fn connect_to_service(
        &mut self,
        handle: InstanceHandle,
        mut params: ConnectParams,
        source: Option<InstanceHandle>,
    ) {
        let source_spec = source
            .or(self.broker_instance)
            .and_then(|source| self.instances.get(source))
            .map(|source| source.connection_spec.clone())
            .unwrap_or_default();

        let Some(instance) = self.instances.get(handle) else {
            self.refuse(params, ConnectResult::InvalidArgument, "target instance is gone");
            return;
        };
        params.set_target(instance.identity.clone());

        let capabilities =
            effective_capability_request(&source_spec, &instance.identity, &instance.connection_spec);
        let interface = if params.is_create_service() {
            Some(SERVICE_FACTORY_INTERFACE)
        } else {
            params.interface_name()
        };
        if let Some(interface) = interface
            && !capabilities.allows_interface(interface)
        {
            warn!(
                source = %params.source(),
                target = %instance.identity,
                interface,
                "Interface not granted by capability request"
            );
            self.refuse(params, ConnectResult::AccessDenied, "interface not granted");
            return;
        }
        if instance.service.is_none() {
            self.refuse(params, ConnectResult::InvalidArgument, "target has no service bound");
            return;
        }

        let ack = ConnectAck::new(Arc::clone(&self.tasks), handle);
        let source = SourceInfo {
            identity: params.source().clone(),
            capabilities,
        };
        let request = match params.take_create_service() {
            Some(create) => ServiceRequest::CreateService {
                source,
                name: create.name,
                endpoint: create.endpoint,
                ack,
            },
            None => ServiceRequest::Connect {
                source,
                request: params.take_interface_request(),
                ack,
            },
        };

        let Some(instance) = self.instances.get_mut(handle) else {
            return;
        };
        instance.pending_connection_count = instance.pending_connection_count.saturating_add(1);
        if let Some(service) = instance.service.as_ref()
            && service.send(request).is_err()
        {
            // The returned request drops its ack, which balances the count.
            debug!(identity = %instance.identity, "Service endpoint closed before delivery");
        }
        debug!(
            source = %params.source(),
            target = %instance.identity,
            pending = instance.pending_connection_count,
            "Connect delivered"
        );
        params.complete(ConnectResult::Succeeded);
    }

    fn refuse(&self, params: ConnectParams, result: ConnectResult, reason: &'static str) {
        error!(
            source = %params.source(),
            target = %params.target(),
            result = %result,
            reason,
            "Connect refused"
        );
        self.events.publish(BrokerEvent::ConnectionRefused {
            metadata: EventMetadata::new(EVENT_SOURCE),
            source: params.source().clone(),
            target: params.target().clone(),
            result,
        });
        params.complete(result);
    }

    // -----------------------------------------------------------------------
    // Starting instances
    // -----------------------------------------------------------------------

    fn create_instance(
        &mut self,
        identity: Identity,
        specs: InterfaceProviderSpecMap,
        parent: Option<InstanceHandle>,
    ) -> InstanceHandle {
        let id = InstanceId(self.next_instance_id);
        self.next_instance_id = self.next_instance_id.wrapping_add(1);

        let parent = parent.filter(|p| self.instances.contains(*p));
        let instance = Instance::new(id, identity.clone(), specs, parent);
        let info = instance.info();
        let handle = self.instances.insert(instance);
        self.index.insert(identity.clone(), handle);
        if let Some(parent) = parent
            && let Some(parent) = self.instances.get_mut(parent)
        {
            parent.children.insert(handle);
        }

        info!(identity = %identity, instance_id = %id, "Created instance");
        self.events.publish(BrokerEvent::ServiceCreated {
            metadata: EventMetadata::new(EVENT_SOURCE),
            service: info,
        });
        handle
    }

    fn bind(&mut self, handle: InstanceHandle, service: ServicePipe) {
        let timeout = self.start_timeout;
        if let Some(instance) = self.instances.get_mut(handle) {
            instance.start(handle, service, &self.tasks, timeout);
        }
    }

    /// Launch through the native runner from the entry's package path.
    fn launch(&mut self, handle: InstanceHandle, entry: &Entry) {
        let Some(identity) = self.instances.get(handle).map(|i| i.identity.clone()) else {
            return;
        };
        let pid_tasks = Arc::clone(&self.tasks);
        let pid_callback: PidCallback =
            Box::new(move |pid| pid_tasks.post_task(BrokerTask::PidReceived(handle, pid)));
        let done_tasks = Arc::clone(&self.tasks);
        let completion_callback: CompletionCallback =
            Box::new(move || done_tasks.post_task(BrokerTask::RunnerCompleted(handle)));

        debug!(identity = %identity, package = %entry.package_path().display(), "Launching service");
        let launched = self.runner.start(
            entry.package_path(),
            &identity,
            entry.sandboxed(),
            pid_callback,
            completion_callback,
        );
        if let Some(instance) = self.instances.get_mut(handle) {
            instance.runner = Some(launched.handle);
        }
        self.bind(handle, launched.service);
    }

    /// Bind a fresh pipe and ask the owning package to host the service on
    /// it, through a connect to the package's service factory.
    fn start_packaged(&mut self, handle: InstanceHandle, package: &Entry) {
        let Some(target) = self.instances.get(handle).map(|i| i.identity.clone()) else {
            return;
        };

        let package_identity = if has_capability(&package.connection_spec(), ALL_USERS_CAPABILITY)
        {
            Identity::with_instance(package.name(), ROOT_USER_GUID, package.name())
        } else if target.has_default_instance() {
            Identity::new(package.name(), target.user_id())
        } else {
            Identity::with_instance(package.name(), target.user_id(), target.instance())
        };

        let (pipe, endpoint) = ServicePipe::channel();
        self.bind(handle, pipe);

        debug!(identity = %target, package = %package_identity, "Starting packaged service");
        let member = target.clone();
        let params = ConnectParams::new(Identity::broker(), package_identity)
            .with_create_service(target.name().to_string(), endpoint)
            .with_callback(move |result, _| {
                if !result.is_success() {
                    warn!(identity = %member, result = %result, "Package refused to host service");
                }
            });
        self.connect(params, None);
    }

    // -----------------------------------------------------------------------
    // Instance lifecycle
    // -----------------------------------------------------------------------

    fn on_start_acked(&mut self, handle: InstanceHandle) {
        let Some(instance) = self.instances.get_mut(handle) else {
            return;
        };
        if !instance.mark_started() {
            return;
        }
        info!(identity = %instance.identity, pid = ?instance.pid, "Service started");
        let event = BrokerEvent::ServiceStarted {
            metadata: EventMetadata::new(EVENT_SOURCE),
            identity: instance.identity.clone(),
            pid: instance.pid,
        };
        self.events.publish(event);
    }

    fn on_connect_complete(&mut self, handle: InstanceHandle) {
        let Some(instance) = self.instances.get_mut(handle) else {
            return;
        };
        instance.pending_connection_count = instance.pending_connection_count.saturating_sub(1);
        self.destroy_if_unused(handle);
    }

    fn on_service_lost(&mut self, handle: InstanceHandle) {
        if let Some(instance) = self.instances.get(handle)
            && !instance.is_destroying()
        {
            info!(identity = %instance.identity, "Service connection lost");
            self.lose_service(handle);
        }
    }

    fn on_connector_lost(&mut self, handle: InstanceHandle) {
        let Some(instance) = self.instances.get_mut(handle) else {
            return;
        };
        instance.connector_bound = false;
        self.destroy_if_unused(handle);
    }

    fn on_request_quit(&mut self, handle: InstanceHandle) {
        let Some(instance) = self.instances.get(handle) else {
            return;
        };
        if instance.pending_connection_count > 0 {
            debug!(
                identity = %instance.identity,
                pending = instance.pending_connection_count,
                "Ignoring quit request while connects are pending"
            );
            return;
        }
        info!(identity = %instance.identity, "Service requested quit");
        self.lose_service(handle);
    }

    fn on_pid_received(&mut self, handle: InstanceHandle, pid: Option<Pid>) {
        let Some(instance) = self.instances.get_mut(handle) else {
            return;
        };
        let Some(pid) = pid else {
            error!(identity = %instance.identity, "Service failed to launch");
            self.teardown(handle, true);
            return;
        };
        instance.pid = Some(pid);
        info!(identity = %instance.identity, pid, "Service pid received");
        let event = BrokerEvent::ServicePidReceived {
            metadata: EventMetadata::new(EVENT_SOURCE),
            identity: instance.identity.clone(),
            pid,
        };
        self.events.publish(event);
    }

    fn on_runner_completed(&mut self, handle: InstanceHandle) {
        let Some(instance) = self.instances.get_mut(handle) else {
            return;
        };
        if instance.is_destroying() || instance.runner.take().is_none() {
            return;
        }
        debug!(identity = %instance.identity, "Service process exited");
        self.lose_service(handle);
    }

    fn on_start_timeout(&mut self, handle: InstanceHandle) {
        if let Some(instance) = self.instances.get(handle)
            && instance.state == InstanceState::Starting
        {
            warn!(identity = %instance.identity, "Service did not acknowledge start in time");
            self.teardown(handle, true);
        }
    }

    /// Hang up on the service and stop routing to the instance. It is
    /// destroyed as soon as nothing uses it any more.
    fn lose_service(&mut self, handle: InstanceHandle) {
        if let Some(instance) = self.instances.get_mut(handle) {
            instance.drop_service();
        }
        self.unindex(handle);
        self.destroy_if_unused(handle);
    }

    fn destroy_if_unused(&mut self, handle: InstanceHandle) {
        if self
            .instances
            .get(handle)
            .is_some_and(|i| i.is_unused() && !i.is_destroying())
        {
            self.destroy(handle);
        }
    }

    fn unindex(&mut self, handle: InstanceHandle) {
        if let Some(instance) = self.instances.get(handle)
            && self.index.get(&instance.identity) == Some(&handle)
        {
            self.index.remove(&instance.identity);
        }
    }

    /// Tear down `handle` and everything it owns.
    fn destroy(&mut self, handle: InstanceHandle) {
        self.teardown(handle, false);
    }

    /// Tear down `handle`. A `launch_failed` instance is reported as having
    /// failed to start even if it already acknowledged its start.
    fn teardown(&mut self, handle: InstanceHandle, launch_failed: bool) {
        let Some(instance) = self.instances.get_mut(handle) else {
            return;
        };
        if instance.is_destroying() {
            return;
        }
        let started = instance.state == InstanceState::Started;
        instance.state = InstanceState::Destroying;
        let children = std::mem::take(&mut instance.children);
        let parent = instance.parent;

        for child in children {
            self.destroy(child);
        }
        if let Some(parent) = parent
            && let Some(parent) = self.instances.get_mut(parent)
        {
            parent.children.remove(&handle);
        }
        self.unindex(handle);

        let Some(instance) = self.instances.remove(handle) else {
            return;
        };
        let identity = instance.identity.clone();
        info!(identity = %identity, instance_id = %instance.id, "Destroyed instance");
        // Hangs up on the service and releases the runner.
        drop(instance);

        let metadata = EventMetadata::new(EVENT_SOURCE);
        self.events.publish(if started && !launch_failed {
            BrokerEvent::ServiceStopped { metadata, identity }
        } else {
            BrokerEvent::ServiceFailedToStart { metadata, identity }
        });
    }

    // -----------------------------------------------------------------------
    // Queries and listeners
    // -----------------------------------------------------------------------

    pub(crate) fn running_services(&self) -> Vec<RunningServiceInfo> {
        let mut running: Vec<_> = self
            .instances
            .iter()
            .filter(|(_, instance)| !instance.is_destroying())
            .map(|(_, instance)| instance.info())
            .collect();
        running.sort_by_key(|info| info.id);
        running
    }

    fn add_listener(&self, listener: Arc<dyn ServiceManagerListener>) -> ListenerId {
        let running = self.running_services();
        if catch_unwind(AssertUnwindSafe(|| listener.on_init(&running))).is_err() {
            error!(listener = listener.name(), "Listener panicked in on_init");
        }
        self.events.listeners().register(listener)
    }

    /// Destroy every root instance. Idempotent.
    pub(crate) fn shutdown(&mut self) {
        if self.stopped {
            return;
        }
        self.stopped = true;
        info!(instances = self.instances.len(), "Shutting down broker");

        let mut roots: Vec<_> = self
            .instances
            .iter()
            .filter(|(_, instance)| instance.parent.is_none())
            .map(|(handle, instance)| (instance.id, handle))
            .collect();
        roots.sort();
        for (_, handle) in roots {
            self.destroy(handle);
        }
        self.pending_resolutions.clear();
        self.broker_instance = None;

        self.events.publish(BrokerEvent::BrokerStopped {
            metadata: EventMetadata::new(EVENT_SOURCE),
        });
    }
}

#[cfg(test)]
mod tests {
    use std::path::Path;

    use switchboard_catalog::{Manifest, ResolveCallback};
    use tokio::sync::mpsc;

    use super::*;
    use crate::runner::InProcessRunner;
    use crate::task::ChannelTaskRunner;

    const ALICE: &str = "7c1d1bd4-5a8e-4c43-9cf3-7bb9f8ab2a11";

    /// Resolves every name to a manifest-less placeholder.
    struct Placeholders;

    impl ServiceResolver for Placeholders {
        fn resolve(&self, name: &str, callback: ResolveCallback) {
            callback(Entry::placeholder(name, Path::new("/nowhere")));
        }
    }

    struct Harness {
        manager: ServiceManager,
        rx: mpsc::UnboundedReceiver<BrokerTask>,
        _tx: mpsc::UnboundedSender<BrokerTask>,
    }

    impl Harness {
        fn new(first_instance_id: u32) -> Self {
            let (tx, rx) = mpsc::unbounded_channel();
            let manager = ServiceManager::new(
                Arc::new(Placeholders),
                Arc::new(InProcessRunner::new()),
                Arc::new(ChannelTaskRunner::new(&tx)),
                EventBus::new(),
                ManagerOptions {
                    start_timeout: None,
                    first_instance_id,
                },
            );
            Self { manager, rx, _tx: tx }
        }

        /// Run queued tasks until none arrive for a moment.
        async fn settle(&mut self) {
            while let Ok(Some(task)) =
                tokio::time::timeout(Duration::from_millis(50), self.rx.recv()).await
            {
                let _ = self.manager.handle(task);
            }
        }
    }

    #[tokio::test]
    async fn test_broker_instance_exists_at_construction() {
        let mut h = Harness::new(7);
        h.settle().await;
        let running = h.manager.running_services();
        assert_eq!(running.len(), 1);
        assert_eq!(running[0].identity, Identity::broker());
        assert_eq!(running[0].id, InstanceId(7));
        assert_eq!(running[0].state, InstanceState::Started);
        assert_eq!(running[0].pid, Some(std::process::id()));
    }

    #[tokio::test]
    async fn test_singleton_alias_ignores_user() {
        let h = Harness::new(0);
        let elsewhere = Identity::with_instance(BROKER_NAME, ALICE, BROKER_NAME);
        assert_eq!(h.manager.existing_instance(&elsewhere), h.manager.broker_instance);
        let other = Identity::with_instance("fetcher", ALICE, "fetcher");
        assert!(h.manager.existing_instance(&other).is_none());
    }

    #[tokio::test]
    async fn test_failed_launch_is_reported_and_cleaned_up() {
        let mut h = Harness::new(0);
        let events = h.manager.events.clone();
        let mut rx = events.subscribe();
        h.manager.connect(
            ConnectParams::new(Identity::broker(), Identity::new("ghost", ALICE)),
            None,
        );
        h.settle().await;

        assert_eq!(h.manager.running_services().len(), 1);
        let mut kinds = Vec::new();
        while let Some(event) = rx.try_recv() {
            kinds.push(event.event_type());
        }
        assert!(kinds.contains(&"service_created"));
        assert!(kinds.contains(&"service_failed_to_start"));
        assert!(!kinds.contains(&"service_stopped"));
    }

    #[tokio::test]
    async fn test_connector_policy_denies_unlisted_target() {
        let mut h = Harness::new(0);
        let manifest = Manifest::new("a", "A");
        let entry = Entry::from_manifest(&manifest, Path::new("/a")).unwrap();
        let handle = h.manager.create_instance(
            Identity::new("a", ALICE).normalized(),
            entry.specs().clone(),
            None,
        );
        let params = ConnectParams::new(Identity::new("a", ALICE), Identity::new("b", ALICE));
        assert_eq!(
            h.manager.validate_connector_request(handle, &params),
            Err((
                ConnectResult::AccessDenied,
                "connection spec does not allow this target"
            ))
        );
        h.settle().await;
    }

    #[tokio::test]
    async fn test_shutdown_destroys_everything_once() {
        let mut h = Harness::new(0);
        h.settle().await;
        h.manager.shutdown();
        assert!(h.manager.running_services().is_empty());
        h.manager.shutdown();
        h.settle().await;
    }
}

//! One running (or starting) service instance.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use switchboard_capabilities::{InterfaceProviderSpec, InterfaceProviderSpecMap, connection_spec};
use switchboard_core::{Identity, InstanceId, Pid};
use switchboard_events::{InstanceState, RunningServiceInfo};
use tokio_util::sync::{CancellationToken, DropGuard};
use tracing::{debug, warn};

use crate::arena::InstanceHandle;
use crate::connector::Connector;
use crate::pipe::{ServicePipe, ServiceRequest, StartAck};
use crate::runner::RunnerHandle;
use crate::task::{BrokerTask, TaskRunner};

pub(crate) struct Instance {
    pub(crate) id: InstanceId,
    pub(crate) identity: Identity,
    pub(crate) specs: InterfaceProviderSpecMap,
    pub(crate) connection_spec: InterfaceProviderSpec,
    pub(crate) state: InstanceState,
    pub(crate) pid: Option<Pid>,
    pub(crate) parent: Option<InstanceHandle>,
    pub(crate) children: BTreeSet<InstanceHandle>,
    pub(crate) pending_connection_count: usize,
    pub(crate) connector_bound: bool,
    pub(crate) service: Option<ServicePipe>,
    pub(crate) runner: Option<RunnerHandle>,
    watch: Option<DropGuard>,
}

impl Instance {
    pub(crate) fn new(
        id: InstanceId,
        identity: Identity,
        specs: InterfaceProviderSpecMap,
        parent: Option<InstanceHandle>,
    ) -> Self {
        let connection_spec = connection_spec(&specs);
        Self {
            id,
            identity,
            specs,
            connection_spec,
            state: InstanceState::Idle,
            pid: None,
            parent,
            children: BTreeSet::new(),
            pending_connection_count: 0,
            connector_bound: false,
            service: None,
            runner: None,
            watch: None,
        }
    }

    pub(crate) fn info(&self) -> RunningServiceInfo {
        RunningServiceInfo {
            id: self.id,
            identity: self.identity.clone(),
            pid: self.pid,
            state: self.state,
        }
    }

    pub(crate) fn is_destroying(&self) -> bool {
        self.state == InstanceState::Destroying
    }

    /// Bind `service`, send it `Start` and watch for it going away.
    ///
    /// Only valid from `Idle`; returns `false` otherwise.
    pub(crate) fn start(
        &mut self,
        handle: InstanceHandle,
        service: ServicePipe,
        tasks: &Arc<dyn TaskRunner>,
        start_timeout: Option<Duration>,
    ) -> bool {
        if self.state != InstanceState::Idle {
            warn!(identity = %self.identity, state = %self.state, "Instance already started");
            return false;
        }

        let connector = Connector::new(Arc::clone(tasks), handle, self.identity.clone());
        let start = ServiceRequest::Start {
            identity: self.identity.clone(),
            specs: self.specs.clone(),
            connector,
            ack: StartAck::new(Arc::clone(tasks), handle),
        };
        if service.send(start).is_err() {
            debug!(identity = %self.identity, "Service endpoint already closed");
        }

        let token = CancellationToken::new();
        let watch = service.watch();
        let cancelled = token.clone();
        let watch_tasks = Arc::clone(tasks);
        tokio::spawn(async move {
            tokio::select! {
                () = cancelled.cancelled() => {},
                () = watch.closed() => watch_tasks.post_task(BrokerTask::ServiceLost(handle)),
            }
        });

        if let Some(timeout) = start_timeout {
            tasks.post_delayed_task(BrokerTask::StartTimeout(handle), timeout);
        }

        self.service = Some(service);
        self.watch = Some(token.drop_guard());
        self.connector_bound = true;
        self.state = InstanceState::Starting;
        true
    }

    /// `Starting → Started`. Returns whether the transition happened.
    pub(crate) fn mark_started(&mut self) -> bool {
        if self.state == InstanceState::Starting {
            self.state = InstanceState::Started;
            true
        } else {
            false
        }
    }

    /// Hang up on the service.
    pub(crate) fn drop_service(&mut self) {
        self.watch = None;
        self.service = None;
    }

    /// Nothing can reach or use this instance any more.
    pub(crate) fn is_unused(&self) -> bool {
        self.service.is_none() && !self.connector_bound && self.pending_connection_count == 0
    }
}

#[cfg(test)]
mod tests {
    use switchboard_core::ROOT_USER_GUID;
    use tokio::sync::mpsc;

    use super::*;
    use crate::task::ChannelTaskRunner;

    fn instance() -> Instance {
        Instance::new(
            InstanceId(1),
            Identity::new("b", ROOT_USER_GUID).normalized(),
            InterfaceProviderSpecMap::new(),
            None,
        )
    }

    #[tokio::test]
    async fn test_start_sends_start_and_binds() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let tasks: Arc<dyn TaskRunner> = Arc::new(ChannelTaskRunner::new(&tx));
        let (pipe, mut endpoint) = ServicePipe::channel();
        let mut inst = instance();

        assert!(inst.start(InstanceHandle::new(0, 0), pipe, &tasks, None));
        assert_eq!(inst.state, InstanceState::Starting);
        assert!(inst.connector_bound);
        assert!(matches!(
            endpoint.recv().await,
            Some(ServiceRequest::Start { .. })
        ));

        let (again, _endpoint) = ServicePipe::channel();
        assert!(!inst.start(InstanceHandle::new(0, 0), again, &tasks, None));
    }

    #[tokio::test]
    async fn test_closed_endpoint_reports_service_lost() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let tasks: Arc<dyn TaskRunner> = Arc::new(ChannelTaskRunner::new(&tx));
        let (pipe, endpoint) = ServicePipe::channel();
        let mut inst = instance();
        inst.start(InstanceHandle::new(4, 2), pipe, &tasks, None);
        drop(endpoint);

        // The queued Start carried the connector, so its binding goes too.
        let mut kinds = vec![rx.recv().await.unwrap().kind(), rx.recv().await.unwrap().kind()];
        kinds.sort_unstable();
        assert_eq!(kinds, vec!["connector_lost", "service_lost"]);
    }

    #[tokio::test]
    async fn test_drop_service_hangs_up() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let tasks: Arc<dyn TaskRunner> = Arc::new(ChannelTaskRunner::new(&tx));
        let (pipe, mut endpoint) = ServicePipe::channel();
        let mut inst = instance();
        inst.start(InstanceHandle::new(0, 0), pipe, &tasks, None);
        assert!(endpoint.recv().await.is_some());

        inst.drop_service();
        assert!(endpoint.recv().await.is_none());
        inst.connector_bound = false;
        assert!(inst.is_unused());
    }

    #[test]
    fn test_mark_started_only_from_starting() {
        let mut inst = instance();
        assert!(!inst.mark_started());
        inst.state = InstanceState::Starting;
        assert!(inst.mark_started());
        assert_eq!(inst.state, InstanceState::Started);
    }
}

//! The pipe between the broker and one service.
//!
//! The broker holds the [`ServicePipe`]; the service drains the matching
//! [`ServiceEndpoint`]. Dropping the endpoint is how a service (or the
//! process hosting it) goes away, and the broker notices through
//! [`ServicePipe::closed`].

use std::fmt;
use std::sync::Arc;

use switchboard_capabilities::{CapabilityRequest, InterfaceProviderSpecMap};
use switchboard_core::{Identity, MessagePipe, PipeClosed};
use tokio::sync::mpsc;

use crate::arena::InstanceHandle;
use crate::connector::Connector;
use crate::task::{BrokerTask, TaskRunner};

/// Who is connecting, and what they were granted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceInfo {
    /// Identity of the connecting service.
    pub identity: Identity,
    /// Capabilities and interfaces granted on the receiving service.
    pub capabilities: CapabilityRequest,
}

/// A request to bind one named interface.
#[derive(Debug)]
pub struct InterfaceRequest {
    /// Interface name, for example `net.Fetcher`.
    pub interface_name: String,
    /// The receiving end of the interface pipe.
    pub pipe: MessagePipe,
}

impl InterfaceRequest {
    /// Create a request for `interface_name` and return the caller's end
    /// of the pipe alongside it.
    #[must_use]
    pub fn new(interface_name: impl Into<String>) -> (Self, MessagePipe) {
        let (local, remote) = MessagePipe::pair();
        (
            Self {
                interface_name: interface_name.into(),
                pipe: remote,
            },
            local,
        )
    }
}

/// Acknowledges a `Start` request.
///
/// Dropping it without calling [`acknowledge`](Self::acknowledge) leaves the
/// instance starting.
#[must_use = "the instance stays in the starting state until acknowledged"]
pub struct StartAck {
    tasks: Arc<dyn TaskRunner>,
    instance: InstanceHandle,
}

impl StartAck {
    pub(crate) fn new(tasks: Arc<dyn TaskRunner>, instance: InstanceHandle) -> Self {
        Self { tasks, instance }
    }

    /// Tell the broker the service is up.
    pub fn acknowledge(self) {
        self.tasks.post_task(BrokerTask::StartAcked(self.instance));
    }
}

impl fmt::Debug for StartAck {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StartAck").field("instance", &self.instance).finish()
    }
}

/// Acknowledges one delivered connect. Completion is reported when the
/// ack is dropped, whether or not the service handled the request.
pub struct ConnectAck {
    tasks: Arc<dyn TaskRunner>,
    instance: InstanceHandle,
}

impl ConnectAck {
    pub(crate) fn new(tasks: Arc<dyn TaskRunner>, instance: InstanceHandle) -> Self {
        Self { tasks, instance }
    }

    /// Tell the broker the connect has been handled.
    pub fn acknowledge(self) {
        drop(self);
    }
}

impl Drop for ConnectAck {
    fn drop(&mut self) {
        self.tasks.post_task(BrokerTask::ConnectComplete(self.instance));
    }
}

impl fmt::Debug for ConnectAck {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectAck").field("instance", &self.instance).finish()
    }
}

/// What the broker asks of a service.
#[derive(Debug)]
pub enum ServiceRequest {
    /// First message on every pipe.
    Start {
        /// Resolved identity of the instance.
        identity: Identity,
        /// The instance's interface provider specs.
        specs: InterfaceProviderSpecMap,
        /// The instance's connect surface.
        connector: Connector,
        /// Acknowledge once started.
        ack: StartAck,
    },
    /// Another service connected.
    Connect {
        /// The connecting service and its grant.
        source: SourceInfo,
        /// Interface to bind, if any.
        request: Option<InterfaceRequest>,
        /// Dropped when handled.
        ack: ConnectAck,
    },
    /// A package is asked to host one of its services.
    CreateService {
        /// The broker, acting on behalf of the package member.
        source: SourceInfo,
        /// Name of the packaged service.
        name: String,
        /// Endpoint the new service must drain.
        endpoint: ServiceEndpoint,
        /// Dropped when handled.
        ack: ConnectAck,
    },
}

/// Broker side of a service pipe.
#[derive(Debug)]
pub struct ServicePipe {
    tx: mpsc::UnboundedSender<ServiceRequest>,
}

impl ServicePipe {
    /// Create a connected pipe and endpoint.
    #[must_use]
    pub fn channel() -> (Self, ServiceEndpoint) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, ServiceEndpoint { rx })
    }

    /// Queue a request for the service.
    ///
    /// # Errors
    ///
    /// Returns the request back if the endpoint is gone.
    pub(crate) fn send(&self, request: ServiceRequest) -> Result<(), Box<ServiceRequest>> {
        self.tx.send(request).map_err(|err| Box::new(err.0))
    }

    /// Whether the endpoint has been dropped.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }

    /// A watch on endpoint closure that does not keep the pipe open.
    pub(crate) fn watch(&self) -> PipeWatch {
        PipeWatch {
            tx: self.tx.clone(),
        }
    }
}

/// Resolves once the endpoint is dropped. Must itself be dropped for the
/// broker's own hang-up to reach the service.
pub(crate) struct PipeWatch {
    tx: mpsc::UnboundedSender<ServiceRequest>,
}

impl PipeWatch {
    pub(crate) async fn closed(&self) {
        self.tx.closed().await;
    }
}

/// Service side of a service pipe.
#[derive(Debug)]
pub struct ServiceEndpoint {
    rx: mpsc::UnboundedReceiver<ServiceRequest>,
}

impl ServiceEndpoint {
    /// Next request. `None` once the broker has hung up.
    pub async fn recv(&mut self) -> Option<ServiceRequest> {
        self.rx.recv().await
    }

    /// Non-blocking receive.
    ///
    /// # Errors
    ///
    /// Returns [`PipeClosed`] once the broker has hung up and nothing is
    /// queued.
    pub fn try_recv(&mut self) -> Result<Option<ServiceRequest>, PipeClosed> {
        match self.rx.try_recv() {
            Ok(request) => Ok(Some(request)),
            Err(mpsc::error::TryRecvError::Empty) => Ok(None),
            Err(mpsc::error::TryRecvError::Disconnected) => Err(PipeClosed),
        }
    }
}

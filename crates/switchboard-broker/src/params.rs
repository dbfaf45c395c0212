//! Connection requests.

use std::fmt;

use switchboard_core::{ConnectResult, Identity, Pid};
use tokio::sync::oneshot;

use crate::pipe::{InterfaceRequest, ServiceEndpoint, ServicePipe};

/// Completion handler for a connect: the result and the user id the target
/// resolved to.
pub type ConnectCallback = Box<dyn FnOnce(ConnectResult, &str) + Send + 'static>;

/// What a finished connect reports.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectOutcome {
    /// Result code.
    pub result: ConnectResult,
    /// User id the target resolved to. Empty if the target never resolved.
    pub user_id: String,
}

impl ConnectOutcome {
    /// Whether the connect succeeded.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.result.is_success()
    }
}

/// A process that is already running and wants to be bound as the target
/// instance instead of being launched by the broker.
#[derive(Debug)]
pub struct ClientProcessConnection {
    /// Pipe to the service hosted by the process.
    pub service: ServicePipe,
    /// Delivers the process id once known. Required.
    pub pid_receiver: Option<oneshot::Receiver<Pid>>,
}

impl ClientProcessConnection {
    /// Bundle a service pipe with the receiver for its pid.
    #[must_use]
    pub fn new(service: ServicePipe, pid_receiver: oneshot::Receiver<Pid>) -> Self {
        Self {
            service,
            pid_receiver: Some(pid_receiver),
        }
    }
}

pub(crate) struct CreateServiceRequest {
    pub(crate) name: String,
    pub(crate) endpoint: ServiceEndpoint,
}

/// One connection request. Consumed exactly once: either delivered to an
/// instance or completed with a failure.
pub struct ConnectParams {
    source: Identity,
    target: Identity,
    interface_request: Option<InterfaceRequest>,
    service: Option<ServicePipe>,
    client_process: Option<ClientProcessConnection>,
    create_service: Option<CreateServiceRequest>,
    callback: Option<ConnectCallback>,
}

impl ConnectParams {
    /// Request a connection from `source` to `target`.
    #[must_use]
    pub fn new(source: Identity, target: Identity) -> Self {
        Self {
            source,
            target,
            interface_request: None,
            service: None,
            client_process: None,
            create_service: None,
            callback: None,
        }
    }

    /// Ask the target to bind an interface.
    #[must_use]
    pub fn with_interface_request(mut self, request: InterfaceRequest) -> Self {
        self.interface_request = Some(request);
        self
    }

    /// Bind an already running process as the target.
    #[must_use]
    pub fn with_client_process(mut self, connection: ClientProcessConnection) -> Self {
        self.client_process = Some(connection);
        self
    }

    /// Run `callback` on completion.
    #[must_use]
    pub fn with_callback(
        mut self,
        callback: impl FnOnce(ConnectResult, &str) + Send + 'static,
    ) -> Self {
        self.callback = Some(Box::new(callback));
        self
    }

    pub(crate) fn with_service(mut self, service: ServicePipe) -> Self {
        self.service = Some(service);
        self
    }

    pub(crate) fn with_create_service(mut self, name: String, endpoint: ServiceEndpoint) -> Self {
        self.create_service = Some(CreateServiceRequest { name, endpoint });
        self
    }

    /// Requesting identity.
    #[must_use]
    pub fn source(&self) -> &Identity {
        &self.source
    }

    /// Requested target.
    #[must_use]
    pub fn target(&self) -> &Identity {
        &self.target
    }

    /// Name of the requested interface, if any.
    #[must_use]
    pub fn interface_name(&self) -> Option<&str> {
        self.interface_request
            .as_ref()
            .map(|request| request.interface_name.as_str())
    }

    /// Whether a client process rides along.
    #[must_use]
    pub fn has_client_process(&self) -> bool {
        self.client_process.is_some()
    }

    pub(crate) fn client_process(&self) -> Option<&ClientProcessConnection> {
        self.client_process.as_ref()
    }

    pub(crate) fn has_service(&self) -> bool {
        self.service.is_some()
    }

    pub(crate) fn is_create_service(&self) -> bool {
        self.create_service.is_some()
    }

    pub(crate) fn set_source(&mut self, source: Identity) {
        self.source = source;
    }

    pub(crate) fn set_target(&mut self, target: Identity) {
        self.target = target;
    }

    pub(crate) fn take_interface_request(&mut self) -> Option<InterfaceRequest> {
        self.interface_request.take()
    }

    pub(crate) fn take_service(&mut self) -> Option<ServicePipe> {
        self.service.take()
    }

    pub(crate) fn take_client_process(&mut self) -> Option<ClientProcessConnection> {
        self.client_process.take()
    }

    pub(crate) fn take_create_service(&mut self) -> Option<CreateServiceRequest> {
        self.create_service.take()
    }

    /// Report `result` to the requester with the target's current user id.
    pub(crate) fn complete(mut self, result: ConnectResult) {
        if let Some(callback) = self.callback.take() {
            callback(result, self.target.user_id());
        }
    }
}

impl fmt::Debug for ConnectParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectParams")
            .field("source", &self.source)
            .field("target", &self.target)
            .field("interface", &self.interface_name())
            .field("service", &self.service.is_some())
            .field("client_process", &self.client_process.is_some())
            .field("create_service", &self.create_service.is_some())
            .finish_non_exhaustive()
    }
}

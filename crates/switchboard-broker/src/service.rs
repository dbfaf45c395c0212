//! In-process services.
//!
//! A [`Service`] is driven by [`run_service`], which drains a
//! [`ServiceEndpoint`] until the broker hangs up.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use switchboard_capabilities::InterfaceProviderSpecMap;
use switchboard_core::Identity;
use tracing::{debug, warn};

use crate::connector::Connector;
use crate::pipe::{InterfaceRequest, ServiceEndpoint, ServiceRequest, SourceInfo};

/// Builds a service for an identity.
pub type ServiceFactory = Arc<dyn Fn(&Identity) -> Box<dyn Service> + Send + Sync>;

/// What a running service knows about itself.
pub struct ServiceContext {
    identity: Identity,
    specs: InterfaceProviderSpecMap,
    connector: Connector,
}

impl ServiceContext {
    /// Resolved identity.
    #[must_use]
    pub fn identity(&self) -> &Identity {
        &self.identity
    }

    /// Interface provider specs from the manifest.
    #[must_use]
    pub fn specs(&self) -> &InterfaceProviderSpecMap {
        &self.specs
    }

    /// Connect surface.
    #[must_use]
    pub fn connector(&self) -> &Connector {
        &self.connector
    }

    /// Ask the broker to stop this service.
    pub fn request_quit(&self) {
        self.connector.request_quit();
    }
}

impl fmt::Debug for ServiceContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceContext")
            .field("identity", &self.identity)
            .finish_non_exhaustive()
    }
}

/// A service hosted in this process.
#[async_trait]
pub trait Service: Send {
    /// Called once, before any connect is delivered.
    async fn on_start(&mut self, _context: &ServiceContext) {}

    /// Another service connected. The default drops the request, which
    /// closes the interface pipe.
    async fn on_connect(
        &mut self,
        _context: &ServiceContext,
        _source: SourceInfo,
        _request: Option<InterfaceRequest>,
    ) {
    }

    /// The broker asks this package to host `name`. The default drops the
    /// endpoint, which fails the packaged instance.
    async fn on_create_service(
        &mut self,
        context: &ServiceContext,
        name: String,
        _endpoint: ServiceEndpoint,
    ) {
        warn!(package = %context.identity(), service = %name, "Package cannot host services");
    }

    /// The broker hung up.
    async fn on_stop(&mut self) {}
}

/// Drive `service` from `endpoint` until the broker hangs up.
///
/// Connects are acknowledged as soon as the matching handler returns.
pub async fn run_service(mut endpoint: ServiceEndpoint, mut service: Box<dyn Service>) {
    let mut context: Option<ServiceContext> = None;

    while let Some(request) = endpoint.recv().await {
        match request {
            ServiceRequest::Start {
                identity,
                specs,
                connector,
                ack,
            } => {
                let ctx = ServiceContext {
                    identity,
                    specs,
                    connector,
                };
                debug!(identity = %ctx.identity, "Service starting");
                service.on_start(&ctx).await;
                ack.acknowledge();
                context = Some(ctx);
            },
            ServiceRequest::Connect { source, request, ack } => {
                let Some(ctx) = context.as_ref() else {
                    warn!(source = %source.identity, "Connect before start, dropping");
                    continue;
                };
                service.on_connect(ctx, source, request).await;
                ack.acknowledge();
            },
            ServiceRequest::CreateService {
                name,
                endpoint: child,
                ack,
                ..
            } => {
                let Some(ctx) = context.as_ref() else {
                    warn!(service = %name, "CreateService before start, dropping");
                    continue;
                };
                service.on_create_service(ctx, name, child).await;
                ack.acknowledge();
            },
        }
    }

    service.on_stop().await;
    if let Some(ctx) = context {
        debug!(identity = %ctx.identity, "Service stopped");
    }
}

/// A package: a service whose only job is hosting its member services.
#[derive(Default)]
pub struct ServicePackage {
    members: HashMap<String, ServiceFactory>,
}

impl ServicePackage {
    /// An empty package.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a member service.
    #[must_use]
    pub fn with_member(mut self, name: impl Into<String>, factory: ServiceFactory) -> Self {
        self.members.insert(name.into(), factory);
        self
    }
}

impl fmt::Debug for ServicePackage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<_> = self.members.keys().collect();
        names.sort();
        f.debug_struct("ServicePackage").field("members", &names).finish()
    }
}

#[async_trait]
impl Service for ServicePackage {
    async fn on_create_service(
        &mut self,
        context: &ServiceContext,
        name: String,
        endpoint: ServiceEndpoint,
    ) {
        let Some(factory) = self.members.get(&name) else {
            warn!(package = %context.identity(), service = %name, "Unknown package member");
            return;
        };
        debug!(package = %context.identity(), service = %name, "Hosting package member");
        // Identity arrives with the member's own Start request.
        let member = factory(context.identity());
        tokio::spawn(run_service(endpoint, member));
    }
}

//! The connect surface handed to each service.

use std::fmt;
use std::sync::Arc;

use switchboard_core::Identity;
use tracing::trace;

use crate::arena::InstanceHandle;
use crate::params::ConnectParams;
use crate::task::{BrokerTask, TaskRunner};

struct Binding {
    tasks: Arc<dyn TaskRunner>,
    instance: InstanceHandle,
    identity: Identity,
}

impl Drop for Binding {
    fn drop(&mut self) {
        trace!(identity = %self.identity, "Connector released");
        self.tasks.post_task(BrokerTask::ConnectorLost(self.instance));
    }
}

/// Lets a service reach other services as itself.
///
/// Every request is checked against the owning instance's connection spec.
/// Clones share one binding; the instance is only torn down once its
/// service pipe and every clone are gone.
#[derive(Clone)]
pub struct Connector {
    binding: Arc<Binding>,
}

impl Connector {
    pub(crate) fn new(tasks: Arc<dyn TaskRunner>, instance: InstanceHandle, identity: Identity) -> Self {
        Self {
            binding: Arc::new(Binding {
                tasks,
                instance,
                identity,
            }),
        }
    }

    /// Identity connects are issued as.
    #[must_use]
    pub fn identity(&self) -> &Identity {
        &self.binding.identity
    }

    /// Issue a connect. The source identity is always overwritten with the
    /// owning instance's.
    pub fn connect(&self, mut params: ConnectParams) {
        params.set_source(self.binding.identity.clone());
        self.binding.tasks.post_task(BrokerTask::Connect {
            params,
            source: Some(self.binding.instance),
        });
    }

    /// Ask the broker to stop this instance. Ignored while connects are
    /// still being delivered to it.
    pub fn request_quit(&self) {
        self.binding
            .tasks
            .post_task(BrokerTask::RequestQuit(self.binding.instance));
    }
}

impl fmt::Debug for Connector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connector")
            .field("identity", &self.binding.identity)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use switchboard_core::ROOT_USER_GUID;
    use tokio::sync::mpsc;

    use super::*;
    use crate::task::ChannelTaskRunner;

    #[tokio::test]
    async fn test_connect_stamps_own_identity() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let owner = Identity::new("a", ROOT_USER_GUID).normalized();
        let connector = Connector::new(
            Arc::new(ChannelTaskRunner::new(&tx)),
            InstanceHandle::new(2, 0),
            owner.clone(),
        );
        let spoofed = Identity::new("evil", ROOT_USER_GUID);
        connector.connect(ConnectParams::new(spoofed, Identity::new("b", ROOT_USER_GUID)));

        match rx.recv().await.unwrap() {
            BrokerTask::Connect { params, source } => {
                assert_eq!(params.source(), &owner);
                assert_eq!(source, Some(InstanceHandle::new(2, 0)));
            },
            other => panic!("unexpected task {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_last_clone_releases_binding() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let connector = Connector::new(
            Arc::new(ChannelTaskRunner::new(&tx)),
            InstanceHandle::new(0, 0),
            Identity::broker(),
        );
        let copy = connector.clone();
        drop(connector);
        assert!(rx.try_recv().is_err());
        drop(copy);
        assert_eq!(rx.recv().await.unwrap().kind(), "connector_lost");
    }
}

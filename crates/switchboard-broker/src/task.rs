//! Messages posted to the broker loop and the runner that posts them.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use switchboard_catalog::Entry;
use switchboard_core::Pid;
use switchboard_events::{ListenerId, RunningServiceInfo, ServiceManagerListener};
use tokio::sync::{mpsc, oneshot};
use tracing::trace;

use crate::arena::InstanceHandle;
use crate::params::ConnectParams;

/// One unit of work for the broker loop.
///
/// Everything that happens off the broker task (resolutions, pipe
/// closures, acknowledgements, runner callbacks) comes back as one of these.
pub enum BrokerTask {
    /// Route a connection request. `source` is set when the request came
    /// through an instance's connector and must pass its policy.
    Connect {
        /// The request.
        params: ConnectParams,
        /// Issuing instance, if any.
        source: Option<InstanceHandle>,
    },
    /// The resolver finished looking up `name`.
    Resolved {
        /// Requested service name.
        name: String,
        /// Resolved catalog entry.
        entry: Arc<Entry>,
    },
    /// The service acknowledged `Start`.
    StartAcked(InstanceHandle),
    /// The service acknowledged (or dropped) one delivered connect.
    ConnectComplete(InstanceHandle),
    /// The service end of an instance's pipe went away.
    ServiceLost(InstanceHandle),
    /// Every copy of an instance's connector was dropped.
    ConnectorLost(InstanceHandle),
    /// The service asked to be stopped.
    RequestQuit(InstanceHandle),
    /// A runner or client process reported a pid. `None` is a fatal start
    /// failure.
    PidReceived(InstanceHandle, Option<Pid>),
    /// The runner's process exited.
    RunnerCompleted(InstanceHandle),
    /// The start timeout for an instance fired.
    StartTimeout(InstanceHandle),
    /// Register a listener after handing it the current instances.
    AddListener(Arc<dyn ServiceManagerListener>, oneshot::Sender<ListenerId>),
    /// Snapshot the running instances.
    Query(oneshot::Sender<Vec<RunningServiceInfo>>),
    /// Tear everything down and stop the loop.
    Shutdown(oneshot::Sender<()>),
}

impl BrokerTask {
    /// Short name for logging.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Connect { .. } => "connect",
            Self::Resolved { .. } => "resolved",
            Self::StartAcked(_) => "start_acked",
            Self::ConnectComplete(_) => "connect_complete",
            Self::ServiceLost(_) => "service_lost",
            Self::ConnectorLost(_) => "connector_lost",
            Self::RequestQuit(_) => "request_quit",
            Self::PidReceived(..) => "pid_received",
            Self::RunnerCompleted(_) => "runner_completed",
            Self::StartTimeout(_) => "start_timeout",
            Self::AddListener(..) => "add_listener",
            Self::Query(_) => "query",
            Self::Shutdown(_) => "shutdown",
        }
    }
}

impl fmt::Debug for BrokerTask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("BrokerTask").field(&self.kind()).finish()
    }
}

/// Posts work back to the broker loop.
pub trait TaskRunner: Send + Sync {
    /// Queue `task` behind everything already posted.
    fn post_task(&self, task: BrokerTask);

    /// Queue `task` once `delay` has elapsed.
    fn post_delayed_task(&self, task: BrokerTask, delay: Duration);
}

/// [`TaskRunner`] backed by the broker's task channel.
///
/// Holds only a weak sender: the loop stops once every
/// [`BrokerHandle`](crate::BrokerHandle) is gone, whatever callbacks are
/// still outstanding.
#[derive(Debug, Clone)]
pub struct ChannelTaskRunner {
    tx: mpsc::WeakUnboundedSender<BrokerTask>,
}

impl ChannelTaskRunner {
    /// Wrap the broker's task sender.
    #[must_use]
    pub fn new(tx: &mpsc::UnboundedSender<BrokerTask>) -> Self {
        Self { tx: tx.downgrade() }
    }
}

impl TaskRunner for ChannelTaskRunner {
    fn post_task(&self, task: BrokerTask) {
        match self.tx.upgrade() {
            Some(tx) => {
                if let Err(err) = tx.send(task) {
                    trace!(task = err.0.kind(), "Broker loop gone, dropping task");
                }
            },
            None => trace!(task = task.kind(), "Broker loop gone, dropping task"),
        }
    }

    fn post_delayed_task(&self, task: BrokerTask, delay: Duration) {
        let runner = self.clone();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            runner.post_task(task);
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_post_task_is_fifo() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let runner = ChannelTaskRunner::new(&tx);
        let h = InstanceHandle::new(0, 0);
        runner.post_task(BrokerTask::StartAcked(h));
        runner.post_task(BrokerTask::ServiceLost(h));
        assert_eq!(rx.recv().await.unwrap().kind(), "start_acked");
        assert_eq!(rx.recv().await.unwrap().kind(), "service_lost");
    }

    #[tokio::test(start_paused = true)]
    async fn test_delayed_task_arrives_after_delay() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let runner = ChannelTaskRunner::new(&tx);
        runner.post_delayed_task(
            BrokerTask::StartTimeout(InstanceHandle::new(1, 0)),
            Duration::from_secs(5),
        );
        tokio::task::yield_now().await;
        assert!(rx.try_recv().is_err());
        tokio::time::advance(Duration::from_secs(6)).await;
        assert_eq!(rx.recv().await.unwrap().kind(), "start_timeout");
    }

    #[test]
    fn test_post_after_loop_gone_is_silent() {
        let (tx, rx) = mpsc::unbounded_channel();
        let runner = ChannelTaskRunner::new(&tx);
        drop(rx);
        runner.post_task(BrokerTask::ConnectorLost(InstanceHandle::new(0, 0)));
        drop(tx);
        runner.post_task(BrokerTask::ConnectorLost(InstanceHandle::new(0, 0)));
    }
}

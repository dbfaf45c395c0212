//! Instance snapshots.

use std::fmt;

use serde::{Deserialize, Serialize};
use switchboard_core::{Identity, InstanceId, Pid};

/// Lifecycle state of an instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InstanceState {
    /// Created, no service bound yet.
    Idle,
    /// Service bound, start not yet acknowledged.
    Starting,
    /// Service acknowledged start.
    Started,
    /// Teardown in progress.
    Destroying,
}

impl fmt::Display for InstanceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Idle => "idle",
            Self::Starting => "starting",
            Self::Started => "started",
            Self::Destroying => "destroying",
        };
        f.write_str(s)
    }
}

/// Snapshot of a live instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunningServiceInfo {
    /// Broker-local id.
    pub id: InstanceId,
    /// Resolved identity.
    pub identity: Identity,
    /// Process id, once known.
    pub pid: Option<Pid>,
    /// Lifecycle state.
    pub state: InstanceState,
}

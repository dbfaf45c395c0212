//! Small shared value types.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::SwitchboardError;

/// OS process id of a service instance.
pub type Pid = u32;

/// Outcome of a connection request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectResult {
    /// The request was routed to a running (or starting) instance.
    Succeeded,
    /// The request was malformed.
    InvalidArgument,
    /// The caller lacks a required capability.
    AccessDenied,
}

impl ConnectResult {
    /// Whether this is [`ConnectResult::Succeeded`].
    #[must_use]
    pub fn is_success(self) -> bool {
        matches!(self, Self::Succeeded)
    }
}

impl fmt::Display for ConnectResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Succeeded => "succeeded",
            Self::InvalidArgument => "invalid_argument",
            Self::AccessDenied => "access_denied",
        };
        f.write_str(s)
    }
}

impl From<&SwitchboardError> for ConnectResult {
    fn from(_: &SwitchboardError) -> Self {
        Self::InvalidArgument
    }
}

/// Broker-local numeric id of an instance.
///
/// Ids are assigned from a monotonically increasing counter and never reused
/// while the broker runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct InstanceId(pub u32);

impl InstanceId {
    /// Raw value.
    #[must_use]
    pub fn get(self) -> u32 {
        self.0
    }
}

impl fmt::Display for InstanceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

//! Broker error types.

use switchboard_core::SwitchboardError;
use thiserror::Error;

/// Errors surfaced by the [`BrokerHandle`](crate::BrokerHandle) API.
///
/// Connect failures are not errors: they arrive as
/// [`ConnectResult`](switchboard_core::ConnectResult) values.
#[derive(Debug, Error)]
pub enum BrokerError {
    /// The broker loop has exited.
    #[error("broker is not running")]
    NotRunning,

    /// The broker dropped the request without answering, for instance
    /// because its source instance went away during resolution.
    #[error("request was dropped by the broker")]
    Dropped,

    /// The identity handed to the broker is unusable.
    #[error("invalid identity: {0}")]
    InvalidIdentity(#[from] SwitchboardError),
}

/// Result type for broker operations.
pub type BrokerResult<T> = Result<T, BrokerError>;

//! Core error types.

use thiserror::Error;

/// Errors raised while handling identities and pipes.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SwitchboardError {
    /// The identity has no service name.
    #[error("identity has an empty service name")]
    EmptyName,

    /// The user id is neither a GUID nor a recognised sentinel.
    #[error("invalid user id: {user_id}")]
    InvalidUserId {
        /// The offending user id.
        user_id: String,
    },

    /// The peer end of a pipe has gone away.
    #[error("pipe closed")]
    PipeClosed,
}

/// Result type for core operations.
pub type SwitchboardResult<T> = Result<T, SwitchboardError>;

//! Switchboard Core - Foundation types for the Switchboard service broker.
//!
//! This crate provides:
//! - [`Identity`], the `(name, user_id, instance)` address of a service instance
//! - User id sentinels and validation
//! - [`ConnectResult`], the outcome code delivered to every connect callback
//! - [`MessagePipe`], the duplex byte channel handed across a connection
//! - Shared error types

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

pub mod prelude;

pub mod error;
pub mod identity;
pub mod pipe;
pub mod types;

pub use error::{SwitchboardError, SwitchboardResult};
pub use identity::{
    BROKER_NAME, CATALOG_NAME, INHERIT_USER_ID, Identity, ROOT_USER_ID, ROOT_USER_GUID,
    generate_user_id, is_valid_user_id, resolve_user_id,
};
pub use pipe::{MessagePipe, PipeClosed};
pub use types::{ConnectResult, InstanceId, Pid};

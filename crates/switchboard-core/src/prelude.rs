//! Prelude module - commonly used types for convenient import.
//!
//! Use `use switchboard_core::prelude::*;` to import all essential types.

// Errors
pub use crate::{SwitchboardError, SwitchboardResult};

// Identity
pub use crate::{BROKER_NAME, CATALOG_NAME, INHERIT_USER_ID, Identity, ROOT_USER_ID};

// Connection plumbing
pub use crate::{ConnectResult, InstanceId, MessagePipe, Pid};

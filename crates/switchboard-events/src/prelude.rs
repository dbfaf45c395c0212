//! Prelude module - commonly used types for convenient import.
//!
//! Use `use switchboard_events::prelude::*;` to import all essential types.

// Events
pub use crate::{BrokerEvent, EventMetadata};

// Bus
pub use crate::{EventBus, EventReceiver};

// Listeners
pub use crate::{ListenerId, ServiceManagerListener};

// Snapshots
pub use crate::{InstanceState, RunningServiceInfo};

//! Switchboard Events - Broker lifecycle events.
//!
//! This crate provides:
//! - [`BrokerEvent`], one variant per instance lifecycle transition
//! - [`RunningServiceInfo`], the snapshot of a live instance
//! - [`ServiceManagerListener`], the synchronous listener interface
//! - [`EventBus`], which broadcasts events to async receivers and
//!   dispatches them to registered listeners
//!
//! # Architecture
//!
//! The broker is the only publisher. There are two ways to observe it:
//!
//! 1. **Async receivers**: `bus.subscribe()` returns an [`EventReceiver`].
//! 2. **Listeners**: implementations of [`ServiceManagerListener`] registered
//!    through the broker receive a snapshot first, then every transition.
//!
//! # Example
//!
//! ```rust
//! use switchboard_core::{Identity, ROOT_USER_GUID};
//! use switchboard_events::{BrokerEvent, EventBus, EventMetadata};
//!
//! # async fn example() {
//! let bus = EventBus::new();
//! let mut receiver = bus.subscribe();
//!
//! bus.publish(BrokerEvent::ServiceStopped {
//!     metadata: EventMetadata::new("broker"),
//!     identity: Identity::new("fetcher", ROOT_USER_GUID),
//! });
//!
//! let event = receiver.recv().await.unwrap();
//! assert_eq!(event.event_type(), "service_stopped");
//! # }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

pub mod prelude;

mod bus;
mod event;
mod info;
mod listener;

pub use bus::{DEFAULT_CHANNEL_CAPACITY, EventBus, EventReceiver};
pub use event::{BrokerEvent, EventMetadata};
pub use info::{InstanceState, RunningServiceInfo};
pub use listener::{ListenerId, ListenerRegistry, ServiceManagerListener};

//! Switchboard Broker - Routes connections between service instances.
//!
//! This crate provides:
//! - [`BrokerBuilder`] / [`BrokerHandle`]: the broker loop and its API
//! - [`ConnectParams`]: one connection request
//! - [`ServicePipe`] / [`ServiceEndpoint`]: the pipe between the broker and
//!   a service, and [`Connector`], the connect surface a service gets
//! - [`NativeRunner`] and [`InProcessRunner`] for launching services
//! - [`Service`] and [`run_service`] for hosting services in this process
//!
//! # Architecture
//!
//! One task owns the service manager. Everything else (resolutions, pipe
//! closures, acknowledgements, runner callbacks) posts a [`BrokerTask`]
//! back to it, so broker state is never locked. Instances live in a
//! generation-checked arena; a connect whose source instance died while
//! its target was being resolved is dropped when it comes back.
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use switchboard_broker::{BrokerBuilder, ConnectParams, InProcessRunner};
//! use switchboard_catalog::{Catalog, PackageLayout};
//! use switchboard_core::{Identity, ROOT_USER_GUID};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let catalog = Arc::new(Catalog::new(PackageLayout::new("/opt/packages"), None));
//! let broker = BrokerBuilder::new(catalog, Arc::new(InProcessRunner::new())).spawn();
//!
//! let outcome = broker
//!     .connect(ConnectParams::new(
//!         Identity::broker(),
//!         Identity::new("fetcher", ROOT_USER_GUID),
//!     ))
//!     .await?;
//! println!("{}", outcome.result);
//! # Ok(())
//! # }
//! ```

#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

pub mod prelude;

mod arena;
mod broker;
mod connector;
mod error;
mod instance;
mod manager;
mod params;
mod pipe;
mod runner;
mod service;
mod task;

pub use arena::InstanceHandle;
pub use broker::{BrokerBuilder, BrokerHandle};
pub use connector::Connector;
pub use error::{BrokerError, BrokerResult};
pub use params::{ClientProcessConnection, ConnectCallback, ConnectOutcome, ConnectParams};
pub use pipe::{
    ConnectAck, InterfaceRequest, ServiceEndpoint, ServicePipe, ServiceRequest, SourceInfo,
    StartAck,
};
pub use runner::{
    CompletionCallback, InProcessRunner, LaunchedService, NativeRunner, PidCallback, RunnerHandle,
};
pub use service::{Service, ServiceContext, ServiceFactory, ServicePackage, run_service};
pub use task::{BrokerTask, ChannelTaskRunner, TaskRunner};

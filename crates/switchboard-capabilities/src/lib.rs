//! Switchboard Capabilities - Interface provider specs and connection policy.
//!
//! This crate provides:
//! - [`InterfaceProviderSpec`], the `provides`/`requires` policy a service
//!   declares in its manifest
//! - [`CapabilityRequest`], the set of capabilities and interfaces one peer
//!   is granted on another
//! - [`effective_capability_request`], the policy intersection computed when
//!   a connection is delivered
//! - The names of the capabilities the broker itself understands
//!
//! # Example
//!
//! ```
//! use switchboard_capabilities::{InterfaceProviderSpec, effective_capability_request};
//! use switchboard_core::{Identity, ROOT_USER_GUID};
//!
//! let mut source = InterfaceProviderSpec::default();
//! source.require("b", "fetch");
//!
//! let mut target = InterfaceProviderSpec::default();
//! target.provide("fetch", "net.Fetcher");
//!
//! let request = effective_capability_request(
//!     &source,
//!     &Identity::new("b", ROOT_USER_GUID),
//!     &target,
//! );
//! assert!(request.allows_interface("net.Fetcher"));
//! assert!(!request.allows_interface("net.Other"));
//! ```

#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

pub mod prelude;

mod error;
mod names;
mod request;
mod spec;

pub use error::{CapabilityError, CapabilityResult};
pub use names::{
    ALL_USERS_CAPABILITY, CLIENT_PROCESS_CAPABILITY, CONNECTOR_SPEC, EXPLICIT_CLASS_CAPABILITY,
    INSTANCE_NAME_CAPABILITY, SERVICE_FACTORY_CAPABILITY, SERVICE_FACTORY_INTERFACE,
    SINGLETON_CAPABILITY, USER_ID_CAPABILITY, WILDCARD,
};
pub use request::{CapabilityRequest, effective_capability_request, has_capability};
pub use spec::{InterfaceProviderSpec, InterfaceProviderSpecMap, connection_spec, validate_spec_map};

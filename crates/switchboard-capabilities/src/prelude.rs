//! Prelude module - commonly used types for convenient import.
//!
//! Use `use switchboard_capabilities::prelude::*;` to import all essential types.

// Errors
pub use crate::{CapabilityError, CapabilityResult};

// Policy model
pub use crate::{CapabilityRequest, InterfaceProviderSpec, InterfaceProviderSpecMap};

// Policy evaluation
pub use crate::{connection_spec, effective_capability_request, has_capability};

// Well-known names
pub use crate::{CONNECTOR_SPEC, WILDCARD};

//! Capability-related error types.

use thiserror::Error;

/// Errors raised while validating interface provider specs.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CapabilityError {
    /// A `provides` entry exposes the wildcard interface.
    #[error("capability {capability} in spec {spec} provides the wildcard interface")]
    WildcardInterface {
        /// Connection spec name.
        spec: String,
        /// The offending capability.
        capability: String,
    },

    /// A capability, interface or peer name is empty.
    #[error("empty {kind} name in spec {spec}")]
    EmptyName {
        /// Connection spec name.
        spec: String,
        /// What kind of name was empty.
        kind: &'static str,
    },
}

/// Result type for capability operations.
pub type CapabilityResult<T> = Result<T, CapabilityError>;

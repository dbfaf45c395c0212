use std::path::PathBuf;

use switchboard_capabilities::CapabilityError;
use thiserror::Error;

/// Errors that can occur while loading manifests.
#[derive(Debug, Error)]
pub enum CatalogError {
    /// The manifest file could not be read.
    #[error("failed to read manifest at {path}: {message}")]
    ReadError {
        /// Path to the manifest.
        path: PathBuf,
        /// The I/O error message.
        message: String,
    },

    /// The manifest is not valid JSON or misses required keys.
    #[error("failed to parse manifest: {0}")]
    ParseError(#[from] serde_json::Error),

    /// The manifest parsed but describes an invalid service.
    #[error("invalid manifest for {name:?}: {reason}")]
    InvalidManifest {
        /// Service name (may be empty).
        name: String,
        /// What is wrong with it.
        reason: String,
    },

    /// An interface provider spec failed validation.
    #[error("invalid interface provider spec in {name}: {source}")]
    InvalidSpec {
        /// Service name.
        name: String,
        /// Underlying validation error.
        #[source]
        source: CapabilityError,
    },
}

/// A specialized Result type for catalog operations.
pub type CatalogResult<T> = Result<T, CatalogError>;

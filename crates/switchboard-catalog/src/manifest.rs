//! Service manifest documents.
//!
//! A manifest is a JSON object:
//!
//! ```json
//! {
//!   "name": "browser",
//!   "display_name": "Browser",
//!   "sandboxed": false,
//!   "interface_provider_specs": {
//!     "switchboard:connector": {
//!       "provides": { "app": ["browser.App"] },
//!       "requires": { "*": ["app"], "switchboard": ["switchboard:user_id"] }
//!     }
//!   },
//!   "services": [ { "name": "renderer", "display_name": "Renderer" } ]
//! }
//! ```
//!
//! `services` turns the manifest into a package: every nested manifest is a
//! service bundled in the same executable.

use std::collections::BTreeSet;
use std::path::Path;

use serde::{Deserialize, Serialize};
use switchboard_capabilities::{InterfaceProviderSpecMap, validate_spec_map};

use crate::error::{CatalogError, CatalogResult};

/// A service manifest as stored on disk or compiled into an embedder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Manifest {
    /// Service name. Must not be empty.
    pub name: String,
    /// Human-readable name.
    pub display_name: String,
    /// Whether the service should run in a sandboxed process.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub sandboxed: bool,
    /// Connection spec name to interface provider spec.
    #[serde(default)]
    pub interface_provider_specs: InterfaceProviderSpecMap,
    /// Services bundled in this package.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub services: Vec<Manifest>,
}

impl Manifest {
    /// Create a manifest with no specs and no bundled services.
    #[must_use]
    pub fn new(name: impl Into<String>, display_name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            display_name: display_name.into(),
            sandboxed: false,
            interface_provider_specs: InterfaceProviderSpecMap::new(),
            services: Vec::new(),
        }
    }

    /// Check names and specs of this manifest and every bundled service.
    ///
    /// # Errors
    ///
    /// Returns an error for an empty name, a duplicated bundled service name
    /// or an invalid interface provider spec.
    pub fn validate(&self) -> CatalogResult<()> {
        if self.name.is_empty() {
            return Err(CatalogError::InvalidManifest {
                name: String::new(),
                reason: "name must not be empty".to_string(),
            });
        }
        validate_spec_map(&self.interface_provider_specs).map_err(|source| {
            CatalogError::InvalidSpec {
                name: self.name.clone(),
                source,
            }
        })?;

        let mut seen = BTreeSet::new();
        for service in &self.services {
            if !seen.insert(service.name.as_str()) || service.name == self.name {
                return Err(CatalogError::InvalidManifest {
                    name: self.name.clone(),
                    reason: format!("service {:?} is declared more than once", service.name),
                });
            }
            service.validate()?;
        }
        Ok(())
    }
}

/// Parse and validate a manifest from JSON text.
///
/// # Errors
///
/// Returns an error if the text is not a valid manifest.
pub fn parse_manifest(json: &str) -> CatalogResult<Manifest> {
    let manifest: Manifest = serde_json::from_str(json)?;
    manifest.validate()?;
    Ok(manifest)
}

/// Load and validate a manifest file.
///
/// # Errors
///
/// Returns an error if the file cannot be read or is not a valid manifest.
pub fn load_manifest(path: &Path) -> CatalogResult<Manifest> {
    let content = std::fs::read_to_string(path).map_err(|e| CatalogError::ReadError {
        path: path.to_path_buf(),
        message: e.to_string(),
    })?;
    parse_manifest(&content)
}

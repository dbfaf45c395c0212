//! Catalog entries.
//!
//! An [`Entry`] is the immutable in-memory form of a [`Manifest`]. Package
//! entries own their bundled services as children; each child holds a weak
//! link back to its package and inherits its `package_path`.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Weak};

use switchboard_capabilities::{InterfaceProviderSpec, InterfaceProviderSpecMap, connection_spec};

use crate::error::CatalogResult;
use crate::manifest::Manifest;

/// A resolved service manifest.
#[derive(Debug)]
pub struct Entry {
    name: String,
    display_name: String,
    sandboxed: bool,
    specs: InterfaceProviderSpecMap,
    package_path: PathBuf,
    parent: Weak<Entry>,
    children: Vec<Arc<Entry>>,
}

impl Entry {
    /// Build an entry tree from a manifest.
    ///
    /// # Errors
    ///
    /// Returns an error if the manifest fails validation.
    pub fn from_manifest(manifest: &Manifest, package_path: &Path) -> CatalogResult<Arc<Self>> {
        manifest.validate()?;
        Ok(Self::build(manifest, package_path, Weak::new()))
    }

    fn build(manifest: &Manifest, package_path: &Path, parent: Weak<Self>) -> Arc<Self> {
        Arc::new_cyclic(|this| Self {
            name: manifest.name.clone(),
            display_name: manifest.display_name.clone(),
            sandboxed: manifest.sandboxed,
            specs: manifest.interface_provider_specs.clone(),
            package_path: package_path.to_path_buf(),
            parent,
            children: manifest
                .services
                .iter()
                .map(|child| Self::build(child, package_path, this.clone()))
                .collect(),
        })
    }

    /// Entry for a name with no manifest. It has no specs, so it is granted
    /// nothing and may connect to nothing, but it can still be launched.
    #[must_use]
    pub fn placeholder(name: impl Into<String>, package_path: impl Into<PathBuf>) -> Arc<Self> {
        let name = name.into();
        Arc::new(Self {
            display_name: name.clone(),
            name,
            sandboxed: false,
            specs: InterfaceProviderSpecMap::new(),
            package_path: package_path.into(),
            parent: Weak::new(),
            children: Vec::new(),
        })
    }

    /// Convert back to a manifest. `package_path` is not part of the
    /// manifest and is dropped.
    #[must_use]
    pub fn to_manifest(&self) -> Manifest {
        Manifest {
            name: self.name.clone(),
            display_name: self.display_name.clone(),
            sandboxed: self.sandboxed,
            interface_provider_specs: self.specs.clone(),
            services: self.children.iter().map(|c| c.to_manifest()).collect(),
        }
    }

    /// Serialize to manifest JSON.
    #[must_use]
    pub fn serialize(&self) -> serde_json::Value {
        // Manifest contains only maps, strings and bools.
        serde_json::to_value(self.to_manifest()).unwrap_or(serde_json::Value::Null)
    }

    /// Deserialize from manifest JSON.
    ///
    /// # Errors
    ///
    /// Returns an error if the value is not a valid manifest.
    pub fn deserialize(value: serde_json::Value, package_path: &Path) -> CatalogResult<Arc<Self>> {
        let manifest: Manifest = serde_json::from_value(value)?;
        Self::from_manifest(&manifest, package_path)
    }

    /// Service name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Human-readable name.
    #[must_use]
    pub fn display_name(&self) -> &str {
        &self.display_name
    }

    /// Whether the service asks to be sandboxed.
    #[must_use]
    pub fn sandboxed(&self) -> bool {
        self.sandboxed
    }

    /// All interface provider specs.
    #[must_use]
    pub fn specs(&self) -> &InterfaceProviderSpecMap {
        &self.specs
    }

    /// The spec consulted for connections.
    #[must_use]
    pub fn connection_spec(&self) -> InterfaceProviderSpec {
        connection_spec(&self.specs)
    }

    /// Executable that hosts this service.
    #[must_use]
    pub fn package_path(&self) -> &Path {
        &self.package_path
    }

    /// The package entry this service is bundled in, if any.
    #[must_use]
    pub fn parent(&self) -> Option<Arc<Self>> {
        self.parent.upgrade()
    }

    /// Services bundled in this package.
    #[must_use]
    pub fn children(&self) -> &[Arc<Self>] {
        &self.children
    }

    /// Find a bundled service by name, searching the whole subtree.
    #[must_use]
    pub fn find_child(&self, name: &str) -> Option<Arc<Self>> {
        self.children.iter().find_map(|child| {
            if child.name == name {
                Some(Arc::clone(child))
            } else {
                child.find_child(name)
            }
        })
    }
}

impl PartialEq for Entry {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
            && self.display_name == other.display_name
            && self.sandboxed == other.sandboxed
            && self.specs == other.specs
            && self.package_path == other.package_path
            && self.children == other.children
    }
}

impl Eq for Entry {}

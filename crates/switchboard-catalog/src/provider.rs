//! Embedder-supplied manifests.

use std::collections::HashMap;

use crate::manifest::Manifest;

/// Source of manifests compiled into the embedder.
///
/// Consulted before the package directory when a name misses the cache.
pub trait ManifestProvider: Send + Sync {
    /// The manifest for `name`, if the embedder knows it.
    fn manifest(&self, name: &str) -> Option<Manifest>;
}

/// A [`ManifestProvider`] backed by a map.
#[derive(Debug, Default, Clone)]
pub struct InMemoryManifestProvider {
    manifests: HashMap<String, Manifest>,
}

impl InMemoryManifestProvider {
    /// Create an empty provider.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a manifest, keyed by its name.
    pub fn insert(&mut self, manifest: Manifest) {
        self.manifests.insert(manifest.name.clone(), manifest);
    }

    /// Builder form of [`insert`](Self::insert).
    #[must_use]
    pub fn with(mut self, manifest: Manifest) -> Self {
        self.insert(manifest);
        self
    }
}

impl ManifestProvider for InMemoryManifestProvider {
    fn manifest(&self, name: &str) -> Option<Manifest> {
        self.manifests.get(name).cloned()
    }
}

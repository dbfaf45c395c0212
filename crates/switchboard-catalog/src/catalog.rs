//! The cached service catalog.

use std::sync::Arc;

use tracing::{debug, info};

use crate::entry::Entry;
use crate::layout::PackageLayout;
use crate::provider::ManifestProvider;
use crate::reader::{Reader, insert_tree};
use crate::resolver::{ResolveCallback, ServiceResolver};

/// Name-keyed cache of catalog entries in front of a [`Reader`].
///
/// Construction queues the initial package scan. Until it completes every
/// resolution queues behind it on the reader; afterwards cache hits complete
/// on the caller's task.
pub struct Catalog {
    reader: Reader,
}

impl Catalog {
    /// Create a catalog and queue the initial scan of `layout`.
    ///
    /// Must be called from within a tokio runtime.
    #[must_use]
    pub fn new(layout: PackageLayout, provider: Option<Arc<dyn ManifestProvider>>) -> Self {
        info!(package_dir = %layout.package_dir.display(), "Starting service catalog");
        let reader = Reader::spawn(layout, provider);
        reader.request_scan();
        Self { reader }
    }

    /// Add entries that did not come from disk, such as embedder-registered
    /// services. Names already cached are left alone.
    pub fn preload(&self, entries: impl IntoIterator<Item = Arc<Entry>>) {
        for entry in entries {
            insert_tree(self.reader.cache(), &entry);
        }
    }

    /// Cached entry for `name`.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<Arc<Entry>> {
        self.reader
            .cache()
            .get(name)
            .map(|entry| Arc::clone(entry.value()))
    }

    /// Snapshot of every cached entry, sorted by name.
    #[must_use]
    pub fn entries(&self) -> Vec<Arc<Entry>> {
        let mut entries: Vec<_> = self
            .reader
            .cache()
            .iter()
            .map(|entry| Arc::clone(entry.value()))
            .collect();
        entries.sort_by(|a, b| a.name().cmp(b.name()));
        entries
    }

    /// Whether the initial scan has completed.
    #[must_use]
    pub fn is_ready(&self) -> bool {
        self.reader.is_ready()
    }

    /// Wait until the initial scan has completed.
    pub async fn ready(&self) {
        self.reader.wait_until_ready().await;
    }

    /// Scan the package directory again. Newly found packages are added;
    /// cached entries are never replaced.
    pub async fn rescan(&self) -> Vec<Arc<Entry>> {
        self.reader.scan().await
    }

    /// The layout this catalog serves.
    #[must_use]
    pub fn layout(&self) -> &PackageLayout {
        self.reader.layout()
    }
}

impl ServiceResolver for Catalog {
    fn resolve(&self, name: &str, callback: ResolveCallback) {
        if self.reader.is_ready()
            && let Some(entry) = self.get(name)
        {
            debug!(service = %name, "Catalog cache hit");
            callback(entry);
            return;
        }
        self.reader.resolve(name, callback);
    }
}

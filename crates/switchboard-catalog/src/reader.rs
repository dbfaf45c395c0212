//! Sequential manifest reader.
//!
//! All file system work happens on one background task, one request at a
//! time, on a blocking thread. Requests are served strictly in submission
//! order, so a resolve submitted after a scan always sees the scan's
//! results.

use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{mpsc, oneshot, watch};
use tracing::{debug, error, info, warn};

use crate::entry::Entry;
use crate::layout::{PackageLayout, executable_in};
use crate::manifest::{Manifest, load_manifest};
use crate::provider::ManifestProvider;
use crate::resolver::ResolveCallback;

/// Name-keyed entry cache. Holding a package entry keeps its bundled
/// services' parent links alive.
pub type EntryCache = DashMap<String, Arc<Entry>>;

enum ReaderRequest {
    Scan {
        reply: Option<oneshot::Sender<Vec<Arc<Entry>>>>,
    },
    Resolve {
        name: String,
        callback: ResolveCallback,
    },
}

/// Handle to the background reader task.
pub struct Reader {
    tx: mpsc::UnboundedSender<ReaderRequest>,
    ready: watch::Receiver<bool>,
    cache: Arc<EntryCache>,
    layout: Arc<PackageLayout>,
}

impl Reader {
    /// Spawn the reader task on the current tokio runtime.
    ///
    /// Nothing is scanned until [`scan`](Self::scan) or
    /// [`request_scan`](Self::request_scan) is called.
    #[must_use]
    pub fn spawn(layout: PackageLayout, provider: Option<Arc<dyn ManifestProvider>>) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let (ready_tx, ready) = watch::channel(false);
        let cache = Arc::new(EntryCache::new());
        let layout = Arc::new(layout);

        let worker = ReaderWorker {
            layout: Arc::clone(&layout),
            provider,
            cache: Arc::clone(&cache),
            ready: ready_tx,
        };
        tokio::spawn(worker.run(rx));

        Self {
            tx,
            ready,
            cache,
            layout,
        }
    }

    /// Queue a directory scan without waiting for it.
    pub fn request_scan(&self) {
        if self.tx.send(ReaderRequest::Scan { reply: None }).is_err() {
            warn!("Manifest reader has stopped, scan dropped");
        }
    }

    /// Scan the package directory and return what was found.
    pub async fn scan(&self) -> Vec<Arc<Entry>> {
        let (reply, rx) = oneshot::channel();
        if self
            .tx
            .send(ReaderRequest::Scan { reply: Some(reply) })
            .is_err()
        {
            warn!("Manifest reader has stopped, scan dropped");
            return Vec::new();
        }
        rx.await.unwrap_or_default()
    }

    /// Queue a resolution behind every earlier request.
    pub fn resolve(&self, name: &str, callback: ResolveCallback) {
        let request = ReaderRequest::Resolve {
            name: name.to_string(),
            callback,
        };
        if let Err(mpsc::error::SendError(request)) = self.tx.send(request) {
            warn!(service = %name, "Manifest reader has stopped, resolving to placeholder");
            if let ReaderRequest::Resolve { name, callback } = request {
                let path = self.layout.executable_path(&name);
                callback(Entry::placeholder(name, path));
            }
        }
    }

    /// Whether the first scan has completed.
    #[must_use]
    pub fn is_ready(&self) -> bool {
        *self.ready.borrow()
    }

    /// Wait for the first scan to complete.
    pub async fn wait_until_ready(&self) {
        let mut ready = self.ready.clone();
        // An error means the worker is gone; nothing more will arrive.
        let _ = ready.wait_for(|r| *r).await;
    }

    pub(crate) fn cache(&self) -> &EntryCache {
        &self.cache
    }

    /// The layout this reader serves.
    #[must_use]
    pub fn layout(&self) -> &PackageLayout {
        &self.layout
    }
}

struct ReaderWorker {
    layout: Arc<PackageLayout>,
    provider: Option<Arc<dyn ManifestProvider>>,
    cache: Arc<EntryCache>,
    ready: watch::Sender<bool>,
}

impl ReaderWorker {
    async fn run(self, mut rx: mpsc::UnboundedReceiver<ReaderRequest>) {
        while let Some(request) = rx.recv().await {
            match request {
                ReaderRequest::Scan { reply } => {
                    let entries = self.scan().await;
                    self.ready.send_replace(true);
                    if let Some(reply) = reply {
                        let _ = reply.send(entries);
                    }
                },
                ReaderRequest::Resolve { name, callback } => {
                    let entry = self.resolve(&name).await;
                    callback(entry);
                },
            }
        }
        debug!("Manifest reader stopped");
    }

    async fn scan(&self) -> Vec<Arc<Entry>> {
        let layout = Arc::clone(&self.layout);
        let entries = match tokio::task::spawn_blocking(move || scan_directory(&layout)).await {
            Ok(entries) => entries,
            Err(e) => {
                error!(error = %e, "Package scan task failed");
                return Vec::new();
            },
        };
        for entry in &entries {
            insert_tree(&self.cache, entry);
        }
        info!(
            package_dir = %self.layout.package_dir.display(),
            count = entries.len(),
            "Scanned package directory"
        );
        entries
    }

    async fn resolve(&self, name: &str) -> Arc<Entry> {
        if let Some(entry) = self.cache.get(name) {
            return Arc::clone(entry.value());
        }

        let layout = Arc::clone(&self.layout);
        let provider = self.provider.clone();
        let cache = Arc::clone(&self.cache);
        let owned = name.to_string();
        match tokio::task::spawn_blocking(move || {
            create_entry_for_name(&owned, &layout, provider.as_deref(), &cache)
        })
        .await
        {
            Ok(entry) => entry,
            Err(e) => {
                error!(service = %name, error = %e, "Manifest load task failed");
                let placeholder = Entry::placeholder(name, self.layout.executable_path(name));
                cached_or_insert(&self.cache, name, placeholder)
            },
        }
    }
}

fn cached_or_insert(cache: &EntryCache, name: &str, entry: Arc<Entry>) -> Arc<Entry> {
    Arc::clone(cache.entry(name.to_string()).or_insert(entry).value())
}

/// Cache an entry and, recursively, every service it bundles under its own
/// name. Existing entries are never replaced.
pub(crate) fn insert_tree(cache: &EntryCache, entry: &Arc<Entry>) {
    cache
        .entry(entry.name().to_string())
        .or_insert_with(|| Arc::clone(entry));
    for child in entry.children() {
        insert_tree(cache, child);
    }
}

/// Load every package manifest under the layout's package directory.
///
/// Packages whose executable is missing are skipped unless they are
/// bootstrap services. Malformed manifests are logged and skipped.
#[must_use]
pub fn scan_directory(layout: &PackageLayout) -> Vec<Arc<Entry>> {
    let dir = &layout.package_dir;
    let read_dir = match std::fs::read_dir(dir) {
        Ok(read_dir) => read_dir,
        Err(e) => {
            debug!(package_dir = %dir.display(), error = %e, "Package directory not readable");
            return Vec::new();
        },
    };

    let mut entries = Vec::new();
    for dir_entry in read_dir.flatten() {
        let path = dir_entry.path();
        if !path.is_dir() {
            continue;
        }
        let manifest_path = path.join(&layout.manifest_file);
        if !manifest_path.exists() {
            continue;
        }

        let manifest = match load_manifest(&manifest_path) {
            Ok(manifest) => manifest,
            Err(e) => {
                error!(path = %manifest_path.display(), error = %e, "Malformed service manifest");
                continue;
            },
        };

        let executable = executable_in(&path, &manifest.name);
        if !layout.is_bootstrap(&manifest.name) && !executable.exists() {
            debug!(
                service = %manifest.name,
                executable = %executable.display(),
                "Skipping package without executable"
            );
            continue;
        }

        match Entry::from_manifest(&manifest, &executable) {
            Ok(entry) => entries.push(entry),
            Err(e) => error!(path = %manifest_path.display(), error = %e, "Invalid service manifest"),
        }
    }

    entries.sort_by(|a, b| a.name().cmp(b.name()));
    entries
}

/// Build the entry for a name that missed the cache and write it back.
///
/// Tries the embedder's provider, then `<package_dir>/<name>/<manifest>`,
/// then falls back to a placeholder pointing at the best-guess executable.
/// When the manifest found is a package bundling `name`, the whole package
/// is cached so the returned entry keeps its parent.
#[must_use]
pub fn create_entry_for_name(
    name: &str,
    layout: &PackageLayout,
    provider: Option<&dyn ManifestProvider>,
    cache: &EntryCache,
) -> Arc<Entry> {
    let tree = load_tree(name, layout, provider);
    insert_tree(cache, &tree);
    cached_or_insert(cache, name, tree)
}

/// The entry tree describing `name`: its own manifest, the package that
/// bundles it, or a placeholder.
fn load_tree(
    name: &str,
    layout: &PackageLayout,
    provider: Option<&dyn ManifestProvider>,
) -> Arc<Entry> {
    let executable = layout.executable_path(name);

    if let Some(manifest) = provider.and_then(|p| p.manifest(name))
        && let Some(entry) = tree_for(name, &manifest, &executable)
    {
        debug!(service = %name, "Resolved manifest from provider");
        return entry;
    }

    let manifest_path = layout.manifest_path(name);
    if manifest_path.exists() {
        match load_manifest(&manifest_path) {
            Ok(manifest) => {
                if let Some(entry) = tree_for(name, &manifest, &executable) {
                    debug!(service = %name, path = %manifest_path.display(), "Loaded manifest");
                    return entry;
                }
            },
            Err(e) => {
                error!(path = %manifest_path.display(), error = %e, "Malformed service manifest");
            },
        }
    }

    debug!(service = %name, "No manifest found, using placeholder");
    Entry::placeholder(name, executable)
}

fn tree_for(name: &str, manifest: &Manifest, executable: &std::path::Path) -> Option<Arc<Entry>> {
    let entry = match Entry::from_manifest(manifest, executable) {
        Ok(entry) => entry,
        Err(e) => {
            error!(service = %name, error = %e, "Invalid service manifest");
            return None;
        },
    };
    if entry.name() == name || entry.find_child(name).is_some() {
        return Some(entry);
    }
    warn!(
        service = %name,
        manifest_name = %entry.name(),
        "Manifest does not describe the requested service"
    );
    None
}

//! Test harness helpers.

use std::future::Future;
use std::path::{Path, PathBuf};
use std::time::Duration;

use switchboard_catalog::{DEFAULT_MANIFEST_FILE, Manifest, PackageLayout};
use tempfile::TempDir;
use tracing_subscriber::EnvFilter;

/// Create a temporary directory for testing.
///
/// # Panics
///
/// Panics if the temporary directory cannot be created.
#[must_use]
pub fn test_dir() -> TempDir {
    TempDir::new().expect("Failed to create temp directory")
}

/// Set up test logging with the given filter.
pub fn setup_test_logging(filter: &str) {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .with_test_writer()
        .try_init();
}

/// Poll `check` until it returns `true`.
///
/// # Panics
///
/// Panics if `check` is still false after two seconds.
pub async fn eventually<F>(what: &str, mut check: F)
where
    F: FnMut() -> bool,
{
    for _ in 0..400 {
        if check() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("timed out waiting for {what}");
}

/// Await `future` for at most two seconds.
///
/// # Panics
///
/// Panics on timeout.
pub async fn within<T>(what: &str, future: impl Future<Output = T>) -> T {
    tokio::time::timeout(Duration::from_secs(2), future)
        .await
        .unwrap_or_else(|_| panic!("timed out waiting for {what}"))
}

/// A temporary package directory laid out the way the catalog scans it.
#[derive(Debug)]
pub struct PackageDir {
    /// The temporary root.
    pub dir: TempDir,
}

impl PackageDir {
    /// Create an empty package directory.
    #[must_use]
    pub fn new() -> Self {
        Self { dir: test_dir() }
    }

    /// Root path.
    #[must_use]
    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Layout over this directory.
    #[must_use]
    pub fn layout(&self) -> PackageLayout {
        PackageLayout::new(self.path())
    }

    /// Write `manifest` as a package and create its executable.
    ///
    /// # Panics
    ///
    /// Panics if the files cannot be written.
    #[must_use]
    pub fn add_package(&self, manifest: &Manifest) -> PathBuf {
        let path = self.add_manifest_only(manifest);
        let executable = self.layout().executable_path(&manifest.name);
        std::fs::write(&executable, b"").expect("Failed to write executable");
        path
    }

    /// Write `manifest` without an executable next to it.
    ///
    /// # Panics
    ///
    /// Panics if the files cannot be written.
    #[must_use]
    pub fn add_manifest_only(&self, manifest: &Manifest) -> PathBuf {
        let dir = self.path().join(&manifest.name);
        std::fs::create_dir_all(&dir).expect("Failed to create package directory");
        let json = serde_json::to_string_pretty(manifest).expect("Failed to serialize manifest");
        std::fs::write(dir.join(DEFAULT_MANIFEST_FILE), json).expect("Failed to write manifest");
        dir
    }

    /// Write raw text as the manifest of `name`.
    ///
    /// # Panics
    ///
    /// Panics if the file cannot be written.
    #[must_use]
    pub fn add_raw_manifest(&self, name: &str, contents: &str) -> PathBuf {
        let dir = self.path().join(name);
        std::fs::create_dir_all(&dir).expect("Failed to create package directory");
        std::fs::write(dir.join(DEFAULT_MANIFEST_FILE), contents).expect("Failed to write manifest");
        dir
    }
}

impl Default for PackageDir {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use switchboard_catalog::scan_directory;

    use super::*;
    use crate::fixtures::test_manifest;

    #[test]
    fn test_added_package_is_scanned() {
        let packages = PackageDir::new();
        let _ = packages.add_package(&test_manifest("a"));
        let _ = packages.add_manifest_only(&test_manifest("b"));
        let names: Vec<_> = scan_directory(&packages.layout())
            .iter()
            .map(|e| e.name().to_string())
            .collect();
        assert_eq!(names, vec!["a"]);
    }

    #[tokio::test]
    async fn test_eventually_returns_once_true() {
        let mut n: i32 = 0;
        eventually("counter", || {
            n = n.saturating_add(1);
            n > 2
        })
        .await;
    }
}

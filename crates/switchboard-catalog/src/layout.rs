//! On-disk package layout.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

/// Default manifest file name inside a package directory.
pub const DEFAULT_MANIFEST_FILE: &str = "manifest.json";

/// Where packages live and which services ship without an executable.
///
/// Package `name` lives in `<package_dir>/<name>/`, with its manifest at
/// `<package_dir>/<name>/<manifest_file>` and its executable at
/// `<package_dir>/<name>/<name><EXE_SUFFIX>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageLayout {
    /// Root directory holding one sub-directory per package.
    pub package_dir: PathBuf,
    /// Manifest file name inside each package directory.
    pub manifest_file: String,
    /// Services kept by a scan even when their executable is missing.
    pub bootstrap_services: BTreeSet<String>,
}

impl PackageLayout {
    /// Layout rooted at `package_dir` with the default manifest file name.
    #[must_use]
    pub fn new(package_dir: impl Into<PathBuf>) -> Self {
        Self {
            package_dir: package_dir.into(),
            manifest_file: DEFAULT_MANIFEST_FILE.to_string(),
            bootstrap_services: BTreeSet::new(),
        }
    }

    /// Add bootstrap services.
    #[must_use]
    pub fn with_bootstrap_services<I, S>(mut self, services: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.bootstrap_services
            .extend(services.into_iter().map(Into::into));
        self
    }

    /// Directory of package `name`.
    #[must_use]
    pub fn package_path(&self, name: &str) -> PathBuf {
        self.package_dir.join(name)
    }

    /// Manifest path of package `name`.
    #[must_use]
    pub fn manifest_path(&self, name: &str) -> PathBuf {
        self.package_path(name).join(&self.manifest_file)
    }

    /// Best-guess executable path of package `name`.
    #[must_use]
    pub fn executable_path(&self, name: &str) -> PathBuf {
        executable_in(&self.package_path(name), name)
    }

    /// Whether `name` is a bootstrap service.
    #[must_use]
    pub fn is_bootstrap(&self, name: &str) -> bool {
        self.bootstrap_services.contains(name)
    }
}

pub(crate) fn executable_in(dir: &Path, name: &str) -> PathBuf {
    dir.join(format!("{name}{}", std::env::consts::EXE_SUFFIX))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_paths() {
        let layout = PackageLayout::new("/opt/packages");
        assert_eq!(
            layout.manifest_path("fetcher"),
            PathBuf::from("/opt/packages/fetcher/manifest.json")
        );
        let exe = layout.executable_path("fetcher");
        assert!(exe.starts_with("/opt/packages/fetcher"));
        assert!(
            exe.file_name()
                .unwrap()
                .to_string_lossy()
                .starts_with("fetcher")
        );
    }

    #[test]
    fn test_bootstrap() {
        let layout = PackageLayout::new("/tmp").with_bootstrap_services(["catalog"]);
        assert!(layout.is_bootstrap("catalog"));
        assert!(!layout.is_bootstrap("fetcher"));
    }
}

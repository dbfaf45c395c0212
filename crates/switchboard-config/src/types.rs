use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Top-level broker configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Package directory and manifest discovery.
    pub catalog: CatalogSection,
    /// Broker run loop settings.
    pub broker: BrokerSection,
    /// Logging and tracing.
    pub logging: LoggingSection,
}

// ---------------------------------------------------------------------------
// CatalogSection
// ---------------------------------------------------------------------------

/// Where service packages are found.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CatalogSection {
    /// Directory holding one sub-directory per package. Empty until the
    /// loader fills in `~/.switchboard/packages`.
    pub package_dir: PathBuf,
    /// Manifest file name inside each package directory.
    pub manifest_file: String,
    /// Services kept by the package scan even without an executable.
    pub bootstrap_services: Vec<String>,
}

impl CatalogSection {
    /// The package directory.
    #[must_use]
    pub fn package_dir(&self) -> &Path {
        &self.package_dir
    }
}

impl Default for CatalogSection {
    fn default() -> Self {
        Self {
            package_dir: PathBuf::new(),
            manifest_file: "manifest.json".to_owned(),
            bootstrap_services: Vec::new(),
        }
    }
}

// ---------------------------------------------------------------------------
// BrokerSection
// ---------------------------------------------------------------------------

/// Broker run loop settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BrokerSection {
    /// Milliseconds a started service has to acknowledge start. `0` disables
    /// the timeout.
    pub start_timeout_ms: u64,
    /// Capacity of the lifecycle event channel.
    pub event_channel_capacity: usize,
}

impl BrokerSection {
    /// The start timeout, if enabled.
    #[must_use]
    pub fn start_timeout(&self) -> Option<std::time::Duration> {
        (self.start_timeout_ms > 0).then(|| std::time::Duration::from_millis(self.start_timeout_ms))
    }
}

impl Default for BrokerSection {
    fn default() -> Self {
        Self {
            start_timeout_ms: 0,
            event_channel_capacity: 1024,
        }
    }
}

// ---------------------------------------------------------------------------
// LoggingSection
// ---------------------------------------------------------------------------

/// Logging and tracing configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSection {
    /// Global log level filter (`"trace"`, `"debug"`, `"info"`, `"warn"`,
    /// `"error"`).
    pub level: String,
    /// Output format: `"pretty"`, `"compact"`, `"json"` or `"full"`.
    pub format: String,
    /// Per-crate tracing directives (e.g. `["switchboard_catalog=debug"]`).
    pub directives: Vec<String>,
}

impl Default for LoggingSection {
    fn default() -> Self {
        Self {
            level: "info".to_owned(),
            format: "compact".to_owned(),
            directives: Vec::new(),
        }
    }
}

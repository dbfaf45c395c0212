//! Conversion from `switchboard_config` sections to domain types.

use switchboard_catalog::PackageLayout;
use switchboard_config::CatalogSection;
use switchboard_telemetry::{LogConfig, LogFormat};

/// Package layout described by the `[catalog]` section.
pub(crate) fn to_package_layout(section: &CatalogSection) -> PackageLayout {
    let mut layout = PackageLayout::new(section.package_dir())
        .with_bootstrap_services(section.bootstrap_services.iter().cloned());
    section.manifest_file.clone_into(&mut layout.manifest_file);
    layout
}

/// Logging used when the configuration cannot be loaded.
pub(crate) fn fallback_log_config(verbose: bool) -> LogConfig {
    let level = if verbose { "debug" } else { "info" };
    LogConfig::new(level).with_format(LogFormat::Compact)
}

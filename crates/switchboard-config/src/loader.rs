//! Config file discovery and layered loading.
//!
//! 1. Parse `defaults.toml` → base
//! 2. Merge `/etc/switchboard/config.toml` (system)
//! 3. Merge `~/.switchboard/config.toml` (user)
//! 4. Merge the explicit file, if one was given
//! 5. Apply env var fallbacks for fields no file set
//! 6. Resolve `${VAR}` references and deserialize
//! 7. Fill in the default package directory
//! 8. Validate

use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::env::{apply_env_fallbacks, collect_env_vars, resolve_env_references};
use crate::error::{ConfigError, ConfigResult};
use crate::merge::{ConfigLayer, FieldSources, deep_merge_tracking, record_leaves};
use crate::show::ResolvedConfig;
use crate::types::Config;
use crate::validate;

/// Embedded default configuration.
const DEFAULTS_TOML: &str = include_str!("defaults.toml");

/// Directory name under the home directory.
pub const HOME_DIR_NAME: &str = ".switchboard";

/// System-wide config file.
pub const SYSTEM_CONFIG_PATH: &str = "/etc/switchboard/config.toml";

/// Maximum allowed config file size (1 MB).
const MAX_CONFIG_FILE_SIZE: u64 = 1_048_576;

/// Load the configuration with layered file precedence.
///
/// `home_override` replaces the user's home directory for user config
/// discovery and the default package directory.
///
/// # Errors
///
/// Returns a [`ConfigError`] if any config file is malformed, the explicit
/// file is missing, or the final configuration fails validation.
pub fn load(explicit_file: Option<&Path>, home_override: Option<&Path>) -> ConfigResult<ResolvedConfig> {
    let env_vars = collect_env_vars();
    let home_dir = if let Some(h) = home_override {
        h.to_path_buf()
    } else {
        home_directory()?
    };

    let mut merged: toml::Value =
        toml::from_str(DEFAULTS_TOML).map_err(|e| ConfigError::ParseError {
            path: "<embedded defaults>".to_owned(),
            source: e,
        })?;

    let mut field_sources = FieldSources::new();
    let mut loaded_files = Vec::new();
    record_leaves(&merged, "", &ConfigLayer::Defaults, &mut field_sources);

    let system_path = PathBuf::from(SYSTEM_CONFIG_PATH);
    let user_path = home_dir.join(HOME_DIR_NAME).join("config.toml");
    let layers = [
        (Some(system_path), ConfigLayer::System),
        (Some(user_path), ConfigLayer::User),
        (explicit_file.map(Path::to_path_buf), ConfigLayer::Explicit),
    ];

    for (path, layer) in layers {
        let Some(path) = path else { continue };
        let overlay = match try_load_file(&path)? {
            Some(overlay) => overlay,
            None if layer == ConfigLayer::Explicit => {
                return Err(ConfigError::ReadError {
                    path: path.display().to_string(),
                    source: std::io::Error::from(std::io::ErrorKind::NotFound),
                });
            },
            None => continue,
        };
        deep_merge_tracking(&mut merged, &overlay, "", &layer, &mut field_sources);
        loaded_files.push(path.display().to_string());
        info!(path = %path.display(), layer = %layer, "loaded config");
    }

    let env_count = apply_env_fallbacks(&mut merged, &mut field_sources, &env_vars);
    if env_count > 0 {
        debug!(count = env_count, "applied environment variable fallbacks");
    }

    resolve_env_references(&mut merged, &env_vars);
    let mut config: Config =
        merged
            .try_into()
            .map_err(|e: toml::de::Error| ConfigError::ParseError {
                path: "<merged config>".to_owned(),
                source: e,
            })?;

    fill_package_dir(&mut config, &home_dir);
    validate::validate(&config)?;

    Ok(ResolvedConfig {
        config,
        field_sources,
        loaded_files,
    })
}

/// Load a config from a specific file path (no layering).
///
/// # Errors
///
/// Returns a [`ConfigError`] if the file cannot be read, parsed or
/// validated.
pub fn load_file(path: &Path) -> ConfigResult<Config> {
    let value = try_load_file(path)?.ok_or_else(|| ConfigError::ReadError {
        path: path.display().to_string(),
        source: std::io::Error::from(std::io::ErrorKind::NotFound),
    })?;

    let config: Config = value
        .try_into()
        .map_err(|e: toml::de::Error| ConfigError::ParseError {
            path: path.display().to_string(),
            source: e,
        })?;

    validate::validate(&config)?;
    Ok(config)
}

/// Default package directory under `home_dir`.
#[must_use]
pub fn default_package_dir(home_dir: &Path) -> PathBuf {
    home_dir.join(HOME_DIR_NAME).join("packages")
}

fn fill_package_dir(config: &mut Config, home_dir: &Path) {
    if config.catalog.package_dir.as_os_str().is_empty() {
        config.catalog.package_dir = default_package_dir(home_dir);
    }
}

/// Try to load a file, returning `None` if the file doesn't exist.
fn try_load_file(path: &Path) -> ConfigResult<Option<toml::Value>> {
    let content = match std::fs::read_to_string(path) {
        Ok(c) => c,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            debug!(path = %path.display(), "config file not found, skipping");
            return Ok(None);
        },
        Err(e) => {
            return Err(ConfigError::ReadError {
                path: path.display().to_string(),
                source: e,
            });
        },
    };

    if content.len() as u64 > MAX_CONFIG_FILE_SIZE {
        return Err(ConfigError::ValidationError {
            field: path.display().to_string(),
            message: format!(
                "config file is {} bytes, exceeding the {} byte limit",
                content.len(),
                MAX_CONFIG_FILE_SIZE
            ),
        });
    }

    let value: toml::Value = toml::from_str(&content).map_err(|e| ConfigError::ParseError {
        path: path.display().to_string(),
        source: e,
    })?;

    Ok(Some(value))
}

/// Determine the user's home directory.
fn home_directory() -> ConfigResult<PathBuf> {
    directories::BaseDirs::new()
        .map(|d| d.home_dir().to_path_buf())
        .ok_or(ConfigError::NoHomeDir)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_default_impl() {
        let config: Config = toml::from_str(DEFAULTS_TOML).unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_load_with_empty_home() {
        let home = tempfile::tempdir().unwrap();
        let resolved = load(None, Some(home.path())).unwrap();
        assert_eq!(
            resolved.config.catalog.package_dir(),
            default_package_dir(home.path())
        );
        assert_eq!(
            resolved.field_sources.get("broker.event_channel_capacity"),
            Some(&ConfigLayer::Defaults)
        );
    }

    #[test]
    fn test_user_then_explicit_layers() {
        let home = tempfile::tempdir().unwrap();
        let user_dir = home.path().join(HOME_DIR_NAME);
        std::fs::create_dir_all(&user_dir).unwrap();
        std::fs::write(
            user_dir.join("config.toml"),
            "[broker]\nstart_timeout_ms = 100\nevent_channel_capacity = 64\n",
        )
        .unwrap();

        let explicit = home.path().join("override.toml");
        std::fs::write(&explicit, "[broker]\nstart_timeout_ms = 250\n").unwrap();

        let resolved = load(Some(&explicit), Some(home.path())).unwrap();
        assert_eq!(resolved.config.broker.start_timeout_ms, 250);
        assert_eq!(resolved.config.broker.event_channel_capacity, 64);
        assert_eq!(
            resolved.field_sources.get("broker.start_timeout_ms"),
            Some(&ConfigLayer::Explicit)
        );
        assert_eq!(
            resolved.field_sources.get("broker.event_channel_capacity"),
            Some(&ConfigLayer::User)
        );
        assert!(resolved.loaded_files.len() >= 2);
    }

    #[test]
    fn test_missing_explicit_file_is_an_error() {
        let home = tempfile::tempdir().unwrap();
        let missing = home.path().join("nope.toml");
        assert!(matches!(
            load(Some(&missing), Some(home.path())),
            Err(ConfigError::ReadError { .. })
        ));
    }

    #[test]
    fn test_invalid_value_fails_validation() {
        let home = tempfile::tempdir().unwrap();
        let explicit = home.path().join("bad.toml");
        std::fs::write(&explicit, "[logging]\nformat = \"xml\"\n").unwrap();
        assert!(matches!(
            load(Some(&explicit), Some(home.path())),
            Err(ConfigError::ValidationError { .. })
        ));
    }

    #[test]
    fn test_load_file_nonexistent() {
        let result = load_file(Path::new("/nonexistent/config.toml"));
        assert!(matches!(result, Err(ConfigError::ReadError { .. })));
    }

    #[test]
    fn test_oversized_config_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let file_path = dir.path().join("huge.toml");
        let data = "x = \"".to_owned() + &"a".repeat(1_100_000) + "\"";
        std::fs::write(&file_path, data).unwrap();

        let result = try_load_file(&file_path);
        assert!(matches!(result, Err(ConfigError::ValidationError { .. })));
    }
}

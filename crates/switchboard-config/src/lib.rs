//! Layered configuration for the Switchboard broker daemon.
//!
//! # Usage
//!
//! ```rust,no_run
//! use switchboard_config::Config;
//!
//! // defaults → system → user → explicit file → env fallbacks
//! let resolved = Config::load(None).unwrap();
//! println!("packages in {}", resolved.config.catalog.package_dir().display());
//! ```
//!
//! # Configuration Precedence
//!
//! From highest to lowest priority:
//!
//! 1. **Explicit file** passed on the command line
//! 2. **User** (`~/.switchboard/config.toml`)
//! 3. **System** (`/etc/switchboard/config.toml`)
//! 4. **Environment variables** (`SWITCHBOARD_*`), fallback only
//! 5. **Embedded defaults** (`defaults.toml` compiled into the binary)
//!
//! This crate has no dependencies on other switchboard crates. Conversion
//! to domain types happens at startup in the binary.

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

/// Environment variable fallback resolution.
pub mod env;
/// Configuration error types.
pub mod error;
/// Configuration file discovery and loading.
pub mod loader;
/// Layered configuration merging with source tracking.
pub mod merge;
/// Resolved configuration display.
pub mod show;
/// Configuration struct definitions.
pub mod types;
/// Configuration validation rules.
pub mod validate;

pub use error::{ConfigError, ConfigResult};
pub use show::{ResolvedConfig, ShowFormat};
pub use types::*;

impl Config {
    /// Load configuration with the full precedence chain.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`] if any config file is malformed or the final
    /// configuration fails validation.
    pub fn load(explicit_file: Option<&std::path::Path>) -> ConfigResult<ResolvedConfig> {
        loader::load(explicit_file, None)
    }

    /// Load configuration with an explicit home directory override.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`] if any config file is malformed or the final
    /// configuration fails validation.
    pub fn load_with_home(
        explicit_file: Option<&std::path::Path>,
        home_dir: &std::path::Path,
    ) -> ConfigResult<ResolvedConfig> {
        loader::load(explicit_file, Some(home_dir))
    }

    /// Load configuration from a single file (no layering).
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`] if the file cannot be read, parsed, or fails
    /// validation.
    pub fn load_file(path: &std::path::Path) -> ConfigResult<Self> {
        loader::load_file(path)
    }
}

//! CLI handlers for the `switchboard config` subcommand.

use std::path::{Path, PathBuf};

use anyhow::Result;
use switchboard_config::loader::{HOME_DIR_NAME, SYSTEM_CONFIG_PATH};
use switchboard_config::{Config, ShowFormat};

use crate::theme::Theme;

/// Show the resolved configuration with source annotations.
pub(crate) fn show_config(config_file: Option<&Path>, format: &str, section: Option<&str>) -> Result<()> {
    let resolved = Config::load(config_file)?;

    let show_format = match format {
        "json" => ShowFormat::Json,
        _ => ShowFormat::Toml,
    };

    let output = resolved
        .show(show_format, section)
        .map_err(|e| anyhow::anyhow!("failed to format config: {e}"))?;

    println!("{output}");
    Ok(())
}

/// Validate the current configuration.
#[allow(clippy::unnecessary_wraps)]
pub(crate) fn validate_config(config_file: Option<&Path>) -> Result<()> {
    match Config::load(config_file) {
        Ok(resolved) => {
            println!("{}", Theme::success("Configuration is valid."));
            if !resolved.loaded_files.is_empty() {
                println!("\nLoaded files:");
                for path in &resolved.loaded_files {
                    println!("  - {path}");
                }
            }
            println!(
                "\nPackage directory: {}",
                resolved.config.catalog.package_dir().display()
            );
            Ok(())
        },
        Err(e) => {
            eprintln!("{}", Theme::error(&format!("Configuration error: {e}")));
            std::process::exit(1);
        },
    }
}

/// Config files checked, lowest precedence first.
pub(crate) fn config_paths(home: Option<&Path>, explicit: Option<&Path>) -> Vec<PathBuf> {
    let mut paths = vec![PathBuf::from(SYSTEM_CONFIG_PATH)];
    if let Some(home) = home {
        paths.push(home.join(HOME_DIR_NAME).join("config.toml"));
    }
    if let Some(explicit) = explicit {
        paths.push(explicit.to_path_buf());
    }
    paths
}

/// Show all config file paths that are checked.
#[allow(clippy::unnecessary_wraps)]
pub(crate) fn show_paths(config_file: Option<&Path>) -> Result<()> {
    let base = directories::BaseDirs::new();
    let home = base.as_ref().map(directories::BaseDirs::home_dir);

    println!("Configuration files checked (in precedence order):\n");
    for (i, path) in config_paths(home, config_file).iter().enumerate() {
        let status = if path.exists() { "found" } else { "not found" };
        println!("  {}. {}  [{status}]", i.saturating_add(1), path.display());
    }

    println!("\nEnvironment variable fallbacks:");
    for (var, field) in switchboard_config::env::env_var_mappings() {
        println!("  {var:<36} -> {field}");
    }

    Ok(())
}

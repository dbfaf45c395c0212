//! Manifest validation command.

use std::path::Path;

use anyhow::{Context, Result};
use switchboard_catalog::{Manifest, load_manifest};

use crate::theme::Theme;

/// Validate a manifest file and print a summary, or the normalized JSON.
pub(crate) fn validate_manifest(path: &Path, json: bool) -> Result<()> {
    let manifest = load_manifest(path)
        .with_context(|| format!("invalid manifest {}", path.display()))?;

    if json {
        println!("{}", serde_json::to_string_pretty(&manifest)?);
        return Ok(());
    }

    println!("{}", Theme::success(&format!("{} is valid", path.display())));
    for line in summarize(&manifest, 0) {
        println!("{line}");
    }
    Ok(())
}

/// One line per service and connection spec, members indented.
pub(crate) fn summarize(manifest: &Manifest, depth: usize) -> Vec<String> {
    let indent = "  ".repeat(depth.saturating_add(1));
    let mut lines = vec![format!(
        "{indent}{} ({}){}",
        manifest.name,
        manifest.display_name,
        if manifest.sandboxed { " [sandboxed]" } else { "" }
    )];
    for (spec_name, spec) in &manifest.interface_provider_specs {
        lines.push(format!(
            "{indent}  {spec_name}: {} provided, {} peers required",
            spec.provides.len(),
            spec.requires.len()
        ));
    }
    for member in &manifest.services {
        lines.extend(summarize(member, depth.saturating_add(1)));
    }
    lines
}

#[cfg(test)]
mod tests {
    use switchboard_test::prelude::*;

    use super::*;

    #[test]
    fn test_summary_lists_members() {
        let package = package_manifest("suite", vec![test_manifest("member")]);
        let lines = summarize(&package, 0);
        // package line, its connector spec, then the member
        assert_eq!(lines.len(), 3);
        assert!(lines[0].trim_start().starts_with("suite (Test service suite)"));
        assert!(lines[1].contains("switchboard:connector: 1 provided"));
        assert!(lines[2].starts_with("    member"));
    }

    #[test]
    fn test_summary_counts_spec_sections() {
        let (a, _) = fetcher_pair();
        let lines = summarize(&a, 0);
        assert!(lines.iter().any(|l| l.contains("0 provided, 1 peers required")));
    }

    #[test]
    fn test_validate_rejects_bad_manifest() {
        let dir = test_dir();
        let path = dir.path().join("manifest.json");
        std::fs::write(&path, r#"{"name": "", "display_name": "x"}"#).unwrap();
        assert!(validate_manifest(&path, false).is_err());

        std::fs::write(&path, r#"{"name": "ok", "display_name": "Ok"}"#).unwrap();
        assert!(validate_manifest(&path, true).is_ok());
    }
}

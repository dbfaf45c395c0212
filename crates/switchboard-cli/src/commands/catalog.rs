//! Catalog inspection commands.

use std::sync::Arc;

use anyhow::Result;
use colored::Colorize;
use switchboard_capabilities::{CapabilityRequest, effective_capability_request};
use switchboard_catalog::{
    Entry, EntryCache, PackageLayout, create_entry_for_name, scan_directory,
};
use switchboard_core::{Identity, ROOT_USER_GUID};

use crate::theme::Theme;

/// List every package the scan accepts.
#[allow(clippy::unnecessary_wraps)]
pub(crate) fn list_packages(layout: &PackageLayout) -> Result<()> {
    let entries = scan_directory(layout);
    println!(
        "{} {}",
        Theme::header("Packages in"),
        layout.package_dir.display()
    );
    println!("{}", Theme::separator());

    if entries.is_empty() {
        println!("{}", Theme::dimmed("  (none)"));
        return Ok(());
    }
    for entry in &entries {
        println!(
            "  {} {}",
            entry.name().bold(),
            Theme::dimmed(&format!("({})", entry.display_name()))
        );
        println!("    {}", entry.package_path().display());
        for child in entry.children() {
            println!("    - {}", child.name());
        }
    }
    Ok(())
}

/// Print the entry the catalog would resolve `name` to.
pub(crate) fn show_entry(layout: &PackageLayout, name: &str) -> Result<()> {
    let entry = create_entry_for_name(name, layout, None, &EntryCache::new());
    if entry.specs().is_empty() && !layout.manifest_path(name).exists() {
        println!(
            "{}",
            Theme::warning(&format!("No manifest for {name}; resolves to a placeholder"))
        );
    }
    println!("{}", serde_json::to_string_pretty(&entry.serialize())?);
    println!(
        "{}",
        Theme::dimmed(&format!("package path: {}", entry.package_path().display()))
    );
    Ok(())
}

/// What `source` is granted on `target`, evaluated on their connection
/// specs.
pub(crate) fn grants(source: &Entry, target: &Entry) -> CapabilityRequest {
    let target_identity = Identity::new(target.name(), ROOT_USER_GUID);
    effective_capability_request(
        &source.connection_spec(),
        &target_identity,
        &target.connection_spec(),
    )
}

/// Print the capability request `source` gets on `target`.
#[allow(clippy::unnecessary_wraps)]
pub(crate) fn show_grants(
    layout: &PackageLayout,
    source: &str,
    target: &str,
    interface: Option<&str>,
) -> Result<()> {
    let cache = EntryCache::new();
    let source_entry: Arc<Entry> = create_entry_for_name(source, layout, None, &cache);
    let target_entry: Arc<Entry> = create_entry_for_name(target, layout, None, &cache);
    let request = grants(&source_entry, &target_entry);

    println!("{}", Theme::header(&format!("{source} -> {target}")));
    if request.is_empty() {
        println!("{}", Theme::error("No capabilities granted; connects are denied"));
        return Ok(());
    }
    println!("  capabilities: {}", join(&request.capabilities));
    println!("  interfaces:   {}", join(&request.interfaces));

    if let Some(interface) = interface {
        if request.allows_interface(interface) {
            println!("{}", Theme::success(&format!("{interface} may be bound")));
        } else {
            println!("{}", Theme::error(&format!("{interface} is outside the grant")));
        }
    }
    Ok(())
}

fn join<'a>(items: impl IntoIterator<Item = &'a String>) -> String {
    let items: Vec<&str> = items.into_iter().map(String::as_str).collect();
    if items.is_empty() {
        "-".to_owned()
    } else {
        items.join(", ")
    }
}

#[cfg(test)]
mod tests {
    use std::path::Path;

    use switchboard_test::prelude::*;

    use super::*;

    fn entry(manifest: &switchboard_catalog::Manifest) -> Arc<Entry> {
        Entry::from_manifest(manifest, Path::new("/packages/x")).unwrap()
    }

    #[test]
    fn test_grants_follow_connection_specs() {
        let (a, b) = fetcher_pair();
        let request = grants(&entry(&a), &entry(&b));
        assert!(request.allows_interface("net.Fetcher"));
        assert!(!request.allows_interface("net.Admin"));

        // b requires nothing of a.
        assert!(grants(&entry(&b), &entry(&a)).is_empty());
    }

    #[test]
    fn test_commands_read_package_dir() {
        let packages = PackageDir::new();
        let (a, b) = fetcher_pair();
        let _ = packages.add_package(&a);
        let _ = packages.add_package(&b);
        let layout = packages.layout();

        assert!(list_packages(&layout).is_ok());
        assert!(show_entry(&layout, "missing").is_ok());
        assert!(show_grants(&layout, "a", "b", Some("net.Fetcher")).is_ok());
    }

    #[test]
    fn test_join() {
        let items = ["x".to_owned(), "y".to_owned()];
        assert_eq!(join(&items), "x, y");
        assert_eq!(join(&Vec::<String>::new()), "-");
    }
}

//! Deep merge of TOML values with source tracking.
//!
//! The merge operates on raw [`toml::Value`] trees rather than deserialized
//! structs, so a key missing from an overlay never overrides the base layer.

use std::collections::HashMap;

/// Which configuration layer a value came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigLayer {
    /// Compiled-in defaults (`defaults.toml`).
    Defaults,
    /// System-wide configuration (`/etc/switchboard/config.toml`).
    System,
    /// User-level configuration (`~/.switchboard/config.toml`).
    User,
    /// File named on the command line.
    Explicit,
    /// Environment variable fallback.
    Environment,
}

impl std::fmt::Display for ConfigLayer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Defaults => write!(f, "defaults"),
            Self::System => write!(f, "system"),
            Self::User => write!(f, "user"),
            Self::Explicit => write!(f, "file"),
            Self::Environment => write!(f, "env"),
        }
    }
}

/// Tracks which layer set each field's value.
pub type FieldSources = HashMap<String, ConfigLayer>;

/// Deep-merge `overlay` into `base`, recording which layer set each leaf
/// field.
///
/// Tables merge per key; scalars and arrays from the overlay replace the
/// base value.
pub fn deep_merge_tracking(
    base: &mut toml::Value,
    overlay: &toml::Value,
    prefix: &str,
    layer: &ConfigLayer,
    sources: &mut FieldSources,
) {
    match (base, overlay) {
        (toml::Value::Table(base_table), toml::Value::Table(overlay_table)) => {
            for (key, overlay_val) in overlay_table {
                let path = join(prefix, key);
                if let Some(base_val) = base_table.get_mut(key) {
                    if overlay_val.is_table() {
                        deep_merge_tracking(base_val, overlay_val, &path, layer, sources);
                    } else {
                        *base_val = overlay_val.clone();
                        sources.insert(path, layer.clone());
                    }
                } else {
                    base_table.insert(key.clone(), overlay_val.clone());
                    record_leaves(overlay_val, &path, layer, sources);
                }
            }
        },
        (base, overlay) => {
            *base = overlay.clone();
            sources.insert(prefix.to_owned(), layer.clone());
        },
    }
}

/// Walk a value tree and record every leaf path with `layer`.
pub fn record_leaves(
    val: &toml::Value,
    prefix: &str,
    layer: &ConfigLayer,
    sources: &mut FieldSources,
) {
    if let toml::Value::Table(table) = val {
        for (key, child) in table {
            record_leaves(child, &join(prefix, key), layer, sources);
        }
    } else {
        sources.insert(prefix.to_owned(), layer.clone());
    }
}

fn join(prefix: &str, key: &str) -> String {
    if prefix.is_empty() {
        key.to_owned()
    } else {
        format!("{prefix}.{key}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(s: &str) -> toml::Value {
        toml::from_str(s).unwrap()
    }

    #[test]
    fn test_overlay_replaces_scalars_and_keeps_siblings() {
        let mut base = parse("[broker]\nstart_timeout_ms = 0\nevent_channel_capacity = 1024\n");
        let overlay = parse("[broker]\nstart_timeout_ms = 500\n");
        let mut sources = FieldSources::new();
        deep_merge_tracking(&mut base, &overlay, "", &ConfigLayer::User, &mut sources);

        assert_eq!(base["broker"]["start_timeout_ms"].as_integer(), Some(500));
        assert_eq!(base["broker"]["event_channel_capacity"].as_integer(), Some(1024));
        assert_eq!(sources.get("broker.start_timeout_ms"), Some(&ConfigLayer::User));
        assert!(!sources.contains_key("broker.event_channel_capacity"));
    }

    #[test]
    fn test_arrays_are_replaced() {
        let mut base = parse("[catalog]\nbootstrap_services = [\"a\", \"b\"]\n");
        let overlay = parse("[catalog]\nbootstrap_services = [\"c\"]\n");
        let mut sources = FieldSources::new();
        deep_merge_tracking(&mut base, &overlay, "", &ConfigLayer::System, &mut sources);
        let list = base["catalog"]["bootstrap_services"].as_array().unwrap();
        assert_eq!(list.len(), 1);
    }

    #[test]
    fn test_new_tables_record_all_leaves() {
        let mut base = parse("");
        let overlay = parse("[logging]\nlevel = \"debug\"\nformat = \"json\"\n");
        let mut sources = FieldSources::new();
        deep_merge_tracking(&mut base, &overlay, "", &ConfigLayer::Explicit, &mut sources);
        assert_eq!(sources.get("logging.level"), Some(&ConfigLayer::Explicit));
        assert_eq!(sources.get("logging.format"), Some(&ConfigLayer::Explicit));
    }
}

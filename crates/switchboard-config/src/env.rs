//! Environment variable fallback and `${VAR}` reference resolution.
//!
//! Env vars are **fallback**, not override: they only fill fields that no
//! config file set.

use std::collections::HashMap;
use std::fmt::Write as _;

use tracing::debug;

use crate::merge::{ConfigLayer, FieldSources};

/// Mapping from environment variable name to config field path.
struct EnvMapping {
    var_name: &'static str,
    field_path: &'static str,
}

/// All supported `SWITCHBOARD_*` env var mappings.
const ENV_MAPPINGS: &[EnvMapping] = &[
    EnvMapping {
        var_name: "SWITCHBOARD_PACKAGE_DIR",
        field_path: "catalog.package_dir",
    },
    EnvMapping {
        var_name: "SWITCHBOARD_MANIFEST_FILE",
        field_path: "catalog.manifest_file",
    },
    EnvMapping {
        var_name: "SWITCHBOARD_BOOTSTRAP_SERVICES",
        field_path: "catalog.bootstrap_services",
    },
    EnvMapping {
        var_name: "SWITCHBOARD_START_TIMEOUT_MS",
        field_path: "broker.start_timeout_ms",
    },
    EnvMapping {
        var_name: "SWITCHBOARD_EVENT_CHANNEL_CAPACITY",
        field_path: "broker.event_channel_capacity",
    },
    EnvMapping {
        var_name: "SWITCHBOARD_LOG_LEVEL",
        field_path: "logging.level",
    },
    EnvMapping {
        var_name: "SWITCHBOARD_LOG_FORMAT",
        field_path: "logging.format",
    },
];

/// Every supported env var paired with the config field it falls back for.
pub fn env_var_mappings() -> impl Iterator<Item = (&'static str, &'static str)> {
    ENV_MAPPINGS.iter().map(|m| (m.var_name, m.field_path))
}

/// Snapshot the process environment.
#[must_use]
pub fn collect_env_vars() -> HashMap<String, String> {
    std::env::vars().collect()
}

/// Apply environment variable fallbacks to fields that no config file set.
///
/// Returns the number of env vars applied.
pub fn apply_env_fallbacks<S: ::std::hash::BuildHasher>(
    merged: &mut toml::Value,
    sources: &mut FieldSources,
    env_vars: &HashMap<String, String, S>,
) -> usize {
    let mut count: usize = 0;

    for mapping in ENV_MAPPINGS {
        let set_by_file = sources
            .get(mapping.field_path)
            .is_some_and(|layer| *layer != ConfigLayer::Defaults);
        if set_by_file {
            continue;
        }

        if let Some(val) = env_vars.get(mapping.var_name) {
            debug!(
                var = mapping.var_name,
                field = mapping.field_path,
                "applying env var fallback"
            );
            set_field_from_string(merged, mapping.field_path, val);
            sources.insert(mapping.field_path.to_owned(), ConfigLayer::Environment);
            count = count.saturating_add(1);
        }
    }

    count
}

/// Resolve `${VAR}` references within string values in the config tree.
///
/// References that don't resolve are left as-is.
pub fn resolve_env_references<S: ::std::hash::BuildHasher>(
    val: &mut toml::Value,
    env_vars: &HashMap<String, String, S>,
) {
    match val {
        toml::Value::String(s) => {
            *s = resolve_string_refs(s, env_vars);
        },
        toml::Value::Table(table) => {
            for (_, child) in table.iter_mut() {
                resolve_env_references(child, env_vars);
            }
        },
        toml::Value::Array(arr) => {
            for child in arr.iter_mut() {
                resolve_env_references(child, env_vars);
            }
        },
        _ => {},
    }
}

/// Replace `${VAR}` references in a string with their env var values.
fn resolve_string_refs<S: ::std::hash::BuildHasher>(
    input: &str,
    env_vars: &HashMap<String, String, S>,
) -> String {
    let mut result = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch == '$' && chars.peek() == Some(&'{') {
            chars.next();
            let mut var_name = String::new();
            let mut closed = false;

            for ch in chars.by_ref() {
                if ch == '}' {
                    closed = true;
                    break;
                }
                var_name.push(ch);
            }

            if closed && !var_name.is_empty() {
                if let Some(val) = env_vars.get(&var_name) {
                    result.push_str(val);
                } else {
                    debug!(var = var_name, "unresolved env var reference in config");
                    let _ = write!(result, "${{{var_name}}}");
                }
            } else {
                // Malformed reference, leave as-is.
                result.push_str("${");
                result.push_str(&var_name);
            }
        } else {
            result.push(ch);
        }
    }

    result
}

/// Set a dotted field in the TOML tree from a string value, creating
/// intermediate tables as needed.
fn set_field_from_string(root: &mut toml::Value, path: &str, val: &str) {
    let (parents, leaf) = path.rsplit_once('.').unwrap_or(("", path));

    let mut current = root;
    for segment in parents.split('.').filter(|s| !s.is_empty()) {
        let Some(table) = current.as_table_mut() else {
            return;
        };
        current = table
            .entry(segment.to_owned())
            .or_insert(toml::Value::Table(toml::map::Map::new()));
    }

    if let Some(table) = current.as_table_mut() {
        table.insert(leaf.to_owned(), coerce_to_toml_value(path, val));
    }
}

/// Coerce a string env var value to the TOML type of the field.
fn coerce_to_toml_value(path: &str, val: &str) -> toml::Value {
    if matches!(
        path,
        "broker.start_timeout_ms" | "broker.event_channel_capacity"
    ) && let Ok(i) = val.parse::<i64>()
    {
        return toml::Value::Integer(i);
    }

    if path == "catalog.bootstrap_services" {
        return toml::Value::Array(
            val.split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(|s| toml::Value::String(s.to_owned()))
                .collect(),
        );
    }

    toml::Value::String(val.to_owned())
}

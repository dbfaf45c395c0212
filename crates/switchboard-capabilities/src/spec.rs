//! Interface provider specs.
//!
//! A service manifest carries one [`InterfaceProviderSpec`] per connection
//! spec name. Only [`CONNECTOR_SPEC`](crate::CONNECTOR_SPEC) is consulted by
//! the broker; other names are carried through untouched.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::error::{CapabilityError, CapabilityResult};
use crate::names::{CONNECTOR_SPEC, WILDCARD};

/// Capabilities a service provides and the capabilities it requires from
/// its peers.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InterfaceProviderSpec {
    /// Capability name to the interfaces it exposes.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub provides: BTreeMap<String, BTreeSet<String>>,
    /// Peer service name (or `"*"`) to the capabilities required from it.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub requires: BTreeMap<String, BTreeSet<String>>,
}

/// Connection spec name to spec.
pub type InterfaceProviderSpecMap = BTreeMap<String, InterfaceProviderSpec>;

impl InterfaceProviderSpec {
    /// Declare that `capability` exposes `interface`.
    pub fn provide(&mut self, capability: impl Into<String>, interface: impl Into<String>) {
        self.provides
            .entry(capability.into())
            .or_default()
            .insert(interface.into());
    }

    /// Declare that this service requires `capability` from `peer`.
    pub fn require(&mut self, peer: impl Into<String>, capability: impl Into<String>) {
        self.requires
            .entry(peer.into())
            .or_default()
            .insert(capability.into());
    }

    /// Builder form of [`provide`](Self::provide).
    #[must_use]
    pub fn providing(mut self, capability: &str, interfaces: &[&str]) -> Self {
        for interface in interfaces {
            self.provide(capability, *interface);
        }
        self
    }

    /// Builder form of [`require`](Self::require).
    #[must_use]
    pub fn requiring(mut self, peer: &str, capabilities: &[&str]) -> Self {
        let set = self.requires.entry(peer.to_string()).or_default();
        set.extend(capabilities.iter().map(|c| (*c).to_string()));
        self
    }

    /// Capabilities required from `peer`, if any are listed.
    #[must_use]
    pub fn required_from(&self, peer: &str) -> Option<&BTreeSet<String>> {
        self.requires.get(peer)
    }

    /// Whether `requires` names `peer` directly or through the wildcard.
    #[must_use]
    pub fn may_connect_to(&self, peer: &str) -> bool {
        self.requires.contains_key(peer) || self.requires.contains_key(WILDCARD)
    }

    /// Validate a single spec.
    ///
    /// # Errors
    ///
    /// Returns an error if a `provides` list contains the wildcard interface
    /// or any name is empty.
    pub fn validate(&self, spec_name: &str) -> CapabilityResult<()> {
        for (capability, interfaces) in &self.provides {
            if capability.is_empty() {
                return Err(empty(spec_name, "capability"));
            }
            for interface in interfaces {
                if interface == WILDCARD {
                    return Err(CapabilityError::WildcardInterface {
                        spec: spec_name.to_string(),
                        capability: capability.clone(),
                    });
                }
                if interface.is_empty() {
                    return Err(empty(spec_name, "interface"));
                }
            }
        }
        for (peer, capabilities) in &self.requires {
            if peer.is_empty() {
                return Err(empty(spec_name, "peer"));
            }
            if capabilities.iter().any(String::is_empty) {
                return Err(empty(spec_name, "capability"));
            }
        }
        Ok(())
    }
}

fn empty(spec: &str, kind: &'static str) -> CapabilityError {
    CapabilityError::EmptyName {
        spec: spec.to_string(),
        kind,
    }
}

/// Validate every spec in a manifest's spec map.
///
/// # Errors
///
/// Returns the first validation failure.
pub fn validate_spec_map(specs: &InterfaceProviderSpecMap) -> CapabilityResult<()> {
    specs
        .iter()
        .try_for_each(|(name, spec)| spec.validate(name))
}

/// The spec consulted for connections, or an empty spec when the manifest
/// declares none.
#[must_use]
pub fn connection_spec(specs: &InterfaceProviderSpecMap) -> InterfaceProviderSpec {
    specs.get(CONNECTOR_SPEC).cloned().unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wildcard_in_provides_rejected() {
        let spec = InterfaceProviderSpec::default().providing("all", &["*"]);
        let err = spec.validate(CONNECTOR_SPEC).unwrap_err();
        assert!(matches!(err, CapabilityError::WildcardInterface { capability, .. } if capability == "all"));
    }

    #[test]
    fn test_wildcard_in_requires_is_fine() {
        let spec = InterfaceProviderSpec::default().requiring("*", &["*"]);
        assert!(spec.validate(CONNECTOR_SPEC).is_ok());
        assert!(spec.may_connect_to("anything"));
    }

    #[test]
    fn test_empty_names_rejected() {
        let spec = InterfaceProviderSpec::default().requiring("", &["x"]);
        assert!(matches!(
            spec.validate("s"),
            Err(CapabilityError::EmptyName { kind: "peer", .. })
        ));
        let spec = InterfaceProviderSpec::default().providing("cap", &[""]);
        assert!(matches!(
            spec.validate("s"),
            Err(CapabilityError::EmptyName { kind: "interface", .. })
        ));
    }

    #[test]
    fn test_connection_spec_defaults_to_empty() {
        let mut map = InterfaceProviderSpecMap::new();
        assert_eq!(connection_spec(&map), InterfaceProviderSpec::default());

        let spec = InterfaceProviderSpec::default().requiring("b", &["fetch"]);
        map.insert(CONNECTOR_SPEC.to_string(), spec.clone());
        map.insert("other".to_string(), InterfaceProviderSpec::default());
        assert_eq!(connection_spec(&map), spec);
    }

    #[test]
    fn test_json_shape() {
        let json = r#"{"provides": {"fetch": ["net.Fetcher"]}, "requires": {"*": ["app"]}}"#;
        let spec: InterfaceProviderSpec = serde_json::from_str(json).unwrap();
        assert!(spec.provides["fetch"].contains("net.Fetcher"));
        assert!(spec.requires["*"].contains("app"));

        let empty: InterfaceProviderSpec = serde_json::from_str("{}").unwrap();
        assert_eq!(empty, InterfaceProviderSpec::default());
        assert_eq!(serde_json::to_string(&empty).unwrap(), "{}");
    }
}

//! Capability requests and policy evaluation.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use switchboard_core::{BROKER_NAME, Identity};
use tracing::trace;

use crate::names::{EXPLICIT_CLASS_CAPABILITY, WILDCARD};
use crate::spec::InterfaceProviderSpec;

/// What one service is granted on another.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CapabilityRequest {
    /// Capabilities the source requires from the target.
    pub capabilities: BTreeSet<String>,
    /// Interfaces those capabilities expose on the target.
    pub interfaces: BTreeSet<String>,
}

impl CapabilityRequest {
    /// Whether the source may bind `interface` on the target.
    #[must_use]
    pub fn allows_interface(&self, interface: &str) -> bool {
        self.interfaces.contains(WILDCARD) || self.interfaces.contains(interface)
    }

    /// Whether anything at all was granted.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.capabilities.is_empty() && self.interfaces.is_empty()
    }
}

/// Whether `spec` requires `capability` from the broker.
#[must_use]
pub fn has_capability(spec: &InterfaceProviderSpec, capability: &str) -> bool {
    spec.requires
        .get(BROKER_NAME)
        .is_some_and(|caps| caps.contains(capability))
}

/// Compute what `source_spec` is granted on the service `target`.
///
/// Capabilities are those the source requires from the target by name plus
/// those it requires from every peer. Interfaces are everything the target
/// provides under those capabilities; a wildcard capability grants the
/// wildcard interface unless the target demands explicit capabilities.
#[must_use]
pub fn effective_capability_request(
    source_spec: &InterfaceProviderSpec,
    target: &Identity,
    target_spec: &InterfaceProviderSpec,
) -> CapabilityRequest {
    let mut request = CapabilityRequest::default();

    for peer in [target.name(), WILDCARD] {
        if let Some(caps) = source_spec.requires.get(peer) {
            request.capabilities.extend(caps.iter().cloned());
        }
    }

    for capability in &request.capabilities {
        if capability == WILDCARD {
            request.interfaces.insert(WILDCARD.to_string());
        } else if let Some(interfaces) = target_spec.provides.get(capability) {
            request.interfaces.extend(interfaces.iter().cloned());
        }
    }

    if has_capability(target_spec, EXPLICIT_CLASS_CAPABILITY) {
        request.capabilities.remove(WILDCARD);
        request.interfaces.remove(WILDCARD);
    }

    trace!(
        target = %target,
        capabilities = ?request.capabilities,
        interfaces = ?request.interfaces,
        "Computed capability request"
    );
    request
}

#[cfg(test)]
mod tests {
    use switchboard_core::ROOT_USER_GUID;

    use super::*;
    use crate::names::SINGLETON_CAPABILITY;

    fn target(name: &str) -> Identity {
        Identity::new(name, ROOT_USER_GUID)
    }

    fn fetcher_spec() -> InterfaceProviderSpec {
        InterfaceProviderSpec::default()
            .providing("fetch", &["net.Fetcher"])
            .providing("admin", &["net.Admin", "net.Stats"])
    }

    #[test]
    fn test_grants_exactly_provided_interfaces() {
        let source = InterfaceProviderSpec::default().requiring("b", &["fetch"]);
        let req = effective_capability_request(&source, &target("b"), &fetcher_spec());
        assert_eq!(req.interfaces.len(), 1);
        assert!(req.allows_interface("net.Fetcher"));
        assert!(!req.allows_interface("net.Admin"));
    }

    #[test]
    fn test_no_requires_grants_nothing() {
        let source = InterfaceProviderSpec::default();
        let req = effective_capability_request(&source, &target("b"), &fetcher_spec());
        assert!(req.is_empty());
        assert!(!req.allows_interface("net.Fetcher"));
    }

    #[test]
    fn test_wildcard_peer_applies_to_every_target() {
        let source = InterfaceProviderSpec::default().requiring("*", &["admin"]);
        let req = effective_capability_request(&source, &target("b"), &fetcher_spec());
        assert!(req.allows_interface("net.Stats"));
        assert!(req.allows_interface("net.Admin"));
    }

    #[test]
    fn test_unknown_capability_adds_no_interfaces() {
        let source = InterfaceProviderSpec::default().requiring("b", &["bogus"]);
        let req = effective_capability_request(&source, &target("b"), &fetcher_spec());
        assert!(req.capabilities.contains("bogus"));
        assert!(req.interfaces.is_empty());
    }

    #[test]
    fn test_wildcard_capability_grants_everything() {
        let source = InterfaceProviderSpec::default().requiring("b", &["*"]);
        let req = effective_capability_request(&source, &target("b"), &fetcher_spec());
        assert!(req.allows_interface("net.Anything"));
    }

    #[test]
    fn test_explicit_class_strips_wildcard() {
        let source = InterfaceProviderSpec::default().requiring("b", &["*", "fetch"]);
        let target_spec =
            fetcher_spec().requiring(BROKER_NAME, &[EXPLICIT_CLASS_CAPABILITY]);
        let req = effective_capability_request(&source, &target("b"), &target_spec);
        assert!(!req.interfaces.contains(WILDCARD));
        assert!(!req.capabilities.contains(WILDCARD));
        assert!(req.allows_interface("net.Fetcher"));
        assert!(!req.allows_interface("net.Admin"));
    }

    #[test]
    fn test_adding_requirements_never_shrinks_grant() {
        let narrow = InterfaceProviderSpec::default().requiring("b", &["fetch"]);
        let wide = narrow.clone().requiring("*", &["admin", "bogus"]);
        let t = target("b");
        let spec = fetcher_spec();
        let a = effective_capability_request(&narrow, &t, &spec);
        let b = effective_capability_request(&wide, &t, &spec);
        assert!(a.capabilities.is_subset(&b.capabilities));
        assert!(a.interfaces.is_subset(&b.interfaces));
    }

    #[test]
    fn test_interfaces_always_traceable_to_a_grant() {
        let source = InterfaceProviderSpec::default().requiring("b", &["admin"]);
        let spec = fetcher_spec();
        let req = effective_capability_request(&source, &target("b"), &spec);
        for interface in &req.interfaces {
            assert!(
                req.capabilities
                    .iter()
                    .any(|c| spec.provides.get(c).is_some_and(|i| i.contains(interface)))
            );
        }
    }

    #[test]
    fn test_has_capability_only_reads_broker_entry() {
        let spec = InterfaceProviderSpec::default()
            .requiring(BROKER_NAME, &[SINGLETON_CAPABILITY])
            .requiring("other", &[EXPLICIT_CLASS_CAPABILITY]);
        assert!(has_capability(&spec, SINGLETON_CAPABILITY));
        assert!(!has_capability(&spec, EXPLICIT_CLASS_CAPABILITY));
    }
}

//! Test fixtures for common types.

use switchboard_capabilities::{
    CONNECTOR_SPEC, InterfaceProviderSpec, SERVICE_FACTORY_CAPABILITY, SERVICE_FACTORY_INTERFACE,
};
use switchboard_catalog::Manifest;
use switchboard_core::{BROKER_NAME, Identity, ROOT_USER_GUID};

/// A user id for "alice".
pub const ALICE_USER_ID: &str = "7c1d1bd4-5a8e-4c43-9cf3-7bb9f8ab2a11";

/// A user id for "bob".
pub const BOB_USER_ID: &str = "0f6ad0d4-2b54-4c8f-8f8e-3c0f3f0f5b21";

/// Identity of `name` running as root.
#[must_use]
pub fn root_identity(name: &str) -> Identity {
    Identity::new(name, ROOT_USER_GUID)
}

/// Identity of `name` running as alice.
#[must_use]
pub fn alice(name: &str) -> Identity {
    Identity::new(name, ALICE_USER_ID)
}

/// Identity of `name` running as bob.
#[must_use]
pub fn bob(name: &str) -> Identity {
    Identity::new(name, BOB_USER_ID)
}

/// A manifest with an empty connection spec.
#[must_use]
pub fn test_manifest(name: &str) -> Manifest {
    Manifest::new(name, format!("Test service {name}"))
}

/// A manifest whose connection spec is `spec`.
#[must_use]
pub fn manifest_with_spec(name: &str, spec: InterfaceProviderSpec) -> Manifest {
    let mut manifest = test_manifest(name);
    manifest
        .interface_provider_specs
        .insert(CONNECTOR_SPEC.to_string(), spec);
    manifest
}

/// A manifest that requires the given broker capabilities.
#[must_use]
pub fn manifest_with_broker_capabilities(name: &str, capabilities: &[&str]) -> Manifest {
    manifest_with_spec(
        name,
        InterfaceProviderSpec::default().requiring(BROKER_NAME, capabilities),
    )
}

/// A package manifest exposing a service factory and bundling `members`.
#[must_use]
pub fn package_manifest(name: &str, members: Vec<Manifest>) -> Manifest {
    let mut manifest = manifest_with_spec(
        name,
        InterfaceProviderSpec::default()
            .providing(SERVICE_FACTORY_CAPABILITY, &[SERVICE_FACTORY_INTERFACE]),
    );
    manifest.services = members;
    manifest
}

/// The two-service fixture: `a` requires `fetch` from `b`, `b` provides
/// `net.Fetcher` under `fetch` and `net.Admin` under `admin`.
#[must_use]
pub fn fetcher_pair() -> (Manifest, Manifest) {
    let a = manifest_with_spec(
        "a",
        InterfaceProviderSpec::default().requiring("b", &["fetch"]),
    );
    let b = manifest_with_spec(
        "b",
        InterfaceProviderSpec::default()
            .providing("fetch", &["net.Fetcher"])
            .providing("admin", &["net.Admin"]),
    );
    (a, b)
}

#[cfg(test)]
mod tests {
    use switchboard_capabilities::connection_spec;

    use super::*;

    #[test]
    fn test_fixture_identities_are_valid() {
        assert!(root_identity("x").validate().is_ok());
        assert!(alice("x").validate().is_ok());
        assert!(bob("x").validate().is_ok());
    }

    #[test]
    fn test_package_manifest_validates() {
        let manifest = package_manifest("pkg", vec![test_manifest("member")]);
        assert!(manifest.validate().is_ok());
        let spec = connection_spec(&manifest.interface_provider_specs);
        assert!(spec.provides.contains_key(SERVICE_FACTORY_CAPABILITY));
    }

    #[test]
    fn test_fetcher_pair_policy() {
        let (a, b) = fetcher_pair();
        let a_spec = connection_spec(&a.interface_provider_specs);
        assert!(a_spec.may_connect_to("b"));
        assert!(!a_spec.may_connect_to("c"));
        assert!(b.validate().is_ok());
    }
}

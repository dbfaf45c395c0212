//! Prelude module - commonly used types for convenient import.
//!
//! Use `use switchboard_catalog::prelude::*;` to import all essential types.

// Errors
pub use crate::{CatalogError, CatalogResult};

// Manifests
pub use crate::{Entry, Manifest};

// Resolution
pub use crate::{Catalog, ManifestProvider, PackageLayout, ResolveCallback, ServiceResolver};

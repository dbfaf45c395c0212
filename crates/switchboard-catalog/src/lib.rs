//! Switchboard Catalog - Service manifests and name resolution.
//!
//! This crate provides:
//! - [`Manifest`], the JSON document describing a service or a package of
//!   services
//! - [`Entry`], the immutable in-memory manifest tree with parent links
//! - [`Reader`], a sequential background worker that scans the package
//!   directory and loads manifests on demand
//! - [`Catalog`], the cached [`ServiceResolver`] the broker consults for
//!   every cold connect
//!
//! Resolution never fails: a name with no manifest resolves to a placeholder
//! entry that points at the best-guess executable, deferring the failure to
//! launch time.

#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

pub mod prelude;

mod catalog;
mod entry;
mod error;
mod layout;
mod manifest;
mod provider;
mod reader;
mod resolver;

pub use catalog::Catalog;
pub use entry::Entry;
pub use error::{CatalogError, CatalogResult};
pub use layout::{DEFAULT_MANIFEST_FILE, PackageLayout};
pub use manifest::{Manifest, load_manifest, parse_manifest};
pub use provider::{InMemoryManifestProvider, ManifestProvider};
pub use reader::{EntryCache, Reader, create_entry_for_name, scan_directory};
pub use resolver::{ResolveCallback, ServiceResolver};

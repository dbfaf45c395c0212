//! The resolver seam between the broker and the catalog.

use std::sync::Arc;

use crate::entry::Entry;

/// Completion handler for a resolution.
pub type ResolveCallback = Box<dyn FnOnce(Arc<Entry>) + Send + 'static>;

/// Resolves service names to catalog entries.
///
/// Resolution always completes exactly once. Callbacks for the same name
/// complete in submission order.
pub trait ServiceResolver: Send + Sync {
    /// Resolve `name` and hand the entry to `callback`.
    fn resolve(&self, name: &str, callback: ResolveCallback);
}

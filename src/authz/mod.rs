pub mod bindings;
pub mod catalog;
pub mod engine;
pub mod errors;
pub mod identity;
pub mod loader;
pub mod policy;
pub mod types;
pub mod watcher;
pub mod web;

use bindings::BindingCatalog;
use catalog::PolicyCatalog;
use chrono::{DateTime, Utc};
use identity::IdentityMap;
use types::BuildWarning;

/// One consistent version of the authorization data.
/// Immutable once built; a reload builds a new snapshot and swaps it in.
#[derive(Debug)]
pub struct Snapshot {
    /// Assigned when the snapshot is published; 0 until then
    pub generation: u64,
    pub loaded_at: DateTime<Utc>,
    pub identities: IdentityMap,
    pub bindings: BindingCatalog,
    pub catalog: PolicyCatalog,
    /// Non-fatal findings from the build (dangling role references etc.)
    pub warnings: Vec<BuildWarning>,
}

impl Snapshot {
    pub fn empty() -> Self {
        Self {
            generation: 0,
            loaded_at: Utc::now(),
            identities: IdentityMap::default(),
            bindings: BindingCatalog::default(),
            catalog: PolicyCatalog::default(),
            warnings: Vec::new(),
        }
    }
}

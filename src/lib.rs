//! Gatekeep - identity-to-permission resolution engine
//!
//! Maps externally authenticated principals to internal identities, resolves
//! their role bindings and evaluates (verb, resource, api group) requests
//! against hot-reloadable policy snapshots.

pub mod authz;
pub mod settings;

use std::collections::BTreeSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use arc_swap::ArcSwapOption;

use crate::authz::errors::AuthzError;
use crate::authz::types::{Decision, DenyReason, Identity, Principal};
use crate::authz::Snapshot;

/// Check whether `principal` may perform `verb` on `resource` in `api_group`
/// according to `snapshot`.
///
/// Rules are a flat OR of ANDs: the first rule whose three dimensions all
/// match allows the request. There are no deny rules.
pub fn authorize(
    snapshot: &Snapshot,
    principal: &Principal,
    verb: &str,
    resource: &str,
    api_group: &str,
) -> Decision {
    // 1. Map the principal to an internal identity
    let Some(identity) = snapshot.identities.resolve(principal) else {
        tracing::debug!(%principal, verb, resource, api_group, "denied: unrecognized principal");
        return Decision::Deny(DenyReason::UnrecognizedPrincipal);
    };

    // 2. Collect bound roles; an empty set still goes through evaluation
    let roles = snapshot
        .bindings
        .roles_for(&identity.username, &identity.groups);

    // 3 + 4. First matching rule wins
    for (role, rule) in snapshot.catalog.rules_for(&roles) {
        if rule.matches(verb, resource, api_group) {
            tracing::debug!(
                %principal,
                username = %identity.username,
                role,
                verb,
                resource,
                api_group,
                "allowed"
            );
            return Decision::Allow {
                role: role.to_string(),
            };
        }
    }

    // 5. Nothing matched
    let reason = if roles.is_empty() {
        DenyReason::NoRolesBound
    } else {
        DenyReason::NoMatchingRule
    };
    tracing::debug!(
        %principal,
        username = %identity.username,
        verb,
        resource,
        api_group,
        %reason,
        "denied"
    );
    Decision::Deny(reason)
}

/// Identity and bound roles of a principal, resolved exactly as `authorize` does.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WhoIs {
    pub identity: Identity,
    pub roles: BTreeSet<String>,
}

pub fn who_is(snapshot: &Snapshot, principal: &Principal) -> Option<WhoIs> {
    let identity = snapshot.identities.resolve(principal)?;
    let roles = snapshot
        .bindings
        .roles_for(&identity.username, &identity.groups);
    Some(WhoIs { identity, roles })
}

/// Holds the current snapshot and answers queries against it.
///
/// Readers pin the snapshot with a single atomic load and keep it for the
/// whole query; `publish` swaps the pointer without touching the old value,
/// which is dropped when its last reader finishes.
#[derive(Debug, Default)]
pub struct Resolver {
    current: ArcSwapOption<Snapshot>,
    generation: AtomicU64,
    /// Held across generation assignment and store so publishers cannot
    /// interleave and leave an older snapshot current.
    publish_lock: Mutex<()>,
}

impl Resolver {
    /// A resolver with no snapshot; queries fail with `ResolutionUnavailable`
    /// until the first `publish`.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_snapshot(snapshot: Snapshot) -> Self {
        let resolver = Self::new();
        resolver.publish(snapshot);
        resolver
    }

    /// Make `snapshot` the current one. Returns the published snapshot with
    /// its generation assigned.
    pub fn publish(&self, mut snapshot: Snapshot) -> Arc<Snapshot> {
        let _guard = self
            .publish_lock
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        snapshot.generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let snapshot = Arc::new(snapshot);
        self.current.store(Some(snapshot.clone()));
        tracing::info!(generation = snapshot.generation, "Published authorization snapshot");
        snapshot
    }

    /// Pin the current snapshot.
    pub fn snapshot(&self) -> Result<Arc<Snapshot>, AuthzError> {
        self.current.load_full().ok_or(AuthzError::ResolutionUnavailable)
    }

    pub fn authorize(
        &self,
        principal: &Principal,
        verb: &str,
        resource: &str,
        api_group: &str,
    ) -> Result<Decision, AuthzError> {
        let snapshot = self.snapshot()?;
        Ok(authorize(&snapshot, principal, verb, resource, api_group))
    }

    pub fn who_is(&self, principal: &Principal) -> Result<Option<WhoIs>, AuthzError> {
        let snapshot = self.snapshot()?;
        Ok(who_is(&snapshot, principal))
    }
}

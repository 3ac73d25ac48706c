use std::path::Path;

use chrono::Utc;

use crate::authz::bindings::BindingCatalog;
use crate::authz::catalog::PolicyCatalog;
use crate::authz::errors::AuthzError;
use crate::authz::identity::IdentityMap;
use crate::authz::policy::parse_kdl_document;
use crate::authz::types::*;
use crate::authz::Snapshot;

/// Load all `.kdl` policy files from the given directory and compile them
/// into a single immutable `Snapshot`.
pub fn load_snapshot(dir: &Path) -> Result<Snapshot, AuthzError> {
    if !dir.is_dir() {
        return Err(AuthzError::InvalidDocument(format!(
            "policies directory `{}` does not exist or is not a directory",
            dir.display()
        )));
    }

    let mut all_parsed = Vec::new();

    // An unreadable entry fails the build rather than silently dropping a file
    let mut paths = std::fs::read_dir(dir)?
        .map(|entry| entry.map(|e| e.path()))
        .collect::<Result<Vec<_>, _>>()?;
    paths.retain(|path| is_policy_file(path));
    paths.sort();

    for path in paths {
        let contents =
            std::fs::read_to_string(&path).map_err(|source| AuthzError::PolicyLoadError {
                path: path.display().to_string(),
                source,
            })?;
        let parsed = parse_kdl_document(&contents).map_err(|e| match e {
            AuthzError::KdlParse(msg) => AuthzError::KdlParse(format!("{}: {msg}", path.display())),
            other => other,
        })?;
        all_parsed.push(parsed);
    }
    let file_count = all_parsed.len();

    let snapshot = compile_snapshot(all_parsed)?;

    tracing::info!(
        files = file_count,
        identities = snapshot.identities.len(),
        bindings = snapshot.bindings.len(),
        roles = snapshot.catalog.len(),
        rules = snapshot.catalog.rule_count(),
        warnings = snapshot.warnings.len(),
        "Loaded authorization snapshot"
    );

    Ok(snapshot)
}

pub fn is_policy_file(path: &Path) -> bool {
    path.extension().map(|ext| ext == "kdl").unwrap_or(false)
}

/// Merge and compile parsed documents into a `Snapshot`. Either every
/// document is valid and a complete snapshot is returned, or nothing is.
pub fn compile_snapshot(parsed: Vec<ParsedPolicy>) -> Result<Snapshot, AuthzError> {
    let mut identity = IdentityDocument::default();
    let mut bindings: Vec<BindingEntry> = Vec::new();
    let mut roles: Vec<RoleDocument> = Vec::new();

    // Merge in file order; identity entry order matters for templated roles
    for p in parsed {
        identity.users.extend(p.identity.users);
        identity.roles.extend(p.identity.roles);
        bindings.extend(p.bindings);
        roles.extend(p.roles);
    }

    let mut warnings = Vec::new();

    let catalog = PolicyCatalog::from_documents(&roles)?;
    let identities = IdentityMap::from_document(&identity)?;

    for binding in &bindings {
        if !catalog.contains(&binding.role) {
            tracing::warn!(
                subject = %binding.subject,
                role = %binding.role,
                "binding references undefined role"
            );
            let warning = BuildWarning::DanglingRoleReference {
                subject: binding.subject.clone(),
                role: binding.role.clone(),
            };
            if !warnings.contains(&warning) {
                warnings.push(warning);
            }
        }
    }
    let bindings = BindingCatalog::from_entries(&bindings);

    Ok(Snapshot {
        generation: 0,
        loaded_at: Utc::now(),
        identities,
        bindings,
        catalog,
        warnings,
    })
}

use std::collections::{BTreeSet, HashMap};

use crate::authz::errors::AuthzError;
use crate::authz::types::{RoleDocument, Rule, RuleSet};

/// Role name → rules.
#[derive(Debug, Clone, Default)]
pub struct PolicyCatalog {
    roles: HashMap<String, RuleSet>,
}

impl PolicyCatalog {
    pub fn from_documents<'a>(
        docs: impl IntoIterator<Item = &'a RoleDocument>,
    ) -> Result<Self, AuthzError> {
        let mut roles = HashMap::new();
        for doc in docs {
            if doc.name.is_empty() {
                return Err(AuthzError::InvalidDocument("role name must not be empty".into()));
            }
            let rules = doc
                .rules
                .iter()
                .map(|r| Rule::new(&r.api_groups, &r.resources, &r.verbs))
                .collect::<Result<Vec<_>, _>>()
                .map_err(|e| match e {
                    AuthzError::InvalidRule(msg) => {
                        AuthzError::InvalidRule(format!("role `{}`: {msg}", doc.name))
                    }
                    other => other,
                })?;
            if roles.insert(doc.name.clone(), RuleSet::new(rules)).is_some() {
                return Err(AuthzError::DuplicateRole(doc.name.clone()));
            }
        }
        Ok(Self { roles })
    }

    pub fn get(&self, role: &str) -> Option<&RuleSet> {
        self.roles.get(role)
    }

    pub fn contains(&self, role: &str) -> bool {
        self.roles.contains_key(role)
    }

    /// Rules of every named role, tagged with the role granting them. Unknown
    /// role names contribute nothing.
    pub fn rules_for(&self, role_names: &BTreeSet<String>) -> Vec<(&str, &Rule)> {
        role_names
            .iter()
            .filter_map(|name| self.roles.get_key_value(name))
            .map(|(name, set)| (name.as_str(), set))
            .flat_map(|(name, set)| set.iter().map(move |rule| (name, rule)))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.roles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.roles.is_empty()
    }

    pub fn rule_count(&self) -> usize {
        self.roles.values().map(RuleSet::len).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::authz::types::RuleEntry;

    fn rule(groups: &[&str], resources: &[&str], verbs: &[&str]) -> RuleEntry {
        let owned = |v: &[&str]| v.iter().map(|s| s.to_string()).collect();
        RuleEntry {
            api_groups: owned(groups),
            resources: owned(resources),
            verbs: owned(verbs),
        }
    }

    fn names(values: &[&str]) -> BTreeSet<String> {
        values.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_rules_for_concatenates_and_skips_unknown() {
        let docs = vec![
            RoleDocument {
                name: "viewer".into(),
                rules: vec![rule(&[""], &["pods"], &["get", "list"])],
            },
            RoleDocument {
                name: "deployer".into(),
                rules: vec![
                    rule(&["apps"], &["deployments"], &["*"]),
                    rule(&[""], &["configmaps"], &["get"]),
                ],
            },
        ];
        let catalog = PolicyCatalog::from_documents(&docs).unwrap();
        let rules = catalog.rules_for(&names(&["viewer", "deployer", "ghost-role"]));
        assert_eq!(rules.len(), 3);
        assert!(rules.iter().all(|(role, _)| *role != "ghost-role"));
        assert_eq!(catalog.rule_count(), 3);
    }

    #[test]
    fn test_get_role_rules() {
        let docs = vec![RoleDocument {
            name: "deployer".into(),
            rules: vec![
                rule(&["apps"], &["deployments"], &["*"]),
                rule(&[""], &["configmaps"], &["get"]),
            ],
        }];
        let catalog = PolicyCatalog::from_documents(&docs).unwrap();
        let rules = catalog.get("deployer").unwrap();
        assert_eq!(rules.len(), 2);
        assert!(rules.allows("patch", "deployments", "apps"));
        assert!(rules.allows("get", "configmaps", ""));
        assert!(!rules.allows("delete", "configmaps", ""));
        assert!(!rules.allows("get", "deployments", ""));
        assert!(catalog.get("viewer").is_none());
    }

    #[test]
    fn test_duplicate_role_rejected() {
        let docs = vec![
            RoleDocument {
                name: "viewer".into(),
                rules: vec![],
            },
            RoleDocument {
                name: "viewer".into(),
                rules: vec![],
            },
        ];
        let err = PolicyCatalog::from_documents(&docs).unwrap_err();
        assert!(matches!(err, AuthzError::DuplicateRole(name) if name == "viewer"));
    }

    #[test]
    fn test_invalid_rule_names_role() {
        let docs = vec![RoleDocument {
            name: "broken".into(),
            rules: vec![rule(&[""], &["secrets*"], &["get"])],
        }];
        let err = PolicyCatalog::from_documents(&docs).unwrap_err();
        match err {
            AuthzError::InvalidRule(msg) => assert!(msg.contains("broken")),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_role_without_rules_grants_nothing() {
        let docs = vec![RoleDocument {
            name: "empty".into(),
            rules: vec![],
        }];
        let catalog = PolicyCatalog::from_documents(&docs).unwrap();
        assert!(catalog.contains("empty"));
        assert!(catalog.rules_for(&names(&["empty"])).is_empty());
    }
}

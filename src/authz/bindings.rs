use std::collections::{BTreeSet, HashMap};

use crate::authz::types::{BindingEntry, SubjectKind};

/// Subject → role names, indexed per subject kind so lookups never scan.
#[derive(Debug, Clone, Default)]
pub struct BindingCatalog {
    users: HashMap<String, BTreeSet<String>>,
    groups: HashMap<String, BTreeSet<String>>,
    bindings: usize,
}

impl BindingCatalog {
    pub fn from_entries<'a>(entries: impl IntoIterator<Item = &'a BindingEntry>) -> Self {
        let mut catalog = Self::default();
        for entry in entries {
            let index = match entry.subject.kind {
                SubjectKind::User => &mut catalog.users,
                SubjectKind::Group => &mut catalog.groups,
            };
            if index
                .entry(entry.subject.name.clone())
                .or_default()
                .insert(entry.role.clone())
            {
                catalog.bindings += 1;
            }
        }
        catalog
    }

    /// Union of the roles bound to `username` and to any of `groups`.
    pub fn roles_for(&self, username: &str, groups: &BTreeSet<String>) -> BTreeSet<String> {
        let mut roles = BTreeSet::new();
        if let Some(bound) = self.users.get(username) {
            roles.extend(bound.iter().cloned());
        }
        for group in groups {
            if let Some(bound) = self.groups.get(group) {
                roles.extend(bound.iter().cloned());
            }
        }
        roles
    }

    /// Number of distinct (subject, role) bindings.
    pub fn len(&self) -> usize {
        self.bindings
    }

    pub fn is_empty(&self) -> bool {
        self.bindings == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::authz::types::Subject;

    fn bind(kind: SubjectKind, name: &str, role: &str) -> BindingEntry {
        BindingEntry {
            subject: Subject {
                kind,
                name: name.into(),
            },
            role: role.into(),
        }
    }

    fn groups(names: &[&str]) -> BTreeSet<String> {
        names.iter().map(|n| n.to_string()).collect()
    }

    #[test]
    fn test_roles_for_unions_user_and_groups() {
        let entries = vec![
            bind(SubjectKind::User, "alice", "editor"),
            bind(SubjectKind::Group, "readers", "viewer"),
            bind(SubjectKind::Group, "ops", "operator"),
            bind(SubjectKind::Group, "readers", "editor"),
        ];
        let catalog = BindingCatalog::from_entries(&entries);
        let roles = catalog.roles_for("alice", &groups(&["readers"]));
        assert_eq!(roles, groups(&["editor", "viewer"]));
    }

    #[test]
    fn test_user_and_group_names_do_not_collide() {
        let entries = vec![bind(SubjectKind::Group, "alice", "group-role")];
        let catalog = BindingCatalog::from_entries(&entries);
        assert!(catalog.roles_for("alice", &BTreeSet::new()).is_empty());
        assert_eq!(
            catalog.roles_for("bob", &groups(&["alice"])),
            groups(&["group-role"])
        );
    }

    #[test]
    fn test_no_bindings_is_empty_not_error() {
        let catalog = BindingCatalog::default();
        assert!(catalog.roles_for("nobody", &groups(&["none"])).is_empty());
        assert!(catalog.is_empty());
    }

    #[test]
    fn test_duplicate_bindings_counted_once() {
        let entries = vec![
            bind(SubjectKind::User, "alice", "editor"),
            bind(SubjectKind::User, "alice", "editor"),
        ];
        assert_eq!(BindingCatalog::from_entries(&entries).len(), 1);
    }
}

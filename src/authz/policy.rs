use crate::authz::errors::AuthzError;
use crate::authz::types::*;
use kdl::KdlDocument;

/// Parse a KDL document string into typed policy documents.
///
/// ```kdl
/// identity {
///     user "acct/alice" username="alice" {
///         groups {
///             - "readers"
///         }
///     }
///     role "acct/role/node/*" username="system:node:{{InstanceName}}" {
///         groups {
///             - "system:nodes"
///         }
///     }
/// }
///
/// binding "Group" "readers" role="trainee-role"
///
/// role "trainee-role" {
///     rule {
///         api-groups {
///             - ""
///         }
///         resources {
///             - "pods"
///         }
///         verbs {
///             - "get"
///             - "list"
///         }
///     }
/// }
/// ```
pub fn parse_kdl_document(source: &str) -> Result<ParsedPolicy, AuthzError> {
    let doc: KdlDocument = source
        .parse()
        .map_err(|e: kdl::KdlError| AuthzError::KdlParse(e.to_string()))?;

    let mut policy = ParsedPolicy::default();

    for node in doc.nodes() {
        match node.name().value() {
            "identity" => {
                let Some(children) = node.children() else {
                    continue;
                };
                for child in children.nodes() {
                    match child.name().value() {
                        "user" => policy.identity.users.push(parse_user_entry(child)?),
                        "role" => policy.identity.roles.push(parse_role_entry(child)?),
                        other => {
                            return Err(AuthzError::InvalidDocument(format!(
                                "unexpected child `{other}` in identity (expected `user` or `role`)"
                            )));
                        }
                    }
                }
            }
            "binding" => {
                let args = string_args(node);
                let (kind, name) = match args.as_slice() {
                    [kind, name] => (kind, name),
                    _ => {
                        return Err(AuthzError::InvalidDocument(
                            "binding node requires a subject kind and name (e.g. binding \"Group\" \"readers\" role=\"viewer\")"
                                .into(),
                        ));
                    }
                };
                let kind = SubjectKind::parse(kind).ok_or_else(|| {
                    AuthzError::InvalidDocument(format!(
                        "unknown subject kind `{kind}` in binding for `{name}` (expected \"User\" or \"Group\")"
                    ))
                })?;
                let role = string_prop(node, "role").ok_or_else(|| {
                    AuthzError::InvalidDocument(format!(
                        "binding for {kind}/{name} missing `role` property"
                    ))
                })?;

                policy.bindings.push(BindingEntry {
                    subject: Subject {
                        kind,
                        name: name.clone(),
                    },
                    role,
                });
            }
            "role" => {
                let name = first_string_arg(node).ok_or_else(|| {
                    AuthzError::InvalidDocument(
                        "role node requires a string argument (e.g. role \"viewer\")".into(),
                    )
                })?;

                let mut rules = Vec::new();
                if let Some(children) = node.children() {
                    for child in children.nodes() {
                        match child.name().value() {
                            "rule" => rules.push(parse_rule(child, &name)?),
                            other => {
                                return Err(AuthzError::InvalidDocument(format!(
                                    "unexpected child `{other}` in role `{name}` (expected `rule`)"
                                )));
                            }
                        }
                    }
                }

                policy.roles.push(RoleDocument { name, rules });
            }
            other => {
                tracing::warn!("ignoring unknown top-level KDL node `{other}`");
            }
        }
    }

    Ok(policy)
}

fn parse_user_entry(node: &kdl::KdlNode) -> Result<UserEntry, AuthzError> {
    let principal = first_string_arg(node).ok_or_else(|| {
        AuthzError::InvalidDocument(
            "user entry requires a principal argument (e.g. user \"acct/alice\" username=\"alice\")"
                .into(),
        )
    })?;
    let username = string_prop(node, "username").ok_or_else(|| {
        AuthzError::InvalidDocument(format!("user entry `{principal}` missing `username` property"))
    })?;
    Ok(UserEntry {
        groups: groups_of(node, &principal)?,
        principal,
        username,
    })
}

fn parse_role_entry(node: &kdl::KdlNode) -> Result<RoleEntry, AuthzError> {
    let pattern = first_string_arg(node).ok_or_else(|| {
        AuthzError::InvalidDocument(
            "role entry requires a pattern argument (e.g. role \"acct/role/node/*\" username=\"...\")"
                .into(),
        )
    })?;
    let username_template = string_prop(node, "username").ok_or_else(|| {
        AuthzError::InvalidDocument(format!("role entry `{pattern}` missing `username` property"))
    })?;
    Ok(RoleEntry {
        groups: groups_of(node, &pattern)?,
        pattern,
        username_template,
    })
}

fn groups_of(node: &kdl::KdlNode, owner: &str) -> Result<Vec<String>, AuthzError> {
    let mut groups = Vec::new();
    if let Some(children) = node.children() {
        for child in children.nodes() {
            match child.name().value() {
                "groups" => groups = dash_list(child),
                other => {
                    return Err(AuthzError::InvalidDocument(format!(
                        "unexpected child `{other}` in identity entry `{owner}` (expected `groups`)"
                    )));
                }
            }
        }
    }
    Ok(groups)
}

fn parse_rule(node: &kdl::KdlNode, role: &str) -> Result<RuleEntry, AuthzError> {
    let mut rule = RuleEntry::default();
    if let Some(children) = node.children() {
        for child in children.nodes() {
            match child.name().value() {
                "api-groups" => rule.api_groups = dash_list(child),
                "resources" => rule.resources = dash_list(child),
                "verbs" => rule.verbs = dash_list(child),
                other => {
                    return Err(AuthzError::InvalidDocument(format!(
                        "unexpected child `{other}` in rule of role `{role}` (expected `api-groups`, `resources` or `verbs`)"
                    )));
                }
            }
        }
    }
    Ok(rule)
}

/// Extract the first string argument from a KDL node.
fn first_string_arg(node: &kdl::KdlNode) -> Option<String> {
    string_args(node).into_iter().next()
}

/// All positional string arguments of a KDL node, in order.
fn string_args(node: &kdl::KdlNode) -> Vec<String> {
    node.entries()
        .iter()
        .filter(|e| e.name().is_none())
        .filter_map(|e| e.value().as_string())
        .map(|s| s.to_string())
        .collect()
}

fn string_prop(node: &kdl::KdlNode, key: &str) -> Option<String> {
    node.get(key)
        .and_then(|v| v.as_string())
        .map(|s| s.to_string())
}

/// Extract dash-list children: nodes named "-" whose first argument is a string.
fn dash_list(node: &kdl::KdlNode) -> Vec<String> {
    let Some(children) = node.children() else {
        return Vec::new();
    };
    children
        .nodes()
        .iter()
        .filter(|n| n.name().value() == "-")
        .filter_map(first_string_arg)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_identity_entries() {
        let kdl = r#"
identity {
    user "acct/alice" username="alice" {
        groups {
            - "readers"
            - "devs"
        }
    }
    role "acct/role/node/*" username="system:node:{{InstanceName}}" {
        groups {
            - "system:nodes"
        }
    }
}
"#;
        let policy = parse_kdl_document(kdl).unwrap();
        assert_eq!(policy.identity.users.len(), 1);
        let alice = &policy.identity.users[0];
        assert_eq!(alice.principal, "acct/alice");
        assert_eq!(alice.username, "alice");
        assert_eq!(alice.groups, vec!["readers", "devs"]);

        let node = &policy.identity.roles[0];
        assert_eq!(node.pattern, "acct/role/node/*");
        assert_eq!(node.username_template, "system:node:{{InstanceName}}");
        assert_eq!(node.groups, vec!["system:nodes"]);
    }

    #[test]
    fn test_parse_binding() {
        let kdl = r#"
binding "Group" "readers" role="trainee-role"
binding "User" "alice" role="admin"
"#;
        let policy = parse_kdl_document(kdl).unwrap();
        assert_eq!(policy.bindings.len(), 2);
        assert_eq!(policy.bindings[0].subject.kind, SubjectKind::Group);
        assert_eq!(policy.bindings[0].subject.name, "readers");
        assert_eq!(policy.bindings[0].role, "trainee-role");
        assert_eq!(policy.bindings[1].subject.kind, SubjectKind::User);
    }

    #[test]
    fn test_parse_role_rules() {
        let kdl = r#"
role "trainee-role" {
    rule {
        api-groups {
            - ""
        }
        resources {
            - "pods"
        }
        verbs {
            - "get"
            - "list"
        }
    }
    rule {
        api-groups {
            - "apps"
        }
        resources {
            - "*"
        }
        verbs {
            - "get"
        }
    }
}
"#;
        let policy = parse_kdl_document(kdl).unwrap();
        assert_eq!(policy.roles.len(), 1);
        let role = &policy.roles[0];
        assert_eq!(role.name, "trainee-role");
        assert_eq!(role.rules.len(), 2);
        assert_eq!(role.rules[0].api_groups, vec![""]);
        assert_eq!(role.rules[0].verbs, vec!["get", "list"]);
        assert_eq!(role.rules[1].resources, vec!["*"]);
    }

    #[test]
    fn test_parse_binding_unknown_kind() {
        let kdl = r#"binding "ServiceAccount" "ci" role="deployer""#;
        let err = parse_kdl_document(kdl).unwrap_err();
        assert!(matches!(err, AuthzError::InvalidDocument(_)));
    }

    #[test]
    fn test_parse_binding_missing_role() {
        let kdl = r#"binding "User" "alice""#;
        let err = parse_kdl_document(kdl).unwrap_err();
        assert!(matches!(err, AuthzError::InvalidDocument(_)));
    }

    #[test]
    fn test_parse_user_missing_username() {
        let kdl = r#"
identity {
    user "acct/alice"
}
"#;
        let err = parse_kdl_document(kdl).unwrap_err();
        assert!(matches!(err, AuthzError::InvalidDocument(_)));
    }

    #[test]
    fn test_parse_unexpected_rule_child() {
        let kdl = r#"
role "viewer" {
    rule {
        namespaces {
            - "default"
        }
    }
}
"#;
        let err = parse_kdl_document(kdl).unwrap_err();
        assert!(matches!(err, AuthzError::InvalidDocument(_)));
    }

    #[test]
    fn test_parse_invalid_kdl() {
        let err = parse_kdl_document("role \"viewer\" {").unwrap_err();
        assert!(matches!(err, AuthzError::KdlParse(_)));
    }

    #[test]
    fn test_unknown_top_level_node_ignored() {
        let policy = parse_kdl_document(r#"resource "vm""#).unwrap();
        assert!(policy.roles.is_empty());
        assert!(policy.bindings.is_empty());
    }
}

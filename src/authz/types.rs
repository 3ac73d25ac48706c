use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use crate::authz::errors::AuthzError;

/// Literal wildcard accepted in any rule dimension.
pub const WILDCARD: &str = "*";

/// An externally authenticated principal, e.g. "acct/alice", plus the optional
/// companion value (e.g. an instance name) asserted alongside it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Principal {
    pub id: String,
    pub instance: Option<String>,
}

impl Principal {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            instance: None,
        }
    }

    pub fn with_instance(mut self, instance: impl Into<String>) -> Self {
        self.instance = Some(instance.into());
        self
    }
}

impl std::fmt::Display for Principal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.instance {
            Some(instance) => write!(f, "{} ({})", self.id, instance),
            None => write!(f, "{}", self.id),
        }
    }
}

/// Internal identity a principal maps to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Identity {
    pub username: String,
    pub groups: BTreeSet<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum SubjectKind {
    User,
    Group,
}

impl SubjectKind {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "User" | "user" => Some(Self::User),
            "Group" | "group" => Some(Self::Group),
            _ => None,
        }
    }
}

impl std::fmt::Display for SubjectKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SubjectKind::User => f.write_str("User"),
            SubjectKind::Group => f.write_str("Group"),
        }
    }
}

/// The user or group a binding grants a role to.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct Subject {
    pub kind: SubjectKind,
    pub name: String,
}

impl std::fmt::Display for Subject {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.kind, self.name)
    }
}

// ---------- Rules ----------

/// One dimension (api groups, resources or verbs) of a rule.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Dimension {
    Any,
    Only(BTreeSet<String>),
}

impl Dimension {
    /// Build a dimension from raw document values. `"*"` absorbs every other
    /// value; partial wildcards such as `"pod*"` are rejected.
    pub fn from_values(dimension: &str, values: &[String]) -> Result<Self, AuthzError> {
        if values.is_empty() {
            return Err(AuthzError::InvalidRule(format!(
                "`{dimension}` must list at least one value (use \"*\" to match anything)"
            )));
        }
        let mut literals = BTreeSet::new();
        let mut any = false;
        for value in values {
            if value == WILDCARD {
                any = true;
            } else if value.contains('*') {
                return Err(AuthzError::InvalidRule(format!(
                    "malformed wildcard `{value}` in `{dimension}` (only a bare \"*\" is supported)"
                )));
            } else {
                literals.insert(value.clone());
            }
        }
        Ok(if any { Self::Any } else { Self::Only(literals) })
    }

    pub fn matches(&self, value: &str) -> bool {
        match self {
            Dimension::Any => true,
            Dimension::Only(values) => values.contains(value),
        }
    }

    /// Whether every value this dimension matches is also matched by `other`.
    pub fn is_covered_by(&self, other: &Dimension) -> bool {
        match (self, other) {
            (_, Dimension::Any) => true,
            (Dimension::Any, Dimension::Only(_)) => false,
            (Dimension::Only(mine), Dimension::Only(theirs)) => mine.is_subset(theirs),
        }
    }
}

impl Serialize for Dimension {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Dimension::Any => [WILDCARD].serialize(serializer),
            Dimension::Only(values) => values.serialize(serializer),
        }
    }
}

/// A single (apiGroups, resources, verbs) matcher.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct Rule {
    pub api_groups: Dimension,
    pub resources: Dimension,
    pub verbs: Dimension,
}

impl Rule {
    pub fn new(
        api_groups: &[String],
        resources: &[String],
        verbs: &[String],
    ) -> Result<Self, AuthzError> {
        Ok(Self {
            api_groups: Dimension::from_values("api-groups", api_groups)?,
            resources: Dimension::from_values("resources", resources)?,
            verbs: Dimension::from_values("verbs", verbs)?,
        })
    }

    pub fn matches(&self, verb: &str, resource: &str, api_group: &str) -> bool {
        self.api_groups.matches(api_group)
            && self.resources.matches(resource)
            && self.verbs.matches(verb)
    }

    /// Whether this rule grants nothing beyond what `other` already grants.
    pub fn is_covered_by(&self, other: &Rule) -> bool {
        self.api_groups.is_covered_by(&other.api_groups)
            && self.resources.is_covered_by(&other.resources)
            && self.verbs.is_covered_by(&other.verbs)
    }
}

/// Immutable, canonically ordered set of rules. Two rule sets built from the
/// same rules in any order compare equal.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize)]
pub struct RuleSet(Vec<Rule>);

impl RuleSet {
    pub fn new(rules: impl IntoIterator<Item = Rule>) -> Self {
        let mut rules: Vec<Rule> = rules.into_iter().collect();
        rules.sort();
        rules.dedup();
        Self(rules)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Rule> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn allows(&self, verb: &str, resource: &str, api_group: &str) -> bool {
        self.0.iter().any(|r| r.matches(verb, resource, api_group))
    }

    /// Every rule in `self` is covered by some single rule in `other`.
    pub fn is_subset(&self, other: &RuleSet) -> bool {
        self.0
            .iter()
            .all(|mine| other.0.iter().any(|theirs| mine.is_covered_by(theirs)))
    }
}

impl<'a> IntoIterator for &'a RuleSet {
    type Item = &'a Rule;
    type IntoIter = std::slice::Iter<'a, Rule>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

// ---------- Decisions ----------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DenyReason {
    UnrecognizedPrincipal,
    NoRolesBound,
    NoMatchingRule,
}

impl std::fmt::Display for DenyReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DenyReason::UnrecognizedPrincipal => f.write_str("unrecognized principal"),
            DenyReason::NoRolesBound => f.write_str("no roles bound to identity"),
            DenyReason::NoMatchingRule => f.write_str("no rule matched the request"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    /// Granted by the first matching rule of `role`.
    Allow { role: String },
    Deny(DenyReason),
}

impl Decision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Decision::Allow { .. })
    }

    pub fn reason(&self) -> String {
        match self {
            Decision::Allow { role } => format!("allowed by role `{role}`"),
            Decision::Deny(reason) => reason.to_string(),
        }
    }
}

// ---------- Build diagnostics ----------

/// Non-fatal problems found while building a snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum BuildWarning {
    /// A binding names a role that no policy document defines.
    DanglingRoleReference { subject: Subject, role: String },
}

impl std::fmt::Display for BuildWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BuildWarning::DanglingRoleReference { subject, role } => {
                write!(f, "binding for {subject} references undefined role `{role}`")
            }
        }
    }
}

// ---------- API request/response types ----------

#[derive(Debug, Deserialize)]
pub struct AuthorizeRequest {
    /// e.g. "acct/alice"
    pub principal: String,
    /// Companion templating value asserted by the credential system
    #[serde(default)]
    pub instance: Option<String>,
    pub verb: String,
    pub resource: String,
    /// "" is the core group
    #[serde(default)]
    pub api_group: String,
}

#[derive(Debug, Serialize)]
pub struct AuthorizeResponse {
    pub allowed: bool,
    pub reason: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    pub generation: u64,
}

#[derive(Debug, Deserialize)]
pub struct WhoIsRequest {
    pub principal: String,
    #[serde(default)]
    pub instance: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct WhoIsResponse {
    pub found: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    pub groups: BTreeSet<String>,
    pub roles: BTreeSet<String>,
    pub generation: u64,
}

// ---------- Document types ----------

/// `user` entry of an identity document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserEntry {
    pub principal: String,
    pub username: String,
    pub groups: Vec<String>,
}

/// `role` entry of an identity document; `pattern` may carry a `*`
/// placeholder and `username_template` may carry `{{...}}` placeholders.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoleEntry {
    pub pattern: String,
    pub username_template: String,
    pub groups: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IdentityDocument {
    pub users: Vec<UserEntry>,
    pub roles: Vec<RoleEntry>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BindingEntry {
    pub subject: Subject,
    pub role: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RuleEntry {
    pub api_groups: Vec<String>,
    pub resources: Vec<String>,
    pub verbs: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoleDocument {
    pub name: String,
    pub rules: Vec<RuleEntry>,
}

/// Intermediate result from parsing a single KDL file.
#[derive(Debug, Clone, Default)]
pub struct ParsedPolicy {
    pub identity: IdentityDocument,
    pub bindings: Vec<BindingEntry>,
    pub roles: Vec<RoleDocument>,
}

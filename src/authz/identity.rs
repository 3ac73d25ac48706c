use std::collections::{BTreeSet, HashMap};

use crate::authz::errors::AuthzError;
use crate::authz::types::{Identity, IdentityDocument, Principal, RoleEntry};

/// Principal pattern of a role mapping entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PrincipalPattern {
    Exact(String),
    /// `prefix*suffix`; the placeholder matches one non-empty path segment.
    Templated { prefix: String, suffix: String },
}

impl PrincipalPattern {
    pub fn parse(raw: &str) -> Result<Self, AuthzError> {
        if raw.is_empty() {
            return Err(AuthzError::InvalidIdentityMapping(
                "principal pattern must not be empty".into(),
            ));
        }
        match raw.matches('*').count() {
            0 => Ok(Self::Exact(raw.to_string())),
            1 => {
                let (prefix, suffix) = raw.split_once('*').unwrap_or((raw, ""));
                if prefix.is_empty() && suffix.is_empty() {
                    return Err(AuthzError::InvalidIdentityMapping(
                        "pattern `*` would match every principal".into(),
                    ));
                }
                Ok(Self::Templated {
                    prefix: prefix.to_string(),
                    suffix: suffix.to_string(),
                })
            }
            _ => Err(AuthzError::InvalidIdentityMapping(format!(
                "pattern `{raw}` has more than one `*` placeholder"
            ))),
        }
    }

    /// Returns the text matched by the placeholder, or `""` for exact patterns.
    pub fn capture<'p>(&self, principal: &'p str) -> Option<&'p str> {
        match self {
            PrincipalPattern::Exact(exact) => (exact == principal).then_some(""),
            PrincipalPattern::Templated { prefix, suffix } => {
                let captured = principal.strip_prefix(prefix.as_str())?;
                let captured = captured.strip_suffix(suffix.as_str())?;
                if captured.is_empty() || captured.contains('/') {
                    return None;
                }
                Some(captured)
            }
        }
    }

    pub fn is_templated(&self) -> bool {
        matches!(self, PrincipalPattern::Templated { .. })
    }
}

impl std::fmt::Display for PrincipalPattern {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PrincipalPattern::Exact(exact) => f.write_str(exact),
            PrincipalPattern::Templated { prefix, suffix } => write!(f, "{prefix}*{suffix}"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Placeholder {
    /// Companion value asserted with the principal.
    InstanceName,
    /// Text matched by the pattern's `*`.
    SessionName,
    /// First `/` segment of the principal.
    AccountId,
}

impl Placeholder {
    fn parse(name: &str) -> Option<Self> {
        match name.trim() {
            "InstanceName" => Some(Self::InstanceName),
            "SessionName" => Some(Self::SessionName),
            "AccountID" => Some(Self::AccountId),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Placeholder(Placeholder),
}

/// Values available when rendering a template for one request.
#[derive(Debug, Clone, Copy)]
pub struct TemplateContext<'a> {
    pub principal: &'a str,
    pub instance: Option<&'a str>,
    pub session: Option<&'a str>,
}

/// A username or group name with `{{...}}` placeholders, parsed at build time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UsernameTemplate {
    raw: String,
    segments: Vec<Segment>,
}

impl UsernameTemplate {
    /// Parse `raw`. `SessionName` is only accepted when the owning pattern is
    /// templated.
    pub fn parse(raw: &str, pattern: &PrincipalPattern) -> Result<Self, AuthzError> {
        if raw.is_empty() {
            return Err(AuthzError::InvalidIdentityMapping(format!(
                "empty username template for `{pattern}`"
            )));
        }
        let mut segments = Vec::new();
        let mut rest = raw;
        while let Some(start) = rest.find("{{") {
            if start > 0 {
                segments.push(Segment::Literal(rest[..start].to_string()));
            }
            let after = &rest[start + 2..];
            let end = after.find("}}").ok_or_else(|| {
                AuthzError::InvalidIdentityMapping(format!("unclosed placeholder in `{raw}`"))
            })?;
            let name = &after[..end];
            let placeholder = Placeholder::parse(name).ok_or_else(|| {
                AuthzError::InvalidIdentityMapping(format!(
                    "unknown placeholder `{{{{{name}}}}}` in `{raw}`"
                ))
            })?;
            if placeholder == Placeholder::SessionName && !pattern.is_templated() {
                return Err(AuthzError::InvalidIdentityMapping(format!(
                    "`{{{{SessionName}}}}` in `{raw}` requires a `*` in pattern `{pattern}`"
                )));
            }
            segments.push(Segment::Placeholder(placeholder));
            rest = &after[end + 2..];
        }
        if !rest.is_empty() {
            segments.push(Segment::Literal(rest.to_string()));
        }
        Ok(Self {
            raw: raw.to_string(),
            segments,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// Substitute placeholders; `None` if a required value is missing or empty.
    pub fn render(&self, ctx: &TemplateContext<'_>) -> Option<String> {
        let mut out = String::with_capacity(self.raw.len());
        for segment in &self.segments {
            match segment {
                Segment::Literal(text) => out.push_str(text),
                Segment::Placeholder(p) => {
                    let value = match p {
                        Placeholder::InstanceName => ctx.instance?,
                        Placeholder::SessionName => ctx.session?,
                        Placeholder::AccountId => ctx.principal.split('/').next()?,
                    };
                    if value.is_empty() {
                        return None;
                    }
                    out.push_str(value);
                }
            }
        }
        Some(out)
    }
}

#[derive(Debug, Clone)]
struct RoleMapping {
    pattern: PrincipalPattern,
    username: UsernameTemplate,
    groups: Vec<UsernameTemplate>,
}

impl RoleMapping {
    fn compile(entry: &RoleEntry) -> Result<Self, AuthzError> {
        let pattern = PrincipalPattern::parse(&entry.pattern)?;
        let username = UsernameTemplate::parse(&entry.username_template, &pattern)?;
        let groups = entry
            .groups
            .iter()
            .map(|g| UsernameTemplate::parse(g, &pattern))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self {
            pattern,
            username,
            groups,
        })
    }

    fn resolve(&self, principal: &Principal) -> Option<Identity> {
        let captured = self.pattern.capture(&principal.id)?;
        let ctx = TemplateContext {
            principal: &principal.id,
            instance: principal.instance.as_deref(),
            session: self.pattern.is_templated().then_some(captured),
        };
        let username = self.username.render(&ctx)?;
        let groups = self
            .groups
            .iter()
            .map(|g| g.render(&ctx))
            .collect::<Option<BTreeSet<_>>>()?;
        Some(Identity { username, groups })
    }
}

/// Maps external principals to internal identities.
///
/// Precedence: exact `user` entries, then exact `role` entries, then templated
/// `role` entries in document order.
#[derive(Debug, Clone, Default)]
pub struct IdentityMap {
    users: HashMap<String, Identity>,
    exact_roles: HashMap<String, RoleMapping>,
    templated_roles: Vec<RoleMapping>,
}

impl IdentityMap {
    /// Two exact entries for the same principal, whether `user` or `role`,
    /// reject the whole document.
    pub fn from_document(doc: &IdentityDocument) -> Result<Self, AuthzError> {
        let mut users = HashMap::new();
        for entry in &doc.users {
            if entry.principal.is_empty() || entry.username.is_empty() {
                return Err(AuthzError::InvalidIdentityMapping(format!(
                    "user entry `{}` needs a principal and a username",
                    entry.principal
                )));
            }
            if entry.principal.contains('*') {
                return Err(AuthzError::InvalidIdentityMapping(format!(
                    "user entry `{}` may not use a `*` pattern; use a `role` entry instead",
                    entry.principal
                )));
            }
            let identity = Identity {
                username: entry.username.clone(),
                groups: entry.groups.iter().cloned().collect(),
            };
            if users.insert(entry.principal.clone(), identity).is_some() {
                return Err(AuthzError::AmbiguousIdentity(entry.principal.clone()));
            }
        }

        let mut exact_roles = HashMap::new();
        let mut templated_roles = Vec::new();
        for entry in &doc.roles {
            let mapping = RoleMapping::compile(entry)?;
            match &mapping.pattern {
                PrincipalPattern::Exact(exact) => {
                    if users.contains_key(exact) || exact_roles.contains_key(exact) {
                        return Err(AuthzError::AmbiguousIdentity(exact.clone()));
                    }
                    exact_roles.insert(exact.clone(), mapping);
                }
                PrincipalPattern::Templated { .. } => templated_roles.push(mapping),
            }
        }

        Ok(Self {
            users,
            exact_roles,
            templated_roles,
        })
    }

    /// `None` means the principal is not recognized by this map.
    pub fn resolve(&self, principal: &Principal) -> Option<Identity> {
        if let Some(identity) = self.users.get(&principal.id) {
            return Some(identity.clone());
        }
        if let Some(identity) = self
            .exact_roles
            .get(&principal.id)
            .and_then(|m| m.resolve(principal))
        {
            return Some(identity);
        }
        self.templated_roles
            .iter()
            .find_map(|m| m.resolve(principal))
    }

    pub fn len(&self) -> usize {
        self.users.len() + self.exact_roles.len() + self.templated_roles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

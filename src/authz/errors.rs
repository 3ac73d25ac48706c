use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use miette::Diagnostic;
use serde_json::json;
use thiserror::Error;

#[derive(Debug, Error, Diagnostic)]
pub enum AuthzError {
    #[error("Failed to load policy file `{path}`")]
    #[diagnostic(
        code(gatekeep::authz::policy_load),
        help("Check that the file exists and contains valid KDL syntax")
    )]
    PolicyLoadError {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid policy document: {0}")]
    #[diagnostic(
        code(gatekeep::authz::invalid_document),
        help("Each policy file may contain `identity`, `binding`, and `role` KDL nodes")
    )]
    InvalidDocument(String),

    #[error("Invalid rule: {0}")]
    #[diagnostic(
        code(gatekeep::authz::invalid_rule),
        help("Rules need non-empty `api-groups`, `resources` and `verbs`; use a bare \"*\" to match anything")
    )]
    InvalidRule(String),

    #[error("Invalid identity mapping: {0}")]
    #[diagnostic(
        code(gatekeep::authz::invalid_identity),
        help("Supported placeholders: {{{{InstanceName}}}}, {{{{SessionName}}}}, {{{{AccountID}}}}. Only `role` entries may use a `*` pattern")
    )]
    InvalidIdentityMapping(String),

    #[error("Ambiguous identity mapping: principal `{0}` is mapped by more than one user entry")]
    #[diagnostic(
        code(gatekeep::authz::ambiguous_identity),
        help("Remove the duplicate `user` entry; each principal may map to exactly one user")
    )]
    AmbiguousIdentity(String),

    #[error("Role `{0}` is defined more than once")]
    #[diagnostic(
        code(gatekeep::authz::duplicate_role),
        help("Merge the rules into a single `role` node")
    )]
    DuplicateRole(String),

    #[error("KDL parse error: {0}")]
    #[diagnostic(
        code(gatekeep::authz::kdl_parse),
        help("Check your KDL file syntax; see https://kdl.dev for the specification")
    )]
    KdlParse(String),

    #[error("Authorization data is not available")]
    #[diagnostic(
        code(gatekeep::authz::unavailable),
        help("No valid policy snapshot has been loaded yet; check the reload diagnostics")
    )]
    ResolutionUnavailable,

    #[error("Policy watcher error: {0}")]
    #[diagnostic(code(gatekeep::authz::watch))]
    Watch(String),

    #[error("I/O error: {0}")]
    #[diagnostic(code(gatekeep::authz::io))]
    Io(#[from] std::io::Error),
}

impl AuthzError {
    /// Errors raised while building a snapshot from documents.
    pub fn is_configuration_invalid(&self) -> bool {
        matches!(
            self,
            AuthzError::InvalidDocument(_)
                | AuthzError::InvalidRule(_)
                | AuthzError::InvalidIdentityMapping(_)
                | AuthzError::AmbiguousIdentity(_)
                | AuthzError::DuplicateRole(_)
                | AuthzError::KdlParse(_)
        )
    }
}

impl IntoResponse for AuthzError {
    fn into_response(self) -> Response {
        let status = match &self {
            AuthzError::ResolutionUnavailable => StatusCode::SERVICE_UNAVAILABLE,
            e if e.is_configuration_invalid() => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        let body = json!({ "error": self.to_string() });
        (status, Json(body)).into_response()
    }
}

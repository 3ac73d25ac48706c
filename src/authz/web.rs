use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use miette::IntoDiagnostic;
use serde_json::json;
use tokio::sync::watch;

use crate::authz::engine::{self, Resolver};
use crate::authz::types::{
    AuthorizeRequest, AuthorizeResponse, Decision, Principal, WhoIsRequest, WhoIsResponse,
};
use crate::authz::watcher::ReloadStatus;
use crate::settings::Settings;

#[derive(Clone)]
pub struct ApiState {
    pub resolver: Arc<Resolver>,
    /// Absent when the policy directory is not watched
    pub reload: Option<watch::Receiver<ReloadStatus>>,
}

pub fn router(state: ApiState) -> Router {
    Router::new()
        .route("/v1/authorize", post(handle_authorize))
        .route("/v1/whois", post(handle_whois))
        .route("/v1/diagnostics", get(handle_diagnostics))
        .route("/healthz", get(health))
        .with_state(state)
}

/// Bind the access-decision API and serve it until the process exits.
pub async fn serve(settings: &Settings, state: ApiState) -> miette::Result<()> {
    let addr: SocketAddr = format!("{}:{}", settings.server.host, settings.server.port)
        .parse()
        .map_err(|e| miette::miette!("bad listen addr: {e}"))?;
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .into_diagnostic()?;
    tracing::info!(%addr, "Access decision API listening");
    axum::serve(listener, router(state)).await.into_diagnostic()?;
    Ok(())
}

fn principal_of(id: String, instance: Option<String>) -> Principal {
    Principal {
        id,
        instance: instance.filter(|i| !i.is_empty()),
    }
}

async fn handle_authorize(
    State(state): State<ApiState>,
    Json(req): Json<AuthorizeRequest>,
) -> impl IntoResponse {
    // Pin one snapshot for the whole request
    let snapshot = match state.resolver.snapshot() {
        Ok(snapshot) => snapshot,
        Err(e) => return e.into_response(),
    };
    let principal = principal_of(req.principal, req.instance);
    let decision = engine::authorize(
        &snapshot,
        &principal,
        &req.verb,
        &req.resource,
        &req.api_group,
    );
    let response = AuthorizeResponse {
        allowed: decision.is_allowed(),
        reason: decision.reason(),
        role: match decision {
            Decision::Allow { role } => Some(role),
            Decision::Deny(_) => None,
        },
        generation: snapshot.generation,
    };
    Json(response).into_response()
}

async fn handle_whois(
    State(state): State<ApiState>,
    Json(req): Json<WhoIsRequest>,
) -> impl IntoResponse {
    let snapshot = match state.resolver.snapshot() {
        Ok(snapshot) => snapshot,
        Err(e) => return e.into_response(),
    };
    let principal = principal_of(req.principal, req.instance);
    let response = match engine::who_is(&snapshot, &principal) {
        Some(who) => WhoIsResponse {
            found: true,
            username: Some(who.identity.username),
            groups: who.identity.groups,
            roles: who.roles,
            generation: snapshot.generation,
        },
        None => WhoIsResponse {
            found: false,
            username: None,
            groups: Default::default(),
            roles: Default::default(),
            generation: snapshot.generation,
        },
    };
    Json(response).into_response()
}

async fn handle_diagnostics(State(state): State<ApiState>) -> impl IntoResponse {
    let reload = state.reload.as_ref().map(|rx| rx.borrow().clone());
    let body = match state.resolver.snapshot() {
        Ok(snapshot) => json!({
            "available": true,
            "generation": snapshot.generation,
            "loaded_at": snapshot.loaded_at,
            "identities": snapshot.identities.len(),
            "bindings": snapshot.bindings.len(),
            "roles": snapshot.catalog.len(),
            "rules": snapshot.catalog.rule_count(),
            "warnings": snapshot.warnings,
            "reload": reload,
        }),
        Err(_) => json!({
            "available": false,
            "reload": reload,
        }),
    };
    Json(body)
}

async fn health() -> impl IntoResponse {
    (StatusCode::OK, "ok")
}

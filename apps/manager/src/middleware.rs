//! [apps/manager/src/middleware.rs]
//!
//! Auth Gate (C9, spec.md §4.9). Three endpoint classes: public, `login`
//! (any authenticated session or the admin token), and `admin` (mutating
//! endpoints, poll, discover). `identify` runs on every request and
//! stashes the resolved `Identity` (or none) as a request extension;
//! `require_login` / `require_admin` are separate layers applied only to
//! the routes that need them, so public endpoints never pay for a Store
//! lookup.

use axum::extract::{Request, State};
use axum::http::{header, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use tracing::warn;
use vm_store::repositories::auth::SessionRepository;

use crate::state::AppState;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Role {
    Admin,
    Login,
}

#[derive(Debug, Clone)]
pub struct Identity {
    pub role: Role,
    pub user_id: Option<String>,
}

fn constant_time_eq(a: &str, b: &str) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.bytes().zip(b.bytes()).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

pub(crate) fn extract_session_token(req: &Request) -> Option<String> {
    let cookie_header = req.headers().get(header::COOKIE)?.to_str().ok()?;
    cookie_header.split(';').find_map(|part| {
        let part = part.trim();
        part.strip_prefix("vm_session=").map(str::to_string)
    })
}

/// Resolves an `Identity` for every inbound request and stores it as a
/// request extension, without rejecting anything itself.
pub async fn identify(State(state): State<AppState>, mut req: Request, next: Next) -> Response {
    if let Some(configured) = state.config.api_token.as_deref().filter(|t| !t.is_empty()) {
        if let Some(header_token) = req.headers().get("X-Api-Token").and_then(|v| v.to_str().ok()) {
            if constant_time_eq(configured, header_token) {
                req.extensions_mut().insert(Identity {
                    role: Role::Admin,
                    user_id: None,
                });
                return next.run(req).await;
            }
        }
    }

    if let Some(token) = extract_session_token(&req) {
        let sessions = SessionRepository::new(state.store.clone());
        match sessions.get_session_user(&token, state.config.session_ttl_s).await {
            Ok(Some(user)) => {
                let role = if user.role == "admin" { Role::Admin } else { Role::Login };
                req.extensions_mut().insert(Identity {
                    role,
                    user_id: Some(user.id),
                });
            }
            Ok(None) => {}
            Err(e) => warn!(error = %e, "session lookup failed"),
        }
    }

    next.run(req).await
}

fn unauthorized() -> Response {
    (StatusCode::UNAUTHORIZED, Json(json!({"error": "unauthorized"}))).into_response()
}

fn forbidden() -> Response {
    (StatusCode::FORBIDDEN, Json(json!({"error": "forbidden"}))).into_response()
}

pub async fn require_login(req: Request, next: Next) -> Response {
    if req.extensions().get::<Identity>().is_some() {
        next.run(req).await
    } else {
        unauthorized()
    }
}

pub async fn require_admin(req: Request, next: Next) -> Response {
    match req.extensions().get::<Identity>() {
        Some(identity) if identity.role == Role::Admin => next.run(req).await,
        Some(_) => forbidden(),
        None => unauthorized(),
    }
}

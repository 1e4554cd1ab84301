//! [apps/manager/src/handlers/auth.rs]
//!
//! `/api/v1/login` and `/api/v1/logout` — the only endpoints C9 treats as
//! "login" class rather than public or admin (spec.md §4.9). Session
//! storage and TTL are the Store's; this module only shapes the cookie.

use axum::extract::State;
use axum::http::header;
use axum::response::{IntoResponse, Response};
use axum::{Json, Router};
use axum::routing::post;
use serde::Deserialize;
use serde_json::json;
use vm_store::repositories::auth::{SessionRepository, UserRepository};

use crate::errors::ApiError;
use crate::middleware::extract_session_token;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new().route("/login", post(login)).route("/logout", post(logout))
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

async fn login(State(state): State<AppState>, Json(body): Json<LoginRequest>) -> Result<Response, ApiError> {
    let users = UserRepository::new(state.store.clone());
    let user = users
        .verify_user(&body.username, &body.password)
        .await?
        .ok_or_else(|| ApiError::new(axum::http::StatusCode::UNAUTHORIZED, "invalid_credentials"))?;

    let sessions = SessionRepository::new(state.store.clone());
    let session = sessions.create_session(&user.id, state.config.session_ttl_s).await?;

    let cookie = format!(
        "vm_session={}; HttpOnly; SameSite=Strict; Path=/; Max-Age={}",
        session.token, state.config.session_ttl_s
    );
    let body = Json(json!({"ok": true, "username": user.username, "role": user.role}));
    Ok(([(header::SET_COOKIE, cookie)], body).into_response())
}

async fn logout(State(state): State<AppState>, req: axum::extract::Request) -> Result<Response, ApiError> {
    if let Some(token) = extract_session_token(&req) {
        let sessions = SessionRepository::new(state.store.clone());
        sessions.delete_session(&token).await?;
    }
    let cookie = "vm_session=; HttpOnly; SameSite=Strict; Path=/; Max-Age=0".to_string();
    Ok(([(header::SET_COOKIE, cookie)], Json(json!({"ok": true}))).into_response())
}

//! [apps/manager/src/errors.rs]
//!
//! Translates `vm-store` failures into the `{"error": "<snake_case_code>"}`
//! envelope of spec.md §6/§7. Handlers that hit the Store map `DbError`
//! through `ApiError` rather than inventing a bespoke response per call
//! site.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use vm_store::DbError;

pub struct ApiError {
    pub status: StatusCode,
    pub code: String,
}

impl ApiError {
    pub fn new(status: StatusCode, code: impl Into<String>) -> Self {
        Self { status, code: code.into() }
    }

    pub fn bad_request(code: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, code)
    }

    pub fn not_found(code: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, code)
    }

    pub fn conflict(code: impl Into<String>) -> Self {
        Self::new(StatusCode::CONFLICT, code)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(json!({"error": self.code}))).into_response()
    }
}

impl From<DbError> for ApiError {
    fn from(err: DbError) -> Self {
        match err {
            DbError::NotFound(detail) => ApiError::not_found(format!("not_found:{detail}")),
            DbError::UniqueViolation(detail) => ApiError::conflict(format!("conflict:{detail}")),
            DbError::Mapping(detail) => ApiError::new(StatusCode::INTERNAL_SERVER_ERROR, format!("store_failed:{detail}")),
            DbError::Connection(detail) => ApiError::new(StatusCode::INTERNAL_SERVER_ERROR, format!("store_failed:{detail}")),
            DbError::Query(detail) => ApiError::new(StatusCode::INTERNAL_SERVER_ERROR, format!("store_failed:{detail}")),
        }
    }
}

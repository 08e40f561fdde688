//! Route handlers

pub mod agents;
pub mod chat;
pub mod health;
pub mod settings;

use std::collections::BTreeMap;

use axum::{http::StatusCode, Json, Router};
use serde::Serialize;

use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    /// Per-field validation messages
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub fields: BTreeMap<String, Vec<String>>,
}

pub type ApiError = (StatusCode, Json<ErrorResponse>);

pub fn error(status: StatusCode, message: impl Into<String>) -> ApiError {
    (
        status,
        Json(ErrorResponse {
            error: message.into(),
            fields: BTreeMap::new(),
        }),
    )
}

/// Log `cause` and answer with a generic 500
pub fn internal(cause: impl std::fmt::Display, public: &str) -> ApiError {
    tracing::error!(error = %cause, "{}", public);
    error(StatusCode::INTERNAL_SERVER_ERROR, public)
}

/// 400 with a single field message
pub fn invalid_field(field: &str, message: &str) -> ApiError {
    let mut fields = BTreeMap::new();
    fields.insert(field.to_string(), vec![message.to_string()]);
    (
        StatusCode::BAD_REQUEST,
        Json(ErrorResponse {
            error: message.to_string(),
            fields,
        }),
    )
}

pub fn router() -> Router<AppState> {
    Router::new()
        .merge(health::router())
        .merge(chat::router())
        .merge(agents::router())
        .merge(settings::router())
}

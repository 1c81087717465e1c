//! Per-session scratch space for arbitrary JSON values.

use axum::extract::{Path, State};
use axum::response::Response;
use axum::Json;
use serde_json::Value;

use crate::identity::CurrentSession;
use crate::services::handoff::check_client_key;
use crate::state::AppState;
use crate::utils::error::AppError;
use crate::utils::response::{empty_success, success};

pub async fn get_entry(
    State(state): State<AppState>,
    CurrentSession(session): CurrentSession,
    Path(key): Path<String>,
) -> Result<Response, AppError> {
    let value = state
        .handoff
        .get_value(session.token_id, &key)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Nothing cached under '{key}'")))?;
    Ok(success(value, "Cached value"))
}

pub async fn put_entry(
    State(state): State<AppState>,
    CurrentSession(session): CurrentSession,
    Path(key): Path<String>,
    Json(value): Json<Value>,
) -> Result<Response, AppError> {
    check_client_key(&key)?;
    state.handoff.put_value(session.token_id, &key, value).await?;
    Ok(empty_success("Value cached"))
}

pub async fn delete_entry(
    State(state): State<AppState>,
    CurrentSession(session): CurrentSession,
    Path(key): Path<String>,
) -> Result<Response, AppError> {
    check_client_key(&key)?;
    let removed = state.handoff.remove(session.token_id, &key).await?;
    let message = if removed {
        "Cached value removed"
    } else {
        "Nothing was cached under that key"
    };
    Ok(empty_success(message))
}

use axum::extract::State;
use axum::response::Response;
use axum::Json;
use chrono::Utc;

use crate::identity::CurrentSession;
use crate::services::checkout::{Checkout, PaymentForm};
use crate::state::AppState;
use crate::utils::error::AppError;
use crate::utils::response::{created, success};

pub async fn current_checkout(
    State(state): State<AppState>,
    CurrentSession(session): CurrentSession,
) -> Result<Response, AppError> {
    let pending = Checkout::new(state.store.as_ref(), &state.handoff)
        .current(&session)
        .await?
        .ok_or_else(|| AppError::NotFound("There is no purchase in progress".to_string()))?;
    Ok(success(pending, "Purchase in progress"))
}

pub async fn submit_payment(
    State(state): State<AppState>,
    CurrentSession(session): CurrentSession,
    Json(form): Json<PaymentForm>,
) -> Result<Response, AppError> {
    let confirmation = Checkout::new(state.store.as_ref(), &state.handoff)
        .submit(&session, &form, Utc::now())
        .await?;
    state
        .reservations
        .clear(session.token_id, confirmation.purchase.event_id)
        .await;
    Ok(created(confirmation, "Purchase completed"))
}

pub async fn last_confirmation(
    State(state): State<AppState>,
    CurrentSession(session): CurrentSession,
) -> Result<Response, AppError> {
    let confirmation = Checkout::new(state.store.as_ref(), &state.handoff)
        .last_confirmation(&session)
        .await?
        .ok_or_else(|| AppError::NotFound("No recent purchase to confirm".to_string()))?;
    Ok(success(confirmation, "Purchase confirmation"))
}

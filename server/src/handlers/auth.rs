use axum::extract::State;
use axum::response::Response;
use axum::Json;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::identity::{CurrentSession, Registration, Session};
use crate::state::AppState;
use crate::utils::error::AppError;
use crate::utils::response::{created, empty_success, success};

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct PasswordResetRequest {
    #[serde(default)]
    pub email: String,
}

#[derive(Debug, Deserialize)]
pub struct PasswordResetConfirmation {
    #[serde(default)]
    pub token: String,
    #[serde(default)]
    pub new_password: String,
}

#[derive(Serialize)]
struct SessionView {
    #[serde(flatten)]
    session: Session,
    is_admin: bool,
}

pub async fn sign_in_anonymously(State(state): State<AppState>) -> Result<Response, AppError> {
    let issued = state.identity.sign_in_anonymously().await?;
    Ok(created(issued, "Signed in as a guest"))
}

/// An anonymous caller keeps its user id when registering.
pub async fn register(
    State(state): State<AppState>,
    current: Option<CurrentSession>,
    Json(registration): Json<Registration>,
) -> Result<Response, AppError> {
    let upgrade_from = current.map(|CurrentSession(session)| session);
    let issued = state
        .identity
        .register(registration, upgrade_from.as_ref())
        .await?;
    info!(user_id = %issued.session.user_id, "Account registered");
    Ok(created(issued, "Registration successful"))
}

pub async fn login(
    State(state): State<AppState>,
    Json(request): Json<LoginRequest>,
) -> Result<Response, AppError> {
    if request.email.trim().is_empty() || request.password.is_empty() {
        return Err(AppError::ValidationError(
            "Email and password are required".to_string(),
        ));
    }
    let issued = state.identity.sign_in(&request.email, &request.password).await?;
    let message = format!("Welcome, {}", issued.session.name);
    Ok(success(issued, message))
}

pub async fn logout(
    State(state): State<AppState>,
    CurrentSession(session): CurrentSession,
) -> Result<Response, AppError> {
    state.identity.sign_out(&session).await?;
    Ok(empty_success("Signed out"))
}

pub async fn request_password_reset(
    State(state): State<AppState>,
    Json(request): Json<PasswordResetRequest>,
) -> Result<Response, AppError> {
    if request.email.trim().is_empty() {
        return Err(AppError::ValidationError("Email is required".to_string()));
    }
    state.identity.send_password_reset(&request.email).await?;
    Ok(empty_success(
        "If the address is registered, password reset instructions have been sent",
    ))
}

pub async fn confirm_password_reset(
    State(state): State<AppState>,
    Json(request): Json<PasswordResetConfirmation>,
) -> Result<Response, AppError> {
    state
        .identity
        .confirm_password_reset(&request.token, &request.new_password)
        .await?;
    Ok(empty_success("Password updated, you can now sign in"))
}

pub async fn current_session(
    State(state): State<AppState>,
    CurrentSession(session): CurrentSession,
) -> Response {
    let is_admin = state.config.admin_user_id == Some(session.user_id);
    success(SessionView { session, is_admin }, "Session active")
}

//! Route guards as axum extractors.

use axum::extract::FromRequestParts;
use axum::http::header::AUTHORIZATION;
use axum::http::request::Parts;
use tracing::warn;

use super::Session;
use crate::state::AppState;
use crate::utils::error::AppError;

fn bearer_token(parts: &Parts) -> Option<&str> {
    parts
        .headers
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|token| !token.is_empty())
}

fn return_path(parts: &Parts) -> String {
    parts
        .uri
        .path_and_query()
        .map(|pq| pq.as_str().to_string())
        .unwrap_or_else(|| parts.uri.path().to_string())
}

/// Any verified session, anonymous included.
#[derive(Debug, Clone)]
pub struct CurrentSession(pub Session);

/// A verified, non-anonymous session.
#[derive(Debug, Clone)]
pub struct MemberSession(pub Session);

/// The configured administrator.
#[derive(Debug, Clone)]
pub struct AdminSession(pub Session);

#[axum::async_trait]
impl FromRequestParts<AppState> for CurrentSession {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let token = bearer_token(parts).ok_or_else(|| AppError::login_required(return_path(parts)))?;
        match state.identity.verify(token).await {
            Ok(session) => Ok(CurrentSession(session)),
            Err(e) => {
                warn!(error = %e, "Rejected bearer token");
                Err(AppError::login_required(return_path(parts)))
            }
        }
    }
}

#[axum::async_trait]
impl FromRequestParts<AppState> for MemberSession {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let CurrentSession(session) = CurrentSession::from_request_parts(parts, state).await?;
        if session.is_anonymous {
            return Err(AppError::login_required(return_path(parts)));
        }
        Ok(MemberSession(session))
    }
}

#[axum::async_trait]
impl FromRequestParts<AppState> for AdminSession {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let MemberSession(session) = MemberSession::from_request_parts(parts, state).await?;
        match state.config.admin_user_id {
            Some(admin_id) if admin_id == session.user_id => Ok(AdminSession(session)),
            _ => {
                warn!(user_id = %session.user_id, "Non-admin user attempted to access admin route");
                Err(AppError::AdminOnly)
            }
        }
    }
}

use axum::extract::{Query, State};
use axum::response::Response;
use axum::Json;
use serde::Deserialize;

use crate::identity::MemberSession;
use crate::models::{PurchaseSortColumn, SortDirection};
use crate::services::account;
use crate::state::AppState;
use crate::utils::error::AppError;
use crate::utils::response::{empty_success, success};

#[derive(Debug, Default, Deserialize)]
pub struct AccountQuery {
    pub sort: Option<PurchaseSortColumn>,
    pub direction: Option<SortDirection>,
}

#[derive(Debug, Deserialize)]
pub struct ProfileUpdate {
    #[serde(default)]
    pub name: String,
}

/// Newest purchases first unless asked otherwise.
pub async fn my_account(
    State(state): State<AppState>,
    MemberSession(session): MemberSession,
    Query(query): Query<AccountQuery>,
) -> Result<Response, AppError> {
    let overview = account::overview(
        state.store.as_ref(),
        &session,
        query.sort.unwrap_or(PurchaseSortColumn::PurchasedAt),
        query.direction.unwrap_or(SortDirection::Desc),
    )
    .await?;
    Ok(success(overview, "Account loaded"))
}

pub async fn update_profile(
    State(state): State<AppState>,
    MemberSession(session): MemberSession,
    Json(update): Json<ProfileUpdate>,
) -> Result<Response, AppError> {
    account::rename(
        state.store.as_ref(),
        state.identity.as_ref(),
        session.user_id,
        &update.name,
    )
    .await?;
    Ok(empty_success("Profile updated"))
}

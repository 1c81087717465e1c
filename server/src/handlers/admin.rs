use axum::extract::{Multipart, Path, Query, State};
use axum::http::header;
use axum::response::{IntoResponse, Response};
use axum::Json;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::identity::AdminSession;
use crate::models::{EventSortColumn, SortDirection, UserSortColumn};
use crate::services::admin::{BackOffice, EventDraft};
use crate::services::stats::Statistics;
use crate::services::storage::event_image_path;
use crate::state::AppState;
use crate::utils::error::AppError;
use crate::utils::response::{created, empty_success, success};

pub const MAX_IMAGE_BYTES: usize = 10 * 1024 * 1024;
const DEFAULT_AUDIT_LIMIT: usize = 100;

#[derive(Debug, Default, Deserialize)]
pub struct SortQuery<C> {
    pub sort: Option<C>,
    pub direction: Option<SortDirection>,
}

#[derive(Debug, Deserialize)]
pub struct UserUpdate {
    #[serde(default)]
    pub name: String,
}

#[derive(Debug, Deserialize)]
pub struct AuditQuery {
    pub limit: Option<usize>,
}

#[derive(Serialize)]
struct UploadedImage {
    path: String,
    url: String,
}

fn office<'a>(state: &'a AppState, admin: &'a AdminSession) -> BackOffice<'a> {
    BackOffice::new(
        state.store.as_ref(),
        state.identity.as_ref(),
        &state.audit,
        &admin.0,
    )
}

pub async fn list_events(
    State(state): State<AppState>,
    admin: AdminSession,
    Query(query): Query<SortQuery<EventSortColumn>>,
) -> Result<Response, AppError> {
    let rows = office(&state, &admin)
        .list_events(
            &state.prediction,
            query.sort.unwrap_or_default(),
            query.direction.unwrap_or_default(),
        )
        .await?;
    Ok(success(rows, "Events loaded"))
}

pub async fn get_event(
    State(state): State<AppState>,
    admin: AdminSession,
    Path(event_id): Path<Uuid>,
) -> Result<Response, AppError> {
    let event = office(&state, &admin).get_event(event_id).await?;
    Ok(success(event, "Event loaded"))
}

pub async fn create_event(
    State(state): State<AppState>,
    admin: AdminSession,
    Json(draft): Json<EventDraft>,
) -> Result<Response, AppError> {
    let event = office(&state, &admin).create_event(draft).await?;
    Ok(created(event, "Event created"))
}

pub async fn update_event(
    State(state): State<AppState>,
    admin: AdminSession,
    Path(event_id): Path<Uuid>,
    Json(draft): Json<EventDraft>,
) -> Result<Response, AppError> {
    let event = office(&state, &admin).update_event(event_id, draft).await?;
    Ok(success(event, "Event updated"))
}

pub async fn delete_event(
    State(state): State<AppState>,
    admin: AdminSession,
    Path(event_id): Path<Uuid>,
) -> Result<Response, AppError> {
    let summary = office(&state, &admin).delete_event(event_id).await?;
    Ok(success(summary, "Event deleted with its seats and purchases"))
}

/// Multipart form with a `file` part and an optional `title` part used to
/// name the stored object.
pub async fn upload_image(
    State(state): State<AppState>,
    AdminSession(admin): AdminSession,
    mut multipart: Multipart,
) -> Result<Response, AppError> {
    let mut title = String::new();
    let mut file: Option<(String, Vec<u8>)> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::ValidationError(e.to_string()))?
    {
        let part = field.name().map(str::to_string);
        match part.as_deref() {
            Some("title") => {
                title = field
                    .text()
                    .await
                    .map_err(|e| AppError::ValidationError(e.to_string()))?;
            }
            Some("file") => {
                let name = field.file_name().unwrap_or("image").to_string();
                let bytes = field
                    .bytes()
                    .await
                    .map_err(|e| AppError::ValidationError(e.to_string()))?;
                file = Some((name, bytes.to_vec()));
            }
            _ => {}
        }
    }

    let (file_name, bytes) =
        file.ok_or_else(|| AppError::ValidationError("An image file is required".to_string()))?;
    let title = if title.trim().is_empty() { "evento" } else { title.trim() };
    let path = event_image_path(title, &file_name, Utc::now())?;
    let url = state.storage.upload(&path, &bytes).await?;

    tracing::info!(admin_id = %admin.user_id, %path, "Event image uploaded");
    Ok(created(UploadedImage { path, url }, "Image uploaded"))
}

pub async fn list_users(
    State(state): State<AppState>,
    admin: AdminSession,
    Query(query): Query<SortQuery<UserSortColumn>>,
) -> Result<Response, AppError> {
    let users = office(&state, &admin)
        .list_users(
            query.sort.unwrap_or_default(),
            query.direction.unwrap_or_default(),
        )
        .await?;
    Ok(success(users, "Users loaded"))
}

pub async fn update_user(
    State(state): State<AppState>,
    admin: AdminSession,
    Path(user_id): Path<Uuid>,
    Json(update): Json<UserUpdate>,
) -> Result<Response, AppError> {
    let profile = office(&state, &admin).update_user(user_id, &update.name).await?;
    Ok(success(profile, "User updated"))
}

pub async fn delete_user(
    State(state): State<AppState>,
    admin: AdminSession,
    Path(user_id): Path<Uuid>,
) -> Result<Response, AppError> {
    office(&state, &admin).delete_user(user_id).await?;
    Ok(empty_success("User deleted"))
}

pub async fn statistics(
    State(state): State<AppState>,
    _admin: AdminSession,
) -> Result<Response, AppError> {
    let stats = Statistics::gather(state.store.as_ref()).await?;
    Ok(success(stats, "Statistics loaded"))
}

pub async fn export_purchases(
    State(state): State<AppState>,
    admin: AdminSession,
) -> Result<Response, AppError> {
    let export = office(&state, &admin).export_purchases(Utc::now()).await?;
    let disposition = format!("attachment; filename=\"{}\"", export.file_name);
    Ok((
        [
            (header::CONTENT_TYPE, "text/csv; charset=utf-8".to_string()),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        export.content,
    )
        .into_response())
}

pub async fn audit_log(
    State(state): State<AppState>,
    admin: AdminSession,
    Query(query): Query<AuditQuery>,
) -> Result<Response, AppError> {
    let limit = query.limit.unwrap_or(DEFAULT_AUDIT_LIMIT).clamp(1, 1000);
    let entries = office(&state, &admin).audit_log(limit).await?;
    Ok(success(entries, "Audit log loaded"))
}

use axum::extract::{Path, Query, State};
use axum::response::Response;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::Event;
use crate::services::catalog::Catalog;
use crate::state::AppState;
use crate::utils::error::AppError;
use crate::utils::format::{format_clp, format_timestamp};
use crate::utils::response::success;

#[derive(Debug, Deserialize)]
pub struct SearchQuery {
    #[serde(default)]
    pub q: String,
}

/// An event with its display labels.
#[derive(Serialize)]
pub struct EventDetail {
    #[serde(flatten)]
    pub event: Event,
    pub price_label: String,
    pub date_label: String,
}

impl From<Event> for EventDetail {
    fn from(event: Event) -> Self {
        Self {
            price_label: format_clp(event.price),
            date_label: format_timestamp(&event.starts_at),
            event,
        }
    }
}

pub async fn list_events(State(state): State<AppState>) -> Result<Response, AppError> {
    let events = Catalog::new(state.store.as_ref()).list().await?;
    let message = format!("{} events", events.len());
    Ok(success(events, message))
}

pub async fn featured_events(State(state): State<AppState>) -> Result<Response, AppError> {
    let events = Catalog::new(state.store.as_ref()).featured().await?;
    Ok(success(events, "Featured events"))
}

pub async fn search_events(
    State(state): State<AppState>,
    Query(query): Query<SearchQuery>,
) -> Result<Response, AppError> {
    let events = Catalog::new(state.store.as_ref()).search(&query.q).await?;
    let message = if events.is_empty() {
        "No events match your search".to_string()
    } else {
        format!("{} events found", events.len())
    };
    Ok(success(events, message))
}

pub async fn get_event(
    State(state): State<AppState>,
    Path(event_id): Path<Uuid>,
) -> Result<Response, AppError> {
    let event = Catalog::new(state.store.as_ref())
        .find(event_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Event {event_id} not found")))?;
    Ok(success(EventDetail::from(event), "Event loaded"))
}

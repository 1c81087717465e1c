use axum::extract::{Path, State};
use axum::response::sse::{Event as SseEvent, KeepAlive, Sse};
use axum::response::Response;
use futures::{Stream, StreamExt};
use serde::Serialize;
use uuid::Uuid;

use crate::identity::CurrentSession;
use crate::models::Event;
use crate::services::handoff::CHECKOUT_KEY;
use crate::services::reservation::{ReservationError, SeatMap, ToggleOutcome, Viewer};
use crate::state::AppState;
use crate::utils::error::AppError;
use crate::utils::response::success;

#[derive(Serialize)]
struct SeatMapView {
    #[serde(flatten)]
    map: SeatMap,
    /// Seats dropped from the selection because someone else bought them.
    dropped: Vec<String>,
}

#[derive(Serialize)]
struct ToggleView {
    toggle: ToggleOutcome,
    #[serde(flatten)]
    map: SeatMap,
}

async fn load_event(state: &AppState, event_id: Uuid) -> Result<Event, AppError> {
    state
        .store
        .get_event(event_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Event {event_id} not found")))
}

fn viewer_of(current: &Option<CurrentSession>) -> Viewer {
    match current {
        Some(CurrentSession(session)) => Viewer::from_session(session),
        None => Viewer::guest(),
    }
}

fn dropped_message(dropped: &[String]) -> String {
    if dropped.is_empty() {
        "Seat map loaded".to_string()
    } else {
        format!(
            "Some of your seats were just taken and were removed from your selection: {}",
            dropped.join(", ")
        )
    }
}

pub async fn seat_map(
    State(state): State<AppState>,
    Path(event_id): Path<Uuid>,
    current: Option<CurrentSession>,
) -> Result<Response, AppError> {
    let event = load_event(&state, event_id).await?;
    let snapshot = state.store.list_seats(event_id).await?;
    let viewer = viewer_of(&current);

    let (map, dropped) = state.reservations.view(&event, &snapshot, &viewer).await;
    let message = dropped_message(&dropped);
    Ok(success(SeatMapView { map, dropped }, message))
}

pub async fn toggle_seat(
    State(state): State<AppState>,
    Path((event_id, label)): Path<(Uuid, String)>,
    current: Option<CurrentSession>,
) -> Result<Response, AppError> {
    let event = load_event(&state, event_id).await?;
    let snapshot = state.store.list_seats(event_id).await?;
    let viewer = viewer_of(&current);

    let (toggle, map) = state
        .reservations
        .toggle(&event, &snapshot, &viewer, label.trim())
        .await;
    let message = match toggle {
        ToggleOutcome::Selected => format!("Seat {label} selected"),
        ToggleOutcome::Deselected => format!("Seat {label} released"),
        ToggleOutcome::Ignored(_) => format!("Seat {label} cannot be selected"),
    };
    Ok(success(ToggleView { toggle, map }, message))
}

/// One full seat map per snapshot until the event goes away.
pub async fn live_seat_map(
    State(state): State<AppState>,
    Path(event_id): Path<Uuid>,
    current: Option<CurrentSession>,
) -> Result<Sse<impl Stream<Item = Result<SseEvent, axum::Error>>>, AppError> {
    let event = load_event(&state, event_id).await?;
    let feed = state.store.watch_seats(event_id).await?;
    let viewer = viewer_of(&current);
    let desk = state.reservations.clone();

    tracing::debug!(%event_id, "Seat feed subscribed");
    let stream = feed.into_stream().then(move |snapshot| {
        let desk = desk.clone();
        let event = event.clone();
        async move {
            let (map, dropped) = desk.view(&event, &snapshot, &viewer).await;
            SseEvent::default()
                .event("seats")
                .json_data(SeatMapView { map, dropped })
        }
    });

    Ok(Sse::new(stream).keep_alive(KeepAlive::default()))
}

pub async fn continue_to_payment(
    State(state): State<AppState>,
    Path(event_id): Path<Uuid>,
    current: Option<CurrentSession>,
) -> Result<Response, AppError> {
    let Some(CurrentSession(session)) = current else {
        return Err(ReservationError::SignInRequired { event_id }.into());
    };
    let event = load_event(&state, event_id).await?;
    let snapshot = state.store.list_seats(event_id).await?;
    let viewer = Viewer::from_session(&session);

    let handoff = state
        .reservations
        .continue_to_payment(&event, &snapshot, &viewer)
        .await?;
    state
        .handoff
        .put(session.token_id, CHECKOUT_KEY, &handoff)
        .await?;

    tracing::info!(
        %event_id,
        user_id = %session.user_id,
        seats = handoff.quantity,
        "Selection handed to checkout"
    );
    Ok(success(handoff, "Continue to payment"))
}

//! Seat selection for one viewer on one event.
//!
//! The store owns seat occupancy. A viewer's selection lives here, keyed by
//! session and event, and is reconciled against every seat snapshot the viewer
//! observes: selected seats that became occupied (or disappeared) are dropped
//! silently.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap, HashSet};
use thiserror::Error;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::identity::Session;
use crate::models::{Event, Seat};

#[derive(Debug, Error)]
pub enum ReservationError {
    #[error("Sign in with a registered account to select seats")]
    SignInRequired { event_id: Uuid },

    #[error("Select at least one seat to continue")]
    EmptySelection,
}

/// Who is looking at the seat map.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Viewer {
    /// Session token id; `None` for unauthenticated visitors.
    pub owner: Option<Uuid>,
    pub user_id: Option<Uuid>,
    pub is_anonymous: bool,
}

impl Viewer {
    pub fn guest() -> Self {
        Self {
            owner: None,
            user_id: None,
            is_anonymous: true,
        }
    }

    pub fn from_session(session: &Session) -> Self {
        Self {
            owner: Some(session.token_id),
            user_id: Some(session.user_id),
            is_anonymous: session.is_anonymous,
        }
    }

    pub fn can_select(&self) -> bool {
        self.user_id.is_some() && !self.is_anonymous
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum IgnoredReason {
    Occupied,
    UnknownSeat,
    SignInRequired,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", content = "reason", rename_all = "snake_case")]
pub enum ToggleOutcome {
    Selected,
    Deselected,
    Ignored(IgnoredReason),
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SeatSelection {
    labels: BTreeSet<String>,
}

impl SeatSelection {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, label: &str) -> bool {
        self.labels.contains(label)
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    /// Labels in lexical order.
    pub fn labels(&self) -> Vec<String> {
        self.labels.iter().cloned().collect()
    }

    /// Drops selected seats that are occupied or no longer provisioned.
    pub fn reconcile(&mut self, snapshot: &[Seat]) -> Vec<String> {
        let selectable: HashSet<&str> = snapshot
            .iter()
            .filter(|seat| !seat.is_occupied())
            .map(|seat| seat.label.as_str())
            .collect();
        let dropped: Vec<String> = self
            .labels
            .iter()
            .filter(|label| !selectable.contains(label.as_str()))
            .cloned()
            .collect();
        for label in &dropped {
            self.labels.remove(label);
        }
        dropped
    }

    pub fn toggle(&mut self, label: &str, viewer: &Viewer, snapshot: &[Seat]) -> ToggleOutcome {
        if !viewer.can_select() {
            return ToggleOutcome::Ignored(IgnoredReason::SignInRequired);
        }
        match snapshot.iter().find(|seat| seat.label == label) {
            None => ToggleOutcome::Ignored(IgnoredReason::UnknownSeat),
            Some(seat) if seat.is_occupied() => ToggleOutcome::Ignored(IgnoredReason::Occupied),
            Some(_) => {
                if self.labels.remove(label) {
                    ToggleOutcome::Deselected
                } else {
                    self.labels.insert(label.to_string());
                    ToggleOutcome::Selected
                }
            }
        }
    }

    pub fn total(&self, unit_price: Decimal) -> Decimal {
        unit_price * Decimal::from(self.labels.len() as u64)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CellState {
    Available,
    Occupied,
    Selected,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SeatCell {
    pub label: String,
    pub number: i32,
    pub state: CellState,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SeatRowView {
    pub row: String,
    pub seats: Vec<SeatCell>,
}

/// What one viewer sees for one event.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SeatMap {
    pub event_id: Uuid,
    pub event_title: String,
    pub unit_price: Decimal,
    pub rows: Vec<SeatRowView>,
    pub selected: Vec<String>,
    pub quantity: usize,
    pub total_amount: Decimal,
    pub can_continue: bool,
    pub message: Option<String>,
}

impl SeatMap {
    pub fn render(event: &Event, snapshot: &[Seat], selection: &SeatSelection, viewer: &Viewer) -> Self {
        let mut rows: Vec<SeatRowView> = Vec::new();
        for seat in snapshot {
            let state = if seat.is_occupied() {
                CellState::Occupied
            } else if selection.contains(&seat.label) {
                CellState::Selected
            } else {
                CellState::Available
            };
            let cell = SeatCell {
                label: seat.label.clone(),
                number: seat.number,
                state,
            };
            match rows.last_mut() {
                Some(row) if row.row == seat.row => row.seats.push(cell),
                _ => rows.push(SeatRowView {
                    row: seat.row.clone(),
                    seats: vec![cell],
                }),
            }
        }

        let message = if snapshot.is_empty() {
            Some("No seats are available for this event yet".to_string())
        } else if !viewer.can_select() {
            Some("Sign in with a registered account to select seats".to_string())
        } else {
            None
        };

        Self {
            event_id: event.id,
            event_title: event.title.clone(),
            unit_price: event.price,
            rows,
            selected: selection.labels(),
            quantity: selection.len(),
            total_amount: selection.total(event.price),
            can_continue: viewer.can_select() && !selection.is_empty(),
            message,
        }
    }

    pub fn cell_count(&self) -> usize {
        self.rows.iter().map(|row| row.seats.len()).sum()
    }
}

/// Frozen selection handed from the seat map to checkout.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckoutHandoff {
    pub event_id: Uuid,
    pub event_title: String,
    pub event_date: DateTime<Utc>,
    pub event_venue: String,
    pub unit_price: Decimal,
    pub seats: Vec<String>,
    pub quantity: usize,
    pub total_amount: Decimal,
    pub user_id: Uuid,
}

struct Held {
    selection: SeatSelection,
    last_seen: DateTime<Utc>,
}

/// Live selections of every viewer, keyed by session and event.
///
/// Only non-empty selections of viewers who may select are held.
#[derive(Default)]
pub struct ReservationDesk {
    selections: Mutex<HashMap<(Uuid, Uuid), Held>>,
}

impl ReservationDesk {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reconciles the viewer's selection with `snapshot` and renders it.
    pub async fn view(&self, event: &Event, snapshot: &[Seat], viewer: &Viewer) -> (SeatMap, Vec<String>) {
        let Some(owner) = viewer.owner.filter(|_| viewer.can_select()) else {
            return (SeatMap::render(event, snapshot, &SeatSelection::new(), viewer), Vec::new());
        };
        let key = (owner, event.id);
        let mut selections = self.selections.lock().await;
        let Some(held) = selections.get_mut(&key) else {
            return (SeatMap::render(event, snapshot, &SeatSelection::new(), viewer), Vec::new());
        };
        held.last_seen = Utc::now();
        let dropped = held.selection.reconcile(snapshot);
        if !dropped.is_empty() {
            tracing::info!(event_id = %event.id, ?dropped, "Selected seats were taken by another buyer");
        }
        let map = SeatMap::render(event, snapshot, &held.selection, viewer);
        if held.selection.is_empty() {
            selections.remove(&key);
        }
        (map, dropped)
    }

    pub async fn toggle(
        &self,
        event: &Event,
        snapshot: &[Seat],
        viewer: &Viewer,
        label: &str,
    ) -> (ToggleOutcome, SeatMap) {
        let Some(owner) = viewer.owner.filter(|_| viewer.can_select()) else {
            let outcome = ToggleOutcome::Ignored(IgnoredReason::SignInRequired);
            return (outcome, SeatMap::render(event, snapshot, &SeatSelection::new(), viewer));
        };
        let key = (owner, event.id);
        let mut selections = self.selections.lock().await;
        let mut selection = selections
            .remove(&key)
            .map(|held| held.selection)
            .unwrap_or_default();
        selection.reconcile(snapshot);
        let outcome = selection.toggle(label, viewer, snapshot);
        let map = SeatMap::render(event, snapshot, &selection, viewer);
        if !selection.is_empty() {
            selections.insert(
                key,
                Held {
                    selection,
                    last_seen: Utc::now(),
                },
            );
        }
        (outcome, map)
    }

    pub async fn continue_to_payment(
        &self,
        event: &Event,
        snapshot: &[Seat],
        viewer: &Viewer,
    ) -> Result<CheckoutHandoff, ReservationError> {
        let (Some(owner), Some(user_id)) = (viewer.owner, viewer.user_id) else {
            return Err(ReservationError::SignInRequired { event_id: event.id });
        };
        if viewer.is_anonymous {
            return Err(ReservationError::SignInRequired { event_id: event.id });
        }

        let key = (owner, event.id);
        let mut selections = self.selections.lock().await;
        let Some(held) = selections.get_mut(&key) else {
            return Err(ReservationError::EmptySelection);
        };
        held.last_seen = Utc::now();
        held.selection.reconcile(snapshot);
        if held.selection.is_empty() {
            selections.remove(&key);
            return Err(ReservationError::EmptySelection);
        }
        let selection = &held.selection;

        Ok(CheckoutHandoff {
            event_id: event.id,
            event_title: event.title.clone(),
            event_date: event.starts_at,
            event_venue: event.venue.clone(),
            unit_price: event.price,
            seats: selection.labels(),
            quantity: selection.len(),
            total_amount: selection.total(event.price),
            user_id,
        })
    }

    pub async fn clear(&self, owner: Uuid, event_id: Uuid) {
        self.selections.lock().await.remove(&(owner, event_id));
    }

    /// Forgets every selection held by a session.
    pub async fn release_owner(&self, owner: Uuid) {
        self.selections
            .lock()
            .await
            .retain(|(selection_owner, _), _| *selection_owner != owner);
    }

    /// Drops selections untouched since before `cutoff`; returns how many.
    pub async fn purge_idle(&self, cutoff: DateTime<Utc>) -> usize {
        let mut selections = self.selections.lock().await;
        let before = selections.len();
        selections.retain(|_, held| held.last_seen >= cutoff);
        before - selections.len()
    }

    pub async fn held_count(&self) -> usize {
        self.selections.lock().await.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::seat::provision_grid;
    use crate::models::SeatStatus;

    fn event(price: i64) -> Event {
        let now = Utc::now();
        Event {
            id: Uuid::new_v4(),
            title: "La Casa de Bernarda Alba".into(),
            genre: "Drama".into(),
            venue: "Teatro Municipal".into(),
            starts_at: now,
            price: Decimal::from(price),
            description: String::new(),
            image_url: String::new(),
            price_change_justification: None,
            last_price_change_by: None,
            created_at: now,
            updated_at: now,
        }
    }

    fn member() -> Viewer {
        Viewer {
            owner: Some(Uuid::new_v4()),
            user_id: Some(Uuid::new_v4()),
            is_anonymous: false,
        }
    }

    fn occupy(seats: &mut [Seat], label: &str) {
        if let Some(seat) = seats.iter_mut().find(|s| s.label == label) {
            seat.status = SeatStatus::Occupied;
        }
    }

    #[test]
    fn test_toggle_twice_restores_selection() {
        let grid = provision_grid(Uuid::new_v4());
        let viewer = member();
        let mut selection = SeatSelection::new();
        selection.toggle("B2", &viewer, &grid);
        let before = selection.clone();

        assert_eq!(selection.toggle("A1", &viewer, &grid), ToggleOutcome::Selected);
        assert_eq!(selection.toggle("A1", &viewer, &grid), ToggleOutcome::Deselected);
        assert_eq!(selection, before);
    }

    #[test]
    fn test_toggle_ignores_occupied_unknown_and_anonymous() {
        let mut grid = provision_grid(Uuid::new_v4());
        occupy(&mut grid, "C3");
        let mut selection = SeatSelection::new();

        assert_eq!(
            selection.toggle("C3", &member(), &grid),
            ToggleOutcome::Ignored(IgnoredReason::Occupied)
        );
        assert_eq!(
            selection.toggle("Z9", &member(), &grid),
            ToggleOutcome::Ignored(IgnoredReason::UnknownSeat)
        );
        let anonymous = Viewer {
            is_anonymous: true,
            ..member()
        };
        assert_eq!(
            selection.toggle("A1", &anonymous, &grid),
            ToggleOutcome::Ignored(IgnoredReason::SignInRequired)
        );
        assert_eq!(
            selection.toggle("A1", &Viewer::guest(), &grid),
            ToggleOutcome::Ignored(IgnoredReason::SignInRequired)
        );
        assert!(selection.is_empty());
    }

    #[test]
    fn test_reconcile_drops_seats_taken_elsewhere() {
        let mut grid = provision_grid(Uuid::new_v4());
        let viewer = member();
        let mut selection = SeatSelection::new();
        for label in ["A1", "A2", "B5"] {
            selection.toggle(label, &viewer, &grid);
        }

        occupy(&mut grid, "A2");
        assert_eq!(selection.reconcile(&grid), vec!["A2".to_string()]);
        assert_eq!(selection.labels(), vec!["A1", "B5"]);
        assert!(selection.reconcile(&grid).is_empty());
    }

    #[test]
    fn test_total_is_quantity_times_unit_price() {
        let grid = provision_grid(Uuid::new_v4());
        let viewer = member();
        let mut selection = SeatSelection::new();
        for label in ["A1", "A2", "B5"] {
            selection.toggle(label, &viewer, &grid);
        }
        assert_eq!(selection.len(), 3);
        assert_eq!(selection.total(Decimal::from(15000)), Decimal::from(45000));
    }

    #[test]
    fn test_render_has_one_cell_per_provisioned_seat() {
        let event = event(15000);
        let mut grid = provision_grid(event.id);
        occupy(&mut grid, "E10");
        let viewer = member();
        let mut selection = SeatSelection::new();
        selection.toggle("A1", &viewer, &grid);

        let map = SeatMap::render(&event, &grid, &selection, &viewer);
        assert_eq!(map.rows.len(), 5);
        assert_eq!(map.cell_count(), 50);
        assert!(map.rows.iter().all(|row| row.seats.len() == 10));

        let states: Vec<CellState> = map.rows.iter().flat_map(|r| r.seats.iter().map(|c| c.state)).collect();
        assert_eq!(states.iter().filter(|s| **s == CellState::Selected).count(), 1);
        assert_eq!(states.iter().filter(|s| **s == CellState::Occupied).count(), 1);
        assert_eq!(states.iter().filter(|s| **s == CellState::Available).count(), 48);
        assert!(map.can_continue);
    }

    #[test]
    fn test_render_without_seats_is_empty_and_locked() {
        let event = event(15000);
        let viewer = member();
        let map = SeatMap::render(&event, &[], &SeatSelection::new(), &viewer);
        assert!(map.rows.is_empty());
        assert!(!map.can_continue);
        assert!(map.message.is_some());
    }

    #[tokio::test]
    async fn test_continue_to_payment_freezes_sorted_selection() {
        let desk = ReservationDesk::new();
        let event = event(15000);
        let grid = provision_grid(event.id);
        let viewer = member();

        for label in ["B5", "A2", "A1"] {
            desk.toggle(&event, &grid, &viewer, label).await;
        }
        let handoff = desk.continue_to_payment(&event, &grid, &viewer).await.unwrap();

        assert_eq!(handoff.seats, vec!["A1", "A2", "B5"]);
        assert_eq!(handoff.quantity, 3);
        assert_eq!(handoff.total_amount, Decimal::from(45000));
        assert_eq!(Some(handoff.user_id), viewer.user_id);
    }

    #[tokio::test]
    async fn test_continue_requires_member_and_selection() {
        let desk = ReservationDesk::new();
        let event = event(1000);
        let grid = provision_grid(event.id);

        assert!(matches!(
            desk.continue_to_payment(&event, &grid, &Viewer::guest()).await,
            Err(ReservationError::SignInRequired { .. })
        ));
        assert!(matches!(
            desk.continue_to_payment(&event, &grid, &member()).await,
            Err(ReservationError::EmptySelection)
        ));
    }

    #[tokio::test]
    async fn test_view_reports_dropped_seats() {
        let desk = ReservationDesk::new();
        let event = event(1000);
        let mut grid = provision_grid(event.id);
        let viewer = member();
        desk.toggle(&event, &grid, &viewer, "D4").await;

        occupy(&mut grid, "D4");
        let (map, dropped) = desk.view(&event, &grid, &viewer).await;
        assert_eq!(dropped, vec!["D4"]);
        assert!(map.selected.is_empty());
    }

    #[tokio::test]
    async fn test_viewers_who_cannot_select_hold_nothing() {
        let desk = ReservationDesk::new();
        let event = event(1000);
        let grid = provision_grid(event.id);
        let anonymous = Viewer {
            is_anonymous: true,
            ..member()
        };

        for _ in 0..1000 {
            desk.view(&event, &grid, &anonymous).await;
            desk.view(&event, &grid, &member()).await;
        }
        desk.toggle(&event, &grid, &anonymous, "A1").await;
        assert_eq!(desk.held_count().await, 0);
    }

    #[tokio::test]
    async fn test_emptied_selection_is_forgotten() {
        let desk = ReservationDesk::new();
        let event = event(1000);
        let mut grid = provision_grid(event.id);
        let viewer = member();

        desk.toggle(&event, &grid, &viewer, "A1").await;
        assert_eq!(desk.held_count().await, 1);
        desk.toggle(&event, &grid, &viewer, "A1").await;
        assert_eq!(desk.held_count().await, 0);

        desk.toggle(&event, &grid, &viewer, "B2").await;
        occupy(&mut grid, "B2");
        desk.view(&event, &grid, &viewer).await;
        assert_eq!(desk.held_count().await, 0);
    }

    #[tokio::test]
    async fn test_idle_selections_are_purged() {
        let desk = ReservationDesk::new();
        let event = event(1000);
        let grid = provision_grid(event.id);
        desk.toggle(&event, &grid, &member(), "C3").await;

        assert_eq!(desk.purge_idle(Utc::now() - chrono::Duration::hours(1)).await, 0);
        assert_eq!(desk.purge_idle(Utc::now() + chrono::Duration::seconds(1)).await, 1);
        assert_eq!(desk.held_count().await, 0);
    }
}

//! Administrator operations over events, users and purchases. Every mutation
//! leaves an audit entry.

use chrono::{DateTime, Utc};
use futures::future::join_all;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::json;
use thiserror::Error;
use tracing::{error, info, warn};
use uuid::Uuid;

use super::audit::AuditTrail;
use super::catalog::sort_events;
use super::export::{purchases_csv, CsvExport};
use super::prediction::PredictionClient;
use crate::identity::{IdentityError, IdentityProvider, Session};
use crate::models::seat::provision_grid;
use crate::models::{
    AuditAction, AuditEntry, Event, EventSortColumn, SortDirection, UserProfile, UserSortColumn,
};
use crate::store::{BatchOp, Store, StoreError, WriteBatch};

#[derive(Debug, Error)]
pub enum AdminError {
    #[error("{0}")]
    Validation(String),

    #[error("A justification is required to change the price")]
    PriceJustificationRequired,

    #[error("You cannot delete your own administrator account")]
    SelfDeletion,

    #[error("{0}")]
    NotFound(String),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Identity(#[from] IdentityError),
}

pub type AdminResult<T> = Result<T, AdminError>;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct EventDraft {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub genre: String,
    #[serde(default)]
    pub venue: String,
    pub starts_at: Option<DateTime<Utc>>,
    pub price: Option<Decimal>,
    #[serde(default)]
    pub description: String,
    pub image_url: Option<String>,
    pub price_change_justification: Option<String>,
}

impl EventDraft {
    fn validate(&self, require_image: bool) -> AdminResult<(DateTime<Utc>, Decimal)> {
        let required = [
            &self.title,
            &self.genre,
            &self.venue,
            &self.description,
        ];
        if required.iter().any(|value| value.trim().is_empty()) {
            return Err(AdminError::Validation(
                "All required fields must be filled in".to_string(),
            ));
        }
        let starts_at = self
            .starts_at
            .ok_or_else(|| AdminError::Validation("The date and time are not valid".to_string()))?;
        let price = self
            .price
            .filter(|price| !price.is_sign_negative())
            .ok_or_else(|| AdminError::Validation("The price is not valid".to_string()))?;
        if require_image && self.image().is_none() {
            return Err(AdminError::Validation(
                "An image is required for new events".to_string(),
            ));
        }
        Ok((starts_at, price))
    }

    fn image(&self) -> Option<&str> {
        self.image_url
            .as_deref()
            .map(str::trim)
            .filter(|url| !url.is_empty())
    }

    fn justification(&self) -> Option<String> {
        self.price_change_justification
            .as_deref()
            .map(str::trim)
            .filter(|text| !text.is_empty())
            .map(str::to_string)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct AdminEventRow {
    #[serde(flatten)]
    pub event: Event,
    pub predicted_occupancy_pct: Option<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CascadeSummary {
    pub seats_deleted: usize,
    pub purchases_deleted: usize,
}

pub fn sort_users(users: &mut [UserProfile], column: UserSortColumn, direction: SortDirection) {
    users.sort_by(|a, b| {
        let ordering = match column {
            UserSortColumn::Name => a.name.to_lowercase().cmp(&b.name.to_lowercase()),
            UserSortColumn::Email => a.email.cmp(&b.email),
            UserSortColumn::RegisteredAt => a.registered_at.cmp(&b.registered_at),
        };
        direction.apply(ordering)
    });
}

pub struct BackOffice<'a> {
    store: &'a dyn Store,
    identity: &'a dyn IdentityProvider,
    audit: &'a AuditTrail,
    actor: &'a Session,
}

impl<'a> BackOffice<'a> {
    pub fn new(
        store: &'a dyn Store,
        identity: &'a dyn IdentityProvider,
        audit: &'a AuditTrail,
        actor: &'a Session,
    ) -> Self {
        Self {
            store,
            identity,
            audit,
            actor,
        }
    }

    pub async fn list_events(
        &self,
        prediction: &PredictionClient,
        column: EventSortColumn,
        direction: SortDirection,
    ) -> AdminResult<Vec<AdminEventRow>> {
        let mut events = self.store.list_events(None).await?;
        sort_events(&mut events, column, direction);

        let predictions = join_all(events.iter().map(|event| prediction.predict(event))).await;
        Ok(events
            .into_iter()
            .zip(predictions)
            .map(|(event, predicted_occupancy_pct)| AdminEventRow {
                event,
                predicted_occupancy_pct,
            })
            .collect())
    }

    pub async fn get_event(&self, id: Uuid) -> AdminResult<Event> {
        self.store
            .get_event(id)
            .await?
            .ok_or_else(|| AdminError::NotFound(format!("Event {id} not found")))
    }

    /// Inserts the event, then provisions its seat grid in one batch.
    pub async fn create_event(&self, draft: EventDraft) -> AdminResult<Event> {
        let (starts_at, price) = draft.validate(true)?;
        let now = Utc::now();
        let event = Event {
            id: Uuid::new_v4(),
            title: draft.title.trim().to_string(),
            genre: draft.genre.trim().to_string(),
            venue: draft.venue.trim().to_string(),
            starts_at,
            price,
            description: draft.description.trim().to_string(),
            image_url: draft.image().unwrap_or_default().to_string(),
            price_change_justification: None,
            last_price_change_by: None,
            created_at: now,
            updated_at: now,
        };
        self.store.insert_event(&event).await?;

        let mut batch = WriteBatch::new();
        for seat in provision_grid(event.id) {
            batch.push(BatchOp::PutSeat(seat));
        }
        if let Err(e) = self.store.commit(batch).await {
            error!(event_id = %event.id, error = %e, "Event created without a seat grid");
            return Err(e.into());
        }

        info!(event_id = %event.id, title = %event.title, "Event created");
        self.audit
            .record(
                self.actor,
                AuditAction::EventCreate,
                json!({
                    "event_id": event.id,
                    "title": event.title,
                    "genre": event.genre,
                    "venue": event.venue,
                    "starts_at": event.starts_at,
                    "price": event.price,
                }),
            )
            .await;
        Ok(event)
    }

    /// A price change needs a justification; any other edit clears the last one.
    pub async fn update_event(&self, id: Uuid, draft: EventDraft) -> AdminResult<Event> {
        let (starts_at, price) = draft.validate(false)?;
        let existing = self.get_event(id).await?;

        let price_changed = existing.price != price;
        let (justification, changed_by) = if price_changed {
            let justification = draft
                .justification()
                .ok_or(AdminError::PriceJustificationRequired)?;
            (Some(justification), Some(self.actor.user_id))
        } else {
            (None, None)
        };

        let updated = Event {
            title: draft.title.trim().to_string(),
            genre: draft.genre.trim().to_string(),
            venue: draft.venue.trim().to_string(),
            starts_at,
            price,
            description: draft.description.trim().to_string(),
            image_url: draft
                .image()
                .map(str::to_string)
                .unwrap_or_else(|| existing.image_url.clone()),
            price_change_justification: justification.clone(),
            last_price_change_by: changed_by,
            updated_at: Utc::now(),
            ..existing.clone()
        };
        self.store.update_event(&updated).await?;

        let mut payload = json!({
            "event_id": updated.id,
            "title": updated.title,
            "genre": updated.genre,
            "venue": updated.venue,
            "starts_at": updated.starts_at,
            "new_price": updated.price,
        });
        if price_changed {
            payload["previous_price"] = json!(existing.price);
            payload["price_change_justification"] = json!(justification);
        }
        info!(event_id = %id, price_changed, "Event updated");
        self.audit
            .record(self.actor, AuditAction::EventUpdate, payload)
            .await;
        Ok(updated)
    }

    /// Deletes the event together with its seats and purchases, atomically.
    pub async fn delete_event(&self, id: Uuid) -> AdminResult<CascadeSummary> {
        self.get_event(id).await?;
        let seats = self.store.list_seats(id).await?;
        let purchases = self.store.purchases_for_event(id).await?;

        let mut batch = WriteBatch::new();
        for purchase in &purchases {
            batch.push(BatchOp::DeletePurchase(purchase.id));
        }
        for seat in &seats {
            batch.push(BatchOp::DeleteSeat {
                event_id: id,
                label: seat.label.clone(),
            });
        }
        batch.push(BatchOp::DeleteEvent(id));
        self.store.commit(batch).await?;

        let summary = CascadeSummary {
            seats_deleted: seats.len(),
            purchases_deleted: purchases.len(),
        };
        info!(event_id = %id, ?summary, "Event deleted");
        self.audit
            .record(self.actor, AuditAction::EventDelete, json!({ "event_id": id }))
            .await;
        Ok(summary)
    }

    pub async fn list_users(
        &self,
        column: UserSortColumn,
        direction: SortDirection,
    ) -> AdminResult<Vec<UserProfile>> {
        let mut users = self.store.list_users().await?;
        sort_users(&mut users, column, direction);
        Ok(users)
    }

    pub async fn update_user(&self, user_id: Uuid, name: &str) -> AdminResult<UserProfile> {
        let name = name.trim();
        if name.is_empty() {
            return Err(AdminError::Validation("There are no changes to save".to_string()));
        }
        self.store.update_user_name(user_id, name).await.map_err(|e| match e {
            StoreError::NotFound(_) => AdminError::NotFound(format!("User {user_id} not found")),
            other => AdminError::Store(other),
        })?;

        if user_id == self.actor.user_id {
            if let Err(e) = self.identity.update_display_name(user_id, name).await {
                warn!(%user_id, error = %e, "Could not update the administrator's display name");
            }
        }

        self.audit
            .record(
                self.actor,
                AuditAction::UserUpdate,
                json!({
                    "target_user_id": user_id,
                    "updated_fields": ["name"],
                    "new_name": name,
                }),
            )
            .await;

        self.store
            .get_user(user_id)
            .await?
            .ok_or_else(|| AdminError::NotFound(format!("User {user_id} not found")))
    }

    /// Removes the profile record only; the credential is left in place.
    pub async fn delete_user(&self, user_id: Uuid) -> AdminResult<()> {
        if user_id == self.actor.user_id {
            return Err(AdminError::SelfDeletion);
        }
        self.store.delete_user(user_id).await.map_err(|e| match e {
            StoreError::NotFound(_) => AdminError::NotFound(format!("User {user_id} not found")),
            other => AdminError::Store(other),
        })?;

        info!(%user_id, "User deleted");
        self.audit
            .record(
                self.actor,
                AuditAction::UserDelete,
                json!({ "target_user_id": user_id }),
            )
            .await;
        Ok(())
    }

    pub async fn export_purchases(&self, now: DateTime<Utc>) -> AdminResult<CsvExport> {
        let purchases = self.store.list_purchases().await?;
        let export = purchases_csv(&purchases, now)
            .ok_or_else(|| AdminError::NotFound("There are no purchases to export".to_string()))?;

        self.audit
            .record(
                self.actor,
                AuditAction::PurchasesExport,
                json!({ "total_purchases": export.rows }),
            )
            .await;
        Ok(export)
    }

    pub async fn audit_log(&self, limit: usize) -> AdminResult<Vec<AuditEntry>> {
        Ok(self.store.list_audit(limit).await?)
    }
}

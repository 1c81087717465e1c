use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgPool, Postgres, Transaction};
use tokio::sync::Mutex;
use uuid::Uuid;

use super::{BatchOp, SeatFeed, SeatFeedHub, Store, StoreError, StoreResult, WriteBatch};
use crate::models::{AuditEntry, Credential, Event, Purchase, Seat, SeatStatus, UserProfile};

const EVENT_COLUMNS: &str = "id, title, genre, venue, starts_at, price, description, image_url, \
     price_change_justification, last_price_change_by, created_at, updated_at";

const PURCHASE_COLUMNS: &str = "id, user_id, user_email, event_id, event_title, event_date, \
     event_venue, unit_price, seats, quantity, total_amount, payment_method, card_last4, \
     card_holder, card_expiry, status, purchased_at";

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        match &err {
            sqlx::Error::RowNotFound => StoreError::NotFound(err.to_string()),
            sqlx::Error::Database(db) => match db.code().as_deref() {
                Some("42501") => StoreError::PermissionDenied(db.message().to_string()),
                Some("23505") => StoreError::Conflict(db.message().to_string()),
                _ => StoreError::Backend(err.to_string()),
            },
            _ => StoreError::Backend(err.to_string()),
        }
    }
}

#[derive(FromRow)]
struct SeatRow {
    event_id: Uuid,
    label: String,
    row_label: String,
    number: i32,
    status: String,
    user_id: Option<Uuid>,
    purchase_id: Option<Uuid>,
    updated_at: Option<DateTime<Utc>>,
}

impl From<SeatRow> for Seat {
    fn from(row: SeatRow) -> Self {
        Seat {
            event_id: row.event_id,
            label: row.label,
            row: row.row_label,
            number: row.number,
            status: SeatStatus::parse(&row.status),
            user_id: row.user_id,
            purchase_id: row.purchase_id,
            updated_at: row.updated_at,
        }
    }
}

pub struct PgStore {
    pool: PgPool,
    feeds: SeatFeedHub,
    /// Serialises feed loads so snapshots reach subscribers in commit order.
    feed_refresh: Mutex<()>,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool,
            feeds: SeatFeedHub::new(),
            feed_refresh: Mutex::new(()),
        }
    }

    async fn apply(tx: &mut Transaction<'_, Postgres>, op: &BatchOp) -> StoreResult<()> {
        match op {
            BatchOp::PutSeat(seat) => {
                sqlx::query(
                    "INSERT INTO seats (event_id, label, row_label, number, status, user_id, purchase_id, updated_at)
                     VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
                     ON CONFLICT (event_id, label) DO UPDATE SET
                        row_label = EXCLUDED.row_label,
                        number = EXCLUDED.number,
                        status = EXCLUDED.status,
                        user_id = EXCLUDED.user_id,
                        purchase_id = EXCLUDED.purchase_id,
                        updated_at = EXCLUDED.updated_at",
                )
                .bind(seat.event_id)
                .bind(&seat.label)
                .bind(&seat.row)
                .bind(seat.number)
                .bind(seat.status.as_str())
                .bind(seat.user_id)
                .bind(seat.purchase_id)
                .bind(seat.updated_at)
                .execute(&mut **tx)
                .await?;
            }
            BatchOp::OccupySeat {
                event_id,
                label,
                user_id,
                purchase_id,
                at,
            } => {
                let updated = sqlx::query(
                    "UPDATE seats SET status = 'occupied', user_id = $3, purchase_id = $4, updated_at = $5
                     WHERE event_id = $1 AND label = $2",
                )
                .bind(event_id)
                .bind(label)
                .bind(user_id)
                .bind(purchase_id)
                .bind(at)
                .execute(&mut **tx)
                .await?;
                if updated.rows_affected() == 0 {
                    return Err(StoreError::NotFound(format!("seat {label} of event {event_id}")));
                }
            }
            BatchOp::DeleteSeat { event_id, label } => {
                sqlx::query("DELETE FROM seats WHERE event_id = $1 AND label = $2")
                    .bind(event_id)
                    .bind(label)
                    .execute(&mut **tx)
                    .await?;
            }
            BatchOp::DeletePurchase(id) => {
                sqlx::query("DELETE FROM purchases WHERE id = $1")
                    .bind(id)
                    .execute(&mut **tx)
                    .await?;
            }
            BatchOp::DeleteEvent(id) => {
                sqlx::query("DELETE FROM seats WHERE event_id = $1")
                    .bind(id)
                    .execute(&mut **tx)
                    .await?;
                sqlx::query("DELETE FROM events WHERE id = $1")
                    .bind(id)
                    .execute(&mut **tx)
                    .await?;
            }
        }
        Ok(())
    }
}

#[async_trait]
impl Store for PgStore {
    async fn list_events(&self, limit: Option<usize>) -> StoreResult<Vec<Event>> {
        let limit = limit.map(|l| l as i64);
        let events = sqlx::query_as::<_, Event>(&format!(
            "SELECT {EVENT_COLUMNS} FROM events ORDER BY starts_at DESC LIMIT $1"
        ))
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(events)
    }

    async fn get_event(&self, id: Uuid) -> StoreResult<Option<Event>> {
        let event = sqlx::query_as::<_, Event>(&format!(
            "SELECT {EVENT_COLUMNS} FROM events WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(event)
    }

    async fn insert_event(&self, event: &Event) -> StoreResult<()> {
        sqlx::query(&format!(
            "INSERT INTO events ({EVENT_COLUMNS}) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)"
        ))
        .bind(event.id)
        .bind(&event.title)
        .bind(&event.genre)
        .bind(&event.venue)
        .bind(event.starts_at)
        .bind(event.price)
        .bind(&event.description)
        .bind(&event.image_url)
        .bind(&event.price_change_justification)
        .bind(event.last_price_change_by)
        .bind(event.created_at)
        .bind(event.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn update_event(&self, event: &Event) -> StoreResult<()> {
        let result = sqlx::query(
            "UPDATE events SET title = $2, genre = $3, venue = $4, starts_at = $5, price = $6,
                description = $7, image_url = $8, price_change_justification = $9,
                last_price_change_by = $10, updated_at = $11
             WHERE id = $1",
        )
        .bind(event.id)
        .bind(&event.title)
        .bind(&event.genre)
        .bind(&event.venue)
        .bind(event.starts_at)
        .bind(event.price)
        .bind(&event.description)
        .bind(&event.image_url)
        .bind(&event.price_change_justification)
        .bind(event.last_price_change_by)
        .bind(event.updated_at)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(format!("event {}", event.id)));
        }
        Ok(())
    }

    async fn list_seats(&self, event_id: Uuid) -> StoreResult<Vec<Seat>> {
        let rows = sqlx::query_as::<_, SeatRow>(
            "SELECT event_id, label, row_label, number, status, user_id, purchase_id, updated_at
             FROM seats WHERE event_id = $1
             ORDER BY row_label, number",
        )
        .bind(event_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(Seat::from).collect())
    }

    async fn watch_seats(&self, event_id: Uuid) -> StoreResult<SeatFeed> {
        let _refresh = self.feed_refresh.lock().await;
        let loaded = self.list_seats(event_id).await?;
        Ok(self.feeds.subscribe(event_id, loaded))
    }

    async fn insert_purchase(&self, purchase: &Purchase) -> StoreResult<()> {
        sqlx::query(&format!(
            "INSERT INTO purchases ({PURCHASE_COLUMNS})
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17)"
        ))
        .bind(purchase.id)
        .bind(purchase.user_id)
        .bind(&purchase.user_email)
        .bind(purchase.event_id)
        .bind(&purchase.event_title)
        .bind(purchase.event_date)
        .bind(&purchase.event_venue)
        .bind(purchase.unit_price)
        .bind(&purchase.seats)
        .bind(purchase.quantity)
        .bind(purchase.total_amount)
        .bind(&purchase.payment_method)
        .bind(&purchase.card_last4)
        .bind(&purchase.card_holder)
        .bind(&purchase.card_expiry)
        .bind(&purchase.status)
        .bind(purchase.purchased_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn list_purchases(&self) -> StoreResult<Vec<Purchase>> {
        let purchases = sqlx::query_as::<_, Purchase>(&format!(
            "SELECT {PURCHASE_COLUMNS} FROM purchases ORDER BY purchased_at"
        ))
        .fetch_all(&self.pool)
        .await?;
        Ok(purchases)
    }

    async fn purchases_for_user(&self, user_id: Uuid) -> StoreResult<Vec<Purchase>> {
        let purchases = sqlx::query_as::<_, Purchase>(&format!(
            "SELECT {PURCHASE_COLUMNS} FROM purchases WHERE user_id = $1"
        ))
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(purchases)
    }

    async fn purchases_for_event(&self, event_id: Uuid) -> StoreResult<Vec<Purchase>> {
        let purchases = sqlx::query_as::<_, Purchase>(&format!(
            "SELECT {PURCHASE_COLUMNS} FROM purchases WHERE event_id = $1"
        ))
        .bind(event_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(purchases)
    }

    async fn get_user(&self, id: Uuid) -> StoreResult<Option<UserProfile>> {
        let user = sqlx::query_as::<_, UserProfile>(
            "SELECT id, email, name, is_anonymous, registered_at FROM users WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(user)
    }

    async fn put_user(&self, profile: &UserProfile) -> StoreResult<()> {
        sqlx::query(
            "INSERT INTO users (id, email, name, is_anonymous, registered_at)
             VALUES ($1, $2, $3, $4, $5)
             ON CONFLICT (id) DO UPDATE SET
                email = EXCLUDED.email,
                name = EXCLUDED.name,
                is_anonymous = EXCLUDED.is_anonymous,
                registered_at = EXCLUDED.registered_at",
        )
        .bind(profile.id)
        .bind(&profile.email)
        .bind(&profile.name)
        .bind(profile.is_anonymous)
        .bind(profile.registered_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn list_users(&self) -> StoreResult<Vec<UserProfile>> {
        let users = sqlx::query_as::<_, UserProfile>(
            "SELECT id, email, name, is_anonymous, registered_at FROM users",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(users)
    }

    async fn update_user_name(&self, id: Uuid, name: &str) -> StoreResult<()> {
        let result = sqlx::query("UPDATE users SET name = $2 WHERE id = $1")
            .bind(id)
            .bind(name)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(format!("user {id}")));
        }
        Ok(())
    }

    async fn delete_user(&self, id: Uuid) -> StoreResult<()> {
        let result = sqlx::query("DELETE FROM users WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(format!("user {id}")));
        }
        Ok(())
    }

    async fn find_credential(&self, email: &str) -> StoreResult<Option<Credential>> {
        let credential = sqlx::query_as::<_, Credential>(
            "SELECT user_id, email, display_name, password_hash FROM credentials WHERE email = $1",
        )
        .bind(email)
        .fetch_optional(&self.pool)
        .await?;
        Ok(credential)
    }

    async fn credential_for_user(&self, user_id: Uuid) -> StoreResult<Option<Credential>> {
        let credential = sqlx::query_as::<_, Credential>(
            "SELECT user_id, email, display_name, password_hash FROM credentials WHERE user_id = $1",
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(credential)
    }

    async fn insert_credential(&self, credential: &Credential) -> StoreResult<()> {
        sqlx::query(
            "INSERT INTO credentials (email, user_id, display_name, password_hash)
             VALUES ($1, $2, $3, $4)",
        )
        .bind(&credential.email)
        .bind(credential.user_id)
        .bind(&credential.display_name)
        .bind(&credential.password_hash)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn update_credential(&self, credential: &Credential) -> StoreResult<()> {
        let result = sqlx::query(
            "UPDATE credentials SET display_name = $2, password_hash = $3 WHERE email = $1",
        )
        .bind(&credential.email)
        .bind(&credential.display_name)
        .bind(&credential.password_hash)
        .execute(&self.pool)
        .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(credential.email.clone()));
        }
        Ok(())
    }

    async fn append_audit(&self, entry: &AuditEntry) -> StoreResult<()> {
        sqlx::query(
            "INSERT INTO audit_log (id, action, actor_id, actor_email, occurred_at, payload)
             VALUES ($1, $2, $3, $4, $5, $6)",
        )
        .bind(entry.id)
        .bind(&entry.action)
        .bind(entry.actor_id)
        .bind(&entry.actor_email)
        .bind(entry.occurred_at)
        .bind(&entry.payload)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn list_audit(&self, limit: usize) -> StoreResult<Vec<AuditEntry>> {
        let entries = sqlx::query_as::<_, AuditEntry>(
            "SELECT id, action, actor_id, actor_email, occurred_at, payload
             FROM audit_log ORDER BY occurred_at DESC LIMIT $1",
        )
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;
        Ok(entries)
    }

    async fn commit(&self, batch: WriteBatch) -> StoreResult<()> {
        let touched = batch.touched_events();
        let deleted: Vec<Uuid> = batch
            .ops()
            .iter()
            .filter_map(|op| match op {
                BatchOp::DeleteEvent(id) => Some(*id),
                _ => None,
            })
            .collect();

        let mut tx = self.pool.begin().await?;
        for op in batch.ops() {
            Self::apply(&mut tx, op).await?;
        }
        tx.commit().await?;

        let _refresh = self.feed_refresh.lock().await;
        for event_id in touched {
            if deleted.contains(&event_id) {
                self.feeds.close(event_id);
                continue;
            }
            if !self.feeds.is_watched(event_id) {
                continue;
            }
            match self.list_seats(event_id).await {
                Ok(seats) => self.feeds.publish(event_id, seats),
                Err(e) => tracing::warn!(%event_id, error = %e, "Failed to refresh seat feed"),
            }
        }
        Ok(())
    }
}

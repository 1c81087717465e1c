//! Document-store boundary.
//!
//! Every collection the storefront touches goes through [`Store`]. Writes that
//! must land together are expressed as a [`WriteBatch`] and committed
//! atomically by the backend. Seat changes are published on a per-event
//! [`SeatFeed`] after each commit.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;
use uuid::Uuid;

use crate::models::{AuditEntry, Credential, Event, Purchase, Seat, UserProfile};

pub mod feed;
pub mod memory;
pub mod postgres;

pub use feed::{SeatFeed, SeatFeedHub};
pub use memory::MemoryStore;
pub use postgres::PgStore;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum StoreError {
    #[error("Missing or insufficient permissions: {0}")]
    PermissionDenied(String),

    #[error("Record not found: {0}")]
    NotFound(String),

    #[error("Record already exists: {0}")]
    Conflict(String),

    #[error("{0}")]
    Backend(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Collection names, used for access denial and diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Collection {
    Events,
    Seats,
    Purchases,
    Users,
    Credentials,
    AuditLog,
}

impl Collection {
    pub fn name(&self) -> &'static str {
        match self {
            Collection::Events => "events",
            Collection::Seats => "seats",
            Collection::Purchases => "purchases",
            Collection::Users => "users",
            Collection::Credentials => "credentials",
            Collection::AuditLog => "auditLog",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum BatchOp {
    /// Insert or fully replace one seat.
    PutSeat(Seat),
    /// Merge the occupied state into a seat, creating it if absent.
    OccupySeat {
        event_id: Uuid,
        label: String,
        user_id: Uuid,
        purchase_id: Uuid,
        at: DateTime<Utc>,
    },
    DeleteSeat {
        event_id: Uuid,
        label: String,
    },
    DeletePurchase(Uuid),
    DeleteEvent(Uuid),
}

impl BatchOp {
    pub fn collection(&self) -> Collection {
        match self {
            BatchOp::PutSeat(_) | BatchOp::OccupySeat { .. } | BatchOp::DeleteSeat { .. } => {
                Collection::Seats
            }
            BatchOp::DeletePurchase(_) => Collection::Purchases,
            BatchOp::DeleteEvent(_) => Collection::Events,
        }
    }

    /// Event whose seat feed must be republished after the commit.
    pub fn touched_event(&self) -> Option<Uuid> {
        match self {
            BatchOp::PutSeat(seat) => Some(seat.event_id),
            BatchOp::OccupySeat { event_id, .. } | BatchOp::DeleteSeat { event_id, .. } => {
                Some(*event_id)
            }
            BatchOp::DeleteEvent(id) => Some(*id),
            BatchOp::DeletePurchase(_) => None,
        }
    }
}

/// All-or-nothing group of writes.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WriteBatch {
    ops: Vec<BatchOp>,
}

impl WriteBatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, op: BatchOp) -> &mut Self {
        self.ops.push(op);
        self
    }

    pub fn len(&self) -> usize {
        self.ops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    pub fn ops(&self) -> &[BatchOp] {
        &self.ops
    }

    pub fn touched_events(&self) -> Vec<Uuid> {
        let mut ids: Vec<Uuid> = self.ops.iter().filter_map(BatchOp::touched_event).collect();
        ids.sort();
        ids.dedup();
        ids
    }
}

#[async_trait]
pub trait Store: Send + Sync {
    /// Events ordered by `starts_at` descending, optionally truncated.
    async fn list_events(&self, limit: Option<usize>) -> StoreResult<Vec<Event>>;
    async fn get_event(&self, id: Uuid) -> StoreResult<Option<Event>>;
    async fn insert_event(&self, event: &Event) -> StoreResult<()>;
    async fn update_event(&self, event: &Event) -> StoreResult<()>;

    /// Seats of one event ordered by row then number.
    async fn list_seats(&self, event_id: Uuid) -> StoreResult<Vec<Seat>>;
    /// Live feed of full seat snapshots for one event.
    async fn watch_seats(&self, event_id: Uuid) -> StoreResult<SeatFeed>;

    async fn insert_purchase(&self, purchase: &Purchase) -> StoreResult<()>;
    async fn list_purchases(&self) -> StoreResult<Vec<Purchase>>;
    async fn purchases_for_user(&self, user_id: Uuid) -> StoreResult<Vec<Purchase>>;
    async fn purchases_for_event(&self, event_id: Uuid) -> StoreResult<Vec<Purchase>>;

    async fn get_user(&self, id: Uuid) -> StoreResult<Option<UserProfile>>;
    async fn put_user(&self, profile: &UserProfile) -> StoreResult<()>;
    async fn list_users(&self) -> StoreResult<Vec<UserProfile>>;
    async fn update_user_name(&self, id: Uuid, name: &str) -> StoreResult<()>;
    async fn delete_user(&self, id: Uuid) -> StoreResult<()>;

    async fn find_credential(&self, email: &str) -> StoreResult<Option<Credential>>;
    async fn credential_for_user(&self, user_id: Uuid) -> StoreResult<Option<Credential>>;
    async fn insert_credential(&self, credential: &Credential) -> StoreResult<()>;
    async fn update_credential(&self, credential: &Credential) -> StoreResult<()>;

    async fn append_audit(&self, entry: &AuditEntry) -> StoreResult<()>;
    /// Most recent entries first.
    async fn list_audit(&self, limit: usize) -> StoreResult<Vec<AuditEntry>>;

    async fn commit(&self, batch: WriteBatch) -> StoreResult<()>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::seat::provision_grid;

    #[test]
    fn test_batch_reports_touched_events_once() {
        let event_id = Uuid::new_v4();
        let mut batch = WriteBatch::new();
        for seat in provision_grid(event_id) {
            batch.push(BatchOp::PutSeat(seat));
        }
        batch.push(BatchOp::DeletePurchase(Uuid::new_v4()));

        assert_eq!(batch.len(), 51);
        assert_eq!(batch.touched_events(), vec![event_id]);
    }
}

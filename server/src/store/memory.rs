use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap, HashSet};
use tokio::sync::RwLock;
use uuid::Uuid;

use super::{BatchOp, Collection, SeatFeed, SeatFeedHub, Store, StoreError, StoreResult, WriteBatch};
use crate::models::seat::parse_label;
use crate::models::{AuditEntry, Credential, Event, Purchase, Seat, SeatStatus, UserProfile};

#[derive(Default)]
struct Collections {
    events: HashMap<Uuid, Event>,
    /// Keyed by event, then by `(row, number)` so iteration is grid order.
    seats: HashMap<Uuid, BTreeMap<(String, i32), Seat>>,
    purchases: Vec<Purchase>,
    users: HashMap<Uuid, UserProfile>,
    credentials: HashMap<String, Credential>,
    audit: Vec<AuditEntry>,
}

/// Process-local store used when no database is configured and in tests.
#[derive(Default)]
pub struct MemoryStore {
    data: RwLock<Collections>,
    denied: std::sync::RwLock<HashSet<Collection>>,
    feeds: SeatFeedHub,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every write to `collection` fail with `PermissionDenied`.
    pub fn deny_writes(&self, collection: Collection) {
        self.denied
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .insert(collection);
    }

    pub fn allow_writes(&self, collection: Collection) {
        self.denied
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .remove(&collection);
    }

    fn check_writable(&self, collection: Collection) -> StoreResult<()> {
        let denied = self
            .denied
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if denied.contains(&collection) {
            return Err(StoreError::PermissionDenied(collection.name().to_string()));
        }
        Ok(())
    }

    fn snapshot(data: &Collections, event_id: Uuid) -> Vec<Seat> {
        data.seats
            .get(&event_id)
            .map(|grid| grid.values().cloned().collect())
            .unwrap_or_default()
    }

    /// Seats can only be occupied once provisioned, here or earlier in the batch.
    fn check_occupiable(data: &Collections, batch: &WriteBatch) -> StoreResult<()> {
        for (index, op) in batch.ops().iter().enumerate() {
            let BatchOp::OccupySeat { event_id, label, .. } = op else {
                continue;
            };
            let provisioned = parse_label(label)
                .is_some_and(|key| data.seats.get(event_id).is_some_and(|grid| grid.contains_key(&key)));
            let staged = batch.ops()[..index].iter().any(|earlier| {
                matches!(earlier, BatchOp::PutSeat(seat) if seat.event_id == *event_id && seat.label == *label)
            });
            if !provisioned && !staged {
                return Err(StoreError::NotFound(format!("seat {label} of event {event_id}")));
            }
        }
        Ok(())
    }

    fn apply(data: &mut Collections, op: BatchOp) {
        match op {
            BatchOp::PutSeat(seat) => {
                data.seats
                    .entry(seat.event_id)
                    .or_default()
                    .insert((seat.row.clone(), seat.number), seat);
            }
            BatchOp::OccupySeat {
                event_id,
                label,
                user_id,
                purchase_id,
                at,
            } => {
                let Some(key) = parse_label(&label) else {
                    return;
                };
                if let Some(seat) = data.seats.get_mut(&event_id).and_then(|grid| grid.get_mut(&key)) {
                    seat.status = SeatStatus::Occupied;
                    seat.user_id = Some(user_id);
                    seat.purchase_id = Some(purchase_id);
                    seat.updated_at = Some(at);
                }
            }
            BatchOp::DeleteSeat { event_id, label } => {
                if let Some(grid) = data.seats.get_mut(&event_id) {
                    grid.retain(|_, seat| seat.label != label);
                }
            }
            BatchOp::DeletePurchase(id) => data.purchases.retain(|p| p.id != id),
            BatchOp::DeleteEvent(id) => {
                data.events.remove(&id);
                data.seats.remove(&id);
            }
        }
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn list_events(&self, limit: Option<usize>) -> StoreResult<Vec<Event>> {
        let data = self.data.read().await;
        let mut events: Vec<Event> = data.events.values().cloned().collect();
        events.sort_by(|a, b| b.starts_at.cmp(&a.starts_at));
        if let Some(limit) = limit {
            events.truncate(limit);
        }
        Ok(events)
    }

    async fn get_event(&self, id: Uuid) -> StoreResult<Option<Event>> {
        Ok(self.data.read().await.events.get(&id).cloned())
    }

    async fn insert_event(&self, event: &Event) -> StoreResult<()> {
        self.check_writable(Collection::Events)?;
        let mut data = self.data.write().await;
        if data.events.contains_key(&event.id) {
            return Err(StoreError::Conflict(format!("event {}", event.id)));
        }
        data.events.insert(event.id, event.clone());
        Ok(())
    }

    async fn update_event(&self, event: &Event) -> StoreResult<()> {
        self.check_writable(Collection::Events)?;
        let mut data = self.data.write().await;
        match data.events.get_mut(&event.id) {
            Some(existing) => {
                *existing = event.clone();
                Ok(())
            }
            None => Err(StoreError::NotFound(format!("event {}", event.id))),
        }
    }

    async fn list_seats(&self, event_id: Uuid) -> StoreResult<Vec<Seat>> {
        Ok(Self::snapshot(&*self.data.read().await, event_id))
    }

    async fn watch_seats(&self, event_id: Uuid) -> StoreResult<SeatFeed> {
        let data = self.data.read().await;
        Ok(self.feeds.subscribe(event_id, Self::snapshot(&data, event_id)))
    }

    async fn insert_purchase(&self, purchase: &Purchase) -> StoreResult<()> {
        self.check_writable(Collection::Purchases)?;
        let mut data = self.data.write().await;
        if data.purchases.iter().any(|p| p.id == purchase.id) {
            return Err(StoreError::Conflict(format!("purchase {}", purchase.id)));
        }
        data.purchases.push(purchase.clone());
        Ok(())
    }

    async fn list_purchases(&self) -> StoreResult<Vec<Purchase>> {
        Ok(self.data.read().await.purchases.clone())
    }

    async fn purchases_for_user(&self, user_id: Uuid) -> StoreResult<Vec<Purchase>> {
        let data = self.data.read().await;
        Ok(data
            .purchases
            .iter()
            .filter(|p| p.user_id == user_id)
            .cloned()
            .collect())
    }

    async fn purchases_for_event(&self, event_id: Uuid) -> StoreResult<Vec<Purchase>> {
        let data = self.data.read().await;
        Ok(data
            .purchases
            .iter()
            .filter(|p| p.event_id == event_id)
            .cloned()
            .collect())
    }

    async fn get_user(&self, id: Uuid) -> StoreResult<Option<UserProfile>> {
        Ok(self.data.read().await.users.get(&id).cloned())
    }

    async fn put_user(&self, profile: &UserProfile) -> StoreResult<()> {
        self.check_writable(Collection::Users)?;
        self.data
            .write()
            .await
            .users
            .insert(profile.id, profile.clone());
        Ok(())
    }

    async fn list_users(&self) -> StoreResult<Vec<UserProfile>> {
        Ok(self.data.read().await.users.values().cloned().collect())
    }

    async fn update_user_name(&self, id: Uuid, name: &str) -> StoreResult<()> {
        self.check_writable(Collection::Users)?;
        let mut data = self.data.write().await;
        match data.users.get_mut(&id) {
            Some(user) => {
                user.name = name.to_string();
                Ok(())
            }
            None => Err(StoreError::NotFound(format!("user {id}"))),
        }
    }

    async fn delete_user(&self, id: Uuid) -> StoreResult<()> {
        self.check_writable(Collection::Users)?;
        match self.data.write().await.users.remove(&id) {
            Some(_) => Ok(()),
            None => Err(StoreError::NotFound(format!("user {id}"))),
        }
    }

    async fn find_credential(&self, email: &str) -> StoreResult<Option<Credential>> {
        Ok(self.data.read().await.credentials.get(email).cloned())
    }

    async fn credential_for_user(&self, user_id: Uuid) -> StoreResult<Option<Credential>> {
        let data = self.data.read().await;
        Ok(data
            .credentials
            .values()
            .find(|c| c.user_id == user_id)
            .cloned())
    }

    async fn insert_credential(&self, credential: &Credential) -> StoreResult<()> {
        self.check_writable(Collection::Credentials)?;
        let mut data = self.data.write().await;
        if data.credentials.contains_key(&credential.email)
            || data.credentials.values().any(|c| c.user_id == credential.user_id)
        {
            return Err(StoreError::Conflict(credential.email.clone()));
        }
        data.credentials
            .insert(credential.email.clone(), credential.clone());
        Ok(())
    }

    async fn update_credential(&self, credential: &Credential) -> StoreResult<()> {
        self.check_writable(Collection::Credentials)?;
        let mut data = self.data.write().await;
        match data.credentials.get_mut(&credential.email) {
            Some(existing) => {
                *existing = credential.clone();
                Ok(())
            }
            None => Err(StoreError::NotFound(credential.email.clone())),
        }
    }

    async fn append_audit(&self, entry: &AuditEntry) -> StoreResult<()> {
        self.check_writable(Collection::AuditLog)?;
        self.data.write().await.audit.push(entry.clone());
        Ok(())
    }

    async fn list_audit(&self, limit: usize) -> StoreResult<Vec<AuditEntry>> {
        let data = self.data.read().await;
        // Newest insertion first so equal timestamps keep that order.
        let mut entries: Vec<AuditEntry> = data.audit.iter().rev().cloned().collect();
        entries.sort_by(|a, b| b.occurred_at.cmp(&a.occurred_at));
        entries.truncate(limit);
        Ok(entries)
    }

    async fn commit(&self, batch: WriteBatch) -> StoreResult<()> {
        for op in batch.ops() {
            self.check_writable(op.collection())?;
        }

        let touched = batch.touched_events();
        let mut data = self.data.write().await;
        Self::check_occupiable(&data, &batch)?;

        let mut deleted = Vec::new();
        for op in batch.ops {
            if let BatchOp::DeleteEvent(id) = op {
                deleted.push(id);
            }
            Self::apply(&mut data, op);
        }
        // Published under the write lock so feeds see commits in order.
        for event_id in touched {
            if deleted.contains(&event_id) {
                self.feeds.close(event_id);
            } else {
                self.feeds.publish(event_id, Self::snapshot(&data, event_id));
            }
        }
        Ok(())
    }
}

//! Session-scoped key/value cache for short-lived payloads handed between
//! steps of the purchase flow.

use chrono::{DateTime, Duration, Utc};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;
use thiserror::Error;
use tokio::sync::RwLock;
use uuid::Uuid;

/// Seats frozen by "continue to payment".
pub const CHECKOUT_KEY: &str = "currentPurchase";
/// Confirmation of the last completed purchase.
pub const CONFIRMATION_KEY: &str = "lastPurchaseConfirmation";

pub const MAX_KEY_LEN: usize = 128;

#[derive(Debug, Error)]
pub enum HandoffError {
    #[error("Invalid cache key")]
    InvalidKey,

    #[error("Cache key '{0}' is managed by the purchase flow")]
    ReservedKey(String),

    #[error("Cached value could not be encoded: {0}")]
    Encoding(#[from] serde_json::Error),
}

struct Entry {
    value: Value,
    expires_at: DateTime<Utc>,
}

pub struct HandoffCache {
    ttl: Duration,
    entries: RwLock<HashMap<(Uuid, String), Entry>>,
}

fn check_key(key: &str) -> Result<(), HandoffError> {
    let valid = !key.is_empty()
        && key.len() <= MAX_KEY_LEN
        && key
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'));
    if valid {
        Ok(())
    } else {
        Err(HandoffError::InvalidKey)
    }
}

/// Keys only the purchase flow may write or clear.
pub fn is_reserved(key: &str) -> bool {
    key == CHECKOUT_KEY || key == CONFIRMATION_KEY
}

/// Key check for client-driven writes: reserved keys are refused.
pub fn check_client_key(key: &str) -> Result<(), HandoffError> {
    check_key(key)?;
    if is_reserved(key) {
        return Err(HandoffError::ReservedKey(key.to_string()));
    }
    Ok(())
}

impl HandoffCache {
    pub fn new(ttl_secs: i64) -> Self {
        Self {
            ttl: Duration::seconds(ttl_secs),
            entries: RwLock::new(HashMap::new()),
        }
    }

    pub async fn put_value(&self, owner: Uuid, key: &str, value: Value) -> Result<(), HandoffError> {
        check_key(key)?;
        let entry = Entry {
            value,
            expires_at: Utc::now() + self.ttl,
        };
        self.entries
            .write()
            .await
            .insert((owner, key.to_string()), entry);
        Ok(())
    }

    pub async fn get_value(&self, owner: Uuid, key: &str) -> Result<Option<Value>, HandoffError> {
        check_key(key)?;
        let entries = self.entries.read().await;
        Ok(entries
            .get(&(owner, key.to_string()))
            .filter(|entry| entry.expires_at > Utc::now())
            .map(|entry| entry.value.clone()))
    }

    pub async fn remove(&self, owner: Uuid, key: &str) -> Result<bool, HandoffError> {
        check_key(key)?;
        Ok(self
            .entries
            .write()
            .await
            .remove(&(owner, key.to_string()))
            .is_some())
    }

    pub async fn put<T: Serialize>(&self, owner: Uuid, key: &str, value: &T) -> Result<(), HandoffError> {
        self.put_value(owner, key, serde_json::to_value(value)?).await
    }

    /// Unreadable payloads are treated as absent.
    pub async fn get<T: DeserializeOwned>(&self, owner: Uuid, key: &str) -> Result<Option<T>, HandoffError> {
        match self.get_value(owner, key).await? {
            Some(value) => match serde_json::from_value(value) {
                Ok(parsed) => Ok(Some(parsed)),
                Err(e) => {
                    tracing::warn!(%owner, key, error = %e, "Discarding unreadable cached value");
                    Ok(None)
                }
            },
            None => Ok(None),
        }
    }

    /// Drops expired entries and returns how many were removed.
    pub async fn purge_expired(&self) -> usize {
        let now = Utc::now();
        let mut entries = self.entries.write().await;
        let before = entries.len();
        entries.retain(|_, entry| entry.expires_at > now);
        before - entries.len()
    }

    /// Drops everything held for one session.
    pub async fn clear_owner(&self, owner: Uuid) {
        self.entries
            .write()
            .await
            .retain(|(entry_owner, _), _| *entry_owner != owner);
    }
}

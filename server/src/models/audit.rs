use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuditAction {
    EventCreate,
    EventUpdate,
    EventDelete,
    UserUpdate,
    UserDelete,
    PurchasesExport,
}

impl AuditAction {
    pub fn code(&self) -> &'static str {
        match self {
            AuditAction::EventCreate => "EVENT_CREATE",
            AuditAction::EventUpdate => "EVENT_UPDATE",
            AuditAction::EventDelete => "EVENT_DELETE",
            AuditAction::UserUpdate => "USER_UPDATE",
            AuditAction::UserDelete => "USER_DELETE",
            AuditAction::PurchasesExport => "PURCHASES_EXPORT",
        }
    }
}

/// Append-only record of an administrative action.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct AuditEntry {
    pub id: Uuid,
    pub action: String,
    pub actor_id: Uuid,
    pub actor_email: Option<String>,
    pub occurred_at: DateTime<Utc>,
    /// Free-form context (event id, previous price, justification...).
    pub payload: JsonValue,
}

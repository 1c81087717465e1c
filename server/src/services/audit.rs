use chrono::Utc;
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::identity::Session;
use crate::models::{AuditAction, AuditEntry};
use crate::store::Store;

/// Best-effort audit writer. Failures are logged and never reach the caller.
#[derive(Clone)]
pub struct AuditTrail {
    store: Arc<dyn Store>,
}

impl AuditTrail {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    pub async fn record(&self, actor: &Session, action: AuditAction, payload: Value) {
        let entry = AuditEntry {
            id: Uuid::new_v4(),
            action: action.code().to_string(),
            actor_id: actor.user_id,
            actor_email: actor.email.clone(),
            occurred_at: Utc::now(),
            payload,
        };
        match self.store.append_audit(&entry).await {
            Ok(()) => debug!(action = action.code(), actor_id = %actor.user_id, "Audit entry recorded"),
            Err(e) => warn!(
                action = action.code(),
                actor_id = %actor.user_id,
                error = %e,
                "Failed to record audit entry"
            ),
        }
    }
}

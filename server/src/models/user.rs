use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

pub const ANONYMOUS_NAME: &str = "Anónimo";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct UserProfile {
    pub id: Uuid,
    pub email: Option<String>,
    pub name: String,
    pub is_anonymous: bool,
    pub registered_at: DateTime<Utc>,
}

/// Login material owned by the identity provider. Never serialized to clients.
#[derive(Debug, Clone, PartialEq, FromRow)]
pub struct Credential {
    pub user_id: Uuid,
    pub email: String,
    pub display_name: String,
    pub password_hash: String,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UserSortColumn {
    Name,
    Email,
    #[default]
    RegisteredAt,
}

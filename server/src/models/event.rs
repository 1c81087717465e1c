use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct Event {
    pub id: Uuid,
    pub title: String,
    pub genre: String,
    pub venue: String,
    pub starts_at: DateTime<Utc>,
    /// Unit ticket price in CLP.
    pub price: Decimal,
    pub description: String,
    pub image_url: String,
    pub price_change_justification: Option<String>,
    pub last_price_change_by: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Columns the admin table and the catalog can be ordered by.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventSortColumn {
    #[default]
    Title,
    Genre,
    Venue,
    StartsAt,
    Price,
}

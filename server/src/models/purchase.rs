use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

pub const PURCHASE_COMPLETED: &str = "completed";
pub const PAYMENT_METHOD_CARD: &str = "Tarjeta de Crédito";

/// Immutable record of one completed checkout. Event fields are copied at
/// purchase time so later edits to the event do not rewrite history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct Purchase {
    pub id: Uuid,
    pub user_id: Uuid,
    pub user_email: Option<String>,
    pub event_id: Uuid,
    pub event_title: String,
    pub event_date: DateTime<Utc>,
    pub event_venue: String,
    pub unit_price: Decimal,
    pub seats: Vec<String>,
    pub quantity: i32,
    pub total_amount: Decimal,
    pub payment_method: String,
    pub card_last4: String,
    pub card_holder: String,
    pub card_expiry: String,
    pub status: String,
    pub purchased_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PurchaseSortColumn {
    EventTitle,
    EventDate,
    #[default]
    PurchasedAt,
    Quantity,
    TotalAmount,
}

use chrono::{DateTime, Datelike, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use thiserror::Error;
use tracing::{error, info};
use uuid::Uuid;

use super::handoff::{HandoffCache, CHECKOUT_KEY, CONFIRMATION_KEY};
use super::reservation::CheckoutHandoff;
use crate::identity::Session;
use crate::models::purchase::{PAYMENT_METHOD_CARD, PURCHASE_COMPLETED};
use crate::models::Purchase;
use crate::store::{BatchOp, Store, StoreError, WriteBatch};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum PaymentValidationError {
    #[error("Card number must have between 13 and 19 digits")]
    CardNumber,

    #[error("Cardholder name must have at least 2 characters")]
    CardHolder,

    #[error("Expiry date must use the MM/YY format")]
    ExpiryFormat,

    #[error("The card has expired")]
    Expired,

    #[error("CVC must have 3 or 4 digits")]
    Cvc,
}

#[derive(Debug, Error)]
pub enum CheckoutError {
    #[error("{0}")]
    InvalidPayment(#[from] PaymentValidationError),

    #[error("There are no seats to pay for")]
    EmptySelection,

    #[error("Sign in with a registered account to complete the purchase")]
    SignInRequired,

    #[error("You do not have permission to complete this purchase: {0}")]
    PermissionDenied(String),

    #[error("The purchase could not be completed: {0}")]
    Failed(String),

    #[error("Confirmation could not be prepared: {0}")]
    Encoding(String),
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PaymentForm {
    #[serde(default)]
    pub card_number: String,
    #[serde(default)]
    pub card_holder: String,
    #[serde(default)]
    pub expiry: String,
    #[serde(default)]
    pub cvc: String,
}

fn all_digits(value: &str) -> bool {
    !value.is_empty() && value.chars().all(|c| c.is_ascii_digit())
}

/// Parses `MM/YY` into `(20YY, MM)`.
fn parse_expiry(raw: &str) -> Option<(i32, u32)> {
    let (month, year) = raw.split_once('/')?;
    if month.len() != 2 || year.len() != 2 || !all_digits(month) || !all_digits(year) {
        return None;
    }
    let month: u32 = month.parse().ok()?;
    if !(1..=12).contains(&month) {
        return None;
    }
    let year: i32 = year.parse().ok()?;
    Some((2000 + year, month))
}

impl PaymentForm {
    pub fn card_digits(&self) -> String {
        self.card_number.chars().filter(|c| !c.is_whitespace()).collect()
    }

    /// First failing rule wins.
    pub fn validate(&self, today: NaiveDate) -> Result<(), PaymentValidationError> {
        let digits = self.card_digits();
        if !all_digits(&digits) || !(13..=19).contains(&digits.len()) {
            return Err(PaymentValidationError::CardNumber);
        }
        if self.card_holder.trim().chars().count() < 2 {
            return Err(PaymentValidationError::CardHolder);
        }
        let (year, month) =
            parse_expiry(self.expiry.trim()).ok_or(PaymentValidationError::ExpiryFormat)?;
        if (year, month) < (today.year(), today.month()) {
            return Err(PaymentValidationError::Expired);
        }
        let cvc = self.cvc.trim();
        if !all_digits(cvc) || !(3..=4).contains(&cvc.len()) {
            return Err(PaymentValidationError::Cvc);
        }
        Ok(())
    }

    pub fn last4(&self) -> String {
        let digits: Vec<char> = self.card_digits().chars().collect();
        digits[digits.len().saturating_sub(4)..].iter().collect()
    }
}

/// Payload encoded into the ticket's scannable code.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScanPayload {
    pub purchase_id: Uuid,
    pub user_id: Uuid,
    pub event_id: Uuid,
    pub seats: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Confirmation {
    #[serde(flatten)]
    pub purchase: Purchase,
    pub purchase_id: Uuid,
    pub qr_content: String,
}

pub struct Checkout<'a> {
    store: &'a dyn Store,
    handoff: &'a HandoffCache,
}

impl<'a> Checkout<'a> {
    pub fn new(store: &'a dyn Store, handoff: &'a HandoffCache) -> Self {
        Self { store, handoff }
    }

    pub async fn current(&self, session: &Session) -> Result<Option<CheckoutHandoff>, CheckoutError> {
        let pending: Option<CheckoutHandoff> = self
            .handoff
            .get(session.token_id, CHECKOUT_KEY)
            .await
            .map_err(|e| CheckoutError::Encoding(e.to_string()))?;
        Ok(pending.filter(|p| p.user_id == session.user_id))
    }

    pub async fn last_confirmation(&self, session: &Session) -> Result<Option<Confirmation>, CheckoutError> {
        self.handoff
            .get(session.token_id, CONFIRMATION_KEY)
            .await
            .map_err(|e| CheckoutError::Encoding(e.to_string()))
    }

    pub async fn submit(
        &self,
        session: &Session,
        form: &PaymentForm,
        now: DateTime<Utc>,
    ) -> Result<Confirmation, CheckoutError> {
        if session.is_anonymous {
            return Err(CheckoutError::SignInRequired);
        }
        form.validate(now.date_naive())?;

        let pending = self
            .current(session)
            .await?
            .ok_or(CheckoutError::EmptySelection)?;
        let seats: Vec<String> = pending
            .seats
            .iter()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        if seats.is_empty() {
            return Err(CheckoutError::EmptySelection);
        }

        let quantity = seats.len();
        let purchase = Purchase {
            id: Uuid::new_v4(),
            user_id: session.user_id,
            user_email: session.email.clone(),
            event_id: pending.event_id,
            event_title: pending.event_title,
            event_date: pending.event_date,
            event_venue: pending.event_venue,
            unit_price: pending.unit_price,
            seats: seats.clone(),
            quantity: quantity as i32,
            total_amount: pending.unit_price * rust_decimal::Decimal::from(quantity as u64),
            payment_method: PAYMENT_METHOD_CARD.to_string(),
            card_last4: form.last4(),
            card_holder: form.card_holder.trim().to_string(),
            card_expiry: form.expiry.trim().to_string(),
            status: PURCHASE_COMPLETED.to_string(),
            purchased_at: now,
        };

        self.store
            .insert_purchase(&purchase)
            .await
            .map_err(|e| match e {
                StoreError::PermissionDenied(msg) => CheckoutError::PermissionDenied(msg),
                other => CheckoutError::Failed(other.to_string()),
            })?;

        let mut batch = WriteBatch::new();
        for label in &seats {
            batch.push(BatchOp::OccupySeat {
                event_id: purchase.event_id,
                label: label.clone(),
                user_id: purchase.user_id,
                purchase_id: purchase.id,
                at: now,
            });
        }
        if let Err(e) = self.store.commit(batch).await {
            // The purchase record stays; nothing reconciles it with the seats.
            error!(
                purchase_id = %purchase.id,
                event_id = %purchase.event_id,
                ?seats,
                error = %e,
                "Purchase recorded but seats were not marked occupied"
            );
            return Err(CheckoutError::Failed(e.to_string()));
        }

        let scan = ScanPayload {
            purchase_id: purchase.id,
            user_id: purchase.user_id,
            event_id: purchase.event_id,
            seats,
        };
        let qr_content = serde_json::to_string(&scan).map_err(|e| CheckoutError::Encoding(e.to_string()))?;
        let confirmation = Confirmation {
            purchase_id: purchase.id,
            purchase,
            qr_content,
        };

        self.handoff
            .put(session.token_id, CONFIRMATION_KEY, &confirmation)
            .await
            .map_err(|e| CheckoutError::Encoding(e.to_string()))?;
        self.handoff
            .remove(session.token_id, CHECKOUT_KEY)
            .await
            .map_err(|e| CheckoutError::Encoding(e.to_string()))?;

        info!(
            purchase_id = %confirmation.purchase_id,
            event_id = %confirmation.purchase.event_id,
            quantity = confirmation.purchase.quantity,
            "Purchase completed"
        );
        Ok(confirmation)
    }
}

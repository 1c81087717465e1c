use serde::Serialize;
use uuid::Uuid;

use crate::identity::{IdentityError, IdentityProvider, Session};
use crate::models::{Purchase, PurchaseSortColumn, SortDirection, UserProfile};
use crate::store::Store;

#[derive(Debug, Serialize)]
pub struct AccountOverview {
    pub profile: UserProfile,
    pub purchases: Vec<Purchase>,
}

pub fn sort_purchases(purchases: &mut [Purchase], column: PurchaseSortColumn, direction: SortDirection) {
    purchases.sort_by(|a, b| {
        let ordering = match column {
            PurchaseSortColumn::EventTitle => a
                .event_title
                .to_lowercase()
                .cmp(&b.event_title.to_lowercase()),
            PurchaseSortColumn::EventDate => a.event_date.cmp(&b.event_date),
            PurchaseSortColumn::PurchasedAt => a.purchased_at.cmp(&b.purchased_at),
            PurchaseSortColumn::Quantity => a.quantity.cmp(&b.quantity),
            PurchaseSortColumn::TotalAmount => a.total_amount.cmp(&b.total_amount),
        };
        direction.apply(ordering)
    });
}

/// Loads the caller's profile, falling back to the session when no profile
/// record exists yet.
pub async fn overview(
    store: &dyn Store,
    session: &Session,
    column: PurchaseSortColumn,
    direction: SortDirection,
) -> Result<AccountOverview, IdentityError> {
    let profile = match store.get_user(session.user_id).await? {
        Some(profile) => profile,
        None => UserProfile {
            id: session.user_id,
            email: session.email.clone(),
            name: session.name.clone(),
            is_anonymous: session.is_anonymous,
            registered_at: chrono::Utc::now(),
        },
    };
    let mut purchases = store.purchases_for_user(session.user_id).await?;
    sort_purchases(&mut purchases, column, direction);
    Ok(AccountOverview { profile, purchases })
}

/// Renames the user in both the identity provider and the profile record.
pub async fn rename(
    store: &dyn Store,
    identity: &dyn IdentityProvider,
    user_id: Uuid,
    name: &str,
) -> Result<(), IdentityError> {
    let name = name.trim();
    if name.is_empty() {
        return Err(IdentityError::MissingField("name"));
    }
    identity.update_display_name(user_id, name).await?;
    store.update_user_name(user_id, name).await?;
    tracing::info!(%user_id, "Display name updated");
    Ok(())
}

use rust_decimal::Decimal;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};

use crate::models::Purchase;
use crate::store::{Store, StoreResult};

pub const UNTITLED_EVENT: &str = "Evento sin título";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EventSales {
    pub title: String,
    pub tickets: i64,
    pub revenue: Decimal,
}

/// Labels and values ready for a chart.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Series<T> {
    pub labels: Vec<String>,
    pub data: Vec<T>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Statistics {
    pub total_events: usize,
    pub total_users: usize,
    pub tickets_sold: i64,
    pub total_revenue: Decimal,
    /// Sorted by tickets, most first.
    pub top_events: Vec<EventSales>,
    pub tickets_by_event: Series<i64>,
    /// Keyed `YYYY-MM`, oldest first.
    pub revenue_by_month: Series<Decimal>,
}

impl Statistics {
    pub fn compute(total_events: usize, total_users: usize, purchases: &[Purchase]) -> Self {
        let mut tickets_sold = 0i64;
        let mut total_revenue = Decimal::ZERO;
        let mut per_event: Vec<EventSales> = Vec::new();
        let mut index: HashMap<String, usize> = HashMap::new();
        let mut by_month: BTreeMap<String, Decimal> = BTreeMap::new();

        for purchase in purchases {
            let quantity = i64::from(purchase.quantity.max(0));
            tickets_sold += quantity;
            total_revenue += purchase.total_amount;

            let title = if purchase.event_title.trim().is_empty() {
                UNTITLED_EVENT.to_string()
            } else {
                purchase.event_title.clone()
            };
            let slot = *index.entry(title.clone()).or_insert_with(|| {
                per_event.push(EventSales {
                    title,
                    tickets: 0,
                    revenue: Decimal::ZERO,
                });
                per_event.len() - 1
            });
            per_event[slot].tickets += quantity;
            per_event[slot].revenue += purchase.total_amount;

            let month = purchase.purchased_at.format("%Y-%m").to_string();
            *by_month.entry(month).or_insert(Decimal::ZERO) += purchase.total_amount;
        }

        let tickets_by_event = Series {
            labels: per_event.iter().map(|e| e.title.clone()).collect(),
            data: per_event.iter().map(|e| e.tickets).collect(),
        };
        let mut top_events = per_event;
        top_events.sort_by(|a, b| b.tickets.cmp(&a.tickets));

        let (labels, data) = by_month.into_iter().unzip();

        Self {
            total_events,
            total_users,
            tickets_sold,
            total_revenue,
            top_events,
            tickets_by_event,
            revenue_by_month: Series { labels, data },
        }
    }

    pub async fn gather(store: &dyn Store) -> StoreResult<Self> {
        let events = store.list_events(None).await?;
        let users = store.list_users().await?;
        let purchases = store.list_purchases().await?;
        Ok(Self::compute(events.len(), users.len(), &purchases))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use uuid::Uuid;

    fn purchase(title: &str, quantity: i32, total: i64, year: i32, month: u32) -> Purchase {
        Purchase {
            id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            user_email: None,
            event_id: Uuid::new_v4(),
            event_title: title.into(),
            event_date: Utc::now(),
            event_venue: String::new(),
            unit_price: Decimal::ZERO,
            seats: vec![],
            quantity,
            total_amount: Decimal::from(total),
            payment_method: String::new(),
            card_last4: String::new(),
            card_holder: String::new(),
            card_expiry: String::new(),
            status: "completed".into(),
            purchased_at: Utc.with_ymd_and_hms(year, month, 10, 12, 0, 0).unwrap(),
        }
    }

    #[test]
    fn test_aggregates_totals_top_events_and_months() {
        let purchases = vec![
            purchase("Hamlet", 2, 30000, 2025, 3),
            purchase("Yerma", 5, 50000, 2025, 1),
            purchase("Hamlet", 1, 15000, 2025, 1),
            purchase("", 1, 1000, 2024, 12),
        ];
        let stats = Statistics::compute(4, 9, &purchases);

        assert_eq!(stats.total_events, 4);
        assert_eq!(stats.total_users, 9);
        assert_eq!(stats.tickets_sold, 9);
        assert_eq!(stats.total_revenue, Decimal::from(96000));

        let top: Vec<(&str, i64)> = stats.top_events.iter().map(|e| (e.title.as_str(), e.tickets)).collect();
        assert_eq!(top, vec![("Yerma", 5), ("Hamlet", 3), (UNTITLED_EVENT, 1)]);
        assert_eq!(stats.tickets_by_event.labels, vec!["Hamlet", "Yerma", UNTITLED_EVENT]);

        assert_eq!(stats.revenue_by_month.labels, vec!["2024-12", "2025-01", "2025-03"]);
        assert_eq!(
            stats.revenue_by_month.data,
            vec![Decimal::from(1000), Decimal::from(65000), Decimal::from(30000)]
        );
    }

    #[test]
    fn test_no_purchases() {
        let stats = Statistics::compute(0, 0, &[]);
        assert_eq!(stats.tickets_sold, 0);
        assert!(stats.top_events.is_empty());
        assert!(stats.revenue_by_month.labels.is_empty());
    }
}

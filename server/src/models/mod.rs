use serde::Deserialize;
use std::cmp::Ordering;

pub mod audit;
pub mod event;
pub mod purchase;
pub mod seat;
pub mod user;

pub use audit::{AuditAction, AuditEntry};
pub use event::{Event, EventSortColumn};
pub use purchase::{Purchase, PurchaseSortColumn};
pub use seat::{Seat, SeatStatus};
pub use user::{Credential, UserProfile, UserSortColumn};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    #[default]
    Asc,
    Desc,
}

impl SortDirection {
    pub fn apply(&self, ordering: Ordering) -> Ordering {
        match self {
            SortDirection::Asc => ordering,
            SortDirection::Desc => ordering.reverse(),
        }
    }
}

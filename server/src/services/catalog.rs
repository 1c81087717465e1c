use uuid::Uuid;

use crate::models::{Event, EventSortColumn, SortDirection};
use crate::store::{Store, StoreResult};

/// Size of the home-page carousel.
pub const FEATURED_LIMIT: usize = 3;

/// Case-insensitive substring match over title, genre and venue.
/// `term` must already be lower-cased.
pub fn matches(event: &Event, term: &str) -> bool {
    [&event.title, &event.genre, &event.venue]
        .iter()
        .any(|field| field.to_lowercase().contains(term))
}

/// Filters an already fetched list. A blank term keeps everything.
pub fn search(events: Vec<Event>, term: &str) -> Vec<Event> {
    let term = term.trim().to_lowercase();
    if term.is_empty() {
        return events;
    }
    events.into_iter().filter(|e| matches(e, &term)).collect()
}

pub fn sort_events(events: &mut [Event], column: EventSortColumn, direction: SortDirection) {
    events.sort_by(|a, b| {
        let ordering = match column {
            EventSortColumn::Title => a.title.to_lowercase().cmp(&b.title.to_lowercase()),
            EventSortColumn::Genre => a.genre.to_lowercase().cmp(&b.genre.to_lowercase()),
            EventSortColumn::Venue => a.venue.to_lowercase().cmp(&b.venue.to_lowercase()),
            EventSortColumn::StartsAt => a.starts_at.cmp(&b.starts_at),
            EventSortColumn::Price => a.price.cmp(&b.price),
        };
        direction.apply(ordering)
    });
}

pub struct Catalog<'a> {
    store: &'a dyn Store,
}

impl<'a> Catalog<'a> {
    pub fn new(store: &'a dyn Store) -> Self {
        Self { store }
    }

    /// Every event, most recent date first.
    pub async fn list(&self) -> StoreResult<Vec<Event>> {
        self.store.list_events(None).await
    }

    pub async fn featured(&self) -> StoreResult<Vec<Event>> {
        self.store.list_events(Some(FEATURED_LIMIT)).await
    }

    pub async fn find(&self, id: Uuid) -> StoreResult<Option<Event>> {
        self.store.get_event(id).await
    }

    pub async fn search(&self, term: &str) -> StoreResult<Vec<Event>> {
        Ok(search(self.list().await?, term))
    }
}

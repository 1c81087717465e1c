use futures::Stream;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::watch;
use tokio_stream::wrappers::WatchStream;
use uuid::Uuid;

use crate::models::Seat;

pub type SeatSnapshot = Arc<Vec<Seat>>;

/// Subscription to the full seat state of one event.
///
/// Each item is the complete current snapshot, never a delta. Slow consumers
/// skip intermediate snapshots and only observe the latest one. The feed ends
/// when the event is deleted.
pub struct SeatFeed {
    rx: watch::Receiver<SeatSnapshot>,
    primed: bool,
}

impl SeatFeed {
    pub fn current(&self) -> SeatSnapshot {
        self.rx.borrow().clone()
    }

    /// Yields the current snapshot first, then one per change.
    pub async fn next(&mut self) -> Option<SeatSnapshot> {
        if !self.primed {
            self.primed = true;
            return Some(self.rx.borrow_and_update().clone());
        }
        self.rx.changed().await.ok()?;
        Some(self.rx.borrow_and_update().clone())
    }

    pub fn into_stream(self) -> impl Stream<Item = SeatSnapshot> {
        WatchStream::new(self.rx)
    }
}

/// Fan-out point shared by the store backends.
#[derive(Default)]
pub struct SeatFeedHub {
    channels: Mutex<HashMap<Uuid, watch::Sender<SeatSnapshot>>>,
}

impl SeatFeedHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// `loaded` seeds the channel only when no feed is open for this event yet.
    pub fn subscribe(&self, event_id: Uuid, loaded: Vec<Seat>) -> SeatFeed {
        let mut channels = self
            .channels
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let rx = match channels.get(&event_id) {
            Some(tx) => tx.subscribe(),
            None => {
                let (tx, rx) = watch::channel(Arc::new(loaded));
                channels.insert(event_id, tx);
                rx
            }
        };
        SeatFeed { rx, primed: false }
    }

    /// Whether any feed is open for the event.
    pub fn is_watched(&self, event_id: Uuid) -> bool {
        self.channels
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .get(&event_id)
            .is_some_and(|tx| tx.receiver_count() > 0)
    }

    /// Sends `seats` to open feeds. Events nobody watches keep no channel;
    /// the next `subscribe` loads fresh seats instead.
    pub fn publish(&self, event_id: Uuid, seats: Vec<Seat>) {
        let mut channels = self
            .channels
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let Some(tx) = channels.get(&event_id) else {
            return;
        };
        if tx.receiver_count() == 0 {
            channels.remove(&event_id);
            return;
        }
        tx.send_replace(Arc::new(seats));
        tracing::debug!(%event_id, "Seat snapshot published");
    }

    #[cfg(test)]
    fn channel_count(&self) -> usize {
        self.channels
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .len()
    }

    /// Publishes an empty grid and drops the channel so every feed ends.
    pub fn close(&self, event_id: Uuid) {
        let mut channels = self
            .channels
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if let Some(tx) = channels.remove(&event_id) {
            tx.send_replace(Arc::new(Vec::new()));
        }
    }
}

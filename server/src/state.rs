use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::identity::{IdentityProvider, LocalIdentity, SessionChange};
use crate::services::audit::AuditTrail;
use crate::services::handoff::HandoffCache;
use crate::services::prediction::PredictionClient;
use crate::services::reservation::ReservationDesk;
use crate::services::storage::{LocalObjectStorage, ObjectStorage};
use crate::store::Store;

const HANDOFF_PURGE_INTERVAL: Duration = Duration::from_secs(60);

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub store: Arc<dyn Store>,
    pub identity: Arc<dyn IdentityProvider>,
    pub reservations: Arc<ReservationDesk>,
    pub handoff: Arc<HandoffCache>,
    pub storage: Arc<dyn ObjectStorage>,
    pub prediction: Arc<PredictionClient>,
    pub audit: AuditTrail,
}

impl AppState {
    /// Wires the local identity, storage and prediction client around `store`.
    pub fn new(config: Config, store: Arc<dyn Store>) -> Result<Self, reqwest::Error> {
        let identity = LocalIdentity::new(store.clone(), config.jwt_secret.clone(), config.session_ttl_secs);
        let storage = LocalObjectStorage::new(config.upload_dir.clone(), config.public_asset_base_url.clone());
        let prediction = PredictionClient::new(config.prediction_api_url.clone(), config.prediction_timeout)?;

        Ok(Self {
            handoff: Arc::new(HandoffCache::new(config.handoff_ttl_secs)),
            reservations: Arc::new(ReservationDesk::new()),
            identity: Arc::new(identity),
            storage: Arc::new(storage),
            prediction: Arc::new(prediction),
            audit: AuditTrail::new(store.clone()),
            config: Arc::new(config),
            store,
        })
    }

    /// Purges expired handoff entries, idle seat selections and lapsed
    /// revocations, and forgets the selections and cached values of every
    /// session that signs out.
    pub fn spawn_background_tasks(&self) {
        let handoff = Arc::clone(&self.handoff);
        let reservations = Arc::clone(&self.reservations);
        let identity = Arc::clone(&self.identity);
        let idle = chrono::Duration::seconds(self.config.handoff_ttl_secs);
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(HANDOFF_PURGE_INTERVAL);
            loop {
                interval.tick().await;
                let now = Utc::now();
                let purged = handoff.purge_expired().await;
                let idle_selections = reservations.purge_idle(now - idle).await;
                let revocations = identity.prune_revocations(now);
                if purged + idle_selections + revocations > 0 {
                    debug!(purged, idle_selections, revocations, "Expired session state purged");
                }
            }
        });

        let mut changes = self.identity.subscribe();
        let reservations = Arc::clone(&self.reservations);
        let handoff = Arc::clone(&self.handoff);
        tokio::spawn(async move {
            loop {
                match changes.recv().await {
                    Ok(SessionChange::SignedOut { user_id, token_id }) => {
                        reservations.release_owner(token_id).await;
                        handoff.clear_owner(token_id).await;
                        info!(%user_id, "Session state released after sign-out");
                    }
                    Ok(_) => {}
                    Err(RecvError::Lagged(skipped)) => {
                        warn!(skipped, "Session observer lagging, skipped changes");
                    }
                    Err(RecvError::Closed) => break,
                }
            }
        });
    }
}

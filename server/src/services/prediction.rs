//! Client for the external occupancy predictor. Every failure reads as
//! "no prediction".

use reqwest::Client;
use rust_decimal::prelude::ToPrimitive;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::warn;

use crate::models::Event;

#[derive(Debug, Serialize)]
pub struct PredictionRequest {
    pub title: String,
    pub unit_price: f64,
    /// `YYYY-MM-DDTHH:MM:SS`, no fractional seconds.
    pub iso_datetime: String,
}

#[derive(Debug, Deserialize)]
struct PredictionResponse {
    occupancy_predicted_pct: Option<f64>,
}

#[derive(Clone, Debug)]
pub struct PredictionClient {
    http_client: Client,
    endpoint: Option<String>,
}

impl PredictionClient {
    pub fn new(endpoint: Option<String>, timeout: Duration) -> Result<Self, reqwest::Error> {
        let http_client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            http_client,
            endpoint: endpoint.filter(|url| !url.trim().is_empty()),
        })
    }

    pub fn disabled() -> Self {
        Self {
            http_client: Client::new(),
            endpoint: None,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.endpoint.is_some()
    }

    pub fn request_for(event: &Event) -> Option<PredictionRequest> {
        if event.title.trim().is_empty() {
            return None;
        }
        Some(PredictionRequest {
            title: event.title.clone(),
            unit_price: event.price.to_f64().unwrap_or(0.0),
            iso_datetime: event.starts_at.format("%Y-%m-%dT%H:%M:%S").to_string(),
        })
    }

    /// Predicted occupancy percentage, or `None` when unavailable.
    pub async fn predict(&self, event: &Event) -> Option<f64> {
        let endpoint = self.endpoint.as_deref()?;
        let body = Self::request_for(event)?;

        let response = match self.http_client.post(endpoint).json(&body).send().await {
            Ok(response) => response,
            Err(e) => {
                warn!(event_id = %event.id, error = %e, "Prediction request failed");
                return None;
            }
        };
        if !response.status().is_success() {
            warn!(event_id = %event.id, status = %response.status(), "Prediction service returned an error");
            return None;
        }
        match response.json::<PredictionResponse>().await {
            Ok(parsed) => parsed.occupancy_predicted_pct.filter(|pct| pct.is_finite()),
            Err(e) => {
                warn!(event_id = %event.id, error = %e, "Malformed prediction response");
                None
            }
        }
    }
}

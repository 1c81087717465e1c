use axum::response::{IntoResponse, Response};
use serde::Serialize;

use crate::utils::response::success;

pub mod account;
pub mod admin;
pub mod auth;
pub mod cache;
pub mod catalog;
pub mod checkout;
pub mod reservation;

#[derive(Serialize)]
struct HealthPayload {
    status: &'static str,
    service: &'static str,
}

pub async fn health_check() -> Response {
    let payload = HealthPayload {
        status: "ok",
        service: "dramaticket-api",
    };

    success(payload, "Health check successful").into_response()
}

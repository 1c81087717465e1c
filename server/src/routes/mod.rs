use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post, put};
use axum::Router;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;

use crate::config::{create_cors_layer, create_security_headers_layer};
use crate::handlers::{
    account, admin, auth, cache, catalog, checkout, health_check, reservation,
};
use crate::state::AppState;

fn auth_routes() -> Router<AppState> {
    Router::new()
        .route("/anonymous", post(auth::sign_in_anonymously))
        .route("/register", post(auth::register))
        .route("/login", post(auth::login))
        .route("/logout", post(auth::logout))
        .route("/password-reset", post(auth::request_password_reset))
        .route("/password-reset/confirm", post(auth::confirm_password_reset))
        .route("/session", get(auth::current_session))
}

fn event_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(catalog::list_events))
        .route("/featured", get(catalog::featured_events))
        .route("/search", get(catalog::search_events))
        .route("/:event_id", get(catalog::get_event))
        .route("/:event_id/seats", get(reservation::seat_map))
        .route("/:event_id/seats/live", get(reservation::live_seat_map))
        .route("/:event_id/seats/continue", post(reservation::continue_to_payment))
        .route("/:event_id/seats/:label/toggle", post(reservation::toggle_seat))
}

fn admin_routes() -> Router<AppState> {
    Router::new()
        .route("/events", get(admin::list_events).post(admin::create_event))
        .route(
            "/events/:event_id",
            get(admin::get_event)
                .put(admin::update_event)
                .delete(admin::delete_event),
        )
        .route(
            "/images",
            post(admin::upload_image).layer(DefaultBodyLimit::max(admin::MAX_IMAGE_BYTES)),
        )
        .route("/users", get(admin::list_users))
        .route(
            "/users/:user_id",
            put(admin::update_user).delete(admin::delete_user),
        )
        .route("/stats", get(admin::statistics))
        .route("/purchases/export", get(admin::export_purchases))
        .route("/audit", get(admin::audit_log))
}

pub fn create_routes(state: AppState) -> Router {
    let uploads = ServeDir::new(state.config.upload_dir.clone());

    Router::new()
        .route("/health", get(health_check))
        .nest("/api/auth", auth_routes())
        .nest("/api/events", event_routes())
        .route(
            "/api/checkout",
            get(checkout::current_checkout).post(checkout::submit_payment),
        )
        .route("/api/confirmation", get(checkout::last_confirmation))
        .route("/api/account", get(account::my_account))
        .route("/api/account/profile", put(account::update_profile))
        .route(
            "/api/cache/:key",
            get(cache::get_entry)
                .put(cache::put_entry)
                .delete(cache::delete_entry),
        )
        .nest("/api/admin", admin_routes())
        .nest_service("/uploads", uploads)
        .layer(create_security_headers_layer(state.config.is_production))
        .layer(create_cors_layer(state.config.cors_allowed_origins.as_deref()))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

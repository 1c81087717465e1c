use anyhow::Context;
use axum::Router;
use dotenvy::dotenv;
use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

use dramaticket_server::config::Config;
use dramaticket_server::routes::create_routes;
use dramaticket_server::state::AppState;
use dramaticket_server::store::{MemoryStore, PgStore, Store};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();
    let config = Config::from_env().context("Invalid configuration")?;

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(&config.log_filter))
        .init();

    let store: Arc<dyn Store> = match &config.database_url {
        Some(database_url) => {
            let pool = PgPoolOptions::new()
                .max_connections(5)
                .connect(database_url)
                .await
                .context("Failed to connect to database")?;
            tracing::info!("Successfully connected to database");

            sqlx::migrate!()
                .run(&pool)
                .await
                .context("Failed to run migrations")?;
            tracing::info!("Migrations run successfully");

            Arc::new(PgStore::new(pool))
        }
        None => {
            tracing::warn!("DATABASE_URL not set, data lives in memory only");
            Arc::new(MemoryStore::new())
        }
    };

    if config.admin_user_id.is_none() {
        tracing::warn!("ADMIN_USER_ID not set, the back-office is unreachable");
    }

    let addr = config.bind_addr;
    let state = AppState::new(config, store).context("Failed to build the HTTP client")?;
    if !state.prediction.is_enabled() {
        tracing::warn!("PREDICTION_API_URL not set, occupancy predictions disabled");
    }
    state.spawn_background_tasks();

    let app: Router = create_routes(state);

    tracing::info!(%addr, "Server running");
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;

    axum::serve(listener, app).await.context("Server failed")?;
    Ok(())
}

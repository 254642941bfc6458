//! Project Sync Service
//!
//! Keeps a client's project list consistent across a per-owner collection and
//! a shared team collection, falling back to local storage when no remote
//! backend is configured, and serves the result to the dashboard UI.

mod api;
mod config;
mod db;
mod errors;
mod models;
mod remote;
mod store;
mod sync;

use std::sync::Arc;

use axum::{
    routing::{get, patch, post, put},
    Router,
};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use config::Config;
use models::Identity;
use store::ProjectStore;

/// Application state shared across all handlers.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn ProjectStore>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load configuration
    let config = Config::from_env()?;

    // Initialize logging
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting Project Sync Service");
    tracing::info!("Local database path: {:?}", config.db_path);
    tracing::info!("Bind address: {}", config.bind_addr);

    if config.remote_url.is_some() && !config.remote_configured() {
        tracing::warn!("PSYNC_REMOTE_URL looks like a placeholder; running in local mode");
    }

    // Select the store implementation once for the lifetime of the process
    let store = store::open_store(&config).await?;
    tracing::info!("Project store mode: {:?}", store.mode());

    if let Some(uid) = &config.user_id {
        tracing::info!("Signing in as {}", uid);
        store.set_identity(Some(Identity::new(uid.clone()))).await;
    }

    let state = AppState {
        store: store.clone(),
    };

    // Build router
    let app = create_router(state);

    // Start server
    let listener = tokio::net::TcpListener::bind(&config.bind_addr).await?;
    tracing::info!("Server listening on {}", config.bind_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    store.shutdown().await;
    tracing::info!("Project store shut down");

    Ok(())
}

/// Resolves on Ctrl+C.
async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}

/// Create the application router with all routes.
pub fn create_router(state: AppState) -> Router {
    // CORS configuration
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let api_routes = Router::new()
        // State and session
        .route("/state", get(api::get_state))
        .route("/session", put(api::sign_in).delete(api::sign_out))
        .route("/active", put(api::set_active))
        // Projects
        .route("/projects", post(api::create_project))
        .route(
            "/projects/{id}",
            patch(api::update_project).delete(api::delete_project),
        )
        .route("/projects/{id}/name", put(api::rename_project))
        .route(
            "/checklist/{item_key}/toggle",
            post(api::toggle_check_item),
        );

    // Health check
    let health_routes = Router::new().route("/health", get(health_check));

    Router::new()
        .nest("/api", api_routes)
        .merge(health_routes)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Health check endpoint.
async fn health_check() -> &'static str {
    "OK"
}

#[cfg(test)]
mod tests;

mod config;
mod db;
mod error;
mod handlers;
mod middleware;
mod models;
mod services;
mod webauthn;

use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::Config;
use crate::db::{ChallengeCache, Database, HandoffStore};

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub db: Database,
    pub config: Arc<Config>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "nestegg=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting NestEgg...");

    // Load configuration
    let config = Config::load()?;
    let config = Arc::new(config);
    tracing::info!("Configuration loaded");

    // Initialize database
    let db = Database::new(&config.database.path).await?;
    db.run_migrations().await?;
    tracing::info!("Database initialized");

    // Reap expired ceremony state in the background. Expiry is enforced at
    // consumption time regardless; this only keeps the tables small.
    let reaper_db = db.clone();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(std::time::Duration::from_secs(600));
        loop {
            interval.tick().await;
            if let Err(e) = ChallengeCache::purge_expired(&reaper_db).await {
                tracing::error!("Challenge cleanup failed: {:?}", e);
            }
            // Keep lapsed hand-off sessions observable for an hour so late
            // pollers still see a terminal status
            if let Err(e) = HandoffStore::purge_stale(&reaper_db, 3600).await {
                tracing::error!("Hand-off cleanup failed: {:?}", e);
            }
        }
    });

    // Create app state
    let state = AppState {
        db,
        config: config.clone(),
    };

    // Build router
    let app = create_router(state);

    // Start server
    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Server listening on {}", addr);

    axum::serve(listener, app).await?;

    Ok(())
}

fn create_router(state: AppState) -> Router {
    // CORS configuration
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    // Public routes (no auth required)
    let public_routes = Router::new()
        .route("/auth/register", post(handlers::auth::register))
        .route("/auth/login", post(handlers::auth::login))
        // Passkey ceremonies
        .route("/passkey/register/begin", post(handlers::passkey::register_begin))
        .route("/passkey/register/finish", post(handlers::passkey::register_finish))
        .route(
            "/passkey/authenticate/begin",
            post(handlers::passkey::authenticate_begin),
        )
        .route(
            "/passkey/authenticate/finish",
            post(handlers::passkey::authenticate_finish),
        )
        // Cross-device hand-off
        .route("/passkey/session", post(handlers::handoff::create_session))
        .route("/passkey/session/:id", get(handlers::handoff::get_session))
        .route(
            "/passkey/session/:id/complete",
            post(handlers::handoff::complete_session),
        )
        .route(
            "/passkey/session/:id/status",
            get(handlers::handoff::session_status),
        );

    // Protected routes (auth required)
    let protected_routes = Router::new()
        .route("/user/profile", get(handlers::user::get_profile))
        .route("/passkeys/:email", get(handlers::passkey::list_passkeys))
        .route(
            "/passkeys/:email/:id",
            axum::routing::patch(handlers::passkey::rename_passkey)
                .delete(handlers::passkey::delete_passkey),
        )
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            middleware::auth::auth_middleware,
        ));

    Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

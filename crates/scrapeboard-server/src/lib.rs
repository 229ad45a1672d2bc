pub mod auth;
pub mod error;
pub mod routes;
pub mod state;

use std::sync::Arc;

use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::{Any, CorsLayer};

use scrapeboard_core::Orchestrator;

/// Build the axum Router with all API routes and middleware.
/// Used by `serve()` and available for integration testing.
pub fn build_router(orchestrator: Arc<Orchestrator>) -> Router {
    let app_state = state::AppState::new(orchestrator);

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/api/status", get(routes::status::all_status))
        .route("/api/scrape/{kind}", get(routes::status::kind_status))
        .route("/api/scrape/{kind}", post(routes::scrape::start))
        .route(
            "/api/scrape/{kind}/download",
            get(routes::scrape::download),
        )
        .layer(cors)
        .with_state(app_state)
}

/// Bind and serve until shutdown.
pub async fn serve(orchestrator: Arc<Orchestrator>, port: u16) -> anyhow::Result<()> {
    let app = build_router(orchestrator);

    let addr = format!("0.0.0.0:{port}");
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    tracing::info!("scrapeboard listening on http://localhost:{port}");

    axum::serve(listener, app).await?;
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

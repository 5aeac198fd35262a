//! HTTP presentation layer.
//!
//! Read-only JSON endpoints for the computed series, a trade recording
//! endpoint, and a charted HTML page. Purely a consumer of the
//! valuation engine.

pub mod charts;
pub mod error;
pub mod portfolios;
pub mod state;
pub mod trades;

use axum::{http::Method, routing::get, Json, Router};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

pub use state::AppState;

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok" }))
}

/// Assemble the full application router.
pub fn app_router(state: AppState) -> Router {
    Router::new()
        .route("/api/health", get(health))
        .merge(portfolios::router())
        .merge(trades::router())
        .merge(charts::router())
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods([Method::GET, Method::POST])
                .allow_headers(Any),
        )
        .with_state(state)
}

// ABOUTME: Route definitions for the kvd HTTP API.
// ABOUTME: Assembles handlers into an axum Router with request tracing.

use axum::Router;
use axum::routing::get;
use tower_http::trace::TraceLayer;

use crate::api;
use crate::app_state::SharedState;

/// Build the router: the key-value API plus a health probe, with request
/// tracing layered on.
pub fn create_router(state: SharedState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route(
            "/v1/{key}",
            get(api::kv::get_key)
                .put(api::kv::put_key)
                .delete(api::kv::delete_key),
        )
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Health check handler. Returns 200 OK with a simple JSON body.
async fn health() -> axum::Json<serde_json::Value> {
    axum::Json(serde_json::json!({ "status": "ok" }))
}

// ABOUTME: Key-value API handlers: PUT, GET, DELETE over /v1/{key}.
// ABOUTME: Each mutation is applied to the store, then recorded in the log.

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use serde_json::json;

use crate::app_state::SharedState;

/// PUT /v1/{key} - store the raw request body as the key's value.
pub async fn put_key(
    State(state): State<SharedState>,
    Path(key): Path<String>,
    value: String,
) -> impl IntoResponse {
    state.store.put(key.clone(), value.clone()).await;

    if let Err(err) = state.log.write_put(&key, &value).await {
        tracing::error!("failed to log put for {key:?}: {err}");
        return (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({ "error": "failed to record write in transaction log" })),
        )
            .into_response();
    }

    StatusCode::CREATED.into_response()
}

/// GET /v1/{key} - return the raw value, or 404 if absent.
pub async fn get_key(
    State(state): State<SharedState>,
    Path(key): Path<String>,
) -> impl IntoResponse {
    match state.store.get(&key).await {
        Some(value) => (StatusCode::OK, value).into_response(),
        None => (
            StatusCode::NOT_FOUND,
            Json(json!({ "error": "no such key" })),
        )
            .into_response(),
    }
}

/// DELETE /v1/{key} - remove the key if present.
pub async fn delete_key(
    State(state): State<SharedState>,
    Path(key): Path<String>,
) -> impl IntoResponse {
    if !state.store.delete(&key).await {
        return (
            StatusCode::NOT_FOUND,
            Json(json!({ "error": "no such key" })),
        )
            .into_response();
    }

    if let Err(err) = state.log.write_delete(&key).await {
        tracing::error!("failed to log delete for {key:?}: {err}");
        return (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({ "error": "failed to record delete in transaction log" })),
        )
            .into_response();
    }

    StatusCode::ACCEPTED.into_response()
}

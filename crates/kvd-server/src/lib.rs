// ABOUTME: HTTP server for kvd, exposing the key-value API over axum.
// ABOUTME: Handlers mutate the store first, then inform the transaction log.

pub mod api;
pub mod app_state;
pub mod config;
pub mod routes;

pub use app_state::{AppState, SharedState};
pub use config::{KvdConfig, LogBackend};
pub use routes::create_router;

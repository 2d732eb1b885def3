// ABOUTME: Shared application state for the kvd HTTP server.
// ABOUTME: Carries the in-memory store and the transaction log facade handle.

use std::sync::Arc;

use kvd_core::KeyValueStore;
use kvd_log::TransactionLog;

/// State injected into every handler: the store plus the log facade.
/// The log sits behind a trait object so either backend fits; it is an
/// explicit dependency here, never process-global state.
pub struct AppState {
    pub store: KeyValueStore,
    pub log: Arc<dyn TransactionLog>,
}

/// Type alias for the Arc-wrapped state used with axum's State extractor.
pub type SharedState = Arc<AppState>;

impl AppState {
    pub fn new(store: KeyValueStore, log: Arc<dyn TransactionLog>) -> Self {
        Self { store, log }
    }
}

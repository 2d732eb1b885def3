// ABOUTME: In-memory concurrent key-value store shared across request handlers.
// ABOUTME: Holds no persistence of its own; startup replay applies events to it.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;

use crate::event::{Event, EventType};

/// A cloneable handle to the shared key/value map. All methods take
/// `&self`; synchronization is internal.
#[derive(Debug, Clone, Default)]
pub struct KeyValueStore {
    entries: Arc<RwLock<HashMap<String, String>>>,
}

impl KeyValueStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn get(&self, key: &str) -> Option<String> {
        self.entries.read().await.get(key).cloned()
    }

    pub async fn put(&self, key: impl Into<String>, value: impl Into<String>) {
        self.entries.write().await.insert(key.into(), value.into());
    }

    /// Remove a key. Returns whether it was present.
    pub async fn delete(&self, key: &str) -> bool {
        self.entries.write().await.remove(key).is_some()
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }

    /// Apply a replayed event. Used during startup recovery; emits no new
    /// log records.
    pub async fn apply(&self, event: &Event) {
        match event.event_type {
            EventType::Put => self.put(event.key.clone(), event.value.clone()).await,
            EventType::Delete => {
                self.delete(&event.key).await;
            }
        }
    }
}

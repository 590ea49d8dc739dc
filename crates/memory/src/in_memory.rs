//! In-memory storage: useful for testing and ephemeral sessions.

use async_trait::async_trait;
use chorus_core::error::StorageError;
use chorus_core::memory::{MemoryItem, MemoryStorage};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Keeps every agent's collection in a map. Nothing survives the process.
#[derive(Clone, Default)]
pub struct InMemoryStorage {
    collections: Arc<RwLock<HashMap<String, Vec<MemoryItem>>>>,
}

impl InMemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed one agent's collection (test setup).
    pub async fn seed(&self, agent_id: &str, items: Vec<MemoryItem>) {
        self.collections
            .write()
            .await
            .insert(agent_id.to_string(), items);
    }
}

#[async_trait]
impl MemoryStorage for InMemoryStorage {
    fn name(&self) -> &str {
        "in_memory"
    }

    async fn load_all(&self, agent_id: &str) -> Result<Vec<MemoryItem>, StorageError> {
        Ok(self
            .collections
            .read()
            .await
            .get(agent_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn save_all(&self, agent_id: &str, items: &[MemoryItem]) -> Result<(), StorageError> {
        self.collections
            .write()
            .await
            .insert(agent_id.to_string(), items.to_vec());
        Ok(())
    }
}

//! No-op storage: disables persistent memory entirely.

use async_trait::async_trait;
use chorus_core::error::StorageError;
use chorus_core::memory::{MemoryItem, MemoryStorage};

/// A storage that loads nothing and discards every save.
pub struct NoopStorage;

#[async_trait]
impl MemoryStorage for NoopStorage {
    fn name(&self) -> &str { "none" }

    async fn load_all(&self, _agent_id: &str) -> Result<Vec<MemoryItem>, StorageError> {
        Ok(Vec::new())
    }

    async fn save_all(&self, _agent_id: &str, _items: &[MemoryItem]) -> Result<(), StorageError> {
        Ok(())
    }
}

//! Per-agent long-term memory store.
//!
//! Texts are embedded on insert and recalled by cosine similarity to an
//! embedded query. The full collection is loaded once (asynchronously, at
//! agent creation) and saved wholesale after every addition.

use std::sync::Arc;

use chorus_core::error::EmbeddingError;
use chorus_core::memory::{MemoryItem, MemoryStorage};
use chorus_core::provider::EmbeddingBackend;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::vector::rank_by_similarity;

/// Long-term memory owned by one agent. Cheap to clone; clones share state.
#[derive(Clone)]
pub struct MemoryStore {
    agent_id: String,
    embedder: Arc<dyn EmbeddingBackend>,
    storage: Arc<dyn MemoryStorage>,
    items: Arc<RwLock<Vec<MemoryItem>>>,
}

impl MemoryStore {
    /// Create an empty store. Call [`restore`](Self::restore) or
    /// [`spawn_restore`](Self::spawn_restore) to load persisted items.
    pub fn new(
        agent_id: impl Into<String>,
        embedder: Arc<dyn EmbeddingBackend>,
        storage: Arc<dyn MemoryStorage>,
    ) -> Self {
        Self {
            agent_id: agent_id.into(),
            embedder,
            storage,
            items: Arc::new(RwLock::new(Vec::new())),
        }
    }

    pub fn agent_id(&self) -> &str {
        &self.agent_id
    }

    /// Load the persisted collection. Loaded items are placed before anything
    /// added in the meantime. Load failures are logged and treated as empty.
    pub async fn restore(&self) -> usize {
        let loaded = match self.storage.load_all(&self.agent_id).await {
            Ok(items) => items,
            Err(e) => {
                warn!(agent = %self.agent_id, error = %e, "Failed to load memories, starting empty");
                Vec::new()
            }
        };

        let count = loaded.len();
        if count > 0 {
            let mut items = self.items.write().await;
            let added_meanwhile = std::mem::replace(&mut *items, loaded);
            items.extend(added_meanwhile);
        }
        debug!(agent = %self.agent_id, count, "Memories restored");
        count
    }

    /// Run [`restore`](Self::restore) in the background.
    pub fn spawn_restore(&self) -> JoinHandle<usize> {
        let store = self.clone();
        tokio::spawn(async move { store.restore().await })
    }

    /// Embed `text` and append it as a new memory, then persist the collection.
    ///
    /// If embedding fails nothing is added. If saving fails the item stays in
    /// memory and [`EmbeddingError::Persistence`] is returned.
    pub async fn add(
        &self,
        text: &str,
        associated_user_id: Option<&str>,
        topic: Option<&str>,
        importance: f32,
    ) -> Result<MemoryItem, EmbeddingError> {
        let embedding = self.embedder.embed(text).await?;

        let mut item = MemoryItem::new(text, Some(embedding));
        item.associated_user_id = associated_user_id.map(str::to_string);
        item.topic = topic.map(str::to_string);
        item.importance = importance;

        let snapshot = {
            let mut items = self.items.write().await;
            items.push(item.clone());
            items.clone()
        };

        self.storage.save_all(&self.agent_id, &snapshot).await?;
        debug!(agent = %self.agent_id, total = snapshot.len(), "Memory added");
        Ok(item)
    }

    /// Texts of the `max_results` memories most similar to `query`, best first.
    ///
    /// Returns an empty list without calling the embedder when the store is empty.
    pub async fn query(&self, query: &str, max_results: usize) -> Result<Vec<String>, EmbeddingError> {
        if self.items.read().await.is_empty() {
            return Ok(Vec::new());
        }

        let query_embedding = self.embedder.embed(query).await?;
        let items = self.items.read().await;
        Ok(rank_by_similarity(&items, &query_embedding, max_results)
            .into_iter()
            .map(|(_, item)| item.text.clone())
            .collect())
    }

    /// Number of memories currently held.
    pub async fn len(&self) -> usize {
        self.items.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.items.read().await.is_empty()
    }

    /// A copy of every memory, in insertion order.
    pub async fn snapshot(&self) -> Vec<MemoryItem> {
        self.items.read().await.clone()
    }
}

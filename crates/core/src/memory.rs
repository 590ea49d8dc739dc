//! Long-term memory item and persistence trait.
//!
//! Each agent owns one collection of [`MemoryItem`]s. Persistence is
//! collection-at-a-time: the store loads everything at startup and saves the
//! full collection after every addition. No incremental diff format exists.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::StorageError;

/// A single remembered snippet.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryItem {
    /// Unique ID for this memory
    pub id: String,

    /// The remembered text
    pub text: String,

    /// Embedding vector; items without one are never ranked
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub embedding: Option<Vec<f32>>,

    /// When this memory was created
    pub timestamp: DateTime<Utc>,

    /// The participant this memory is about (usually the sender)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub associated_user_id: Option<String>,

    /// Optional topic label
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub topic: Option<String>,

    /// Importance weight. Stored but not yet used for ranking.
    #[serde(default = "default_importance")]
    pub importance: f32,
}

fn default_importance() -> f32 {
    1.0
}

impl MemoryItem {
    /// Create a new memory with a fresh ID and the current timestamp.
    pub fn new(text: impl Into<String>, embedding: Option<Vec<f32>>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            text: text.into(),
            embedding,
            timestamp: Utc::now(),
            associated_user_id: None,
            topic: None,
            importance: default_importance(),
        }
    }
}

/// The memory persistence collaborator.
///
/// Implementations: JSON files, in-memory (for testing), none (no-op).
#[async_trait]
pub trait MemoryStorage: Send + Sync {
    /// The storage name (e.g., "json_file", "in_memory", "none").
    fn name(&self) -> &str;

    /// Load the full collection for an agent. Empty if none exists.
    async fn load_all(&self, agent_id: &str) -> std::result::Result<Vec<MemoryItem>, StorageError>;

    /// Replace the full collection for an agent.
    async fn save_all(
        &self,
        agent_id: &str,
        items: &[MemoryItem],
    ) -> std::result::Result<(), StorageError>;
}

//! File-based memory storage: one JSON document per agent.
//!
//! Each agent's collection lives in `<dir>/agent_<id>_memories.json` as a
//! JSON array of [`MemoryItem`]s with ISO-8601 timestamps. The whole file is
//! rewritten on every save.
//!
//! Storage location: `~/.chorus/memory/` by default.

use async_trait::async_trait;
use chorus_core::error::StorageError;
use chorus_core::memory::{MemoryItem, MemoryStorage};
use std::path::{Path, PathBuf};
use tracing::debug;

/// JSON-file storage for per-agent memory collections.
pub struct JsonFileStorage {
    dir: PathBuf,
}

impl JsonFileStorage {
    /// Create a storage rooted at `dir`. The directory is created on first save.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Root directory of this storage.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path of one agent's collection file.
    pub fn path_for(&self, agent_id: &str) -> PathBuf {
        self.dir.join(format!("agent_{agent_id}_memories.json"))
    }
}

#[async_trait]
impl MemoryStorage for JsonFileStorage {
    fn name(&self) -> &str {
        "json_file"
    }

    async fn load_all(&self, agent_id: &str) -> Result<Vec<MemoryItem>, StorageError> {
        let path = self.path_for(agent_id);
        let content = match tokio::fs::read_to_string(&path).await {
            Ok(c) => c,
            // File doesn't exist yet: start empty
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => {
                return Err(StorageError::Read {
                    agent_id: agent_id.to_string(),
                    reason: e.to_string(),
                });
            }
        };

        let items: Vec<MemoryItem> =
            serde_json::from_str(&content).map_err(|e| StorageError::Corrupted {
                agent_id: agent_id.to_string(),
                reason: e.to_string(),
            })?;

        debug!(agent = %agent_id, path = %path.display(), count = items.len(), "Loaded memories");
        Ok(items)
    }

    async fn save_all(&self, agent_id: &str, items: &[MemoryItem]) -> Result<(), StorageError> {
        let write_err = |reason: String| StorageError::Write {
            agent_id: agent_id.to_string(),
            reason,
        };

        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(|e| write_err(format!("Failed to create memory directory: {e}")))?;

        let content = serde_json::to_string(items)
            .map_err(|e| write_err(format!("Failed to serialize memories: {e}")))?;

        tokio::fs::write(self.path_for(agent_id), content)
            .await
            .map_err(|e| write_err(format!("Failed to write memory file: {e}")))?;

        debug!(agent = %agent_id, count = items.len(), "Saved memories");
        Ok(())
    }
}

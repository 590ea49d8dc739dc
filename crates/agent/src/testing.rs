//! Scripted backends for tests.
//!
//! Compiled for this crate's own tests and, behind the `testing` feature,
//! for downstream test suites.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::sync::Arc;

use async_trait::async_trait;
use chorus_core::error::{EmbeddingError, GenerationError};
use chorus_core::provider::{EmbeddingBackend, GenerationBackend};

use crate::behavior::MARKER_SILENT;

/// A generation backend that replays scripted replies in order.
///
/// Once the script is exhausted every call answers `[BEHAVIOR_SILENT]`.
/// Every prompt it receives is recorded.
pub struct ScriptedGenerator {
    replies: Mutex<VecDeque<Result<String, GenerationError>>>,
    prompts: Mutex<Vec<String>>,
}

impl ScriptedGenerator {
    pub fn new<I, S>(replies: I) -> Arc<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::with_results(replies.into_iter().map(|r| Ok(r.into())).collect())
    }

    /// Script that may include failures.
    pub fn with_results(replies: Vec<Result<String, GenerationError>>) -> Arc<Self> {
        Arc::new(Self {
            replies: Mutex::new(replies.into()),
            prompts: Mutex::new(Vec::new()),
        })
    }

    /// Append one more reply to the script.
    pub fn push(&self, reply: impl Into<String>) {
        self.replies
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push_back(Ok(reply.into()));
    }

    /// Every prompt received so far, in call order.
    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn call_count(&self) -> usize {
        self.prompts.lock().unwrap_or_else(|e| e.into_inner()).len()
    }
}

#[async_trait]
impl GenerationBackend for ScriptedGenerator {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn generate(&self, prompt: &str) -> Result<String, GenerationError> {
        self.prompts
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(prompt.to_string());
        self.replies
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .pop_front()
            .unwrap_or_else(|| Ok(MARKER_SILENT.to_string()))
    }
}

/// Deterministic bag-of-words embedder: each lowercase word bumps one of
/// `dims` buckets chosen by a byte hash.
pub struct HashEmbedder {
    dims: usize,
}

impl HashEmbedder {
    pub fn new(dims: usize) -> Self {
        Self { dims: dims.max(1) }
    }
}

impl Default for HashEmbedder {
    fn default() -> Self {
        Self::new(32)
    }
}

#[async_trait]
impl EmbeddingBackend for HashEmbedder {
    fn name(&self) -> &str {
        "hash"
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        let mut vector = vec![0.0f32; self.dims];
        for word in text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| !w.is_empty())
        {
            let bucket = word
                .to_lowercase()
                .bytes()
                .fold(7usize, |acc, b| acc.wrapping_mul(31).wrapping_add(b as usize));
            vector[bucket % self.dims] += 1.0;
        }
        Ok(vector)
    }
}

/// An embedder whose backend is always unreachable.
pub struct FailingEmbedder;

#[async_trait]
impl EmbeddingBackend for FailingEmbedder {
    fn name(&self) -> &str {
        "failing"
    }

    async fn embed(&self, _text: &str) -> Result<Vec<f32>, EmbeddingError> {
        Err(EmbeddingError::Network("embedding backend offline".into()))
    }
}

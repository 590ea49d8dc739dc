//! Backend traits: the two narrow request/response interfaces the core
//! consumes: text generation and text embedding.
//!
//! Implementations: OpenAI-compatible HTTP endpoints (see `chorus-providers`),
//! scripted mocks in tests.

use async_trait::async_trait;

use crate::error::{EmbeddingError, GenerationError};

/// A text-generation backend.
///
/// Agents call `generate()` with one fully assembled prompt and get the raw
/// generated text back, behavior markers included.
#[async_trait]
pub trait GenerationBackend: Send + Sync {
    /// A human-readable name for this backend (e.g., "openai").
    fn name(&self) -> &str;

    /// Generate a completion for `prompt`.
    async fn generate(&self, prompt: &str) -> std::result::Result<String, GenerationError>;

    /// Health check: can we reach the backend?
    async fn health_check(&self) -> std::result::Result<bool, GenerationError> {
        Ok(true)
    }
}

/// A text-embedding backend.
#[async_trait]
pub trait EmbeddingBackend: Send + Sync {
    /// A human-readable name for this backend.
    fn name(&self) -> &str;

    /// Embed `text` into a dense vector.
    async fn embed(&self, text: &str) -> std::result::Result<Vec<f32>, EmbeddingError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Echo;

    #[async_trait]
    impl GenerationBackend for Echo {
        fn name(&self) -> &str {
            "echo"
        }

        async fn generate(&self, prompt: &str) -> Result<String, GenerationError> {
            Ok(prompt.to_string())
        }
    }

    #[tokio::test]
    async fn default_health_check_is_ok() {
        let backend = Echo;
        assert!(backend.health_check().await.unwrap());
        assert_eq!(backend.generate("hola").await.unwrap(), "hola");
    }
}

//! Error types for the Chorus domain.
//!
//! Uses `thiserror` for ergonomic error definitions.
//! Each external collaborator has its own error type; the top-level
//! [`Error`] wraps them so an agent turn can fail with any of them.

use thiserror::Error;

/// The top-level error type for all Chorus operations.
#[derive(Debug, Error)]
pub enum Error {
    // --- Backend errors ---
    #[error("Generation error: {0}")]
    Generation(#[from] GenerationError),

    #[error("Embedding error: {0}")]
    Embedding(#[from] EmbeddingError),

    // --- Persistence errors ---
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    // --- Orchestrator output ---
    #[error("Parse error: {0}")]
    Parse(#[from] ParseError),

    // --- Engine lookups ---
    #[error("Unknown channel: {0}")]
    UnknownChannel(String),

    #[error("Unknown agent: {0}")]
    UnknownAgent(String),

    // --- Configuration errors ---
    #[error("Configuration error: {message}")]
    Config { message: String },

    // --- Serialization ---
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    // --- Generic ---
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type alias using our Error.
pub type Result<T> = std::result::Result<T, Error>;

// --- Collaborator errors ---

/// Failure of the text-generation backend.
#[derive(Debug, Clone, Error)]
pub enum GenerationError {
    #[error("API request failed: {message} (status: {status_code})")]
    ApiError { status_code: u16, message: String },

    #[error("Rate limited by backend, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("Backend not configured: {0}")]
    NotConfigured(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Malformed backend response: {0}")]
    InvalidResponse(String),
}

/// Failure of the embedding backend, or of persisting freshly embedded memories.
#[derive(Debug, Clone, Error)]
pub enum EmbeddingError {
    #[error("API request failed: {message} (status: {status_code})")]
    ApiError { status_code: u16, message: String },

    #[error("Rate limited by backend, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Malformed backend response: {0}")]
    InvalidResponse(String),

    /// The memory was embedded and kept in memory, but saving failed.
    #[error("Failed to persist memories: {0}")]
    Persistence(#[from] StorageError),
}

/// Failure of the memory persistence collaborator.
#[derive(Debug, Clone, Error)]
pub enum StorageError {
    #[error("Failed to read memories for agent {agent_id}: {reason}")]
    Read { agent_id: String, reason: String },

    #[error("Failed to write memories for agent {agent_id}: {reason}")]
    Write { agent_id: String, reason: String },

    #[error("Corrupted memory collection for agent {agent_id}: {reason}")]
    Corrupted { agent_id: String, reason: String },
}

/// Malformed structured output from the privileged orchestrator agent.
#[derive(Debug, Clone, Error)]
pub enum ParseError {
    #[error("Orchestrator output is not valid JSON: {0}")]
    OrchestratorOutput(String),

    #[error("Orchestrator output is empty")]
    Empty,
}

//! # Chorus Core
//!
//! Domain types, traits, and error definitions for the Chorus multi-agent
//! chat orchestrator. This crate has **zero framework dependencies**: it
//! defines the domain model that all other crates implement against.
//!
//! ## Design Philosophy
//!
//! Every external collaborator (generation backend, embedding backend,
//! memory persistence) is defined as a trait here. Implementations live in
//! their respective crates. This enables:
//! - Swapping backends via configuration
//! - Easy testing with scripted mock implementations
//! - Clean dependency graph (all crates depend inward on core)

pub mod agent;
pub mod channel;
pub mod error;
pub mod event;
pub mod memory;
pub mod message;
pub mod progress;
pub mod provider;

// Re-export key types at crate root for ergonomics
pub use agent::{AgentProfile, Participant, ParticipantKind};
pub use channel::{ChannelId, ChatChannel};
pub use error::{EmbeddingError, Error, GenerationError, ParseError, Result, StorageError};
pub use event::{DomainEvent, EventBus};
pub use memory::{MemoryItem, MemoryStorage};
pub use message::{ChatMessage, OutboundMessage};
pub use progress::{
    AffinityScores, Objective, ObjectiveStatus, OrchestratorOutput, ProgressState,
    apply_orchestrator_output,
};
pub use provider::{EmbeddingBackend, GenerationBackend};

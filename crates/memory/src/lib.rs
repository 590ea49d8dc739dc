//! Long-term memory for Chorus agents.
//!
//! [`MemoryStore`] holds one agent's embedded memories and ranks them by
//! cosine similarity. Persistence is pluggable through
//! `chorus_core::MemoryStorage`: JSON files, in-memory, or none.

pub mod file_backend;
pub mod in_memory;
pub mod noop;
pub mod store;
pub mod vector;

pub use file_backend::JsonFileStorage;
pub use in_memory::InMemoryStorage;
pub use noop::NoopStorage;
pub use store::MemoryStore;
pub use vector::{cosine_similarity, rank_by_similarity};

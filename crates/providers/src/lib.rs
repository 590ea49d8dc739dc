//! Backend implementations for Chorus.
//!
//! All backends implement the `chorus_core::GenerationBackend` and/or
//! `chorus_core::EmbeddingBackend` traits.

pub mod openai_compat;

pub use openai_compat::OpenAiCompatClient;

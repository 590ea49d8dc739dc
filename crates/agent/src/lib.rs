//! Conversational agents for Chorus.
//!
//! Each [`Agent`] owns a persona, a bounded short-term window, a long-term
//! [`MemoryStore`](chorus_memory::MemoryStore) and a small state machine for
//! waiting on follow-ups and cooling down between replies to other agents.
//!
//! Replies are steered by behavior markers (see [`behavior`]): the backend
//! picks normal, multi-part, private, silent or wait-for-context for each
//! turn.

pub mod agent;
pub mod behavior;
pub mod prompt;
pub mod retention;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use agent::{Agent, AgentTuning, WaitState};
pub use behavior::{Behavior, ParsedResponse, parse_response};
pub use prompt::{PromptContext, build_prompt};
pub use retention::{Retention, RetentionPolicy, normalized_similarity};

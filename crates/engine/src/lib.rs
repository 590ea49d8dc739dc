//! # Chorus Engine
//!
//! The orchestration layer: owns channels, the human user, the agents and
//! the privileged orchestrator, and decides who reacts to what.
//!
//! - [`ChatEngine`] handles user messages and agent-to-agent propagation
//! - [`bootstrap`] assembles an engine from configuration

pub mod bootstrap;
pub mod engine;

pub use bootstrap::{from_config, orchestrator_persona, with_backends};
pub use engine::{ChatEngine, DispatchReport, TurnRecord};

//! Agent identity and participant roster types.

use serde::{Deserialize, Serialize};

/// Immutable identity of a conversational agent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentProfile {
    /// Unique agent ID (also its participant ID in channels)
    pub id: String,

    /// Display name
    pub name: String,

    /// Persona text injected at the top of every prompt
    pub persona: String,

    /// The single privileged orchestrator produces structured progress data
    /// instead of chat content
    #[serde(default)]
    pub is_privileged: bool,
}

impl AgentProfile {
    /// Create a regular (non-privileged) agent profile.
    pub fn new(id: impl Into<String>, name: impl Into<String>, persona: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            persona: persona.into(),
            is_privileged: false,
        }
    }

    /// Create the privileged orchestrator profile.
    pub fn orchestrator(
        id: impl Into<String>,
        name: impl Into<String>,
        persona: impl Into<String>,
    ) -> Self {
        Self {
            is_privileged: true,
            ..Self::new(id, name, persona)
        }
    }
}

/// Whether a participant is the human user or an AI agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParticipantKind {
    Human,
    Agent,
}

/// One entry of a channel roster, as presented to an agent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Participant {
    pub id: String,
    pub name: String,
    pub kind: ParticipantKind,
}

impl Participant {
    pub fn human(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            kind: ParticipantKind::Human,
        }
    }

    pub fn agent(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            kind: ParticipantKind::Agent,
        }
    }

    pub fn is_human(&self) -> bool {
        self.kind == ParticipantKind::Human
    }
}

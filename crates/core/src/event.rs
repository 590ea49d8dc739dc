//! Domain event system: observation hooks for the presentation layer.
//!
//! The engine publishes an event whenever observable state changes: a message
//! lands in a channel, an agent starts or stops waiting, progress moves, a
//! turn fails. Front-ends subscribe and re-render; nothing in the core
//! depends on anyone listening.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::broadcast;

use crate::channel::ChannelId;
use crate::progress::AffinityScores;

/// All domain events in the system.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum DomainEvent {
    /// A message was appended to a channel
    MessageAppended {
        channel_id: ChannelId,
        message_id: String,
        sender_id: String,
        is_private: bool,
        timestamp: DateTime<Utc>,
    },

    /// An agent entered or left the wait-for-context state
    AgentWaitChanged {
        agent_id: String,
        waiting: bool,
        timestamp: DateTime<Utc>,
    },

    /// The orchestrator completed an objective
    ObjectiveCompleted {
        tag: String,
        timestamp: DateTime<Utc>,
    },

    /// Affinity counters changed
    AffinityUpdated {
        scores: AffinityScores,
        timestamp: DateTime<Utc>,
    },

    /// The orchestrator asked for a banner/notification to be shown
    SystemMessage {
        content: String,
        timestamp: DateTime<Utc>,
    },

    /// An agent turn failed (backend error)
    TurnFailed {
        agent_id: String,
        channel_id: ChannelId,
        error: String,
        timestamp: DateTime<Utc>,
    },

    /// The engine started or finished processing a user message
    ProcessingChanged {
        busy: bool,
        timestamp: DateTime<Utc>,
    },
}

/// A broadcast-based event bus for domain events.
///
/// Uses `tokio::sync::broadcast` for multi-consumer pub/sub.
/// Slow subscribers lag and drop old events rather than blocking publishers.
pub struct EventBus {
    sender: broadcast::Sender<Arc<DomainEvent>>,
}

impl EventBus {
    /// Create a new event bus with the given capacity.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publish an event to all subscribers.
    pub fn publish(&self, event: DomainEvent) {
        // No subscribers is fine
        let _ = self.sender.send(Arc::new(event));
    }

    /// Subscribe to receive events.
    pub fn subscribe(&self) -> broadcast::Receiver<Arc<DomainEvent>> {
        self.sender.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}

//! Chat channels: direct messages and group chats.
//!
//! A channel owns an ordered, unique participant list and an append-only,
//! chronological message log. Visibility of private messages depends on the
//! number of participants: in a two-person channel both sides see them, in a
//! group only the sender does.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::message::ChatMessage;

/// Unique identifier for a channel.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ChannelId(pub String);

impl ChannelId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl Default for ChannelId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ChannelId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A chat channel: either a direct message (exactly two participants) or a group.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatChannel {
    /// Unique channel ID
    pub id: ChannelId,

    /// Display name
    pub name: String,

    /// Ordered, unique participant IDs
    pub participants: Vec<String>,

    /// Append-only chronological message log
    #[serde(default)]
    pub messages: Vec<ChatMessage>,

    /// Direct message (two participants) vs group chat
    pub is_direct_message: bool,
}

impl ChatChannel {
    /// Create a group channel. Duplicate participant IDs are dropped,
    /// keeping the first occurrence.
    pub fn group(id: ChannelId, name: impl Into<String>, participants: Vec<String>) -> Self {
        let mut unique: Vec<String> = Vec::with_capacity(participants.len());
        for p in participants {
            if !unique.contains(&p) {
                unique.push(p);
            }
        }
        Self {
            id,
            name: name.into(),
            participants: unique,
            messages: Vec::new(),
            is_direct_message: false,
        }
    }

    /// Create a direct-message channel between two participants.
    pub fn direct(
        id: ChannelId,
        name: impl Into<String>,
        first: impl Into<String>,
        second: impl Into<String>,
    ) -> Self {
        Self {
            id,
            name: name.into(),
            participants: vec![first.into(), second.into()],
            messages: Vec::new(),
            is_direct_message: true,
        }
    }

    /// Whether `participant_id` is a member of this channel.
    pub fn has_participant(&self, participant_id: &str) -> bool {
        self.participants.iter().any(|p| p == participant_id)
    }

    /// Append a message to the log.
    pub fn push(&mut self, message: ChatMessage) {
        self.messages.push(message);
    }

    /// Find a message by ID.
    pub fn message(&self, message_id: &str) -> Option<&ChatMessage> {
        self.messages.iter().find(|m| m.id == message_id)
    }

    /// Whether `message` is visible to `viewer_id` in this channel.
    pub fn is_visible_to(&self, message: &ChatMessage, viewer_id: &str) -> bool {
        !message.is_private || message.sender_id == viewer_id || self.participants.len() == 2
    }

    /// All messages visible to `viewer_id`, in chronological order.
    pub fn messages_visible_to(&self, viewer_id: &str) -> Vec<&ChatMessage> {
        self.messages
            .iter()
            .filter(|m| self.is_visible_to(m, viewer_id))
            .collect()
    }

    /// Mark one message as seen by a participant. Returns `true` if a new
    /// seen entry was recorded.
    pub fn mark_seen(&mut self, message_id: &str, participant_id: &str) -> bool {
        let Some(slot) = self.messages.iter_mut().find(|m| m.id == message_id) else {
            return false;
        };
        if slot.is_seen_by(participant_id) {
            return false;
        }
        *slot = slot.marked_as_seen(participant_id);
        true
    }

    /// Mark every message not sent by `participant_id` as seen by them.
    /// Returns the number of messages newly marked.
    pub fn mark_all_seen_by(&mut self, participant_id: &str) -> usize {
        let mut updated = 0;
        for slot in self.messages.iter_mut() {
            if slot.sender_id != participant_id && !slot.is_seen_by(participant_id) {
                *slot = slot.marked_as_seen(participant_id);
                updated += 1;
            }
        }
        updated
    }
}

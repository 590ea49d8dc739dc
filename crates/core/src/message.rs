//! Chat message domain types.
//!
//! These are the value objects that flow through the entire system:
//! User sends a message → Engine appends it to a channel → Agents process it
//! → Agents produce [`OutboundMessage`]s → Engine turns them into new
//! [`ChatMessage`]s.

use std::collections::BTreeMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::channel::ChannelId;

/// A single message in a chat channel.
///
/// Messages are immutable once created, except for seen-tracking, which is
/// applied by producing a new value via [`ChatMessage::marked_as_seen`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    /// Unique message ID
    pub id: String,

    /// Participant ID of the sender (human or agent)
    pub sender_id: String,

    /// Display name of the sender at the time of sending
    pub sender_name: String,

    /// The text content
    pub content: String,

    /// The channel this message belongs to
    pub channel_id: ChannelId,

    /// Creation timestamp
    pub timestamp: DateTime<Utc>,

    /// Private messages are only visible to their sender, or to both sides of a DM
    #[serde(default)]
    pub is_private: bool,

    /// Participant ID → first time that participant saw the message
    #[serde(default)]
    pub seen_by: BTreeMap<String, DateTime<Utc>>,
}

impl ChatMessage {
    /// Create a new public message. The sender is marked as having seen it.
    pub fn new(
        sender_id: impl Into<String>,
        sender_name: impl Into<String>,
        content: impl Into<String>,
        channel_id: ChannelId,
    ) -> Self {
        let sender_id = sender_id.into();
        let now = Utc::now();
        let mut seen_by = BTreeMap::new();
        seen_by.insert(sender_id.clone(), now);

        Self {
            id: Uuid::new_v4().to_string(),
            sender_id,
            sender_name: sender_name.into(),
            content: content.into(),
            channel_id,
            timestamp: now,
            is_private: false,
            seen_by,
        }
    }

    /// Set the privacy flag (builder style).
    pub fn with_privacy(mut self, is_private: bool) -> Self {
        self.is_private = is_private;
        self
    }

    /// Return a copy of this message marked as seen by `participant_id`.
    ///
    /// If the participant has already seen it, the original timestamp is kept.
    pub fn marked_as_seen(&self, participant_id: &str) -> Self {
        let mut updated = self.clone();
        updated
            .seen_by
            .entry(participant_id.to_string())
            .or_insert_with(Utc::now);
        updated
    }

    /// Whether the given participant has seen this message.
    pub fn is_seen_by(&self, participant_id: &str) -> bool {
        self.seen_by.contains_key(participant_id)
    }
}

impl PartialEq for ChatMessage {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for ChatMessage {}

/// A message an agent wants to send, before the engine turns it into a
/// [`ChatMessage`].
#[derive(Debug, Clone, PartialEq)]
pub struct OutboundMessage {
    /// The text content
    pub content: String,

    /// Target channel (the channel of the message being answered)
    pub target_channel_id: ChannelId,

    /// Whether the message should be private
    pub is_private: bool,

    /// Simulated typing delay before sending (multi-part responses only)
    pub delay: Option<Duration>,
}

impl OutboundMessage {
    /// Create a public outbound message with no delay.
    pub fn new(content: impl Into<String>, target_channel_id: ChannelId) -> Self {
        Self {
            content: content.into(),
            target_channel_id,
            is_private: false,
            delay: None,
        }
    }
}

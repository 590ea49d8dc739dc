//! Behavior markers: the response-format mini-protocol.
//!
//! Every generated reply starts with one marker selecting how the agent
//! behaves for this turn:
//!
//! | Marker                         | Behavior                                  |
//! |--------------------------------|-------------------------------------------|
//! | `[BEHAVIOR_NORMAL]`            | One message                               |
//! | `[BEHAVIOR_MULTI_SHORT]`       | Several short messages, split on `[SPLIT_MESSAGE_HERE]` |
//! | `[BEHAVIOR_PRIVATE]`           | One message visible only to the sender (or both DM sides) |
//! | `[BEHAVIOR_SILENT]`            | No reply                                  |
//! | `[BEHAVIOR_WAIT_FOR_CONTEXT]`  | No reply yet; wait for a follow-up        |
//!
//! Precedence when several markers appear:
//! silent > wait > (multi-part | private) > normal.

use std::time::Duration;

use chorus_core::channel::ChannelId;
use chorus_core::message::OutboundMessage;

pub const MARKER_NORMAL: &str = "[BEHAVIOR_NORMAL]";
pub const MARKER_MULTI_SHORT: &str = "[BEHAVIOR_MULTI_SHORT]";
pub const MARKER_PRIVATE: &str = "[BEHAVIOR_PRIVATE]";
pub const MARKER_SILENT: &str = "[BEHAVIOR_SILENT]";
pub const MARKER_WAIT_FOR_CONTEXT: &str = "[BEHAVIOR_WAIT_FOR_CONTEXT]";
pub const SPLIT_SEPARATOR: &str = "[SPLIT_MESSAGE_HERE]";

const ALL_MARKERS: [&str; 5] = [
    MARKER_NORMAL,
    MARKER_MULTI_SHORT,
    MARKER_PRIVATE,
    MARKER_SILENT,
    MARKER_WAIT_FOR_CONTEXT,
];

/// How an agent chose to behave for one turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Behavior {
    Normal,
    MultiPart,
    Private,
    Silent,
    WaitForContext,
}

/// A parsed reply: the behavior plus zero or more text segments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedResponse {
    pub behavior: Behavior,
    pub messages: Vec<String>,
}

impl ParsedResponse {
    /// Whether this reply produces any outbound message.
    pub fn has_sendable_content(&self) -> bool {
        !self.messages.is_empty()
            && !matches!(self.behavior, Behavior::Silent | Behavior::WaitForContext)
    }

    /// Turn the reply into outbound messages for `channel_id`.
    ///
    /// Multi-part segment `i` is delayed by `i × spacing + jitter()`; other
    /// behaviors carry no delay. Private behavior marks the message private.
    pub fn into_outbound(
        self,
        channel_id: &ChannelId,
        spacing: Duration,
        mut jitter: impl FnMut() -> Duration,
    ) -> Vec<OutboundMessage> {
        if !self.has_sendable_content() {
            return Vec::new();
        }

        let behavior = self.behavior;
        self.messages
            .into_iter()
            .enumerate()
            .map(|(index, content)| OutboundMessage {
                content,
                target_channel_id: channel_id.clone(),
                is_private: behavior == Behavior::Private,
                delay: (behavior == Behavior::MultiPart)
                    .then(|| spacing * index as u32 + jitter()),
            })
            .collect()
    }
}

/// Parse raw generated text into a behavior and message segments.
///
/// Text without any marker is treated as a normal reply.
pub fn parse_response(raw: &str) -> ParsedResponse {
    let trimmed = raw.trim();

    if trimmed.contains(MARKER_SILENT) {
        return ParsedResponse {
            behavior: Behavior::Silent,
            messages: Vec::new(),
        };
    }

    if trimmed.contains(MARKER_WAIT_FOR_CONTEXT) {
        return ParsedResponse {
            behavior: Behavior::WaitForContext,
            messages: Vec::new(),
        };
    }

    let behavior = if trimmed.contains(MARKER_MULTI_SHORT) {
        Behavior::MultiPart
    } else if trimmed.contains(MARKER_PRIVATE) {
        Behavior::Private
    } else {
        Behavior::Normal
    };

    let content = strip_markers(trimmed);

    let messages = if behavior == Behavior::MultiPart {
        content
            .split(SPLIT_SEPARATOR)
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect()
    } else if content.is_empty() {
        Vec::new()
    } else {
        vec![content]
    };

    ParsedResponse { behavior, messages }
}

/// Remove every behavior marker and trim. The split separator is kept.
pub fn strip_markers(text: &str) -> String {
    let mut content = text.trim().to_string();
    for marker in ALL_MARKERS {
        content = content.replace(marker, "").trim().to_string();
    }
    content
}

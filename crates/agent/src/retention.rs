//! Long-term memory retention heuristic.
//!
//! Decides, after each turn, whether the incoming message is worth
//! embedding into the agent's long-term memory.

use chorus_core::message::ChatMessage;

/// Outcome of the retention check. Anything but `Store` is a skip reason.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Retention {
    Store,
    TooShort,
    OwnMessage,
    /// Agent-to-agent chatter the agent neither answered nor was asked about.
    UnansweredAgentChatter,
    NearDuplicate,
}

/// Thresholds for the retention check.
#[derive(Debug, Clone)]
pub struct RetentionPolicy {
    /// Messages with fewer characters are skipped
    pub min_length: usize,
    /// Normalized similarity above which a message is a near-duplicate
    pub similarity_threshold: f64,
    /// How many recent same-sender messages are compared
    pub recent_window: usize,
}

impl Default for RetentionPolicy {
    fn default() -> Self {
        Self {
            min_length: 20,
            similarity_threshold: 0.85,
            recent_window: 3,
        }
    }
}

impl From<&chorus_config::MemoryConfig> for RetentionPolicy {
    fn from(config: &chorus_config::MemoryConfig) -> Self {
        Self {
            min_length: config.min_length,
            similarity_threshold: config.similarity_threshold,
            recent_window: config.recent_window,
        }
    }
}

impl RetentionPolicy {
    /// Evaluate `incoming` for agent `agent_id`.
    ///
    /// `history` is the agent's short-term window; the incoming message
    /// itself is never used as a comparison candidate.
    pub fn evaluate(
        &self,
        incoming: &ChatMessage,
        agent_id: &str,
        is_from_agent: bool,
        agent_responded: bool,
        history: &[ChatMessage],
    ) -> Retention {
        let content = incoming.content.as_str();

        if content.chars().count() < self.min_length {
            return Retention::TooShort;
        }

        if incoming.sender_id == agent_id {
            return Retention::OwnMessage;
        }

        if is_from_agent && !agent_responded && !content.contains('?') {
            return Retention::UnansweredAgentChatter;
        }

        let same_sender: Vec<&ChatMessage> = history
            .iter()
            .filter(|m| m.sender_id == incoming.sender_id && m.id != incoming.id)
            .collect();
        let recent = &same_sender[same_sender.len().saturating_sub(self.recent_window)..];

        if recent
            .iter()
            .any(|m| normalized_similarity(content, &m.content) > self.similarity_threshold)
        {
            return Retention::NearDuplicate;
        }

        Retention::Store
    }
}

/// Levenshtein similarity normalized to [0, 1]: `(max_len - distance) / max_len`.
///
/// Lengths are counted in characters. Strings whose lengths differ by more
/// than half the longer one score 0 without computing the distance.
pub fn normalized_similarity(a: &str, b: &str) -> f64 {
    let a_len = a.chars().count();
    let b_len = b.chars().count();

    if a_len == 0 && b_len == 0 {
        return 1.0;
    }
    if a_len == 0 || b_len == 0 {
        return 0.0;
    }

    let max_len = a_len.max(b_len);
    if a_len.abs_diff(b_len) > max_len / 2 {
        return 0.0;
    }

    let distance = strsim::levenshtein(a, b);
    (max_len - distance) as f64 / max_len as f64
}

/// Text stored in long-term memory for a retained message.
pub fn memory_text(channel_name: &str, message: &ChatMessage) -> String {
    format!(
        "In the chat '{}', {} said: {}",
        channel_name, message.sender_name, message.content
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use chorus_core::channel::ChannelId;

    fn msg(sender: &str, content: &str) -> ChatMessage {
        ChatMessage::new(sender, sender, content, ChannelId::from("lab"))
    }

    #[test]
    fn similarity_edge_cases() {
        assert_eq!(normalized_similarity("", ""), 1.0);
        assert_eq!(normalized_similarity("abc", ""), 0.0);
        assert_eq!(normalized_similarity("abc", "abc"), 1.0);
        // Length gate: 2 vs 10 characters
        assert_eq!(normalized_similarity("ab", "abcdefghij"), 0.0);
    }

    #[test]
    fn similarity_counts_characters_not_bytes() {
        // One substitution over four characters
        assert!((normalized_similarity("niño", "nino") - 0.75).abs() < 1e-9);
    }

    #[test]
    fn short_messages_are_skipped() {
        let policy = RetentionPolicy::default();
        let incoming = msg("user", "hola");
        assert_eq!(
            policy.evaluate(&incoming, "aldo", false, true, &[]),
            Retention::TooShort
        );
    }

    #[test]
    fn own_messages_are_skipped() {
        let policy = RetentionPolicy::default();
        let incoming = msg("aldo", "I just pushed the sensor driver to main");
        assert_eq!(
            policy.evaluate(&incoming, "aldo", false, true, &[]),
            Retention::OwnMessage
        );
    }

    #[test]
    fn agent_chatter_needs_reply_or_question() {
        let policy = RetentionPolicy::default();
        let statement = msg("fer", "I soldered the humidity sensor today");
        let question = msg("fer", "Does anyone have a spare Arduino board?");

        assert_eq!(
            policy.evaluate(&statement, "aldo", true, false, &[]),
            Retention::UnansweredAgentChatter
        );
        assert_eq!(policy.evaluate(&statement, "aldo", true, true, &[]), Retention::Store);
        assert_eq!(policy.evaluate(&question, "aldo", true, false, &[]), Retention::Store);
    }

    #[test]
    fn near_duplicates_are_skipped() {
        let policy = RetentionPolicy::default();
        let earlier = msg("user", "We should use a humidity sensor here");
        let incoming = msg("user", "We should use a humidity sensor here!");
        let history = vec![earlier, incoming.clone()];

        assert_eq!(
            policy.evaluate(&incoming, "aldo", false, true, &history),
            Retention::NearDuplicate
        );
    }

    #[test]
    fn only_recent_window_is_compared() {
        let policy = RetentionPolicy::default();
        let old = msg("user", "We should use a humidity sensor here");
        let history = vec![
            old,
            msg("user", "Completely unrelated message number one"),
            msg("user", "Another totally different sentence two"),
            msg("user", "Yet one more distinct line of text three"),
        ];
        let incoming = msg("user", "We should use a humidity sensor here!");

        assert_eq!(
            policy.evaluate(&incoming, "aldo", false, true, &history),
            Retention::Store
        );
    }

    #[test]
    fn memory_text_format() {
        let message = ChatMessage::new("user", "Omar", "I love robotics", ChannelId::from("lab"));
        assert_eq!(
            memory_text("Physics II", &message),
            "In the chat 'Physics II', Omar said: I love robotics"
        );
    }
}

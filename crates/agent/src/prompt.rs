//! Prompt builder: assembles the single prompt sent to the generation backend.
//!
//! Layout, top to bottom:
//!
//! 1. Persona and current time
//! 2. Participant roster (human user / AI agent)
//! 3. Channel kind and name
//! 4. Recalled long-term memories, numbered from 1
//! 5. Short-term history, oldest first
//! 6. Interaction context (continuation after a wait, the incoming message)
//! 7. Fixed instruction block describing the behavior markers
//!
//! # Determinism
//!
//! [`build_prompt`] is a pure function: the current time is part of the
//! input, so identical inputs always produce identical prompts.

use std::fmt::Write;

use chorus_core::agent::Participant;
use chorus_core::message::ChatMessage;
use chrono::{DateTime, Utc};

/// Everything the prompt depends on.
pub struct PromptContext<'a> {
    /// The agent's persona text.
    pub persona: &'a str,
    /// Short-term window, oldest first (includes the incoming message).
    pub history: &'a [ChatMessage],
    /// How many messages the window can hold.
    pub history_limit: usize,
    /// Recalled long-term memories, best first.
    pub memories: &'a [String],
    /// Channel participants.
    pub roster: &'a [Participant],
    pub channel_name: &'a str,
    pub is_group: bool,
    /// The message being answered.
    pub incoming: &'a ChatMessage,
    /// The incoming message was written by another agent.
    pub is_from_agent: bool,
    /// The message this agent waited on, if this turn is a continuation.
    pub previously_awaited: Option<&'a ChatMessage>,
    pub now: DateTime<Utc>,
}

impl PromptContext<'_> {
    /// Resolve a sender's display name via the roster, falling back to the
    /// name stored on the message.
    fn display_name<'m>(&'m self, message: &'m ChatMessage) -> &'m str {
        self.roster
            .iter()
            .find(|p| p.id == message.sender_id)
            .map(|p| p.name.as_str())
            .unwrap_or(&message.sender_name)
    }
}

const INSTRUCTIONS: &str = "
Instructions for your response:
- Be *very* concise and relevant, only speak when needed.
- Avoid unnecessary repetition and filler content.
- Answer in a very condensed brief format and a WhatsApp style, as if you were a human. Do not use markdown or code blocks.
- Be careful with overusing emojis. Use them only when appropriate for your persona and when they add value to the message.
- Based on your persona and the entire context (history, memory, current interaction), formulate your response and choose a behavior pattern.

Available Behavior Patterns:
1. [BEHAVIOR_NORMAL]: Respond with a single message.
2. [BEHAVIOR_MULTI_SHORT]: Split your response into multiple short messages using [SPLIT_MESSAGE_HERE].
3. [BEHAVIOR_PRIVATE]: Send a private message (only visible to the original sender of the message you are replying to). Use this cautiously in group chats when you want to address a specific participant without involving others.
4. [BEHAVIOR_SILENT]: Choose not to respond at all. Use if no response is needed or appropriate for your persona. Use if the incoming message is not relevant enough to you or your persona.
5. [BEHAVIOR_WAIT_FOR_CONTEXT]: If the latest incoming message seems incomplete AND you strongly anticipate a direct follow-up message very soon from the same sender that will provide crucial missing context, you can choose to wait. Use this sparingly and only when essential for a meaningful response.

How to format your output:
Start your response *immediately* with the chosen behavior tag (e.g., \"[BEHAVIOR_NORMAL] <your_message>\").
Do not add explanations about your chosen behavior.
If using [BEHAVIOR_SILENT] or [BEHAVIOR_WAIT_FOR_CONTEXT], output only the tag itself.
Stay in character according to your persona.";

const AGENT_SILENCE_BIAS: &str = "Consider *very* carefully if responding to another agent is necessary. Prioritize only meaningful interaction and avoid redundant messages. [BEHAVIOR_SILENT] is appropriate when replying to other agents unless you have a specific contribution.";

const NO_REWAIT: &str =
    "Do not choose [BEHAVIOR_WAIT_FOR_CONTEXT] again for this specific interaction sequence.";

/// Build the prompt for one agent turn.
pub fn build_prompt(ctx: &PromptContext<'_>) -> String {
    let mut prompt = String::with_capacity(4096);

    // `write!` into a String cannot fail.
    let _ = write!(
        prompt,
        "You are an AI agent with the following persona:\n{}\n\nCurrent time: {}\n\nYou are in a conversation with the following participants:",
        ctx.persona,
        ctx.now.format("%b %-d, %Y at %-I:%M %p UTC"),
    );

    for participant in ctx.roster {
        let kind = if participant.is_human() { "Human user" } else { "AI agent" };
        let _ = write!(
            prompt,
            "\n- {} (ID: {}, Type: {})",
            participant.name, participant.id, kind
        );
    }

    let _ = write!(
        prompt,
        "\n\nThis is a {} named: {}",
        if ctx.is_group { "group chat" } else { "direct message" },
        ctx.channel_name
    );

    if !ctx.memories.is_empty() {
        prompt.push_str("\n\nRelevant information from your memory:");
        for (index, memory) in ctx.memories.iter().enumerate() {
            let _ = write!(prompt, "\n{}. {}", index + 1, memory);
        }
    }

    let _ = write!(
        prompt,
        "\n\nRecent conversation history (up to last {} messages):",
        ctx.history_limit
    );
    for message in ctx.history {
        let _ = write!(prompt, "\n{}: {}", ctx.display_name(message), message.content);
    }

    prompt.push_str("\n\nInteraction Context:");

    if let Some(awaited) = ctx.previously_awaited {
        let _ = write!(
            prompt,
            "\nYou previously decided to wait for more context after receiving this message from {}: '{}'.\nThe waiting period is now over or a new message has arrived.",
            ctx.display_name(awaited),
            awaited.content
        );
    }

    let sender = ctx.display_name(ctx.incoming);
    if ctx.is_from_agent {
        let _ = write!(
            prompt,
            "\nFellow AI agent, {}, just said: {}",
            sender, ctx.incoming.content
        );
    } else {
        let _ = write!(
            prompt,
            "\n{} (the user) just said: {}",
            sender, ctx.incoming.content
        );
    }

    prompt.push('\n');
    prompt.push_str(INSTRUCTIONS);

    if ctx.is_from_agent {
        prompt.push('\n');
        prompt.push_str(AGENT_SILENCE_BIAS);
    }

    if ctx.previously_awaited.is_some() {
        prompt.push('\n');
        prompt.push_str(NO_REWAIT);
    }

    prompt.push_str("\n\nYour response (begin immediately with a behavior tag):");
    prompt
}

//! The conversational agent: one persona, one memory, one wait/cooldown FSM.
//!
//! An agent is driven by [`Agent::process`], once per incoming message. Each
//! turn:
//!
//! 1. **Cooldown gate**: another agent's message inside the cooldown window is ignored
//! 2. **Continuation**: resolves a pending wait-for-context
//! 3. **Short-term window**: the message is appended (bounded, FIFO)
//! 4. **Recall**: long-term memories relevant to the message
//! 5. **Generate**: prompt → backend → behavior marker parse
//! 6. **Outbound**: zero or more messages, possibly delayed or private
//! 7. **Retention**: the message may be stored in long-term memory
//!
//! Wait state and timers are serialized through one lock per agent, so a
//! timer expiring and a message arriving never interleave.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use chorus_core::agent::{AgentProfile, Participant};
use chorus_core::channel::ChatChannel;
use chorus_core::error::{EmbeddingError, Result};
use chorus_core::event::{DomainEvent, EventBus};
use chorus_core::message::{ChatMessage, OutboundMessage};
use chorus_core::provider::GenerationBackend;
use chorus_memory::MemoryStore;
use chrono::Utc;
use rand::Rng;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::behavior::{Behavior, parse_response, strip_markers};
use crate::prompt::{PromptContext, build_prompt};
use crate::retention::{Retention, RetentionPolicy, memory_text};

/// Timing and sizing knobs for an agent.
#[derive(Debug, Clone)]
pub struct AgentTuning {
    /// How long an agent waits for a follow-up before giving up
    pub wait_for_context: Duration,
    /// Minimum gap between replies to other agents
    pub cooldown: Duration,
    /// Short-term window capacity
    pub short_term_capacity: usize,
    /// Maximum memories recalled per turn
    pub recall_limit: usize,
    /// Per-segment spacing for multi-part replies
    pub segment_spacing: Duration,
    /// The privileged agent skips cooldown, markers and waiting
    pub privileged_exempt: bool,
}

impl Default for AgentTuning {
    fn default() -> Self {
        Self {
            wait_for_context: Duration::from_secs(15),
            cooldown: Duration::from_secs(3),
            short_term_capacity: 20,
            recall_limit: 5,
            segment_spacing: Duration::from_secs(1),
            privileged_exempt: true,
        }
    }
}

impl From<&chorus_config::OrchestrationConfig> for AgentTuning {
    fn from(config: &chorus_config::OrchestrationConfig) -> Self {
        let secs = |value: f64| Duration::try_from_secs_f64(value).unwrap_or_default();
        Self {
            wait_for_context: secs(config.wait_for_context_secs),
            cooldown: secs(config.agent_cooldown_secs),
            short_term_capacity: config.short_term_capacity,
            recall_limit: config.recall_limit,
            segment_spacing: secs(config.segment_spacing_secs),
            privileged_exempt: config.privileged_exempt,
        }
    }
}

/// Wait-for-context FSM value.
#[derive(Debug, Default)]
pub enum WaitState {
    #[default]
    Idle,
    Waiting {
        /// The message the agent is waiting to see continued
        message: ChatMessage,
        since: Instant,
        /// Cancels the expiry timer
        timer: CancellationToken,
    },
}

impl WaitState {
    pub fn is_waiting(&self) -> bool {
        matches!(self, WaitState::Waiting { .. })
    }

    /// Leave the waiting state, cancelling its timer. Returns the awaited message.
    fn reset(&mut self) -> Option<ChatMessage> {
        match std::mem::take(self) {
            WaitState::Idle => None,
            WaitState::Waiting { message, timer, .. } => {
                timer.cancel();
                Some(message)
            }
        }
    }
}

/// Mutable per-agent state, guarded by one lock.
#[derive(Debug, Default)]
struct AgentState {
    wait: WaitState,
    last_agent_reply: Option<Instant>,
    short_term: VecDeque<ChatMessage>,
}

impl AgentState {
    fn remember(&mut self, message: &ChatMessage, capacity: usize) {
        if self.short_term.iter().any(|m| m.id == message.id) {
            return;
        }
        self.short_term.push_back(message.clone());
        while self.short_term.len() > capacity {
            self.short_term.pop_front();
        }
    }
}

type Jitter = Arc<dyn Fn() -> Duration + Send + Sync>;

fn random_jitter() -> Duration {
    Duration::from_secs_f64(rand::rng().random_range(0.5..1.5))
}

/// A conversational agent.
pub struct Agent {
    profile: AgentProfile,
    generator: Arc<dyn GenerationBackend>,
    memory: MemoryStore,
    tuning: AgentTuning,
    retention: RetentionPolicy,
    events: Arc<EventBus>,
    state: Arc<Mutex<AgentState>>,
    jitter: Jitter,
}

impl Agent {
    pub fn new(
        profile: AgentProfile,
        generator: Arc<dyn GenerationBackend>,
        memory: MemoryStore,
        events: Arc<EventBus>,
    ) -> Self {
        Self {
            profile,
            generator,
            memory,
            tuning: AgentTuning::default(),
            retention: RetentionPolicy::default(),
            events,
            state: Arc::new(Mutex::new(AgentState::default())),
            jitter: Arc::new(random_jitter),
        }
    }

    pub fn with_tuning(mut self, tuning: AgentTuning) -> Self {
        self.tuning = tuning;
        self
    }

    pub fn with_retention(mut self, retention: RetentionPolicy) -> Self {
        self.retention = retention;
        self
    }

    /// Replace the random multi-part jitter (tests use a fixed value).
    pub fn with_jitter(mut self, jitter: impl Fn() -> Duration + Send + Sync + 'static) -> Self {
        self.jitter = Arc::new(jitter);
        self
    }

    pub fn profile(&self) -> &AgentProfile {
        &self.profile
    }

    pub fn id(&self) -> &str {
        &self.profile.id
    }

    pub fn name(&self) -> &str {
        &self.profile.name
    }

    pub fn is_privileged(&self) -> bool {
        self.profile.is_privileged
    }

    pub fn memory(&self) -> &MemoryStore {
        &self.memory
    }

    pub fn tuning(&self) -> &AgentTuning {
        &self.tuning
    }

    fn is_exempt(&self) -> bool {
        self.profile.is_privileged && self.tuning.privileged_exempt
    }

    /// Whether the agent is currently waiting for a follow-up message.
    pub async fn is_waiting(&self) -> bool {
        self.state.lock().await.wait.is_waiting()
    }

    /// Id of the message being waited on, if any.
    pub async fn awaited_message_id(&self) -> Option<String> {
        match &self.state.lock().await.wait {
            WaitState::Idle => None,
            WaitState::Waiting { message, .. } => Some(message.id.clone()),
        }
    }

    /// A copy of the short-term window, oldest first.
    pub async fn short_term(&self) -> Vec<ChatMessage> {
        self.state.lock().await.short_term.iter().cloned().collect()
    }

    /// Cancel any pending wait timer and return to idle.
    pub async fn shutdown(&self) {
        let mut state = self.state.lock().await;
        if state.wait.reset().is_some() {
            debug!(agent = %self.profile.name, "Wait cancelled on shutdown");
            self.publish_wait(false);
        }
    }

    /// Run one turn for `incoming`, posted in `channel`.
    ///
    /// `roster` describes the channel participants; `is_from_agent` is true
    /// when another agent wrote `incoming`. Returns the messages to post, in
    /// order. An empty list means the agent stays quiet this turn.
    pub async fn process(
        &self,
        incoming: &ChatMessage,
        channel: &ChatChannel,
        roster: &[Participant],
        is_from_agent: bool,
    ) -> Result<Vec<OutboundMessage>> {
        let exempt = self.is_exempt();

        let (previously_awaited, history) = {
            let mut state = self.state.lock().await;

            if is_from_agent
                && !exempt
                && incoming.sender_id != self.profile.id
                && state
                    .last_agent_reply
                    .is_some_and(|at| at.elapsed() < self.tuning.cooldown)
            {
                debug!(agent = %self.profile.name, sender = %incoming.sender_name, "In cooldown, ignoring agent message");
                return Ok(Vec::new());
            }

            let continues = match &state.wait {
                WaitState::Idle => None,
                WaitState::Waiting { message, .. } => Some(
                    message.sender_id == incoming.sender_id
                        && message.channel_id == incoming.channel_id,
                ),
            };

            let previously_awaited = match continues {
                None => None,
                Some(true) => {
                    info!(agent = %self.profile.name, channel = %incoming.channel_id, "Follow-up arrived, resuming");
                    self.publish_wait(false);
                    state.wait.reset()
                }
                Some(false) => {
                    debug!(
                        agent = %self.profile.name,
                        dropped = %incoming.id,
                        "Waiting for context, dropping unrelated message"
                    );
                    return Ok(Vec::new());
                }
            };

            state.remember(incoming, self.tuning.short_term_capacity);
            let history: Vec<ChatMessage> = state.short_term.iter().cloned().collect();
            (previously_awaited, history)
        };

        let memories = self
            .memory
            .query(&self.recall_query(incoming, channel, roster), self.tuning.recall_limit)
            .await?;

        let prompt = build_prompt(&PromptContext {
            persona: &self.profile.persona,
            history: &history,
            history_limit: self.tuning.short_term_capacity,
            memories: &memories,
            roster,
            channel_name: &channel.name,
            is_group: !channel.is_direct_message,
            incoming,
            is_from_agent,
            previously_awaited: previously_awaited.as_ref(),
            now: Utc::now(),
        });

        let raw = self.generator.generate(&prompt).await?;

        let outbound = if exempt {
            let content = strip_markers(&raw);
            if content.is_empty() {
                Vec::new()
            } else {
                vec![OutboundMessage::new(content, channel.id.clone())]
            }
        } else {
            let parsed = parse_response(&raw);
            debug!(agent = %self.profile.name, behavior = ?parsed.behavior, segments = parsed.messages.len(), "Parsed reply");

            if parsed.behavior == Behavior::WaitForContext {
                if previously_awaited.is_some() {
                    debug!(agent = %self.profile.name, "Wait requested on a continuation, staying silent");
                } else {
                    self.enter_wait(incoming).await;
                }
                return Ok(Vec::new());
            }

            let jitter = Arc::clone(&self.jitter);
            parsed.into_outbound(&channel.id, self.tuning.segment_spacing, move || jitter())
        };

        let responded = !outbound.is_empty();
        if is_from_agent && responded && !exempt {
            self.state.lock().await.last_agent_reply = Some(Instant::now());
        }

        self.retain(incoming, channel, is_from_agent, responded, &history)
            .await?;

        Ok(outbound)
    }

    /// "channel name + participant names + sender + content", used to recall memories.
    fn recall_query(&self, incoming: &ChatMessage, channel: &ChatChannel, roster: &[Participant]) -> String {
        let names: Vec<&str> = channel
            .participants
            .iter()
            .map(|id| {
                roster
                    .iter()
                    .find(|p| &p.id == id)
                    .map(|p| p.name.as_str())
                    .unwrap_or(if *id == self.profile.id {
                        self.profile.name.as_str()
                    } else {
                        id.as_str()
                    })
            })
            .collect();

        format!(
            "Context: Chat in '{}'. Participants: {}. Incoming Message from {}: {}",
            channel.name,
            names.join(", "),
            incoming.sender_name,
            incoming.content
        )
    }

    async fn enter_wait(&self, incoming: &ChatMessage) {
        let timer = CancellationToken::new();
        {
            let mut state = self.state.lock().await;
            state.wait.reset();
            state.wait = WaitState::Waiting {
                message: incoming.clone(),
                since: Instant::now(),
                timer: timer.clone(),
            };
        }

        info!(
            agent = %self.profile.name,
            channel = %incoming.channel_id,
            secs = self.tuning.wait_for_context.as_secs_f64(),
            "Waiting for more context"
        );
        self.publish_wait(true);
        self.arm_wait_timer(incoming.id.clone(), timer);
    }

    /// Return to idle after the wait window unless the wait was resolved first.
    fn arm_wait_timer(&self, message_id: String, timer: CancellationToken) {
        let state = Arc::clone(&self.state);
        let events = Arc::clone(&self.events);
        let agent_id = self.profile.id.clone();
        let agent_name = self.profile.name.clone();
        let window = self.tuning.wait_for_context;

        tokio::spawn(async move {
            tokio::select! {
                _ = timer.cancelled() => {
                    debug!(agent = %agent_name, "Wait timer cancelled");
                }
                _ = tokio::time::sleep(window) => {
                    let mut state = state.lock().await;
                    if timer.is_cancelled() {
                        return;
                    }
                    let still_waiting = matches!(
                        &state.wait,
                        WaitState::Waiting { message, .. } if message.id == message_id
                    );
                    if still_waiting {
                        state.wait = WaitState::Idle;
                        drop(state);
                        info!(agent = %agent_name, "No follow-up arrived, wait expired");
                        events.publish(DomainEvent::AgentWaitChanged {
                            agent_id,
                            waiting: false,
                            timestamp: Utc::now(),
                        });
                    }
                }
            }
        });
    }

    async fn retain(
        &self,
        incoming: &ChatMessage,
        channel: &ChatChannel,
        is_from_agent: bool,
        responded: bool,
        history: &[ChatMessage],
    ) -> std::result::Result<(), EmbeddingError> {
        let decision =
            self.retention
                .evaluate(incoming, &self.profile.id, is_from_agent, responded, history);
        if decision != Retention::Store {
            debug!(agent = %self.profile.name, reason = ?decision, "Not storing message");
            return Ok(());
        }

        let text = memory_text(&channel.name, incoming);
        match self
            .memory
            .add(&text, Some(&incoming.sender_id), None, 1.0)
            .await
        {
            Ok(_) => debug!(agent = %self.profile.name, "Stored message in long-term memory"),
            // Kept in memory; only the save failed.
            Err(EmbeddingError::Persistence(e)) => {
                warn!(agent = %self.profile.name, error = %e, "Failed to persist memory")
            }
            Err(e) => return Err(e),
        }
        Ok(())
    }

    fn publish_wait(&self, waiting: bool) {
        self.events.publish(DomainEvent::AgentWaitChanged {
            agent_id: self.profile.id.clone(),
            waiting,
            timestamp: Utc::now(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{FailingEmbedder, HashEmbedder, ScriptedGenerator};
    use chorus_core::channel::ChannelId;
    use chorus_core::error::{Error, GenerationError, StorageError};
    use chorus_core::memory::{MemoryItem, MemoryStorage};
    use chorus_memory::InMemoryStorage;

    fn lab() -> ChatChannel {
        ChatChannel::group(
            ChannelId::from("lab"),
            "Physics II",
            vec!["user".into(), "aldo".into(), "fer".into(), "isa".into()],
        )
    }

    fn roster() -> Vec<Participant> {
        vec![
            Participant::human("user", "Omar"),
            Participant::agent("aldo", "Aldo"),
            Participant::agent("fer", "Fernanda"),
            Participant::agent("isa", "Isa"),
        ]
    }

    fn agent_with(generator: Arc<ScriptedGenerator>) -> Agent {
        agent_with_profile(AgentProfile::new("aldo", "Aldo", "A Linux developer."), generator)
    }

    fn agent_with_profile(profile: AgentProfile, generator: Arc<ScriptedGenerator>) -> Agent {
        let memory = MemoryStore::new(
            profile.id.clone(),
            Arc::new(HashEmbedder::default()),
            Arc::new(InMemoryStorage::new()),
        );
        Agent::new(profile, generator, memory, Arc::new(EventBus::default()))
            .with_jitter(|| Duration::from_millis(500))
    }

    fn from_user(content: &str) -> ChatMessage {
        ChatMessage::new("user", "Omar", content, ChannelId::from("lab"))
    }

    fn from_fer(content: &str) -> ChatMessage {
        ChatMessage::new("fer", "Fernanda", content, ChannelId::from("lab"))
    }

    #[tokio::test]
    async fn normal_reply() {
        let generator = ScriptedGenerator::new(["[BEHAVIOR_NORMAL] Qué onda!"]);
        let agent = agent_with(generator.clone());

        let out = agent.process(&from_user("Hola equipo"), &lab(), &roster(), false).await.unwrap();
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].content, "Qué onda!");
        assert_eq!(out[0].target_channel_id, ChannelId::from("lab"));
        assert!(generator.prompts()[0].contains("Omar (the user) just said: Hola equipo"));
    }

    #[tokio::test]
    async fn multi_part_reply_has_increasing_delays() {
        let generator = ScriptedGenerator::new([
            "[BEHAVIOR_MULTI_SHORT] Hola! [SPLIT_MESSAGE_HERE] Soy Aldo [SPLIT_MESSAGE_HERE] uso Arch btw",
        ]);
        let agent = agent_with(generator);

        let out = agent.process(&from_user("Hola equipo"), &lab(), &roster(), false).await.unwrap();
        let delays: Vec<_> = out.iter().map(|m| m.delay.unwrap()).collect();
        assert_eq!(
            delays,
            vec![
                Duration::from_millis(500),
                Duration::from_millis(1500),
                Duration::from_millis(2500)
            ]
        );
    }

    #[tokio::test]
    async fn short_term_window_evicts_oldest() {
        let generator = ScriptedGenerator::new(Vec::<&str>::new());
        let tuning = AgentTuning {
            short_term_capacity: 3,
            ..AgentTuning::default()
        };
        let agent = agent_with(generator).with_tuning(tuning);

        for i in 0..5 {
            agent.process(&from_user(&format!("msg {i}")), &lab(), &roster(), false).await.unwrap();
        }

        let window: Vec<_> = agent.short_term().await.into_iter().map(|m| m.content).collect();
        assert_eq!(window, vec!["msg 2", "msg 3", "msg 4"]);
    }

    #[tokio::test]
    async fn same_message_is_remembered_once() {
        let agent = agent_with(ScriptedGenerator::new(Vec::<&str>::new()));
        let message = from_user("hola");
        agent.process(&message, &lab(), &roster(), false).await.unwrap();
        agent.process(&message, &lab(), &roster(), false).await.unwrap();
        assert_eq!(agent.short_term().await.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn wait_then_continuation_replies_once() {
        let generator = ScriptedGenerator::new([
            "[BEHAVIOR_WAIT_FOR_CONTEXT]",
            "[BEHAVIOR_NORMAL] Ah, sensores de humedad. Me gusta.",
        ]);
        let agent = agent_with(generator.clone());

        let first = from_user("Tengo una idea...");
        assert!(agent.process(&first, &lab(), &roster(), false).await.unwrap().is_empty());
        assert!(agent.is_waiting().await);
        assert_eq!(agent.awaited_message_id().await, Some(first.id.clone()));

        let follow_up = from_user("usar sensores de humedad");
        let out = agent.process(&follow_up, &lab(), &roster(), false).await.unwrap();
        assert_eq!(out.len(), 1);
        assert!(!agent.is_waiting().await);

        let prompt = &generator.prompts()[1];
        assert!(prompt.contains("You previously decided to wait for more context"));
        assert!(prompt.contains("'Tengo una idea...'"));
        assert!(prompt.contains("Do not choose [BEHAVIOR_WAIT_FOR_CONTEXT] again"));
    }

    #[tokio::test(start_paused = true)]
    async fn wait_on_continuation_is_treated_as_silent() {
        let generator = ScriptedGenerator::new([
            "[BEHAVIOR_WAIT_FOR_CONTEXT]",
            "[BEHAVIOR_WAIT_FOR_CONTEXT]",
        ]);
        let agent = agent_with(generator);

        agent.process(&from_user("Tengo una idea..."), &lab(), &roster(), false).await.unwrap();
        let out = agent.process(&from_user("es sobre sensores"), &lab(), &roster(), false).await.unwrap();
        assert!(out.is_empty());
        assert!(!agent.is_waiting().await);
    }

    #[tokio::test(start_paused = true)]
    async fn unrelated_message_dropped_while_waiting() {
        let generator = ScriptedGenerator::new(["[BEHAVIOR_WAIT_FOR_CONTEXT]", "[BEHAVIOR_NORMAL] never"]);
        let agent = agent_with(generator.clone());

        let first = from_user("Tengo una idea...");
        agent.process(&first, &lab(), &roster(), false).await.unwrap();

        let other = from_fer("Alguien vio mi soldador?");
        let out = agent.process(&other, &lab(), &roster(), true).await.unwrap();
        assert!(out.is_empty());
        assert_eq!(generator.call_count(), 1);
        assert_eq!(agent.awaited_message_id().await, Some(first.id));
        // Dropped messages never reach the short-term window
        assert_eq!(agent.short_term().await.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn wait_times_out_to_idle() {
        let generator = ScriptedGenerator::new(["[BEHAVIOR_WAIT_FOR_CONTEXT]", "[BEHAVIOR_NORMAL] Hola Fer"]);
        let agent = agent_with(generator.clone());
        let mut events = agent.events.subscribe();

        agent.process(&from_user("Tengo una idea..."), &lab(), &roster(), false).await.unwrap();
        assert!(agent.is_waiting().await);

        tokio::time::sleep(Duration::from_secs(16)).await;
        assert!(!agent.is_waiting().await);

        let mut transitions = Vec::new();
        while let Ok(event) = events.try_recv() {
            if let DomainEvent::AgentWaitChanged { waiting, .. } = event.as_ref() {
                transitions.push(*waiting);
            }
        }
        assert_eq!(transitions, vec![true, false]);

        // The next unrelated message is processed normally
        let out = agent.process(&from_fer("Hola a todos, qué tal?"), &lab(), &roster(), true).await.unwrap();
        assert_eq!(out.len(), 1);
        assert_eq!(generator.call_count(), 2);
        let prompt = &generator.prompts()[1];
        assert!(!prompt.contains("You previously decided to wait"));
        assert!(!prompt.contains("Do not choose [BEHAVIOR_WAIT_FOR_CONTEXT] again"));
    }

    #[tokio::test(start_paused = true)]
    async fn resolved_wait_timer_does_not_fire() {
        let generator = ScriptedGenerator::new([
            "[BEHAVIOR_WAIT_FOR_CONTEXT]",
            "[BEHAVIOR_NORMAL] ok",
            "[BEHAVIOR_WAIT_FOR_CONTEXT]",
        ]);
        let agent = agent_with(generator);

        agent.process(&from_user("Tengo una idea..."), &lab(), &roster(), false).await.unwrap();
        tokio::time::sleep(Duration::from_secs(10)).await;
        agent.process(&from_user("sensores!"), &lab(), &roster(), false).await.unwrap();

        // New wait begins at t=10s; the first timer would have fired at t=15s
        let second = from_user("y otra cosa...");
        agent.process(&second, &lab(), &roster(), false).await.unwrap();
        tokio::time::sleep(Duration::from_secs(6)).await;
        assert_eq!(agent.awaited_message_id().await, Some(second.id));

        tokio::time::sleep(Duration::from_secs(10)).await;
        assert!(!agent.is_waiting().await);
    }

    #[tokio::test(start_paused = true)]
    async fn cooldown_blocks_agent_messages() {
        let generator = ScriptedGenerator::new([
            "[BEHAVIOR_NORMAL] Yo tengo uno",
            "[BEHAVIOR_NORMAL] second",
            "[BEHAVIOR_NORMAL] third",
        ]);
        let agent = agent_with(generator.clone());

        let out = agent.process(&from_fer("Alguien tiene un Arduino?"), &lab(), &roster(), true).await.unwrap();
        assert_eq!(out.len(), 1);

        tokio::time::sleep(Duration::from_secs(1)).await;
        let blocked = agent.process(&from_fer("Y un cable USB?"), &lab(), &roster(), true).await.unwrap();
        assert!(blocked.is_empty());
        assert_eq!(generator.call_count(), 1);

        // Human messages are never gated
        let human = agent.process(&from_user("Yo también"), &lab(), &roster(), false).await.unwrap();
        assert_eq!(human.len(), 1);

        tokio::time::sleep(Duration::from_secs(3)).await;
        let after = agent.process(&from_fer("Y un protoboard?"), &lab(), &roster(), true).await.unwrap();
        assert_eq!(after.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn silence_does_not_start_cooldown() {
        let generator = ScriptedGenerator::new(["[BEHAVIOR_SILENT]", "[BEHAVIOR_NORMAL] sí"]);
        let agent = agent_with(generator);

        agent.process(&from_fer("Hola chicos"), &lab(), &roster(), true).await.unwrap();
        let out = agent.process(&from_fer("Alguien?"), &lab(), &roster(), true).await.unwrap();
        assert_eq!(out.len(), 1);
    }

    #[tokio::test]
    async fn generation_failure_propagates_and_keeps_idle() {
        let generator = ScriptedGenerator::with_results(vec![Err(GenerationError::Network("offline".into()))]);
        let agent = agent_with(generator);

        let err = agent.process(&from_user("Hola"), &lab(), &roster(), false).await.unwrap_err();
        assert!(matches!(err, Error::Generation(GenerationError::Network(_))));
        assert!(!agent.is_waiting().await);
    }

    #[tokio::test]
    async fn retains_long_human_messages() {
        let generator = ScriptedGenerator::new(["[BEHAVIOR_NORMAL] genial"]);
        let agent = agent_with(generator);

        agent
            .process(&from_user("Me encanta la robótica con materiales reciclados"), &lab(), &roster(), false)
            .await
            .unwrap();

        let stored = agent.memory().snapshot().await;
        assert_eq!(stored.len(), 1);
        assert_eq!(
            stored[0].text,
            "In the chat 'Physics II', Omar said: Me encanta la robótica con materiales reciclados"
        );
        assert_eq!(stored[0].associated_user_id.as_deref(), Some("user"));
    }

    #[tokio::test]
    async fn embedding_failure_while_storing_fails_the_turn() {
        let generator = ScriptedGenerator::new(["[BEHAVIOR_NORMAL] genial"]);
        let memory = MemoryStore::new("aldo", Arc::new(FailingEmbedder), Arc::new(InMemoryStorage::new()));
        let agent = Agent::new(
            AgentProfile::new("aldo", "Aldo", "A Linux developer."),
            generator.clone(),
            memory,
            Arc::new(EventBus::default()),
        );

        let err = agent
            .process(&from_user("Me encanta la robótica con materiales reciclados"), &lab(), &roster(), false)
            .await
            .unwrap_err();

        assert!(matches!(err, Error::Embedding(EmbeddingError::Network(_))));
        assert_eq!(generator.call_count(), 1);
        assert!(agent.memory().is_empty().await);
        assert!(!agent.is_waiting().await);
    }

    struct ReadOnlyStorage;

    #[async_trait::async_trait]
    impl MemoryStorage for ReadOnlyStorage {
        fn name(&self) -> &str {
            "read_only"
        }

        async fn load_all(&self, _agent_id: &str) -> std::result::Result<Vec<MemoryItem>, StorageError> {
            Ok(Vec::new())
        }

        async fn save_all(&self, agent_id: &str, _items: &[MemoryItem]) -> std::result::Result<(), StorageError> {
            Err(StorageError::Write {
                agent_id: agent_id.to_string(),
                reason: "disk full".into(),
            })
        }
    }

    #[tokio::test]
    async fn save_failure_keeps_reply_and_memory() {
        let generator = ScriptedGenerator::new(["[BEHAVIOR_NORMAL] genial"]);
        let memory = MemoryStore::new("aldo", Arc::new(HashEmbedder::default()), Arc::new(ReadOnlyStorage));
        let agent = Agent::new(
            AgentProfile::new("aldo", "Aldo", "A Linux developer."),
            generator,
            memory,
            Arc::new(EventBus::default()),
        );

        let out = agent
            .process(&from_user("Me encanta la robótica con materiales reciclados"), &lab(), &roster(), false)
            .await
            .unwrap();

        assert_eq!(out.len(), 1);
        assert_eq!(agent.memory().len().await, 1);
    }

    #[tokio::test]
    async fn recalled_memories_reach_the_prompt() {
        let generator = ScriptedGenerator::new(["[BEHAVIOR_NORMAL] ok", "[BEHAVIOR_NORMAL] ok"]);
        let agent = agent_with(generator.clone());

        agent
            .process(&from_user("Me encanta la robótica con materiales reciclados"), &lab(), &roster(), false)
            .await
            .unwrap();
        agent.process(&from_user("robótica?"), &lab(), &roster(), false).await.unwrap();

        assert!(generator.prompts()[1].contains("Relevant information from your memory:\n1. In the chat 'Physics II'"));
    }

    #[tokio::test(start_paused = true)]
    async fn privileged_agent_skips_markers_and_cooldown() {
        let generator = ScriptedGenerator::new([
            "[BEHAVIOR_WAIT_FOR_CONTEXT] {\"intent\": \"introduce_yourself\"}",
            "{\"scoreUpdates\": {\"robotics\": 1}}",
        ]);
        let profile = AgentProfile::orchestrator("orchestrator", "Orchestrator", "Track progress.");
        let agent = agent_with_profile(profile, generator);

        let out = agent.process(&from_fer("Hola, soy Fer"), &lab(), &roster(), true).await.unwrap();
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].content, "{\"intent\": \"introduce_yourself\"}");
        assert!(!agent.is_waiting().await);

        let out = agent.process(&from_fer("Me gustan los robots"), &lab(), &roster(), true).await.unwrap();
        assert_eq!(out.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_cancels_wait() {
        let agent = agent_with(ScriptedGenerator::new(["[BEHAVIOR_WAIT_FOR_CONTEXT]"]));
        agent.process(&from_user("Tengo una idea..."), &lab(), &roster(), false).await.unwrap();
        agent.shutdown().await;
        assert!(!agent.is_waiting().await);
    }

    #[test]
    fn tuning_from_config() {
        let config = chorus_config::OrchestrationConfig {
            wait_for_context_secs: 2.5,
            agent_cooldown_secs: 0.0,
            ..Default::default()
        };
        let tuning = AgentTuning::from(&config);
        assert_eq!(tuning.wait_for_context, Duration::from_millis(2500));
        assert_eq!(tuning.cooldown, Duration::ZERO);
        assert_eq!(tuning.short_term_capacity, config.short_term_capacity);
    }
}

//! The chat engine: channels, agents, propagation and progress.
//!
//! A user message is appended to its channel, then every agent in the
//! channel takes a turn, followed by the privileged orchestrator. Replies
//! that land publicly in a group channel are fanned out to the other agents
//! in that channel, one level deeper, until `max_depth` is exceeded.
//!
//! Propagation runs on an explicit worklist (a stack), so turns happen in
//! depth-first order: a reply is fully propagated before the next sibling
//! turn starts. Turns never interleave.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use chorus_agent::Agent;
use chorus_core::agent::Participant;
use chorus_core::channel::{ChannelId, ChatChannel};
use chorus_core::error::{Error, Result};
use chorus_core::event::{DomainEvent, EventBus};
use chorus_core::message::ChatMessage;
use chorus_core::progress::{
    ObjectiveStatus, OrchestratorOutput, ProgressState, apply_orchestrator_output,
};
use chrono::Utc;
use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Content of the message posted when an agent turn fails.
pub const TURN_FAILED_NOTICE: &str = "[System Error: Couldn't process my response.]";

/// Content of the message posted when the orchestrator output cannot be parsed.
pub const UNPARSEABLE_ORCHESTRATOR_NOTICE: &str =
    "[System Error: Orchestrator response was unparseable.]";

/// One agent turn taken while handling a user message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TurnRecord {
    pub agent_id: String,
    pub depth: u32,
    /// Messages appended to channels by this turn
    pub posted: usize,
    pub failed: bool,
}

/// What happened while handling one user message.
#[derive(Debug, Clone, Default)]
pub struct DispatchReport {
    /// Id of the user message that started the chain
    pub message_id: String,
    /// Turns in execution order
    pub turns: Vec<TurnRecord>,
    /// Turns skipped because they would exceed the depth bound
    pub depth_cutoffs: usize,
}

impl DispatchReport {
    /// Turns taken by `agent_id`, in order.
    pub fn turns_of<'a>(&'a self, agent_id: &'a str) -> impl Iterator<Item = &'a TurnRecord> + 'a {
        self.turns.iter().filter(move |t| t.agent_id == agent_id)
    }

    pub fn messages_posted(&self) -> usize {
        self.turns.iter().map(|t| t.posted).sum()
    }

    pub fn failures(&self) -> usize {
        self.turns.iter().filter(|t| t.failed).count()
    }

    pub fn max_depth(&self) -> u32 {
        self.turns.iter().map(|t| t.depth).max().unwrap_or(0)
    }
}

enum Work {
    /// `agent` processes `message` from `channel_id`.
    Turn {
        agent: Arc<Agent>,
        message: ChatMessage,
        channel_id: ChannelId,
        depth: u32,
    },
    /// `message`, just posted by `sender`, is offered to the other agents.
    Fanout {
        sender: Arc<Agent>,
        message: ChatMessage,
        channel_id: ChannelId,
        depth: u32,
    },
}

/// Owns all channels, agents and narrative progress.
pub struct ChatEngine {
    user: Participant,
    agents: Vec<Arc<Agent>>,
    orchestrator: Arc<Agent>,
    channels: RwLock<Vec<ChatChannel>>,
    progress: RwLock<ProgressState>,
    events: Arc<EventBus>,
    max_depth: u32,
    busy: AtomicBool,
    /// One user message is handled at a time.
    submission: Mutex<()>,
}

impl ChatEngine {
    pub fn new(user: Participant, orchestrator: Agent, events: Arc<EventBus>) -> Self {
        Self {
            user,
            agents: Vec::new(),
            orchestrator: Arc::new(orchestrator),
            channels: RwLock::new(Vec::new()),
            progress: RwLock::new(ProgressState::initial()),
            events,
            max_depth: 2,
            busy: AtomicBool::new(false),
            submission: Mutex::new(()),
        }
    }

    pub fn with_agent(mut self, agent: Agent) -> Self {
        self.agents.push(Arc::new(agent));
        self
    }

    pub fn with_channel(mut self, channel: ChatChannel) -> Self {
        self.channels.get_mut().push(channel);
        self
    }

    pub fn with_max_depth(mut self, max_depth: u32) -> Self {
        self.max_depth = max_depth;
        self
    }

    pub fn with_progress(mut self, progress: ProgressState) -> Self {
        *self.progress.get_mut() = progress;
        self
    }

    pub fn user(&self) -> &Participant {
        &self.user
    }

    pub fn agents(&self) -> &[Arc<Agent>] {
        &self.agents
    }

    pub fn agent(&self, agent_id: &str) -> Option<&Arc<Agent>> {
        self.agents.iter().find(|a| a.id() == agent_id)
    }

    pub fn orchestrator(&self) -> &Arc<Agent> {
        &self.orchestrator
    }

    pub fn events(&self) -> &Arc<EventBus> {
        &self.events
    }

    /// Whether a user message is currently being handled.
    pub fn is_processing(&self) -> bool {
        self.busy.load(Ordering::SeqCst)
    }

    /// A snapshot of every channel.
    pub async fn channels(&self) -> Vec<ChatChannel> {
        self.channels.read().await.clone()
    }

    pub async fn channel(&self, channel_id: &ChannelId) -> Option<ChatChannel> {
        self.channels
            .read()
            .await
            .iter()
            .find(|c| &c.id == channel_id)
            .cloned()
    }

    /// A snapshot of narrative progress.
    pub async fn progress(&self) -> ProgressState {
        self.progress.read().await.clone()
    }

    /// Messages in `channel_id` the user is allowed to see.
    pub async fn visible_messages(&self, channel_id: &ChannelId) -> Vec<ChatMessage> {
        let channels = self.channels.read().await;
        channels
            .iter()
            .find(|c| &c.id == channel_id)
            .map(|c| {
                c.messages_visible_to(&self.user.id)
                    .into_iter()
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Record that `participant_id` has seen a message. Returns `true` if
    /// this is the first time.
    pub async fn mark_message_seen(
        &self,
        channel_id: &ChannelId,
        message_id: &str,
        participant_id: &str,
    ) -> bool {
        let mut channels = self.channels.write().await;
        channels
            .iter_mut()
            .find(|c| &c.id == channel_id)
            .is_some_and(|c| c.mark_seen(message_id, participant_id))
    }

    /// Mark every message in the channel not sent by the user as seen by
    /// the user. Returns how many were newly marked.
    pub async fn mark_all_seen_by_user(&self, channel_id: &ChannelId) -> usize {
        let mut channels = self.channels.write().await;
        channels
            .iter_mut()
            .find(|c| &c.id == channel_id)
            .map(|c| c.mark_all_seen_by(&self.user.id))
            .unwrap_or(0)
    }

    /// Open a direct channel with an agent, or return the existing one.
    pub async fn create_direct_channel(&self, agent_id: &str) -> Result<ChannelId> {
        let agent = self
            .agent(agent_id)
            .ok_or_else(|| Error::UnknownAgent(agent_id.to_string()))?;

        let mut channels = self.channels.write().await;
        if let Some(existing) = channels.iter().find(|c| {
            c.is_direct_message
                && c.participants.len() == 2
                && c.has_participant(&self.user.id)
                && c.has_participant(agent_id)
        }) {
            return Ok(existing.id.clone());
        }

        let channel = ChatChannel::direct(
            ChannelId::new(),
            format!("Chat with {}", agent.name()),
            self.user.id.clone(),
            agent_id,
        );
        let id = channel.id.clone();
        info!(channel = %id, agent = %agent.name(), "Direct channel created");
        channels.push(channel);
        Ok(id)
    }

    /// Create a group channel with the user and the given agents.
    pub async fn create_group_channel(&self, name: &str, agent_ids: &[&str]) -> Result<ChannelId> {
        if let Some(unknown) = agent_ids.iter().find(|id| self.agent(id).is_none()) {
            return Err(Error::UnknownAgent(unknown.to_string()));
        }

        let mut participants = vec![self.user.id.clone()];
        participants.extend(agent_ids.iter().map(|id| id.to_string()));
        let channel = ChatChannel::group(ChannelId::new(), name, participants);
        let id = channel.id.clone();
        info!(channel = %id, name, "Group channel created");
        self.channels.write().await.push(channel);
        Ok(id)
    }

    /// Load every agent's persisted memories in the background.
    pub fn spawn_memory_restore(&self) -> Vec<JoinHandle<usize>> {
        self.agents
            .iter()
            .chain(std::iter::once(&self.orchestrator))
            .map(|agent| agent.memory().spawn_restore())
            .collect()
    }

    /// Cancel every pending wait timer.
    pub async fn shutdown(&self) {
        for agent in self.agents.iter().chain(std::iter::once(&self.orchestrator)) {
            agent.shutdown().await;
        }
        info!("Engine shut down");
    }

    /// Post a user message and let every agent react to it.
    pub async fn submit_user_message(
        &self,
        text: &str,
        channel_id: &ChannelId,
    ) -> Result<DispatchReport> {
        let _submission = self.submission.lock().await;

        let message = ChatMessage::new(
            self.user.id.clone(),
            self.user.name.clone(),
            text,
            channel_id.clone(),
        );

        let recipients: Vec<Arc<Agent>> = {
            let mut channels = self.channels.write().await;
            let channel = channels
                .iter_mut()
                .find(|c| &c.id == channel_id)
                .ok_or_else(|| Error::UnknownChannel(channel_id.to_string()))?;
            channel.push(message.clone());
            channel
                .participants
                .iter()
                .filter(|id| **id != self.user.id)
                .filter_map(|id| self.agent(id).cloned())
                .collect()
        };
        self.publish_appended(&message);
        self.set_busy(true);

        info!(channel = %channel_id, agents = recipients.len(), "User message posted");

        // Popped in reverse: channel agents in roster order, then the orchestrator.
        let mut work = vec![Work::Turn {
            agent: Arc::clone(&self.orchestrator),
            message: message.clone(),
            channel_id: channel_id.clone(),
            depth: 0,
        }];
        work.extend(recipients.into_iter().rev().map(|agent| Work::Turn {
            agent,
            message: message.clone(),
            channel_id: channel_id.clone(),
            depth: 0,
        }));

        let mut report = DispatchReport {
            message_id: message.id.clone(),
            ..Default::default()
        };
        self.drain(work, &mut report).await;

        self.set_busy(false);
        debug!(
            turns = report.turns.len(),
            posted = report.messages_posted(),
            cutoffs = report.depth_cutoffs,
            "User message handled"
        );
        Ok(report)
    }

    async fn drain(&self, mut work: Vec<Work>, report: &mut DispatchReport) {
        while let Some(item) = work.pop() {
            match item {
                Work::Turn {
                    agent,
                    message,
                    channel_id,
                    depth,
                } => {
                    if depth > self.max_depth {
                        info!(agent = %agent.name(), channel = %channel_id, depth, "Max propagation depth reached");
                        report.depth_cutoffs += 1;
                        continue;
                    }

                    let produced = self.take_turn(&agent, &message, &channel_id, depth, report).await;
                    work.extend(produced.into_iter().rev().map(|message| Work::Fanout {
                        sender: Arc::clone(&agent),
                        message,
                        channel_id: channel_id.clone(),
                        depth,
                    }));
                }
                Work::Fanout {
                    sender,
                    message,
                    channel_id,
                    depth,
                } => {
                    if sender.is_waiting().await {
                        debug!(agent = %sender.name(), "Sender is waiting for context, not propagating");
                        continue;
                    }
                    let Some(channel) = self.channel(&channel_id).await else {
                        continue;
                    };

                    let targets: Vec<Arc<Agent>> = channel
                        .participants
                        .iter()
                        .filter(|id| **id != self.user.id && *id != sender.id())
                        .filter_map(|id| self.agent(id).cloned())
                        .collect();

                    for target in targets.into_iter().rev() {
                        debug!(from = %sender.name(), to = %target.name(), channel = %channel_id, depth = depth + 1, "Propagating");
                        work.push(Work::Turn {
                            agent: target,
                            message: message.clone(),
                            channel_id: channel_id.clone(),
                            depth: depth + 1,
                        });
                    }
                }
            }
        }
    }

    /// Run one agent turn. Returns the messages eligible for propagation.
    async fn take_turn(
        &self,
        agent: &Arc<Agent>,
        message: &ChatMessage,
        channel_id: &ChannelId,
        depth: u32,
        report: &mut DispatchReport,
    ) -> Vec<ChatMessage> {
        let channel = {
            let mut channels = self.channels.write().await;
            let Some(channel) = channels.iter_mut().find(|c| &c.id == channel_id) else {
                warn!(agent = %agent.name(), channel = %channel_id, "Channel vanished before turn");
                return Vec::new();
            };
            if message.sender_id != agent.id() {
                channel.mark_seen(&message.id, agent.id());
            }
            channel.clone()
        };

        let roster = self.roster(&channel);
        let is_from_agent = message.sender_id != self.user.id;
        debug!(agent = %agent.name(), channel = %channel.id, depth, "Agent turn");

        let outbound = match agent.process(message, &channel, &roster, is_from_agent).await {
            Ok(outbound) => outbound,
            Err(e) => {
                warn!(agent = %agent.name(), channel = %channel.id, error = %e, "Agent turn failed");
                self.events.publish(DomainEvent::TurnFailed {
                    agent_id: agent.id().to_string(),
                    channel_id: channel.id.clone(),
                    error: e.to_string(),
                    timestamp: Utc::now(),
                });
                let notice = ChatMessage::new(agent.id(), agent.name(), TURN_FAILED_NOTICE, channel.id.clone())
                    .with_privacy(true);
                let posted = usize::from(self.append(notice).await);
                report.turns.push(TurnRecord {
                    agent_id: agent.id().to_string(),
                    depth,
                    posted,
                    failed: true,
                });
                return Vec::new();
            }
        };

        let mut posted = 0;
        let mut produced = Vec::new();

        for (index, out) in outbound.into_iter().enumerate() {
            if index > 0
                && let Some(delay) = out.delay
            {
                tokio::time::sleep(delay).await;
            }

            let reply = ChatMessage::new(agent.id(), agent.name(), out.content, out.target_channel_id)
                .with_privacy(out.is_private);

            if agent.is_privileged() {
                posted += self.apply_orchestrator_reply(agent, reply).await;
                continue;
            }

            if !self.append(reply.clone()).await {
                warn!(agent = %agent.name(), channel = %reply.channel_id, "Reply targets an unknown channel");
                continue;
            }
            posted += 1;
            if !reply.is_private && reply.channel_id == channel.id {
                produced.push(reply);
            }
        }

        report.turns.push(TurnRecord {
            agent_id: agent.id().to_string(),
            depth,
            posted,
            failed: false,
        });

        if channel.is_direct_message || agent.is_privileged() {
            return Vec::new();
        }
        produced
    }

    /// Apply structured orchestrator output to progress. Returns the number
    /// of channel messages posted (the parse-failure notice).
    async fn apply_orchestrator_reply(&self, agent: &Agent, reply: ChatMessage) -> usize {
        let output = match OrchestratorOutput::parse(&reply.content) {
            Ok(output) => output,
            Err(e) => {
                warn!(agent = %agent.name(), error = %e, raw = %reply.content, "Unparseable orchestrator output");
                let notice = ChatMessage::new(
                    agent.id(),
                    agent.name(),
                    UNPARSEABLE_ORCHESTRATOR_NOTICE,
                    reply.channel_id.clone(),
                )
                .with_privacy(true);
                return usize::from(self.append(notice).await);
            }
        };

        for content in output.system_messages.iter().flatten() {
            info!(content = %content, "System message");
            self.events.publish(DomainEvent::SystemMessage {
                content: content.clone(),
                timestamp: Utc::now(),
            });
        }

        let (before, after) = {
            let mut progress = self.progress.write().await;
            let before = progress.clone();
            *progress = apply_orchestrator_output(before.clone(), &output);
            (before, progress.clone())
        };

        if after.affinity != before.affinity {
            debug!(scores = ?after.affinity, "Affinity updated");
            self.events.publish(DomainEvent::AffinityUpdated {
                scores: after.affinity,
                timestamp: Utc::now(),
            });
        }

        for objective in &after.objectives {
            let was_completed = before
                .objective(&objective.tag)
                .is_some_and(|o| o.status == ObjectiveStatus::Completed);
            if objective.status == ObjectiveStatus::Completed && !was_completed {
                info!(tag = %objective.tag, percent = after.progress_percent(), "Objective completed");
                self.events.publish(DomainEvent::ObjectiveCompleted {
                    tag: objective.tag.clone(),
                    timestamp: Utc::now(),
                });
            }
        }

        0
    }

    /// Participants of `channel` as agents see them.
    fn roster(&self, channel: &ChatChannel) -> Vec<Participant> {
        channel
            .participants
            .iter()
            .map(|id| {
                if *id == self.user.id {
                    self.user.clone()
                } else if let Some(agent) = self.agent(id) {
                    Participant::agent(agent.id(), agent.name())
                } else {
                    Participant::agent(id.clone(), "Unknown Participant")
                }
            })
            .collect()
    }

    /// Append to the message's channel. Returns `false` if the channel is unknown.
    async fn append(&self, message: ChatMessage) -> bool {
        let appended = {
            let mut channels = self.channels.write().await;
            match channels.iter_mut().find(|c| c.id == message.channel_id) {
                Some(channel) => {
                    channel.push(message.clone());
                    true
                }
                None => false,
            }
        };
        if appended {
            self.publish_appended(&message);
        }
        appended
    }

    fn publish_appended(&self, message: &ChatMessage) {
        self.events.publish(DomainEvent::MessageAppended {
            channel_id: message.channel_id.clone(),
            message_id: message.id.clone(),
            sender_id: message.sender_id.clone(),
            is_private: message.is_private,
            timestamp: Utc::now(),
        });
    }

    fn set_busy(&self, busy: bool) {
        self.busy.store(busy, Ordering::SeqCst);
        self.events.publish(DomainEvent::ProcessingChanged {
            busy,
            timestamp: Utc::now(),
        });
    }
}

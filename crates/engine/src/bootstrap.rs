//! Build a [`ChatEngine`] from an [`AppConfig`].

use std::sync::Arc;

use chorus_agent::{Agent, AgentTuning, RetentionPolicy};
use chorus_config::AppConfig;
use chorus_core::agent::{AgentProfile, Participant};
use chorus_core::channel::{ChannelId, ChatChannel};
use chorus_core::error::{Error, Result};
use chorus_core::event::EventBus;
use chorus_core::memory::MemoryStorage;
use chorus_core::progress::ProgressState;
use chorus_core::provider::{EmbeddingBackend, GenerationBackend};
use chorus_memory::{JsonFileStorage, MemoryStore, NoopStorage};
use chorus_providers::OpenAiCompatClient;
use tracing::info;

use crate::engine::ChatEngine;

/// Persona for the privileged orchestrator, listing every objective tag it
/// may report as `intent`.
pub fn orchestrator_persona(progress: &ProgressState) -> String {
    let catalogue = progress
        .objectives
        .iter()
        .map(|o| format!("- Tag: {}\n  Description: {}", o.tag, o.description))
        .collect::<Vec<_>>()
        .join("\n");

    format!(
        "You are the Orchestrator of this story chapter. Your work is invisible: you never talk to the user directly, but you process every message (from the user and from the character agents) to:

1. Infer the user's intent as a semantic tag, only if it matches one of these descriptions:
{catalogue}
2. Detect hidden missions completed in this interaction.
3. Compute score deltas for each STEM career (biotechnology, robotics, software_engineering, data_science, environmental_engineering).
4. Produce system responses (banners or checkpoint notifications), never character messages.

When you process a message, return **only** a JSON object with these keys:
- intent: String
- scoreUpdates: {{ String: Int }}
- systemMessages: [ String ]

Do not add any text outside the JSON. Each entry of systemMessages is shown to the user as a banner."
    )
}

/// Persistence selected by `[memory]`: JSON files, or nothing at all.
pub fn storage_from_config(config: &AppConfig) -> Arc<dyn MemoryStorage> {
    if config.memory.persist {
        Arc::new(JsonFileStorage::new(config.memory.resolved_dir()))
    } else {
        Arc::new(NoopStorage)
    }
}

/// Build the engine against the configured OpenAI-compatible API and start
/// loading persisted memories in the background.
pub fn from_config(config: &AppConfig) -> Result<ChatEngine> {
    let client = Arc::new(OpenAiCompatClient::from_config(config)?);
    let engine = with_backends(
        config,
        client.clone(),
        client,
        storage_from_config(config),
    )?;
    engine.spawn_memory_restore();
    Ok(engine)
}

/// Build the engine with explicit backends. Memories are not restored.
pub fn with_backends(
    config: &AppConfig,
    generator: Arc<dyn GenerationBackend>,
    embedder: Arc<dyn EmbeddingBackend>,
    storage: Arc<dyn MemoryStorage>,
) -> Result<ChatEngine> {
    config.validate().map_err(|e| Error::Config {
        message: e.to_string(),
    })?;

    let events = Arc::new(EventBus::default());
    let tuning = AgentTuning::from(&config.orchestration);
    let retention = RetentionPolicy::from(&config.memory);
    let progress = ProgressState::initial();

    let build_agent = |profile: AgentProfile| {
        let memory = MemoryStore::new(profile.id.clone(), embedder.clone(), storage.clone());
        Agent::new(profile, generator.clone(), memory, Arc::clone(&events))
            .with_tuning(tuning.clone())
            .with_retention(retention.clone())
    };

    let persona = config
        .orchestrator
        .persona
        .clone()
        .unwrap_or_else(|| orchestrator_persona(&progress));
    let orchestrator = build_agent(AgentProfile::orchestrator(
        config.orchestrator.id.clone(),
        config.orchestrator.name.clone(),
        persona,
    ));

    let user = Participant::human(config.user.id.clone(), config.user.name.clone());
    let mut engine = ChatEngine::new(user, orchestrator, Arc::clone(&events))
        .with_max_depth(config.orchestration.max_depth)
        .with_progress(progress);

    for agent in &config.agents {
        engine = engine.with_agent(build_agent(AgentProfile::new(
            agent.id.clone(),
            agent.name.clone(),
            agent.persona.clone(),
        )));
    }

    for channel in &config.channels {
        let id = ChannelId::from(channel.id.as_str());
        let built = match channel.participants.as_slice() {
            [agent] if channel.direct => {
                ChatChannel::direct(id, channel.name.clone(), config.user.id.clone(), agent.clone())
            }
            _ => {
                let mut participants = vec![config.user.id.clone()];
                participants.extend(channel.participants.iter().cloned());
                ChatChannel::group(id, channel.name.clone(), participants)
            }
        };
        engine = engine.with_channel(built);
    }

    info!(
        agents = config.agents.len(),
        channels = config.channels.len(),
        model = %config.generation_model,
        "Engine ready"
    );
    Ok(engine)
}

//! Configuration loading, validation, and management for Chorus.
//!
//! Loads configuration from `~/.chorus/config.toml` with environment
//! variable overrides. Validates all settings at startup.
//!
//! Every orchestration constant has a default here, so Chorus runs with no
//! config file at all: three demo agents, one group chat, one DM per agent.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};

/// The root configuration structure.
///
/// Maps directly to `~/.chorus/config.toml`.
#[derive(Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// API key for the generation and embedding backends
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// Base URL of the OpenAI-compatible API
    #[serde(default = "default_api_url")]
    pub api_url: String,

    /// Chat-completion model
    #[serde(default = "default_generation_model")]
    pub generation_model: String,

    /// Embedding model
    #[serde(default = "default_embedding_model")]
    pub embedding_model: String,

    /// Sampling temperature
    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// Orchestration tuning
    #[serde(default)]
    pub orchestration: OrchestrationConfig,

    /// Long-term memory settings
    #[serde(default)]
    pub memory: MemoryConfig,

    /// The human participant
    #[serde(default)]
    pub user: UserConfig,

    /// The privileged orchestrator agent
    #[serde(default)]
    pub orchestrator: OrchestratorConfig,

    /// Conversational agents
    #[serde(default = "default_agents")]
    pub agents: Vec<AgentConfig>,

    /// Channels to create at startup
    #[serde(default = "default_channels")]
    pub channels: Vec<ChannelConfig>,
}

fn default_api_url() -> String {
    "https://api.openai.com/v1".into()
}
fn default_generation_model() -> String {
    "gpt-4.1".into()
}
fn default_embedding_model() -> String {
    "text-embedding-3-small".into()
}
fn default_temperature() -> f32 {
    0.5
}
fn default_true() -> bool {
    true
}

/// Redact a secret string for Debug output.
fn redact(s: &Option<String>) -> &'static str {
    match s {
        Some(_) => "[REDACTED]",
        None => "None",
    }
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("api_key", &redact(&self.api_key))
            .field("api_url", &self.api_url)
            .field("generation_model", &self.generation_model)
            .field("embedding_model", &self.embedding_model)
            .field("temperature", &self.temperature)
            .field("orchestration", &self.orchestration)
            .field("memory", &self.memory)
            .field("user", &self.user)
            .field("orchestrator", &self.orchestrator)
            .field("agents", &self.agents)
            .field("channels", &self.channels)
            .finish()
    }
}

/// Timing and fan-out knobs for the orchestration engine and agents.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrchestrationConfig {
    /// Maximum inter-agent propagation depth
    #[serde(default = "default_max_depth")]
    pub max_depth: u32,

    /// How long an agent waits for more context before giving up
    #[serde(default = "default_wait_for_context_secs")]
    pub wait_for_context_secs: f64,

    /// Minimum gap between two replies of one agent to other agents
    #[serde(default = "default_agent_cooldown_secs")]
    pub agent_cooldown_secs: f64,

    /// Short-term memory window per agent
    #[serde(default = "default_short_term_capacity")]
    pub short_term_capacity: usize,

    /// Number of long-term memories recalled per turn
    #[serde(default = "default_recall_limit")]
    pub recall_limit: usize,

    /// Spacing between segments of a multi-part reply
    #[serde(default = "default_segment_spacing_secs")]
    pub segment_spacing_secs: f64,

    /// The orchestrator skips cooldown and behavior markers
    #[serde(default = "default_true")]
    pub privileged_exempt: bool,
}

fn default_max_depth() -> u32 {
    2
}
fn default_wait_for_context_secs() -> f64 {
    15.0
}
fn default_agent_cooldown_secs() -> f64 {
    3.0
}
fn default_short_term_capacity() -> usize {
    20
}
fn default_recall_limit() -> usize {
    5
}
fn default_segment_spacing_secs() -> f64 {
    1.0
}

impl Default for OrchestrationConfig {
    fn default() -> Self {
        Self {
            max_depth: default_max_depth(),
            wait_for_context_secs: default_wait_for_context_secs(),
            agent_cooldown_secs: default_agent_cooldown_secs(),
            short_term_capacity: default_short_term_capacity(),
            recall_limit: default_recall_limit(),
            segment_spacing_secs: default_segment_spacing_secs(),
            privileged_exempt: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryConfig {
    /// Persist long-term memory to disk
    #[serde(default = "default_true")]
    pub persist: bool,

    /// Directory for `agent_<id>_memories.json` files (default `~/.chorus/memory`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dir: Option<PathBuf>,

    /// Messages shorter than this (in characters) are not remembered
    #[serde(default = "default_min_length")]
    pub min_length: usize,

    /// Normalized similarity above which a message counts as a near-duplicate
    #[serde(default = "default_similarity_threshold")]
    pub similarity_threshold: f64,

    /// How many recent messages from the same sender are compared for near-duplicates
    #[serde(default = "default_recent_window")]
    pub recent_window: usize,
}

fn default_min_length() -> usize {
    20
}
fn default_similarity_threshold() -> f64 {
    0.85
}
fn default_recent_window() -> usize {
    3
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            persist: true,
            dir: None,
            min_length: default_min_length(),
            similarity_threshold: default_similarity_threshold(),
            recent_window: default_recent_window(),
        }
    }
}

impl MemoryConfig {
    /// The effective memory directory.
    pub fn resolved_dir(&self) -> PathBuf {
        self.dir
            .clone()
            .unwrap_or_else(|| AppConfig::config_dir().join("memory"))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserConfig {
    #[serde(default = "default_user_id")]
    pub id: String,

    #[serde(default = "default_user_name")]
    pub name: String,
}

fn default_user_id() -> String {
    "user".into()
}
fn default_user_name() -> String {
    "You".into()
}

impl Default for UserConfig {
    fn default() -> Self {
        Self {
            id: default_user_id(),
            name: default_user_name(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrchestratorConfig {
    #[serde(default = "default_orchestrator_id")]
    pub id: String,

    #[serde(default = "default_orchestrator_name")]
    pub name: String,

    /// Replace the generated orchestrator persona entirely
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub persona: Option<String>,
}

fn default_orchestrator_id() -> String {
    "orchestrator".into()
}
fn default_orchestrator_name() -> String {
    "Orchestrator".into()
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            id: default_orchestrator_id(),
            name: default_orchestrator_name(),
            persona: None,
        }
    }
}

/// A conversational (non-privileged) agent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    pub id: String,
    pub name: String,
    pub persona: String,
}

/// A channel created at startup. The user is always a participant.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChannelConfig {
    pub id: String,
    pub name: String,

    /// Agent IDs taking part in this channel
    pub participants: Vec<String>,

    /// Direct message (exactly one agent) vs group chat
    #[serde(default)]
    pub direct: bool,
}

fn default_agents() -> Vec<AgentConfig> {
    vec![
        AgentConfig {
            id: "isa".into(),
            name: "Isa".into(),
            persona: "You are Isabela \"Isa\" Rodriguez, 17, a bioengineering student and the mother \
                      of a two-year-old. You grew up in a modest home and cultivated medicinal plants \
                      at your grandmother's house. You are determined and organized, but reserved; \
                      you open up mostly in direct messages. You want to build biotechnology for \
                      low-income communities and fear neglecting your daughter if you fail."
                .into(),
        },
        AgentConfig {
            id: "fer".into(),
            name: "Fernanda".into(),
            persona: "You are Fernanda \"Fer\" Martinez, 16, a robotics and electronics student. \
                      You founded an electronics recycling workshop with friends and discovered \
                      electronics by taking apart old TVs. You are outgoing, passionate in debates \
                      and creative with prototypes. You want to turn e-waste into low-cost sensors."
                .into(),
        },
        AgentConfig {
            id: "aldo".into(),
            name: "Aldo".into(),
            persona: "You are Aldo, a 28-year-old Mexican software developer who loves technology. \
                      You are into video games and geek culture, explain technical concepts with \
                      analogies to Mexican food, defend Linux over Windows and keep sharing \
                      tutorials. You reply like a chat message."
                .into(),
        },
    ]
}

fn default_channels() -> Vec<ChannelConfig> {
    let agents = default_agents();
    let mut channels = vec![ChannelConfig {
        id: "challenge".into(),
        name: "First Challenge".into(),
        participants: agents.iter().map(|a| a.id.clone()).collect(),
        direct: false,
    }];
    channels.extend(agents.iter().map(|a| ChannelConfig {
        id: format!("dm-{}", a.id),
        name: a.name.clone(),
        participants: vec![a.id.clone()],
        direct: true,
    }));
    channels
}

impl AppConfig {
    /// Load configuration from the default path (~/.chorus/config.toml).
    ///
    /// Also checks environment variables:
    /// - `CHORUS_API_KEY` (highest priority), then `OPENAI_API_KEY`
    /// - `CHORUS_MODEL` overrides the generation model
    /// - `CHORUS_API_URL` overrides the API base URL
    pub fn load() -> Result<Self, ConfigError> {
        let config_path = Self::config_dir().join("config.toml");
        let mut config = Self::load_from(&config_path)?;

        if config.api_key.is_none() {
            config.api_key = std::env::var("CHORUS_API_KEY")
                .ok()
                .or_else(|| std::env::var("OPENAI_API_KEY").ok());
        }

        if let Ok(model) = std::env::var("CHORUS_MODEL") {
            config.generation_model = model;
        }

        if let Ok(url) = std::env::var("CHORUS_API_URL") {
            config.api_url = url;
        }

        Ok(config)
    }

    /// Load configuration from a specific file path.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            tracing::info!("No config file found at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        Self::from_toml_str(&content).map_err(|e| match e {
            ConfigError::ParseError { reason, .. } => ConfigError::ParseError {
                path: path.to_path_buf(),
                reason,
            },
            other => other,
        })
    }

    /// Parse and validate a TOML document.
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content).map_err(|e| ConfigError::ParseError {
            path: PathBuf::new(),
            reason: e.to_string(),
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Get the configuration directory path.
    pub fn config_dir() -> PathBuf {
        dirs_home().join(".chorus")
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(0.0..=2.0).contains(&self.temperature) {
            return Err(ConfigError::ValidationError(
                "temperature must be between 0.0 and 2.0".into(),
            ));
        }

        let o = &self.orchestration;
        if o.short_term_capacity == 0 {
            return Err(ConfigError::ValidationError(
                "orchestration.short_term_capacity must be > 0".into(),
            ));
        }
        for (name, value) in [
            ("wait_for_context_secs", o.wait_for_context_secs),
            ("agent_cooldown_secs", o.agent_cooldown_secs),
            ("segment_spacing_secs", o.segment_spacing_secs),
        ] {
            if !value.is_finite() || value < 0.0 {
                return Err(ConfigError::ValidationError(format!(
                    "orchestration.{name} must be a non-negative number"
                )));
            }
        }

        if !(0.0..=1.0).contains(&self.memory.similarity_threshold) {
            return Err(ConfigError::ValidationError(
                "memory.similarity_threshold must be between 0.0 and 1.0".into(),
            ));
        }

        let mut ids = HashSet::new();
        ids.insert(self.orchestrator.id.as_str());
        if self.user.id == self.orchestrator.id {
            return Err(ConfigError::ValidationError(format!(
                "user id '{}' collides with the orchestrator id",
                self.user.id
            )));
        }
        for agent in &self.agents {
            if agent.id == self.user.id || !ids.insert(agent.id.as_str()) {
                return Err(ConfigError::ValidationError(format!(
                    "duplicate participant id '{}'",
                    agent.id
                )));
            }
        }

        let mut channel_ids = HashSet::new();
        for channel in &self.channels {
            if !channel_ids.insert(channel.id.as_str()) {
                return Err(ConfigError::ValidationError(format!(
                    "duplicate channel id '{}'",
                    channel.id
                )));
            }
            if let Some(unknown) = channel
                .participants
                .iter()
                .find(|p| !self.agents.iter().any(|a| &a.id == *p))
            {
                return Err(ConfigError::ValidationError(format!(
                    "channel '{}' references unknown agent '{}'",
                    channel.id, unknown
                )));
            }
            if channel.direct && channel.participants.len() != 1 {
                return Err(ConfigError::ValidationError(format!(
                    "direct channel '{}' must have exactly one agent",
                    channel.id
                )));
            }
        }

        Ok(())
    }

    /// Check if an API key is available (from config or environment).
    pub fn has_api_key(&self) -> bool {
        self.api_key.is_some()
    }

    /// Generate a default config TOML string (for `onboard` command).
    pub fn default_toml() -> String {
        let config = Self::default();
        toml::to_string_pretty(&config).unwrap_or_default()
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            api_url: default_api_url(),
            generation_model: default_generation_model(),
            embedding_model: default_embedding_model(),
            temperature: default_temperature(),
            orchestration: OrchestrationConfig::default(),
            memory: MemoryConfig::default(),
            user: UserConfig::default(),
            orchestrator: OrchestratorConfig::default(),
            agents: default_agents(),
            channels: default_channels(),
        }
    }
}

/// Get the user's home directory.
fn dirs_home() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        std::env::var("USERPROFILE")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("C:\\Users\\Default"))
    }
    #[cfg(not(target_os = "windows"))]
    {
        std::env::var("HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("/tmp"))
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file at {path}: {reason}")]
    ReadError { path: PathBuf, reason: String },

    #[error("Failed to parse config file at {path}: {reason}")]
    ParseError { path: PathBuf, reason: String },

    #[error("Configuration validation failed: {0}")]
    ValidationError(String),
}

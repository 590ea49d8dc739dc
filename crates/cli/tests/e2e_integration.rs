//! End-to-end tests for the Chorus engine.
//!
//! These tests assemble a full engine from configuration, exactly as
//! `chorus chat` does, but with a scripted generation backend and a
//! deterministic embedder in place of the HTTP client.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};

use chorus_agent::testing::HashEmbedder;
use chorus_config::AppConfig;
use chorus_core::channel::ChannelId;
use chorus_core::error::GenerationError;
use chorus_core::event::DomainEvent;
use chorus_core::provider::GenerationBackend;
use chorus_engine::ChatEngine;
use chorus_engine::bootstrap::storage_from_config;
use chorus_memory::InMemoryStorage;

// ── Mock Backend ─────────────────────────────────────────────────────────

/// A generation backend shared by every agent that routes each prompt to a
/// per-agent script, keyed on a snippet of the agent's persona.
///
/// Unscripted agents stay silent; the orchestrator answers `{}`.
struct PersonaRouter {
    routes: Vec<(&'static str, &'static str)>,
    scripts: Mutex<HashMap<&'static str, VecDeque<String>>>,
    prompts: Mutex<HashMap<&'static str, Vec<String>>>,
}

impl PersonaRouter {
    /// Route names for the default roster.
    fn for_default_roster() -> Self {
        Self {
            routes: vec![
                ("isa", "Isabela \"Isa\" Rodriguez"),
                ("fer", "Fernanda \"Fer\" Martinez"),
                ("aldo", "You are Aldo"),
                ("orchestrator", "You are the Orchestrator"),
            ],
            scripts: Mutex::new(HashMap::new()),
            prompts: Mutex::new(HashMap::new()),
        }
    }

    fn with_routes(routes: Vec<(&'static str, &'static str)>) -> Self {
        Self {
            routes,
            scripts: Mutex::new(HashMap::new()),
            prompts: Mutex::new(HashMap::new()),
        }
    }

    fn script(self, route: &'static str, replies: &[&str]) -> Self {
        self.scripts
            .lock()
            .unwrap()
            .insert(route, replies.iter().map(|r| r.to_string()).collect());
        self
    }

    fn route_of(&self, prompt: &str) -> &'static str {
        let persona = prompt
            .strip_prefix("You are an AI agent with the following persona:\n")
            .unwrap_or(prompt);
        self.routes
            .iter()
            .find(|(_, snippet)| persona.starts_with(snippet) || persona.contains(snippet))
            .map(|(route, _)| *route)
            .unwrap_or_else(|| panic!("no route for prompt: {}", &prompt[..prompt.len().min(120)]))
    }

    fn prompts_of(&self, route: &str) -> Vec<String> {
        self.prompts.lock().unwrap().get(route).cloned().unwrap_or_default()
    }
}

#[async_trait::async_trait]
impl GenerationBackend for PersonaRouter {
    fn name(&self) -> &str {
        "persona_router"
    }

    async fn generate(&self, prompt: &str) -> Result<String, GenerationError> {
        let route = self.route_of(prompt);
        self.prompts
            .lock()
            .unwrap()
            .entry(route)
            .or_default()
            .push(prompt.to_string());

        let scripted = self
            .scripts
            .lock()
            .unwrap()
            .get_mut(route)
            .and_then(|replies| replies.pop_front());
        Ok(scripted.unwrap_or_else(|| {
            if route == "orchestrator" {
                "{}".to_string()
            } else {
                "[BEHAVIOR_SILENT]".to_string()
            }
        }))
    }
}

fn engine_with(config: &AppConfig, router: &Arc<PersonaRouter>) -> ChatEngine {
    chorus_engine::with_backends(
        config,
        router.clone(),
        Arc::new(HashEmbedder::default()),
        Arc::new(InMemoryStorage::new()),
    )
    .unwrap()
}

fn contents(engine_messages: &[chorus_core::message::ChatMessage]) -> Vec<String> {
    engine_messages.iter().map(|m| m.content.clone()).collect()
}

// ── E2E: Group Chat ──────────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn e2e_hola_equipo_with_default_roster() {
    let router = Arc::new(
        PersonaRouter::for_default_roster()
            .script("aldo", &["[BEHAVIOR_NORMAL] Qué onda! Soy Aldo, team Linux 🐧"])
            .script(
                "orchestrator",
                &[r#"{"intent": "introduce_yourself", "scoreUpdates": {"software_engineering": 1}, "systemMessages": ["Welcome to the first challenge!"]}"#],
            ),
    );
    let engine = engine_with(&AppConfig::default(), &router);
    let mut events = engine.events().subscribe();
    let challenge = ChannelId::from("challenge");

    let report = engine.submit_user_message("Hola equipo", &challenge).await.unwrap();

    // Every channel agent and the orchestrator saw the user message once
    for id in ["isa", "fer", "aldo", "orchestrator"] {
        assert_eq!(report.turns_of(id).filter(|t| t.depth == 0).count(), 1, "{id}");
    }
    // Aldo's reply propagated to Isa and Fer
    assert_eq!(report.turns_of("isa").filter(|t| t.depth == 1).count(), 1);
    assert_eq!(report.turns_of("fer").filter(|t| t.depth == 1).count(), 1);

    let visible = engine.visible_messages(&challenge).await;
    assert_eq!(
        contents(&visible),
        vec!["Hola equipo", "Qué onda! Soy Aldo, team Linux 🐧"]
    );
    assert_eq!(visible[1].sender_name, "Aldo");

    let progress = engine.progress().await;
    assert_eq!(progress.completed_count(), 1);
    assert_eq!(progress.affinity.software_engineering, 1);

    let mut banners = Vec::new();
    while let Ok(event) = events.try_recv() {
        if let DomainEvent::SystemMessage { content, .. } = event.as_ref() {
            banners.push(content.clone());
        }
    }
    assert_eq!(banners, vec!["Welcome to the first challenge!"]);

    // Isa's reaction to Aldo carries the agent-to-agent framing
    let isa_prompts = router.prompts_of("isa");
    assert!(isa_prompts[1].contains("Fellow AI agent, Aldo, just said: Qué onda!"));
    assert!(!engine.is_processing());
}

#[tokio::test(start_paused = true)]
async fn e2e_private_reply_is_hidden_from_the_group() {
    let router = Arc::new(
        PersonaRouter::for_default_roster()
            .script("isa", &["[BEHAVIOR_PRIVATE] Te cuento luego por DM"]),
    );
    let engine = engine_with(&AppConfig::default(), &router);
    let challenge = ChannelId::from("challenge");

    let report = engine
        .submit_user_message("Isa, cómo va tu proyecto de plantas?", &challenge)
        .await
        .unwrap();

    // The user sees it; nobody else reacts to it
    let visible = engine.visible_messages(&challenge).await;
    assert!(visible.iter().any(|m| m.is_private && m.sender_id == "isa"));
    assert_eq!(report.turns.iter().filter(|t| t.depth > 0).count(), 0);
}

// ── E2E: Direct Messages ─────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn e2e_dm_wait_for_context_continuation() {
    let router = Arc::new(PersonaRouter::for_default_roster().script(
        "isa",
        &[
            "[BEHAVIOR_WAIT_FOR_CONTEXT]",
            "[BEHAVIOR_NORMAL] Sensores de humedad para las plantas? Me encanta",
        ],
    ));
    let engine = engine_with(&AppConfig::default(), &router);
    let dm = ChannelId::from("dm-isa");
    let isa = engine.agent("isa").unwrap().clone();

    engine.submit_user_message("Tengo una idea...", &dm).await.unwrap();
    assert!(isa.is_waiting().await);
    assert_eq!(engine.visible_messages(&dm).await.len(), 1);

    engine.submit_user_message("usar sensores de humedad", &dm).await.unwrap();
    assert!(!isa.is_waiting().await);

    let visible = engine.visible_messages(&dm).await;
    assert_eq!(
        visible.last().unwrap().content,
        "Sensores de humedad para las plantas? Me encanta"
    );

    let prompts = router.prompts_of("isa");
    assert_eq!(prompts.len(), 2);
    assert!(prompts[1].contains(
        "You previously decided to wait for more context after receiving this message from You: 'Tengo una idea...'."
    ));
    assert!(prompts[1].contains("This is a direct message named: Isa"));

    engine.shutdown().await;
}

// ── E2E: Long-Term Memory ────────────────────────────────────────────────

#[tokio::test]
async fn e2e_memories_survive_an_engine_restart() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = AppConfig::default();
    config.memory.persist = true;
    config.memory.dir = Some(dir.path().to_path_buf());
    let dm = ChannelId::from("dm-isa");

    // First session: Isa answers, so the user's message is retained
    {
        let router = Arc::new(
            PersonaRouter::for_default_roster()
                .script("isa", &["[BEHAVIOR_NORMAL] Qué bonito, mi abuela también"]),
        );
        let engine = chorus_engine::with_backends(
            &config,
            router,
            Arc::new(HashEmbedder::default()),
            storage_from_config(&config),
        )
        .unwrap();

        engine
            .submit_user_message("I grow medicinal plants with my grandmother", &dm)
            .await
            .unwrap();
        assert_eq!(engine.agent("isa").unwrap().memory().len().await, 1);
        engine.shutdown().await;
    }

    assert!(dir.path().join("agent_isa_memories.json").exists());

    // Second session: restore, then the memory shows up in Isa's prompt
    let router = Arc::new(
        PersonaRouter::for_default_roster().script("isa", &["[BEHAVIOR_NORMAL] Claro que sí"]),
    );
    let engine = chorus_engine::with_backends(
        &config,
        router.clone(),
        Arc::new(HashEmbedder::default()),
        storage_from_config(&config),
    )
    .unwrap();

    let restored: usize = {
        let mut total = 0;
        for handle in engine.spawn_memory_restore() {
            total += handle.await.unwrap();
        }
        total
    };
    assert!(restored >= 1);
    assert_eq!(engine.agent("isa").unwrap().memory().len().await, 1);

    engine
        .submit_user_message("Do you remember my plants?", &dm)
        .await
        .unwrap();

    let prompt = &router.prompts_of("isa")[0];
    assert!(prompt.contains(
        "Relevant information from your memory:\n1. In the chat 'Isa', You said: I grow medicinal plants with my grandmother"
    ));
}

// ── E2E: Configuration ───────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn e2e_roster_from_toml() {
    let config = AppConfig::from_toml_str(
        r#"
[user]
id = "omar"
name = "Omar"

[orchestration]
max_depth = 1

[[agents]]
id = "robo"
name = "Robo"
persona = "You are Robo, a cheerful robotics mentor."

[[agents]]
id = "eco"
name = "Eco"
persona = "You are Eco, an environmental engineer."

[[channels]]
id = "lab"
name = "Recycling Lab"
participants = ["robo", "eco"]
"#,
    )
    .unwrap();

    let router = Arc::new(
        PersonaRouter::with_routes(vec![
            ("robo", "You are Robo"),
            ("eco", "You are Eco"),
            ("orchestrator", "You are the Orchestrator"),
        ])
        .script("robo", &["[BEHAVIOR_NORMAL] Armemos un sensor con basura electrónica"])
        .script("eco", &["[BEHAVIOR_NORMAL] Y medimos la calidad del aire", "[BEHAVIOR_SILENT]"]),
    );
    let engine = engine_with(&config, &router);
    let lab = ChannelId::from("lab");

    let ids: Vec<&str> = engine.agents().iter().map(|a| a.id()).collect();
    assert_eq!(ids, vec!["robo", "eco"]);
    assert_eq!(engine.channels().await[0].name, "Recycling Lab");

    let report = engine.submit_user_message("Qué construimos hoy?", &lab).await.unwrap();

    // max_depth = 1: Eco's reply to Robo is posted but does not reach Robo again
    assert_eq!(report.max_depth(), 1);
    assert_eq!(report.depth_cutoffs, 1);
    assert_eq!(report.turns_of("robo").count(), 1);
    assert_eq!(engine.visible_messages(&lab).await.len(), 3);

    let robo_prompt = &router.prompts_of("robo")[0];
    assert!(robo_prompt.contains("- Omar (ID: omar, Type: Human user)"));
    assert!(robo_prompt.contains("- Eco (ID: eco, Type: AI agent)"));
    assert!(robo_prompt.contains("This is a group chat named: Recycling Lab"));

    let orchestrator_prompt = &router.prompts_of("orchestrator")[0];
    assert!(orchestrator_prompt.contains("- Tag: introduce_yourself"));
}

#[test]
fn e2e_invalid_roster_is_rejected() {
    let result = AppConfig::from_toml_str(
        r#"
[[agents]]
id = "robo"
name = "Robo"
persona = "You are Robo."

[[channels]]
id = "lab"
name = "Lab"
participants = ["robo", "ghost"]
"#,
    );
    assert!(result.is_err());
}

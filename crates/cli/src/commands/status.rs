//! `chorus status`: Show configuration, roster and backend health.

use chorus_config::AppConfig;
use chorus_core::provider::GenerationBackend;
use chorus_providers::OpenAiCompatClient;

pub async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let config = AppConfig::load().map_err(|e| format!("Failed to load config: {e}"))?;

    println!("Chorus Status");
    println!("=============");
    println!("  Config dir:   {}", AppConfig::config_dir().display());
    println!("  API URL:      {}", config.api_url);
    println!("  Model:        {}", config.generation_model);
    println!("  Embeddings:   {}", config.embedding_model);
    println!("  Temperature:  {}", config.temperature);
    if config.memory.persist {
        println!("  Memory:       {}", config.memory.resolved_dir().display());
    } else {
        println!("  Memory:       in-process only");
    }
    println!(
        "  Propagation:  depth {}, cooldown {}s, wait {}s",
        config.orchestration.max_depth,
        config.orchestration.agent_cooldown_secs,
        config.orchestration.wait_for_context_secs
    );

    println!("\n  Agents:");
    for agent in &config.agents {
        println!("    {:<12} {}", agent.id, agent.name);
    }
    println!("    {:<12} {} (orchestrator)", config.orchestrator.id, config.orchestrator.name);

    println!("\n  Channels:");
    for channel in &config.channels {
        let kind = if channel.direct { "dm" } else { "group" };
        println!(
            "    {:<12} {:<6} {} [{}]",
            channel.id,
            kind,
            channel.name,
            channel.participants.join(", ")
        );
    }

    let config_path = AppConfig::config_dir().join("config.toml");
    if config_path.exists() {
        println!("\n  ✅ Config file found");
    } else {
        println!("\n  ⚠️  No config file — run `chorus onboard` first");
    }

    match OpenAiCompatClient::from_config(&config) {
        Ok(client) => match client.health_check().await {
            Ok(true) => println!("  ✅ Backend reachable"),
            Ok(false) => println!("  ⚠️  Backend answered with an error status"),
            Err(e) => println!("  ❌ Backend unreachable: {e}"),
        },
        Err(e) => println!("  ❌ {e}"),
    }

    Ok(())
}

//! `chorus chat`: Interactive multi-agent chat.

use std::collections::HashMap;
use std::io::Write;

use chorus_config::AppConfig;
use chorus_core::channel::ChannelId;
use chorus_core::event::DomainEvent;
use chorus_core::progress::{ObjectiveStatus, PROGRESS_GOAL, ProgressState};
use chorus_engine::ChatEngine;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::broadcast::error::RecvError;
use tracing::debug;

/// One line of user input.
#[derive(Debug, PartialEq, Eq)]
enum ChatCommand {
    Send(String),
    Channels,
    Switch(String),
    Dm(String),
    Progress,
    Help,
    Quit,
    Unknown(String),
}

impl ChatCommand {
    /// `None` for blank lines.
    fn parse(line: &str) -> Option<Self> {
        let line = line.trim();
        if line.is_empty() {
            return None;
        }
        if !line.starts_with('/') {
            return Some(match line {
                "exit" | "quit" => Self::Quit,
                _ => Self::Send(line.to_string()),
            });
        }

        let (command, arg) = match line.split_once(char::is_whitespace) {
            Some((command, arg)) => (command, arg.trim()),
            None => (line, ""),
        };

        Some(match (command, arg) {
            ("/quit" | "/exit", _) => Self::Quit,
            ("/channels", _) => Self::Channels,
            ("/progress", _) => Self::Progress,
            ("/help", _) => Self::Help,
            ("/switch", id) if !id.is_empty() => Self::Switch(id.to_string()),
            ("/dm", agent) if !agent.is_empty() => Self::Dm(agent.to_string()),
            _ => Self::Unknown(line.to_string()),
        })
    }
}

const HELP: &str = "  /channels          list channels
  /switch <id>       switch to a channel
  /dm <agent>        open a direct chat (agent id or name)
  /progress          show objectives and affinities
  /quit              leave";

fn render_progress(progress: &ProgressState) -> String {
    let mut lines = vec![format!(
        "  Progress: {:.0}% ({}/{})",
        progress.progress_percent(),
        progress.completed_count(),
        PROGRESS_GOAL
    )];
    for objective in &progress.objectives {
        let mark = if objective.status == ObjectiveStatus::Completed { "x" } else { " " };
        lines.push(format!("  [{mark}] {}", objective.name));
    }
    let affinity = progress
        .affinity
        .entries()
        .iter()
        .map(|(name, score)| format!("{name} {score}"))
        .collect::<Vec<_>>()
        .join(", ");
    lines.push(format!("  Affinity: {affinity}"));
    lines.join("\n")
}

/// Resolve an agent by id or (case-insensitive) name.
fn find_agent_id(engine: &ChatEngine, needle: &str) -> Option<String> {
    engine
        .agents()
        .iter()
        .find(|a| a.id() == needle || a.name().eq_ignore_ascii_case(needle))
        .map(|a| a.id().to_string())
}

/// Print the messages of `channel_id` the user has not seen printed yet.
async fn print_new_messages(engine: &ChatEngine, channel_id: &ChannelId, printed: &mut HashMap<String, usize>) {
    let visible = engine.visible_messages(channel_id).await;
    let already = printed.entry(channel_id.0.clone()).or_insert(0);
    for message in visible.iter().skip(*already) {
        if message.sender_id == engine.user().id {
            continue;
        }
        let privacy = if message.is_private { " (private)" } else { "" };
        println!("  {}{} > {}", message.sender_name, privacy, message.content);
    }
    *already = visible.len();
    engine.mark_all_seen_by_user(channel_id).await;
}

async fn print_channels(engine: &ChatEngine, current: &ChannelId) {
    for channel in engine.channels().await {
        let marker = if &channel.id == current { "*" } else { " " };
        let kind = if channel.is_direct_message { "dm" } else { "group" };
        let unread = channel
            .messages
            .iter()
            .filter(|m| {
                channel.is_visible_to(m, &engine.user().id) && !m.is_seen_by(&engine.user().id)
            })
            .count();
        println!(
            "  {marker} {:<16} {:<6} {} ({} unread)",
            channel.id, kind, channel.name, unread
        );
    }
}

pub async fn run(channel: Option<String>) -> Result<(), Box<dyn std::error::Error>> {
    let config = AppConfig::load().map_err(|e| format!("Failed to load config: {e}"))?;

    if !config.has_api_key() {
        eprintln!();
        eprintln!("  ERROR: No API key configured!");
        eprintln!();
        eprintln!("  Set CHORUS_API_KEY or OPENAI_API_KEY, or add api_key to:");
        eprintln!("    {}", AppConfig::config_dir().join("config.toml").display());
        eprintln!();
        return Err("No API key found. See above for setup instructions.".into());
    }

    let engine = chorus_engine::from_config(&config)?;

    let channels = engine.channels().await;
    let mut current = match channel {
        Some(id) => {
            let id = ChannelId::from(id.as_str());
            if !channels.iter().any(|c| c.id == id) {
                return Err(format!("Unknown channel: {id}").into());
            }
            id
        }
        None => channels
            .iter()
            .find(|c| !c.is_direct_message)
            .or_else(|| channels.first())
            .map(|c| c.id.clone())
            .ok_or("No channels configured")?,
    };

    // Orchestrator banners and milestones
    let mut events = engine.events().subscribe();
    tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(event) => match event.as_ref() {
                    DomainEvent::SystemMessage { content, .. } => println!("\n  📣 {content}"),
                    DomainEvent::ObjectiveCompleted { tag, .. } => {
                        println!("\n  ✅ Objective completed: {tag}")
                    }
                    _ => {}
                },
                Err(RecvError::Lagged(_)) => continue,
                Err(RecvError::Closed) => break,
            }
        }
    });

    println!();
    println!("  Chorus — {} as {}", config.generation_model, config.user.name);
    println!("  Type a message and press Enter. /help for commands.");
    println!();

    let mut printed: HashMap<String, usize> = HashMap::new();
    if let Some(c) = engine.channel(&current).await {
        println!("  # {}", c.name);
    }
    print_new_messages(&engine, &current, &mut printed).await;

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        print!("  You > ");
        std::io::stdout().flush()?;

        let Some(line) = lines.next_line().await? else {
            break;
        };
        let Some(command) = ChatCommand::parse(&line) else {
            continue;
        };

        match command {
            ChatCommand::Send(text) => {
                eprint!("  ...");
                let result = engine.submit_user_message(&text, &current).await;
                eprint!("\r     \r");
                match result {
                    Ok(_) => print_new_messages(&engine, &current, &mut printed).await,
                    Err(e) => eprintln!("  [Error] {e}"),
                }
            }
            ChatCommand::Channels => print_channels(&engine, &current).await,
            ChatCommand::Switch(id) => {
                let id = ChannelId::from(id.as_str());
                match engine.channel(&id).await {
                    Some(c) => {
                        println!("  # {}", c.name);
                        debug!(channel = %id, "Switched channel");
                        current = id;
                        print_new_messages(&engine, &current, &mut printed).await;
                    }
                    None => eprintln!("  No such channel: {id}"),
                }
            }
            ChatCommand::Dm(agent) => {
                let Some(agent_id) = find_agent_id(&engine, &agent) else {
                    eprintln!("  No such agent: {agent}");
                    continue;
                };
                current = engine.create_direct_channel(&agent_id).await?;
                if let Some(c) = engine.channel(&current).await {
                    println!("  # {}", c.name);
                }
                print_new_messages(&engine, &current, &mut printed).await;
            }
            ChatCommand::Progress => println!("{}", render_progress(&engine.progress().await)),
            ChatCommand::Help => println!("{HELP}"),
            ChatCommand::Quit => break,
            ChatCommand::Unknown(line) => eprintln!("  Unknown command: {line} (try /help)"),
        }
    }

    engine.shutdown().await;
    println!();
    println!("  Goodbye! 👋");
    println!();
    Ok(())
}

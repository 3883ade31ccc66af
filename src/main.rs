use anyhow::{Context, Result};
use answerkit::clock::SystemClock;
use answerkit::cli::{Cli, Commands};
use answerkit::knowledge::{Category, KnowledgeStore};
use answerkit::utils::{self, ConsoleSink};
use answerkit::{EngineError, Orchestrator, Session, Settings};
use clap::Parser;
use std::sync::Arc;
use tokio::io::{self, AsyncBufReadExt, BufReader};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    let mut settings = Settings::new().context("Failed to load configuration")?;
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&settings.logging.level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let cli = Cli::parse();
    if let Some(mode) = cli.mode {
        settings.engine.mode = mode.into();
    }

    let access_key = cli.access_key;
    match cli.command {
        Commands::Ask { query, honeypot } => handle_ask(&settings, query, honeypot, access_key).await,
        Commands::Interactive { session_id } => handle_interactive(&settings, session_id, access_key).await,
        Commands::Knowledge => handle_knowledge(&settings).await,
    }
}

async fn handle_ask(
    settings: &Settings,
    query: String,
    honeypot: Option<String>,
    access_key: Option<String>,
) -> Result<()> {
    let orchestrator = answerkit::init(settings).await.context("Failed to start engine")?;

    // A one-shot request has no typing delay to measure
    let session = Session::new("ask", 0);
    let mut sink = ConsoleSink;

    if let Some(key) = access_key {
        if !try_unlock(&orchestrator, &session, &key).await? {
            return Ok(());
        }
    }

    if !orchestrator
        .handle_into(&session, &query, honeypot.as_deref(), &mut sink)
        .await
    {
        utils::print_info("Message ignored.");
    }
    Ok(())
}

async fn handle_interactive(settings: &Settings, session_id: String, access_key: Option<String>) -> Result<()> {
    let orchestrator: Orchestrator = answerkit::init(settings).await.context("Failed to start engine")?;

    utils::print_header(&format!("Interactive Mode ({:?})", orchestrator.mode()));
    utils::print_info("Type your messages (Ctrl+C to exit, /help for commands)\n");

    let session = orchestrator.new_session(session_id);
    let mut sink = ConsoleSink;
    let mut reader = BufReader::new(io::stdin());

    if let Some(key) = access_key {
        try_unlock(&orchestrator, &session, &key).await?;
    } else if orchestrator.requires_access_key() {
        utils::print_info("This chat needs an access key: /key <value>\n");
    }

    loop {
        utils::print_prompt("You: ");
        let mut input = String::new();
        if reader.read_line(&mut input).await? == 0 {
            break;
        }

        let input = input.trim();
        if input.is_empty() {
            continue;
        }

        match input {
            "/help" => {
                println!("Special commands:");
                println!("  /history - Show this session's conversation");
                println!("  /reset   - Clear history and message count");
                println!("  /key K   - Unlock the chat with access key K");
                println!("  /help    - Show this help");
                println!("  Ctrl+C   - Exit\n");
                continue;
            }
            "/history" => {
                for turn in session.history() {
                    println!("{:?}: {}", turn.role, turn.content);
                }
                println!();
                continue;
            }
            "/reset" => {
                session.reset();
                utils::print_success("Session cleared\n");
                continue;
            }
            _ => {}
        }

        if let Some(key) = input.strip_prefix("/key ") {
            if let Err(e) = try_unlock(&orchestrator, &session, key).await {
                utils::print_error(&format!("{:#}", e));
            }
            continue;
        }

        if !orchestrator.handle_into(&session, input, None, &mut sink).await {
            utils::print_info("(ignored)\n");
        }
    }

    Ok(())
}

/// Returns whether the session is now unlocked; connection errors propagate.
async fn try_unlock(orchestrator: &Orchestrator, session: &Session, key: &str) -> Result<bool> {
    match orchestrator.unlock(session, key).await {
        Ok(()) => {
            utils::print_success("Access granted\n");
            Ok(true)
        }
        Err(EngineError::Denied(denial)) => {
            let notice = orchestrator.denial_notice(&denial).unwrap_or_else(|| denial.to_string());
            utils::print_error(&notice);
            Ok(false)
        }
        Err(e) => Err(e).context("Could not check the access key"),
    }
}

async fn handle_knowledge(settings: &Settings) -> Result<()> {
    let store = answerkit::open_state_store(settings).await;
    let knowledge = KnowledgeStore::new(settings.knowledge.clone(), store, Arc::new(SystemClock));

    let loaded = match knowledge.load().await {
        Ok(loaded) => loaded,
        Err(e) => {
            utils::print_error(&format!("Could not load knowledge source: {}", e));
            return Err(e.into());
        }
    };

    let kb = &loaded.knowledge;
    utils::print_header("Knowledge Source");
    if let Some(reason) = &kb.degraded {
        utils::print_error(&format!("Degraded: {}", reason));
    }
    println!("  Freshness:  {:?}", loaded.freshness);
    println!("  Rules:      {}", kb.rules.len());
    println!("  Greetings:  {}", kb.personality.phrases(Category::Greeting).len());
    println!("  Closings:   {}", kb.personality.phrases(Category::Closing).len());
    println!("  Fallbacks:  {}", kb.personality.phrases(Category::Fallback).len());

    for skipped in &kb.skipped {
        utils::print_error(&format!(
            "  line {}: expected {} fields, found {}",
            skipped.line, skipped.expected, skipped.found
        ));
    }
    for rule in &kb.rules {
        println!("  [{}] {}", rule.id, rule.keywords.join(", "));
    }

    Ok(())
}

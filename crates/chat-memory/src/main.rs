use anyhow::{Context, Result};
use clap::Parser;
use std::future::Future;
use std::io::Write;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use chat_memory::config::Settings;
use chat_memory::services::LlmService;
use chat_memory::{MemoryManager, Role, SessionId, SessionStore};

#[derive(Parser, Debug)]
#[command(
    name = "chat-memory",
    version,
    about = "Interactive chat with per-session memory"
)]
struct Args {
    /// Session id to chat in (a fresh UUID v7 when omitted)
    #[arg(long, env = "CHAT_SESSION_ID")]
    session: Option<String>,

    /// Settings file path, without extension
    #[arg(long, default_value = "config/settings")]
    config: String,

    /// Override the window budget from settings
    #[arg(long)]
    budget: Option<usize>,

    /// Emit logs as JSON
    #[arg(long)]
    log_json: bool,

    /// Print the full history as JSON on exit
    #[arg(long)]
    export_json: bool,
}

/// How the chat loop ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ReplExit {
    Quit,
    EndOfInput,
    Interrupted,
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,chat_memory=debug"));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(true)
        .with_writer(std::io::stderr);

    if json {
        builder.json().init();
    } else {
        builder.compact().init();
    }
}

/// Blocking stdin reads live on their own thread so a pending read never
/// holds up runtime shutdown.
fn spawn_stdin_reader() -> mpsc::Receiver<String> {
    let (tx, rx) = mpsc::channel(1);
    std::thread::spawn(move || {
        for line in std::io::stdin().lines() {
            let Ok(line) = line else {
                break;
            };
            if tx.blocking_send(line).is_err() {
                break;
            }
        }
    });
    rx
}

/// Prompt/turn loop. `interrupt` yields a fresh Ctrl-C future per wait:
/// firing at the prompt ends the loop, firing during a turn cancels that turn.
async fn run_repl<F, S>(
    manager: &MemoryManager,
    session_id: &SessionId,
    input: &mut mpsc::Receiver<String>,
    mut interrupt: F,
) -> Result<ReplExit>
where
    F: FnMut() -> S,
    S: Future,
{
    loop {
        println!("{}", "=".repeat(50));
        print!("Enter: ");
        std::io::stdout().flush()?;

        let line = tokio::select! {
            line = input.recv() => line,
            _ = interrupt() => {
                println!();
                return Ok(ReplExit::Interrupted);
            }
        };
        let Some(line) = line else {
            return Ok(ReplExit::EndOfInput);
        };

        let text = line.trim();
        if text.is_empty() {
            continue;
        }
        if matches!(text.to_lowercase().as_str(), "exit" | "quit") {
            println!("Bye");
            return Ok(ReplExit::Quit);
        }

        let cancel = CancellationToken::new();
        let turn = manager.turn_with_cancel(session_id.as_str(), Role::Human, text, &cancel);
        tokio::pin!(turn);

        let finished = tokio::select! {
            result = &mut turn => Some(result),
            _ = interrupt() => None,
        };
        let result = match finished {
            Some(result) => result,
            None => {
                cancel.cancel();
                turn.await
            }
        };

        match result {
            Ok(reply) => println!("Response: {}", reply.content()),
            Err(e) => eprintln!("Error [{}]: {}", e.code(), e),
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_tracing(args.log_json);

    let session_id = match args.session.as_deref() {
        Some(raw) => SessionId::parse(raw).context("Invalid --session / CHAT_SESSION_ID")?,
        None => SessionId::parse(uuid::Uuid::now_v7().to_string())?,
    };

    info!("Starting chat-memory...");

    let mut settings = Settings::load_from(&args.config)?;
    if let Some(budget) = args.budget {
        settings.memory.budget = budget;
    }
    info!("Configuration loaded");
    if settings.llm.api_key.is_none() {
        warn!("No API key configured (APP__LLM__API_KEY / OPENAI_API_KEY)");
    }

    let store = Arc::new(SessionStore::new());
    let llm = Arc::new(LlmService::new(
        settings.llm.clone(),
        settings.prompts.system_prompt.clone(),
    )?);
    let manager = MemoryManager::new(
        store,
        settings.memory.window(),
        settings.memory.estimator(),
        llm,
    );

    info!("Chatting in session {}", session_id);

    let mut input = spawn_stdin_reader();
    let exit = run_repl(&manager, &session_id, &mut input, tokio::signal::ctrl_c).await?;
    info!("Chat loop ended: {:?}", exit);

    let history = manager.snapshot(session_id.as_str())?;
    println!("{}", "=".repeat(50));
    println!("====== HISTORY ======");
    for message in &history {
        println!("{}", message);
    }

    let window = manager.current_window(session_id.as_str())?;
    let stats = manager.stats();
    println!("====== STATS ======");
    println!("Active sessions: {}", stats.active_sessions);
    println!(
        "Messages stored: {}, in context: {} (cost {})",
        history.len(),
        window.messages.len(),
        window.cost
    );
    println!(
        "Turns: {} completed of {} started, {} failed, {} cancelled",
        stats.turns_completed,
        stats.turns_started,
        stats.generation_failures + stats.estimation_failures,
        stats.cancellations
    );

    if args.export_json {
        println!("{}", serde_json::to_string_pretty(&history)?);
    }

    Ok(())
}

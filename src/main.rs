//! agentchat CLI binary entry point.

use std::io::Write;

use agentchat::cli::{Cli, InputLine, Renderer, EMPTY_STATE_HINT};
use agentchat::config::AgentConfig;
use agentchat::session::{ChatSession, TurnOutcome};
use clap::Parser;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    if let Err(e) = run(cli).await {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    let _ = dotenvy::dotenv();
    let agent_url = cli.agent_url;
    let mut config = AgentConfig::from_lookup(|key| match (key, &agent_url) {
        ("AGENTCHAT_AGENT_URL", Some(url)) => Some(url.clone()),
        _ => std::env::var(key).ok(),
    })?;
    if let Some(mode) = cli.mode {
        config.delivery_mode = mode;
    }

    let session = ChatSession::from_config(config)?;
    let printer = spawn_printer(&session);

    let outcome = match cli.question {
        Some(question) => Some(session.submit(question).await),
        None => {
            println!("{EMPTY_STATE_HINT}");
            prompt_loop(&session).await?;
            None
        }
    };

    // Dropping the last handle closes the snapshot channel so the printer drains and exits.
    session.shutdown();
    drop(session);
    let _ = printer.await;
    println!();

    if outcome.is_some_and(|o| o != TurnOutcome::Completed) {
        std::process::exit(1);
    }

    Ok(())
}

async fn prompt_loop(session: &ChatSession) -> Result<(), Box<dyn std::error::Error>> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        print!("> ");
        std::io::stdout().flush()?;

        let Some(line) = lines.next_line().await? else {
            return Ok(());
        };

        match InputLine::parse(&line) {
            InputLine::Quit => return Ok(()),
            InputLine::Reset => {
                session.reset().await;
                println!("{EMPTY_STATE_HINT}");
            }
            InputLine::Question(text) => {
                session.submit(text).await;
                println!();
            }
            InputLine::Blank => {}
        }
    }
}

/// Print bot output and notifications as they arrive.
fn spawn_printer(session: &ChatSession) -> tokio::task::JoinHandle<()> {
    let mut snapshots = session.watch_snapshot();
    let mut notifications = session.take_notifications();

    tokio::spawn(async move {
        let mut renderer = Renderer::new();
        loop {
            tokio::select! {
                changed = snapshots.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    let delta = renderer.delta(&snapshots.borrow_and_update());
                    if let Some(text) = delta {
                        print!("{text}");
                        let _ = std::io::stdout().flush();
                    }
                }
                Some(notice) = async {
                    match notifications.as_mut() {
                        Some(rx) => rx.recv().await,
                        None => std::future::pending().await,
                    }
                } => {
                    eprintln!("\n{}: {}", notice.title, notice.description);
                }
            }
        }
    })
}

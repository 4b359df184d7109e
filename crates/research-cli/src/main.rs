//! research - run, replay and manage research sessions from a terminal.
//!
//! Progress logs go to stderr and the final answer to stdout, so the answer
//! can be piped or redirected.

use std::io::Write as _;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use research_session::config::LANGGRAPH_HOST_URL;
use research_session::prelude::*;
use research_session::{ApiVariables, init_observability};
use uuid::Uuid;

const DEFAULT_HISTORY_PATH: &str = "research_history.json";
const DEFAULT_API_VARIABLES_PATH: &str = "research_api_variables.json";

#[derive(Parser, Debug)]
#[command(name = "research")]
#[command(about = "Streaming research assistant client")]
#[command(version)]
struct Cli {
    /// Research backend base URL (overrides RESEARCH_BACKEND_URL)
    #[arg(long)]
    backend_url: Option<String>,

    /// History file (overrides RESEARCH_HISTORY_PATH)
    #[arg(long)]
    history_path: Option<PathBuf>,

    /// Persisted API variables file (overrides RESEARCH_API_VARIABLES_PATH)
    #[arg(long)]
    api_variables_path: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Research a question and print the answer
    Ask {
        /// The question to research
        #[arg(required = true)]
        question: Vec<String>,

        /// research_report, detailed_report, deep, multi_agents, ...
        #[arg(long, default_value = "research_report")]
        report_type: ReportType,

        /// web, local or hybrid
        #[arg(long, default_value = "web")]
        report_source: ReportSource,

        #[arg(long, default_value = "Objective")]
        tone: String,

        /// Restrict web search to this domain (repeatable)
        #[arg(long = "domain")]
        domains: Vec<String>,

        /// Keep the push channel open for follow-up questions
        #[arg(long)]
        chat: bool,
    },
    /// Inspect saved sessions
    History {
        #[command(subcommand)]
        action: HistoryAction,
    },
    /// Show a saved session's logs and answer
    Replay { id: Uuid },
    /// Show, set or clear the orchestration host used by multi_agents
    Host {
        url: Option<String>,

        #[arg(long, conflicts_with = "url")]
        clear: bool,
    },
}

#[derive(Subcommand, Debug)]
enum HistoryAction {
    /// List saved sessions, most recent first
    List,
    /// Delete a saved session
    Delete { id: Uuid },
}

enum Step {
    Continue,
    Finished,
    Interrupted,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    init_observability("info");

    let mut config = ClientConfig::from_env().context("invalid RESEARCH_* environment")?;
    if let Some(url) = cli.backend_url {
        config = config.backend_url(url);
    }
    let history_path = cli
        .history_path
        .or_else(|| config.history_path.clone())
        .unwrap_or_else(|| PathBuf::from(DEFAULT_HISTORY_PATH));
    let api_variables_path = cli
        .api_variables_path
        .or_else(|| config.api_variables_path.clone())
        .unwrap_or_else(|| PathBuf::from(DEFAULT_API_VARIABLES_PATH));
    config = config
        .history_path(&history_path)
        .api_variables_path(&api_variables_path);
    let history = Arc::new(JsonFileHistoryStore::new(&history_path));

    match cli.command {
        Command::Ask {
            question,
            report_type,
            report_source,
            tone,
            domains,
            chat,
        } => {
            let mut settings = ResearchSettings::default()
                .report_type(report_type)
                .report_source(report_source)
                .tone(tone);
            settings.query_domains = domains;
            let connector = Arc::new(ResearchConnector::new(&config)?);
            let mut session =
                ResearchSession::new(config, connector, history).with_settings(settings);
            ask(&mut session, &question.join(" "), chat).await
        }
        Command::History { action } => match action {
            HistoryAction::List => list_history(&*history),
            HistoryAction::Delete { id } => {
                if !history.delete(id)? {
                    anyhow::bail!("no saved session with id {id}");
                }
                eprintln!("deleted {id}");
                Ok(())
            }
        },
        Command::Replay { id } => {
            let connector = Arc::new(ResearchConnector::new(&config)?);
            let mut session = ResearchSession::new(config, connector, history);
            if !session.resume_from_history(id)? {
                anyhow::bail!("no saved session with id {id}");
            }
            let mut printed = 0;
            print_new_logs(&session, &mut printed);
            println!("{}", session.state().answer());
            Ok(())
        }
        Command::Host { url, clear } => manage_host(&api_variables_path, url, clear),
    }
}

async fn ask(session: &mut ResearchSession, question: &str, chat: bool) -> Result<()> {
    session.new_research(question).await?;
    let mut printed = 0;
    if drive(session, &mut printed).await? {
        return Ok(());
    }
    println!("{}", session.state().answer());

    if !chat {
        session.disconnect();
        return Ok(());
    }
    while session.is_connected() {
        let Some(line) = prompt("follow-up> ").await? else {
            break;
        };
        if line.is_empty() {
            break;
        }
        session.send_chat(&line).await?;
        if drive(session, &mut printed).await? {
            return Ok(());
        }
        if let Some(EventRecord::Chat { .. }) = session.state().ordered_events().last() {
            println!("{}", session.state().answer());
        }
    }
    session.disconnect();
    Ok(())
}

/// Applies deliveries until the session settles. Returns `true` when the
/// user interrupted it.
async fn drive(session: &mut ResearchSession, printed: &mut usize) -> Result<bool> {
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);
    loop {
        print_new_logs(session, printed);
        if session.state().awaiting_feedback() {
            let reply = prompt("feedback (empty to accept)> ")
                .await?
                .filter(|reply| !reply.is_empty());
            session.send_human_feedback(reply).await?;
            continue;
        }
        if !session.state().loading() {
            return Ok(false);
        }
        let step = tokio::select! {
            update = session.next_update() => match update {
                Some(_) => Step::Continue,
                None => Step::Finished,
            },
            _ = &mut ctrl_c => Step::Interrupted,
        };
        match step {
            Step::Continue => {}
            Step::Finished => {
                print_new_logs(session, printed);
                return Ok(false);
            }
            Step::Interrupted => {
                session.stop();
                print_new_logs(session, printed);
                eprintln!("stopped; partial answer:");
                println!("{}", session.state().answer());
                return Ok(true);
            }
        }
    }
}

/// Log entries only grow at the end, so everything past `printed` is new.
fn print_new_logs(session: &ResearchSession, printed: &mut usize) {
    let entries = session.log_entries();
    for entry in entries.iter().skip(*printed) {
        eprintln!("[{}] {}", entry.header, entry.text);
    }
    *printed = entries.len().max(*printed);
}

async fn prompt(label: &'static str) -> Result<Option<String>> {
    tokio::task::spawn_blocking(move || -> std::io::Result<Option<String>> {
        eprint!("{label}");
        std::io::stderr().flush()?;
        let mut line = String::new();
        if std::io::stdin().read_line(&mut line)? == 0 {
            return Ok(None);
        }
        Ok(Some(line.trim().to_string()))
    })
    .await
    .context("stdin reader panicked")?
    .context("failed to read stdin")
}

fn list_history(history: &dyn HistoryStore) -> Result<()> {
    let entries = history.list()?;
    if entries.is_empty() {
        eprintln!("no saved sessions");
        return Ok(());
    }
    for entry in entries {
        let question: String = entry.question.chars().take(70).collect();
        println!(
            "{}  {}  {:>4} events  {}",
            entry.id,
            entry.created_at.format("%Y-%m-%d %H:%M"),
            entry.ordered_events.len(),
            question
        );
    }
    Ok(())
}

fn manage_host(path: &std::path::Path, url: Option<String>, clear: bool) -> Result<()> {
    let mut vars = ApiVariables::load(path)?;
    if clear {
        vars.remove(LANGGRAPH_HOST_URL);
        vars.save(path)?;
        tracing::info!(path = %path.display(), "cleared orchestration host");
        return Ok(());
    }
    match url {
        Some(url) => {
            vars.set(LANGGRAPH_HOST_URL, url.trim());
            vars.save(path)?;
            tracing::info!(path = %path.display(), "saved orchestration host");
        }
        None => match vars.get(LANGGRAPH_HOST_URL) {
            Some(host) => println!("{host}"),
            None => eprintln!("no orchestration host configured"),
        },
    }
    Ok(())
}

//! CLI entry point for expert-panel

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use console::style;
use expert_panel_agent::ConsultationManager;
use expert_panel_core::bus::{ExpertStatus, ProgressEvent};
use expert_panel_core::config::{Config, ConfigLoader};
use expert_panel_core::logging::init_logging;
use expert_panel_core::session::ExpertResult;
use expert_panel_experts::{ExpertCatalog, ExpertOpinion};
use expert_panel_providers::OpenAICompatClient;
use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc::UnboundedReceiver;
use tracing::{info, warn};

#[derive(Parser)]
#[command(name = "expert-panel")]
#[command(about = "Multi-expert consultation assistant")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration directory
    #[arg(short, long, global = true)]
    config_dir: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start a consultation
    Ask {
        /// Question for the panel
        query: String,
        /// User the session belongs to
        #[arg(short, long, default_value_t = 1)]
        user_id: u64,
        /// Round limit for this session
        #[arg(short, long)]
        max_rounds: Option<u32>,
        /// Run the first round only
        #[arg(long)]
        once: bool,
    },
    /// List the expert panel
    Experts,
    /// Show the effective configuration
    Config,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config_loader = if let Some(dir) = cli.config_dir {
        ConfigLoader::with_dir(dir)
    } else {
        ConfigLoader::new()
    };

    match cli.command {
        Commands::Ask {
            query,
            user_id,
            max_rounds,
            once,
        } => {
            let config = config_loader.load().context("Failed to load configuration")?;
            let _guard = init_logging(&config.logging);
            info!("Starting consultation for user {}", user_id);
            run_ask(config, &query, user_id, max_rounds, once).await?;
        }
        Commands::Experts => run_experts(),
        Commands::Config => run_config(&config_loader)?,
    }

    Ok(())
}

/// Drive `round` to completion while printing progress as it arrives
async fn with_progress<T>(
    round: impl Future<Output = T>,
    events: &mut UnboundedReceiver<ProgressEvent>,
) -> T {
    tokio::pin!(round);
    loop {
        tokio::select! {
            result = &mut round => {
                while let Ok(event) = events.try_recv() {
                    print_event(&event);
                }
                return result;
            }
            Some(event) = events.recv() => print_event(&event),
        }
    }
}

fn print_event(event: &ProgressEvent) {
    match event {
        ProgressEvent::Thinking(e) => {
            println!("{} {}", style(format!("[{:>3}%]", e.progress)).dim(), e.message);
        }
        ProgressEvent::ExpertStatus(e) => {
            let marker = match e.status {
                ExpertStatus::Thinking => style("…").cyan(),
                ExpertStatus::Completed => style("✓").green().bold(),
                ExpertStatus::Failed => style("✗").red(),
            };
            println!("{} {} {}", style(format!("[{:>3}%]", e.progress)).dim(), marker, e.message);
        }
        ProgressEvent::Completion(e) => {
            println!(
                "{} {} ({} experts consulted: {})",
                style("✓").green().bold(),
                e.message,
                e.total_experts,
                e.experts_consulted.join(", ")
            );
        }
    }
}

fn print_reply(catalog: &ExpertCatalog, response: &str, results: &[ExpertResult]) {
    for result in results {
        let opinion = ExpertOpinion::parse(
            result.expert_type.as_str(),
            result.expert_name.as_str(),
            result.response.as_str(),
        );
        println!("\n{}", style(&result.expert_name).bold().cyan());
        if opinion.is_structured() {
            for point in &opinion.key_points {
                println!("  • {}", point);
            }
            for recommendation in &opinion.recommendations {
                println!("  → {}", recommendation);
            }
        } else {
            println!("  {}", result.response.trim());
        }
    }
    if !results.is_empty() {
        println!(
            "{}",
            style(format!("({} of {} experts)", results.len(), catalog.len())).dim()
        );
    }

    println!("\n{}", style("Response:").bold());
    println!("{}\n", response);
}

async fn run_ask(
    config: Config,
    query: &str,
    user_id: u64,
    max_rounds: Option<u32>,
    once: bool,
) -> Result<()> {
    let provider = Arc::new(OpenAICompatClient::new());
    let manager = ConsultationManager::new(config, provider)?;

    let session_id = manager.open_session(user_id, query, max_rounds)?;
    let mut events = manager.broadcaster().subscribe(&session_id);
    println!("{} {}", style("Session").bold(), style(&session_id).dim());

    let start = with_progress(manager.begin(&session_id), &mut events).await?;
    print_reply(manager.catalog(), &start.initial_response, &start.expert_responses);

    if start.is_completed || once {
        return finish(&manager, &session_id);
    }

    println!(
        "{}",
        style("Ask a follow-up question, or type /end to finish.").dim()
    );
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        print!("{} ", style(">").cyan().bold());
        std::io::Write::flush(&mut std::io::stdout())?;

        let Some(line) = lines.next_line().await? else {
            break;
        };
        let input = line.trim();
        if input.is_empty() {
            continue;
        }
        if input == "/end" {
            manager.end_session(&session_id)?;
            break;
        }

        let round = with_progress(manager.continue_session(&session_id, input), &mut events).await?;
        print_reply(manager.catalog(), &round.response, &round.expert_responses);
        if round.is_completed {
            break;
        }
    }

    finish(&manager, &session_id)
}

fn finish(manager: &ConsultationManager, session_id: &str) -> Result<()> {
    match manager.get_status(session_id)? {
        Some(session) => {
            let usage = session.total_usage();
            println!(
                "{} {} after {} round(s), {} tokens",
                style("Session").bold(),
                session.status,
                session.rounds.len(),
                usage.total_tokens
            );
        }
        None => warn!("Session {} disappeared before it finished", session_id),
    }
    manager.broadcaster().clear_session(session_id);
    Ok(())
}

fn run_experts() {
    let catalog = ExpertCatalog::builtin();

    println!("{}", style("Expert Panel").bold().cyan());
    println!();
    for expert in catalog.iter() {
        println!(
            "  {} ({})",
            style(&expert.name).bold(),
            style(&expert.function.name).dim()
        );
        println!("    {}", expert.role);
        println!("    Expertise: {}", expert.expertise.join(", "));
    }
}

fn redact(key: &mut String) {
    if !key.is_empty() {
        *key = "********".to_string();
    }
}

fn run_config(loader: &ConfigLoader) -> Result<()> {
    let mut config = loader.load().context("Failed to load configuration")?;
    redact(&mut config.coordinator.api_key);
    redact(&mut config.experts.api_key);

    println!("{}", style("Configuration").bold().cyan());
    println!("Config directory: {}", loader.config_dir().display());
    println!("{}", serde_json::to_string_pretty(&config)?);
    Ok(())
}

mod config;
mod engine;
mod gateway;
mod server;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use attune_core::{ConsentUpdate, DataRetention, TurnContext, export_profile_json, import_profile_json};
use attune_store::{MemoryRepository, ProfileRepository};
use clap::{Parser, Subcommand};
use rmcp::{ServiceExt, transport::stdio};
use tokio::io::{AsyncBufReadExt, BufReader};

use crate::config::Config;
use crate::engine::{EngineSettings, SessionEngine, TurnResponse};
use crate::gateway::FailoverGateway;

#[derive(Parser)]
#[command(name = "attune", about = "Nervous-system-aware conversation engine, CLI and MCP server")]
struct Cli {
    /// Enable verbose debug output
    #[arg(long, global = true)]
    verbose: bool,

    /// Keep everything in memory; nothing is read from or written to disk
    #[arg(long, global = true)]
    ephemeral: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start MCP server on stdio transport
    Serve,

    /// Run a single turn and print the reply
    Say {
        /// Message text
        text: String,

        #[arg(long, default_value = "local")]
        user: String,

        /// Session to continue; a fresh one is used when omitted
        #[arg(long)]
        session: Option<String>,

        /// Print the full response as JSON
        #[arg(long)]
        json: bool,
    },

    /// Interactive conversation on stdin, one message per line
    Chat {
        #[arg(long, default_value = "local")]
        user: String,
    },

    /// Print a user's learned profile
    Profile {
        user: String,
    },

    /// Change consent settings for a user
    Consent {
        user: String,

        #[arg(long)]
        decode_mode: Option<bool>,

        #[arg(long)]
        voice_output: Option<bool>,

        #[arg(long)]
        mic_input: Option<bool>,

        #[arg(long)]
        biometric_sharing: Option<bool>,

        /// session_only, thirty_days or indefinite
        #[arg(long, value_parser = parse_retention)]
        retention: Option<DataRetention>,
    },

    /// Export a user's profile to a JSON file
    Export {
        user: String,
        /// Output file path
        path: PathBuf,
    },

    /// Import a profile from a JSON file
    Import {
        /// Input file path
        path: PathBuf,
    },

    /// Delete thirty-day data past its retention window
    Purge,
}

fn parse_retention(s: &str) -> std::result::Result<DataRetention, String> {
    DataRetention::parse(s)
        .ok_or_else(|| format!("expected session_only, thirty_days or indefinite, got {s:?}"))
}

fn base_dir() -> PathBuf {
    std::env::var("ATTUNE_DATA_DIR")
        .ok()
        .map(PathBuf::from)
        .unwrap_or_else(attune_store::default_base_dir)
}

fn open_repository(cli: &Cli, base: &Path) -> Result<Box<dyn ProfileRepository>> {
    if cli.ephemeral {
        tracing::info!("ephemeral mode, nothing will be persisted");
        return Ok(Box::new(MemoryRepository::new()));
    }
    let store = attune_store::open_in_dir(base)
        .with_context(|| format!("failed to open store in {}", base.display()))?;
    Ok(Box::new(store))
}

fn build_engine(cli: &Cli) -> Result<SessionEngine> {
    let base = base_dir();
    let config = Config::load(&base)?;
    let gateway = FailoverGateway::from_config(&config.gateway);
    tracing::debug!(providers = gateway.provider_count(), "gateway ready");
    let repo = open_repository(cli, &base)?;
    Ok(SessionEngine::new(
        Arc::new(gateway),
        repo,
        EngineSettings::from(&config),
    ))
}

fn init_tracing(verbose: bool) {
    use tracing_subscriber::EnvFilter;

    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::from_default_env().add_directive(tracing::Level::WARN.into())
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match &cli.command {
        Commands::Serve => cmd_serve(&cli).await,
        Commands::Say {
            text,
            user,
            session,
            json,
        } => cmd_say(&cli, text, user, session.as_deref(), *json).await,
        Commands::Chat { user } => cmd_chat(&cli, user).await,
        Commands::Profile { user } => cmd_profile(&cli, user).await,
        Commands::Consent {
            user,
            decode_mode,
            voice_output,
            mic_input,
            biometric_sharing,
            retention,
        } => {
            let update = ConsentUpdate {
                decode_mode: *decode_mode,
                voice_output: *voice_output,
                mic_input: *mic_input,
                biometric_sharing: *biometric_sharing,
                data_retention: *retention,
            };
            cmd_consent(&cli, user, &update).await
        }
        Commands::Export { user, path } => cmd_export(&cli, user, path).await,
        Commands::Import { path } => cmd_import(&cli, path).await,
        Commands::Purge => cmd_purge(&cli).await,
    }
}

async fn cmd_serve(cli: &Cli) -> Result<()> {
    let engine = build_engine(cli)?;
    tracing::info!("starting MCP server");

    let engine = Arc::new(engine);
    let server = server::AttuneServer::new(Arc::clone(&engine));
    let service = server
        .serve(stdio())
        .await
        .context("failed to start MCP server")?;
    service.waiting().await?;

    engine.checkpoint().await;
    Ok(())
}

fn print_turn(response: &TurnResponse) {
    println!("{}", response.response);
    let Some(mode) = response.mode else {
        return;
    };
    let mut meta = format!("\n[{mode}]");
    if let Some(patterns) = &response.detected_patterns {
        if !patterns.codes.is_empty() {
            let codes: Vec<&str> = patterns.codes.iter().map(|c| c.code.as_str()).collect();
            meta.push_str(&format!(" {}", codes.join(", ")));
        }
        meta.push_str(&format!(" | {}", patterns.quantum_state_description));
    }
    println!("{meta}");
    for s in &response.suggestions {
        println!("  - {s}");
    }
}

async fn cmd_say(cli: &Cli, text: &str, user: &str, session: Option<&str>, json: bool) -> Result<()> {
    let engine = build_engine(cli)?;
    let session_id = session
        .map(str::to_string)
        .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

    let response = engine
        .process_message(&session_id, user, text, &TurnContext::default())
        .await;

    if json {
        println!("{}", serde_json::to_string_pretty(&response)?);
    } else {
        print_turn(&response);
    }
    if let Some(error) = response.error {
        anyhow::bail!("turn failed: {error}");
    }
    Ok(())
}

async fn cmd_chat(cli: &Cli, user: &str) -> Result<()> {
    let engine = build_engine(cli)?;
    let session_id = uuid::Uuid::new_v4().to_string();
    eprintln!("session {session_id}. Type a message, or an empty line to quit.");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await.context("failed to read stdin")? {
        let line = line.trim();
        if line.is_empty() {
            break;
        }
        let response = engine
            .process_message(&session_id, user, line, &TurnContext::default())
            .await;
        print_turn(&response);
        println!();
    }
    tracing::debug!(sessions = engine.session_count().await, "chat ended");
    Ok(())
}

async fn cmd_profile(cli: &Cli, user: &str) -> Result<()> {
    let engine = build_engine(cli)?;
    let profile = engine.profile(user).await;
    let json = export_profile_json(&profile).context("failed to serialize profile")?;
    println!("{json}");
    Ok(())
}

async fn cmd_consent(cli: &Cli, user: &str, update: &ConsentUpdate) -> Result<()> {
    let engine = build_engine(cli)?;
    let profile = engine.set_consent(user, update).await?;
    let c = &profile.consent;
    println!(
        "consent for {user}: decode_mode={} voice_output={} mic_input={} biometric_sharing={} retention={}",
        c.decode_mode,
        c.voice_output,
        c.mic_input,
        c.biometric_sharing,
        c.data_retention.as_str()
    );
    Ok(())
}

async fn cmd_export(cli: &Cli, user: &str, path: &Path) -> Result<()> {
    let engine = build_engine(cli)?;
    let profile = engine.profile(user).await;
    let json = export_profile_json(&profile).context("failed to serialize profile")?;
    std::fs::write(path, &json).with_context(|| format!("failed to write {}", path.display()))?;

    println!("exported {user} to {}", path.display());
    Ok(())
}

async fn cmd_import(cli: &Cli, path: &Path) -> Result<()> {
    let engine = build_engine(cli)?;
    let json = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    let profile = import_profile_json(&json).context("failed to import profile JSON")?;
    let user_id = profile.user_id.clone();
    engine.import_profile(profile).await?;

    println!("imported profile for {user_id} from {}", path.display());
    Ok(())
}

async fn cmd_purge(cli: &Cli) -> Result<()> {
    let engine = build_engine(cli)?;
    let report = engine.purge().await?;
    println!(
        "purged {} profiles, {} messages",
        report.profiles, report.messages
    );
    Ok(())
}

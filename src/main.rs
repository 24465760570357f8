//! PocketClaw - remote control bridge for a local automation agent

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use pocketclaw::{
    agent::find_on_path,
    config::{default_base_dir, PocketClawConfig},
    gateway::GatewayBuilder,
    settings::BackendKind,
};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "pocketclaw")]
#[command(version)]
#[command(about = "Drive a local automation agent from your phone")]
struct Cli {
    /// Configuration file path
    #[arg(short, long, env = "POCKETCLAW_CONFIG")]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Log as JSON lines
    #[arg(long)]
    log_json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the WebSocket gateway
    Serve {
        /// Host to bind to (overrides config)
        #[arg(long)]
        host: Option<String>,

        /// Port to listen on (overrides config)
        #[arg(long)]
        port: Option<u16>,
    },

    /// Show configuration
    Config {
        /// Show default configuration
        #[arg(long)]
        default: bool,
    },

    /// Check the local environment
    Doctor,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose, cli.log_json);

    let config = PocketClawConfig::load(cli.config.as_deref()).context("loading configuration")?;

    match cli.command {
        Commands::Serve { host, port } => run_serve(config, host, port).await?,
        Commands::Config { default } => {
            let config = if default {
                PocketClawConfig::default()
            } else {
                config
            };
            println!("{}", config.to_toml()?);
        }
        Commands::Doctor => run_doctor(&config),
    }

    Ok(())
}

fn init_tracing(verbose: bool, json: bool) {
    let log_level = if verbose { "debug" } else { "info" };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| format!("pocketclaw={},tower_http=info", log_level).into());

    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

async fn run_serve(config: PocketClawConfig, host: Option<String>, port: Option<u16>) -> Result<()> {
    let mut builder = GatewayBuilder::new().config(config);
    if let Some(host) = host {
        builder = builder.host(host);
    }
    if let Some(port) = port {
        builder = builder.port(port);
    }
    let gateway = Arc::new(builder.build().context("building gateway")?);

    tracing::info!("PocketClaw is starting. Press Ctrl+C to stop.");
    gateway.run().await?;
    Ok(())
}

fn run_doctor(config: &PocketClawConfig) {
    println!("🔍 PocketClaw Doctor");
    println!();

    println!("Checking configuration...");
    let config_path = default_base_dir().join("config.toml");
    if config_path.exists() {
        println!("  ✓ Configuration file found: {}", config_path.display());
    } else {
        println!("  ℹ No configuration file found (using defaults)");
    }
    if config.gateway.auth_token.is_none() {
        println!("  ⚠ No pairing token set; any client on the network can connect");
    }

    println!();
    println!("Checking jail root...");
    let root = config.jail.root_dir();
    match std::fs::read_dir(&root) {
        Ok(_) => println!("  ✓ {} is readable", root.display()),
        Err(e) => println!("  ✗ {}: {}", root.display(), e),
    }

    println!();
    println!("Checking agent backends...");
    for kind in BackendKind::ALL {
        let program = &config.agent.command_for(kind).program;
        match find_on_path(program) {
            Some(path) => println!("  ✓ {}: {}", kind, path.display()),
            None => println!("  ✗ {}: '{}' not found on PATH", kind, program),
        }
    }

    println!();
    println!("Checking screenshot tool...");
    match config.tools.screenshot_command.first() {
        Some(program) => match find_on_path(program) {
            Some(path) => println!("  ✓ {}", path.display()),
            None => println!("  ✗ '{}' not found on PATH", program),
        },
        None => println!("  ✗ No screenshot command configured"),
    }

    println!();
    println!("Doctor check complete!");
}

//! Arena CLI - run the battle orchestration server.
//!
//! # Usage
//!
//! ```bash
//! # Start the server with defaults (or ./arena.toml when present)
//! arena serve
//!
//! # Override the listen address
//! arena serve --host 0.0.0.0 --port 9000
//!
//! # Print the effective configuration
//! arena config show
//!
//! # Write a default config file to edit
//! arena config init
//! ```

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process;
use tracing_subscriber::EnvFilter;

use arena::ArenaConfig;

#[derive(Parser)]
#[command(name = "arena")]
#[command(about = "Arena - Judged-Contest Orchestration for Independent Agents", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the orchestration server
    Serve {
        /// Listen host; overrides configuration
        #[arg(long)]
        host: Option<String>,

        /// Listen port; overrides configuration
        #[arg(long)]
        port: Option<u16>,

        /// Configuration file path
        #[arg(long)]
        config: Option<PathBuf>,
    },

    /// Inspect or create configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Print the effective configuration
    Show,
    /// Write a default configuration file
    Init {
        /// Destination path
        #[arg(long, default_value = arena::config::DEFAULT_CONFIG_PATH)]
        path: PathBuf,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let default_filter = if cli.verbose { "arena=debug,info" } else { "arena=info,warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter)),
        )
        .init();

    if let Err(e) = run(cli).await {
        eprintln!("Error: {:#}", e);
        process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Commands::Serve { host, port, config } => {
            let mut config = match config {
                Some(path) => ArenaConfig::load_from_path(&path)?,
                None => ArenaConfig::load()?,
            };
            if let Some(host) = host {
                config.server.host = host;
            }
            if let Some(port) = port {
                config.server.port = port;
            }
            arena::api::serve(config).await
        }
        Commands::Config { action } => match action {
            ConfigAction::Show => {
                let config = ArenaConfig::load()?;
                println!("{}", toml::to_string_pretty(&config)?);
                Ok(())
            }
            ConfigAction::Init { path } => {
                ArenaConfig::default().save_to_path(&path)?;
                println!("Wrote default configuration to {}", path.display());
                Ok(())
            }
        },
    }
}

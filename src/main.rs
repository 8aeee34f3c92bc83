//! CLI for resolving and opening URLs through configured delegates

use clap::{Parser, Subcommand};
use rust_forward_delegate::{
    cli::{ConnectArgs, ResolveArgs},
    init_logger_with_config, log_error, log_info, DelegateConfig,
};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "rust-forward-delegate")]
#[command(about = "Resolve and open URLs through pluggable rewrite delegates")]
#[command(version = env!("CARGO_PKG_VERSION"))]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file (defaults to config.yml when present)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Log level (trace, debug, info, warn, error); overrides the config file
    #[arg(long, global = true)]
    log_level: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Show which delegate claims a URL and what it is rewritten to
    #[command(name = "resolve")]
    Resolve(ResolveArgs),

    /// Open a connection for a URL
    #[command(name = "connect")]
    Connect(ConnectArgs),
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = match DelegateConfig::load_config(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Failed to load configuration: {}", e);
            std::process::exit(1);
        }
    };

    let log_level = if cli.verbose {
        "debug".to_string()
    } else {
        cli.log_level.clone().unwrap_or_else(|| config.log_level.clone())
    };
    init_logger_with_config(&log_level);

    log_info!("📋 {} delegate rule(s), selection {:?}", config.rules.len(), config.selection);

    let outcome = match &cli.command {
        Commands::Resolve(args) => args.execute(&config).await.map(|_| ()),
        Commands::Connect(args) => args.execute(&config).await.map(|_| ()),
    };

    if let Err(e) = outcome {
        log_error!("{:#}", e);
        std::process::exit(1);
    }

    Ok(())
}

//! Binary entry point for memgate.
//!
//! This binary provides the CLI interface for the memory gateway.

#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(missing_docs)]
// Allow print_stderr/print_stdout in main binary for CLI output
#![allow(clippy::print_stderr)]
#![allow(clippy::print_stdout)]
// Allow multiple crate versions from transitive dependencies
#![allow(clippy::multiple_crate_versions)]

use clap::{Parser, Subcommand};
use memgate::config::GatewayConfig;
use memgate::gateway::Gateway;
use memgate::observability;
use std::process::ExitCode;

/// Memgate - a session-scoped memory gateway for AI coding assistants.
#[derive(Parser)]
#[command(name = "memgate")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Enable verbose output.
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Path to configuration file.
    #[arg(short, long, global = true)]
    config: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

/// Available commands.
#[derive(Subcommand)]
enum Commands {
    /// Run the gateway.
    Serve {
        /// Port to listen on (overrides configuration).
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Load the configuration, print the effective values, and exit.
    ConfigCheck,
}

/// Main entry point.
#[tokio::main]
async fn main() -> ExitCode {
    // A missing .env file is fine; values from it never override the
    // real environment.
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();

    let mut config = match load_config(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Failed to load configuration: {e}");
            return ExitCode::FAILURE;
        }
    };
    if cli.verbose {
        config.logging.filter = "debug".to_string();
    }

    observability::init(&config.logging);

    let result = run_command(cli.command, config).await;

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
    }
}

/// Runs the selected command.
async fn run_command(command: Commands, config: GatewayConfig) -> anyhow::Result<()> {
    match command {
        Commands::Serve { port } => {
            let config = match port {
                Some(port) => config.with_port(port),
                None => config,
            };
            Gateway::new(config).serve().await?;
            Ok(())
        }
        Commands::ConfigCheck => {
            println!("bind_addr        = {}", config.bind_addr);
            println!("port             = {}", config.port);
            println!(
                "static_token     = {}",
                if config.auth.static_token.is_some() {
                    "(set)"
                } else {
                    "(unset)"
                }
            );
            println!(
                "login            = {}",
                if config.auth.username.is_some() && config.auth.password.is_some() {
                    "(configured)"
                } else {
                    "(unconfigured)"
                }
            );
            println!("identity_policy  = {:?}", config.identity.policy);
            println!("default_user_id  = {}", config.identity.default_user_id);
            println!("episodic_url     = {}", config.episodic.base_url);
            println!(
                "llm              = {}",
                config.llm.model.as_deref().unwrap_or("(default model)")
            );
            println!("consolidation    = {:?}", config.consolidation.coverage);
            Ok(())
        }
    }
}

/// Loads configuration.
fn load_config(path: Option<&str>) -> anyhow::Result<GatewayConfig> {
    // If a path is provided, load from that file
    if let Some(config_path) = path {
        return Ok(GatewayConfig::load_from_file(std::path::Path::new(
            config_path,
        ))?);
    }

    // Environment override for config path
    if let Ok(config_path) = std::env::var("MEMGATE_CONFIG_PATH") {
        if !config_path.trim().is_empty() {
            return Ok(GatewayConfig::load_from_file(std::path::Path::new(
                &config_path,
            ))?);
        }
    }

    // Otherwise, load from default location
    Ok(GatewayConfig::load_default())
}

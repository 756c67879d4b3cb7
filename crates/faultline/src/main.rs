//! Faultline - incident diagnosis from historical cases and live host checks
//!
//! Main entry point for the Faultline CLI.

use anyhow::{Context as _, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;

mod commands;
mod logging;
mod services;

use commands::{agent, check, diagnose, serve};

// ─────────────────────────────────────────────────────────────────────────────
// CLI Structure
// ─────────────────────────────────────────────────────────────────────────────

/// Faultline - incident diagnosis from historical cases and live host checks
#[derive(Parser)]
#[command(name = "faultline")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Load exactly this config file instead of discovering layers
    #[arg(short, long, global = true, env = "FAULTLINE_CONFIG")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start the HTTP server
    Serve(serve::ServeArgs),

    /// Diagnose an error log from historical cases
    Diagnose(diagnose::DiagnoseArgs),

    /// Diagnose with live commands on the target host
    Agent(agent::AgentArgs),

    /// Probe the configured external services
    Check(check::CheckArgs),
}

// ─────────────────────────────────────────────────────────────────────────────
// Main
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = match cli.config {
        Some(ref path) => faultline_config::load_config_file(path)
            .with_context(|| format!("failed to load config from {}", path.display()))?,
        None => {
            let loaded = faultline_config::load_config(None).context("failed to load config")?;
            for warning in &loaded.warnings {
                eprintln!("warning: {}", warning);
            }
            loaded.config
        }
    };
    config.validate().context("invalid configuration")?;

    // Held for the process lifetime so buffered file logs are flushed on exit
    let _log_guard = logging::init(cli.verbose, &config.logging())?;

    let ctx = commands::Context {
        config,
        verbose: cli.verbose,
    };

    match cli.command {
        Commands::Serve(args) => serve::run(args, &ctx).await,
        Commands::Diagnose(args) => diagnose::run(args, &ctx).await,
        Commands::Agent(args) => agent::run(args, &ctx).await,
        Commands::Check(args) => check::run(args, &ctx).await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parses_subcommands() {
        let cli = Cli::try_parse_from(["faultline", "-v", "diagnose", "-", "--top-k", "5"]).unwrap();
        assert!(cli.verbose);
        match cli.command {
            Commands::Diagnose(args) => {
                assert_eq!(args.input, "-");
                assert_eq!(args.top_k, Some(5));
            }
            _ => panic!("expected diagnose"),
        }

        let cli = Cli::try_parse_from(["faultline", "agent", "nginx 502", "--stream"]).unwrap();
        assert!(matches!(cli.command, Commands::Agent(ref a) if a.stream));

        let cli = Cli::try_parse_from(["faultline", "serve", "--port", "9000"]).unwrap();
        assert!(matches!(cli.command, Commands::Serve(ref s) if s.port == Some(9000)));
    }

    #[test]
    fn test_cli_requires_subcommand() {
        assert!(Cli::try_parse_from(["faultline"]).is_err());
    }
}

//! Serve command - runs the HTTP API in the foreground.

use anyhow::{Context as _, Result};
use clap::Args;
use console::Style;
use tracing::info;

use faultline_server::{AppState, Server, ServerConfig};

use super::Context;
use crate::services;

/// Arguments for the serve command.
#[derive(Args, Debug)]
pub struct ServeArgs {
    /// Port to listen on (overrides config)
    #[arg(short, long)]
    pub port: Option<u16>,

    /// Address to bind (overrides config)
    #[arg(short, long)]
    pub bind: Option<String>,
}

/// Run the serve command.
pub async fn run(args: ServeArgs, ctx: &Context) -> Result<()> {
    let mut server_section = ctx.config.server();
    if let Some(port) = args.port {
        server_section.port = port;
    }
    if let Some(bind) = args.bind {
        server_section.bind = bind;
    }
    let server_config = ServerConfig::from_config(&server_section)?;

    let (kb, pipeline) = services::pipeline(&ctx.config).await?;
    let agent = services::agent(&ctx.config)?;
    let state = AppState::new(pipeline, agent, kb.len(), server_config);
    let server = Server::from_state(state);

    let dim = Style::new().dim();
    println!(
        "{} {}",
        Style::new().green().bold().apply_to("Faultline listening on"),
        server.bind_address()
    );
    println!("{}", dim.apply_to(format!("  knowledge base: {} cases", kb.len())));
    if ctx.verbose {
        println!(
            "{}",
            dim.apply_to(format!("  remote target: {}", ctx.config.remote().host))
        );
    }

    info!(addr = %server.bind_address(), "Starting server");
    server.run().await.context("server exited with an error")
}

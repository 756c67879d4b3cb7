//! Agent command - diagnosis with live commands on the target host.

use anyhow::{Result, bail};
use clap::Args;
use console::{Style, style};
use futures::StreamExt;
use std::sync::Arc;

use faultline_agent::{AgentDiagnosis, StreamEvent, StreamingMonitor};

use super::diagnose::confidence_style;
use super::{Context, read_input};
use crate::services;

/// Arguments for the agent command.
#[derive(Args, Debug)]
pub struct AgentArgs {
    /// Error log text, or `-` to read it from stdin
    #[arg(required = true)]
    pub input: String,

    /// Print each step as it happens
    #[arg(short, long)]
    pub stream: bool,

    /// Print the result as JSON
    #[arg(long, conflicts_with = "stream")]
    pub json: bool,
}

/// Run the agent command.
pub async fn run(args: AgentArgs, ctx: &Context) -> Result<()> {
    let error_log = read_input(&args.input)?;
    let agent = services::agent(&ctx.config)?;

    if ctx.verbose {
        let dim = Style::new().dim();
        let remote = ctx.config.remote();
        println!(
            "{}",
            dim.apply_to(format!("Target: {}@{}:{}", remote.user, remote.host, remote.port))
        );
        println!();
    }

    if !args.stream {
        let result = agent.diagnose(&error_log).await;
        if args.json {
            println!("{}", serde_json::to_string_pretty(&result)?);
        } else {
            print_diagnosis(&result);
        }
        return Ok(());
    }

    let monitor = StreamingMonitor::new(Arc::new(agent));
    let mut events = monitor.run(error_log);
    let dim = Style::new().dim();
    let red = Style::new().red();

    while let Some(event) = events.next().await {
        match event {
            StreamEvent::Thinking { message } => {
                println!("{}", dim.apply_to(message));
            }
            StreamEvent::ToolCall { command } => {
                println!("{} {}", style("$").cyan().bold(), command);
            }
            StreamEvent::ToolResult { content, success } => {
                let marker = if success {
                    Style::new().green().apply_to("ok")
                } else {
                    red.apply_to("failed")
                };
                println!("{}", dim.apply_to(format!("[{}]", marker)));
                for line in content.lines() {
                    println!("  {}", dim.apply_to(line));
                }
            }
            StreamEvent::FinalResult { result } => {
                print_diagnosis(&result);
            }
            StreamEvent::Error { message } => {
                eprintln!("{} {}", red.apply_to("Error:"), message);
                bail!(message);
            }
        }
    }
    Ok(())
}

fn print_diagnosis(result: &AgentDiagnosis) {
    let dim = Style::new().dim();
    let label = Style::new().cyan().bold();

    println!();
    println!("{}", style(&result.diagnosis).bold());
    println!("{}", dim.apply_to("─".repeat(40)));
    println!("{} {}", label.apply_to("Root cause:"), result.root_cause);
    println!("{} {}", label.apply_to("Solution:"), result.solution);
    println!(
        "{} {}",
        label.apply_to("Confidence:"),
        confidence_style(result.confidence).apply_to(format!("{:.2}", result.confidence))
    );
    if !result.tool_calls.is_empty() {
        println!();
        println!("{}", dim.apply_to("Commands run:"));
        for command in &result.tool_calls {
            println!("  {}", dim.apply_to(command));
        }
    }
    println!();
}

//! Check command - probes every configured external service.

use anyhow::{Result, bail};
use clap::Args;
use console::{Style, style};
use std::fmt::Display;
use std::future::Future;

use faultline_llm::LlmBackend;

use super::Context;
use crate::services;

/// Arguments for the check command.
#[derive(Args, Debug)]
pub struct CheckArgs {
    /// Also run `true` on the remote host over SSH
    #[arg(long)]
    pub remote: bool,
}

/// Run the check command.
pub async fn run(args: CheckArgs, ctx: &Context) -> Result<()> {
    let config = &ctx.config;
    let dim = Style::new().dim();

    println!();
    println!("{}", style("Faultline Service Check").bold());
    println!("{}", dim.apply_to("─".repeat(40)));

    let mut failures = 0;

    let kb = services::knowledge(config)?;
    println!(
        "  {} knowledge {}",
        Style::new().green().apply_to("✓"),
        dim.apply_to(format!("({} cases)", kb.len()))
    );

    let llm = services::llm_backend(config)?;
    report("llm", config.llm().model, llm.health_check(), &mut failures).await;

    let embedder = services::embedder(config)?;
    report(
        "embedding",
        config.embedding().model,
        embedder.health_check(),
        &mut failures,
    )
    .await;

    let reranker = config.reranker();
    if reranker.enabled {
        let service = services::rerank_service(config)?;
        report("reranker", reranker.model, service.health_check(), &mut failures).await;
    } else {
        println!("  {} reranker {}", dim.apply_to("-"), dim.apply_to("(disabled)"));
    }

    let plan = faultline_knowledge::IndexPlan::from_config(config)?;
    match plan.remote {
        Some(store) => {
            let target = format!("{} / {}", config.vector_store().url, store.collection());
            report("milvus", target, store.health_check(), &mut failures).await;
        }
        None => println!("  {} milvus {}", dim.apply_to("-"), dim.apply_to("(disabled)")),
    }

    if args.remote {
        let remote = config.remote();
        let tool = faultline_agent::RemoteExecutionTool::from_config(&remote);
        let target = tool.target();
        let probe = async move {
            let result = tool.execute("true").await;
            if result.success {
                Ok(())
            } else {
                Err(result.stderr)
            }
        };
        report("ssh", target, probe, &mut failures).await;
    }

    println!();
    if failures > 0 {
        bail!("{} service check(s) failed", failures);
    }
    Ok(())
}

async fn report<E: Display>(
    name: &str,
    target: impl Display,
    probe: impl Future<Output = std::result::Result<(), E>>,
    failures: &mut usize,
) {
    let dim = Style::new().dim();
    match probe.await {
        Ok(()) => println!(
            "  {} {} {}",
            Style::new().green().apply_to("✓"),
            name,
            dim.apply_to(format!("({})", target))
        ),
        Err(e) => {
            *failures += 1;
            println!(
                "  {} {} {}",
                Style::new().red().apply_to("✗"),
                name,
                dim.apply_to(format!("({})", target))
            );
            println!("      {}", dim.apply_to(e));
        }
    }
}

//! Diagnose command - one-shot retrieval-augmented diagnosis.

use anyhow::{Result, bail};
use clap::Args;
use console::{Style, style};

use faultline_agent::DiagnosisResult;

use super::{Context, read_input};
use crate::services;

/// Arguments for the diagnose command.
#[derive(Args, Debug)]
pub struct DiagnoseArgs {
    /// Error log text, or `-` to read it from stdin
    #[arg(required = true)]
    pub input: String,

    /// Number of historical cases to retrieve
    #[arg(short = 'k', long)]
    pub top_k: Option<usize>,

    /// Print the result as JSON
    #[arg(long)]
    pub json: bool,
}

/// Run the diagnose command.
pub async fn run(args: DiagnoseArgs, ctx: &Context) -> Result<()> {
    let error_log = read_input(&args.input)?;
    if args.top_k == Some(0) {
        bail!("--top-k must be at least 1");
    }

    let (_kb, pipeline) = services::pipeline(&ctx.config).await?;
    let top_k = args.top_k.unwrap_or(pipeline.options().top_k);
    let result = pipeline.diagnose_with_top_k(&error_log, top_k).await;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&result)?);
    } else {
        print_result(&result, ctx.verbose);
    }
    Ok(())
}

fn print_result(result: &DiagnosisResult, verbose: bool) {
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

    if !result.retrieved_cases.is_empty() {
        println!();
        println!("{}", dim.apply_to("Similar cases:"));
        for (i, case) in result.retrieved_cases.iter().enumerate() {
            let score = match case.rerank_score {
                Some(rerank) => format!("similarity {:.3}, rerank {:.3}", case.similarity, rerank),
                None => format!("similarity {:.3}", case.similarity),
            };
            println!(
                "  {}. {} {}",
                i + 1,
                case.case.error_type,
                dim.apply_to(format!("({})", score))
            );
            if verbose {
                println!("     {}", dim.apply_to(&case.case.root_cause));
            }
        }
    }
    println!();
}

pub(crate) fn confidence_style(confidence: f64) -> Style {
    if confidence >= 0.7 {
        Style::new().green()
    } else if confidence >= 0.4 {
        Style::new().yellow()
    } else {
        Style::new().red()
    }
}

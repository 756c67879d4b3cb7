//! Tracing setup: human-readable console output plus an optional daily
//! rolling JSON file.

use anyhow::{Context, Result};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::prelude::*;

use faultline_config::LoggingConfig;

const CRATES: &[&str] = &[
    "faultline",
    "faultline_config",
    "faultline_llm",
    "faultline_knowledge",
    "faultline_agent",
    "faultline_server",
    "tower_http",
];

/// Filter directive for our crates at `level`, everything else at `warn`.
fn directive(level: &str) -> String {
    let mut parts: Vec<String> = CRATES.iter().map(|c| format!("{c}={level}")).collect();
    parts.push("warn".to_string());
    parts.join(",")
}

/// Install the global subscriber. `RUST_LOG` overrides the console filter.
///
/// The returned guard must be kept alive for the file layer to flush.
pub fn init(verbose: bool, config: &LoggingConfig) -> Result<Option<WorkerGuard>> {
    let level = if verbose { "debug" } else { config.level.as_str() };
    let console_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(directive(level)));

    let console = tracing_subscriber::fmt::layer()
        .with_target(true)
        .with_writer(std::io::stderr)
        .with_filter(console_filter);

    let (file, guard) = match config.log_dir {
        Some(ref dir) => {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("failed to create log directory {}", dir.display()))?;
            let appender = tracing_appender::rolling::daily(dir, "faultline.log");
            let (non_blocking, guard) = tracing_appender::non_blocking(appender);
            let layer = tracing_subscriber::fmt::layer()
                .json()
                .with_writer(non_blocking)
                .with_filter(EnvFilter::new(directive("debug")));
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(console)
        .with(file)
        .try_init()
        .context("failed to install tracing subscriber")?;

    Ok(guard)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_directive_scopes_our_crates() {
        let d = directive("info");
        assert!(d.starts_with("faultline=info,"));
        assert!(d.contains("faultline_agent=info"));
        assert!(d.ends_with(",warn"));
        assert!(EnvFilter::try_new(&d).is_ok());
    }
}

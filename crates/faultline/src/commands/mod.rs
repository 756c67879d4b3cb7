//! CLI command handlers.

pub mod agent;
pub mod check;
pub mod diagnose;
pub mod serve;

use anyhow::{Context as _, Result, bail};
use std::io::Read;

use faultline_config::FaultlineConfig;

/// Shared context for all commands.
#[derive(Debug, Clone)]
pub struct Context {
    /// Effective configuration after layering.
    pub config: FaultlineConfig,
    /// Verbose output enabled.
    pub verbose: bool,
}

/// Resolve an error-log argument. `-` reads standard input.
pub fn read_input(input: &str) -> Result<String> {
    let text = if input == "-" {
        let mut buf = String::new();
        std::io::stdin()
            .read_to_string(&mut buf)
            .context("failed to read error log from stdin")?;
        buf
    } else {
        input.to_string()
    };

    if text.trim().is_empty() {
        bail!("error log is empty");
    }
    Ok(text)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_read_input_literal() {
        assert_eq!(read_input("nginx 502").unwrap(), "nginx 502");
    }

    #[test]
    fn test_read_input_rejects_blank() {
        assert!(read_input("   \n").is_err());
    }
}

//! Config file discovery and layered merging.
//!
//! Resolution order (later overrides earlier):
//! 1. Built-in defaults
//! 2. `~/.config/faultline/config.toml` (XDG user config)
//! 3. `./faultline.toml` (project-local)
//! 4. CLI arguments (handled externally)

use std::path::{Path, PathBuf};

use tracing::debug;

use crate::{ConfigError, FaultlineConfig, Result};

/// Default config filename for project-local config.
const PROJECT_CONFIG_FILE: &str = "faultline.toml";

/// Default config filename within XDG config directory.
const USER_CONFIG_FILE: &str = "config.toml";

/// Application name for XDG directory resolution.
const APP_NAME: &str = "faultline";

/// Environment variable to override the config directory.
const CONFIG_DIR_ENV: &str = "FAULTLINE_CONFIG_DIR";

/// Tracks where each config layer was loaded from.
#[derive(Debug, Clone)]
pub struct ConfigSource {
    pub path: PathBuf,
    /// Whether the file was found and loaded.
    pub loaded: bool,
}

/// Result of config discovery and loading.
#[derive(Debug, Clone)]
pub struct LoadedConfig {
    /// The merged configuration.
    pub config: FaultlineConfig,
    /// Sources that were checked, lowest precedence first.
    pub sources: Vec<ConfigSource>,
    /// Warnings generated during loading (malformed layers, plaintext keys).
    pub warnings: Vec<String>,
}

impl LoadedConfig {
    /// Get paths of sources that were actually loaded.
    pub fn loaded_from(&self) -> Vec<&Path> {
        self.sources
            .iter()
            .filter(|s| s.loaded)
            .map(|s| s.path.as_path())
            .collect()
    }
}

/// Load configuration by discovering and merging all config layers.
pub fn load_config(project_dir: Option<&Path>) -> Result<LoadedConfig> {
    load_config_with_options(project_dir, None)
}

/// Load configuration with explicit control over the user config directory.
///
/// `config_dir` overrides both `FAULTLINE_CONFIG_DIR` and the platform default.
pub fn load_config_with_options(
    project_dir: Option<&Path>,
    config_dir: Option<&Path>,
) -> Result<LoadedConfig> {
    let mut config = FaultlineConfig::new();
    let mut sources = Vec::new();
    let mut warnings = Vec::new();

    let user_config_path = match config_dir {
        Some(dir) => Some(dir.join(USER_CONFIG_FILE)),
        None => xdg_config_path(),
    };
    if let Some(path) = user_config_path {
        sources.push(load_layer(&mut config, &path, &mut warnings));
    }

    let project_path = project_dir
        .map(|d| d.join(PROJECT_CONFIG_FILE))
        .unwrap_or_else(|| PathBuf::from(PROJECT_CONFIG_FILE));
    sources.push(load_layer(&mut config, &project_path, &mut warnings));

    check_plaintext_keys(&config, &mut warnings);

    Ok(LoadedConfig {
        config,
        sources,
        warnings,
    })
}

/// Load config from a specific file path (no discovery).
pub fn load_config_file(path: &Path) -> Result<FaultlineConfig> {
    let contents = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadFile {
        path: path.display().to_string(),
        source: e,
    })?;
    FaultlineConfig::from_toml(&contents)
}

/// Get the XDG config file path for faultline.
pub fn xdg_config_path() -> Option<PathBuf> {
    xdg_config_dir().map(|d| d.join(USER_CONFIG_FILE))
}

/// Get the XDG config directory for faultline.
///
/// Checks `FAULTLINE_CONFIG_DIR` first, then the platform default.
pub fn xdg_config_dir() -> Option<PathBuf> {
    if let Ok(dir) = std::env::var(CONFIG_DIR_ENV)
        && !dir.is_empty()
    {
        return Some(PathBuf::from(dir));
    }
    dirs::config_dir().map(|d| d.join(APP_NAME))
}

/// Try to load a config file and merge it into the existing config.
///
/// A missing file is skipped; a malformed one becomes a warning.
fn load_layer(config: &mut FaultlineConfig, path: &Path, warnings: &mut Vec<String>) -> ConfigSource {
    if !path.is_file() {
        return ConfigSource {
            path: path.to_path_buf(),
            loaded: false,
        };
    }

    match load_config_file(path) {
        Ok(layer) => {
            debug!(path = %path.display(), "Loaded config layer");
            config.merge(layer);
            ConfigSource {
                path: path.to_path_buf(),
                loaded: true,
            }
        }
        Err(e) => {
            warnings.push(format!("Failed to load {}: {}", path.display(), e));
            ConfigSource {
                path: path.to_path_buf(),
                loaded: false,
            }
        }
    }
}

fn check_plaintext_keys(config: &FaultlineConfig, warnings: &mut Vec<String>) {
    let sections = [
        ("llm", config.llm.as_ref().and_then(|s| s.api_key.as_ref())),
        (
            "embedding",
            config.embedding.as_ref().and_then(|s| s.api_key.as_ref()),
        ),
        (
            "reranker",
            config.reranker.as_ref().and_then(|s| s.api_key.as_ref()),
        ),
        (
            "vector_store",
            config.vector_store.as_ref().and_then(|s| s.token.as_ref()),
        ),
    ];

    for (section, key) in sections {
        if key.is_some_and(|k| !k.is_empty()) {
            warnings.push(format!(
                "[{}] contains a plaintext credential. \
                 Consider using an environment variable instead.",
                section
            ));
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

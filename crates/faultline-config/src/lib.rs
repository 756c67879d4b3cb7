//! Configuration system for Faultline.
//!
//! Provides TOML-based configuration with:
//! - One section per external collaborator (`[llm]`, `[embedding]`, `[reranker]`,
//!   `[vector_store]`) plus the knowledge corpus, remote host, agent and server
//! - Config file layering (XDG user config + project-local overrides)
//! - API key resolution (env var → config file)
//!
//! Every section is optional; consumers read the effective values through the
//! accessor methods on [`FaultlineConfig`], which fall back to defaults.

pub mod discovery;
pub mod error;
pub mod secrets;
pub mod types;

pub use discovery::{
    ConfigSource, LoadedConfig, load_config, load_config_file, load_config_with_options,
    xdg_config_dir, xdg_config_path,
};
pub use error::{ConfigError, Result};
pub use secrets::{ResolvedSecret, SecretSource, Service, require_api_key, resolve_api_key};
pub use types::*;

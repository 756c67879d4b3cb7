//! Configuration error types.

/// Result type alias for config operations.
pub type Result<T> = std::result::Result<T, ConfigError>;

/// Errors that can occur during configuration loading and resolution.
///
/// All of these are startup failures; nothing here is produced while a
/// diagnosis request is being served.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to read a config file.
    #[error("failed to read config file '{path}': {source}")]
    ReadFile {
        path: String,
        source: std::io::Error,
    },

    /// Failed to parse TOML.
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    /// A value is present but unusable.
    #[error("invalid value for '{field}': {reason}")]
    Invalid { field: String, reason: String },

    /// API key not found through any resolution method.
    #[error("API key not found for {service}. Set {env_var} or add api_key to the [{section}] section")]
    MissingApiKey {
        service: String,
        section: String,
        env_var: String,
    },
}

impl ConfigError {
    /// Create an invalid value error.
    pub fn invalid(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Invalid {
            field: field.into(),
            reason: reason.into(),
        }
    }
}

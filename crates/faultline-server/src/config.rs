//! Server configuration.

use std::net::SocketAddr;

use crate::error::{Result, ServerError};

/// Default max body size for diagnosis requests (1 MB).
pub const DEFAULT_MAX_BODY_SIZE: usize = 1024 * 1024;

/// Largest `top_k` a client may ask for.
pub const MAX_TOP_K: usize = 20;

/// Server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address to bind the server to.
    pub bind_address: SocketAddr,

    /// CORS allowed origins (empty = any origin).
    pub cors_origins: Vec<String>,

    /// Maximum request body size in bytes.
    pub max_body_size: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: SocketAddr::from(([0, 0, 0, 0], 8888)),
            cors_origins: Vec::new(),
            max_body_size: DEFAULT_MAX_BODY_SIZE,
        }
    }
}

impl ServerConfig {
    pub fn new(bind_address: SocketAddr) -> Self {
        Self {
            bind_address,
            ..Default::default()
        }
    }

    /// Build from the `[server]` section.
    pub fn from_config(config: &faultline_config::ServerConfig) -> Result<Self> {
        let bind_address = format!("{}:{}", config.bind, config.port)
            .parse()
            .map_err(|e| {
                ServerError::Config(format!(
                    "invalid bind address '{}:{}': {}",
                    config.bind, config.port, e
                ))
            })?;
        Ok(Self {
            bind_address,
            cors_origins: config.cors_origins.clone(),
            max_body_size: DEFAULT_MAX_BODY_SIZE,
        })
    }

    /// Set the bind address.
    pub fn with_bind_address(mut self, addr: SocketAddr) -> Self {
        self.bind_address = addr;
        self
    }

    /// Set CORS allowed origins.
    pub fn with_cors_origins(mut self, origins: Vec<String>) -> Self {
        self.cors_origins = origins;
        self
    }

    /// Set the maximum request body size.
    pub fn with_max_body_size(mut self, size: usize) -> Self {
        self.max_body_size = size;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_config() {
        let section = faultline_config::ServerConfig {
            port: 9000,
            bind: "127.0.0.1".to_string(),
            cors_origins: vec!["http://localhost:3000".to_string()],
        };
        let config = ServerConfig::from_config(&section).unwrap();
        assert_eq!(config.bind_address.port(), 9000);
        assert_eq!(config.cors_origins.len(), 1);
    }

    #[test]
    fn test_from_config_bad_bind() {
        let section = faultline_config::ServerConfig {
            port: 8888,
            bind: "not an ip".to_string(),
            cors_origins: Vec::new(),
        };
        assert!(matches!(
            ServerConfig::from_config(&section),
            Err(ServerError::Config(_))
        ));
    }
}

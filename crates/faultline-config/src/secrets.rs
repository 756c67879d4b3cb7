//! API key resolution for the external model services.
//!
//! Resolution order:
//! 1. Environment variable (service-specific)
//! 2. Config file (with a load-time warning)
//!
//! Empty values are treated as absent at every step.

use crate::ConfigError;

/// A keyed external service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Service {
    Llm,
    Embedding,
    Reranker,
    VectorStore,
}

impl Service {
    /// Environment variable name for this service's credential.
    pub fn env_var(&self) -> &'static str {
        match self {
            Service::Llm => "FAULTLINE_LLM_API_KEY",
            Service::Embedding => "FAULTLINE_EMBEDDING_API_KEY",
            Service::Reranker => "FAULTLINE_RERANKER_API_KEY",
            Service::VectorStore => "FAULTLINE_VECTOR_STORE_TOKEN",
        }
    }

    /// Config section holding the plaintext fallback.
    pub fn section(&self) -> &'static str {
        match self {
            Service::Llm => "llm",
            Service::Embedding => "embedding",
            Service::Reranker => "reranker",
            Service::VectorStore => "vector_store",
        }
    }

    /// Human-readable name.
    pub fn display_name(&self) -> &'static str {
        match self {
            Service::Llm => "language model",
            Service::Embedding => "embedding service",
            Service::Reranker => "rerank service",
            Service::VectorStore => "vector store",
        }
    }
}

/// Result of API key resolution with provenance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedSecret {
    pub value: String,
    pub source: SecretSource,
}

/// Where a secret was resolved from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SecretSource {
    EnvVar(String),
    /// Config file (plaintext, not recommended).
    ConfigFile,
}

impl std::fmt::Display for SecretSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SecretSource::EnvVar(var) => write!(f, "env var {}", var),
            SecretSource::ConfigFile => write!(f, "config file (plaintext)"),
        }
    }
}

/// Resolve a credential for a service.
pub fn resolve_api_key(service: Service, config_value: Option<&str>) -> Option<ResolvedSecret> {
    resolve_with_env(service, config_value, |var| std::env::var(var).ok())
}

/// Like [`resolve_api_key`] but fails with [`ConfigError::MissingApiKey`].
pub fn require_api_key(service: Service, config_value: Option<&str>) -> crate::Result<String> {
    resolve_api_key(service, config_value)
        .map(|s| s.value)
        .ok_or_else(|| ConfigError::MissingApiKey {
            service: service.display_name().to_string(),
            section: service.section().to_string(),
            env_var: service.env_var().to_string(),
        })
}

fn resolve_with_env(
    service: Service,
    config_value: Option<&str>,
    lookup: impl Fn(&str) -> Option<String>,
) -> Option<ResolvedSecret> {
    let env_var = service.env_var();
    if let Some(value) = lookup(env_var)
        && !value.is_empty()
    {
        return Some(ResolvedSecret {
            value,
            source: SecretSource::EnvVar(env_var.to_string()),
        });
    }

    config_value
        .filter(|v| !v.is_empty())
        .map(|v| ResolvedSecret {
            value: v.to_string(),
            source: SecretSource::ConfigFile,
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_env_var_wins_over_config() {
        let resolved = resolve_with_env(Service::Llm, Some("from-file"), |var| {
            assert_eq!(var, "FAULTLINE_LLM_API_KEY");
            Some("from-env".to_string())
        })
        .unwrap();
        assert_eq!(resolved.value, "from-env");
        assert_eq!(
            resolved.source,
            SecretSource::EnvVar("FAULTLINE_LLM_API_KEY".to_string())
        );
    }

    #[test]
    fn test_config_fallback() {
        let resolved = resolve_with_env(Service::Reranker, Some("sk-file"), |_| None).unwrap();
        assert_eq!(resolved.value, "sk-file");
        assert_eq!(resolved.source, SecretSource::ConfigFile);
    }

    #[test]
    fn test_empty_values_are_absent() {
        let resolved = resolve_with_env(Service::Embedding, Some(""), |_| Some(String::new()));
        assert!(resolved.is_none());
    }

    #[test]
    fn test_require_reports_env_var() {
        // VectorStore token is never set in the test environment
        let err = require_api_key(Service::VectorStore, None).unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("FAULTLINE_VECTOR_STORE_TOKEN"));
        assert!(msg.contains("[vector_store]"));
    }

    #[test]
    fn test_secret_source_display() {
        assert_eq!(
            SecretSource::EnvVar("X".to_string()).to_string(),
            "env var X"
        );
        assert!(SecretSource::ConfigFile.to_string().contains("plaintext"));
    }
}

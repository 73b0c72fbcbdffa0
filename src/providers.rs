pub mod http;
pub mod memory;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

use crate::resource::{LiveResource, ResourceId, ResourceSpec};

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("resource not found: {0}")]
    NotFound(ResourceId),

    /// Network failures, timeouts and server errors. Retryable.
    #[error("transient error: {0}")]
    Transient(String),

    /// The server asked the caller to wait before retrying.
    #[error("throttled: {message}")]
    Throttled { message: String, retry_after: Duration },

    #[error("authentication error: {0}")]
    Auth(String),

    #[error("request rejected: {0}")]
    Rejected(String),

    #[error("unknown provider: {0}")]
    UnknownProvider(String),

    #[error("provider configuration error: {0}")]
    Config(String),
}

impl ProviderError {
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            ProviderError::Transient(_) | ProviderError::Throttled { .. }
        )
    }

    /// Server-requested wait before the next attempt, if any.
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            ProviderError::Throttled { retry_after, .. } => Some(*retry_after),
            _ => None,
        }
    }
}

/// The live cluster as seen by the controller.
#[async_trait]
pub trait ClusterApi: Send + Sync {
    fn name(&self) -> &str;
    async fn get(&self, id: &ResourceId) -> Result<LiveResource, ProviderError>;
    /// Creates the resource or overwrites its attributes with the desired ones.
    async fn apply(&self, spec: &ResourceSpec) -> Result<LiveResource, ProviderError>;
    async fn delete(&self, id: &ResourceId) -> Result<(), ProviderError>;
}

#[derive(Debug, Clone, Default)]
pub struct ProviderConfig {
    pub state_file: Option<PathBuf>,
    pub cluster_url: Option<String>,
    pub token: Option<String>,
}

pub fn get_provider(name: &str, config: &ProviderConfig) -> Result<Arc<dyn ClusterApi>, ProviderError> {
    match name {
        "file" => {
            let path = config.state_file.clone().ok_or_else(|| {
                ProviderError::Config(
                    "No state file provided. Set DRIFTGUARD_STATE_FILE or use --state-file"
                        .to_string(),
                )
            })?;
            Ok(Arc::new(memory::MemoryCluster::open(path)?))
        }
        "http" => {
            let url = config.cluster_url.clone().ok_or_else(|| {
                ProviderError::Config(
                    "No cluster URL provided. Set DRIFTGUARD_CLUSTER_URL or use --cluster-url"
                        .to_string(),
                )
            })?;
            let token = config.token.clone().ok_or_else(|| {
                ProviderError::Auth(
                    "No API token provided. Set DRIFTGUARD_API_TOKEN or use --token flag"
                        .to_string(),
                )
            })?;
            let client = http::HttpClusterClient::with_base_url(token, url)?;
            Ok(Arc::new(client))
        }
        "memory" => Ok(Arc::new(memory::MemoryCluster::new())),
        other => Err(ProviderError::UnknownProvider(other.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_get_provider_memory() {
        let provider = get_provider("memory", &ProviderConfig::default()).unwrap();
        assert_eq!(provider.name(), "memory");
    }

    #[test]
    fn test_get_provider_unknown() {
        let result = get_provider("aws", &ProviderConfig::default());
        match result {
            Err(ProviderError::UnknownProvider(name)) => assert_eq!(name, "aws"),
            _ => panic!("expected UnknownProvider error"),
        }
    }

    #[test]
    fn test_get_provider_http_requires_token() {
        let config = ProviderConfig {
            cluster_url: Some("http://localhost:9000".to_string()),
            ..Default::default()
        };
        match get_provider("http", &config) {
            Err(ProviderError::Auth(msg)) => assert!(msg.contains("No API token provided")),
            _ => panic!("expected ProviderError::Auth"),
        }
    }

    #[test]
    fn test_get_provider_http_requires_url() {
        let config = ProviderConfig {
            token: Some("t".to_string()),
            ..Default::default()
        };
        assert!(matches!(
            get_provider("http", &config),
            Err(ProviderError::Config(_))
        ));
    }

    #[test]
    fn test_get_provider_file_requires_path() {
        assert!(matches!(
            get_provider("file", &ProviderConfig::default()),
            Err(ProviderError::Config(_))
        ));
    }

    #[test]
    fn test_only_transient_is_retryable() {
        assert!(ProviderError::Transient("timeout".into()).is_transient());
        assert!(!ProviderError::Auth("bad token".into()).is_transient());
        assert!(!ProviderError::Rejected("400".into()).is_transient());
        assert!(!ProviderError::NotFound(ResourceId::new("v", "a")).is_transient());
    }

    #[test]
    fn test_throttled_is_retryable_with_hint() {
        let err = ProviderError::Throttled {
            message: "slow down".into(),
            retry_after: Duration::from_secs(7),
        };
        assert!(err.is_transient());
        assert_eq!(err.retry_after(), Some(Duration::from_secs(7)));
        assert_eq!(ProviderError::Transient("x".into()).retry_after(), None);
    }
}

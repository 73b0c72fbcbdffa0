mod client;
mod error;
mod types;

pub use client::HttpClusterClient;
pub use error::HttpClusterError;

use async_trait::async_trait;

use super::{ClusterApi, ProviderError};
use crate::resource::{LiveResource, ResourceId, ResourceSpec};

#[async_trait]
impl ClusterApi for HttpClusterClient {
    fn name(&self) -> &str {
        "http"
    }

    async fn get(&self, id: &ResourceId) -> Result<LiveResource, ProviderError> {
        match self.get_resource(id).await {
            Ok(live) => Ok(live),
            Err(HttpClusterError::NotFound { .. }) => Err(ProviderError::NotFound(id.clone())),
            Err(e) => Err(e.into()),
        }
    }

    async fn apply(&self, spec: &ResourceSpec) -> Result<LiveResource, ProviderError> {
        let live = self.put_resource(spec).await?;
        tracing::debug!(resource = %spec.id, "resource applied");
        Ok(live)
    }

    async fn delete(&self, id: &ResourceId) -> Result<(), ProviderError> {
        match self.delete_resource(id).await {
            Ok(()) => Ok(()),
            Err(HttpClusterError::NotFound { .. }) => Err(ProviderError::NotFound(id.clone())),
            Err(e) => Err(e.into()),
        }
    }
}

//! Live state retrieval.

use std::collections::BTreeMap;

use futures::stream::{self, StreamExt};

use crate::controller::retry::{RetryPolicy, with_backoff};
use crate::providers::{ClusterApi, ProviderError};
use crate::resource::{LiveResource, ResourceId};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Observation {
    Present(LiveResource),
    /// The API reported the resource absent. A drift signal, not an error.
    Missing,
    /// Could not be observed this cycle.
    Unavailable(String),
}

impl Observation {
    pub fn live(&self) -> Option<&LiveResource> {
        match self {
            Observation::Present(live) => Some(live),
            _ => None,
        }
    }
}

pub async fn fetch_one(api: &dyn ClusterApi, id: &ResourceId, retry: &RetryPolicy) -> Observation {
    let label = format!("get {}", id);
    match with_backoff(retry, &label, || api.get(id)).await {
        Ok((live, _)) => Observation::Present(live),
        Err(err) => match err.last {
            ProviderError::NotFound(_) => Observation::Missing,
            other => {
                tracing::warn!(
                    resource = %id,
                    attempts = err.attempts,
                    error = %other,
                    "failed to fetch live state"
                );
                Observation::Unavailable(other.to_string())
            }
        },
    }
}

/// Fetches every id with at most `concurrency` requests in flight.
pub async fn fetch_all(
    api: &dyn ClusterApi,
    ids: &[ResourceId],
    concurrency: usize,
    retry: &RetryPolicy,
) -> BTreeMap<ResourceId, Observation> {
    let observations: Vec<(ResourceId, Observation)> = stream::iter(ids)
        .map(|id| async move { (id.clone(), fetch_one(api, id, retry).await) })
        .buffer_unordered(concurrency.max(1))
        .collect()
        .await;

    tracing::debug!(count = observations.len(), provider = api.name(), "live state fetched");
    observations.into_iter().collect()
}

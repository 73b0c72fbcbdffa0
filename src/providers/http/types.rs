use serde::{Deserialize, Serialize};

use crate::resource::{LiveResource, ReclaimPolicy, ResourceId, ResourceSpec};

#[derive(Debug, Deserialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    #[serde(default)]
    pub errors: Vec<ApiError>,
    pub result: Option<T>,
}

impl<T> ApiResponse<T> {
    pub fn first_error(&self) -> Option<&str> {
        self.errors.first().map(|e| e.message.as_str())
    }
}

#[derive(Debug, Deserialize)]
pub struct ApiError {
    #[allow(dead_code)] // NOTE: Kept for debug logging of raw envelopes
    pub code: u32,
    pub message: String,
}

/// Resource attributes as the cluster API reports them.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteResource {
    pub region: String,
    #[serde(default)]
    pub storage_class: Option<String>,
    #[serde(default)]
    pub reclaim_policy: Option<ReclaimPolicy>,
}

impl RemoteResource {
    pub fn into_live(self, id: &ResourceId) -> LiveResource {
        LiveResource {
            kind: id.kind.clone(),
            name: id.name.clone(),
            region: self.region,
            storage_class: self.storage_class,
            reclaim_policy: self.reclaim_policy,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ApplyRequest<'a> {
    pub region: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub storage_class: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reclaim_policy: Option<ReclaimPolicy>,
}

impl<'a> From<&'a ResourceSpec> for ApplyRequest<'a> {
    fn from(spec: &'a ResourceSpec) -> Self {
        Self {
            region: &spec.region,
            storage_class: spec.storage_class.as_deref(),
            reclaim_policy: spec.reclaim_policy,
        }
    }
}

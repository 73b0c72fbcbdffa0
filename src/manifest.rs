//! Desired-state manifest loading and validation.
//!
//! A manifest is YAML (or JSON for `.json` files), either a bare sequence of
//! resources or a mapping with a `resources` key.

use std::collections::HashSet;
use std::path::Path;

use serde::Deserialize;
use thiserror::Error;

use crate::resource::{ReclaimPolicy, ResourceId, ResourceSpec};

#[derive(Debug, Error)]
pub enum ManifestError {
    #[error("failed to read manifest {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse manifest: {0}")]
    Parse(String),

    #[error("resource #{index}: kind and name must be non-empty")]
    MissingIdentity { index: usize },

    #[error("{id}: region is required")]
    MissingRegion { id: ResourceId },

    #[error("{id}: invalid reclaimPolicy '{value}' (expected Retain or Delete)")]
    InvalidReclaimPolicy { id: ResourceId, value: String },

    #[error("duplicate resource {id}")]
    DuplicateResource { id: ResourceId },
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawDocument {
    List(Vec<RawResource>),
    Wrapped { resources: Vec<RawResource> },
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawResource {
    #[serde(default)]
    kind: String,
    #[serde(default)]
    name: String,
    region: Option<String>,
    storage_class: Option<String>,
    reclaim_policy: Option<String>,
    #[serde(default)]
    immutable: bool,
}

/// Validated desired state, in document order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Manifest {
    resources: Vec<ResourceSpec>,
}

impl Manifest {
    pub fn load(path: &Path) -> Result<Self, ManifestError> {
        let contents = std::fs::read_to_string(path).map_err(|source| ManifestError::Read {
            path: path.display().to_string(),
            source,
        })?;
        let is_json = path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| e.eq_ignore_ascii_case("json"));

        let manifest = if is_json {
            Self::from_json(&contents)?
        } else {
            Self::from_yaml(&contents)?
        };

        tracing::debug!(
            path = %path.display(),
            count = manifest.len(),
            "manifest loaded"
        );
        Ok(manifest)
    }

    pub fn from_yaml(input: &str) -> Result<Self, ManifestError> {
        let raw: RawDocument =
            serde_yaml::from_str(input).map_err(|e| ManifestError::Parse(e.to_string()))?;
        Self::validate(raw)
    }

    pub fn from_json(input: &str) -> Result<Self, ManifestError> {
        let raw: RawDocument =
            serde_json::from_str(input).map_err(|e| ManifestError::Parse(e.to_string()))?;
        Self::validate(raw)
    }

    pub fn from_specs(specs: Vec<ResourceSpec>) -> Result<Self, ManifestError> {
        let mut seen = HashSet::new();
        for spec in &specs {
            if !seen.insert(spec.id.clone()) {
                return Err(ManifestError::DuplicateResource {
                    id: spec.id.clone(),
                });
            }
        }
        Ok(Self { resources: specs })
    }

    fn validate(raw: RawDocument) -> Result<Self, ManifestError> {
        let raw = match raw {
            RawDocument::List(items) => items,
            RawDocument::Wrapped { resources } => resources,
        };

        let mut specs = Vec::with_capacity(raw.len());
        for (index, item) in raw.into_iter().enumerate() {
            let kind = item.kind.trim();
            let name = item.name.trim();
            if kind.is_empty() || name.is_empty() {
                return Err(ManifestError::MissingIdentity { index });
            }
            let id = ResourceId::new(kind, name);

            let region = item
                .region
                .map(|r| r.trim().to_string())
                .filter(|r| !r.is_empty())
                .ok_or_else(|| ManifestError::MissingRegion { id: id.clone() })?;

            let reclaim_policy = item
                .reclaim_policy
                .map(|value| {
                    value
                        .parse::<ReclaimPolicy>()
                        .map_err(|value| ManifestError::InvalidReclaimPolicy {
                            id: id.clone(),
                            value,
                        })
                })
                .transpose()?;

            specs.push(ResourceSpec {
                id,
                region,
                storage_class: item.storage_class.filter(|s| !s.is_empty()),
                reclaim_policy,
                immutable: item.immutable,
            });
        }

        Self::from_specs(specs)
    }

    pub fn resources(&self) -> &[ResourceSpec] {
        &self.resources
    }

    pub fn get(&self, id: &ResourceId) -> Option<&ResourceSpec> {
        self.resources.iter().find(|spec| &spec.id == id)
    }

    pub fn len(&self) -> usize {
        self.resources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }
}

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Identity of a managed resource, rendered as `kind/name`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ResourceId {
    pub kind: String,
    pub name: String,
}

impl ResourceId {
    pub fn new(kind: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            name: name.into(),
        }
    }
}

impl fmt::Display for ResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.kind, self.name)
    }
}

impl FromStr for ResourceId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.split_once('/') {
            Some((kind, name)) if !kind.is_empty() && !name.is_empty() && !name.contains('/') => {
                Ok(Self::new(kind, name))
            }
            _ => Err(format!("expected 'kind/name', got '{}'", s)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ReclaimPolicy {
    Retain,
    Delete,
}

impl ReclaimPolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReclaimPolicy::Retain => "Retain",
            ReclaimPolicy::Delete => "Delete",
        }
    }
}

impl fmt::Display for ReclaimPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ReclaimPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Retain" => Ok(ReclaimPolicy::Retain),
            "Delete" => Ok(ReclaimPolicy::Delete),
            other => Err(other.to_string()),
        }
    }
}

/// Desired state of one resource as declared in the manifest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceSpec {
    pub id: ResourceId,
    pub region: String,
    pub storage_class: Option<String>,
    pub reclaim_policy: Option<ReclaimPolicy>,
    /// Protected from automated destructive correction and from `destroy`.
    pub immutable: bool,
}

/// Attributes observed on the cluster at fetch time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LiveResource {
    pub kind: String,
    pub name: String,
    pub region: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub storage_class: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reclaim_policy: Option<ReclaimPolicy>,
}

impl LiveResource {
    pub fn id(&self) -> ResourceId {
        ResourceId::new(&self.kind, &self.name)
    }

    /// The state a successful apply of `spec` leaves behind.
    pub fn from_spec(spec: &ResourceSpec) -> Self {
        Self {
            kind: spec.id.kind.clone(),
            name: spec.id.name.clone(),
            region: spec.region.clone(),
            storage_class: spec.storage_class.clone(),
            reclaim_policy: spec.reclaim_policy,
        }
    }

    /// Applies the declared attributes of `spec`; undeclared ones keep their
    /// live value.
    pub fn merge_spec(&mut self, spec: &ResourceSpec) {
        self.region.clone_from(&spec.region);
        if let Some(class) = &spec.storage_class {
            self.storage_class = Some(class.clone());
        }
        if let Some(policy) = spec.reclaim_policy {
            self.reclaim_policy = Some(policy);
        }
    }
}

//! In-process cluster, optionally backed by a JSON state file.
//!
//! Backs the `file` provider and doubles as the test cluster: calls are
//! recorded and faults can be queued for `get` and `apply`.

use std::collections::{BTreeMap, VecDeque};
use std::path::PathBuf;
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;

use super::{ClusterApi, ProviderError};
use crate::resource::{LiveResource, ResourceId, ResourceSpec};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Get(ResourceId),
    Apply(ResourceId),
    Delete(ResourceId),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fault {
    Transient,
    Rejected,
}

impl Fault {
    fn into_error(self, op: &str, id: &ResourceId) -> ProviderError {
        match self {
            Fault::Transient => ProviderError::Transient(format!("{} {}: injected timeout", op, id)),
            Fault::Rejected => ProviderError::Rejected(format!("{} {}: injected rejection", op, id)),
        }
    }
}

#[derive(Debug, Default)]
struct ClusterState {
    resources: BTreeMap<ResourceId, LiveResource>,
    calls: Vec<Call>,
    get_faults: VecDeque<Fault>,
    apply_faults: VecDeque<Fault>,
}

#[derive(Debug, Default)]
pub struct MemoryCluster {
    path: Option<PathBuf>,
    state: Mutex<ClusterState>,
}

impl MemoryCluster {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_resources(resources: impl IntoIterator<Item = LiveResource>) -> Self {
        let cluster = Self::new();
        {
            let mut state = cluster.lock();
            for live in resources {
                state.resources.insert(live.id(), live);
            }
        }
        cluster
    }

    /// Loads the state file if it exists; a missing file is an empty cluster.
    pub fn open(path: PathBuf) -> Result<Self, ProviderError> {
        let resources: Vec<LiveResource> = match std::fs::read_to_string(&path) {
            Ok(contents) => serde_json::from_str(&contents).map_err(|e| {
                ProviderError::Config(format!(
                    "failed to parse state file {}: {}",
                    path.display(),
                    e
                ))
            })?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Vec::new(),
            Err(e) => {
                return Err(ProviderError::Config(format!(
                    "failed to read state file {}: {}",
                    path.display(),
                    e
                )));
            }
        };

        tracing::debug!(path = %path.display(), count = resources.len(), "state file loaded");

        let mut cluster = Self::with_resources(resources);
        cluster.path = Some(path);
        Ok(cluster)
    }

    fn lock(&self) -> MutexGuard<'_, ClusterState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn persist(&self, state: &ClusterState) -> Result<(), ProviderError> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        let resources: Vec<&LiveResource> = state.resources.values().collect();
        let json = serde_json::to_string_pretty(&resources)
            .map_err(|e| ProviderError::Rejected(format!("failed to encode state: {}", e)))?;
        std::fs::write(path, json).map_err(|e| {
            ProviderError::Transient(format!("failed to write {}: {}", path.display(), e))
        })
    }

    /// Simulates an out-of-band change to the cluster.
    pub fn insert(&self, live: LiveResource) {
        self.lock().resources.insert(live.id(), live);
    }

    pub fn remove(&self, id: &ResourceId) -> Option<LiveResource> {
        self.lock().resources.remove(id)
    }

    pub fn snapshot(&self, id: &ResourceId) -> Option<LiveResource> {
        self.lock().resources.get(id).cloned()
    }

    pub fn calls(&self) -> Vec<Call> {
        self.lock().calls.clone()
    }

    pub fn apply_calls(&self) -> usize {
        self.lock()
            .calls
            .iter()
            .filter(|c| matches!(c, Call::Apply(_)))
            .count()
    }

    pub fn fail_next_gets(&self, count: usize, fault: Fault) {
        self.lock().get_faults.extend(std::iter::repeat_n(fault, count));
    }

    pub fn fail_next_applies(&self, count: usize, fault: Fault) {
        self.lock().apply_faults.extend(std::iter::repeat_n(fault, count));
    }
}

#[async_trait]
impl ClusterApi for MemoryCluster {
    fn name(&self) -> &str {
        if self.path.is_some() { "file" } else { "memory" }
    }

    async fn get(&self, id: &ResourceId) -> Result<LiveResource, ProviderError> {
        let mut state = self.lock();
        state.calls.push(Call::Get(id.clone()));
        if let Some(fault) = state.get_faults.pop_front() {
            return Err(fault.into_error("get", id));
        }
        state
            .resources
            .get(id)
            .cloned()
            .ok_or_else(|| ProviderError::NotFound(id.clone()))
    }

    async fn apply(&self, spec: &ResourceSpec) -> Result<LiveResource, ProviderError> {
        let mut state = self.lock();
        state.calls.push(Call::Apply(spec.id.clone()));
        if let Some(fault) = state.apply_faults.pop_front() {
            return Err(fault.into_error("apply", &spec.id));
        }
        let live = match state.resources.get(&spec.id) {
            Some(current) => {
                let mut live = current.clone();
                live.merge_spec(spec);
                live
            }
            None => LiveResource::from_spec(spec),
        };
        state.resources.insert(spec.id.clone(), live.clone());
        self.persist(&state)?;
        Ok(live)
    }

    async fn delete(&self, id: &ResourceId) -> Result<(), ProviderError> {
        let mut state = self.lock();
        state.calls.push(Call::Delete(id.clone()));
        if state.resources.remove(id).is_none() {
            return Err(ProviderError::NotFound(id.clone()));
        }
        self.persist(&state)
    }
}

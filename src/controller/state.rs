use std::fmt;

use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceState {
    #[default]
    InSync,
    DriftDetected,
    Correcting,
    Blocked,
}

impl fmt::Display for ResourceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ResourceState::InSync => "in_sync",
            ResourceState::DriftDetected => "drift_detected",
            ResourceState::Correcting => "correcting",
            ResourceState::Blocked => "blocked",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("invalid state transition {from} -> {to}")]
pub struct InvalidTransition {
    pub from: ResourceState,
    pub to: ResourceState,
}

impl ResourceState {
    pub fn can_transition(self, to: ResourceState) -> bool {
        use ResourceState::*;
        matches!(
            (self, to),
            (InSync, InSync)
                | (InSync, DriftDetected)
                | (DriftDetected, Correcting)
                | (DriftDetected, Blocked)
                | (Correcting, InSync)
                | (Correcting, Blocked)
                | (Blocked, Blocked)
                | (Blocked, InSync)
                | (Blocked, DriftDetected)
        )
    }

    pub fn transition(self, to: ResourceState) -> Result<ResourceState, InvalidTransition> {
        if self.can_transition(to) {
            Ok(to)
        } else {
            Err(InvalidTransition { from: self, to })
        }
    }
}

use thiserror::Error;

use crate::audit::AuditError;
use crate::controller::ControllerError;
use crate::manifest::ManifestError;
use crate::providers::ProviderError;

#[derive(Debug, Error)]
pub enum GuardError {
    #[error("invalid manifest: {0}")]
    Validation(#[from] ManifestError),

    #[error(transparent)]
    Provider(#[from] ProviderError),

    #[error(transparent)]
    Controller(#[from] ControllerError),

    #[error(transparent)]
    Audit(#[from] AuditError),

    #[error("failed to render output: {0}")]
    Output(#[from] serde_json::Error),
}

impl GuardError {
    pub fn is_policy_violation(&self) -> bool {
        matches!(
            self,
            GuardError::Controller(ControllerError::PolicyViolation { .. })
        )
    }
}

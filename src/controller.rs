//! The enforcement loop: fetch → diff → act.
//!
//! Each resource in a cycle is owned by one future from fetch to final audit
//! entry; up to `concurrency` of those run at once. Shutdown is checked only
//! before a resource starts, so a started correction always completes.

pub mod retry;
pub mod shutdown;
pub mod state;

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt};
use thiserror::Error;

use crate::alert::{Alert, AlertReason, AlertSink};
use crate::audit::{AuditAction, AuditEntry, AuditError, AuditLog};
use crate::diff::{self, Classification, Field, FieldDrift, PlannedAction, ResourceDiff};
use crate::fetcher::{self, Observation};
use crate::manifest::Manifest;
use crate::providers::{ClusterApi, ProviderError};
use crate::resource::{LiveResource, ResourceId, ResourceSpec};
use retry::RetryError;

pub use retry::RetryPolicy;
pub use shutdown::{ShutdownHandle, ShutdownSignal};
pub use state::{InvalidTransition, ResourceState};

#[derive(Debug, Error)]
pub enum ControllerError {
    #[error("policy violation on {id}: {reason}")]
    PolicyViolation { id: ResourceId, reason: String },

    #[error("{0} is not declared in the manifest")]
    UnknownResource(ResourceId),

    #[error("{0} already exists; nothing to recreate")]
    AlreadyPresent(ResourceId),

    #[error(transparent)]
    Transition(#[from] InvalidTransition),

    #[error(transparent)]
    Provider(#[from] ProviderError),

    #[error(transparent)]
    Audit(#[from] AuditError),
}

#[derive(Debug, Clone)]
pub struct ControllerConfig {
    pub concurrency: usize,
    pub retry: RetryPolicy,
    pub interval: Duration,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            concurrency: 4,
            retry: RetryPolicy::default(),
            interval: Duration::from_secs(60),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    InSync,
    Corrected { action: PlannedAction, attempts: u32 },
    Blocked { reason: String },
    Unavailable { reason: String },
    /// Not started because shutdown was requested.
    Cancelled,
}

#[derive(Debug, Clone)]
pub struct ResourceOutcome {
    pub id: ResourceId,
    pub state: ResourceState,
    pub drifts: Vec<FieldDrift>,
    pub outcome: Outcome,
}

#[derive(Debug, Clone)]
pub struct CycleReport {
    pub cycle: u64,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub outcomes: Vec<ResourceOutcome>,
}

impl CycleReport {
    fn count(&self, pred: impl Fn(&Outcome) -> bool) -> usize {
        self.outcomes.iter().filter(|o| pred(&o.outcome)).count()
    }

    pub fn blocked(&self) -> usize {
        self.count(|o| matches!(o, Outcome::Blocked { .. }))
    }

    pub fn corrected(&self) -> usize {
        self.count(|o| matches!(o, Outcome::Corrected { .. }))
    }

    pub fn unavailable(&self) -> usize {
        self.count(|o| matches!(o, Outcome::Unavailable { .. }))
    }

    pub fn cancelled(&self) -> bool {
        self.outcomes
            .iter()
            .any(|o| o.outcome == Outcome::Cancelled)
    }

    pub fn has_blocked(&self) -> bool {
        self.blocked() > 0
    }
}

#[derive(Debug, Clone, Default)]
struct Tracked {
    state: ResourceState,
    /// Actionable drifts that put the resource in `Blocked`.
    blocked_on: Vec<FieldDrift>,
}

pub struct Controller {
    api: Arc<dyn ClusterApi>,
    audit: Arc<AuditLog>,
    alerts: Arc<dyn AlertSink>,
    config: ControllerConfig,
    tracked: Mutex<HashMap<ResourceId, Tracked>>,
    cycles: AtomicU64,
}

impl Controller {
    pub fn new(
        api: Arc<dyn ClusterApi>,
        audit: Arc<AuditLog>,
        alerts: Arc<dyn AlertSink>,
        config: ControllerConfig,
    ) -> Self {
        Self {
            api,
            audit,
            alerts,
            config,
            tracked: Mutex::new(HashMap::new()),
            cycles: AtomicU64::new(0),
        }
    }

    pub fn audit(&self) -> &AuditLog {
        &self.audit
    }

    pub fn config(&self) -> &ControllerConfig {
        &self.config
    }

    pub fn state_of(&self, id: &ResourceId) -> ResourceState {
        self.lock_tracked()
            .get(id)
            .map(|t| t.state)
            .unwrap_or_default()
    }

    fn lock_tracked(&self) -> MutexGuard<'_, HashMap<ResourceId, Tracked>> {
        self.tracked.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Fetch and diff without acting; the dry-run behind the `diff` command.
    pub async fn plan(&self, manifest: &Manifest) -> Vec<(ResourceDiff, Observation)> {
        let ids: Vec<ResourceId> = manifest.resources().iter().map(|s| s.id.clone()).collect();
        let mut observed = fetcher::fetch_all(
            self.api.as_ref(),
            &ids,
            self.config.concurrency,
            &self.config.retry,
        )
        .await;

        manifest
            .resources()
            .iter()
            .map(|spec| {
                let observation = observed
                    .remove(&spec.id)
                    .unwrap_or_else(|| Observation::Unavailable("not fetched".to_string()));
                (diff::diff(spec, observation.live()), observation)
            })
            .collect()
    }

    pub async fn run_cycle(&self, manifest: &Manifest, shutdown: &ShutdownSignal) -> CycleReport {
        let cycle = self.cycles.fetch_add(1, Ordering::SeqCst) + 1;
        let started_at = Utc::now();
        tracing::info!(cycle, resources = manifest.len(), "reconciliation cycle started");

        let outcomes: Vec<ResourceOutcome> = stream::iter(manifest.resources())
            .map(|spec| self.reconcile_guarded(spec, shutdown))
            .buffered(self.config.concurrency.max(1))
            .collect()
            .await;

        let report = CycleReport {
            cycle,
            started_at,
            finished_at: Utc::now(),
            outcomes,
        };

        tracing::info!(
            cycle,
            corrected = report.corrected(),
            blocked = report.blocked(),
            unavailable = report.unavailable(),
            cancelled = report.cancelled(),
            "reconciliation cycle finished"
        );
        report
    }

    /// Runs cycles every `interval` until `shutdown` fires. Returns the
    /// number of cycles run.
    pub async fn run_loop<F>(
        &self,
        manifest: &Manifest,
        mut shutdown: ShutdownSignal,
        mut on_report: F,
    ) -> u64
    where
        F: FnMut(&CycleReport),
    {
        let mut completed = 0;
        loop {
            let report = self.run_cycle(manifest, &shutdown).await;
            completed += 1;
            on_report(&report);

            if shutdown.is_triggered() {
                break;
            }

            tokio::select! {
                _ = tokio::time::sleep(self.config.interval) => {}
                _ = shutdown.wait() => break,
            }
        }
        tracing::info!(cycles = completed, "reconciliation loop stopped");
        completed
    }

    async fn reconcile_guarded(&self, spec: &ResourceSpec, shutdown: &ShutdownSignal) -> ResourceOutcome {
        if shutdown.is_triggered() {
            return ResourceOutcome {
                id: spec.id.clone(),
                state: self.state_of(&spec.id),
                drifts: Vec::new(),
                outcome: Outcome::Cancelled,
            };
        }

        match self.reconcile(spec).await {
            Ok(outcome) => outcome,
            Err(err) => {
                tracing::error!(resource = %spec.id, error = %err, "reconciliation failed");
                ResourceOutcome {
                    id: spec.id.clone(),
                    state: self.state_of(&spec.id),
                    drifts: Vec::new(),
                    outcome: Outcome::Unavailable {
                        reason: err.to_string(),
                    },
                }
            }
        }
    }

    async fn reconcile(&self, spec: &ResourceSpec) -> Result<ResourceOutcome, ControllerError> {
        let observation = fetcher::fetch_one(self.api.as_ref(), &spec.id, &self.config.retry).await;

        if let Observation::Unavailable(reason) = &observation {
            self.record(
                AuditEntry::for_resource(&spec.id, None, AuditAction::FetchFailed)
                    .with_detail(reason.clone()),
            );
            self.alerts.alert(Alert {
                resource: spec.id.clone(),
                reason: AlertReason::FetchFailed,
                message: format!("could not observe {}: {}", spec.id, reason),
            });
            return Ok(ResourceOutcome {
                id: spec.id.clone(),
                state: self.state_of(&spec.id),
                drifts: Vec::new(),
                outcome: Outcome::Unavailable {
                    reason: reason.clone(),
                },
            });
        }

        let diff = diff::diff(spec, observation.live());
        for benign in diff
            .drifts
            .iter()
            .filter(|d| d.classification == Classification::Benign)
        {
            tracing::debug!(
                resource = %spec.id,
                field = %benign.field,
                observed = ?benign.observed,
                "undeclared attribute differs, ignoring"
            );
        }

        let mut tracked = self.lock_tracked().get(&spec.id).cloned().unwrap_or_default();
        let outcome = match diff.action {
            PlannedAction::None => {
                tracked.state = tracked.state.transition(ResourceState::InSync)?;
                tracked.blocked_on.clear();
                Outcome::InSync
            }
            PlannedAction::Hold => self.hold(spec, &diff, &mut tracked)?,
            PlannedAction::Apply | PlannedAction::Create => {
                self.correct(spec, &diff, &mut tracked).await?
            }
        };

        let state = tracked.state;
        self.lock_tracked().insert(spec.id.clone(), tracked);

        Ok(ResourceOutcome {
            id: spec.id.clone(),
            state,
            drifts: diff.drifts,
            outcome,
        })
    }

    fn hold(
        &self,
        spec: &ResourceSpec,
        diff: &ResourceDiff,
        tracked: &mut Tracked,
    ) -> Result<Outcome, ControllerError> {
        let actionable: Vec<FieldDrift> = diff.actionable().cloned().collect();
        let reason = blocked_reason(spec, &actionable);

        if tracked.state == ResourceState::Blocked && tracked.blocked_on == actionable {
            tracing::debug!(resource = %spec.id, "still blocked, already reported");
            return Ok(Outcome::Blocked { reason });
        }

        if tracked.state != ResourceState::DriftDetected {
            tracked.state = tracked.state.transition(ResourceState::DriftDetected)?;
        }
        tracked.state = tracked.state.transition(ResourceState::Blocked)?;
        tracked.blocked_on = actionable.clone();

        for drift in &actionable {
            self.record(
                AuditEntry::for_drift(&spec.id, drift, AuditAction::Held)
                    .with_detail(drift_detail(spec, drift)),
            );
        }

        tracing::warn!(resource = %spec.id, reason = %reason, "blocked drift detected");
        self.alerts.alert(Alert {
            resource: spec.id.clone(),
            reason: AlertReason::PolicyViolation,
            message: reason.clone(),
        });

        Ok(Outcome::Blocked { reason })
    }

    async fn correct(
        &self,
        spec: &ResourceSpec,
        diff: &ResourceDiff,
        tracked: &mut Tracked,
    ) -> Result<Outcome, ControllerError> {
        let actionable: Vec<FieldDrift> = diff.actionable().cloned().collect();

        // An escalated resource stays held until its drifts change.
        if tracked.state == ResourceState::Blocked && tracked.blocked_on == actionable {
            tracing::debug!(resource = %spec.id, "correction previously escalated, holding");
            return Ok(Outcome::Blocked {
                reason: format!("correction of {} escalated in an earlier cycle", spec.id),
            });
        }

        if tracked.state != ResourceState::DriftDetected {
            tracked.state = tracked.state.transition(ResourceState::DriftDetected)?;
        }
        tracked.state = tracked.state.transition(ResourceState::Correcting)?;

        let audit_action = if diff.action == PlannedAction::Create {
            AuditAction::Created
        } else {
            AuditAction::Applied
        };
        let label = format!("apply {}", spec.id);
        let result = retry::with_backoff(&self.config.retry, &label, || self.api.apply(spec)).await;

        match result {
            Ok((_, attempts)) => {
                tracked.state = tracked.state.transition(ResourceState::InSync)?;
                tracked.blocked_on.clear();
                for drift in &actionable {
                    self.record(AuditEntry::for_drift(&spec.id, drift, audit_action));
                }
                tracing::info!(resource = %spec.id, action = ?diff.action, attempts, "drift corrected");
                Ok(Outcome::Corrected {
                    action: diff.action,
                    attempts,
                })
            }
            Err(err) => {
                tracked.state = tracked.state.transition(ResourceState::Blocked)?;
                tracked.blocked_on = actionable.clone();
                let reason = format!(
                    "correction of {} failed after {} attempt(s): {}",
                    spec.id, err.attempts, err.last
                );
                for drift in &actionable {
                    self.record(
                        AuditEntry::for_drift(&spec.id, drift, AuditAction::Escalated)
                            .with_detail(err.last.to_string()),
                    );
                }
                tracing::error!(resource = %spec.id, attempts = err.attempts, error = %err.last, "correction escalated");
                self.alerts.alert(Alert {
                    resource: spec.id.clone(),
                    reason: AlertReason::CorrectionFailed,
                    message: reason.clone(),
                });
                Ok(Outcome::Blocked { reason })
            }
        }
    }

    /// Operator-initiated delete. Refused for immutable resources.
    pub async fn destroy(&self, manifest: &Manifest, id: &ResourceId) -> Result<(), ControllerError> {
        let spec = manifest
            .get(id)
            .ok_or_else(|| ControllerError::UnknownResource(id.clone()))?;

        if spec.immutable {
            let reason = "resource is immutable; remove the flag before destroying".to_string();
            self.audit.append(
                AuditEntry::for_resource(id, Some(Classification::Blocked), AuditAction::DestroyRefused)
                    .with_detail(reason.clone()),
            )?;
            self.alerts.alert(Alert {
                resource: id.clone(),
                reason: AlertReason::DestroyRefused,
                message: format!("refused to destroy {}: {}", id, reason),
            });
            return Err(ControllerError::PolicyViolation {
                id: id.clone(),
                reason,
            });
        }

        self.api.delete(id).await?;
        self.lock_tracked().remove(id);
        // The delete already happened; a failed audit write must not report otherwise.
        self.record(AuditEntry::for_resource(id, None, AuditAction::Destroyed));
        tracing::info!(resource = %id, "resource destroyed");
        Ok(())
    }

    /// Operator-confirmed recreate of a declared resource that is missing
    /// from the cluster. This is the only path that writes a missing
    /// immutable resource.
    pub async fn recreate(
        &self,
        manifest: &Manifest,
        id: &ResourceId,
    ) -> Result<LiveResource, ControllerError> {
        let spec = manifest
            .get(id)
            .ok_or_else(|| ControllerError::UnknownResource(id.clone()))?;

        let label = format!("get {}", id);
        match retry::with_backoff(&self.config.retry, &label, || self.api.get(id)).await {
            Ok(_) => return Err(ControllerError::AlreadyPresent(id.clone())),
            Err(RetryError {
                last: ProviderError::NotFound(_),
                ..
            }) => {}
            Err(err) => return Err(err.last.into()),
        }

        let label = format!("recreate {}", id);
        let (live, attempts) =
            retry::with_backoff(&self.config.retry, &label, || self.api.apply(spec))
                .await
                .map_err(|err| ControllerError::Provider(err.last))?;

        self.lock_tracked().remove(id);
        for drift in diff::diff(spec, None).actionable() {
            self.record(
                AuditEntry::for_drift(id, drift, AuditAction::Created)
                    .with_detail("recreated on operator confirmation"),
            );
        }
        tracing::info!(resource = %id, attempts, "resource recreated");
        Ok(live)
    }

    fn record(&self, entry: AuditEntry) {
        let resource = entry.resource.clone();
        if let Err(err) = self.audit.append(entry) {
            tracing::error!(resource = %resource, error = %err, "failed to persist audit record");
        }
    }
}

impl std::fmt::Debug for Controller {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Controller")
            .field("provider", &self.api.name())
            .field("config", &self.config)
            .finish()
    }
}

fn drift_detail(spec: &ResourceSpec, drift: &FieldDrift) -> String {
    match drift.field {
        Field::Presence => {
            "protected resource missing; confirm with `driftguard recreate`".to_string()
        }
        Field::Region => "region change cannot be applied in place".to_string(),
        _ if spec.immutable => format!("attempted override of protected field {}", drift.field),
        _ => format!("{} drift", drift.field),
    }
}

fn blocked_reason(spec: &ResourceSpec, drifts: &[FieldDrift]) -> String {
    let fields: Vec<String> = drifts.iter().map(|d| d.field.to_string()).collect();
    let protection = if spec.immutable { "immutable " } else { "" };
    format!(
        "blocked drift on {}{} ({})",
        protection,
        spec.id,
        fields.join(", ")
    )
}

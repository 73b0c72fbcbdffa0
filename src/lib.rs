//! driftguard - policy-guarded drift reconciliation
//!
//! Compares a desired-state manifest against live cluster state, re-applies
//! correctable drift and refuses destructive changes to immutable resources.

pub mod alert;
pub mod audit;
pub mod cli;
pub mod config;
pub mod controller;
pub mod diff;
pub mod error;
pub mod fetcher;
pub mod manifest;
pub mod output;
pub mod providers;
pub mod resource;

pub use alert::{Alert, AlertReason, AlertSink, ChannelAlertSink, TracingAlertSink};
pub use audit::{AuditAction, AuditLog, AuditQuery, DriftRecord};
pub use controller::{Controller, ControllerConfig, CycleReport, Outcome, ResourceState, RetryPolicy};
pub use diff::{Classification, Field, PlannedAction};
pub use error::GuardError;
pub use manifest::{Manifest, ManifestError};
pub use providers::http::{HttpClusterClient, HttpClusterError};
pub use providers::memory::MemoryCluster;
pub use providers::{ClusterApi, ProviderError};
pub use resource::{LiveResource, ReclaimPolicy, ResourceId, ResourceSpec};

//! Field-level comparison of desired and observed state.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::resource::{LiveResource, ResourceId, ResourceSpec};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Classification {
    /// Nothing declared to enforce.
    Benign,
    /// Re-apply the desired value.
    Correctable,
    /// Alert only; never corrected automatically.
    Blocked,
}

impl fmt::Display for Classification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Classification::Benign => "benign",
            Classification::Correctable => "correctable",
            Classification::Blocked => "blocked",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Field {
    Presence,
    Region,
    StorageClass,
    ReclaimPolicy,
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Field::Presence => "presence",
            Field::Region => "region",
            Field::StorageClass => "storageClass",
            Field::ReclaimPolicy => "reclaimPolicy",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FieldDrift {
    pub field: Field,
    pub desired: Option<String>,
    pub observed: Option<String>,
    pub classification: Classification,
}

/// What the controller should do about a resource. Deliberately has no
/// delete or recreate variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlannedAction {
    None,
    Apply,
    Create,
    Hold,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceDiff {
    pub id: ResourceId,
    pub immutable: bool,
    pub drifts: Vec<FieldDrift>,
    pub action: PlannedAction,
}

impl ResourceDiff {
    pub fn is_blocked(&self) -> bool {
        self.action == PlannedAction::Hold
    }

    /// Drifts that require action, i.e. everything but benign ones.
    pub fn actionable(&self) -> impl Iterator<Item = &FieldDrift> {
        self.drifts
            .iter()
            .filter(|d| d.classification != Classification::Benign)
    }

    pub fn has_actionable(&self) -> bool {
        self.actionable().next().is_some()
    }
}

pub fn diff(spec: &ResourceSpec, observed: Option<&LiveResource>) -> ResourceDiff {
    let Some(live) = observed else {
        let classification = if spec.immutable {
            Classification::Blocked
        } else {
            Classification::Correctable
        };
        let drift = FieldDrift {
            field: Field::Presence,
            desired: Some("present".to_string()),
            observed: Some("missing".to_string()),
            classification,
        };
        let action = if spec.immutable {
            PlannedAction::Hold
        } else {
            PlannedAction::Create
        };
        return ResourceDiff {
            id: spec.id.clone(),
            immutable: spec.immutable,
            drifts: vec![drift],
            action,
        };
    };

    let mut drifts = Vec::new();

    if spec.region != live.region {
        drifts.push(FieldDrift {
            field: Field::Region,
            desired: Some(spec.region.clone()),
            observed: Some(live.region.clone()),
            classification: Classification::Blocked,
        });
    }

    if let Some(drift) = compare_optional(
        spec,
        Field::StorageClass,
        spec.storage_class.as_deref(),
        live.storage_class.as_deref(),
    ) {
        drifts.push(drift);
    }

    let desired_reclaim = spec.reclaim_policy.map(|p| p.as_str());
    let observed_reclaim = live.reclaim_policy.map(|p| p.as_str());
    if let Some(drift) = compare_optional(spec, Field::ReclaimPolicy, desired_reclaim, observed_reclaim)
    {
        drifts.push(drift);
    }

    let action = plan(&drifts);
    ResourceDiff {
        id: spec.id.clone(),
        immutable: spec.immutable,
        drifts,
        action,
    }
}

fn compare_optional(
    spec: &ResourceSpec,
    field: Field,
    desired: Option<&str>,
    observed: Option<&str>,
) -> Option<FieldDrift> {
    if desired == observed {
        return None;
    }
    let classification = match desired {
        None => Classification::Benign,
        Some(_) if spec.immutable => Classification::Blocked,
        Some(_) => Classification::Correctable,
    };
    Some(FieldDrift {
        field,
        desired: desired.map(str::to_string),
        observed: observed.map(str::to_string),
        classification,
    })
}

fn plan(drifts: &[FieldDrift]) -> PlannedAction {
    let worst = drifts.iter().map(|d| d.classification).max();
    match worst {
        Some(Classification::Blocked) => PlannedAction::Hold,
        Some(Classification::Correctable) => PlannedAction::Apply,
        Some(Classification::Benign) | None => PlannedAction::None,
    }
}

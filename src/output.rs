//! Human-readable rendering of cycle reports, plans and audit queries.

use tabled::settings::Style;
use tabled::{Table, Tabled};
use termtree::Tree;

use crate::audit::DriftRecord;
use crate::controller::{CycleReport, Outcome};
use crate::diff::{FieldDrift, ResourceDiff};
use crate::fetcher::Observation;

fn or_dash(value: Option<&str>) -> String {
    value.unwrap_or("-").to_string()
}

fn drift_leaf(drift: &FieldDrift) -> String {
    format!(
        "{}: {} -> {} [{}]",
        drift.field,
        or_dash(drift.observed.as_deref()),
        or_dash(drift.desired.as_deref()),
        drift.classification
    )
}

fn outcome_label(outcome: &Outcome) -> String {
    match outcome {
        Outcome::InSync => "in sync".to_string(),
        Outcome::Corrected { action, attempts } => {
            format!("corrected ({:?}, {} attempt(s))", action, attempts).to_lowercase()
        }
        Outcome::Blocked { reason } => format!("BLOCKED: {}", reason),
        Outcome::Unavailable { reason } => format!("unavailable: {}", reason),
        Outcome::Cancelled => "cancelled".to_string(),
    }
}

pub fn render_cycle(report: &CycleReport) -> String {
    let mut root = Tree::new(format!(
        "cycle {} ({} corrected, {} blocked, {} unavailable)",
        report.cycle,
        report.corrected(),
        report.blocked(),
        report.unavailable()
    ));

    for outcome in &report.outcomes {
        let mut node = Tree::new(format!("{}: {}", outcome.id, outcome_label(&outcome.outcome)));
        for drift in &outcome.drifts {
            node.push(drift_leaf(drift));
        }
        root.push(node);
    }

    root.to_string()
}

pub fn render_plan(plan: &[(ResourceDiff, Observation)]) -> String {
    let mut root = Tree::new("plan".to_string());

    for (diff, observation) in plan {
        let label = match observation {
            Observation::Unavailable(reason) => format!("{}: unavailable: {}", diff.id, reason),
            _ => format!("{}: {}", diff.id, format!("{:?}", diff.action).to_lowercase()),
        };
        let mut node = Tree::new(label);
        for drift in &diff.drifts {
            node.push(drift_leaf(drift));
        }
        root.push(node);
    }

    root.to_string()
}

#[derive(Tabled)]
struct AuditRow {
    #[tabled(rename = "SEQ")]
    seq: u64,
    #[tabled(rename = "TIMESTAMP")]
    timestamp: String,
    #[tabled(rename = "RESOURCE")]
    resource: String,
    #[tabled(rename = "FIELD")]
    field: String,
    #[tabled(rename = "OBSERVED")]
    observed: String,
    #[tabled(rename = "DESIRED")]
    desired: String,
    #[tabled(rename = "CLASS")]
    classification: String,
    #[tabled(rename = "ACTION")]
    action: String,
}

impl From<&DriftRecord> for AuditRow {
    fn from(record: &DriftRecord) -> Self {
        Self {
            seq: record.seq,
            timestamp: record.timestamp.to_rfc3339(),
            resource: record.resource.to_string(),
            field: or_dash(record.field.map(|f| f.to_string()).as_deref()),
            observed: or_dash(record.observed.as_deref()),
            desired: or_dash(record.desired.as_deref()),
            classification: or_dash(record.classification.map(|c| c.to_string()).as_deref()),
            action: record.action.to_string(),
        }
    }
}

pub fn render_audit_table(records: &[DriftRecord]) -> String {
    if records.is_empty() {
        return "no audit records".to_string();
    }
    let rows: Vec<AuditRow> = records.iter().map(AuditRow::from).collect();
    Table::new(rows).with(Style::rounded()).to_string()
}

pub fn render_audit_json(records: &[DriftRecord]) -> Result<String, serde_json::Error> {
    serde_json::to_string_pretty(records)
}

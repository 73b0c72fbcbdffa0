//! Append-only drift audit log with optional JSON-lines persistence.

use std::fmt;
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::diff::{Classification, Field, FieldDrift};
use crate::resource::ResourceId;

#[derive(Debug, Error)]
pub enum AuditError {
    #[error("audit log I/O error on {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("corrupt audit log {path} at line {line}: {message}")]
    Corrupt {
        path: String,
        line: usize,
        message: String,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditAction {
    Applied,
    Created,
    /// Blocked drift; alert raised, nothing changed.
    Held,
    /// Correction retries exhausted or failed permanently.
    Escalated,
    FetchFailed,
    DestroyRefused,
    Destroyed,
}

impl fmt::Display for AuditAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            AuditAction::Applied => "applied",
            AuditAction::Created => "created",
            AuditAction::Held => "held",
            AuditAction::Escalated => "escalated",
            AuditAction::FetchFailed => "fetch_failed",
            AuditAction::DestroyRefused => "destroy_refused",
            AuditAction::Destroyed => "destroyed",
        })
    }
}

/// An entry before the log assigns its sequence number and timestamp.
#[derive(Debug, Clone, PartialEq)]
pub struct AuditEntry {
    pub resource: ResourceId,
    pub field: Option<Field>,
    pub desired: Option<String>,
    pub observed: Option<String>,
    /// `None` for events that are not drift, such as fetch failures.
    pub classification: Option<Classification>,
    pub action: AuditAction,
    pub detail: Option<String>,
}

impl AuditEntry {
    pub fn for_drift(resource: &ResourceId, drift: &FieldDrift, action: AuditAction) -> Self {
        Self {
            resource: resource.clone(),
            field: Some(drift.field),
            desired: drift.desired.clone(),
            observed: drift.observed.clone(),
            classification: Some(drift.classification),
            action,
            detail: None,
        }
    }

    pub fn for_resource(
        resource: &ResourceId,
        classification: Option<Classification>,
        action: AuditAction,
    ) -> Self {
        Self {
            resource: resource.clone(),
            field: None,
            desired: None,
            observed: None,
            classification,
            action,
            detail: None,
        }
    }

    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DriftRecord {
    pub seq: u64,
    pub resource: ResourceId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub field: Option<Field>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub desired: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub observed: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub classification: Option<Classification>,
    pub action: AuditAction,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Default)]
pub struct AuditQuery {
    pub resource: Option<ResourceId>,
    /// Inclusive.
    pub since: Option<DateTime<Utc>>,
    /// Exclusive.
    pub until: Option<DateTime<Utc>>,
}

impl AuditQuery {
    pub fn matches(&self, record: &DriftRecord) -> bool {
        self.resource.as_ref().is_none_or(|id| &record.resource == id)
            && self.since.is_none_or(|since| record.timestamp >= since)
            && self.until.is_none_or(|until| record.timestamp < until)
    }
}

struct Persistence {
    path: PathBuf,
    file: File,
}

#[derive(Default)]
struct Inner {
    records: Vec<DriftRecord>,
    last_timestamp: Option<DateTime<Utc>>,
    persistence: Option<Persistence>,
}

/// Shared by every reconciliation task; appends are serialized by one lock.
#[derive(Default)]
pub struct AuditLog {
    inner: Mutex<Inner>,
}

impl AuditLog {
    pub fn in_memory() -> Self {
        Self::default()
    }

    /// Replays an existing JSON-lines file and appends new records to it.
    pub fn open(path: &Path) -> Result<Self, AuditError> {
        let io_err = |source| AuditError::Io {
            path: path.display().to_string(),
            source,
        };

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(io_err)?;
        }

        let records = Self::read_records(path)?;
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .map_err(io_err)?;

        tracing::debug!(path = %path.display(), count = records.len(), "audit log opened");

        let last_timestamp = records.iter().map(|r| r.timestamp).max();
        Ok(Self {
            inner: Mutex::new(Inner {
                records,
                last_timestamp,
                persistence: Some(Persistence {
                    path: path.to_path_buf(),
                    file,
                }),
            }),
        })
    }

    fn read_records(path: &Path) -> Result<Vec<DriftRecord>, AuditError> {
        let file = match File::open(path) {
            Ok(file) => file,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(source) => {
                return Err(AuditError::Io {
                    path: path.display().to_string(),
                    source,
                });
            }
        };

        let mut records = Vec::new();
        for (index, line) in BufReader::new(file).lines().enumerate() {
            let line = line.map_err(|source| AuditError::Io {
                path: path.display().to_string(),
                source,
            })?;
            if line.trim().is_empty() {
                continue;
            }
            let record: DriftRecord =
                serde_json::from_str(&line).map_err(|e| AuditError::Corrupt {
                    path: path.display().to_string(),
                    line: index + 1,
                    message: e.to_string(),
                })?;
            records.push(record);
        }
        Ok(records)
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Stamps and stores an entry. The record is kept in memory even when
    /// writing it to the backing file fails; that failure is returned.
    pub fn append(&self, entry: AuditEntry) -> Result<DriftRecord, AuditError> {
        let mut inner = self.lock();

        let now = Utc::now();
        let timestamp = match inner.last_timestamp {
            Some(last) if last > now => last,
            _ => now,
        };
        let seq = inner.records.last().map_or(1, |r| r.seq + 1);

        let record = DriftRecord {
            seq,
            resource: entry.resource,
            field: entry.field,
            desired: entry.desired,
            observed: entry.observed,
            classification: entry.classification,
            action: entry.action,
            detail: entry.detail,
            timestamp,
        };

        inner.last_timestamp = Some(timestamp);
        inner.records.push(record.clone());

        if let Some(persistence) = inner.persistence.as_mut() {
            let write = serde_json::to_string(&record)
                .map_err(std::io::Error::other)
                .and_then(|line| writeln!(persistence.file, "{}", line))
                .and_then(|()| persistence.file.flush());
            if let Err(source) = write {
                return Err(AuditError::Io {
                    path: persistence.path.display().to_string(),
                    source,
                });
            }
        }

        Ok(record)
    }

    pub fn records(&self) -> Vec<DriftRecord> {
        self.lock().records.clone()
    }

    pub fn query(&self, query: &AuditQuery) -> Vec<DriftRecord> {
        self.lock()
            .records
            .iter()
            .filter(|r| query.matches(r))
            .cloned()
            .collect()
    }

    pub fn by_resource(&self, id: &ResourceId) -> Vec<DriftRecord> {
        self.query(&AuditQuery {
            resource: Some(id.clone()),
            ..Default::default()
        })
    }

    pub fn in_range(&self, since: DateTime<Utc>, until: DateTime<Utc>) -> Vec<DriftRecord> {
        self.query(&AuditQuery {
            resource: None,
            since: Some(since),
            until: Some(until),
        })
    }

    pub fn len(&self) -> usize {
        self.lock().records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl fmt::Debug for AuditLog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.lock();
        f.debug_struct("AuditLog")
            .field("records", &inner.records.len())
            .field(
                "path",
                &inner.persistence.as_ref().map(|p| p.path.display().to_string()),
            )
            .finish()
    }
}

#[cfg(test)]
impl AuditLog {
    /// A log whose backing file handle is read-only, so every append fails
    /// to persist.
    pub(crate) fn unwritable(path: &Path) -> Self {
        std::fs::write(path, "").unwrap();
        let file = File::open(path).unwrap();
        Self {
            inner: Mutex::new(Inner {
                persistence: Some(Persistence {
                    path: path.to_path_buf(),
                    file,
                }),
                ..Default::default()
            }),
        }
    }
}

//! Append-only record of successful add, update and delete operations.
//!
//! Recording is gated by an organization allow-list. Failures to persist are
//! logged and counted; they never change the status of the operation, which
//! has already taken effect remotely.

use crate::metrics_defs::AUDIT_WRITE_FAILED;
use crate::request::FilterRequest;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use shared::counter;
use std::collections::HashSet;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tokio::io::AsyncWriteExt;
use uuid::Uuid;

#[derive(thiserror::Error, Debug)]
pub enum AuditError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("encode error: {0}")]
    Encode(#[from] serde_json::Error),
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum AuditKind {
    Addition { value: String },
    Edition { new_value: String },
    Deletion,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditEntry {
    pub id: Uuid,
    #[serde(flatten)]
    pub kind: AuditKind,
    pub organization: String,
    pub project: String,
    pub group_filter: String,
    /// The added key for additions, the key filter otherwise.
    pub key: String,
    pub user: String,
    pub recorded_at: DateTime<Utc>,
}

impl AuditEntry {
    pub fn new(kind: AuditKind, filter: &FilterRequest, key: &str) -> Self {
        AuditEntry {
            id: Uuid::new_v4(),
            kind,
            organization: filter.organization.clone(),
            project: filter.project.clone(),
            group_filter: filter.group_filter.clone(),
            key: key.to_string(),
            user: filter.user.clone(),
            recorded_at: Utc::now(),
        }
    }
}

#[async_trait]
pub trait AuditSink: Send + Sync {
    async fn append(&self, entry: &AuditEntry) -> Result<(), AuditError>;

    /// Entries recorded within `[from, to]`, optionally restricted to one user.
    async fn entries_between(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
        user: Option<&str>,
    ) -> Result<Vec<AuditEntry>, AuditError>;
}

fn in_range(entry: &AuditEntry, from: DateTime<Utc>, to: DateTime<Utc>, user: Option<&str>) -> bool {
    entry.recorded_at >= from && entry.recorded_at <= to && user.is_none_or(|u| entry.user == u)
}

/// Stores entries as JSON lines in a single file that is only ever appended to.
pub struct JsonlAuditSink {
    path: PathBuf,
    // Serializes appends coming from concurrent requests.
    write_lock: tokio::sync::Mutex<()>,
}

impl JsonlAuditSink {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        JsonlAuditSink {
            path: path.as_ref().to_path_buf(),
            write_lock: tokio::sync::Mutex::new(()),
        }
    }
}

#[async_trait]
impl AuditSink for JsonlAuditSink {
    async fn append(&self, entry: &AuditEntry) -> Result<(), AuditError> {
        let mut line = serde_json::to_vec(entry)?;
        line.push(b'\n');

        let _guard = self.write_lock.lock().await;
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await?;
        file.write_all(&line).await?;
        file.flush().await?;
        Ok(())
    }

    async fn entries_between(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
        user: Option<&str>,
    ) -> Result<Vec<AuditEntry>, AuditError> {
        let contents = match tokio::fs::read_to_string(&self.path).await {
            Ok(contents) => contents,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut entries = Vec::new();
        for line in contents.lines().filter(|l| !l.trim().is_empty()) {
            let entry: AuditEntry = serde_json::from_str(line)?;
            if in_range(&entry, from, to, user) {
                entries.push(entry);
            }
        }
        Ok(entries)
    }
}

/// Keeps entries in memory. Used for dry runs and tests.
#[derive(Default)]
pub struct MemoryAuditSink {
    entries: Mutex<Vec<AuditEntry>>,
}

impl MemoryAuditSink {
    pub fn new() -> Self {
        MemoryAuditSink::default()
    }

    pub fn entries(&self) -> Vec<AuditEntry> {
        self.entries
            .lock()
            .map(|entries| entries.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl AuditSink for MemoryAuditSink {
    async fn append(&self, entry: &AuditEntry) -> Result<(), AuditError> {
        self.entries
            .lock()
            .map_err(|_| io::Error::other("audit buffer poisoned"))?
            .push(entry.clone());
        Ok(())
    }

    async fn entries_between(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
        user: Option<&str>,
    ) -> Result<Vec<AuditEntry>, AuditError> {
        Ok(self
            .entries()
            .into_iter()
            .filter(|entry| in_range(entry, from, to, user))
            .collect())
    }
}

#[derive(Clone)]
pub struct AuditRecorder {
    sink: Arc<dyn AuditSink>,
    organizations: Arc<HashSet<String>>,
}

impl AuditRecorder {
    pub fn new<I>(sink: Arc<dyn AuditSink>, organizations: I) -> Self
    where
        I: IntoIterator<Item = String>,
    {
        AuditRecorder {
            sink,
            organizations: Arc::new(organizations.into_iter().collect()),
        }
    }

    pub fn is_enabled_for(&self, organization: &str) -> bool {
        self.organizations.contains(organization)
    }

    pub async fn record(&self, entry: AuditEntry) {
        if !self.is_enabled_for(&entry.organization) {
            tracing::debug!(
                organization = %entry.organization,
                "Organization is not audited, skipping entry"
            );
            return;
        }

        if let Err(e) = self.sink.append(&entry).await {
            counter!(AUDIT_WRITE_FAILED).increment(1);
            tracing::warn!(
                error = %e,
                organization = %entry.organization,
                project = %entry.project,
                "Failed to write audit entry"
            );
        }
    }

    pub async fn history(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
        user: Option<&str>,
    ) -> Result<Vec<AuditEntry>, AuditError> {
        self.sink.entries_between(from, to, user).await
    }
}

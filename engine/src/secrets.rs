//! Regex-filtered bulk operations over the secrets of a vault.

use crate::metrics_defs::SECRET_OPERATION_FAILED;
use crate::outcome::Tally;
use crate::predicate::{MatchMode, Predicate, PredicateCompiler};
use crate::types::Status;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use shared::counter;
use std::collections::HashSet;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum VaultError {
    #[error("unauthorized")]
    Unauthorized,

    #[error("not found: {0}")]
    NotFound(String),

    #[error("already exists: {0}")]
    AlreadyExists(String),

    #[error("operation cancelled")]
    Cancelled,

    #[error("remote error: {0}")]
    Remote(String),
}

impl VaultError {
    pub fn status(&self) -> Status {
        match self {
            VaultError::Unauthorized => Status::Unauthorized,
            VaultError::NotFound(_) => Status::ResourceNotFound,
            VaultError::AlreadyExists(_) => Status::AlreadyContains,
            VaultError::Cancelled | VaultError::Remote(_) => Status::Unknown,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Secret {
    pub name: String,
    pub value: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeletedSecret {
    pub name: String,
    pub deleted_on: Option<DateTime<Utc>>,
}

#[async_trait]
pub trait SecretVault: Send + Sync {
    async fn list_secrets(&self, vault: &str, cancel: &CancellationToken) -> Result<Vec<Secret>, VaultError>;

    async fn list_deleted_secrets(
        &self,
        vault: &str,
        cancel: &CancellationToken,
    ) -> Result<Vec<DeletedSecret>, VaultError>;

    /// Creates the secret or replaces its current value.
    async fn set_secret(
        &self,
        vault: &str,
        name: &str,
        value: &str,
        cancel: &CancellationToken,
    ) -> Result<(), VaultError>;

    async fn delete_secret(&self, vault: &str, name: &str, cancel: &CancellationToken) -> Result<(), VaultError>;

    async fn recover_secret(&self, vault: &str, name: &str, cancel: &CancellationToken) -> Result<(), VaultError>;
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecretResults<T> {
    pub status: Status,
    pub secrets: Vec<T>,
}

impl<T> SecretResults<T> {
    fn empty(status: Status) -> Self {
        SecretResults {
            status,
            secrets: Vec::new(),
        }
    }
}

pub struct SecretService {
    vault: Arc<dyn SecretVault>,
    compiler: Arc<PredicateCompiler>,
}

impl SecretService {
    pub fn new(vault: Arc<dyn SecretVault>, compiler: Arc<PredicateCompiler>) -> Self {
        SecretService { vault, compiler }
    }

    fn name_filter(&self, pattern: &str) -> Option<Predicate> {
        match self.compiler.compile(pattern, MatchMode::Regex) {
            Ok(predicate) => Some(predicate),
            Err(e) => {
                tracing::error!(error = %e, pattern = %e.pattern, "Couldn't compile secret filter");
                None
            }
        }
    }

    pub async fn get_secrets(&self, vault: &str, filter: &str, cancel: &CancellationToken) -> SecretResults<Secret> {
        let secrets = match self.vault.list_secrets(vault, cancel).await {
            Ok(secrets) => secrets,
            Err(e) => {
                tracing::error!(error = %e, vault, "Failed to list secrets");
                return SecretResults::empty(e.status());
            }
        };
        let Some(predicate) = self.name_filter(filter) else {
            return SecretResults::empty(Status::Success);
        };

        SecretResults {
            status: Status::Success,
            secrets: secrets
                .into_iter()
                .filter(|secret| predicate.is_match(&secret.name))
                .collect(),
        }
    }

    pub async fn get_deleted_secrets(
        &self,
        vault: &str,
        filter: &str,
        cancel: &CancellationToken,
    ) -> SecretResults<DeletedSecret> {
        let secrets = match self.vault.list_deleted_secrets(vault, cancel).await {
            Ok(secrets) => secrets,
            Err(e) => {
                tracing::error!(error = %e, vault, "Failed to list deleted secrets");
                return SecretResults::empty(e.status());
            }
        };
        let Some(predicate) = self.name_filter(filter) else {
            return SecretResults::empty(Status::Success);
        };

        SecretResults {
            status: Status::Success,
            secrets: secrets
                .into_iter()
                .filter(|secret| predicate.is_match(&secret.name))
                .collect(),
        }
    }

    pub async fn delete_secrets(&self, vault: &str, filter: &str, cancel: &CancellationToken) -> Status {
        let listed = self.get_secrets(vault, filter, cancel).await;
        if !listed.status.is_success() {
            return listed.status;
        }

        let mut tally = Tally::new();
        for secret in &listed.secrets {
            let result = self.vault.delete_secret(vault, &secret.name, cancel).await;
            tally.record(self.check("delete", vault, &secret.name, result));
        }
        tally.status()
    }

    pub async fn recover_secrets(&self, vault: &str, filter: &str, cancel: &CancellationToken) -> Status {
        let listed = self.get_deleted_secrets(vault, filter, cancel).await;
        if !listed.status.is_success() {
            return listed.status;
        }

        let mut tally = Tally::new();
        for secret in &listed.secrets {
            let result = self.vault.recover_secret(vault, &secret.name, cancel).await;
            tally.record(self.check("recover", vault, &secret.name, result));
        }
        tally.status()
    }

    /// Copies every secret of `from` into `to`. Secrets already present in
    /// `to` are left alone unless `overwrite` is set; secrets without a value
    /// are skipped.
    pub async fn copy_secrets(&self, from: &str, to: &str, overwrite: bool, cancel: &CancellationToken) -> Status {
        let source = match self.vault.list_secrets(from, cancel).await {
            Ok(secrets) => secrets,
            Err(e) => {
                tracing::error!(error = %e, vault = from, "Failed to list source secrets");
                return e.status();
            }
        };
        let existing: HashSet<String> = match self.vault.list_secrets(to, cancel).await {
            Ok(secrets) => secrets.into_iter().map(|s| s.name).collect(),
            Err(e) => {
                tracing::error!(error = %e, vault = to, "Failed to list target secrets");
                return e.status();
            }
        };

        let mut tally = Tally::new();
        for secret in source {
            if !overwrite && existing.contains(&secret.name) {
                tracing::debug!(secret = %secret.name, "Secret already present, skipping");
                continue;
            }
            let Some(value) = secret.value.as_deref() else {
                continue;
            };
            let result = self.vault.set_secret(to, &secret.name, value, cancel).await;
            tally.record(self.check("copy", to, &secret.name, result));
        }

        tracing::info!(
            from,
            to,
            attempted = tally.attempted(),
            succeeded = tally.succeeded(),
            "Secrets copied"
        );
        tally.status()
    }

    fn check(&self, operation: &'static str, vault: &str, name: &str, result: Result<(), VaultError>) -> bool {
        match result {
            Ok(()) => {
                tracing::info!(operation, vault, secret = name, "Secret changed");
                true
            }
            Err(e) => {
                counter!(SECRET_OPERATION_FAILED, "operation" => operation).increment(1);
                tracing::warn!(error = %e, operation, vault, secret = name, "Secret operation failed");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutils::MemoryVault;

    fn service(vault: Arc<MemoryVault>) -> SecretService {
        SecretService::new(vault, Arc::new(PredicateCompiler::default()))
    }

    fn vault() -> MemoryVault {
        MemoryVault::new()
            .with_secrets(
                "kv-dev",
                &[("db-password", "hunter2"), ("db-user", "admin"), ("api-key", "k")],
            )
            .with_secrets("kv-prod", &[("db-user", "root")])
    }

    #[tokio::test]
    async fn test_get_secrets_by_name() {
        let service = service(Arc::new(vault()));
        let results = service
            .get_secrets("kv-dev", "^DB-", &CancellationToken::new())
            .await;

        assert_eq!(results.status, Status::Success);
        let names: Vec<_> = results.secrets.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["db-password", "db-user"]);
    }

    #[tokio::test]
    async fn test_unknown_vault() {
        let service = service(Arc::new(vault()));
        let results = service
            .get_secrets("kv-missing", ".*", &CancellationToken::new())
            .await;
        assert_eq!(results, SecretResults::empty(Status::ResourceNotFound));
    }

    #[tokio::test]
    async fn test_bad_filter_changes_nothing() {
        let vault = Arc::new(vault());
        let service = service(vault.clone());

        let status = service
            .delete_secrets("kv-dev", "(db", &CancellationToken::new())
            .await;
        assert_eq!(status, Status::Success);
        assert!(vault.secret("kv-dev", "db-user").is_some());
    }

    #[tokio::test]
    async fn test_delete_and_recover() {
        let vault = Arc::new(vault());
        let service = service(vault.clone());
        let cancel = CancellationToken::new();

        assert_eq!(service.delete_secrets("kv-dev", "^db", &cancel).await, Status::Success);
        assert!(vault.secret("kv-dev", "db-user").is_none());
        assert!(vault.secret("kv-dev", "api-key").is_some());

        let deleted = service.get_deleted_secrets("kv-dev", "password", &cancel).await;
        assert_eq!(deleted.secrets.len(), 1);
        assert!(deleted.secrets[0].deleted_on.is_some());

        assert_eq!(service.recover_secrets("kv-dev", "password", &cancel).await, Status::Success);
        assert_eq!(
            vault.secret("kv-dev", "db-password").and_then(|s| s.value),
            Some("hunter2".to_string())
        );
        assert!(vault.secret("kv-dev", "db-user").is_none());
    }

    #[tokio::test]
    async fn test_partial_delete_failure() {
        let vault = Arc::new(vault().fail_on("db-password"));
        let service = service(vault.clone());

        let status = service
            .delete_secrets("kv-dev", "^db", &CancellationToken::new())
            .await;
        assert_eq!(status, Status::Unknown);
        // The other secret is still deleted.
        assert!(vault.secret("kv-dev", "db-user").is_none());
        assert!(vault.secret("kv-dev", "db-password").is_some());
    }

    #[tokio::test]
    async fn test_copy_keeps_existing_without_overwrite() {
        let vault = Arc::new(vault());
        let service = service(vault.clone());

        let status = service
            .copy_secrets("kv-dev", "kv-prod", false, &CancellationToken::new())
            .await;
        assert_eq!(status, Status::Success);
        assert_eq!(
            vault.secret("kv-prod", "db-user").and_then(|s| s.value),
            Some("root".to_string())
        );
        assert_eq!(
            vault.secret("kv-prod", "db-password").and_then(|s| s.value),
            Some("hunter2".to_string())
        );
    }

    #[tokio::test]
    async fn test_copy_with_overwrite() {
        let vault = Arc::new(vault());
        let service = service(vault.clone());

        let status = service
            .copy_secrets("kv-dev", "kv-prod", true, &CancellationToken::new())
            .await;
        assert_eq!(status, Status::Success);
        assert_eq!(
            vault.secret("kv-prod", "db-user").and_then(|s| s.value),
            Some("admin".to_string())
        );
    }
}

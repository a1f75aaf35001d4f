//! In-memory collaborators used by the engine's tests.

use crate::secrets::{DeletedSecret, Secret, SecretVault, VaultError};
use crate::store::{ProjectDirectory, StoreError, VariableGroupStore};
use crate::types::{Credential, GroupId, ProjectContext, ProjectRef, VariableGroup};
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use tokio_util::sync::CancellationToken;

/// Variable groups per project, with switches for injecting failures.
#[derive(Default)]
pub struct MemoryStore {
    groups: Mutex<HashMap<String, Vec<VariableGroup>>>,
    listing_failures: Mutex<HashMap<String, StoreError>>,
    rejected_pushes: Mutex<HashSet<GroupId>>,
    pushes: Mutex<Vec<(String, VariableGroup)>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        MemoryStore::default()
    }

    pub fn with_groups(self, project: &str, groups: Vec<VariableGroup>) -> Self {
        self.groups.lock().unwrap().insert(project.to_string(), groups);
        self
    }

    pub fn fail_listing(self, project: &str, error: StoreError) -> Self {
        self.listing_failures
            .lock()
            .unwrap()
            .insert(project.to_string(), error);
        self
    }

    pub fn reject_push(self, id: i64) -> Self {
        self.rejected_pushes.lock().unwrap().insert(GroupId(id));
        self
    }

    /// Every push received, in order, as `(project, payload)`.
    pub fn pushes(&self) -> Vec<(String, VariableGroup)> {
        self.pushes.lock().unwrap().clone()
    }

    pub fn group(&self, project: &str, name: &str) -> Option<VariableGroup> {
        self.groups
            .lock()
            .unwrap()
            .get(project)?
            .iter()
            .find(|g| g.name == name)
            .cloned()
    }
}

#[async_trait]
impl VariableGroupStore for MemoryStore {
    async fn list_groups(
        &self,
        context: &ProjectContext,
        cancel: &CancellationToken,
    ) -> Result<Vec<VariableGroup>, StoreError> {
        if cancel.is_cancelled() {
            return Err(StoreError::Cancelled);
        }
        if let Some(error) = self.listing_failures.lock().unwrap().get(&context.project) {
            return Err(error.clone());
        }
        self.groups
            .lock()
            .unwrap()
            .get(&context.project)
            .cloned()
            .ok_or_else(|| StoreError::ProjectDoesNotExist(context.project.clone()))
    }

    async fn replace_group(
        &self,
        context: &ProjectContext,
        group: &VariableGroup,
        cancel: &CancellationToken,
    ) -> Result<(), StoreError> {
        self.pushes
            .lock()
            .unwrap()
            .push((context.project.clone(), group.clone()));

        if cancel.is_cancelled() {
            return Err(StoreError::Cancelled);
        }
        if self.rejected_pushes.lock().unwrap().contains(&group.id) {
            return Err(StoreError::Remote("push rejected".into()));
        }

        let mut groups = self.groups.lock().unwrap();
        let stored = groups
            .get_mut(&context.project)
            .and_then(|groups| groups.iter_mut().find(|g| g.id == group.id))
            .ok_or_else(|| StoreError::ResourceNotFound(group.id.to_string()))?;
        *stored = group.clone();
        Ok(())
    }
}

pub struct MemoryDirectory {
    projects: Result<Vec<ProjectRef>, StoreError>,
}

impl MemoryDirectory {
    pub fn new(names: &[&str]) -> Self {
        MemoryDirectory {
            projects: Ok(names
                .iter()
                .enumerate()
                .map(|(i, name)| ProjectRef {
                    id: format!("id-{i}"),
                    name: name.to_string(),
                })
                .collect()),
        }
    }

    pub fn failing(error: StoreError) -> Self {
        MemoryDirectory {
            projects: Err(error),
        }
    }
}

#[async_trait]
impl ProjectDirectory for MemoryDirectory {
    async fn list_projects(
        &self,
        _organization: &str,
        _credential: &Credential,
        _cancel: &CancellationToken,
    ) -> Result<Vec<ProjectRef>, StoreError> {
        self.projects.clone()
    }
}

/// Secrets per vault. Deleting moves a secret to the vault's deleted list.
#[derive(Default)]
pub struct MemoryVault {
    live: Mutex<HashMap<String, Vec<Secret>>>,
    deleted: Mutex<HashMap<String, Vec<DeletedSecret>>>,
    deleted_values: Mutex<HashMap<(String, String), Option<String>>>,
    failing_names: Mutex<HashSet<String>>,
}

impl MemoryVault {
    pub fn new() -> Self {
        MemoryVault::default()
    }

    pub fn with_secrets(self, vault: &str, secrets: &[(&str, &str)]) -> Self {
        self.live.lock().unwrap().insert(
            vault.to_string(),
            secrets
                .iter()
                .map(|(name, value)| Secret {
                    name: name.to_string(),
                    value: Some(value.to_string()),
                })
                .collect(),
        );
        self
    }

    pub fn fail_on(self, name: &str) -> Self {
        self.failing_names.lock().unwrap().insert(name.to_string());
        self
    }

    pub fn secret(&self, vault: &str, name: &str) -> Option<Secret> {
        self.live
            .lock()
            .unwrap()
            .get(vault)?
            .iter()
            .find(|s| s.name == name)
            .cloned()
    }

    fn check(&self, vault: &str, name: &str) -> Result<(), VaultError> {
        if self.failing_names.lock().unwrap().contains(name) {
            return Err(VaultError::Remote(format!("{vault}/{name} failed")));
        }
        Ok(())
    }
}

#[async_trait]
impl SecretVault for MemoryVault {
    async fn list_secrets(
        &self,
        vault: &str,
        _cancel: &CancellationToken,
    ) -> Result<Vec<Secret>, VaultError> {
        self.live
            .lock()
            .unwrap()
            .get(vault)
            .cloned()
            .ok_or_else(|| VaultError::NotFound(vault.to_string()))
    }

    async fn list_deleted_secrets(
        &self,
        vault: &str,
        _cancel: &CancellationToken,
    ) -> Result<Vec<DeletedSecret>, VaultError> {
        Ok(self
            .deleted
            .lock()
            .unwrap()
            .get(vault)
            .cloned()
            .unwrap_or_default())
    }

    async fn set_secret(
        &self,
        vault: &str,
        name: &str,
        value: &str,
        _cancel: &CancellationToken,
    ) -> Result<(), VaultError> {
        self.check(vault, name)?;
        let mut live = self.live.lock().unwrap();
        let secrets = live.entry(vault.to_string()).or_default();
        let secret = Secret {
            name: name.to_string(),
            value: Some(value.to_string()),
        };
        match secrets.iter_mut().find(|s| s.name == name) {
            Some(existing) => *existing = secret,
            None => secrets.push(secret),
        }
        Ok(())
    }

    async fn delete_secret(
        &self,
        vault: &str,
        name: &str,
        _cancel: &CancellationToken,
    ) -> Result<(), VaultError> {
        self.check(vault, name)?;
        let mut live = self.live.lock().unwrap();
        let secrets = live
            .get_mut(vault)
            .ok_or_else(|| VaultError::NotFound(vault.to_string()))?;
        let position = secrets
            .iter()
            .position(|s| s.name == name)
            .ok_or_else(|| VaultError::NotFound(name.to_string()))?;
        let removed = secrets.remove(position);

        self.deleted_values
            .lock()
            .unwrap()
            .insert((vault.to_string(), name.to_string()), removed.value);
        self.deleted
            .lock()
            .unwrap()
            .entry(vault.to_string())
            .or_default()
            .push(DeletedSecret {
                name: name.to_string(),
                deleted_on: Some(chrono::Utc::now()),
            });
        Ok(())
    }

    async fn recover_secret(
        &self,
        vault: &str,
        name: &str,
        _cancel: &CancellationToken,
    ) -> Result<(), VaultError> {
        self.check(vault, name)?;
        let mut deleted = self.deleted.lock().unwrap();
        let entries = deleted.entry(vault.to_string()).or_default();
        let position = entries
            .iter()
            .position(|s| s.name == name)
            .ok_or_else(|| VaultError::NotFound(name.to_string()))?;
        entries.remove(position);

        let value = self
            .deleted_values
            .lock()
            .unwrap()
            .remove(&(vault.to_string(), name.to_string()))
            .flatten();
        self.live
            .lock()
            .unwrap()
            .entry(vault.to_string())
            .or_default()
            .push(Secret {
                name: name.to_string(),
                value,
            });
        Ok(())
    }
}

//! Contracts of the remote services the engine talks to.
//!
//! Every call takes the request's cancellation token. A cancelled call fails
//! like any other remote failure.

use crate::types::{Credential, ProjectContext, ProjectRef, Status, VariableGroup};
use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("the credential was rejected by the remote service")]
    Unauthorized,

    #[error("project {0} does not exist")]
    ProjectDoesNotExist(String),

    #[error("resource not found: {0}")]
    ResourceNotFound(String),

    #[error("the operation was cancelled")]
    Cancelled,

    #[error("remote call failed: {0}")]
    Remote(String),
}

impl StoreError {
    pub fn status(&self) -> Status {
        match self {
            StoreError::Unauthorized => Status::Unauthorized,
            StoreError::ProjectDoesNotExist(_) => Status::ProjectDoesNotExist,
            StoreError::ResourceNotFound(_) => Status::ResourceNotFound,
            StoreError::Cancelled | StoreError::Remote(_) => Status::Unknown,
        }
    }
}

/// Remote store holding the variable groups of each project.
#[async_trait]
pub trait VariableGroupStore: Send + Sync {
    /// Every variable group of the project. The whole list is materialized.
    async fn list_groups(
        &self,
        context: &ProjectContext,
        cancel: &CancellationToken,
    ) -> Result<Vec<VariableGroup>, StoreError>;

    /// Replaces the stored group identified by `group.id` with `group` as a whole.
    async fn replace_group(
        &self,
        context: &ProjectContext,
        group: &VariableGroup,
        cancel: &CancellationToken,
    ) -> Result<(), StoreError>;
}

/// Lists the projects of an organization.
#[async_trait]
pub trait ProjectDirectory: Send + Sync {
    async fn list_projects(
        &self,
        organization: &str,
        credential: &Credential,
        cancel: &CancellationToken,
    ) -> Result<Vec<ProjectRef>, StoreError>;
}

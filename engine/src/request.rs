use crate::types::{Credential, ProjectContext};
use serde::{Deserialize, Serialize};

/// Project name that asks for the operation to run against every project of the organization.
pub const ALL_PROJECTS: &str = "All";

#[derive(thiserror::Error, Debug, PartialEq, Eq)]
pub enum RequestError {
    #[error("organization must not be empty")]
    EmptyOrganization,

    #[error("project must not be empty")]
    EmptyProject,

    #[error("variable group filter must not be empty")]
    EmptyGroupFilter,

    #[error("a key filter is required for {0}")]
    MissingKeyFilter(&'static str),

    #[error("the key to add must not be empty")]
    EmptyKey,
}

/// Filter criteria shared by every operation.
#[derive(Clone, Debug)]
pub struct FilterRequest {
    pub organization: String,
    /// A project name, or [`ALL_PROJECTS`].
    pub project: String,
    pub user: String,
    pub credential: Credential,
    /// Regex matched against group names.
    pub group_filter: String,
    pub key_filter: Option<String>,
    /// Treat `key_filter` as a regex instead of a literal.
    pub key_is_regex: bool,
    /// Regex matched against variable values.
    pub value_filter: Option<String>,
    /// Only honoured by reads; writes never see vault-backed groups.
    pub include_secrets: bool,
}

impl FilterRequest {
    pub fn targets_all_projects(&self) -> bool {
        self.project == ALL_PROJECTS
    }

    /// Copy of this request scoped to a single project.
    pub fn for_project(&self, project: &str) -> FilterRequest {
        FilterRequest {
            project: project.to_string(),
            ..self.clone()
        }
    }

    pub fn context(&self) -> ProjectContext {
        ProjectContext {
            organization: self.organization.clone(),
            project: self.project.clone(),
            credential: self.credential.clone(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "operation")]
pub enum Operation {
    Get,
    Add { key: String, value: String },
    Update { new_value: String },
    Delete,
}

impl Operation {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Operation::Get => "get",
            Operation::Add { .. } => "add",
            Operation::Update { .. } => "update",
            Operation::Delete => "delete",
        }
    }

    pub fn is_mutation(&self) -> bool {
        !matches!(self, Operation::Get)
    }
}

#[derive(Clone, Debug)]
pub struct Request {
    pub filter: FilterRequest,
    pub operation: Operation,
}

impl Request {
    pub fn new(filter: FilterRequest, operation: Operation) -> Self {
        Request { filter, operation }
    }

    pub fn validate(&self) -> Result<(), RequestError> {
        let filter = &self.filter;
        if filter.organization.trim().is_empty() {
            return Err(RequestError::EmptyOrganization);
        }
        if filter.project.trim().is_empty() {
            return Err(RequestError::EmptyProject);
        }
        if filter.group_filter.is_empty() {
            return Err(RequestError::EmptyGroupFilter);
        }

        let has_key_filter = filter.key_filter.as_deref().is_some_and(|k| !k.is_empty());
        match &self.operation {
            Operation::Update { .. } | Operation::Delete if !has_key_filter => {
                Err(RequestError::MissingKeyFilter(self.operation.as_str()))
            }
            Operation::Add { key, .. } if key.trim().is_empty() => Err(RequestError::EmptyKey),
            _ => Ok(()),
        }
    }
}

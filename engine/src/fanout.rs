//! Entry point of the engine: validates a request and runs it against one
//! project, or against every project of the organization in turn.

use crate::audit::{AuditEntry, AuditError, AuditRecorder};
use crate::outcome::OperationResult;
use crate::predicate::PredicateCompiler;
use crate::request::{FilterRequest, Operation, Request, RequestError};
use crate::service::VariableService;
use crate::store::{ProjectDirectory, VariableGroupStore};
use crate::types::Status;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

pub struct VariableManager {
    service: VariableService,
    projects: Arc<dyn ProjectDirectory>,
}

impl VariableManager {
    pub fn new(
        store: Arc<dyn VariableGroupStore>,
        projects: Arc<dyn ProjectDirectory>,
        compiler: Arc<PredicateCompiler>,
        audit: AuditRecorder,
    ) -> Self {
        VariableManager {
            service: VariableService::new(store, compiler, audit),
            projects,
        }
    }

    pub async fn execute(
        &self,
        request: &Request,
        cancel: &CancellationToken,
    ) -> Result<OperationResult, RequestError> {
        request.validate()?;

        let filter = &request.filter;
        if !filter.targets_all_projects() {
            return Ok(self.service.run(filter, &request.operation, cancel).await);
        }
        Ok(self.run_everywhere(filter, &request.operation, cancel).await)
    }

    /// Runs the operation project by project. Each project is an independent
    /// run; the merged status is that of the last project that did not succeed.
    async fn run_everywhere(
        &self,
        filter: &FilterRequest,
        operation: &Operation,
        cancel: &CancellationToken,
    ) -> OperationResult {
        let projects = match self
            .projects
            .list_projects(&filter.organization, &filter.credential, cancel)
            .await
        {
            Ok(projects) => projects,
            Err(e) => {
                tracing::error!(
                    error = %e,
                    organization = %filter.organization,
                    "Failed to list projects"
                );
                return OperationResult::empty(e.status());
            }
        };

        tracing::debug!(count = projects.len(), "Running against every project");

        let mut merged = OperationResult::empty(Status::Success);
        for project in projects {
            let result = self
                .service
                .run(&filter.for_project(&project.name), operation, cancel)
                .await;
            if !result.status.is_success() {
                tracing::warn!(
                    project = %project.name,
                    status = %result.status,
                    "Project run did not succeed"
                );
            }
            merged.merge(result);
        }
        merged
    }

    pub async fn get(&self, filter: FilterRequest, cancel: &CancellationToken) -> Result<OperationResult, RequestError> {
        self.execute(&Request::new(filter, Operation::Get), cancel).await
    }

    pub async fn add(
        &self,
        filter: FilterRequest,
        key: &str,
        value: &str,
        cancel: &CancellationToken,
    ) -> Result<OperationResult, RequestError> {
        let operation = Operation::Add {
            key: key.to_string(),
            value: value.to_string(),
        };
        self.execute(&Request::new(filter, operation), cancel).await
    }

    pub async fn update(
        &self,
        filter: FilterRequest,
        new_value: &str,
        cancel: &CancellationToken,
    ) -> Result<OperationResult, RequestError> {
        let operation = Operation::Update {
            new_value: new_value.to_string(),
        };
        self.execute(&Request::new(filter, operation), cancel).await
    }

    pub async fn delete(
        &self,
        filter: FilterRequest,
        cancel: &CancellationToken,
    ) -> Result<OperationResult, RequestError> {
        self.execute(&Request::new(filter, Operation::Delete), cancel).await
    }

    /// Audit entries recorded within `[from, to]`.
    pub async fn history(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
        user: Option<&str>,
    ) -> Result<Vec<AuditEntry>, AuditError> {
        self.service.audit().history(from, to, user).await
    }
}

//! REST client for the variable group and project endpoints.
//!
//! Every call is bounded by the configured timeout and abandoned as soon as
//! the request's cancellation token fires. Throttling and gateway errors are
//! retried with exponential backoff.

use crate::config::ClientConfig;
use crate::metrics_defs::{REQUEST_DURATION, REQUEST_FAILED, REQUEST_RETRIES};
use crate::protocol::{ListResponse, TeamProject, VariableGroupDto, VariableGroupParameters};
use async_trait::async_trait;
use engine::store::{ProjectDirectory, StoreError, VariableGroupStore};
use engine::types::{Credential, ProjectContext, ProjectRef, VariableGroup};
use reqwest::{RequestBuilder, Response, StatusCode};
use shared::{counter, histogram};
use std::future::Future;
use std::time::Instant;
use tokio::time::{sleep, timeout};
use tokio_util::sync::CancellationToken;
use url::Url;

const RETRIABLE_STATUS_CODES: &[StatusCode] = &[
    StatusCode::TOO_MANY_REQUESTS,     // 429
    StatusCode::INTERNAL_SERVER_ERROR, // 500
    StatusCode::BAD_GATEWAY,           // 502
    StatusCode::SERVICE_UNAVAILABLE,   // 503
    StatusCode::GATEWAY_TIMEOUT,       // 504
];

// The service answers a rejected token with a 203 sign-in page instead of a 401.
const UNAUTHORIZED_STATUS_CODES: &[StatusCode] = &[
    StatusCode::UNAUTHORIZED,
    StatusCode::FORBIDDEN,
    StatusCode::NON_AUTHORITATIVE_INFORMATION,
];

#[derive(thiserror::Error, Debug)]
pub enum ClientError {
    #[error("HTTP client error: {0}")]
    ReqwestError(#[from] reqwest::Error),
    #[error("invalid URL: {0}")]
    InvalidUrl(String),
    #[error("unexpected status code {0}")]
    UnexpectedStatus(StatusCode),
    #[error("retries exceeded, last status code {0}")]
    RetriesExceeded(StatusCode),
    #[error("request timed out")]
    Timeout,
    #[error("request cancelled")]
    Cancelled,
}

impl ClientError {
    fn status_code(&self) -> Option<StatusCode> {
        match self {
            ClientError::UnexpectedStatus(code) | ClientError::RetriesExceeded(code) => Some(*code),
            _ => None,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Endpoint {
    ListGroups,
    ReplaceGroup,
    ListProjects,
}

impl Endpoint {
    fn as_str(self) -> &'static str {
        match self {
            Endpoint::ListGroups => "list_groups",
            Endpoint::ReplaceGroup => "replace_group",
            Endpoint::ListProjects => "list_projects",
        }
    }

    /// Maps a failed call to the engine's error vocabulary. `subject` names
    /// what a 404 refers to on this endpoint.
    fn store_error(self, error: ClientError, subject: &str) -> StoreError {
        if let ClientError::Cancelled = error {
            return StoreError::Cancelled;
        }
        match error.status_code() {
            Some(code) if UNAUTHORIZED_STATUS_CODES.contains(&code) => StoreError::Unauthorized,
            Some(StatusCode::NOT_FOUND) if self == Endpoint::ListGroups => {
                StoreError::ProjectDoesNotExist(subject.to_string())
            }
            Some(StatusCode::NOT_FOUND) if self == Endpoint::ReplaceGroup => {
                StoreError::ResourceNotFound(subject.to_string())
            }
            _ => StoreError::Remote(error.to_string()),
        }
    }
}

pub struct DevOpsClient {
    client: reqwest::Client,
    config: ClientConfig,
}

impl DevOpsClient {
    pub fn new(config: ClientConfig) -> Self {
        DevOpsClient {
            client: reqwest::Client::new(),
            config,
        }
    }

    fn url(&self, segments: &[&str]) -> Result<Url, ClientError> {
        let mut url = self.config.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| ClientError::InvalidUrl(self.config.base_url.to_string()))?
            .pop_if_empty()
            .extend(segments);
        url.query_pairs_mut()
            .append_pair("api-version", &self.config.api_version);
        Ok(url)
    }

    /// Runs `future` unless the token fires or the timeout elapses first.
    async fn bounded<F, T>(&self, future: F, cancel: &CancellationToken) -> Result<T, ClientError>
    where
        F: Future<Output = Result<T, reqwest::Error>>,
    {
        tokio::select! {
            _ = cancel.cancelled() => Err(ClientError::Cancelled),
            result = timeout(self.config.timeout(), future) => match result {
                Ok(result) => Ok(result?),
                Err(_) => Err(ClientError::Timeout),
            },
        }
    }

    async fn send<F>(
        &self,
        endpoint: Endpoint,
        build: F,
        cancel: &CancellationToken,
    ) -> Result<Response, ClientError>
    where
        F: Fn() -> RequestBuilder,
    {
        let mut retries = 0;

        loop {
            if cancel.is_cancelled() {
                return Err(ClientError::Cancelled);
            }

            let response = self.bounded(build().send(), cancel).await?;
            let status = response.status();

            if status.is_success() && !UNAUTHORIZED_STATUS_CODES.contains(&status) {
                return Ok(response);
            }

            if !RETRIABLE_STATUS_CODES.contains(&status) {
                return Err(ClientError::UnexpectedStatus(status));
            }
            if retries >= self.config.max_retries {
                return Err(ClientError::RetriesExceeded(status));
            }

            let delay = self.config.backoff(retries);
            tracing::debug!(
                endpoint = endpoint.as_str(),
                status = status.as_u16(),
                retries,
                delay_ms = delay.as_millis() as u64,
                "Retrying request"
            );
            counter!(REQUEST_RETRIES, "endpoint" => endpoint.as_str()).increment(1);
            tokio::select! {
                _ = cancel.cancelled() => return Err(ClientError::Cancelled),
                _ = sleep(delay) => {}
            }
            retries += 1;
        }
    }

    fn record<T>(&self, endpoint: Endpoint, started: Instant, result: &Result<T, ClientError>) {
        histogram!(REQUEST_DURATION, "endpoint" => endpoint.as_str())
            .record(started.elapsed().as_secs_f64());
        if let Err(e) = result {
            let status = e
                .status_code()
                .map(|code| code.as_u16().to_string())
                .unwrap_or_else(|| "none".to_string());
            counter!(REQUEST_FAILED, "endpoint" => endpoint.as_str(), "status" => status).increment(1);
            tracing::warn!(error = %e, endpoint = endpoint.as_str(), "Request failed");
        }
    }

    async fn fetch_groups(
        &self,
        context: &ProjectContext,
        cancel: &CancellationToken,
    ) -> Result<Vec<VariableGroup>, ClientError> {
        let url = self.url(&[
            &context.organization,
            &context.project,
            "_apis",
            "distributedtask",
            "variablegroups",
        ])?;
        let pat = context.credential.expose();

        let response = self
            .send(
                Endpoint::ListGroups,
                || self.client.get(url.clone()).basic_auth("", Some(pat)),
                cancel,
            )
            .await?;
        let body: ListResponse<VariableGroupDto> = self.bounded(response.json(), cancel).await?;

        Ok(body.value.into_iter().map(VariableGroup::from).collect())
    }

    async fn put_group(
        &self,
        context: &ProjectContext,
        group: &VariableGroup,
        cancel: &CancellationToken,
    ) -> Result<(), ClientError> {
        let id = group.id.to_string();
        let url = self.url(&[
            &context.organization,
            "_apis",
            "distributedtask",
            "variablegroups",
            &id,
        ])?;
        let body = VariableGroupParameters::new(group, &context.project);
        let pat = context.credential.expose();

        self.send(
            Endpoint::ReplaceGroup,
            || self.client.put(url.clone()).basic_auth("", Some(pat)).json(&body),
            cancel,
        )
        .await?;
        Ok(())
    }

    async fn fetch_projects(
        &self,
        organization: &str,
        credential: &Credential,
        cancel: &CancellationToken,
    ) -> Result<Vec<ProjectRef>, ClientError> {
        let url = self.url(&[organization, "_apis", "projects"])?;
        let pat = credential.expose();

        let response = self
            .send(
                Endpoint::ListProjects,
                || self.client.get(url.clone()).basic_auth("", Some(pat)),
                cancel,
            )
            .await?;
        let body: ListResponse<TeamProject> = self.bounded(response.json(), cancel).await?;

        Ok(body.value.into_iter().map(ProjectRef::from).collect())
    }
}

#[async_trait]
impl VariableGroupStore for DevOpsClient {
    async fn list_groups(
        &self,
        context: &ProjectContext,
        cancel: &CancellationToken,
    ) -> Result<Vec<VariableGroup>, StoreError> {
        let started = Instant::now();
        let result = self.fetch_groups(context, cancel).await;
        self.record(Endpoint::ListGroups, started, &result);
        result.map_err(|e| Endpoint::ListGroups.store_error(e, &context.project))
    }

    async fn replace_group(
        &self,
        context: &ProjectContext,
        group: &VariableGroup,
        cancel: &CancellationToken,
    ) -> Result<(), StoreError> {
        let started = Instant::now();
        let result = self.put_group(context, group, cancel).await;
        self.record(Endpoint::ReplaceGroup, started, &result);
        result.map_err(|e| Endpoint::ReplaceGroup.store_error(e, &group.name))
    }
}

#[async_trait]
impl ProjectDirectory for DevOpsClient {
    async fn list_projects(
        &self,
        organization: &str,
        credential: &Credential,
        cancel: &CancellationToken,
    ) -> Result<Vec<ProjectRef>, StoreError> {
        let started = Instant::now();
        let result = self.fetch_projects(organization, credential, cancel).await;
        self.record(Endpoint::ListProjects, started, &result);
        result.map_err(|e| Endpoint::ListProjects.store_error(e, organization))
    }
}

//! In-process stand-in for the remote service, served by axum on an
//! ephemeral port.

use axum::{
    Json, Router,
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode, header::AUTHORIZATION},
    response::{IntoResponse, Response},
    routing::{get, put},
};
use serde_json::{Value, json};
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use tokio::net::TcpListener;
use url::Url;

#[derive(Clone, Debug)]
pub struct SeenRequest {
    pub path: String,
    pub api_version: Option<String>,
    pub authorization: Option<String>,
}

#[derive(Default)]
struct MockState {
    groups: Mutex<HashMap<String, Vec<Value>>>,
    failures: Mutex<VecDeque<StatusCode>>,
    requests: Mutex<Vec<SeenRequest>>,
    puts: Mutex<Vec<(i64, Value)>>,
}

impl MockState {
    /// Records the request and pops the next injected failure, if any.
    fn observe(&self, path: String, query: &HashMap<String, String>, headers: &HeaderMap) -> Option<StatusCode> {
        self.requests.lock().unwrap().push(SeenRequest {
            path,
            api_version: query.get("api-version").cloned(),
            authorization: headers
                .get(AUTHORIZATION)
                .and_then(|value| value.to_str().ok())
                .map(String::from),
        });
        self.failures.lock().unwrap().pop_front()
    }
}

pub struct MockDevOps {
    url: Url,
    state: Arc<MockState>,
}

impl MockDevOps {
    pub async fn spawn() -> Self {
        let state = Arc::new(MockState::default());
        let app = Router::new()
            .route(
                "/{org}/{project}/_apis/distributedtask/variablegroups",
                get(list_groups),
            )
            .route("/{org}/_apis/distributedtask/variablegroups/{id}", put(replace_group))
            .route("/{org}/_apis/projects", get(list_projects))
            .with_state(state.clone());

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        MockDevOps {
            url: Url::parse(&format!("http://{addr}")).unwrap(),
            state,
        }
    }

    pub fn url(&self) -> Url {
        self.url.clone()
    }

    pub fn set_groups(&self, project: &str, groups: Value) {
        let groups = groups.as_array().cloned().unwrap_or_default();
        self.state.groups.lock().unwrap().insert(project.to_string(), groups);
    }

    /// Answers the next request with `status` instead of serving it.
    pub fn fail_next(&self, status: StatusCode) {
        self.state.failures.lock().unwrap().push_back(status);
    }

    pub fn requests(&self) -> Vec<SeenRequest> {
        self.state.requests.lock().unwrap().clone()
    }

    pub fn puts(&self) -> Vec<(i64, Value)> {
        self.state.puts.lock().unwrap().clone()
    }
}

fn list(values: Vec<Value>) -> Response {
    Json(json!({ "count": values.len(), "value": values })).into_response()
}

async fn list_groups(
    State(state): State<Arc<MockState>>,
    Path((org, project)): Path<(String, String)>,
    Query(query): Query<HashMap<String, String>>,
    headers: HeaderMap,
) -> Response {
    if let Some(status) = state.observe(format!("/{org}/{project}/variablegroups"), &query, &headers) {
        return status.into_response();
    }
    match state.groups.lock().unwrap().get(&project) {
        Some(groups) => list(groups.clone()),
        None => StatusCode::NOT_FOUND.into_response(),
    }
}

async fn replace_group(
    State(state): State<Arc<MockState>>,
    Path((org, id)): Path<(String, i64)>,
    Query(query): Query<HashMap<String, String>>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    if let Some(status) = state.observe(format!("/{org}/variablegroups/{id}"), &query, &headers) {
        return status.into_response();
    }
    state.puts.lock().unwrap().push((id, body.clone()));

    let known = state
        .groups
        .lock()
        .unwrap()
        .values()
        .flatten()
        .any(|group| group["id"] == id);
    if !known {
        return StatusCode::NOT_FOUND.into_response();
    }
    Json(body).into_response()
}

async fn list_projects(
    State(state): State<Arc<MockState>>,
    Path(org): Path<String>,
    Query(query): Query<HashMap<String, String>>,
    headers: HeaderMap,
) -> Response {
    if let Some(status) = state.observe(format!("/{org}/projects"), &query, &headers) {
        return status.into_response();
    }
    let projects = state
        .groups
        .lock()
        .unwrap()
        .keys()
        .enumerate()
        .map(|(i, name)| json!({ "id": i.to_string(), "name": name }))
        .collect();
    list(projects)
}

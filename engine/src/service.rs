//! The per-project pipeline: list, filter, mutate, push, aggregate, audit.

use crate::audit::{AuditEntry, AuditKind, AuditRecorder};
use crate::filter::{VariableFilter, filter_excluding_secrets, filter_including_secrets, has_matching_key};
use crate::metrics_defs::{GROUP_PUSH_ATTEMPTED, GROUP_PUSH_FAILED, OPERATION_DURATION};
use crate::mutation::{Change, apply_add, apply_delete, apply_update};
use crate::outcome::{OperationResult, Tally};
use crate::predicate::{MatchMode, Predicate, PredicateCompiler, PredicateError};
use crate::request::{FilterRequest, Operation};
use crate::store::VariableGroupStore;
use crate::types::{MatchedVariable, ProjectContext, Status, VariableGroup};
use shared::{counter, histogram};
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;

/// Compiled form of a request's filters.
struct Predicates {
    group: Predicate,
    variables: VariableFilter,
}

impl Predicates {
    fn compile(
        compiler: &PredicateCompiler,
        filter: &FilterRequest,
        operation: &Operation,
    ) -> Result<Predicates, PredicateError> {
        let group = compiler.compile(&filter.group_filter, MatchMode::Regex)?;

        // Additions only look at keys, and their key filter is always a regex.
        let (key_mode, value_filter) = match operation {
            Operation::Add { .. } => (MatchMode::Regex, None),
            _ => (
                MatchMode::from_regex_flag(filter.key_is_regex),
                filter.value_filter.as_deref(),
            ),
        };

        let value = value_filter
            .map(|pattern| compiler.compile(pattern, MatchMode::Regex))
            .transpose()?;
        let key = filter
            .key_filter
            .as_deref()
            .filter(|pattern| !pattern.is_empty())
            .map(|pattern| compiler.compile(pattern, key_mode))
            .transpose()?;

        Ok(Predicates {
            group,
            variables: VariableFilter::new(key, value),
        })
    }
}

pub struct VariableService {
    store: Arc<dyn VariableGroupStore>,
    compiler: Arc<PredicateCompiler>,
    audit: AuditRecorder,
}

impl VariableService {
    pub fn new(
        store: Arc<dyn VariableGroupStore>,
        compiler: Arc<PredicateCompiler>,
        audit: AuditRecorder,
    ) -> Self {
        VariableService {
            store,
            compiler,
            audit,
        }
    }

    pub fn audit(&self) -> &AuditRecorder {
        &self.audit
    }

    /// Runs one operation against the single project named in `filter`.
    pub async fn run(
        &self,
        filter: &FilterRequest,
        operation: &Operation,
        cancel: &CancellationToken,
    ) -> OperationResult {
        let started = Instant::now();
        let result = self.run_inner(filter, operation, cancel).await;

        histogram!(
            OPERATION_DURATION,
            "operation" => operation.as_str(),
            "status" => result.status.as_str()
        )
        .record(started.elapsed().as_secs_f64());
        result
    }

    async fn run_inner(
        &self,
        filter: &FilterRequest,
        operation: &Operation,
        cancel: &CancellationToken,
    ) -> OperationResult {
        let context = filter.context();

        let groups = match self.store.list_groups(&context, cancel).await {
            Ok(groups) => groups,
            Err(e) => {
                tracing::error!(
                    error = %e,
                    organization = %context.organization,
                    project = %context.project,
                    "Failed to list variable groups"
                );
                return OperationResult::empty(e.status());
            }
        };
        let predicates = match Predicates::compile(&self.compiler, filter, operation) {
            Ok(predicates) => predicates,
            Err(e) => {
                tracing::error!(error = %e, pattern = %e.pattern, "Couldn't compile filter");
                return OperationResult::empty(Status::Success);
            }
        };

        let (tally, variables) = match operation {
            Operation::Get => {
                let variables = read(&context.project, groups, &predicates, filter.include_secrets);
                return OperationResult::new(Status::Success, variables);
            }
            Operation::Add { key, value } => {
                let mut candidates = filter_excluding_secrets(groups, &predicates.group);
                if let Some(key_predicate) = &predicates.variables.key {
                    candidates.retain(|group| has_matching_key(group, key_predicate));
                }
                self.push_changes(&context, operation, candidates, cancel, |group| {
                    apply_add(group, key, value)
                })
                .await
            }
            Operation::Update { new_value } => {
                let candidates = filter_excluding_secrets(groups, &predicates.group);
                self.push_changes(&context, operation, candidates, cancel, |group| {
                    apply_update(group, &predicates.variables, new_value)
                })
                .await
            }
            Operation::Delete => {
                let candidates = filter_excluding_secrets(groups, &predicates.group);
                self.push_changes(&context, operation, candidates, cancel, |group| {
                    apply_delete(group, &predicates.variables)
                })
                .await
            }
        };

        let status = tally.status();
        if status.is_success()
            && tally.attempted() > 0
            && let Some(entry) = audit_entry(filter, operation)
        {
            self.audit.record(entry).await;
        }

        tracing::info!(
            operation = operation.as_str(),
            project = %context.project,
            attempted = tally.attempted(),
            succeeded = tally.succeeded(),
            status = %status,
            "Operation finished"
        );
        OperationResult::new(status, variables)
    }

    /// Applies `apply` to each candidate and pushes every group it changed.
    /// Pushes are sequential; a failed push is counted and the loop carries on.
    async fn push_changes<F>(
        &self,
        context: &ProjectContext,
        operation: &Operation,
        candidates: Vec<VariableGroup>,
        cancel: &CancellationToken,
        apply: F,
    ) -> (Tally, Vec<MatchedVariable>)
    where
        F: Fn(&mut VariableGroup) -> Vec<Change>,
    {
        let mut tally = Tally::new();
        let mut matched = Vec::new();

        for mut group in candidates {
            let changes = apply(&mut group);
            if changes.is_empty() {
                continue;
            }
            for change in &changes {
                tracing::info!(
                    group = %group.name,
                    key = %change.key,
                    old_value = ?change.before,
                    new_value = ?change.after,
                    "Variable changed"
                );
            }

            counter!(GROUP_PUSH_ATTEMPTED, "operation" => operation.as_str()).increment(1);
            match self.store.replace_group(context, &group, cancel).await {
                Ok(()) => {
                    tracing::debug!(group = %group.name, "Variable group pushed");
                    tally.record(true);
                    matched.extend(changes.iter().map(|c| c.to_matched(&context.project, &group)));
                }
                Err(e) => {
                    counter!(GROUP_PUSH_FAILED, "operation" => operation.as_str()).increment(1);
                    tracing::warn!(
                        error = %e,
                        group = %group.name,
                        project = %context.project,
                        "Failed to push variable group"
                    );
                    tally.record(false);
                }
            }
        }

        (tally, matched)
    }
}

fn read(
    project: &str,
    groups: Vec<VariableGroup>,
    predicates: &Predicates,
    include_secrets: bool,
) -> Vec<MatchedVariable> {
    let selected = if include_secrets {
        filter_including_secrets(groups, &predicates.group)
    } else {
        filter_excluding_secrets(groups, &predicates.group)
    };
    selected
        .iter()
        .flat_map(|group| predicates.variables.collect(project, group))
        .collect()
}

fn audit_entry(filter: &FilterRequest, operation: &Operation) -> Option<AuditEntry> {
    let key_filter = filter.key_filter.as_deref().unwrap_or_default();
    let entry = match operation {
        Operation::Get => return None,
        Operation::Add { key, value } => AuditEntry::new(
            AuditKind::Addition {
                value: value.clone(),
            },
            filter,
            key,
        ),
        Operation::Update { new_value } => AuditEntry::new(
            AuditKind::Edition {
                new_value: new_value.clone(),
            },
            filter,
            key_filter,
        ),
        Operation::Delete => AuditEntry::new(AuditKind::Deletion, filter, key_filter),
    };
    Some(entry)
}

//! Aggregation of per-group push outcomes into one status, and merging of
//! per-project results.

use crate::types::{MatchedVariable, Status};
use serde::{Deserialize, Serialize};

/// Counts of groups that needed a push and groups whose push went through.
///
/// A batch is successful exactly when every attempted push succeeded; a batch
/// with nothing to push is trivially successful.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Tally {
    attempted: usize,
    succeeded: usize,
}

impl Tally {
    pub fn new() -> Self {
        Tally::default()
    }

    pub fn record(&mut self, succeeded: bool) {
        self.attempted += 1;
        if succeeded {
            self.succeeded += 1;
        }
    }

    pub fn attempted(&self) -> usize {
        self.attempted
    }

    pub fn succeeded(&self) -> usize {
        self.succeeded
    }

    pub fn status(&self) -> Status {
        if self.attempted == self.succeeded {
            Status::Success
        } else {
            Status::Unknown
        }
    }
}

/// What a single operation reports back: one status and every matched variable.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperationResult {
    pub status: Status,
    pub variables: Vec<MatchedVariable>,
}

/// A group that contributed to a result.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupSummary {
    pub project: String,
    pub group: String,
}

impl OperationResult {
    pub fn new(status: Status, variables: Vec<MatchedVariable>) -> Self {
        OperationResult { status, variables }
    }

    pub fn empty(status: Status) -> Self {
        OperationResult::new(status, Vec::new())
    }

    /// Folds another project's result into this one.
    ///
    /// Variables are concatenated without deduplication. A non-successful
    /// status replaces the running status, so the last failure wins; variables
    /// gathered before it are kept.
    pub fn merge(&mut self, other: OperationResult) {
        self.variables.extend(other.variables);
        if !other.status.is_success() {
            self.status = other.status;
        }
    }

    /// Distinct `(project, group)` pairs, in first-seen order.
    pub fn groups(&self) -> Vec<GroupSummary> {
        let mut groups: Vec<GroupSummary> = Vec::new();
        for variable in &self.variables {
            let seen = groups
                .iter()
                .any(|g| g.project == variable.project && g.group == variable.group);
            if !seen {
                groups.push(GroupSummary {
                    project: variable.project.clone(),
                    group: variable.group.clone(),
                });
            }
        }
        groups
    }
}

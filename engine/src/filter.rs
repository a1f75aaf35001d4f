//! Selection of variable groups and of the entries inside them.

use crate::predicate::Predicate;
use crate::types::{MatchedVariable, Variable, VariableGroup};

/// Groups whose name matches, whatever their kind. Only reads use this.
pub fn filter_including_secrets(groups: Vec<VariableGroup>, name: &Predicate) -> Vec<VariableGroup> {
    groups
        .into_iter()
        .filter(|group| name.is_match(&group.name))
        .collect()
}

/// Groups whose name matches and whose values are not resolved from a vault.
/// Every write path selects its candidates through this function.
pub fn filter_excluding_secrets(groups: Vec<VariableGroup>, name: &Predicate) -> Vec<VariableGroup> {
    groups
        .into_iter()
        .filter(|group| !group.kind.is_vault_backed() && name.is_match(&group.name))
        .collect()
}

/// Key and value predicates applied to the entries of a selected group.
///
/// The key predicate runs first; the value predicate only sees entries whose
/// key already matched. A missing predicate matches everything.
#[derive(Clone, Debug, Default)]
pub struct VariableFilter {
    pub key: Option<Predicate>,
    pub value: Option<Predicate>,
}

impl VariableFilter {
    pub fn new(key: Option<Predicate>, value: Option<Predicate>) -> Self {
        VariableFilter { key, value }
    }

    pub fn matches(&self, key: &str, variable: &Variable) -> bool {
        if let Some(predicate) = &self.key
            && !predicate.is_match(key)
        {
            return false;
        }
        match &self.value {
            Some(predicate) => predicate.is_match(variable.value_or_empty()),
            None => true,
        }
    }

    /// Keys of the matching entries, in group order.
    pub fn matching_keys(&self, group: &VariableGroup) -> Vec<String> {
        group
            .variables
            .iter()
            .filter(|(key, variable)| self.matches(key, variable))
            .map(|(key, _)| key.clone())
            .collect()
    }

    pub fn collect(&self, project: &str, group: &VariableGroup) -> Vec<MatchedVariable> {
        group
            .variables
            .iter()
            .filter(|(key, variable)| self.matches(key, variable))
            .map(|(key, variable)| MatchedVariable::from_entry(project, group, key, variable))
            .collect()
    }
}

/// Whether at least one key of the group matches.
pub fn has_matching_key(group: &VariableGroup, key: &Predicate) -> bool {
    group.variables.keys().any(|candidate| key.is_match(candidate))
}

//! In-memory changes applied to a selected group before it is pushed back.
//!
//! Each function returns the list of changes it made; an empty list means the
//! group is untouched and must not be pushed. Vault-backed groups are never
//! changed.

use crate::filter::VariableFilter;
use crate::types::{MatchedVariable, Variable, VariableGroup};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Change {
    pub key: String,
    pub before: Option<String>,
    pub after: Option<String>,
}

impl Change {
    /// The value reported back to the caller: the new value, or the removed one.
    pub fn reported_value(&self) -> Option<&str> {
        self.after.as_deref().or(self.before.as_deref())
    }

    pub fn to_matched(&self, project: &str, group: &VariableGroup) -> MatchedVariable {
        MatchedVariable {
            project: project.to_string(),
            group: group.name.clone(),
            key: self.key.clone(),
            value: self.reported_value().map(str::to_string),
            vault: None,
        }
    }
}

/// Inserts `key`, replacing any existing entry with the same name.
pub fn apply_add(group: &mut VariableGroup, key: &str, value: &str) -> Vec<Change> {
    if group.kind.is_vault_backed() {
        return Vec::new();
    }
    let previous = group.variables.insert(key.to_string(), Variable::new(value));
    vec![Change {
        key: key.to_string(),
        before: previous.and_then(|v| v.value),
        after: Some(value.to_string()),
    }]
}

/// Sets every matching entry to `new_value`. Entries already holding the
/// new value are left alone, so re-running an update pushes nothing.
pub fn apply_update(group: &mut VariableGroup, filter: &VariableFilter, new_value: &str) -> Vec<Change> {
    if group.kind.is_vault_backed() {
        return Vec::new();
    }
    let mut changes = Vec::new();
    for (key, variable) in group.variables.iter_mut() {
        if !filter.matches(key, variable) || variable.value.as_deref() == Some(new_value) {
            continue;
        }
        let before = variable.value.replace(new_value.to_string());
        changes.push(Change {
            key: key.clone(),
            before,
            after: Some(new_value.to_string()),
        });
    }
    changes
}

/// Removes every matching entry.
pub fn apply_delete(group: &mut VariableGroup, filter: &VariableFilter) -> Vec<Change> {
    if group.kind.is_vault_backed() {
        return Vec::new();
    }
    filter
        .matching_keys(group)
        .into_iter()
        .filter_map(|key| {
            group.variables.shift_remove(&key).map(|removed| Change {
                key,
                before: removed.value,
                after: None,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::predicate::{MatchMode, PredicateCompiler};
    use crate::types::GroupKind;

    fn group() -> VariableGroup {
        VariableGroup::new(1, "G1", GroupKind::Plain)
            .with_variable("Key1", "A")
            .with_variable("Key2", "B")
            .with_variable("Other", "A")
    }

    fn key_filter(pattern: &str, value: Option<&str>) -> VariableFilter {
        let compiler = PredicateCompiler::default();
        VariableFilter::new(
            Some(compiler.compile(pattern, MatchMode::Regex).unwrap()),
            value.map(|v| compiler.compile(v, MatchMode::Regex).unwrap()),
        )
    }

    #[test]
    fn test_update_every_matching_key() {
        let mut group = group();
        let changes = apply_update(&mut group, &key_filter("Key.*", None), "Z");

        assert_eq!(changes.len(), 2);
        assert_eq!(group.variables["Key1"].value.as_deref(), Some("Z"));
        assert_eq!(group.variables["Key2"].value.as_deref(), Some("Z"));
        assert_eq!(group.variables["Other"].value.as_deref(), Some("A"));
        assert_eq!(changes[0].before.as_deref(), Some("A"));
        assert_eq!(changes[1].reported_value(), Some("Z"));
    }

    #[test]
    fn test_update_with_value_filter() {
        let mut group = group();
        let changes = apply_update(&mut group, &key_filter("Key.*", Some("^b$")), "Z");

        assert_eq!(changes.len(), 1);
        assert_eq!(changes[0].key, "Key2");
        assert_eq!(group.variables["Key1"].value.as_deref(), Some("A"));
    }

    #[test]
    fn test_update_is_idempotent() {
        let mut group = group();
        let filter = key_filter("Key.*", None);
        assert_eq!(apply_update(&mut group, &filter, "Z").len(), 2);
        assert!(apply_update(&mut group, &filter, "Z").is_empty());
    }

    #[test]
    fn test_update_mixed_matches_still_changes_group() {
        // Key1 already holds the target; Key2 does not. Any change means push.
        let mut group = VariableGroup::new(1, "G1", GroupKind::Plain)
            .with_variable("Key1", "Z")
            .with_variable("Key2", "B");
        let changes = apply_update(&mut group, &key_filter("Key.*", None), "Z");

        assert_eq!(changes.len(), 1);
        assert_eq!(changes[0].key, "Key2");
    }

    #[test]
    fn test_delete() {
        let mut group = group();
        let changes = apply_delete(&mut group, &key_filter("^key", None));

        assert_eq!(changes.len(), 2);
        assert_eq!(changes[0].reported_value(), Some("A"));
        assert_eq!(group.variables.keys().collect::<Vec<_>>(), vec!["Other"]);

        assert!(apply_delete(&mut group, &key_filter("^key", None)).is_empty());
    }

    #[test]
    fn test_add_overwrites_existing() {
        let mut group = group();
        let changes = apply_add(&mut group, "Key1", "new");
        assert_eq!(changes[0].before.as_deref(), Some("A"));
        assert_eq!(group.variables["Key1"].value.as_deref(), Some("new"));

        let changes = apply_add(&mut group, "Fresh", "v");
        assert_eq!(changes[0].before, None);
        assert_eq!(group.variables.len(), 4);
        // New keys land at the end, existing order is kept.
        assert_eq!(group.variables.keys().last().map(String::as_str), Some("Fresh"));
    }

    #[test]
    fn test_vault_backed_groups_are_never_changed() {
        let mut vault_group = VariableGroup::new(
            9,
            "kv",
            GroupKind::VaultBacked {
                vault: "kv".into(),
            },
        )
        .with_variable("Key1", "A");
        let before = vault_group.clone();

        assert!(apply_add(&mut vault_group, "k", "v").is_empty());
        assert!(apply_update(&mut vault_group, &key_filter(".*", None), "Z").is_empty());
        assert!(apply_delete(&mut vault_group, &key_filter(".*", None)).is_empty());
        assert_eq!(vault_group, before);
    }

    #[test]
    fn test_to_matched() {
        let group = group();
        let change = Change {
            key: "Key1".into(),
            before: Some("A".into()),
            after: None,
        };
        let matched = change.to_matched("web", &group);
        assert_eq!(matched.group, "G1");
        assert_eq!(matched.value.as_deref(), Some("A"));
    }
}

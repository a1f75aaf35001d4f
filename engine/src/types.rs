use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifier of a variable group, unique within an organization and project.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GroupId(pub i64);

impl fmt::Display for GroupId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Whether the values of a group live in the group itself or in an external vault.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", tag = "type")]
pub enum GroupKind {
    Plain,
    VaultBacked { vault: String },
}

impl GroupKind {
    pub fn is_vault_backed(&self) -> bool {
        matches!(self, GroupKind::VaultBacked { .. })
    }

    pub fn vault(&self) -> Option<&str> {
        match self {
            GroupKind::Plain => None,
            GroupKind::VaultBacked { vault } => Some(vault),
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Variable {
    /// `None` only when the store hides a secret value.
    pub value: Option<String>,
    #[serde(default)]
    pub is_secret: bool,
}

impl Variable {
    pub fn new<V: Into<String>>(value: V) -> Self {
        Variable {
            value: Some(value.into()),
            is_secret: false,
        }
    }

    /// The value used for comparisons; a hidden value compares as empty.
    pub fn value_or_empty(&self) -> &str {
        self.value.as_deref().unwrap_or_default()
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct VariableGroup {
    pub id: GroupId,
    pub name: String,
    pub kind: GroupKind,
    pub variables: IndexMap<String, Variable>,
    pub description: Option<String>,
}

impl VariableGroup {
    pub fn new<N: Into<String>>(id: i64, name: N, kind: GroupKind) -> Self {
        VariableGroup {
            id: GroupId(id),
            name: name.into(),
            kind,
            variables: IndexMap::new(),
            description: None,
        }
    }

    pub fn with_variable<K, V>(mut self, key: K, value: V) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        self.variables.insert(key.into(), Variable::new(value));
        self
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectRef {
    pub id: String,
    pub name: String,
}

/// Outcome vocabulary shared by every remote call and every engine operation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Status {
    Success,
    AlreadyContains,
    Unauthorized,
    ResourceNotFound,
    ProjectDoesNotExist,
    NoSubscriptionsFound,
    Unknown,
}

impl Status {
    pub fn is_success(self) -> bool {
        self == Status::Success
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Status::Success => "success",
            Status::AlreadyContains => "already_contains",
            Status::Unauthorized => "unauthorized",
            Status::ResourceNotFound => "resource_not_found",
            Status::ProjectDoesNotExist => "project_does_not_exist",
            Status::NoSubscriptionsFound => "no_subscriptions_found",
            Status::Unknown => "unknown",
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One variable selected by a filter, as reported back to the caller.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchedVariable {
    pub project: String,
    pub group: String,
    pub key: String,
    /// Never populated for vault-backed groups.
    pub value: Option<String>,
    /// Only populated for vault-backed groups.
    pub vault: Option<String>,
}

impl MatchedVariable {
    pub fn from_entry(project: &str, group: &VariableGroup, key: &str, variable: &Variable) -> Self {
        match &group.kind {
            GroupKind::VaultBacked { vault } => MatchedVariable {
                project: project.to_string(),
                group: group.name.clone(),
                key: key.to_string(),
                value: None,
                vault: Some(vault.clone()),
            },
            GroupKind::Plain => MatchedVariable {
                project: project.to_string(),
                group: group.name.clone(),
                key: key.to_string(),
                value: Some(variable.value_or_empty().to_string()),
                vault: None,
            },
        }
    }
}

/// Personal access token used against the remote services.
#[derive(Clone, PartialEq, Eq)]
pub struct Credential(String);

impl Credential {
    pub fn new<S: Into<String>>(token: S) -> Self {
        Credential(token.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Credential(***)")
    }
}

/// Connection context for a single project. Each request carries its own.
#[derive(Clone, Debug)]
pub struct ProjectContext {
    pub organization: String,
    pub project: String,
    pub credential: Credential,
}

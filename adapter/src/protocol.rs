//! Wire format of the variable group and project endpoints.

use engine::types::{GroupId, GroupKind, ProjectRef, Variable, VariableGroup};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

pub const PLAIN_GROUP_TYPE: &str = "Vsts";
pub const VAULT_GROUP_TYPE: &str = "AzureKeyVault";

/// The `{ count, value }` envelope wrapping every list response.
#[derive(Debug, Serialize, Deserialize)]
pub struct ListResponse<T> {
    #[serde(default)]
    pub count: usize,
    pub value: Vec<T>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VariableValue {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    #[serde(default)]
    pub is_secret: bool,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderData {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vault: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VariableGroupDto {
    pub id: i64,
    pub name: String,
    #[serde(rename = "type", default)]
    pub group_type: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub variables: IndexMap<String, VariableValue>,
    #[serde(default)]
    pub provider_data: Option<ProviderData>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectReference {
    pub name: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VariableGroupProjectReference {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub project_reference: ProjectReference,
}

/// Body of a replace call: the whole group plus the project it belongs to.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VariableGroupParameters {
    pub name: String,
    #[serde(rename = "type")]
    pub group_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub variables: IndexMap<String, VariableValue>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub provider_data: Option<ProviderData>,
    pub variable_group_project_references: Vec<VariableGroupProjectReference>,
}

impl VariableGroupParameters {
    pub fn new(group: &VariableGroup, project: &str) -> Self {
        let (group_type, provider_data) = match &group.kind {
            GroupKind::Plain => (PLAIN_GROUP_TYPE, None),
            GroupKind::VaultBacked { vault } => (
                VAULT_GROUP_TYPE,
                Some(ProviderData {
                    vault: Some(vault.clone()),
                }),
            ),
        };

        VariableGroupParameters {
            name: group.name.clone(),
            group_type: group_type.to_string(),
            description: group.description.clone(),
            variables: group
                .variables
                .iter()
                .map(|(key, variable)| {
                    (
                        key.clone(),
                        VariableValue {
                            value: variable.value.clone(),
                            is_secret: variable.is_secret,
                        },
                    )
                })
                .collect(),
            provider_data,
            variable_group_project_references: vec![VariableGroupProjectReference {
                name: group.name.clone(),
                description: group.description.clone(),
                project_reference: ProjectReference {
                    name: project.to_string(),
                },
            }],
        }
    }
}

impl From<VariableGroupDto> for VariableGroup {
    fn from(dto: VariableGroupDto) -> Self {
        let vault = dto.provider_data.and_then(|data| data.vault);
        let kind = match (dto.group_type.as_deref(), vault) {
            (Some(VAULT_GROUP_TYPE), vault) => GroupKind::VaultBacked {
                vault: vault.unwrap_or_default(),
            },
            _ => GroupKind::Plain,
        };

        VariableGroup {
            id: GroupId(dto.id),
            name: dto.name,
            kind,
            variables: dto
                .variables
                .into_iter()
                .map(|(key, v)| {
                    (
                        key,
                        Variable {
                            value: v.value,
                            is_secret: v.is_secret,
                        },
                    )
                })
                .collect(),
            description: dto.description,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TeamProject {
    pub id: String,
    pub name: String,
}

impl From<TeamProject> for ProjectRef {
    fn from(project: TeamProject) -> Self {
        ProjectRef {
            id: project.id,
            name: project.name,
        }
    }
}

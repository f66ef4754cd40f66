//! IAM request and payload types
//!
//! These serialize to the JSON shapes the IAM policy API expects.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use utoipa::ToSchema;

/// The principal a permission check is made for
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subject {
    #[serde(rename = "type")]
    pub subject_type: String,
    pub id: String,
}

impl Subject {
    pub fn user(username: impl Into<String>) -> Self {
        Self {
            subject_type: "user".to_string(),
            id: username.into(),
        }
    }
}

/// A resource instance a permission check is scoped to
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct Resource {
    pub system: String,
    #[serde(rename = "type")]
    pub resource_type: String,
    pub id: String,
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    #[schema(value_type = Object)]
    pub attribute: Map<String, Value>,
}

impl Resource {
    pub fn new(
        system: impl Into<String>,
        resource_type: impl Into<String>,
        id: impl Into<String>,
    ) -> Self {
        Self {
            system: system.into(),
            resource_type: resource_type.into(),
            id: id.into(),
            attribute: Map::new(),
        }
    }

    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.attribute.insert(key.into(), value.into());
        self
    }

    /// Display name: the `name` attribute, falling back to the id
    pub fn display_name(&self) -> String {
        match self.attribute.get("name") {
            Some(Value::String(name)) => name.clone(),
            Some(other) if !other.is_null() => other.to_string(),
            _ => self.id.clone(),
        }
    }

    /// The `_bk_iam_path_` attribute, if present
    pub fn iam_path(&self) -> Option<&str> {
        self.attribute.get("_bk_iam_path_").and_then(Value::as_str)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionRef {
    pub id: String,
}

impl ActionRef {
    pub fn new(id: impl Into<String>) -> Self {
        Self { id: id.into() }
    }
}

/// Single-action authorization request
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AuthRequest {
    pub system: String,
    pub subject: Subject,
    pub action: ActionRef,
    pub resources: Vec<Resource>,
    pub environment: Option<Value>,
}

/// Multi-action authorization request
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MultiActionRequest {
    pub system: String,
    pub subject: Subject,
    pub actions: Vec<ActionRef>,
    pub resources: Vec<Resource>,
    pub environment: Option<Value>,
}

// =============================================================================
// Apply URL application
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResourceNode {
    #[serde(rename = "type")]
    pub node_type: String,
    pub id: String,
    pub name: String,
}

/// A resource type an action relates to, with the instances being requested
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RelatedResourceType {
    #[serde(rename = "system")]
    pub system_id: String,
    #[serde(rename = "type")]
    pub resource_type: String,
    /// Each instance is a path of nodes; ours are always single-node paths
    pub instances: Vec<Vec<ResourceNode>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(into = "ApplicationActionWire")]
pub enum ApplicationAction {
    WithoutResources {
        id: String,
    },
    WithResources {
        id: String,
        related_resource_types: Vec<RelatedResourceType>,
    },
}

impl ApplicationAction {
    pub fn id(&self) -> &str {
        match self {
            Self::WithoutResources { id } | Self::WithResources { id, .. } => id,
        }
    }
}

#[derive(Serialize)]
struct ApplicationActionWire {
    id: String,
    related_resource_types: Vec<RelatedResourceType>,
}

impl From<ApplicationAction> for ApplicationActionWire {
    fn from(action: ApplicationAction) -> Self {
        match action {
            ApplicationAction::WithoutResources { id } => Self {
                id,
                related_resource_types: Vec::new(),
            },
            ApplicationAction::WithResources {
                id,
                related_resource_types,
            } => Self {
                id,
                related_resource_types,
            },
        }
    }
}

/// Body of the apply URL request
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Application {
    #[serde(rename = "system")]
    pub system_id: String,
    pub actions: Vec<ApplicationAction>,
}

// =============================================================================
// Apply data (returned with permission denials)
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct ApplyInstance {
    #[serde(rename = "type")]
    pub instance_type: String,
    pub type_name: String,
    pub id: String,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct ApplyResourceType {
    pub system_id: String,
    pub system_name: String,
    #[serde(rename = "type")]
    pub resource_type: String,
    pub type_name: String,
    pub instances: Vec<Vec<ApplyInstance>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct ApplyAction {
    pub id: String,
    pub name: String,
    pub related_resource_types: Vec<ApplyResourceType>,
}

/// Human-readable description of the permissions a user is missing
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct ApplyData {
    pub system_id: String,
    pub system_name: String,
    pub actions: Vec<ApplyAction>,
}

// =============================================================================
// Misc
// =============================================================================

/// A business space users work in
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct Space {
    pub bk_biz_id: i64,
    #[serde(default)]
    pub space_uid: String,
    #[serde(default)]
    pub space_name: String,
}

/// Body of a resource-creator grant
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CreatorGrant {
    pub system: String,
    #[serde(rename = "type")]
    pub resource_type: String,
    pub id: String,
    pub name: String,
    pub creator: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resource_display_name() {
        let plain = Resource::new("bk_cmdb", "biz", "2");
        assert_eq!(plain.display_name(), "2");

        let named = plain.clone().with_attribute("name", "Blueking");
        assert_eq!(named.display_name(), "Blueking");
    }

    #[test]
    fn test_resource_serializes_type_key() {
        let resource = Resource::new("bk_log_search", "indices", "7");
        let value = serde_json::to_value(&resource).unwrap();
        assert_eq!(value["type"], "indices");
        assert!(value.get("attribute").is_none());
    }

    #[test]
    fn test_application_action_wire_shape() {
        let without = ApplicationAction::WithoutResources {
            id: "create_indices".into(),
        };
        let value = serde_json::to_value(&without).unwrap();
        assert_eq!(value["id"], "create_indices");
        assert_eq!(value["related_resource_types"], serde_json::json!([]));

        let with = ApplicationAction::WithResources {
            id: "search_log".into(),
            related_resource_types: vec![RelatedResourceType {
                system_id: "bk_log_search".into(),
                resource_type: "indices".into(),
                instances: vec![vec![ResourceNode {
                    node_type: "indices".into(),
                    id: "1".into(),
                    name: "nginx".into(),
                }]],
            }],
        };
        assert_eq!(with.id(), "search_log");
        let value = serde_json::to_value(&with).unwrap();
        assert_eq!(value["related_resource_types"][0]["system"], "bk_log_search");
        assert_eq!(
            value["related_resource_types"][0]["instances"][0][0]["name"],
            "nginx"
        );
    }

    #[test]
    fn test_iam_path() {
        let resource =
            Resource::new("bk_log_search", "indices", "1").with_attribute("_bk_iam_path_", "/biz,2/");
        assert_eq!(resource.iam_path(), Some("/biz,2/"));
        assert_eq!(Resource::new("a", "b", "c").iam_path(), None);
    }
}

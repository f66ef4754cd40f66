//! Action and resource type catalog
//!
//! The static set of IAM actions this service checks, and the resource
//! types they relate to.

use serde_json::Value;

use super::IamError;
use super::types::Resource;

/// CMDB system that owns the business resource type
pub const CMDB_SYSTEM_ID: &str = "bk_cmdb";
pub const CMDB_SYSTEM_NAME: &str = "CMDB";

/// Which IAM system a resource type is registered under
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceSystem {
    Cmdb,
    /// The system this service registers itself as
    Local,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResourceTypeMeta {
    pub id: &'static str,
    pub name: &'static str,
    pub system: ResourceSystem,
}

impl ResourceTypeMeta {
    pub fn system_id<'a>(&self, local_system_id: &'a str) -> &'a str {
        match self.system {
            ResourceSystem::Cmdb => CMDB_SYSTEM_ID,
            ResourceSystem::Local => local_system_id,
        }
    }

    pub fn system_name<'a>(&self, local_system_name: &'a str) -> &'a str {
        match self.system {
            ResourceSystem::Cmdb => CMDB_SYSTEM_NAME,
            ResourceSystem::Local => local_system_name,
        }
    }

    /// Bare instance of this type with no attributes
    pub fn create_instance(&self, local_system_id: &str, id: impl Into<String>) -> Resource {
        Resource::new(self.system_id(local_system_id), self.id, id)
    }
}

pub const BUSINESS: ResourceTypeMeta = ResourceTypeMeta {
    id: "biz",
    name: "Business",
    system: ResourceSystem::Cmdb,
};

pub const INDICES: ResourceTypeMeta = ResourceTypeMeta {
    id: "indices",
    name: "Index set",
    system: ResourceSystem::Local,
};

const ALL_RESOURCES: &[ResourceTypeMeta] = &[BUSINESS, INDICES];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionKind {
    View,
    Create,
    Edit,
    Manage,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ActionMeta {
    pub id: &'static str,
    pub name: &'static str,
    pub kind: ActionKind,
    pub related_resource_types: &'static [ResourceTypeMeta],
}

impl ActionMeta {
    pub fn is_read(&self) -> bool {
        self.kind == ActionKind::View
    }

    pub fn has_related_resources(&self) -> bool {
        !self.related_resource_types.is_empty()
    }
}

pub const VIEW_BUSINESS: ActionMeta = ActionMeta {
    id: "view_business",
    name: "View business",
    kind: ActionKind::View,
    related_resource_types: &[BUSINESS],
};

pub const SEARCH_LOG: ActionMeta = ActionMeta {
    id: "search_log",
    name: "Search logs",
    kind: ActionKind::View,
    related_resource_types: &[INDICES],
};

pub const MANAGE_INDICES: ActionMeta = ActionMeta {
    id: "manage_indices",
    name: "Manage index sets",
    kind: ActionKind::Manage,
    related_resource_types: &[INDICES],
};

pub const CREATE_INDICES: ActionMeta = ActionMeta {
    id: "create_indices",
    name: "Create index sets",
    kind: ActionKind::Create,
    related_resource_types: &[BUSINESS],
};

pub const VIEW_DASHBOARD: ActionMeta = ActionMeta {
    id: "view_dashboard",
    name: "View dashboards",
    kind: ActionKind::View,
    related_resource_types: &[BUSINESS],
};

pub const MANAGE_DASHBOARD: ActionMeta = ActionMeta {
    id: "manage_dashboard",
    name: "Manage dashboards",
    kind: ActionKind::Edit,
    related_resource_types: &[BUSINESS],
};

pub const MANAGE_EXTRACT_CONFIG: ActionMeta = ActionMeta {
    id: "manage_extract_config",
    name: "Manage log extraction",
    kind: ActionKind::Manage,
    related_resource_types: &[BUSINESS],
};

const ALL_ACTIONS: &[ActionMeta] = &[
    VIEW_BUSINESS,
    SEARCH_LOG,
    MANAGE_INDICES,
    CREATE_INDICES,
    VIEW_DASHBOARD,
    MANAGE_DASHBOARD,
    MANAGE_EXTRACT_CONFIG,
];

pub fn all_actions() -> &'static [ActionMeta] {
    ALL_ACTIONS
}

pub fn get_action_by_id(action_id: &str) -> Result<&'static ActionMeta, IamError> {
    ALL_ACTIONS
        .iter()
        .find(|a| a.id == action_id)
        .ok_or_else(|| IamError::ActionNotExist(action_id.to_string()))
}

pub fn get_resource_by_id(resource_type: &str) -> Result<&'static ResourceTypeMeta, IamError> {
    ALL_RESOURCES
        .iter()
        .find(|r| r.id == resource_type)
        .ok_or_else(|| IamError::ResourceTypeNotExist(resource_type.to_string()))
}

/// Business resource with the `id` only
pub fn business_instance(bk_biz_id: i64) -> Resource {
    Resource::new(CMDB_SYSTEM_ID, BUSINESS.id, bk_biz_id.to_string())
}

/// Build the `_bk_iam_path_` attribute that places a resource under a business
pub fn business_path(bk_biz_id: i64) -> Value {
    Value::String(format!("/biz,{}/", bk_biz_id))
}

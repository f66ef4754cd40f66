//! Authorization facade over the IAM policy service
//!
//! [`Permission`] binds a resolved principal to a [`PolicyClient`] and
//! implements the checks the HTTP layer needs: single and batch decisions,
//! demo-business exemptions, apply-for-access payloads and space filtering.

pub mod actions;
pub mod policy;
pub mod types;

use std::sync::Arc;

use serde_json::Value;
use thiserror::Error;

use crate::data::index_set::IndexSetRegistry;
use crate::data::iam_client::BatchDecisions;
use crate::data::{DataError, PolicyClient};

use actions::{ActionMeta, BUSINESS, INDICES, business_instance, business_path};
use policy::ObjectSet;
use types::{
    ActionRef, Application, ApplicationAction, ApplyAction, ApplyData, ApplyInstance,
    ApplyResourceType, AuthRequest, CreatorGrant, MultiActionRequest, RelatedResourceType,
    Resource, ResourceNode, Space, Subject,
};

#[derive(Error, Debug)]
pub enum IamError {
    #[error("Action does not exist: {0}")]
    ActionNotExist(String),

    #[error("Resource type does not exist: {0}")]
    ResourceTypeNotExist(String),

    #[error("Permission denied for action: {action_name}")]
    PermissionDenied {
        action_name: String,
        apply_url: String,
        permission: Box<ApplyData>,
    },

    #[error("Failed to get system info: {0}")]
    GetSystemInfo(String),

    #[error("No username available to check permissions for")]
    NoPrincipal,

    #[error(transparent)]
    Client(#[from] DataError),
}

/// Settings that shape permission decisions
#[derive(Debug, Clone)]
pub struct IamSettings {
    pub system_id: String,
    pub system_name: String,
    /// Fallback apply URL when the IAM service cannot generate one
    pub saas_host: String,
    pub skip_check: bool,
    pub ignore_permission: bool,
    pub default_tenant_id: String,
    pub local_username: Option<String>,
    pub demo_biz_id: Option<i64>,
    pub demo_biz_edit_enabled: bool,
}

impl Default for IamSettings {
    fn default() -> Self {
        Self {
            system_id: "bk_log_search".to_string(),
            system_name: "Log Search".to_string(),
            saas_host: String::new(),
            skip_check: false,
            ignore_permission: false,
            default_tenant_id: "system".to_string(),
            local_username: None,
            demo_biz_id: None,
            demo_biz_edit_enabled: false,
        }
    }
}

/// Caller identity taken from the incoming request
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestIdentity {
    pub username: Option<String>,
    pub tenant_id: Option<String>,
}

/// The user and tenant a permission check runs as
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Principal {
    pub username: String,
    pub tenant_id: String,
}

impl Principal {
    /// Resolve the principal.
    ///
    /// Order: explicit username and tenant, then the request identity, then
    /// the configured local username under the default tenant.
    pub fn resolve(
        username: Option<&str>,
        tenant_id: Option<&str>,
        identity: Option<&RequestIdentity>,
        settings: &IamSettings,
    ) -> Result<Self, IamError> {
        let non_empty = |s: Option<&str>| s.filter(|v| !v.trim().is_empty()).map(str::to_string);

        if let (Some(username), Some(tenant_id)) = (non_empty(username), non_empty(tenant_id)) {
            return Ok(Self {
                username,
                tenant_id,
            });
        }

        if let Some(identity) = identity
            && let Some(username) = non_empty(identity.username.as_deref())
        {
            let tenant_id = non_empty(identity.tenant_id.as_deref())
                .unwrap_or_else(|| settings.default_tenant_id.clone());
            return Ok(Self {
                username,
                tenant_id,
            });
        }

        let tenant_id = settings.default_tenant_id.clone();
        tracing::warn!(
            tenant_id = %tenant_id,
            "IAM permission init with local username, using default tenant"
        );
        match non_empty(settings.local_username.as_deref()) {
            Some(username) => Ok(Self {
                username,
                tenant_id,
            }),
            None => Err(IamError::NoPrincipal),
        }
    }
}

/// Shared IAM wiring; hands out per-request [`Permission`] handles
pub struct IamService {
    client: Arc<dyn PolicyClient>,
    settings: Arc<IamSettings>,
    index_sets: Arc<IndexSetRegistry>,
}

impl IamService {
    pub fn new(
        client: Arc<dyn PolicyClient>,
        settings: IamSettings,
        index_sets: Arc<IndexSetRegistry>,
    ) -> Self {
        Self {
            client,
            settings: Arc::new(settings),
            index_sets,
        }
    }

    pub fn settings(&self) -> &IamSettings {
        &self.settings
    }

    /// Permission handle for the caller of a request
    pub fn permission(&self, identity: &RequestIdentity) -> Result<Permission, IamError> {
        let principal = Principal::resolve(None, None, Some(identity), &self.settings)?;
        Ok(self.permission_for(principal))
    }

    pub fn permission_for(&self, principal: Principal) -> Permission {
        Permission::new(
            principal,
            self.client.clone(),
            self.settings.clone(),
            self.index_sets.clone(),
        )
    }
}

pub struct Permission {
    principal: Principal,
    client: Arc<dyn PolicyClient>,
    settings: Arc<IamSettings>,
    index_sets: Arc<IndexSetRegistry>,
    skip_check: bool,
}

impl Permission {
    pub fn new(
        principal: Principal,
        client: Arc<dyn PolicyClient>,
        settings: Arc<IamSettings>,
        index_sets: Arc<IndexSetRegistry>,
    ) -> Self {
        let skip_check = settings.skip_check;
        Self {
            principal,
            client,
            settings,
            index_sets,
            skip_check,
        }
    }

    pub fn principal(&self) -> &Principal {
        &self.principal
    }

    fn subject(&self) -> Subject {
        Subject::user(&self.principal.username)
    }

    pub fn make_request(&self, action_id: &str, resources: Vec<Resource>) -> Result<AuthRequest, IamError> {
        let action = actions::get_action_by_id(action_id)?;
        Ok(AuthRequest {
            system: self.settings.system_id.clone(),
            subject: self.subject(),
            action: ActionRef::new(action.id),
            resources,
            environment: None,
        })
    }

    pub fn make_multi_action_request(
        &self,
        action_ids: &[&str],
        resources: Vec<Resource>,
    ) -> Result<MultiActionRequest, IamError> {
        let actions = action_ids
            .iter()
            .map(|id| actions::get_action_by_id(id).map(|a| ActionRef::new(a.id)))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(MultiActionRequest {
            system: self.settings.system_id.clone(),
            subject: self.subject(),
            actions,
            resources,
            environment: None,
        })
    }

    /// Build the apply-URL application.
    ///
    /// Unknown action ids are passed through as actions without resources.
    pub fn make_application(&self, action_ids: &[&str], resources: &[Resource]) -> Application {
        let local_system = self.settings.system_id.as_str();
        let actions = action_ids
            .iter()
            .map(|action_id| {
                let Ok(action) = actions::get_action_by_id(action_id) else {
                    return ApplicationAction::WithoutResources {
                        id: action_id.to_string(),
                    };
                };
                if !action.has_related_resources() {
                    return ApplicationAction::WithoutResources {
                        id: action.id.to_string(),
                    };
                }

                let related_resource_types = action
                    .related_resource_types
                    .iter()
                    .map(|related| {
                        let system_id = related.system_id(local_system);
                        let instances = resources
                            .iter()
                            .filter(|r| r.system == system_id && r.resource_type == related.id)
                            .map(|r| {
                                vec![ResourceNode {
                                    node_type: r.resource_type.clone(),
                                    id: r.id.clone(),
                                    name: r.display_name(),
                                }]
                            })
                            .collect();
                        RelatedResourceType {
                            system_id: system_id.to_string(),
                            resource_type: related.id.to_string(),
                            instances,
                        }
                    })
                    .collect();

                ApplicationAction::WithResources {
                    id: action.id.to_string(),
                    related_resource_types,
                }
            })
            .collect();

        Application {
            system_id: self.settings.system_id.clone(),
            actions,
        }
    }

    /// Apply URL for the given actions; falls back to the configured host
    pub async fn get_apply_url(&self, action_ids: &[&str], resources: &[Resource]) -> String {
        let application = self.make_application(action_ids, resources);
        match self
            .client
            .get_apply_url(&self.principal.tenant_id, &application)
            .await
        {
            Ok(url) => url,
            Err(e) => {
                tracing::error!(error = %e, "IAM generate apply url failed");
                self.settings.saas_host.clone()
            }
        }
    }

    /// Describe the missing permissions and where to apply for them
    pub async fn get_apply_data(
        &self,
        action_ids: &[&str],
        resources: &[Resource],
    ) -> Result<(ApplyData, String), IamError> {
        let local_system = self.settings.system_id.as_str();
        let mut apply_actions = Vec::with_capacity(action_ids.len());

        for action_id in action_ids {
            let action = actions::get_action_by_id(action_id)?;
            // Resources only apply to actions that relate to some resource type
            let scoped: &[Resource] = if action.has_related_resources() {
                resources
            } else {
                &[]
            };

            let related_resource_types = action
                .related_resource_types
                .iter()
                .map(|related| {
                    let system_id = related.system_id(local_system);
                    let instances = scoped
                        .iter()
                        .filter(|r| r.system == system_id && r.resource_type == related.id)
                        .map(|r| {
                            vec![ApplyInstance {
                                instance_type: r.resource_type.clone(),
                                type_name: related.name.to_string(),
                                id: r.id.clone(),
                                name: r.display_name(),
                            }]
                        })
                        .collect();
                    ApplyResourceType {
                        system_id: system_id.to_string(),
                        system_name: related.system_name(&self.settings.system_name).to_string(),
                        resource_type: related.id.to_string(),
                        type_name: related.name.to_string(),
                        instances,
                    }
                })
                .collect();

            apply_actions.push(ApplyAction {
                id: action.id.to_string(),
                name: action.name.to_string(),
                related_resource_types,
            });
        }

        let data = ApplyData {
            system_id: self.settings.system_id.clone(),
            system_name: self.settings.system_name.clone(),
            actions: apply_actions,
        };
        let url = self.get_apply_url(action_ids, resources).await;
        Ok((data, url))
    }

    /// Whether the resource list is exactly one resource of the demo business
    pub fn is_demo_biz_resource(&self, resources: &[Resource]) -> bool {
        let Some(demo_biz_id) = self.settings.demo_biz_id else {
            return false;
        };
        let [resource] = resources else {
            return false;
        };

        let demo_id = demo_biz_id.to_string();
        if resource.system == actions::CMDB_SYSTEM_ID
            && resource.resource_type == BUSINESS.id
            && resource.id == demo_id
        {
            return true;
        }

        resource
            .iam_path()
            .is_some_and(|path| path.starts_with(&format!("/biz,{}/", demo_id)))
    }

    fn demo_exempt(&self, action: &ActionMeta, resources: &[Resource]) -> bool {
        (self.settings.demo_biz_edit_enabled || action.is_read())
            && self.is_demo_biz_resource(resources)
    }

    /// Check one action. With `raise` set a denial becomes
    /// [`IamError::PermissionDenied`] carrying the apply payload.
    pub async fn is_allowed(
        &self,
        action_id: &str,
        resources: Vec<Resource>,
        raise: bool,
    ) -> Result<bool, IamError> {
        let action = actions::get_action_by_id(action_id)?;
        let resources = if action.has_related_resources() {
            resources
        } else {
            Vec::new()
        };

        if self.demo_exempt(action, &resources) {
            tracing::debug!(action = action.id, "Demo business exemption");
            return Ok(true);
        }

        let request = self.make_request(action.id, resources)?;
        let allowed = match self
            .client
            .is_allowed(&self.principal.tenant_id, &request)
            .await
        {
            Ok(allowed) => allowed,
            Err(e) => {
                tracing::error!(error = %e, action = action.id, "IAM auth API error");
                false
            }
        };

        if !allowed && raise {
            let (permission, apply_url) = self.get_apply_data(&[action.id], &request.resources).await?;
            return Err(IamError::PermissionDenied {
                action_name: action.name.to_string(),
                apply_url,
                permission: Box::new(permission),
            });
        }

        tracing::debug!(
            username = %self.principal.username,
            action = action.id,
            allowed,
            "IAM decision"
        );
        Ok(allowed)
    }

    pub async fn is_allowed_by_biz(
        &self,
        bk_biz_id: i64,
        action_id: &str,
        raise: bool,
    ) -> Result<bool, IamError> {
        if self.skip_check {
            return Ok(true);
        }
        self.is_allowed(action_id, vec![business_instance(bk_biz_id)], raise)
            .await
    }

    /// Decisions for every action on every resource list, keyed by resource id
    pub async fn batch_is_allowed(
        &self,
        action_ids: &[&str],
        resources: &[Vec<Resource>],
    ) -> Result<BatchDecisions, IamError> {
        let request = self.make_multi_action_request(action_ids, Vec::new())?;
        let mut result = self
            .client
            .batch_resource_multi_actions_allowed(&self.principal.tenant_id, &request, resources)
            .await?;

        for action_id in action_ids {
            let action = actions::get_action_by_id(action_id)?;
            if !self.settings.demo_biz_edit_enabled && !action.is_read() {
                continue;
            }
            for resource_list in resources {
                let Some(first) = resource_list.first() else {
                    continue;
                };
                if !self.is_demo_biz_resource(resource_list) {
                    continue;
                }
                if let Some(decision) = result
                    .get_mut(&first.id)
                    .and_then(|actions| actions.get_mut(action.id))
                {
                    *decision = true;
                }
            }
        }

        Ok(result)
    }

    /// Build a resource instance by type and id.
    ///
    /// Index sets known to the registry carry their name and business path.
    pub fn make_resource(&self, resource_type: &str, id: &str) -> Result<Resource, IamError> {
        let meta = actions::get_resource_by_id(resource_type)?;
        let mut resource = meta.create_instance(&self.settings.system_id, id);

        if meta.id == INDICES.id
            && let Ok(index_set_id) = id.parse::<u64>()
            && let Some(index_set) = self.index_sets.get(index_set_id)
        {
            resource = resource
                .with_attribute("name", index_set.index_set_name.clone())
                .with_attribute("_bk_iam_path_", business_path(index_set.bk_biz_id));
        }
        Ok(resource)
    }

    /// Build resources from `(type, id)` pairs
    pub fn batch_make_resource<'a>(
        &self,
        refs: impl IntoIterator<Item = (&'a str, &'a str)>,
    ) -> Result<Vec<Resource>, IamError> {
        refs.into_iter()
            .map(|(resource_type, id)| self.make_resource(resource_type, id))
            .collect()
    }

    /// Registered model of this system in the IAM service
    pub async fn get_system_info(&self) -> Result<Value, IamError> {
        self.client
            .query_system(&self.principal.tenant_id, &self.settings.system_id)
            .await
            .map_err(|e| IamError::GetSystemInfo(e.to_string()))
    }

    /// Keep the spaces the principal may perform `action_id` in.
    ///
    /// The demo space is always kept.
    pub async fn filter_space_list_by_action(
        &self,
        action_id: &str,
        spaces: Vec<Space>,
    ) -> Result<Vec<Space>, IamError> {
        if self.settings.ignore_permission {
            return Ok(spaces);
        }

        let request = self.make_request(action_id, Vec::new())?;
        let policy = match self
            .client
            .policy_query(&self.principal.tenant_id, &request)
            .await
        {
            Ok(policy) => policy,
            Err(e) => {
                tracing::error!(error = %e, action = action_id, "IAM policy query error");
                return Ok(Vec::new());
            }
        };

        let demo_biz_id = self.settings.demo_biz_id;
        let Some(expression) = policy else {
            return Ok(spaces
                .into_iter()
                .filter(|s| Some(s.bk_biz_id) == demo_biz_id)
                .take(1)
                .collect());
        };

        Ok(spaces
            .into_iter()
            .filter(|space| {
                if Some(space.bk_biz_id) == demo_biz_id {
                    return true;
                }
                let objects = ObjectSet::from_resources(&[business_instance(space.bk_biz_id)]);
                expression.eval(&objects)
            })
            .collect())
    }

    /// Grant the creator of a new resource its creator actions.
    ///
    /// Failures are logged and swallowed unless `raise` is set.
    pub async fn grant_creator_action(
        &self,
        resource: &Resource,
        creator: Option<&str>,
        raise: bool,
    ) -> Result<Option<Value>, IamError> {
        let grant = CreatorGrant {
            system: resource.system.clone(),
            resource_type: resource.resource_type.clone(),
            id: resource.id.clone(),
            name: resource.display_name(),
            creator: creator.unwrap_or(&self.principal.username).to_string(),
        };

        match self
            .client
            .grant_resource_creator_actions(&self.principal.tenant_id, &grant)
            .await
        {
            Ok(result) => {
                tracing::info!(
                    resource_type = %grant.resource_type,
                    resource_id = %grant.id,
                    creator = %grant.creator,
                    "Granted creator actions"
                );
                Ok(Some(result))
            }
            Err(e) => {
                tracing::error!(
                    resource_type = %grant.resource_type,
                    resource_id = %grant.id,
                    error = %e,
                    "Failed to grant creator actions"
                );
                if raise { Err(e.into()) } else { Ok(None) }
            }
        }
    }
}

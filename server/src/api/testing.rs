//! In-memory collaborators for router tests

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::{Value, json};

use crate::app::AppServices;
use crate::data::iam_client::BatchDecisions;
use crate::data::{DataError, IndexSet, IndexSetRegistry, PolicyClient, QueryApi, QueryApiResponse};
use crate::domain::chart::{ChartService, SqlOptions};
use crate::domain::iam::policy::PolicyExpression;
use crate::domain::iam::types::{Application, AuthRequest, CreatorGrant, MultiActionRequest, Resource, Space};
use crate::domain::iam::{IamService, IamSettings};

pub const APPLY_URL: &str = "https://iam.example.com/apply?id=1";

pub struct FakeQueryApi {
    response: Value,
    seen: Mutex<Vec<String>>,
}

impl FakeQueryApi {
    pub fn ok() -> Arc<Self> {
        Arc::new(Self {
            response: json!({
                "result": true,
                "data": {
                    "list": [{"level": "error", "count": 3}],
                    "totalRecords": 1,
                    "timetaken": 0.01,
                    "select_fields_order": ["level", "count"]
                }
            }),
            seen: Mutex::new(Vec::new()),
        })
    }

    pub fn failing() -> Arc<Self> {
        Arc::new(Self {
            response: json!({
                "result": false,
                "message": "query failed",
                "errors": {"error": "syntax error"}
            }),
            seen: Mutex::new(Vec::new()),
        })
    }

    pub fn last_sql(&self) -> Option<String> {
        self.seen.lock().unwrap().last().cloned()
    }
}

#[async_trait]
impl QueryApi for FakeQueryApi {
    async fn query(&self, sql: &str) -> Result<QueryApiResponse, DataError> {
        self.seen.lock().unwrap().push(sql.to_string());
        Ok(serde_json::from_value(self.response.clone()).unwrap())
    }
}

/// Allows a fixed set of actions everywhere; its policy grants business 3
pub struct FakePolicyClient {
    allowed: Vec<String>,
}

impl FakePolicyClient {
    pub fn allow(actions: &[&str]) -> Self {
        Self {
            allowed: actions.iter().map(|a| a.to_string()).collect(),
        }
    }
}

#[async_trait]
impl PolicyClient for FakePolicyClient {
    async fn is_allowed(&self, _: &str, request: &AuthRequest) -> Result<bool, DataError> {
        Ok(self.allowed.contains(&request.action.id))
    }

    async fn batch_resource_multi_actions_allowed(
        &self,
        _: &str,
        request: &MultiActionRequest,
        resources: &[Vec<Resource>],
    ) -> Result<BatchDecisions, DataError> {
        let mut result = HashMap::new();
        for list in resources {
            let Some(first) = list.first() else {
                continue;
            };
            let decisions = request
                .actions
                .iter()
                .map(|a| (a.id.clone(), self.allowed.contains(&a.id)))
                .collect();
            result.insert(first.id.clone(), decisions);
        }
        Ok(result)
    }

    async fn policy_query(
        &self,
        _: &str,
        _: &AuthRequest,
    ) -> Result<Option<PolicyExpression>, DataError> {
        Ok(Some(PolicyExpression::In {
            field: "biz.id".into(),
            value: vec![json!("3")],
        }))
    }

    async fn get_apply_url(&self, _: &str, _: &Application) -> Result<String, DataError> {
        Ok(APPLY_URL.into())
    }

    async fn grant_resource_creator_actions(
        &self,
        _: &str,
        _: &CreatorGrant,
    ) -> Result<Value, DataError> {
        Ok(json!({}))
    }

    async fn query_system(&self, _: &str, system_id: &str) -> Result<Value, DataError> {
        Ok(json!({"base_info": {"id": system_id}}))
    }
}

/// Index set 10 lives in the demo business 2, index set 11 in business 3
pub fn services(query: Arc<FakeQueryApi>, policy: FakePolicyClient) -> AppServices {
    let index_sets = Arc::new(IndexSetRegistry::new(vec![
        IndexSet {
            index_set_id: 10,
            index_set_name: "demo nginx".into(),
            table_id: Some("2_bklog.nginx".into()),
            support_doris: true,
            bk_biz_id: 2,
        },
        IndexSet {
            index_set_id: 11,
            index_set_name: "prod api".into(),
            table_id: Some("3_bklog.api".into()),
            support_doris: true,
            bk_biz_id: 3,
        },
    ]));
    let settings = IamSettings {
        saas_host: "https://iam.example.com".into(),
        demo_biz_id: Some(2),
        ..Default::default()
    };
    let spaces = (2..=4)
        .map(|id| Space {
            bk_biz_id: id,
            space_uid: format!("bkcc__{}", id),
            space_name: format!("biz {}", id),
        })
        .collect();

    AppServices {
        chart: Arc::new(ChartService::new(
            index_sets.clone(),
            query,
            SqlOptions::default(),
        )),
        iam: Arc::new(IamService::new(Arc::new(policy), settings, index_sets.clone())),
        index_sets,
        spaces: Arc::new(spaces),
    }
}

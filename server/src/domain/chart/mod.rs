//! Log chart queries
//!
//! - `condition` - Filter conditions and the operator table
//! - `predicate` - Filter to SQL predicate synthesis
//! - `splice` - Table rewriting of caller SQL
//! - `result` - Response reshaping and schema inference
//!
//! [`ChartService`] ties them together: it resolves the index set, builds or
//! splices the SQL, runs it through the [`QueryApi`] port and reshapes the
//! response.

pub mod condition;
pub mod predicate;
pub mod result;
pub mod splice;

use std::str::FromStr;
use std::sync::Arc;

use serde::Deserialize;
use thiserror::Error;

pub use condition::{Condition, FilterSpec, Scalar};
pub use predicate::{SqlOptions, generate_sql, synthesize};
pub use result::ChartData;

use crate::data::{DataError, IndexSet, IndexSetRegistry, QueryApi};

#[derive(Error, Debug)]
pub enum ChartError {
    #[error("Index set {0} not found")]
    IndexSetNotFound(u64),

    #[error("Index set {0} does not support Doris queries")]
    DorisUnsupported(u64),

    /// Malformed caller SQL or a failed query; the message is user-facing
    #[error("{0}")]
    SqlQuery(String),

    #[error("Chart mode '{0}' is not implemented")]
    NotImplemented(String),

    #[error("Invalid chart request: {0}")]
    InvalidParams(String),

    #[error(transparent)]
    Data(#[from] DataError),
}

/// How the chart query is produced
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChartMode {
    /// SQL synthesized from the search filter
    Ui,
    /// SQL written by the caller
    Sql,
}

impl FromStr for ChartMode {
    type Err = ChartError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ui" => Ok(Self::Ui),
            "sql" => Ok(Self::Sql),
            other => Err(ChartError::NotImplemented(other.to_string())),
        }
    }
}

/// Chart request parameters as the search page sends them
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ChartParams {
    pub query_mode: String,
    #[serde(default)]
    pub sql: Option<String>,
    #[serde(default)]
    pub start_time: Option<i64>,
    #[serde(default)]
    pub end_time: Option<i64>,
    #[serde(default)]
    pub addition: Vec<Condition>,
}

impl ChartParams {
    fn filter(&self) -> Result<FilterSpec, ChartError> {
        match (self.start_time, self.end_time) {
            (Some(start_time), Some(end_time)) => Ok(FilterSpec {
                start_time,
                end_time,
                conditions: self.addition.clone(),
            }),
            _ => Err(ChartError::InvalidParams(
                "start_time and end_time are required in ui mode".to_string(),
            )),
        }
    }
}

pub struct ChartService {
    index_sets: Arc<IndexSetRegistry>,
    query_api: Arc<dyn QueryApi>,
    options: SqlOptions,
}

impl ChartService {
    pub fn new(
        index_sets: Arc<IndexSetRegistry>,
        query_api: Arc<dyn QueryApi>,
        options: SqlOptions,
    ) -> Self {
        Self {
            index_sets,
            query_api,
            options,
        }
    }

    pub fn index_set(&self, index_set_id: u64) -> Result<&IndexSet, ChartError> {
        self.index_sets
            .get(index_set_id)
            .ok_or(ChartError::IndexSetNotFound(index_set_id))
    }

    /// Statement that seeds the SQL editor for a filter
    pub fn generate_sql(&self, filter: &FilterSpec) -> String {
        generate_sql(filter, &self.options)
    }

    pub async fn chart_data(
        &self,
        index_set_id: u64,
        params: &ChartParams,
    ) -> Result<ChartData, ChartError> {
        let mode = ChartMode::from_str(&params.query_mode)?;
        let index_set = self.index_set(index_set_id)?;
        let table = index_set
            .doris_table()
            .ok_or(ChartError::DorisUnsupported(index_set_id))?;

        let raw_sql = match mode {
            ChartMode::Sql => params.sql.clone().unwrap_or_default(),
            ChartMode::Ui => self.generate_sql(&params.filter()?),
        };
        let sql = splice::splice(&raw_sql, table)?;

        tracing::debug!(index_set_id, ?mode, table, "Running chart query");
        let response = self.query_api.query(&sql).await?;
        result::into_chart_data(response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::QueryApiResponse;
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::Mutex;

    struct FakeQueryApi {
        response: serde_json::Value,
        seen: Mutex<Vec<String>>,
    }

    impl FakeQueryApi {
        fn new(response: serde_json::Value) -> Arc<Self> {
            Arc::new(Self {
                response,
                seen: Mutex::new(Vec::new()),
            })
        }

        fn last_sql(&self) -> Option<String> {
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

    fn ok_response() -> serde_json::Value {
        json!({
            "result": true,
            "data": {
                "list": [{"level": "error", "count": 3}],
                "totalRecords": 1,
                "timetaken": 0.02,
                "select_fields_order": ["level", "count"]
            }
        })
    }

    fn registry() -> Arc<IndexSetRegistry> {
        Arc::new(IndexSetRegistry::new([
            IndexSet {
                index_set_id: 1,
                index_set_name: "app logs".into(),
                table_id: Some("2_bklog.app_doris".into()),
                support_doris: true,
                bk_biz_id: 2,
            },
            IndexSet {
                index_set_id: 2,
                index_set_name: "es only".into(),
                table_id: Some("2_bklog.es".into()),
                support_doris: false,
                bk_biz_id: 2,
            },
        ]))
    }

    fn service(api: Arc<FakeQueryApi>) -> ChartService {
        ChartService::new(registry(), api, SqlOptions::default())
    }

    fn sql_params(sql: &str) -> ChartParams {
        ChartParams {
            query_mode: "sql".into(),
            sql: Some(sql.into()),
            ..Default::default()
        }
    }

    #[test]
    fn test_chart_mode_parse() {
        assert_eq!("ui".parse::<ChartMode>().unwrap(), ChartMode::Ui);
        assert_eq!("sql".parse::<ChartMode>().unwrap(), ChartMode::Sql);
        assert!(matches!(
            "graph".parse::<ChartMode>(),
            Err(ChartError::NotImplemented(m)) if m == "graph"
        ));
    }

    #[tokio::test]
    async fn test_sql_mode_splices_table() {
        let api = FakeQueryApi::new(ok_response());
        let data = service(api.clone())
            .chart_data(1, &sql_params("SELECT level, count(*) FROM x GROUP BY level"))
            .await
            .unwrap();

        assert_eq!(
            api.last_sql().unwrap(),
            "SELECT level, count(*) FROM 2_bklog.app_doris GROUP BY level"
        );
        assert_eq!(data.total_records, 1);
        assert_eq!(data.result_schema.len(), 2);
        assert_eq!(data.result_schema[1].field_type, "long");
    }

    #[tokio::test]
    async fn test_ui_mode_generates_and_splices() {
        let api = FakeQueryApi::new(ok_response());
        let params = ChartParams {
            query_mode: "ui".into(),
            start_time: Some(1),
            end_time: Some(2),
            addition: vec![Condition::new("log", "contains", vec![Scalar::from("err")])],
            ..Default::default()
        };
        service(api.clone()).chart_data(1, &params).await.unwrap();

        assert_eq!(
            api.last_sql().unwrap(),
            "SELECT thedate, dtEventTimeStamp, iterationIndex, log, time FROM 2_bklog.app_doris \
             WHERE dtEventTimeStamp >= 1000 AND dtEventTimeStamp <= 2000 AND log LIKE '%err%' LIMIT 10000"
        );
    }

    #[tokio::test]
    async fn test_ui_mode_requires_time_range() {
        let api = FakeQueryApi::new(ok_response());
        let params = ChartParams {
            query_mode: "ui".into(),
            ..Default::default()
        };
        let err = service(api.clone()).chart_data(1, &params).await.unwrap_err();
        assert!(matches!(err, ChartError::InvalidParams(_)));
        assert!(api.last_sql().is_none());
    }

    #[tokio::test]
    async fn test_unknown_mode_not_implemented() {
        let api = FakeQueryApi::new(ok_response());
        let params = ChartParams {
            query_mode: "graph".into(),
            ..Default::default()
        };
        let err = service(api).chart_data(1, &params).await.unwrap_err();
        assert!(matches!(err, ChartError::NotImplemented(_)));
    }

    #[tokio::test]
    async fn test_unknown_index_set() {
        let api = FakeQueryApi::new(ok_response());
        let err = service(api)
            .chart_data(99, &sql_params("SELECT 1"))
            .await
            .unwrap_err();
        assert!(matches!(err, ChartError::IndexSetNotFound(99)));
    }

    #[tokio::test]
    async fn test_doris_unsupported() {
        let api = FakeQueryApi::new(ok_response());
        let err = service(api.clone())
            .chart_data(2, &sql_params("SELECT 1"))
            .await
            .unwrap_err();
        assert!(matches!(err, ChartError::DorisUnsupported(2)));
        assert!(api.last_sql().is_none());
    }

    #[tokio::test]
    async fn test_malformed_sql_never_reaches_backend() {
        let api = FakeQueryApi::new(ok_response());
        let err = service(api.clone())
            .chart_data(1, &sql_params("DROP TABLE logs"))
            .await
            .unwrap_err();
        assert!(matches!(err, ChartError::SqlQuery(m) if m == splice::MISSING_KEYWORD));
        assert!(api.last_sql().is_none());

        let missing = ChartParams {
            query_mode: "sql".into(),
            ..Default::default()
        };
        assert!(matches!(
            service(api).chart_data(1, &missing).await,
            Err(ChartError::SqlQuery(_))
        ));
    }

    #[tokio::test]
    async fn test_query_failure_surfaces_message() {
        let api = FakeQueryApi::new(json!({
            "result": false,
            "message": "query failed",
            "errors": {"error": "syntax error"}
        }));
        let err = service(api)
            .chart_data(1, &sql_params("SELECT bad"))
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "query failed:syntax error");
    }

    #[test]
    fn test_params_deserialize() {
        let params: ChartParams = serde_json::from_value(json!({
            "query_mode": "ui",
            "start_time": 10,
            "end_time": 20,
            "addition": [{"field": "level", "operator": "=~", "value": "err*"}]
        }))
        .unwrap();
        let filter = params.filter().unwrap();
        assert_eq!(filter.start_time, 10);
        assert_eq!(filter.conditions[0].value, vec![Scalar::from("err*")]);
    }
}

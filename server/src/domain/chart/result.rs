//! Chart result envelope
//!
//! Reshapes the raw query API response into what the chart panel renders.
//! When the collaborator omits a schema, one is inferred from the first row.

use serde::Serialize;
use serde_json::{Map, Value};
use utoipa::ToSchema;

use super::ChartError;
use crate::data::query_api::{FieldSchema, QueryApiResponse};

/// Column names always typed as dates
const TIME_FIELDS: &[&str] = &["dtEventTimeStamp", "dtEventTime", "time"];

#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct ChartData {
    pub total_records: u64,
    /// Query time reported by the collaborator, in seconds
    pub time_taken: f64,
    #[schema(value_type = Vec<Object>)]
    pub list: Vec<Map<String, Value>>,
    pub select_fields_order: Vec<String>,
    #[schema(value_type = Vec<Object>)]
    pub result_schema: Vec<FieldSchema>,
}

/// Type name for a column, judged from its name and first value
fn infer_field_type(name: &str, value: &Value) -> &'static str {
    if TIME_FIELDS.contains(&name) {
        return "date";
    }
    match value {
        Value::Bool(_) => "long",
        Value::Number(n) if n.is_i64() || n.is_u64() => "long",
        Value::Number(_) => "double",
        _ => "string",
    }
}

/// Schema of the first row, in column order
pub fn infer_schema(row: &Map<String, Value>) -> Vec<FieldSchema> {
    row.iter()
        .enumerate()
        .map(|(index, (name, value))| FieldSchema {
            field_type: infer_field_type(name, value).to_string(),
            field_name: name.clone(),
            field_alias: name.clone(),
            field_index: index,
            extra: Map::new(),
        })
        .collect()
}

/// Turn a raw response into chart data, or a user-facing query error
pub fn into_chart_data(response: QueryApiResponse) -> Result<ChartData, ChartError> {
    if !response.result {
        let mut message = response.message.unwrap_or_default();
        if let Some(error) = response
            .errors
            .and_then(|e| e.error)
            .filter(|e| !e.is_empty())
        {
            message = format!("{}:{}", message, error);
        }
        tracing::info!(message = %message, "SQL query exception");
        return Err(ChartError::SqlQuery(message));
    }

    let Some(data) = response.data else {
        return Err(ChartError::SqlQuery(
            "query succeeded without a data payload".to_string(),
        ));
    };

    let result_schema = match data.list.first() {
        Some(first) if data.result_schema.is_empty() => infer_schema(first),
        _ => data.result_schema,
    };

    Ok(ChartData {
        total_records: data.total_records,
        time_taken: data.timetaken,
        list: data.list,
        select_fields_order: data.select_fields_order,
        result_schema,
    })
}

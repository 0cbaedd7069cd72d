//! BigQuery REST client.
//!
//! Runs standard-SQL queries through the `jobs.query` endpoint with named
//! parameters and decodes the row/field JSON into [`MetricRow`]s.

use super::Warehouse;
use crate::error::ReportError;
use crate::models::{CompanyId, MetricRow, Subcategory};
use async_trait::async_trait;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;
use tracing::{debug, warn};

/// Connection settings for the BigQuery client.
#[derive(Debug, Clone)]
pub struct BigQueryConfig {
    pub api_url: String,
    pub project: String,
    pub dataset: String,
    pub metrics_table: String,
    pub names_table: String,
    pub timeout_seconds: u64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct QueryRequest {
    query: String,
    use_legacy_sql: bool,
    parameter_mode: &'static str,
    query_parameters: Vec<QueryParameter>,
    timeout_ms: u64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct QueryParameter {
    name: &'static str,
    parameter_type: ParameterType,
    parameter_value: ParameterValue,
}

#[derive(Debug, Serialize)]
struct ParameterType {
    #[serde(rename = "type")]
    kind: &'static str,
}

#[derive(Debug, Serialize)]
struct ParameterValue {
    value: String,
}

impl QueryParameter {
    fn new(name: &'static str, kind: &'static str, value: String) -> Self {
        Self {
            name,
            parameter_type: ParameterType { kind },
            parameter_value: ParameterValue { value },
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct QueryResponse {
    #[serde(default)]
    job_complete: bool,
    schema: Option<TableSchema>,
    #[serde(default)]
    rows: Vec<TableRow>,
}

#[derive(Debug, Deserialize)]
struct TableSchema {
    fields: Vec<FieldSchema>,
}

#[derive(Debug, Deserialize)]
struct FieldSchema {
    name: String,
}

#[derive(Debug, Deserialize)]
struct TableRow {
    f: Vec<TableCell>,
}

#[derive(Debug, Deserialize)]
struct TableCell {
    v: Option<serde_json::Value>,
}

/// Query results as string cells addressed by column name.
#[derive(Debug)]
struct ResultSet {
    columns: HashMap<String, usize>,
    rows: Vec<Vec<Option<String>>>,
}

impl ResultSet {
    fn from_response(response: QueryResponse) -> Result<Self, ReportError> {
        if !response.job_complete {
            return Err(ReportError::Fetch(
                "query did not complete within the request timeout".to_string(),
            ));
        }

        let columns: HashMap<String, usize> = response
            .schema
            .map(|s| {
                s.fields
                    .into_iter()
                    .enumerate()
                    .map(|(i, f)| (f.name, i))
                    .collect()
            })
            .unwrap_or_default();

        let rows: Vec<Vec<Option<String>>> = response
            .rows
            .into_iter()
            .map(|row| {
                row.f
                    .into_iter()
                    .map(|cell| match cell.v {
                        Some(serde_json::Value::String(s)) => Some(s),
                        Some(serde_json::Value::Null) | None => None,
                        Some(other) => Some(other.to_string()),
                    })
                    .collect()
            })
            .collect();

        Ok(Self { columns, rows })
    }

    fn index(&self, name: &str) -> Result<usize, ReportError> {
        self.columns
            .get(name)
            .copied()
            .ok_or_else(|| ReportError::Fetch(format!("result is missing column '{}'", name)))
    }
}

fn cell<'a>(row: &'a [Option<String>], index: usize, name: &str) -> Result<&'a str, ReportError> {
    row.get(index)
        .and_then(|c| c.as_deref())
        .ok_or_else(|| ReportError::Fetch(format!("null or missing value in column '{}'", name)))
}

/// Decode metric rows; unknown subcategory codes are dropped.
fn decode_metric_rows(result: &ResultSet) -> Result<Vec<MetricRow>, ReportError> {
    let company_idx = result.index("company_id")?;
    let date_idx = result.index("end_date")?;
    let sub_idx = result.index("subcategory")?;
    let value_idx = result.index("n_users")?;

    let mut out = Vec::with_capacity(result.rows.len());
    for row in &result.rows {
        let code = cell(row, sub_idx, "subcategory")?;
        let subcategory: Subcategory = match code.parse() {
            Ok(s) => s,
            Err(e) => {
                warn!("Skipping row: {}", e);
                continue;
            }
        };

        let end_date = NaiveDate::parse_from_str(cell(row, date_idx, "end_date")?, "%Y-%m-%d")
            .map_err(|e| ReportError::Fetch(format!("bad end_date: {}", e)))?;
        let value = cell(row, value_idx, "n_users")?
            .parse::<i64>()
            .map_err(|e| ReportError::Fetch(format!("bad n_users: {}", e)))?;

        out.push(MetricRow {
            company_id: CompanyId::from(cell(row, company_idx, "company_id")?),
            end_date,
            subcategory,
            value,
        });
    }

    Ok(out)
}

fn decode_company_names(result: &ResultSet) -> Result<HashMap<CompanyId, String>, ReportError> {
    let id_idx = result.index("company_id")?;
    let name_idx = result.index("company_name")?;

    result
        .rows
        .iter()
        .map(|row| -> Result<(CompanyId, String), ReportError> {
            Ok((
                CompanyId::from(cell(row, id_idx, "company_id")?),
                cell(row, name_idx, "company_name")?.to_string(),
            ))
        })
        .collect()
}

/// BigQuery-backed [`Warehouse`].
pub struct BigQueryWarehouse {
    config: BigQueryConfig,
    token: String,
    http_client: reqwest::Client,
}

impl BigQueryWarehouse {
    /// Create a client authenticating with a bearer `token`.
    pub fn new(config: BigQueryConfig, token: String) -> Result<Self, ReportError> {
        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()
            .map_err(|e| ReportError::Fetch(format!("failed to create HTTP client: {}", e)))?;

        Ok(Self {
            config,
            token,
            http_client,
        })
    }

    fn table(&self, name: &str) -> String {
        format!("`{}.{}.{}`", self.config.project, self.config.dataset, name)
    }

    fn query_request(&self, query: String, params: Vec<QueryParameter>) -> QueryRequest {
        QueryRequest {
            query,
            use_legacy_sql: false,
            parameter_mode: "NAMED",
            query_parameters: params,
            timeout_ms: self.config.timeout_seconds.saturating_mul(1000),
        }
    }

    async fn run_query(
        &self,
        query: String,
        params: Vec<QueryParameter>,
    ) -> Result<ResultSet, ReportError> {
        let url = format!(
            "{}/projects/{}/queries",
            self.config.api_url.trim_end_matches('/'),
            self.config.project
        );

        let request = self.query_request(query, params);

        debug!("Running warehouse query: {}", request.query.trim());

        let response = self
            .http_client
            .post(&url)
            .bearer_auth(&self.token)
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    ReportError::Fetch(format!(
                        "request timed out after {}s",
                        self.config.timeout_seconds
                    ))
                } else if e.is_connect() {
                    ReportError::Fetch(format!("cannot connect to {}", self.config.api_url))
                } else {
                    ReportError::Fetch(format!("failed to send request: {}", e))
                }
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(ReportError::Fetch(format!("BigQuery API error {}: {}", status, body)));
        }

        let body: QueryResponse = response
            .json()
            .await
            .map_err(|e| ReportError::Fetch(format!("failed to parse BigQuery response: {}", e)))?;

        ResultSet::from_response(body)
    }
}

#[async_trait]
impl Warehouse for BigQueryWarehouse {
    async fn fetch_company_names(&self) -> Result<HashMap<CompanyId, String>, ReportError> {
        let query = format!(
            "SELECT company_id, company_name FROM {}",
            self.table(&self.config.names_table)
        );
        let result = self.run_query(query, Vec::new()).await?;
        decode_company_names(&result)
    }

    async fn fetch_metrics(
        &self,
        end_date: NaiveDate,
        company: &CompanyId,
    ) -> Result<Vec<MetricRow>, ReportError> {
        let query = format!(
            "SELECT company_id, end_date, subcategory, n_users FROM {} \
             WHERE end_date = @end_date AND company_id = @company_id",
            self.table(&self.config.metrics_table)
        );
        let params = vec![
            QueryParameter::new("end_date", "DATE", end_date.format("%Y-%m-%d").to_string()),
            QueryParameter::new("company_id", "STRING", company.as_str().to_string()),
        ];
        let result = self.run_query(query, params).await?;
        decode_metric_rows(&result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn parse(value: serde_json::Value) -> ResultSet {
        let response: QueryResponse = serde_json::from_value(value).unwrap();
        ResultSet::from_response(response).unwrap()
    }

    #[test]
    fn test_decode_metric_rows() {
        let result = parse(json!({
            "jobComplete": true,
            "schema": {"fields": [
                {"name": "company_id"}, {"name": "end_date"},
                {"name": "subcategory"}, {"name": "n_users"}
            ]},
            "rows": [
                {"f": [{"v": "c1"}, {"v": "2024-01-01"}, {"v": "active_daily"}, {"v": "42"}]},
                {"f": [{"v": "c1"}, {"v": "2024-01-01"}, {"v": "mystery_daily"}, {"v": "1"}]}
            ]
        }));

        let rows = decode_metric_rows(&result).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].company_id, CompanyId::from("c1"));
        assert_eq!(rows[0].value, 42);
        assert_eq!(rows[0].subcategory.to_string(), "active_daily");
    }

    #[test]
    fn test_decode_empty_result() {
        let result = parse(json!({
            "jobComplete": true,
            "schema": {"fields": [
                {"name": "company_id"}, {"name": "end_date"},
                {"name": "subcategory"}, {"name": "n_users"}
            ]}
        }));
        assert!(decode_metric_rows(&result).unwrap().is_empty());
    }

    #[test]
    fn test_missing_column_is_fetch_error() {
        let result = parse(json!({
            "jobComplete": true,
            "schema": {"fields": [{"name": "company_id"}]},
            "rows": []
        }));
        assert!(matches!(decode_metric_rows(&result), Err(ReportError::Fetch(_))));
    }

    #[test]
    fn test_incomplete_job_is_fetch_error() {
        let response: QueryResponse = serde_json::from_value(json!({"jobComplete": false})).unwrap();
        assert!(matches!(ResultSet::from_response(response), Err(ReportError::Fetch(_))));
    }

    #[test]
    fn test_decode_company_names() {
        let result = parse(json!({
            "jobComplete": true,
            "schema": {"fields": [{"name": "company_id"}, {"name": "company_name"}]},
            "rows": [
                {"f": [{"v": "c1"}, {"v": "Acme"}]},
                {"f": [{"v": "c2"}, {"v": "Globex"}]}
            ]
        }));
        let names = decode_company_names(&result).unwrap();
        assert_eq!(names.get(&CompanyId::from("c2")).map(String::as_str), Some("Globex"));
        assert_eq!(names.len(), 2);
    }

    #[test]
    fn test_query_request_shape() {
        let request = QueryRequest {
            query: "SELECT 1".to_string(),
            use_legacy_sql: false,
            parameter_mode: "NAMED",
            query_parameters: vec![QueryParameter::new("end_date", "DATE", "2024-01-01".into())],
            timeout_ms: 1000,
        };
        let value = serde_json::to_value(&request).unwrap();
        assert_eq!(value["useLegacySql"], json!(false));
        assert_eq!(value["queryParameters"][0]["parameterType"]["type"], json!("DATE"));
        assert_eq!(value["queryParameters"][0]["parameterValue"]["value"], json!("2024-01-01"));
    }

    #[test]
    fn test_huge_timeout_saturates() {
        let config = BigQueryConfig {
            api_url: "https://bigquery.example/v2".to_string(),
            project: "p".to_string(),
            dataset: "d".to_string(),
            metrics_table: "m".to_string(),
            names_table: "n".to_string(),
            timeout_seconds: u64::MAX / 10,
        };
        let warehouse = BigQueryWarehouse::new(config, "token".to_string()).unwrap();

        let request = warehouse.query_request("SELECT 1".to_string(), Vec::new());
        assert_eq!(request.timeout_ms, u64::MAX);

        let mut config = warehouse.config.clone();
        config.timeout_seconds = 120;
        let warehouse = BigQueryWarehouse::new(config, "token".to_string()).unwrap();
        assert_eq!(warehouse.query_request(String::new(), Vec::new()).timeout_ms, 120_000);
    }
}

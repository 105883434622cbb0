//! BigQuery over its REST API (`jobs.query` / `jobs.getQueryResults`).

use async_trait::async_trait;
use chrono::DateTime;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::{Map, Number, Value, json};
use tracing::debug;

use super::auth::TokenSource;
use super::google_error_message;
use super::warehouse::{PageCursor, RowPage, WarehouseClient, WarehouseConnector};
use crate::core::{DriveError, Record, Result};

/// Server-side long-poll per round trip while a job is still running.
const POLL_TIMEOUT_MS: u64 = 10_000;

pub struct BigQueryConnector {
    http: reqwest::Client,
    endpoint: String,
    tokens: TokenSource,
    page_size: u32,
}

impl BigQueryConnector {
    pub fn new(
        http: reqwest::Client,
        endpoint: impl Into<String>,
        tokens: TokenSource,
        page_size: u32,
    ) -> Self {
        Self {
            http,
            endpoint: endpoint.into().trim_end_matches('/').to_string(),
            tokens,
            page_size,
        }
    }
}

#[async_trait]
impl WarehouseConnector for BigQueryConnector {
    async fn connect(&self, project: &str) -> Result<Box<dyn WarehouseClient>> {
        let token = self.tokens.access_token(&self.http).await?;
        Ok(Box::new(BigQueryClient {
            http: self.http.clone(),
            project_url: format!("{}/projects/{}", self.endpoint, urlencoding::encode(project)),
            token,
            page_size: self.page_size,
        }))
    }
}

struct BigQueryClient {
    http: reqwest::Client,
    project_url: String,
    token: String,
    page_size: u32,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct QueryResponse {
    job_reference: Option<JobReference>,
    #[serde(default = "job_complete_default")]
    job_complete: bool,
    schema: Option<TableSchema>,
    #[serde(default)]
    rows: Vec<TableRow>,
    page_token: Option<String>,
}

fn job_complete_default() -> bool {
    true
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct JobReference {
    job_id: String,
    location: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct TableSchema {
    #[serde(default)]
    fields: Vec<FieldSchema>,
}

#[derive(Debug, Deserialize)]
struct FieldSchema {
    name: String,
    #[serde(rename = "type")]
    field_type: String,
    mode: Option<String>,
    #[serde(default)]
    fields: Vec<FieldSchema>,
}

#[derive(Debug, Deserialize)]
struct TableRow {
    #[serde(default)]
    f: Vec<TableCell>,
}

#[derive(Debug, Deserialize)]
struct TableCell {
    #[serde(default)]
    v: Value,
}

impl BigQueryClient {
    async fn send<T: DeserializeOwned>(&self, request: reqwest::RequestBuilder) -> Result<T> {
        let response = request
            .bearer_auth(&self.token)
            .send()
            .await
            .map_err(|e| DriveError::read_failure(format!("bigquery request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(DriveError::read_failure(format!(
                "bigquery returned {status}: {}",
                google_error_message(&body)
            )));
        }

        response
            .json()
            .await
            .map_err(|e| DriveError::read_failure(format!("invalid bigquery response: {e}")))
    }

    async fn query_results(&self, job: &JobReference, page_token: Option<&str>) -> Result<QueryResponse> {
        let url = format!("{}/queries/{}", self.project_url, urlencoding::encode(&job.job_id));
        let mut params = vec![
            ("maxResults", self.page_size.to_string()),
            ("timeoutMs", POLL_TIMEOUT_MS.to_string()),
        ];
        if let Some(location) = &job.location {
            params.push(("location", location.clone()));
        }
        if let Some(token) = page_token {
            params.push(("pageToken", token.to_string()));
        }
        self.send(self.http.get(url).query(&params)).await
    }

    /// Poll until the job reports completion.
    async fn complete(&self, mut response: QueryResponse, page_token: Option<&str>) -> Result<QueryResponse> {
        while !response.job_complete {
            let job = response
                .job_reference
                .clone()
                .ok_or_else(|| DriveError::read_failure("incomplete bigquery job without a job reference"))?;
            debug!(job_id = %job.job_id, "bigquery job still running");
            response = self.query_results(&job, page_token).await?;
        }
        Ok(response)
    }
}

#[async_trait]
impl WarehouseClient for BigQueryClient {
    async fn query(&self, sql: &str) -> Result<RowPage> {
        let body = json!({
            "query": sql,
            "useLegacySql": false,
            "maxResults": self.page_size,
            "timeoutMs": POLL_TIMEOUT_MS,
        });
        let url = format!("{}/queries", self.project_url);
        let response = self.send(self.http.post(url).json(&body)).await?;
        let response = self.complete(response, None).await?;
        into_page(response)
    }

    async fn next_page(&self, cursor: &PageCursor) -> Result<RowPage> {
        let job = JobReference {
            job_id: cursor.job_id.clone(),
            location: cursor.location.clone(),
        };
        let response = self.query_results(&job, Some(&cursor.page_token)).await?;
        let response = self.complete(response, Some(&cursor.page_token)).await?;
        into_page(response)
    }

    /// The REST client is stateless; there is no connection to close.
    async fn close(self: Box<Self>) -> Result<()> {
        Ok(())
    }
}

fn into_page(response: QueryResponse) -> Result<RowPage> {
    let schema = response.schema.unwrap_or_default();
    let rows = response
        .rows
        .into_iter()
        .map(|row| decode_row(&schema.fields, row.f))
        .collect::<Result<Vec<_>>>()?;

    let next = match (response.page_token, response.job_reference) {
        (Some(page_token), Some(job)) => Some(PageCursor {
            job_id: job.job_id,
            location: job.location,
            page_token,
        }),
        (Some(_), None) => {
            return Err(DriveError::read_failure(
                "bigquery page token without a job reference",
            ));
        }
        _ => None,
    };

    Ok(RowPage { rows, next })
}

fn decode_row(fields: &[FieldSchema], cells: Vec<TableCell>) -> Result<Record> {
    if fields.len() != cells.len() {
        return Err(DriveError::read_failure(format!(
            "bigquery row has {} cells but the schema has {} fields",
            cells.len(),
            fields.len()
        )));
    }

    let mut record = Map::with_capacity(fields.len());
    for (field, cell) in fields.iter().zip(cells) {
        record.insert(field.name.clone(), decode_cell(field, cell.v)?);
    }
    Ok(record)
}

fn decode_cell(field: &FieldSchema, raw: Value) -> Result<Value> {
    if raw.is_null() {
        return Ok(Value::Null);
    }

    if field.mode.as_deref() == Some("REPEATED") {
        let Value::Array(items) = raw else {
            return Err(DriveError::read_failure(format!(
                "repeated field {} is not an array",
                field.name
            )));
        };
        return items
            .into_iter()
            .map(|item| match item {
                Value::Object(mut wrapper) => {
                    decode_value(field, wrapper.remove("v").unwrap_or(Value::Null))
                }
                other => decode_value(field, other),
            })
            .collect::<Result<Vec<_>>>()
            .map(Value::Array);
    }

    decode_value(field, raw)
}

fn decode_value(field: &FieldSchema, raw: Value) -> Result<Value> {
    if raw.is_null() {
        return Ok(Value::Null);
    }

    match field.field_type.as_str() {
        "RECORD" | "STRUCT" => {
            let cells = match raw {
                Value::Object(mut row) => row.remove("f").unwrap_or(Value::Null),
                other => other,
            };
            let cells: Vec<TableCell> = serde_json::from_value(cells).map_err(|e| {
                DriveError::read_failure(format!("record field {} is malformed: {e}", field.name))
            })?;
            decode_row(&field.fields, cells).map(Value::Object)
        }
        "INTEGER" | "INT64" => Ok(text_of(&raw)
            .and_then(|s| s.parse::<i64>().ok())
            .map(|n| Value::Number(n.into()))
            .unwrap_or(raw)),
        "FLOAT" | "FLOAT64" => Ok(text_of(&raw)
            .and_then(|s| s.parse::<f64>().ok())
            .and_then(Number::from_f64)
            .map(Value::Number)
            .unwrap_or(raw)),
        "BOOLEAN" | "BOOL" => Ok(match text_of(&raw) {
            Some("true") => Value::Bool(true),
            Some("false") => Value::Bool(false),
            _ => raw,
        }),
        "TIMESTAMP" => Ok(text_of(&raw)
            .and_then(timestamp_to_rfc3339)
            .map(Value::String)
            .unwrap_or(raw)),
        _ => Ok(raw),
    }
}

fn text_of(raw: &Value) -> Option<&str> {
    raw.as_str()
}

/// TIMESTAMP cells arrive as floating-point seconds since the epoch.
fn timestamp_to_rfc3339(raw: &str) -> Option<String> {
    let seconds: f64 = raw.parse().ok()?;
    let whole = seconds.floor();
    let nanos = ((seconds - whole) * 1e9).round() as u32;
    DateTime::from_timestamp(whole as i64, nanos.min(999_999_999)).map(|dt| dt.to_rfc3339())
}

use super::warehouse::{ParamValue, QueryParam, Row, Warehouse};
use crate::Result;
use crate::http::{HttpRequest, RetryTransport};
use core::time::Duration;
use futures::FutureExt;
use futures::future::BoxFuture;
use ohno::{IntoAppError, app_err, bail};
use reqwest::{Method, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::{Value as JsonValue, json};
use url::Url;

const LOG_TARGET: &str = "  bigquery";

/// Root of the BigQuery v2 REST API.
pub const DEFAULT_BIGQUERY_URL: &str = "https://bigquery.googleapis.com/bigquery/v2";

/// Location used for datasets and jobs unless configured otherwise.
pub const DEFAULT_LOCATION: &str = "US";

/// How long the server may hold a query or poll request open waiting for completion.
const QUERY_WAIT_MS: u64 = 10_000;

/// [`Warehouse`] backed by the BigQuery REST API.
#[derive(Debug, Clone)]
pub struct BigQuery {
    http: RetryTransport,
    base_url: Url,
    project: String,
    location: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct QueryRequest<'a> {
    query: &'a str,
    use_legacy_sql: bool,
    parameter_mode: &'static str,
    query_parameters: Vec<JsonValue>,
    location: &'a str,
    timeout_ms: u64,
    format_options: JsonValue,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct QueryResponse {
    #[serde(default)]
    job_complete: bool,
    job_reference: Option<JobReference>,
    schema: Option<Schema>,
    #[serde(default)]
    rows: Vec<RawRow>,
    #[serde(default)]
    errors: Vec<JobError>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct JobReference {
    job_id: String,
    location: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Schema {
    #[serde(default)]
    fields: Vec<SchemaField>,
}

#[derive(Debug, Deserialize)]
struct SchemaField {
    name: String,
}

#[derive(Debug, Deserialize)]
struct RawRow {
    f: Vec<RawCell>,
}

#[derive(Debug, Deserialize)]
struct RawCell {
    v: JsonValue,
}

#[derive(Debug, Deserialize)]
struct JobError {
    message: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DatasetResource {
    default_table_expiration_ms: Option<String>,
}

fn encode_param(param: &QueryParam) -> JsonValue {
    let (kind, value) = match &param.value {
        ParamValue::String(s) => ("STRING", s.clone()),
        ParamValue::Timestamp(t) => ("TIMESTAMP", t.format("%Y-%m-%d %H:%M:%S%.6f+00:00").to_string()),
    };

    json!({
        "name": param.name,
        "parameterType": { "type": kind },
        "parameterValue": { "value": value },
    })
}

fn ttl_millis(ttl: Duration) -> String {
    ttl.as_millis().to_string()
}

impl QueryResponse {
    fn check_errors(&self) -> Result<()> {
        if let Some(first) = self.errors.first() {
            bail!("query failed: {}", first.message);
        }
        Ok(())
    }

    fn first_row(self) -> Option<Row> {
        let names: Vec<String> = self.schema?.fields.into_iter().map(|f| f.name).collect();
        let raw = self.rows.into_iter().next()?;
        Some(Row::new(names.into_iter().zip(raw.f.into_iter().map(|c| c.v)).collect()))
    }
}

impl BigQuery {
    #[must_use]
    pub fn new(http: RetryTransport, base_url: Url, project: impl Into<String>, location: impl Into<String>) -> Self {
        Self {
            http,
            base_url,
            project: project.into(),
            location: location.into(),
        }
    }

    fn url(&self, segments: &[&str]) -> Result<Url> {
        let mut url = self.base_url.clone();
        {
            let mut path = url
                .path_segments_mut()
                .map_err(|()| app_err!("'{}' cannot be used as a base URL", self.base_url))?;
            let _ = path.pop_if_empty().extend(["projects", self.project.as_str()]).extend(segments);
        }
        Ok(url)
    }

    /// Submit a query and poll until the job has completed.
    async fn run_query(&self, sql: &str, params: &[QueryParam]) -> Result<QueryResponse> {
        let body = QueryRequest {
            query: sql,
            use_legacy_sql: false,
            parameter_mode: "NAMED",
            query_parameters: params.iter().map(encode_param).collect(),
            location: &self.location,
            timeout_ms: QUERY_WAIT_MS,
            format_options: json!({ "useInt64Timestamp": true }),
        };

        let url = self.url(&["queries"])?;
        let mut response: QueryResponse = self
            .http
            .send(&HttpRequest::json(Method::POST, url, &body)?)
            .await?
            .error_for_status()?
            .json()?;
        response.check_errors()?;

        while !response.job_complete {
            let job = response.job_reference.as_ref().into_app_err("incomplete query response carries no job reference")?;
            log::debug!(target: LOG_TARGET, "Waiting for job {}", job.job_id);

            let mut url = self.url(&["queries", &job.job_id])?;
            let _ = url
                .query_pairs_mut()
                .append_pair("location", job.location.as_deref().unwrap_or(&self.location))
                .append_pair("timeoutMs", &QUERY_WAIT_MS.to_string())
                .append_pair("formatOptions.useInt64Timestamp", "true");

            response = self.http.send(&HttpRequest::get(url)).await?.error_for_status()?.json()?;
            response.check_errors()?;
        }

        Ok(response)
    }

    async fn dataset(&self, dataset: &str) -> Result<Option<DatasetResource>> {
        let response = self.http.send(&HttpRequest::get(self.url(&["datasets", dataset])?)).await?;
        if response.status == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        Ok(Some(response.error_for_status()?.json()?))
    }
}

impl Warehouse for BigQuery {
    fn project(&self) -> &str {
        &self.project
    }

    fn query_one<'a>(&'a self, sql: &'a str, params: &'a [QueryParam]) -> BoxFuture<'a, Result<Option<Row>>> {
        async move { Ok(self.run_query(sql, params).await?.first_row()) }.boxed()
    }

    fn execute<'a>(&'a self, sql: &'a str, params: &'a [QueryParam]) -> BoxFuture<'a, Result<()>> {
        async move {
            let _ = self.run_query(sql, params).await?;
            Ok(())
        }
        .boxed()
    }

    fn dataset_ttl<'a>(&'a self, dataset: &'a str) -> BoxFuture<'a, Result<Option<Option<Duration>>>> {
        async move {
            let Some(resource) = self.dataset(dataset).await? else {
                return Ok(None);
            };

            let ttl = resource
                .default_table_expiration_ms
                .map(|ms| {
                    ms.parse::<u64>()
                        .map(Duration::from_millis)
                        .into_app_err_with(|| format!("dataset '{dataset}' has an invalid table expiration '{ms}'"))
                })
                .transpose()?;
            Ok(Some(ttl))
        }
        .boxed()
    }

    fn create_dataset<'a>(&'a self, dataset: &'a str, ttl: Duration) -> BoxFuture<'a, Result<()>> {
        async move {
            log::info!(target: LOG_TARGET, "Creating dataset '{}.{dataset}'", self.project);
            let body = json!({
                "datasetReference": { "projectId": self.project, "datasetId": dataset },
                "location": self.location,
                "defaultTableExpirationMs": ttl_millis(ttl),
            });
            let _ = self
                .http
                .send(&HttpRequest::json(Method::POST, self.url(&["datasets"])?, &body)?)
                .await?
                .error_for_status()?;
            Ok(())
        }
        .boxed()
    }

    fn update_dataset_ttl<'a>(&'a self, dataset: &'a str, ttl: Duration) -> BoxFuture<'a, Result<()>> {
        async move {
            log::info!(target: LOG_TARGET, "Setting default table TTL of dataset '{dataset}' to {ttl:?}");
            let body = json!({ "defaultTableExpirationMs": ttl_millis(ttl) });
            let _ = self
                .http
                .send(&HttpRequest::json(Method::PATCH, self.url(&["datasets", dataset])?, &body)?)
                .await?
                .error_for_status()?;
            Ok(())
        }
        .boxed()
    }

    fn table_exists<'a>(&'a self, dataset: &'a str, table: &'a str) -> BoxFuture<'a, Result<bool>> {
        async move {
            let url = self.url(&["datasets", dataset, "tables", table])?;
            let response = self.http.send(&HttpRequest::get(url)).await?;
            if response.status == StatusCode::NOT_FOUND {
                return Ok(false);
            }
            let _ = response.error_for_status()?;
            Ok(true)
        }
        .boxed()
    }
}

//! A `UserStore` backed by the BigQuery REST API (v2).
//! Uses `jobs.query` with named parameters for reads and `tabledata.insertAll` for writes.
//! Access tokens come from Application Default Credentials and are fetched per request,
//! so the provider can refresh them before they expire.

use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use gcp_auth::TokenProvider;
use reqwest::{Client, Url};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, error};

use super::{InsertRowError, Result, StoreError, UserStore};
use crate::{
    config::StoreConfig,
    model::{NotificationMethod, PreferredUnits, UserRecord},
};

static NULL: Value = Value::Null;

const BIGQUERY_SCOPE: &str = "https://www.googleapis.com/auth/bigquery";

const COLUMNS: [&str; 6] = [
    "user_id",
    "email_id",
    "phone_number",
    "location",
    "notification_method",
    "preferred_units",
];

pub struct BigQueryClient {
    pub http_client: Client,
    pub base_url: Url,
    pub project_id: String,
    pub dataset_id: String,
    pub table_id: String,
    token_source: Arc<dyn TokenSource>,
    timeout: Duration,
}

/// Hands out the bearer token for the next request.
#[async_trait]
pub trait TokenSource: Send + Sync {
    async fn bearer_token(&self) -> Result<SecretString>;
}

/// A fixed token, for local runs against an emulator and for tests.
#[async_trait]
impl TokenSource for SecretString {
    async fn bearer_token(&self) -> Result<SecretString> {
        Ok(self.clone())
    }
}

/// Application Default Credentials. The provider caches the token and refreshes it before it expires.
#[async_trait]
impl TokenSource for Arc<dyn TokenProvider> {
    async fn bearer_token(&self) -> Result<SecretString> {
        let token = self.token(&[BIGQUERY_SCOPE]).await?;
        Ok(SecretString::from(token.as_str().to_string()))
    }
}

impl BigQueryClient {
    pub fn new<S: AsRef<str>>(
        base_url: S,
        project_id: String,
        dataset_id: String,
        table_id: String,
        token_source: Arc<dyn TokenSource>,
        timeout: Duration,
    ) -> Result<Self> {
        let mut base_url = base_url.as_ref().to_string();
        if !base_url.ends_with('/') {
            base_url.push('/');
        }
        let base_url = Url::parse(&base_url).map_err(|e| StoreError::UrlParsing(e.to_string()))?;

        let http_client = Client::builder().timeout(timeout).build()?;

        Ok(BigQueryClient {
            http_client,
            base_url,
            project_id,
            dataset_id,
            table_id,
            token_source,
            timeout,
        })
    }

    /// Uses `store_config.auth_token` when it is set, Application Default Credentials otherwise.
    pub async fn from_config(store_config: &StoreConfig) -> Result<Self> {
        let base_url = store_config.base_url()?;
        let token_source: Arc<dyn TokenSource> = match &store_config.auth_token {
            Some(token) => Arc::new(token.clone()),
            None => Arc::new(gcp_auth::provider().await?),
        };

        Self::new(
            base_url,
            store_config.project_id.clone(),
            store_config.dataset_id.clone(),
            store_config.table_id.clone(),
            token_source,
            store_config.timeout(),
        )
    }

    /// Fully qualified, backtick quoted table reference for Standard SQL.
    fn table_ref(&self) -> String {
        format!("`{}.{}.{}`", self.project_id, self.dataset_id, self.table_id)
    }

    fn endpoint(&self, path: &str) -> Result<Url> {
        self.base_url
            .join(path)
            .map_err(|e| StoreError::UrlParsing(e.to_string()))
    }

    /// Runs a query and returns the first page of its results.
    async fn query(&self, request: &QueryRequest<'_>) -> Result<QueryResponse> {
        let url = self.endpoint(&format!("projects/{}/queries", self.project_id))?;
        debug!("{:<12} - {}", "BQ_QUERY", request.query);

        let token = self.token_source.bearer_token().await?;
        let resp = self
            .http_client
            .post(url)
            .bearer_auth(token.expose_secret())
            .json(request)
            .send()
            .await?
            .error_for_status()?
            .json::<QueryResponse>()
            .await?;

        resp.ensure_complete()
    }

    /// Fetches the page of a finished query job that `page_token` points to.
    async fn query_page(&self, job: &JobReference, page_token: &str) -> Result<QueryResponse> {
        let url = self.endpoint(&format!(
            "projects/{}/queries/{}",
            job.project_id, job.job_id
        ))?;

        let timeout_ms = self.timeout.as_millis().to_string();
        let mut params = vec![("pageToken", page_token), ("timeoutMs", timeout_ms.as_str())];
        if let Some(location) = job.location.as_deref() {
            params.push(("location", location));
        }

        let token = self.token_source.bearer_token().await?;
        let resp = self
            .http_client
            .get(url)
            .bearer_auth(token.expose_secret())
            .query(&params)
            .send()
            .await?
            .error_for_status()?
            .json::<QueryResponse>()
            .await?;

        resp.ensure_complete()
    }

    fn timeout_ms(&self) -> u64 {
        u64::try_from(self.timeout.as_millis()).unwrap_or(u64::MAX)
    }
}

#[async_trait]
impl UserStore for BigQueryClient {
    fn backend(&self) -> &'static str {
        "bigquery"
    }

    #[tracing::instrument(name = "BigQuery count by user_id", skip(self))]
    async fn count_by_user_id(&self, user_id: &str) -> Result<u64> {
        let query = format!(
            "SELECT COUNT(*) AS user_count FROM {} WHERE user_id = @user_id",
            self.table_ref()
        );
        let request = QueryRequest {
            query: &query,
            use_legacy_sql: false,
            parameter_mode: Some("NAMED"),
            query_parameters: vec![QueryParameter::string("user_id", user_id)],
            timeout_ms: self.timeout_ms(),
        };

        let resp = self.query(&request).await?;
        let Some(row) = resp.rows.first() else {
            return Ok(0);
        };
        let column = resp.column_index("user_count")?;

        match row.f.get(column).map(|cell| &cell.v) {
            // INT64 values are returned as strings
            Some(Value::String(count)) => count.parse().map_err(|_| StoreError::RowDecode {
                row: 0,
                reason: format!("user_count is not an integer: {count}"),
            }),
            Some(Value::Number(count)) => count.as_u64().ok_or_else(|| StoreError::RowDecode {
                row: 0,
                reason: format!("user_count is not an unsigned integer: {count}"),
            }),
            _ => Err(StoreError::MissingColumn("user_count")),
        }
    }

    #[tracing::instrument(name = "BigQuery insert record", skip(self, record), fields(user_id = %record.user_id))]
    async fn insert_record(&self, record: &UserRecord) -> Result<Vec<InsertRowError>> {
        let url = self.endpoint(&format!(
            "projects/{}/datasets/{}/tables/{}/insertAll",
            self.project_id, self.dataset_id, self.table_id
        ))?;
        let body = InsertAllRequest {
            rows: vec![InsertRow { json: record }],
        };

        let token = self.token_source.bearer_token().await?;
        let resp = self
            .http_client
            .post(url)
            .bearer_auth(token.expose_secret())
            .json(&body)
            .send()
            .await?
            .error_for_status()?
            .json::<InsertAllResponse>()
            .await?;

        if !resp.insert_errors.is_empty() {
            error!("Encountered errors while inserting rows: {:?}", resp.insert_errors);
        }

        Ok(resp.insert_errors)
    }

    #[tracing::instrument(name = "BigQuery list all records", skip(self))]
    async fn list_all(&self) -> Result<Vec<UserRecord>> {
        let query = format!("SELECT {} FROM {}", COLUMNS.join(", "), self.table_ref());
        let request = QueryRequest {
            query: &query,
            use_legacy_sql: false,
            parameter_mode: None,
            query_parameters: Vec::new(),
            timeout_ms: self.timeout_ms(),
        };

        let mut resp = self.query(&request).await?;
        let columns = resp.columns()?;
        let mut records = Vec::new();

        loop {
            for row in &resp.rows {
                records.push(row.decode_record(records.len(), &columns)?);
            }

            match (resp.page_token.as_deref(), resp.job_reference.as_ref()) {
                (Some(token), Some(job)) => resp = self.query_page(job, token).await?,
                _ => break,
            }
        }

        Ok(records)
    }
}

// ###################################
// ->   WIRE TYPES
// ###################################
#[derive(Serialize, Debug)]
#[serde(rename_all = "camelCase")]
struct QueryRequest<'a> {
    query: &'a str,
    use_legacy_sql: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    parameter_mode: Option<&'static str>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    query_parameters: Vec<QueryParameter<'a>>,
    timeout_ms: u64,
}

#[derive(Serialize, Debug)]
#[serde(rename_all = "camelCase")]
struct QueryParameter<'a> {
    name: &'static str,
    parameter_type: ParameterType,
    parameter_value: ParameterValue<'a>,
}

impl<'a> QueryParameter<'a> {
    fn string(name: &'static str, value: &'a str) -> Self {
        QueryParameter {
            name,
            parameter_type: ParameterType { kind: "STRING" },
            parameter_value: ParameterValue { value },
        }
    }
}

#[derive(Serialize, Debug)]
struct ParameterType {
    #[serde(rename = "type")]
    kind: &'static str,
}

#[derive(Serialize, Debug)]
struct ParameterValue<'a> {
    value: &'a str,
}

#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
struct QueryResponse {
    #[serde(default)]
    job_complete: bool,
    job_reference: Option<JobReference>,
    schema: Option<TableSchema>,
    #[serde(default)]
    rows: Vec<TableRow>,
    page_token: Option<String>,
}

#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
struct JobReference {
    project_id: String,
    job_id: String,
    location: Option<String>,
}

#[derive(Deserialize, Debug)]
struct TableSchema {
    #[serde(default)]
    fields: Vec<FieldSchema>,
}

#[derive(Deserialize, Debug)]
struct FieldSchema {
    name: String,
}

#[derive(Deserialize, Debug)]
struct TableRow {
    #[serde(default)]
    f: Vec<TableCell>,
}

#[derive(Deserialize, Debug)]
struct TableCell {
    #[serde(default)]
    v: Value,
}

#[derive(Serialize, Debug)]
struct InsertAllRequest<'a> {
    rows: Vec<InsertRow<'a>>,
}

#[derive(Serialize, Debug)]
struct InsertRow<'a> {
    json: &'a UserRecord,
}

#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
struct InsertAllResponse {
    #[serde(default)]
    insert_errors: Vec<InsertRowError>,
}

/// Positions of the `UserRecord` columns inside a result row.
struct Columns {
    user_id: usize,
    email_id: usize,
    phone_number: usize,
    location: usize,
    notification_method: usize,
    preferred_units: usize,
}

// ###################################
// ->   DECODING
// ###################################
impl QueryResponse {
    fn ensure_complete(self) -> Result<Self> {
        if self.job_complete {
            return Ok(self);
        }
        let job_id = self
            .job_reference
            .as_ref()
            .map(|job| job.job_id.clone())
            .unwrap_or_default();
        Err(StoreError::JobIncomplete { job_id })
    }

    fn column_index(&self, name: &'static str) -> Result<usize> {
        let schema = self.schema.as_ref().ok_or(StoreError::MissingSchema)?;
        schema
            .fields
            .iter()
            .position(|field| field.name == name)
            .ok_or(StoreError::MissingColumn(name))
    }

    fn columns(&self) -> Result<Columns> {
        Ok(Columns {
            user_id: self.column_index("user_id")?,
            email_id: self.column_index("email_id")?,
            phone_number: self.column_index("phone_number")?,
            location: self.column_index("location")?,
            notification_method: self.column_index("notification_method")?,
            preferred_units: self.column_index("preferred_units")?,
        })
    }
}

impl TableRow {
    fn decode_record(&self, row: usize, columns: &Columns) -> Result<UserRecord> {
        let decode_err = |reason: String| StoreError::RowDecode { row, reason };

        let required = |idx: usize, name: &str| {
            self.optional_string(idx)
                .ok_or_else(|| decode_err(format!("{name} is null or not a string")))
        };

        let notification_method = match self.cell(columns.notification_method) {
            Value::Array(cells) => cells
                .iter()
                .map(|cell| {
                    cell.get("v")
                        .and_then(Value::as_str)
                        .and_then(NotificationMethod::parse)
                        .ok_or_else(|| decode_err(format!("invalid notification_method: {cell}")))
                })
                .collect::<Result<Vec<_>>>()?,
            Value::Null => Vec::new(),
            other => {
                return Err(decode_err(format!(
                    "notification_method is not repeated: {other}"
                )))
            }
        };

        let preferred_units = match self.optional_string(columns.preferred_units) {
            Some(units) => PreferredUnits::parse(&units)
                .ok_or_else(|| decode_err(format!("invalid preferred_units: {units}")))?,
            None => PreferredUnits::default(),
        };

        Ok(UserRecord {
            user_id: required(columns.user_id, "user_id")?,
            email_id: self.optional_string(columns.email_id),
            phone_number: self.optional_string(columns.phone_number),
            location: required(columns.location, "location")?,
            notification_method,
            preferred_units,
        })
    }

    fn cell(&self, idx: usize) -> &Value {
        self.f.get(idx).map(|cell| &cell.v).unwrap_or(&NULL)
    }

    fn optional_string(&self, idx: usize) -> Option<String> {
        self.cell(idx).as_str().map(str::to_string)
    }
}

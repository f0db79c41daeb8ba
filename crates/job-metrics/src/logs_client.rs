// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Boundary to the CloudWatch Logs Insights query service.
//!
//! [`LogsQueryClient`] is the only surface the fetcher depends on: start a query and ask for
//! its status and results. [`HttpLogsClient`] speaks the service's JSON 1.1 protocol over
//! `reqwest`. Requests are not signed, so the client only talks to local emulators or to an
//! endpoint behind a SigV4 signing proxy. Extra headers can be attached through
//! [`HttpLogsClientConfig`].

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, CONTENT_TYPE};
use reqwest::{Client, StatusCode, Url};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::errors::LogsClientError;

const AMZ_TARGET_HEADER: &str = "X-Amz-Target";
const AMZ_JSON_CONTENT_TYPE: &str = "application/x-amz-json-1.1";
const START_QUERY_TARGET: &str = "Logs_20140328.StartQuery";
const GET_QUERY_RESULTS_TARGET: &str = "Logs_20140328.GetQueryResults";

pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Operations the fetcher needs from the log query service.
#[async_trait]
pub trait LogsQueryClient: Send + Sync {
    /// Submits a query and returns the id the service assigned to it.
    async fn start_query(&self, request: &StartQueryRequest) -> Result<String, LogsClientError>;

    /// Returns the current status of a query, with its matched records once it is complete.
    async fn get_query_results(&self, query_id: &str) -> Result<QueryResults, LogsClientError>;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StartQueryRequest {
    pub log_group_name: String,
    /// Epoch seconds, inclusive.
    pub start_time: i64,
    /// Epoch seconds, inclusive.
    pub end_time: i64,
    pub query_string: String,
    pub limit: u32,
}

/// Lifecycle state of a query as reported by the service.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(from = "String")]
pub enum QueryStatus {
    Scheduled,
    Running,
    Complete,
    Failed,
    Cancelled,
    /// The query hit the service's own execution limit.
    Timeout,
    Unknown,
    Other(String),
}

impl QueryStatus {
    /// `Failed` and `Cancelled` end the query without results.
    pub fn is_failure(&self) -> bool {
        matches!(self, Self::Failed | Self::Cancelled)
    }

    pub fn is_complete(&self) -> bool {
        matches!(self, Self::Complete)
    }
}

impl From<&str> for QueryStatus {
    fn from(value: &str) -> Self {
        match value {
            "Scheduled" => Self::Scheduled,
            "Running" => Self::Running,
            "Complete" => Self::Complete,
            "Failed" => Self::Failed,
            "Cancelled" => Self::Cancelled,
            "Timeout" => Self::Timeout,
            "Unknown" => Self::Unknown,
            other => Self::Other(other.to_string()),
        }
    }
}

impl From<String> for QueryStatus {
    fn from(value: String) -> Self {
        Self::from(value.as_str())
    }
}

impl fmt::Display for QueryStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Scheduled => "Scheduled",
            Self::Running => "Running",
            Self::Complete => "Complete",
            Self::Failed => "Failed",
            Self::Cancelled => "Cancelled",
            Self::Timeout => "Timeout",
            Self::Unknown => "Unknown",
            Self::Other(other) => other,
        };
        f.write_str(name)
    }
}

/// One named field of a matched log record.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ResultField {
    pub field: String,
    #[serde(default)]
    pub value: String,
}

impl ResultField {
    pub fn new(field: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            value: value.into(),
        }
    }
}

/// A matched log record, as an ordered list of fields.
pub type LogRecord = Vec<ResultField>;

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryStatistics {
    #[serde(default)]
    pub records_matched: f64,
    #[serde(default)]
    pub records_scanned: f64,
    #[serde(default)]
    pub bytes_scanned: f64,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryResults {
    pub status: QueryStatus,
    #[serde(default)]
    pub results: Vec<LogRecord>,
    #[serde(default)]
    pub statistics: Option<QueryStatistics>,
}

impl QueryResults {
    /// A status-only response, as returned while the query is still running.
    pub fn with_status(status: QueryStatus) -> Self {
        Self {
            status,
            results: Vec::new(),
            statistics: None,
        }
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct StartQueryResponse {
    query_id: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GetQueryResultsRequest<'a> {
    query_id: &'a str,
}

#[derive(Deserialize)]
struct ServiceErrorBody {
    #[serde(rename = "__type", default)]
    error_type: Option<String>,
    #[serde(alias = "Message", default)]
    message: Option<String>,
}

/// Settings for [`HttpLogsClient`].
#[derive(Debug, Clone)]
pub struct HttpLogsClientConfig {
    /// Service endpoint, e.g. `https://logs.us-west-2.amazonaws.com`.
    pub endpoint: String,
    /// Per-request timeout.
    pub timeout: Duration,
    /// Headers attached to every request.
    pub default_headers: HeaderMap,
}

impl HttpLogsClientConfig {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            timeout: DEFAULT_REQUEST_TIMEOUT,
            default_headers: HeaderMap::new(),
        }
    }
}

/// [`LogsQueryClient`] backed by the CloudWatch Logs JSON API.
#[derive(Debug, Clone)]
pub struct HttpLogsClient {
    client: Client,
    endpoint: Url,
}

impl HttpLogsClient {
    pub fn new(config: HttpLogsClientConfig) -> Result<Self, LogsClientError> {
        let endpoint = Url::parse(&config.endpoint)
            .map_err(|e| LogsClientError::InvalidEndpoint(format!("{}: {e}", config.endpoint)))?;
        if !matches!(endpoint.scheme(), "http" | "https") {
            return Err(LogsClientError::InvalidEndpoint(config.endpoint));
        }

        let mut headers = config.default_headers;
        headers.insert(CONTENT_TYPE, HeaderValue::from_static(AMZ_JSON_CONTENT_TYPE));

        let client = Client::builder()
            .timeout(config.timeout)
            .default_headers(headers)
            .build()?;

        Ok(Self { client, endpoint })
    }

    pub fn endpoint(&self) -> &str {
        self.endpoint.as_str()
    }

    async fn call<B, T>(&self, operation: &'static str, body: &B) -> Result<T, LogsClientError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let payload = serde_json::to_vec(body)?;
        debug!(
            operation,
            url = %self.endpoint,
            body_len = payload.len(),
            "logs HTTP request"
        );

        let response = self
            .client
            .post(self.endpoint.clone())
            .header(AMZ_TARGET_HEADER, operation)
            .body(payload)
            .send()
            .await?;

        let status = response.status();
        let bytes = response.bytes().await?;
        debug!(
            operation,
            status = %status,
            content_length = bytes.len(),
            "logs HTTP response"
        );

        if !status.is_success() {
            return Err(service_error(status, &bytes));
        }

        Ok(serde_json::from_slice(&bytes)?)
    }
}

#[async_trait]
impl LogsQueryClient for HttpLogsClient {
    async fn start_query(&self, request: &StartQueryRequest) -> Result<String, LogsClientError> {
        let response: StartQueryResponse = self.call(START_QUERY_TARGET, request).await?;
        Ok(response.query_id)
    }

    async fn get_query_results(&self, query_id: &str) -> Result<QueryResults, LogsClientError> {
        self.call(GET_QUERY_RESULTS_TARGET, &GetQueryResultsRequest { query_id })
            .await
    }
}

/// Maps an AWS JSON error body (`{"__type": "...#Name", "message": "..."}`) to an error.
fn service_error(status: StatusCode, body: &[u8]) -> LogsClientError {
    let parsed: Option<ServiceErrorBody> = serde_json::from_slice(body).ok();
    let (error_type, message) = match parsed {
        Some(ServiceErrorBody {
            error_type,
            message,
        }) => (error_type, message),
        None => (None, None),
    };

    let error_type = error_type
        .map(|t| match t.rsplit_once('#') {
            Some((_, name)) => name.to_string(),
            None => t,
        })
        .unwrap_or_else(|| "UnknownError".to_string());
    let message = message.unwrap_or_else(|| String::from_utf8_lossy(body).into_owned());

    LogsClientError::Service {
        status: status.as_u16(),
        error_type,
        message,
    }
}

// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use crate::logs_client::QueryStatus;

/// Failures talking to the log query service.
#[derive(Debug, thiserror::Error)]
pub enum LogsClientError {
    /// The service answered with a non-success status.
    #[error("logs service returned status {status} ({error_type}): {message}")]
    Service {
        status: u16,
        error_type: String,
        message: String,
    },
    /// Transport-level issue (DNS, TLS, socket, timeout).
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),
    /// The response body was not the expected JSON document.
    #[error("failed to decode logs service response: {0}")]
    Decode(#[from] serde_json::Error),
    #[error("invalid logs endpoint: {0}")]
    InvalidEndpoint(String),
}

/// Errors surfaced by a metrics fetch. A query that does not finish in time is not an error.
#[derive(Debug, thiserror::Error)]
pub enum MetricsRetrievalError {
    /// The query could not be started. Nothing was submitted.
    #[error("Failed to start query on log group {log_group}: {source}")]
    Submission {
        log_group: String,
        #[source]
        source: LogsClientError,
    },

    /// The query reached a failed terminal state on the service.
    #[error("Query {query_id} failed with status {status}.")]
    QueryFailed {
        query_id: String,
        status: QueryStatus,
    },

    /// Checking the status of a submitted query failed.
    #[error("Failed to get results for query {query_id}: {source}")]
    StatusCheck {
        query_id: String,
        #[source]
        source: LogsClientError,
    },
}

/// Invalid fetcher or client configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

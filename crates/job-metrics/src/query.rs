// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Builds and submits the Logs Insights query that selects a job's metric lines.

use std::time::{SystemTime, UNIX_EPOCH};

use tracing::debug;

use crate::constants::{
    LOG_GROUP_NAME, METRICS_MARKER, QUERY_DEFAULT_JOB_DURATION, QUERY_RESULT_LIMIT,
};
use crate::errors::MetricsRetrievalError;
use crate::logs_client::{LogsQueryClient, StartQueryRequest};

/// Time range searched by a query, in epoch seconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueryWindow {
    pub start_time: i64,
    pub end_time: i64,
}

impl QueryWindow {
    /// Fills in missing bounds: the end defaults to `now`, the start to
    /// [`QUERY_DEFAULT_JOB_DURATION`] before the end.
    pub fn resolve(start_time: Option<i64>, end_time: Option<i64>, now: i64) -> Self {
        let end_time = end_time.unwrap_or(now);
        let start_time = start_time.unwrap_or(end_time - QUERY_DEFAULT_JOB_DURATION);
        Self {
            start_time,
            end_time,
        }
    }

    /// Same as [`QueryWindow::resolve`] using the wall clock.
    pub fn resolve_now(start_time: Option<i64>, end_time: Option<i64>) -> Self {
        Self::resolve(start_time, end_time, epoch_seconds_now())
    }
}

fn epoch_seconds_now() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| i64::try_from(elapsed.as_secs()).unwrap_or(i64::MAX))
        .unwrap_or_default()
}

/// Query matching metric lines from log streams named `<stream_prefix>/...`.
pub fn build_query_string(stream_prefix: &str) -> String {
    format!(
        "fields @timestamp, @message \
         | filter @logStream like /^{stream_prefix}\\// \
         | filter @message like /{METRICS_MARKER}/"
    )
}

/// Starts the metrics query for a job and returns the query id.
///
/// `stream_prefix` falls back to the job name. A failure here is final: the caller gets
/// [`MetricsRetrievalError::Submission`] and nothing is retried.
pub async fn submit_query(
    client: &dyn LogsQueryClient,
    job_name: &str,
    stream_prefix: Option<&str>,
    window: QueryWindow,
) -> Result<String, MetricsRetrievalError> {
    let stream_prefix = stream_prefix.unwrap_or(job_name);
    let request = StartQueryRequest {
        log_group_name: LOG_GROUP_NAME.to_string(),
        start_time: window.start_time,
        end_time: window.end_time,
        query_string: build_query_string(stream_prefix),
        limit: QUERY_RESULT_LIMIT,
    };

    let query_id = client
        .start_query(&request)
        .await
        .map_err(|source| MetricsRetrievalError::Submission {
            log_group: LOG_GROUP_NAME.to_string(),
            source,
        })?;

    debug!(
        query_id = %query_id,
        job_name,
        stream_prefix,
        start_time = window.start_time,
        end_time = window.end_time,
        "Started metrics query"
    );

    Ok(query_id)
}

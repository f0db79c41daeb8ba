// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Waits for a submitted query to finish.
//!
//! The status is polled at a fixed interval until the query completes, fails, or the local
//! poll budget runs out. Running out of budget is not an error: a warning is logged and no
//! records are returned. The query itself keeps running on the service.

use std::time::Duration;

use tokio::time::{sleep, Instant};
use tracing::{debug, warn};

use crate::constants::{DEFAULT_POLL_INTERVAL, DEFAULT_POLL_TIMEOUT, QUERY_RESULT_LIMIT};
use crate::errors::MetricsRetrievalError;
use crate::logs_client::{LogRecord, LogsQueryClient, QueryResults};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueryPoller {
    poll_timeout: Duration,
    poll_interval: Duration,
}

impl Default for QueryPoller {
    fn default() -> Self {
        Self::new(DEFAULT_POLL_TIMEOUT, DEFAULT_POLL_INTERVAL)
    }
}

impl QueryPoller {
    pub fn new(poll_timeout: Duration, poll_interval: Duration) -> Self {
        Self {
            poll_timeout,
            poll_interval,
        }
    }

    pub fn poll_timeout(&self) -> Duration {
        self.poll_timeout
    }

    pub fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    /// Polls `query_id` until it reaches a terminal state or the poll timeout elapses.
    ///
    /// Returns the matched records when the query completes and an empty list on timeout.
    /// `Failed` and `Cancelled` end polling with [`MetricsRetrievalError::QueryFailed`].
    /// A timeout too large to be represented as an instant means no deadline.
    pub async fn wait_for_results(
        &self,
        client: &dyn LogsQueryClient,
        query_id: &str,
    ) -> Result<Vec<LogRecord>, MetricsRetrievalError> {
        let deadline = Instant::now().checked_add(self.poll_timeout);
        let mut attempts: u32 = 0;

        while !deadline.is_some_and(|deadline| Instant::now() >= deadline) {
            attempts += 1;
            let response = client.get_query_results(query_id).await.map_err(|source| {
                MetricsRetrievalError::StatusCheck {
                    query_id: query_id.to_string(),
                    source,
                }
            })?;

            if response.status.is_failure() {
                return Err(MetricsRetrievalError::QueryFailed {
                    query_id: query_id.to_string(),
                    status: response.status,
                });
            }

            if response.status.is_complete() {
                debug!(
                    query_id,
                    attempts,
                    records = response.results.len(),
                    "Query complete"
                );
                warn_if_truncated(query_id, &response);
                return Ok(response.results);
            }

            debug!(query_id, attempts, status = %response.status, "Query not finished yet");
            sleep(self.poll_interval).await;
        }

        warn!("Timed out waiting for query {query_id}.");
        Ok(Vec::new())
    }
}

/// The service stops returning records at the query limit; the rest are silently dropped.
fn warn_if_truncated(query_id: &str, response: &QueryResults) {
    let returned = response.results.len();
    let matched = response
        .statistics
        .as_ref()
        .map_or(0.0, |statistics| statistics.records_matched);

    if returned >= QUERY_RESULT_LIMIT as usize || matched > returned as f64 {
        warn!(
            query_id,
            returned,
            matched,
            "Query results were truncated, metrics may be incomplete."
        );
    }
}

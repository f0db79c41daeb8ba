// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Fetches the metrics logged by a hybrid job.
//!
//! A fetch runs three stages back to back: the metrics query is submitted, the poller waits
//! for it to finish, and every matched record is fed to a fresh [`MetricsParser`] to build
//! the [`MetricsTable`].

use std::marker::PhantomData;
use std::sync::Arc;

use tracing::debug;

use crate::config::FetcherConfig;
use crate::constants::{MESSAGE_FIELD, TIMESTAMP_FIELD};
use crate::definitions::{MetricStatistic, MetricType, MetricsTable};
use crate::errors::MetricsRetrievalError;
use crate::logs_client::{LogRecord, LogsQueryClient, ResultField};
use crate::parser::{LogMetricsParser, MetricsParser};
use crate::poller::QueryPoller;
use crate::query::{submit_query, QueryWindow};

/// Parameters of one metrics fetch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetricsRequest {
    /// Exact name of the job. Also the stream prefix unless `stream_prefix` is set.
    pub job_name: String,
    pub metric_type: MetricType,
    pub statistic: MetricStatistic,
    /// Epoch seconds. Defaults to three hours before `job_end_time`.
    pub job_start_time: Option<i64>,
    /// Epoch seconds. Defaults to now.
    pub job_end_time: Option<i64>,
    pub stream_prefix: Option<String>,
}

impl MetricsRequest {
    pub fn new(job_name: impl Into<String>) -> Self {
        Self {
            job_name: job_name.into(),
            metric_type: MetricType::default(),
            statistic: MetricStatistic::default(),
            job_start_time: None,
            job_end_time: None,
            stream_prefix: None,
        }
    }

    #[must_use]
    pub fn with_metric_type(mut self, metric_type: MetricType) -> Self {
        self.metric_type = metric_type;
        self
    }

    #[must_use]
    pub fn with_statistic(mut self, statistic: MetricStatistic) -> Self {
        self.statistic = statistic;
        self
    }

    #[must_use]
    pub fn with_start_time(mut self, job_start_time: i64) -> Self {
        self.job_start_time = Some(job_start_time);
        self
    }

    #[must_use]
    pub fn with_end_time(mut self, job_end_time: i64) -> Self {
        self.job_end_time = Some(job_end_time);
        self
    }

    #[must_use]
    pub fn with_stream_prefix(mut self, stream_prefix: impl Into<String>) -> Self {
        self.stream_prefix = Some(stream_prefix.into());
        self
    }
}

/// Retrieves job metrics through CloudWatch Logs Insights.
///
/// The fetcher keeps no state between calls besides its client and poll settings, so one
/// instance can serve concurrent fetches.
pub struct CwlInsightsMetricsFetcher<P = LogMetricsParser> {
    logs_client: Arc<dyn LogsQueryClient>,
    poller: QueryPoller,
    parser: PhantomData<fn() -> P>,
}

impl CwlInsightsMetricsFetcher {
    pub fn new(logs_client: Arc<dyn LogsQueryClient>, config: &FetcherConfig) -> Self {
        Self::with_parser(logs_client, config)
    }
}

impl<P> CwlInsightsMetricsFetcher<P>
where
    P: MetricsParser + Default,
{
    /// Builds a fetcher that aggregates records with a custom parser type.
    pub fn with_parser(logs_client: Arc<dyn LogsQueryClient>, config: &FetcherConfig) -> Self {
        Self {
            logs_client,
            poller: QueryPoller::new(config.poll_timeout, config.poll_interval),
            parser: PhantomData,
        }
    }

    pub fn poller(&self) -> &QueryPoller {
        &self.poller
    }

    /// Retrieves every metric logged by the job described in `request`.
    ///
    /// Returns an empty table when the query does not finish within the poll timeout.
    pub async fn get_metrics_for_job(
        &self,
        request: &MetricsRequest,
    ) -> Result<MetricsTable, MetricsRetrievalError> {
        let window = QueryWindow::resolve_now(request.job_start_time, request.job_end_time);
        let query_id = submit_query(
            self.logs_client.as_ref(),
            &request.job_name,
            request.stream_prefix.as_deref(),
            window,
        )
        .await?;

        let results = self
            .poller
            .wait_for_results(self.logs_client.as_ref(), &query_id)
            .await?;

        Ok(parse_log_query_results(
            &results,
            P::default(),
            request.metric_type,
            request.statistic,
        ))
    }
}

/// Value of the first field named `name`, if any.
pub fn find_field<'a>(name: &str, record: &'a [ResultField]) -> Option<&'a str> {
    record
        .iter()
        .find(|element| element.field == name)
        .map(|element| element.value.as_str())
}

/// Feeds a record's message and timestamp to the parser. Returns false when the record
/// has no message and was skipped.
fn parse_log_line<P: MetricsParser>(record: &[ResultField], parser: &mut P) -> bool {
    match find_field(MESSAGE_FIELD, record) {
        Some(message) if !message.is_empty() => {
            let timestamp = find_field(TIMESTAMP_FIELD, record);
            parser.ingest(timestamp, message);
            true
        }
        _ => false,
    }
}

fn parse_log_query_results<P: MetricsParser>(
    results: &[LogRecord],
    mut parser: P,
    metric_type: MetricType,
    statistic: MetricStatistic,
) -> MetricsTable {
    let mut skipped = 0usize;
    for record in results {
        if !parse_log_line(record, &mut parser) {
            skipped += 1;
        }
    }
    debug!(
        records = results.len(),
        skipped,
        %metric_type,
        %statistic,
        "Parsed metrics query results"
    );
    parser.finalize(metric_type, statistic)
}

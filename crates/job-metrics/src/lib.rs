// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Retrieval of algorithm metrics logged by hybrid jobs.
//!
//! Metrics are found by running a CloudWatch Logs Insights query over the jobs log group,
//! waiting for the query to finish, and folding every matched `Metrics - ` line into a
//! columnar [`MetricsTable`](definitions::MetricsTable).
//!
//! [`HttpLogsClient`](logs_client::HttpLogsClient) does not sign its requests. It is meant for
//! local emulators and for endpoints behind a SigV4 signing proxy, not for calling CloudWatch
//! Logs directly. Any other service client can be plugged in by implementing
//! [`LogsQueryClient`](logs_client::LogsQueryClient).

#![cfg_attr(not(test), deny(clippy::panic))]
#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]
#![cfg_attr(not(test), deny(clippy::todo))]
#![cfg_attr(not(test), deny(clippy::unimplemented))]

pub mod config;
pub mod constants;
pub mod definitions;
pub mod errors;
pub mod fetcher;
pub mod logs_client;
pub mod parser;
pub mod poller;
pub mod query;

pub use definitions::{MetricStatistic, MetricType, MetricValue, MetricsTable};
pub use errors::MetricsRetrievalError;
pub use fetcher::{CwlInsightsMetricsFetcher, MetricsRequest};

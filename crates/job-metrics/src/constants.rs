// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::time::Duration;

/// Log group every hybrid job writes its output to.
pub const LOG_GROUP_NAME: &str = "/aws/braket/jobs";

/// Query window used when the caller gives no start time, in seconds.
pub const QUERY_DEFAULT_JOB_DURATION: i64 = 3 * 60 * 60;

/// Maximum number of records a single query may return.
pub const QUERY_RESULT_LIMIT: u32 = 10_000;

/// Substring that marks a log line as carrying metrics.
pub const METRICS_MARKER: &str = "Metrics - ";

pub const DEFAULT_POLL_TIMEOUT: Duration = Duration::from_secs(10);
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);

pub const MESSAGE_FIELD: &str = "@message";
pub const TIMESTAMP_FIELD: &str = "@timestamp";

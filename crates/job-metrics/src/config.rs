// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::env;
use std::time::Duration;

use crate::constants::{DEFAULT_POLL_INTERVAL, DEFAULT_POLL_TIMEOUT};
use crate::errors::ConfigError;
use crate::logs_client::{HttpLogsClientConfig, DEFAULT_REQUEST_TIMEOUT};

pub const POLL_TIMEOUT_ENV: &str = "JOB_METRICS_POLL_TIMEOUT_SECONDS";
pub const POLL_INTERVAL_ENV: &str = "JOB_METRICS_POLL_INTERVAL_SECONDS";
pub const LOGS_ENDPOINT_ENV: &str = "JOB_METRICS_LOGS_ENDPOINT";
pub const REQUEST_TIMEOUT_ENV: &str = "JOB_METRICS_REQUEST_TIMEOUT_SECONDS";

/// Poll settings of a [`CwlInsightsMetricsFetcher`](crate::fetcher::CwlInsightsMetricsFetcher).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetcherConfig {
    /// How long to wait for a query to finish before giving up with an empty result.
    pub poll_timeout: Duration,
    /// Pause between two status checks.
    pub poll_interval: Duration,
}

impl Default for FetcherConfig {
    fn default() -> Self {
        Self {
            poll_timeout: DEFAULT_POLL_TIMEOUT,
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }
}

impl FetcherConfig {
    /// Create configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        let poll_timeout = seconds_from_env(POLL_TIMEOUT_ENV)?.unwrap_or(DEFAULT_POLL_TIMEOUT);
        let poll_interval = seconds_from_env(POLL_INTERVAL_ENV)?.unwrap_or(DEFAULT_POLL_INTERVAL);

        let config = Self {
            poll_timeout,
            poll_interval,
        };

        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.poll_interval.is_zero() {
            return Err(ConfigError::InvalidConfig(
                "poll interval must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }
}

impl HttpLogsClientConfig {
    /// Reads the endpoint and request timeout from the environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        let endpoint = env::var(LOGS_ENDPOINT_ENV)
            .ok()
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
            .ok_or_else(|| {
                ConfigError::InvalidConfig(format!("{LOGS_ENDPOINT_ENV} is not set"))
            })?;
        let timeout = seconds_from_env(REQUEST_TIMEOUT_ENV)?.unwrap_or(DEFAULT_REQUEST_TIMEOUT);

        let mut config = Self::new(endpoint);
        config.timeout = timeout;
        Ok(config)
    }
}

/// Fractional seconds from `name`. Unset or non-numeric values yield `None`; negative or
/// non-finite numbers are rejected.
fn seconds_from_env(name: &str) -> Result<Option<Duration>, ConfigError> {
    let Some(seconds) = env::var(name)
        .ok()
        .and_then(|value| value.trim().parse::<f64>().ok())
    else {
        return Ok(None);
    };

    Duration::try_from_secs_f64(seconds).map(Some).map_err(|_| {
        ConfigError::InvalidConfig(format!(
            "{name} must be a non-negative number of seconds, got {seconds}"
        ))
    })
}

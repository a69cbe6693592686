// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use crate::constants::{
    DEFAULT_HARVEST_INTERVAL, DEFAULT_HOST, DEFAULT_IMMEDIATE_FLUSH_PREFIXES,
    DEFAULT_SERVICE_NAME, DEFAULT_SHUTDOWN_TIMEOUT, DEFAULT_TIMEOUT, HARVEST_INTERVAL_ENV,
    HOST_ENV, IMMEDIATE_FLUSH_PREFIXES_ENV, INSERT_KEY_ENV, PROXY_HTTPS_ENV, SERVICE_NAME_ENV,
};
use crate::errors::ConfigError;
use std::env;
use std::time::Duration;

/// Everything needed to build a harvester.
#[derive(Clone)]
pub struct HarvesterConfig {
    /// New Relic insert key used to authenticate metric submissions
    pub insert_key: String,
    /// Metric API host, e.g. metric-api.newrelic.com or metric-api.eu.newrelic.com
    pub host: String,
    /// Value of the `service.name` attribute attached to every batch
    pub service_name: String,
    /// How often the background loop harvests the batch
    pub harvest_interval: Duration,
    /// Metric names starting with one of these are flushed as soon as recorded
    pub immediate_flush_prefixes: Vec<String>,
    /// Timeout of a single delivery request
    pub timeout: Duration,
    /// Upper bound on how long `stop` waits for the final harvest
    pub shutdown_timeout: Duration,
    pub https_proxy: Option<String>,
}

impl Default for HarvesterConfig {
    fn default() -> Self {
        Self {
            insert_key: String::new(),
            host: DEFAULT_HOST.to_string(),
            service_name: DEFAULT_SERVICE_NAME.to_string(),
            harvest_interval: DEFAULT_HARVEST_INTERVAL,
            immediate_flush_prefixes: DEFAULT_IMMEDIATE_FLUSH_PREFIXES
                .iter()
                .map(|prefix| prefix.to_string())
                .collect(),
            timeout: DEFAULT_TIMEOUT,
            shutdown_timeout: DEFAULT_SHUTDOWN_TIMEOUT,
            https_proxy: None,
        }
    }
}

impl std::fmt::Debug for HarvesterConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HarvesterConfig")
            .field("insert_key", &"<redacted>")
            .field("host", &self.host)
            .field("service_name", &self.service_name)
            .field("harvest_interval", &self.harvest_interval)
            .field("immediate_flush_prefixes", &self.immediate_flush_prefixes)
            .field("timeout", &self.timeout)
            .field("shutdown_timeout", &self.shutdown_timeout)
            .field("https_proxy", &self.https_proxy)
            .finish()
    }
}

impl HarvesterConfig {
    /// Create configuration from environment variables.
    ///
    /// The insert key is required. Its absence is reported as
    /// [`ConfigError::MissingCredential`], never defaulted.
    pub fn from_env() -> Result<Self, ConfigError> {
        let insert_key =
            env::var(INSERT_KEY_ENV).map_err(|_| ConfigError::MissingCredential(INSERT_KEY_ENV))?;
        let host = env::var(HOST_ENV)
            .ok()
            .filter(|host| !host.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_HOST.to_string());
        let service_name =
            env::var(SERVICE_NAME_ENV).unwrap_or_else(|_| DEFAULT_SERVICE_NAME.to_string());
        let harvest_interval = env::var(HARVEST_INTERVAL_ENV)
            .ok()
            .and_then(|secs| secs.trim().parse::<u64>().ok())
            .map(Duration::from_secs)
            .unwrap_or(DEFAULT_HARVEST_INTERVAL);
        let immediate_flush_prefixes = match env::var(IMMEDIATE_FLUSH_PREFIXES_ENV) {
            Ok(prefixes) => parse_prefixes(&prefixes),
            Err(_) => Self::default().immediate_flush_prefixes,
        };
        let https_proxy = env::var(PROXY_HTTPS_ENV)
            .or_else(|_| env::var("HTTPS_PROXY"))
            .ok();

        let config = Self {
            insert_key,
            host,
            service_name,
            harvest_interval,
            immediate_flush_prefixes,
            https_proxy,
            ..Default::default()
        };

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.insert_key.trim().is_empty() {
            return Err(ConfigError::MissingCredential(INSERT_KEY_ENV));
        }

        if self.host.trim().is_empty() {
            return Err(ConfigError::Invalid("host cannot be empty".to_string()));
        }

        if self.harvest_interval.is_zero() {
            return Err(ConfigError::Invalid(
                "harvest interval must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }
}

/// Splits a comma separated prefix list, dropping blanks. An empty list turns
/// immediate flushing off.
pub fn parse_prefixes(prefixes: &str) -> Vec<String> {
    prefixes
        .split(',')
        .map(str::trim)
        .filter(|prefix| !prefix.is_empty())
        .map(str::to_string)
        .collect()
}

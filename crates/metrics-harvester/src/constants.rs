// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::time::Duration;

pub const INSERT_KEY_ENV: &str = "NEW_RELIC_INSERT_KEY";
pub const HOST_ENV: &str = "NEW_RELIC_HOST";
pub const SERVICE_NAME_ENV: &str = "NEW_RELIC_SERVICE_NAME";
pub const HARVEST_INTERVAL_ENV: &str = "NEW_RELIC_HARVEST_INTERVAL";
pub const IMMEDIATE_FLUSH_PREFIXES_ENV: &str = "NEW_RELIC_IMMEDIATE_FLUSH_PREFIXES";
pub const PROXY_HTTPS_ENV: &str = "NEW_RELIC_PROXY_HTTPS";

pub const DEFAULT_HOST: &str = "metric-api.newrelic.com";
pub const DEFAULT_SERVICE_NAME: &str = "Airflow";
/// Matches the telemetry SDK's standard harvest period.
pub const DEFAULT_HARVEST_INTERVAL: Duration = Duration::from_secs(5);
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);
pub const DEFAULT_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(10);
pub const DEFAULT_IMMEDIATE_FLUSH_PREFIXES: &[&str] = &["ti_", "dagrun.duration."];

pub const SERVICE_NAME_ATTRIBUTE: &str = "service.name";
pub const UNITS_TAG: &str = "units";
pub const MICROSECONDS: &str = "microseconds";

pub const METRIC_API_PATH: &str = "/metric/v1";

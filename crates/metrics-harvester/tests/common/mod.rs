// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use metrics_harvester::{Harvester, HarvesterConfig, HarvesterRegistry};
use std::time::Duration;

pub const INSERT_KEY: &str = "mock-insert-key";

/// Config pointing at a local mock Metric API.
pub fn config_for(server_url: String) -> HarvesterConfig {
    HarvesterConfig {
        insert_key: INSERT_KEY.to_string(),
        host: server_url,
        harvest_interval: Duration::from_secs(3600),
        timeout: Duration::from_secs(2),
        shutdown_timeout: Duration::from_secs(5),
        ..Default::default()
    }
}

/// A registry that lives for the rest of the test binary.
pub fn leaked_registry(config: HarvesterConfig) -> &'static HarvesterRegistry {
    Box::leak(Box::new(HarvesterRegistry::new(move || {
        Harvester::from_config(&config)
    })))
}

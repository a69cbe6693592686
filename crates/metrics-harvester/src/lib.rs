// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! In-memory metric buffering with periodic harvesting to the New Relic Metric
//! API, plus immediate flushing for latency-sensitive metric names.

#![cfg_attr(not(test), deny(clippy::panic))]
#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]
#![cfg_attr(not(test), deny(clippy::todo))]
#![cfg_attr(not(test), deny(clippy::unimplemented))]

pub mod batch;
pub mod client;
pub mod config;
pub mod constants;
pub mod errors;
pub mod flusher;
pub mod harvester;
pub mod metric;
pub mod registry;
pub mod stats;
pub mod timer;

mod test_support;

pub use batch::{DrainedBatch, MetricBatch};
pub use client::{DeliveryClient, DeliveryResponse, MetricClient};
pub use config::HarvesterConfig;
pub use errors::{ConfigError, DeliveryError, StatsError, TimerError};
pub use harvester::{Harvester, HarvesterState};
pub use metric::{MetricObservation, Tags, Timing};
pub use registry::HarvesterRegistry;
pub use stats::{stats_logger_from_env, HarvesterStatsLogger, NoopStatsLogger, StatsLogger};
pub use timer::{Timer, TimerGuard, TimingSink};

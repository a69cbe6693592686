// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! The metrics façade handed to the host application.

use crate::constants::INSERT_KEY_ENV;
use crate::errors::StatsError;
use crate::metric::Timing;
use crate::registry::HarvesterRegistry;
use crate::timer::{Timer, TimingSink};
use std::sync::Arc;
use tracing::info;

/// Stats capability installed into the host.
pub trait StatsLogger: TimingSink {
    fn incr(&self, name: &str, count: i64) -> Result<(), StatsError>;

    /// `incr` by one, the usual case for event counters.
    fn incr_one(&self, name: &str) -> Result<(), StatsError> {
        self.incr(name, 1)
    }

    /// Decrementing is not supported by the harvesting backend.
    fn decr(&self, _name: &str, _count: i64) -> Result<(), StatsError> {
        Err(StatsError::NotImplemented("decr"))
    }

    fn gauge(&self, name: &str, value: f64) -> Result<(), StatsError>;

    /// A timer reporting to this logger. Without a name the timer reports
    /// nowhere.
    fn timer(&self, name: Option<&str>) -> Timer;
}

/// Records into the current process's harvester.
#[derive(Clone)]
pub struct HarvesterStatsLogger {
    registry: &'static HarvesterRegistry,
}

impl HarvesterStatsLogger {
    pub fn new(registry: &'static HarvesterRegistry) -> Self {
        HarvesterStatsLogger { registry }
    }

    pub fn global() -> Self {
        Self::new(HarvesterRegistry::global())
    }
}

impl TimingSink for HarvesterStatsLogger {
    fn timing(&self, name: &str, value: Timing) -> Result<(), StatsError> {
        let harvester = self.registry.resolve()?;
        let (value, tags) = value.into_gauge();
        harvester.batch().record_gauge(name, value, tags);
        harvester.send_for_metric(name);
        Ok(())
    }
}

impl StatsLogger for HarvesterStatsLogger {
    fn incr(&self, name: &str, count: i64) -> Result<(), StatsError> {
        let harvester = self.registry.resolve()?;
        harvester.batch().record_count(name, count as f64, None);
        harvester.send_for_metric(name);
        Ok(())
    }

    fn gauge(&self, name: &str, value: f64) -> Result<(), StatsError> {
        let harvester = self.registry.resolve()?;
        harvester.batch().record_gauge(name, value, None);
        harvester.send_for_metric(name);
        Ok(())
    }

    fn timer(&self, name: Option<&str>) -> Timer {
        match name {
            Some(name) if !name.is_empty() => Timer::new(Arc::new(self.clone()), name),
            _ => Timer::noop(),
        }
    }
}

/// Accepts everything and records nothing. Used when no credential is
/// configured.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoopStatsLogger;

impl TimingSink for NoopStatsLogger {
    fn timing(&self, _name: &str, _value: Timing) -> Result<(), StatsError> {
        Ok(())
    }
}

impl StatsLogger for NoopStatsLogger {
    fn incr(&self, _name: &str, _count: i64) -> Result<(), StatsError> {
        Ok(())
    }

    fn gauge(&self, _name: &str, _value: f64) -> Result<(), StatsError> {
        Ok(())
    }

    fn timer(&self, _name: Option<&str>) -> Timer {
        Timer::noop()
    }
}

/// Picks the stats logger for this process: the harvester-backed one when an
/// insert key is configured, the no-op one otherwise. A blank key counts as
/// missing, as it does for [`HarvesterConfig::validate`].
///
/// [`HarvesterConfig::validate`]: crate::config::HarvesterConfig::validate
pub fn stats_logger_from_env() -> Arc<dyn StatsLogger> {
    let insert_key = std::env::var(INSERT_KEY_ENV)
        .ok()
        .filter(|key| !key.trim().is_empty());
    if insert_key.is_some() {
        info!("Using harvester stats logger");
        Arc::new(HarvesterStatsLogger::global())
    } else {
        info!("{INSERT_KEY_ENV} not set, metrics will not be recorded");
        Arc::new(NoopStatsLogger)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::batch::MetricBatch;
    use crate::config::HarvesterConfig;
    use crate::errors::{ConfigError, TimerError};
    use crate::harvester::Harvester;
    use crate::metric::{MetricObservation, Tags};
    use crate::test_support::{MockClient, MockMode};
    use serial_test::serial;
    use std::sync::OnceLock;
    use std::time::Duration;

    // Each test gets its own leaked registry and mock client.
    fn logger() -> (HarvesterStatsLogger, Arc<MockClient>) {
        let client = Arc::new(MockClient::new(MockMode::Accept));
        let factory_client = Arc::clone(&client);
        let registry = Box::leak(Box::new(HarvesterRegistry::new(move || {
            let config = HarvesterConfig {
                insert_key: "mock-insert-key".to_string(),
                harvest_interval: Duration::from_secs(3600),
                ..Default::default()
            };
            Harvester::new(
                MetricBatch::new(Tags::from([(
                    "service.name".to_string(),
                    "Airflow".to_string(),
                )])),
                factory_client.clone(),
                &config,
            )
        })));
        (HarvesterStatsLogger::new(registry), client)
    }

    fn pending(logger: &HarvesterStatsLogger) -> Vec<MetricObservation> {
        logger.registry.resolve().expect("resolve").batch().drain().observations
    }

    #[test]
    fn test_incr_records_count() {
        let (logger, client) = logger();
        logger.incr("scheduler.tasks.running", 1).expect("incr");
        logger.incr("scheduler.tasks.running", 3).expect("incr");

        assert_eq!(client.calls(), 0);
        assert_eq!(
            pending(&logger),
            vec![
                MetricObservation::Count {
                    name: "scheduler.tasks.running".to_string(),
                    value: 1.0,
                    tags: None,
                },
                MetricObservation::Count {
                    name: "scheduler.tasks.running".to_string(),
                    value: 3.0,
                    tags: None,
                },
            ]
        );
    }

    #[test]
    fn test_incr_of_immediate_metric_flushes() {
        let (logger, client) = logger();
        logger.incr("ti_success", 1).expect("incr");

        assert_eq!(client.calls(), 1);
        let batches = client.batches();
        assert_eq!(
            batches[0].common_attributes.get("service.name").map(String::as_str),
            Some("Airflow")
        );
        assert!(pending(&logger).is_empty());
    }

    #[test]
    fn test_gauge_records_gauge() {
        let (logger, client) = logger();
        logger.gauge("executor.open_slots", 32.0).expect("gauge");

        assert_eq!(client.calls(), 0);
        assert_eq!(
            pending(&logger),
            vec![MetricObservation::Gauge {
                name: "executor.open_slots".to_string(),
                value: 32.0,
                tags: None,
            }]
        );
    }

    #[test]
    fn test_timing_with_duration() {
        let (logger, _client) = logger();
        logger
            .timing("dag.loading-duration", Timing::Duration(Duration::new(2, 500_000)))
            .expect("timing");

        assert_eq!(
            pending(&logger),
            vec![MetricObservation::Gauge {
                name: "dag.loading-duration".to_string(),
                value: 2_000_500.0,
                tags: Some(Tags::from([(
                    "units".to_string(),
                    "microseconds".to_string()
                )])),
            }]
        );
    }

    #[test]
    fn test_timing_with_scalar() {
        let (logger, _client) = logger();
        logger.timing("dag.loading-duration", Timing::Scalar(3.5)).expect("timing");

        assert_eq!(
            pending(&logger),
            vec![MetricObservation::Gauge {
                name: "dag.loading-duration".to_string(),
                value: 3.5,
                tags: None,
            }]
        );
    }

    #[test]
    fn test_timing_of_immediate_metric_flushes() {
        let (logger, client) = logger();
        logger
            .timing("dagrun.duration.success.example", Timing::Scalar(10.0))
            .expect("timing");
        assert_eq!(client.calls(), 1);
    }

    #[test]
    fn test_decr_is_not_implemented() {
        let (logger, client) = logger();
        for (name, count) in [("ti_success", 1), ("dag.latency", -5), ("", 0)] {
            assert!(matches!(
                logger.decr(name, count),
                Err(StatsError::NotImplemented("decr"))
            ));
        }
        assert!(matches!(
            NoopStatsLogger.decr("ti_success", 1),
            Err(StatsError::NotImplemented("decr"))
        ));
        assert_eq!(client.calls(), 0);
    }

    #[test]
    fn test_named_timer_reports_to_logger() {
        let (logger, client) = logger();
        let mut timer = logger.timer(Some("ti_duration.example"));
        assert!(!timer.is_noop());
        timer.start();
        timer.stop(true).expect("stop");

        assert_eq!(client.calls(), 1);
        let observations = client.sent_observations();
        assert_eq!(observations[0].name(), "ti_duration.example");
        assert_eq!(
            observations[0].tags().and_then(|t| t.get("units")).map(String::as_str),
            Some("microseconds")
        );
        assert!(matches!(timer.send(), Err(TimerError::AlreadySent)));
    }

    #[test]
    fn test_unnamed_timer_is_noop() {
        let (logger, client) = logger();
        for name in [None, Some("")] {
            let mut timer = logger.timer(name);
            assert!(timer.is_noop());
            timer.start();
            timer.stop(true).expect("stop");
        }
        assert_eq!(client.calls(), 0);
        assert!(pending(&logger).is_empty());
    }

    #[test]
    fn test_config_error_reaches_caller() {
        static REGISTRY: OnceLock<HarvesterRegistry> = OnceLock::new();
        let registry = REGISTRY.get_or_init(|| {
            HarvesterRegistry::new(|| Err(ConfigError::MissingCredential("NEW_RELIC_INSERT_KEY")))
        });
        let logger = HarvesterStatsLogger::new(registry);

        assert!(matches!(
            logger.incr("ti_success", 1),
            Err(StatsError::Config(ConfigError::MissingCredential(_)))
        ));
        let mut timer = logger.timer(Some("ti_duration"));
        timer.start();
        assert!(matches!(
            timer.stop(true),
            Err(TimerError::Sink(StatsError::Config(_)))
        ));
    }

    #[test]
    #[serial]
    fn test_stats_logger_from_env() {
        std::env::remove_var(INSERT_KEY_ENV);
        let logger = stats_logger_from_env();
        assert!(logger.timer(Some("ti_duration")).is_noop());
        assert!(logger.incr("ti_success", 1).is_ok());

        std::env::set_var(INSERT_KEY_ENV, "_not_a_real_key_");
        let logger = stats_logger_from_env();
        assert!(!logger.timer(Some("ti_duration")).is_noop());
        std::env::remove_var(INSERT_KEY_ENV);
    }

    #[test]
    #[serial]
    fn test_stats_logger_from_env_with_blank_key() {
        for blank in ["", "   "] {
            std::env::set_var(INSERT_KEY_ENV, blank);
            let logger = stats_logger_from_env();
            assert!(logger.timer(Some("ti_duration")).is_noop());
            assert!(logger.incr("scheduler_heartbeat", 1).is_ok());
            assert!(logger.incr("scheduler_heartbeat", 1).is_ok());
        }
        std::env::remove_var(INSERT_KEY_ENV);
    }

    #[test]
    fn test_incr_one_counts_one() {
        let (logger, client) = logger();
        logger.incr_one("scheduler_heartbeat").expect("incr");
        logger.incr_one("ti_failures").expect("incr");

        assert_eq!(client.calls(), 1);
        let observations = client.sent_observations();
        assert_eq!(observations.len(), 2);
        assert!(observations
            .iter()
            .all(|o| o.kind() == "count" && o.value() == 1.0));
    }
}

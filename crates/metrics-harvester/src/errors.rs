// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

/// Raised while building a harvester from its configuration. Never swallowed.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing telemetry credential: {0} is not set")]
    MissingCredential(&'static str),

    #[error("Invalid configuration: {0}")]
    Invalid(String),

    #[error("Failed to start harvester runtime: {0}")]
    Runtime(String),
}

/// Catastrophic delivery failures. Ordinary transport failures are reported
/// through a non-ok `DeliveryResponse` instead.
#[derive(Debug, thiserror::Error)]
pub enum DeliveryError {
    #[error("Failed to prepare payload: {0}")]
    Payload(String),
}

#[derive(Debug, thiserror::Error)]
pub enum StatsError {
    #[error("{0} is not implemented")]
    NotImplemented(&'static str),

    #[error(transparent)]
    Config(#[from] ConfigError),
}

#[derive(Debug, thiserror::Error)]
pub enum TimerError {
    #[error("Timer has not started")]
    NotStarted,

    #[error("No data recorded")]
    NoData,

    #[error("Already sent data")]
    AlreadySent,

    #[error("Failed to report timing: {0}")]
    Sink(#[from] StatsError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let error = ConfigError::MissingCredential("NEW_RELIC_INSERT_KEY");
        assert_eq!(
            error.to_string(),
            "Missing telemetry credential: NEW_RELIC_INSERT_KEY is not set"
        );
        assert_eq!(
            StatsError::NotImplemented("decr").to_string(),
            "decr is not implemented"
        );
    }

    #[test]
    fn test_config_error_converts_into_stats_error() {
        let error: StatsError = ConfigError::Invalid("empty host".to_string()).into();
        assert!(matches!(error, StatsError::Config(ConfigError::Invalid(_))));
        assert_eq!(error.to_string(), "Invalid configuration: empty host");
    }

    #[test]
    fn test_timer_errors_are_distinct() {
        assert_eq!(TimerError::NotStarted.to_string(), "Timer has not started");
        assert_eq!(TimerError::NoData.to_string(), "No data recorded");
        assert_eq!(TimerError::AlreadySent.to_string(), "Already sent data");
    }
}

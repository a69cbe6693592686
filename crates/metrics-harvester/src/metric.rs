// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use crate::constants::{MICROSECONDS, UNITS_TAG};
use std::collections::BTreeMap;
use std::time::Duration;

pub type Tags = BTreeMap<String, String>;

/// A single recorded measurement. Tags are merged with the batch's common
/// attributes by the receiving end.
#[derive(Clone, Debug, PartialEq)]
pub enum MetricObservation {
    Count {
        name: String,
        value: f64,
        tags: Option<Tags>,
    },
    Gauge {
        name: String,
        value: f64,
        tags: Option<Tags>,
    },
}

impl MetricObservation {
    pub fn name(&self) -> &str {
        match self {
            Self::Count { name, .. } | Self::Gauge { name, .. } => name,
        }
    }

    pub fn value(&self) -> f64 {
        match self {
            Self::Count { value, .. } | Self::Gauge { value, .. } => *value,
        }
    }

    pub fn tags(&self) -> Option<&Tags> {
        match self {
            Self::Count { tags, .. } | Self::Gauge { tags, .. } => tags.as_ref(),
        }
    }

    /// Wire name of the metric type.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Count { .. } => "count",
            Self::Gauge { .. } => "gauge",
        }
    }
}

/// Input of a timing call: either a measured duration or a bare number the
/// caller already converted.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Timing {
    Duration(Duration),
    Scalar(f64),
}

impl Timing {
    /// Gauge value and tags recorded for this timing. Durations are reported in
    /// whole microseconds and tagged with their unit.
    pub fn into_gauge(self) -> (f64, Option<Tags>) {
        match self {
            Timing::Duration(duration) => {
                let mut tags = Tags::new();
                tags.insert(UNITS_TAG.to_string(), MICROSECONDS.to_string());
                (duration.as_micros() as f64, Some(tags))
            }
            Timing::Scalar(value) => (value, None),
        }
    }
}

impl From<Duration> for Timing {
    fn from(duration: Duration) -> Self {
        Timing::Duration(duration)
    }
}

impl From<f64> for Timing {
    fn from(value: f64) -> Self {
        Timing::Scalar(value)
    }
}

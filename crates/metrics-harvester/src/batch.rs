// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use crate::metric::{MetricObservation, Tags};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{SystemTime, UNIX_EPOCH};

/// Everything captured by one drain of a [`MetricBatch`].
#[derive(Clone, Debug, Default, PartialEq)]
pub struct DrainedBatch {
    pub observations: Vec<MetricObservation>,
    pub common_attributes: Tags,
    /// Start of the captured interval, in milliseconds since the epoch.
    pub timestamp_ms: u64,
    pub interval_ms: u64,
}

impl DrainedBatch {
    pub fn is_empty(&self) -> bool {
        self.observations.is_empty()
    }

    pub fn len(&self) -> usize {
        self.observations.len()
    }
}

struct BatchState {
    observations: Vec<MetricObservation>,
    interval_start: SystemTime,
}

/// Accumulates observations between harvests.
///
/// The common attributes are fixed at construction. Recording and draining
/// serialize on the batch's own lock, so a drain never returns an observation
/// twice and never loses one recorded concurrently.
pub struct MetricBatch {
    state: Mutex<BatchState>,
    common_attributes: Tags,
}

impl MetricBatch {
    pub fn new(common_attributes: Tags) -> Self {
        MetricBatch {
            state: Mutex::new(BatchState {
                observations: Vec::with_capacity(128), // arbitrary initial capacity
                interval_start: SystemTime::now(),
            }),
            common_attributes,
        }
    }

    pub fn common_attributes(&self) -> &Tags {
        &self.common_attributes
    }

    pub fn record_count(&self, name: &str, delta: f64, tags: Option<Tags>) {
        self.record(MetricObservation::Count {
            name: name.to_string(),
            value: delta,
            tags,
        });
    }

    pub fn record_gauge(&self, name: &str, value: f64, tags: Option<Tags>) {
        self.record(MetricObservation::Gauge {
            name: name.to_string(),
            value,
            tags,
        });
    }

    pub fn record(&self, observation: MetricObservation) {
        self.lock().observations.push(observation);
    }

    /// Empties the batch and returns what it held, starting a new interval.
    pub fn drain(&self) -> DrainedBatch {
        let now = SystemTime::now();
        let (observations, interval_start) = {
            let mut state = self.lock();
            let observations = std::mem::take(&mut state.observations);
            let interval_start = std::mem::replace(&mut state.interval_start, now);
            (observations, interval_start)
        };

        let interval_ms = now
            .duration_since(interval_start)
            .map(|d| d.as_millis() as u64)
            .unwrap_or_default();
        let timestamp_ms = interval_start
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or_default();

        DrainedBatch {
            observations,
            common_attributes: self.common_attributes.clone(),
            timestamp_ms,
            interval_ms,
        }
    }

    pub fn len(&self) -> usize {
        self.lock().observations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().observations.is_empty()
    }

    // Recording never panics while holding the lock, but a poisoned batch must
    // keep accepting metrics.
    fn lock(&self) -> MutexGuard<'_, BatchState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

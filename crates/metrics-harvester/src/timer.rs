// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use crate::errors::{StatsError, TimerError};
use crate::metric::Timing;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::warn;

/// Anything that accepts a timing measurement.
pub trait TimingSink: Send + Sync {
    fn timing(&self, name: &str, value: Timing) -> Result<(), StatsError>;
}

/// Measures wall-clock time and reports it to a sink exactly once per
/// start/stop cycle.
///
/// A timer built without a sink keeps the same state machine but reports
/// nowhere, for callers that want the scoping without a destination metric.
pub struct Timer {
    sink: Option<Arc<dyn TimingSink>>,
    name: String,
    started_at: Option<Instant>,
    elapsed: Option<Duration>,
    sent: bool,
}

impl Timer {
    pub fn new(sink: Arc<dyn TimingSink>, name: impl Into<String>) -> Self {
        Timer {
            sink: Some(sink),
            name: name.into(),
            started_at: None,
            elapsed: None,
            sent: false,
        }
    }

    pub fn noop() -> Self {
        Timer {
            sink: None,
            name: String::new(),
            started_at: None,
            elapsed: None,
            sent: false,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_noop(&self) -> bool {
        self.sink.is_none()
    }

    /// Duration measured by the last `stop`.
    pub fn elapsed(&self) -> Option<Duration> {
        self.elapsed
    }

    /// Starts a new cycle, discarding whatever the previous one measured.
    pub fn start(&mut self) -> &mut Self {
        self.sent = false;
        self.elapsed = None;
        self.started_at = Some(Instant::now());
        self
    }

    pub fn stop(&mut self, send: bool) -> Result<&mut Self, TimerError> {
        let started_at = self.started_at.ok_or(TimerError::NotStarted)?;
        self.elapsed = Some(started_at.elapsed());
        if send {
            self.send()?;
        }
        Ok(self)
    }

    pub fn send(&mut self) -> Result<(), TimerError> {
        let elapsed = self.elapsed.ok_or(TimerError::NoData)?;
        if self.sent {
            return Err(TimerError::AlreadySent);
        }
        self.sent = true;
        if let Some(sink) = &self.sink {
            sink.timing(&self.name, Timing::Duration(elapsed))?;
        }
        Ok(())
    }

    /// Starts the timer and stops-and-sends it when the guard goes out of
    /// scope, including during a panic.
    pub fn guard(&mut self) -> TimerGuard<'_> {
        self.start();
        TimerGuard {
            timer: self,
            cancelled: false,
        }
    }

    /// Runs `f` and reports how long it took, even if `f` panics.
    ///
    /// Each call measures independently and leaves the timer's own state
    /// untouched, so a shared timer can wrap concurrent work.
    pub fn time<T>(&self, f: impl FnOnce() -> T) -> T {
        let _report = ReportOnDrop {
            sink: self.sink.as_deref(),
            name: &self.name,
            started_at: Instant::now(),
        };
        f()
    }
}

impl std::fmt::Debug for Timer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Timer")
            .field("name", &self.name)
            .field("noop", &self.is_noop())
            .field("elapsed", &self.elapsed)
            .field("sent", &self.sent)
            .finish()
    }
}

/// Scoped measurement returned by [`Timer::guard`].
pub struct TimerGuard<'a> {
    timer: &'a mut Timer,
    cancelled: bool,
}

impl TimerGuard<'_> {
    /// Stops the timer without reporting.
    pub fn cancel(mut self) {
        self.cancelled = true;
        let _ = self.timer.stop(false);
    }
}

impl Drop for TimerGuard<'_> {
    fn drop(&mut self) {
        if self.cancelled {
            return;
        }
        if let Err(e) = self.timer.stop(true) {
            warn!("Failed to report timing {}: {e}", self.timer.name);
        }
    }
}

struct ReportOnDrop<'a> {
    sink: Option<&'a dyn TimingSink>,
    name: &'a str,
    started_at: Instant,
}

impl Drop for ReportOnDrop<'_> {
    fn drop(&mut self) {
        if let Some(sink) = self.sink {
            let elapsed = self.started_at.elapsed();
            if let Err(e) = sink.timing(self.name, Timing::Duration(elapsed)) {
                warn!("Failed to report timing {}: {e}", self.name);
            }
        }
    }
}

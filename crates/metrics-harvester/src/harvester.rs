// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Periodic and on-demand harvesting of a [`MetricBatch`].
//!
//! A harvester owns a small dedicated tokio runtime. Its single worker thread
//! runs the periodic harvest loop; synchronous callers (immediate flushes,
//! `stop`) hand futures to that runtime and wait on a std channel, which works
//! from plain threads as well as from inside another tokio runtime.

use crate::batch::MetricBatch;
use crate::client::{DeliveryClient, MetricClient};
use crate::config::HarvesterConfig;
use crate::constants::SERVICE_NAME_ATTRIBUTE;
use crate::errors::ConfigError;
use crate::flusher::{FlushOutcome, Flusher};
use crate::metric::Tags;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::runtime::{Handle, Runtime};
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn, Instrument, Span};

/// Lifecycle of the background harvest loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HarvesterState {
    /// Created, loop not started yet.
    Idle,
    Running,
    /// Stopped for good. A harvester is never restarted.
    Stopped,
}

struct LoopState {
    state: HarvesterState,
    handle: Option<JoinHandle<()>>,
}

// Dropping a runtime from async code panics; shutting it down in the
// background does not.
struct BackgroundRuntime(Option<Runtime>);

impl Drop for BackgroundRuntime {
    fn drop(&mut self) {
        if let Some(runtime) = self.0.take() {
            runtime.shutdown_background();
        }
    }
}

pub struct Harvester {
    flusher: Flusher,
    immediate_flush_prefixes: Vec<String>,
    harvest_interval: Duration,
    shutdown_timeout: Duration,
    cancel_token: CancellationToken,
    loop_state: Mutex<LoopState>,
    harvests: Arc<AtomicU64>,
    handle: Handle,
    _runtime: BackgroundRuntime,
}

impl Harvester {
    pub fn new(
        batch: MetricBatch,
        client: Arc<dyn DeliveryClient>,
        config: &HarvesterConfig,
    ) -> Result<Self, ConfigError> {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(1)
            .thread_name("metrics-harvester")
            .enable_all()
            .build()
            .map_err(|e| ConfigError::Runtime(e.to_string()))?;

        Ok(Harvester {
            flusher: Flusher::new(Arc::new(batch), client),
            immediate_flush_prefixes: config.immediate_flush_prefixes.clone(),
            harvest_interval: config.harvest_interval,
            shutdown_timeout: config.shutdown_timeout,
            cancel_token: CancellationToken::new(),
            loop_state: Mutex::new(LoopState {
                state: HarvesterState::Idle,
                handle: None,
            }),
            harvests: Arc::new(AtomicU64::new(0)),
            handle: runtime.handle().clone(),
            _runtime: BackgroundRuntime(Some(runtime)),
        })
    }

    /// Builds a harvester delivering to the New Relic Metric API, with a batch
    /// carrying the configured `service.name`.
    pub fn from_config(config: &HarvesterConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let client = Arc::new(MetricClient::new(config)?);
        let batch = MetricBatch::new(Tags::from([(
            SERVICE_NAME_ATTRIBUTE.to_string(),
            config.service_name.clone(),
        )]));
        Harvester::new(batch, client, config)
    }

    pub fn batch(&self) -> &MetricBatch {
        self.flusher.batch()
    }

    pub fn state(&self) -> HarvesterState {
        self.lock_state().state
    }

    pub fn is_running(&self) -> bool {
        self.state() == HarvesterState::Running
    }

    /// Number of periodic harvests completed so far.
    pub fn harvest_count(&self) -> u64 {
        self.harvests.load(Ordering::Acquire)
    }

    /// Starts the periodic harvest loop. Calling it again while running, or
    /// after [`Harvester::stop`], does nothing.
    pub fn start(&self) {
        let mut loop_state = self.lock_state();
        match loop_state.state {
            HarvesterState::Running => {
                debug!("Harvester already running");
                return;
            }
            HarvesterState::Stopped => {
                warn!("Harvester has been stopped and will not be restarted");
                return;
            }
            HarvesterState::Idle => {}
        }

        let flusher = self.flusher.clone();
        let cancel_token = self.cancel_token.clone();
        let harvests = Arc::clone(&self.harvests);
        let harvest_interval = self.harvest_interval;

        let harvest_loop = async move {
            let mut flush_interval = interval(harvest_interval);
            flush_interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            flush_interval.tick().await; // discard first tick, which is instantaneous

            loop {
                tokio::select! {
                    _ = flush_interval.tick() => {
                        debug!("Harvesting metrics");
                        flusher.flush().await;
                        harvests.fetch_add(1, Ordering::Release);
                    }
                    _ = cancel_token.cancelled() => {
                        debug!("Final harvest of metrics");
                        flusher.flush().await;
                        break;
                    }
                }
            }
            debug!("Harvest loop stopped");
        };

        loop_state.handle = Some(self.handle.spawn(harvest_loop.instrument(Span::current())));
        loop_state.state = HarvesterState::Running;
        debug!(
            "Harvester started, harvesting every {} ms",
            harvest_interval.as_millis()
        );
    }

    /// Stops the harvest loop after one final drain-and-send.
    ///
    /// Returns once the loop has exited or the shutdown timeout elapsed.
    /// Safe to call more than once and from process exit handlers.
    pub fn stop(&self) {
        let handle = {
            let mut loop_state = self.lock_state();
            if loop_state.state == HarvesterState::Stopped {
                return;
            }
            loop_state.state = HarvesterState::Stopped;
            loop_state.handle.take()
        };

        self.cancel_token.cancel();

        match handle {
            Some(handle) => {
                let shutdown_timeout = self.shutdown_timeout;
                let stopped = self.run_blocking(async move {
                    tokio::time::timeout(shutdown_timeout, handle).await
                });
                match stopped {
                    Some(Ok(Ok(()))) => debug!("Harvester stopped"),
                    Some(Ok(Err(e))) => error!("Harvest loop failed: {e}"),
                    Some(Err(_)) | None => {
                        warn!(
                            "Harvester did not stop within {} ms",
                            shutdown_timeout.as_millis()
                        )
                    }
                }
            }
            None => {
                // Never started: no loop to do the final harvest.
                self.flush_now();
            }
        }
    }

    /// Flushes right away, on the caller's thread, when `name` starts with one
    /// of the immediate-flush prefixes. Returns whether a flush was attempted.
    ///
    /// Delivery failures are logged and never reach the caller.
    pub fn send_for_metric(&self, name: &str) -> bool {
        if !self.flushes_immediately(name) {
            return false;
        }
        debug!("Immediate flush triggered by {name}");
        self.flush_now();
        true
    }

    pub fn flushes_immediately(&self, name: &str) -> bool {
        self.immediate_flush_prefixes
            .iter()
            .any(|prefix| name.starts_with(prefix.as_str()))
    }

    /// Drains the batch on the caller's thread and delivers it synchronously.
    pub fn flush_now(&self) -> FlushOutcome {
        let batch = self.flusher.batch().drain();
        if batch.is_empty() {
            return FlushOutcome::Empty;
        }
        let n_metrics = batch.len();
        let flusher = self.flusher.clone();
        match self.run_blocking(async move { flusher.flush_metrics(batch).await }) {
            Some(outcome) => outcome,
            None => {
                error!("Sending metrics failed: harvester runtime is gone");
                FlushOutcome::Failed(n_metrics)
            }
        }
    }

    fn run_blocking<F>(&self, future: F) -> Option<F::Output>
    where
        F: Future + Send + 'static,
        F::Output: Send + 'static,
    {
        let (tx, rx) = mpsc::sync_channel(1);
        self.handle.spawn(
            async move {
                let _ = tx.send(future.await);
            }
            .instrument(Span::current()),
        );
        rx.recv().ok()
    }

    fn lock_state(&self) -> MutexGuard<'_, LoopState> {
        self.loop_state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

impl std::fmt::Debug for Harvester {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Harvester")
            .field("state", &self.state())
            .field("immediate_flush_prefixes", &self.immediate_flush_prefixes)
            .field("harvest_interval", &self.harvest_interval)
            .finish()
    }
}

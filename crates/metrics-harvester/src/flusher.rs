// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use crate::batch::{DrainedBatch, MetricBatch};
use crate::client::DeliveryClient;
use std::sync::Arc;
use tracing::{debug, error};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FlushOutcome {
    /// Nothing was recorded since the previous drain.
    Empty,
    Sent(usize),
    /// The batch was dropped. Failed batches are never retried.
    Failed(usize),
}

/// Drains a batch and hands it to the delivery client. Shared by the periodic
/// harvest and the immediate flush path.
#[derive(Clone)]
pub struct Flusher {
    batch: Arc<MetricBatch>,
    client: Arc<dyn DeliveryClient>,
}

impl Flusher {
    pub fn new(batch: Arc<MetricBatch>, client: Arc<dyn DeliveryClient>) -> Self {
        Flusher { batch, client }
    }

    pub fn batch(&self) -> &Arc<MetricBatch> {
        &self.batch
    }

    /// Flush metrics from the batch. Must run inside a tokio runtime.
    pub async fn flush(&self) -> FlushOutcome {
        let batch = self.batch.drain();
        self.flush_metrics(batch).await
    }

    /// Ship an already drained batch. Every failure, including a panicking
    /// client, is logged once and swallowed.
    pub async fn flush_metrics(&self, batch: DrainedBatch) -> FlushOutcome {
        if batch.is_empty() {
            return FlushOutcome::Empty;
        }
        let n_metrics = batch.len();
        debug!("Flushing {n_metrics} metrics");

        let client = Arc::clone(&self.client);
        let send_handle = tokio::spawn(async move { client.send_batch(&batch).await });

        match send_handle.await {
            Ok(Ok(response)) if response.ok => {
                debug!("Successfully flushed {n_metrics} metrics");
                FlushOutcome::Sent(n_metrics)
            }
            Ok(Ok(response)) => {
                error!(
                    "Sending metrics failed with status code: {:?} {}",
                    response.status, response.reason
                );
                FlushOutcome::Failed(n_metrics)
            }
            Ok(Err(e)) => {
                error!("Sending metrics failed with an error: {e}");
                FlushOutcome::Failed(n_metrics)
            }
            Err(e) => {
                error!("Sending metrics failed with an exception: {e}");
                FlushOutcome::Failed(n_metrics)
            }
        }
    }
}

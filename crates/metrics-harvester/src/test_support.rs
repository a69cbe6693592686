// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Delivery client doubles shared by the unit tests.

#![cfg(test)]

use crate::batch::DrainedBatch;
use crate::client::{DeliveryClient, DeliveryResponse};
use crate::errors::DeliveryError;
use crate::metric::MetricObservation;
use async_trait::async_trait;
use reqwest::StatusCode;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

#[derive(Clone, Copy, Debug)]
pub(crate) enum MockMode {
    Accept,
    Reject,
    Error,
    Panic,
}

/// Records every batch it is handed and answers according to its mode.
pub(crate) struct MockClient {
    mode: MockMode,
    calls: AtomicUsize,
    batches: Mutex<Vec<DrainedBatch>>,
}

impl MockClient {
    pub(crate) fn new(mode: MockMode) -> Self {
        MockClient {
            mode,
            calls: AtomicUsize::new(0),
            batches: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub(crate) fn sent_observations(&self) -> Vec<MetricObservation> {
        self.batches
            .lock()
            .unwrap()
            .iter()
            .flat_map(|batch| batch.observations.clone())
            .collect()
    }

    pub(crate) fn batches(&self) -> Vec<DrainedBatch> {
        self.batches.lock().unwrap().clone()
    }
}

#[async_trait]
impl DeliveryClient for MockClient {
    async fn send_batch(&self, batch: &DrainedBatch) -> Result<DeliveryResponse, DeliveryError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.batches.lock().unwrap().push(batch.clone());
        match self.mode {
            MockMode::Accept => Ok(DeliveryResponse::from_status(StatusCode::ACCEPTED, "")),
            MockMode::Reject => Ok(DeliveryResponse::from_status(
                StatusCode::SERVICE_UNAVAILABLE,
                "try again later",
            )),
            MockMode::Error => Err(DeliveryError::Payload("unencodable".to_string())),
            MockMode::Panic => panic!("delivery client blew up"),
        }
    }
}

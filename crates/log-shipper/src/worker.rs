// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Background worker that drains the queue into batches and delivers them.
//!
//! # Cycle
//!
//! ```text
//!   ┌──────────────────────────────────────────────────────────┐
//!   │ fill: pop until the batch is full or flush_interval has  │
//!   │       elapsed; a timed-out pop ends the fill early while │
//!   │       shutting down or while a flush is waiting          │
//!   └────────────────────────────┬─────────────────────────────┘
//!                                v
//!   ┌──────────────────────────────────────────────────────────┐
//!   │ send: deliver, sleeping per the retry schedule between   │
//!   │       retryable failures; fatal or exhausted: drop       │
//!   └────────────────────────────┬─────────────────────────────┘
//!                                v
//!              shutting down and queue empty? ──yes──> Stopped
//!                                │ no
//!                                └──> next cycle
//! ```
//!
//! Shutdown is requested through a [`CancellationToken`]. The worker keeps
//! cycling until everything queued before shutdown has been sent or dropped.

use crate::config::ShipperConfig;
use crate::document::Document;
use crate::queue::{far_future, BoundedQueue};
use crate::transport::{DeliveryOutcome, Transport};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicU8, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{sleep, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerStatus {
    Running,
    ShuttingDown,
    Stopped,
}

impl WorkerStatus {
    fn as_u8(self) -> u8 {
        match self {
            WorkerStatus::Stopped => 0,
            WorkerStatus::Running => 1,
            WorkerStatus::ShuttingDown => 2,
        }
    }

    fn from_u8(value: u8) -> Self {
        match value {
            1 => WorkerStatus::Running,
            2 => WorkerStatus::ShuttingDown,
            _ => WorkerStatus::Stopped,
        }
    }
}

/// Counters describing what the shipper has done so far.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ShipperStats {
    /// Documents rejected because the queue was full.
    pub queue_full_drops: u64,
    pub delivery_attempts: u64,
    pub batches_delivered: u64,
    pub documents_delivered: u64,
    /// Batches given up on after a fatal failure or exhausted retries.
    pub batches_dropped: u64,
    pub documents_dropped: u64,
}

/// State shared between the worker and the facade that owns it.
#[derive(Debug, Default)]
pub struct WorkerState {
    status: AtomicU8,
    clean: AtomicBool,
    flush_waiters: AtomicUsize,
    queue_full_drops: AtomicU64,
    delivery_attempts: AtomicU64,
    batches_delivered: AtomicU64,
    documents_delivered: AtomicU64,
    batches_dropped: AtomicU64,
    documents_dropped: AtomicU64,
}

impl WorkerState {
    #[must_use]
    pub fn status(&self) -> WorkerStatus {
        WorkerStatus::from_u8(self.status.load(Ordering::Acquire))
    }

    pub(crate) fn set_status(&self, status: WorkerStatus) {
        self.status.store(status.as_u8(), Ordering::Release);
    }

    /// Whether the worker holds no dequeued documents.
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.clean.load(Ordering::Acquire)
    }

    fn set_clean(&self, clean: bool) {
        self.clean.store(clean, Ordering::Release);
    }

    /// Asks the worker to send partial batches until the returned guard drops.
    pub(crate) fn request_flush(&self) -> FlushRequest<'_> {
        self.flush_waiters.fetch_add(1, Ordering::AcqRel);
        FlushRequest { state: self }
    }

    #[must_use]
    pub fn flush_requested(&self) -> bool {
        self.flush_waiters.load(Ordering::Acquire) > 0
    }

    pub(crate) fn record_queue_full(&self) -> u64 {
        self.queue_full_drops.fetch_add(1, Ordering::Relaxed) + 1
    }

    #[must_use]
    pub fn queue_full_drops(&self) -> u64 {
        self.queue_full_drops.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn stats(&self) -> ShipperStats {
        ShipperStats {
            queue_full_drops: self.queue_full_drops.load(Ordering::Relaxed),
            delivery_attempts: self.delivery_attempts.load(Ordering::Relaxed),
            batches_delivered: self.batches_delivered.load(Ordering::Relaxed),
            documents_delivered: self.documents_delivered.load(Ordering::Relaxed),
            batches_dropped: self.batches_dropped.load(Ordering::Relaxed),
            documents_dropped: self.documents_dropped.load(Ordering::Relaxed),
        }
    }

    fn record_delivered(&self, documents: usize) {
        self.batches_delivered.fetch_add(1, Ordering::Relaxed);
        self.documents_delivered
            .fetch_add(documents as u64, Ordering::Relaxed);
    }

    fn record_dropped(&self, documents: usize) {
        self.batches_dropped.fetch_add(1, Ordering::Relaxed);
        self.documents_dropped
            .fetch_add(documents as u64, Ordering::Relaxed);
    }
}

pub(crate) struct FlushRequest<'a> {
    state: &'a WorkerState,
}

impl Drop for FlushRequest<'_> {
    fn drop(&mut self) {
        self.state.flush_waiters.fetch_sub(1, Ordering::AcqRel);
    }
}

/// Reports a batch's documents done even if delivery unwinds.
struct InFlight<'a> {
    queue: &'a BoundedQueue<Document>,
    count: usize,
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.queue.task_done(self.count);
    }
}

/// Timing knobs of the worker, taken from [`ShipperConfig`].
#[derive(Debug, Clone)]
pub struct WorkerSettings {
    pub batch_size: usize,
    pub flush_interval: Duration,
    pub check_interval: Duration,
    pub retry_schedule: Arc<[Duration]>,
}

impl From<&ShipperConfig> for WorkerSettings {
    fn from(config: &ShipperConfig) -> Self {
        Self {
            batch_size: config.buffer_capacity,
            flush_interval: config.flush_interval,
            check_interval: config.check_interval,
            retry_schedule: Arc::from(config.retry_schedule.as_slice()),
        }
    }
}

#[derive(Clone)]
pub struct BatchWorker {
    queue: Arc<BoundedQueue<Document>>,
    transport: Arc<dyn Transport>,
    settings: WorkerSettings,
    state: Arc<WorkerState>,
    cancel_token: CancellationToken,
}

impl BatchWorker {
    #[must_use]
    pub fn new(
        queue: Arc<BoundedQueue<Document>>,
        transport: Arc<dyn Transport>,
        settings: WorkerSettings,
        state: Arc<WorkerState>,
        cancel_token: CancellationToken,
    ) -> Self {
        Self {
            queue,
            transport,
            settings,
            state,
            cancel_token,
        }
    }

    #[must_use]
    pub fn state(&self) -> Arc<WorkerState> {
        Arc::clone(&self.state)
    }

    /// Cycles until shutdown has been requested and the queue is drained.
    pub async fn run(self) {
        debug!("LOGS | Flush worker started");
        self.state.set_status(WorkerStatus::Running);
        while self.step().await != WorkerStatus::Stopped {}
        debug!("LOGS | Flush worker stopped");
    }

    /// One fill and send cycle.
    pub async fn step(&self) -> WorkerStatus {
        let deadline = Instant::now()
            .checked_add(self.settings.flush_interval)
            .unwrap_or_else(far_future);
        let mut shutdown = self.cancel_token.is_cancelled();

        let batch = self.fill(deadline, &mut shutdown).await;
        if shutdown {
            self.state.set_status(WorkerStatus::ShuttingDown);
        }

        if !batch.is_empty() {
            let _in_flight = InFlight {
                queue: &self.queue,
                count: batch.len(),
            };
            self.send(&batch).await;
        }
        self.state.set_clean(true);

        let status = if shutdown && self.queue.is_empty() {
            WorkerStatus::Stopped
        } else if shutdown {
            WorkerStatus::ShuttingDown
        } else {
            WorkerStatus::Running
        };
        self.state.set_status(status);
        status
    }

    async fn fill(&self, deadline: Instant, shutdown: &mut bool) -> Vec<Document> {
        let mut batch = Vec::new();

        while batch.len() < self.settings.batch_size {
            let now = Instant::now();
            if now >= deadline {
                break;
            }

            let next = if *shutdown {
                // Nothing new is coming, take what is left without waiting
                self.queue.try_pop()
            } else {
                let wait = self.settings.check_interval.min(deadline - now);
                self.queue.pop_timeout(wait).await
            };

            match next {
                Some(document) => {
                    self.state.set_clean(false);
                    batch.push(document);
                }
                None if *shutdown || self.state.flush_requested() => break,
                None => {}
            }

            *shutdown = self.cancel_token.is_cancelled();
        }

        batch
    }

    async fn send(&self, batch: &[Document]) {
        let mut attempts = 0;
        loop {
            attempts += 1;
            self.state.delivery_attempts.fetch_add(1, Ordering::Relaxed);

            match self.transport.deliver(batch).await {
                DeliveryOutcome::Success => {
                    debug!(
                        "LOGS | Shipped {} documents in {} attempts",
                        batch.len(),
                        attempts
                    );
                    self.state.record_delivered(batch.len());
                    return;
                }
                DeliveryOutcome::FatalFailure(e) => {
                    error!(
                        "LOGS | Dropping batch of {} documents, delivery cannot succeed: {}",
                        batch.len(),
                        e
                    );
                    self.state.record_dropped(batch.len());
                    return;
                }
                DeliveryOutcome::RetryableFailure(e) => {
                    match self.settings.retry_schedule.get(attempts - 1) {
                        Some(delay) => {
                            warn!(
                                "LOGS | Delivery attempt {} failed, retrying in {:?}: {}",
                                attempts, delay, e
                            );
                            sleep(*delay).await;
                        }
                        None => {
                            error!(
                                "LOGS | Failed to ship {} documents after {} attempts, dropping batch: {}",
                                batch.len(),
                                attempts,
                                e
                            );
                            self.state.record_dropped(batch.len());
                            return;
                        }
                    }
                }
            }
        }
    }
}

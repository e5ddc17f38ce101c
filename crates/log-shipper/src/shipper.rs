// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! The producer-facing handle.
//!
//! [`LogShipper`] owns the queue and the flush worker. Submitting a document
//! is synchronous and never waits on the network: the worker runs on its own
//! thread with a single-threaded tokio runtime and is started on the first
//! submission (or at construction with `eager_start`). If the worker thread
//! has died it is started again by the next submission or flush.

use crate::config::ShipperConfig;
use crate::context::ContextStack;
use crate::document::{Document, DocumentBuilder, LogEvent};
use crate::error::ShipperError;
use crate::queue::{BoundedQueue, PushError};
use crate::transport::{HttpTransport, Transport};
use crate::worker::{BatchWorker, ShipperStats, WorkerSettings, WorkerState, WorkerStatus};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

const WORKER_THREAD_NAME: &str = "log-shipper-flush";

/// What happened to a submitted document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Submission {
    Queued,
    /// The queue was full and the document was counted as dropped.
    Dropped,
    /// The document could not be queued for another reason, which was logged.
    Discarded,
}

pub struct LogShipper {
    config: ShipperConfig,
    queue: Arc<BoundedQueue<Document>>,
    transport: Arc<dyn Transport>,
    state: Arc<WorkerState>,
    builder: DocumentBuilder,
    cancel_token: CancellationToken,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl LogShipper {
    /// Creates a shipper uploading over HTTP.
    pub fn new(config: ShipperConfig) -> Result<Self, ShipperError> {
        config.validate()?;
        let transport = HttpTransport::new(&config)?;
        Self::with_transport(config, Arc::new(transport))
    }

    /// Creates a shipper delivering through `transport`.
    pub fn with_transport(
        config: ShipperConfig,
        transport: Arc<dyn Transport>,
    ) -> Result<Self, ShipperError> {
        config.validate()?;
        let shipper = Self {
            queue: Arc::new(BoundedQueue::new(config.buffer_capacity)),
            transport,
            state: Arc::new(WorkerState::default()),
            builder: DocumentBuilder::new(config.include_extra_fields),
            cancel_token: CancellationToken::new(),
            worker: Mutex::new(None),
            config,
        };
        if shipper.config.eager_start {
            shipper.ensure_worker_alive()?;
        }
        Ok(shipper)
    }

    #[must_use]
    pub fn config(&self) -> &ShipperConfig {
        &self.config
    }

    /// Queues a document for delivery.
    ///
    /// Errors are only returned with `raise_on_error`; otherwise they are
    /// logged and reflected in the returned [`Submission`].
    pub fn submit(&self, document: Document) -> Result<Submission, ShipperError> {
        match self.enqueue(document) {
            Ok(()) => Ok(Submission::Queued),
            Err(e) if self.config.raise_on_error => Err(e),
            Err(ShipperError::QueueFull) => Ok(Submission::Dropped),
            Err(e) => {
                warn!("LOGS | Discarding log document: {}", e);
                Ok(Submission::Discarded)
            }
        }
    }

    /// Builds a document from `event` and the caller's contexts, then queues it.
    pub fn submit_event(
        &self,
        event: &LogEvent,
        contexts: &ContextStack,
    ) -> Result<Submission, ShipperError> {
        self.submit(self.builder.build(event, contexts))
    }

    fn enqueue(&self, document: Document) -> Result<(), ShipperError> {
        if let Err(e) = self.ensure_worker_alive() {
            // The document is still queued; a later call retries the start.
            if !matches!(e, ShipperError::ShutDown) {
                error!("LOGS | {}", e);
            }
        }

        let pushed = if self.config.drop_when_full {
            self.queue.try_push(document)
        } else {
            self.queue.push(document)
        };

        match pushed {
            Ok(()) => Ok(()),
            Err(PushError::Full(_)) => {
                let dropped = self.state.record_queue_full();
                debug!(
                    "LOGS | Queue full, dropped document ({} dropped so far)",
                    dropped
                );
                Err(ShipperError::QueueFull)
            }
            Err(PushError::Closed(_)) => Err(ShipperError::ShutDown),
        }
    }

    /// Blocks until every document submitted so far has been sent or dropped.
    ///
    /// There is no timeout: against an unreachable destination this waits out
    /// the whole retry schedule. See [`LogShipper::flush_timeout`].
    pub fn flush(&self) {
        self.flush_until(None);
    }

    /// Like [`LogShipper::flush`] but gives up after `timeout`. Returns whether
    /// everything was handled in time.
    pub fn flush_timeout(&self, timeout: Duration) -> bool {
        self.flush_until(Instant::now().checked_add(timeout))
    }

    fn flush_until(&self, deadline: Option<Instant>) -> bool {
        if self.queue.is_settled() {
            return true;
        }

        let _request = self.state.request_flush();
        loop {
            if self.ensure_worker_alive().is_err() && !self.is_worker_alive() {
                // Nobody is left to drain the queue.
                return self.queue.is_settled();
            }

            let wait = match deadline {
                Some(deadline) => {
                    let remaining = deadline.saturating_duration_since(Instant::now());
                    if remaining.is_zero() {
                        return self.queue.is_settled();
                    }
                    remaining.min(self.config.check_interval)
                }
                None => self.config.check_interval,
            };

            if self.queue.wait_settled(wait) {
                return true;
            }
        }
    }

    /// Number of documents rejected because the queue was full.
    #[must_use]
    pub fn drop_count(&self) -> u64 {
        self.state.queue_full_drops()
    }

    #[must_use]
    pub fn stats(&self) -> ShipperStats {
        self.state.stats()
    }

    #[must_use]
    pub fn worker_status(&self) -> WorkerStatus {
        self.state.status()
    }

    /// Documents accepted but not yet sent or dropped.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.queue.unfinished()
    }

    #[must_use]
    pub fn is_worker_alive(&self) -> bool {
        self.lock_worker()
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }

    /// Stops accepting documents, lets the worker send what is queued, and
    /// waits for it to exit. Idempotent.
    pub fn shutdown(&self) {
        self.cancel_token.cancel();
        self.queue.close();

        let mut worker = self.lock_worker();
        let needs_drain = !self.queue.is_empty()
            && worker.as_ref().map_or(true, JoinHandle::is_finished);
        if needs_drain {
            if let Some(handle) = worker.take() {
                let _ = handle.join();
            }
            match self.spawn_worker() {
                Ok(handle) => *worker = Some(handle),
                Err(e) => error!(
                    "LOGS | Unable to drain {} queued documents: {}",
                    self.queue.len(),
                    e
                ),
            }
        }

        if let Some(handle) = worker.take() {
            if handle.join().is_err() {
                error!("LOGS | Flush worker thread panicked");
            }
        }
    }

    fn lock_worker(&self) -> std::sync::MutexGuard<'_, Option<JoinHandle<()>>> {
        self.worker.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn ensure_worker_alive(&self) -> Result<(), ShipperError> {
        let mut worker = self.lock_worker();
        if worker.as_ref().is_some_and(|handle| !handle.is_finished()) {
            return Ok(());
        }
        if self.cancel_token.is_cancelled() {
            return Err(ShipperError::ShutDown);
        }

        if let Some(handle) = worker.take() {
            let _ = handle.join();
            warn!("LOGS | Flush worker exited unexpectedly, restarting it");
        }
        *worker = Some(self.spawn_worker()?);
        Ok(())
    }

    fn spawn_worker(&self) -> Result<JoinHandle<()>, ShipperError> {
        let worker = BatchWorker::new(
            Arc::clone(&self.queue),
            Arc::clone(&self.transport),
            WorkerSettings::from(&self.config),
            Arc::clone(&self.state),
            self.cancel_token.clone(),
        );
        let handle = thread::Builder::new()
            .name(WORKER_THREAD_NAME.to_string())
            .spawn(move || run_worker_thread(worker))?;
        Ok(handle)
    }
}

impl Drop for LogShipper {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl std::fmt::Debug for LogShipper {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LogShipper")
            .field("config", &self.config)
            .field("queue", &self.queue)
            .field("status", &self.state.status())
            .finish_non_exhaustive()
    }
}

/// Body of the worker thread. A panic inside a cycle is logged and the worker
/// resumes with the next cycle until it stops normally.
fn run_worker_thread(worker: BatchWorker) {
    let state = worker.state();
    let runtime = match tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            error!("LOGS | Unable to start flush worker runtime: {}", e);
            return;
        }
    };

    runtime.block_on(async move {
        loop {
            let task = worker.clone();
            match tokio::spawn(task.run()).await {
                Ok(()) => break,
                Err(e) => error!("LOGS | Flush worker cycle failed: {}", e),
            }
        }
    });
    state.set_status(WorkerStatus::Stopped);
}
